use clap::{Parser, Subcommand};

/// Keygate — credential issuance, validation, and access decisions
#[derive(Parser)]
#[command(name = "keygate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Port to bind
        #[arg(short, long, default_value = "8088")]
        port: u16,
    },

    /// Manage credentials
    Credential {
        #[command(subcommand)]
        command: CredentialCommands,
    },
}

#[derive(Subcommand)]
pub enum CredentialCommands {
    /// Issue a new credential
    Issue {
        /// Plan: trial, standard, premium, owner
        #[arg(long, default_value = "standard")]
        plan: String,
        /// Maximum number of uses (omit for unlimited)
        #[arg(long)]
        max_usage: Option<i64>,
        /// Validity in days (omit for the plan default)
        #[arg(long)]
        duration_days: Option<i64>,
    },
    /// Show a credential's record
    Inspect { id: String },
    /// Revoke a credential (idempotent)
    Revoke { id: String },
}
