pub mod webhook;

pub use webhook::{WebhookEvent, WebhookNotifier};
