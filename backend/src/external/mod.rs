//! External API integrations

pub mod alert_webhook;

pub use alert_webhook::AlertWebhookClient;
