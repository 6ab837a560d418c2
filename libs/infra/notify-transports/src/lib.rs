// [libs/infra/notify-transports/src/lib.rs]
//! Notification delivery transports: email, webhook, and Apprise,
//! all behind the dual-stage SSRF protection in [`ssrf`].

pub mod apprise;
pub mod email;
pub mod errors;
pub mod redact;
pub mod ssrf;
pub mod template;
pub mod webhook;

pub use apprise::{AppriseConfig, AppriseMode, AppriseTransport};
pub use email::{EmailConfig, EmailTransport};
pub use errors::TransportError;
pub use webhook::{WebhookConfig, WebhookTransport};
