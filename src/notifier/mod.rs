//! Outbound email dispatch.
//!
//! Subscription and ticket flows notify through the [`Notifier`] trait;
//! the SMTP backend is optional and the default backend only logs, so
//! delivery is never on any request's critical path.

use crate::config::SmtpConfig;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::{info, warn};
use std::sync::Arc;

pub trait Notifier: Send + Sync {
    fn deliver(&self, to: &str, subject: &str, body: &str) -> Result<(), anyhow::Error>;
}

/// Fallback backend used when no SMTP server is configured.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver(&self, to: &str, subject: &str, _body: &str) -> Result<(), anyhow::Error> {
        info!("email delivery skipped (no SMTP configured): to={} subject={}", to, subject);
        Ok(())
    }
}

pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: String,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, anyhow::Error> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let transport = SmtpTransport::relay(&config.server)?
            .port(config.port)
            .credentials(creds)
            .build();
        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }
}

impl Notifier for SmtpNotifier {
    fn deliver(&self, to: &str, subject: &str, body: &str) -> Result<(), anyhow::Error> {
        let email = Message::builder()
            .from(self.from.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .body(body.to_string())?;
        self.transport.send(&email)?;
        Ok(())
    }
}

pub fn from_config(smtp: Option<&SmtpConfig>) -> Arc<dyn Notifier> {
    match smtp {
        Some(config) => match SmtpNotifier::new(config) {
            Ok(notifier) => Arc::new(notifier),
            Err(err) => {
                warn!("SMTP transport unavailable, falling back to log-only delivery: {}", err);
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    }
}

pub fn send_verification_email(notifier: &dyn Notifier, email: &str, token: &str) {
    let body = format!(
        "Thanks for subscribing. Confirm your address by visiting /api/newsletter/verify/{}",
        token
    );
    if let Err(err) = notifier.deliver(email, "Confirm your newsletter subscription", &body) {
        warn!("failed to send verification email to {}: {}", email, err);
    }
}

pub fn send_ticket_received_email(notifier: &dyn Notifier, email: &str, ticket_code: &str) {
    let body = format!(
        "We received your request and assigned it ticket {}. We'll be in touch soon.",
        ticket_code
    );
    if let Err(err) = notifier.deliver(email, &format!("Support ticket {} received", ticket_code), &body) {
        warn!("failed to send ticket notification to {}: {}", email, err);
    }
}
