//! Outbound mail for share invitations.

use crate::error::{PlannerError, PlannerResult};
use async_trait::async_trait;
use lettre::message::{Mailbox, Message, header};
use lettre::{SmtpTransport, Transport};
use tracing::info;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, from: &str, to: &str, subject: &str, body: &str) -> PlannerResult<()>;
}

/// Sends through an SMTP relay.
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(host: &str) -> PlannerResult<Self> {
        let transport = SmtpTransport::relay(host)
            .map_err(|e| PlannerError::Mail(format!("invalid SMTP relay {host}: {e}")))?
            .build();
        Ok(SmtpMailer { transport })
    }
}

fn mailbox(address: &str) -> PlannerResult<Mailbox> {
    address
        .parse()
        .map_err(|e| PlannerError::Mail(format!("invalid address \"{address}\": {e}")))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, from: &str, to: &str, subject: &str, body: &str) -> PlannerResult<()> {
        let message = Message::builder()
            .from(mailbox(from)?)
            .to(mailbox(to)?)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| PlannerError::Mail(format!("failed to build message: {e}")))?;

        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await?
            .map_err(|e| PlannerError::Mail(e.to_string()))?;

        Ok(())
    }
}

/// Writes messages to the log instead of delivering them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, from: &str, to: &str, subject: &str, body: &str) -> PlannerResult<()> {
        mailbox(to)?;
        info!(from, to, subject, "mail not delivered (no SMTP relay configured): {body}");
        Ok(())
    }
}
