//! Outbound email for credential delivery.
//!
//! Messages are plain text. [`SmtpMailer`] relays through an SMTP server;
//! [`LogMailer`] only records that a message would have been sent and is the
//! default when no SMTP relay is configured.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::sync::Mutex;
use thiserror::Error;

/// Mail delivery errors
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

pub type MailResult<T> = Result<T, MailError>;

/// A plain-text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    /// Welcome message carrying freshly issued credentials
    pub fn welcome(to: &str, name: &str, username: &str, password: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Welcome to the school portal".to_string(),
            body: format!(
                "Hello {name},\n\n\
                 Your school portal account is ready.\n\n\
                 Username: {username}\n\
                 Password: {password}\n\n\
                 You can also sign in by scanning the QR code from your registration.\n\
                 Please keep these details private.\n"
            ),
        }
    }

    /// Message carrying a password issued by a controller-initiated reset
    pub fn password_reset(to: &str, name: &str, username: &str, password: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Your school portal password was reset".to_string(),
            body: format!(
                "Hello {name},\n\n\
                 A new password was issued for your account.\n\n\
                 Username: {username}\n\
                 Password: {password}\n"
            ),
        }
    }
}

/// Delivers outgoing mail
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> MailResult<()>;
}

/// SMTP relay settings
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

/// Sends mail through an SMTP relay over implicit TLS
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> MailResult<Self> {
        let from = parse_mailbox(&config.from)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> MailResult<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&mail.to)?)
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body)
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        Ok(())
    }
}

/// Logs recipients and subjects without sending anything.
///
/// Bodies are kept in memory so tests can inspect what would have gone out;
/// they are never written to the log because they carry passwords.
#[derive(Debug, Default)]
pub struct LogMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages accepted so far
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> MailResult<()> {
        parse_mailbox(&mail.to)?;
        log::info!("Mail to {} not sent (no SMTP relay): {}", mail.to, mail.subject);
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(mail);
        }
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> MailResult<Mailbox> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}
