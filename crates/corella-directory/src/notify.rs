//! Email notifications for account lifecycle events.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::info;

/// Notification delivery errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid email address: {0}")]
    InvalidAddress(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Welcome notice sent once a new account has been fully provisioned.
#[derive(Debug, Clone)]
pub struct WelcomeNotice {
    pub email: String,
    pub full_name: String,
    pub project_name: String,
}

/// Notice sent to a registrant whose identity already maps to an
/// existing directory account.
#[derive(Debug, Clone)]
pub struct DuplicateNotice {
    pub email: String,
    pub full_name: String,
    pub existing_user_id: String,
}

/// Outbound notification seam; implemented by [`SmtpNotifier`] and by
/// fakes in tests.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_welcome(&self, notice: &WelcomeNotice) -> Result<(), NotifyError>;

    async fn send_duplicate_notice(&self, notice: &DuplicateNotice) -> Result<(), NotifyError>;
}

/// SMTP relay configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// From address, e.g. `support@example.org`.
    pub from_address: String,
    /// Support contact included in notice bodies.
    pub support_url: String,
}

/// Notifier delivering over an SMTP relay.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    support_url: String,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.from_address.parse()?,
            support_url: config.support_url.clone(),
        })
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .body(body)?;

        self.transport.send(message).await?;
        info!(to, subject, "Notification sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_welcome(&self, notice: &WelcomeNotice) -> Result<(), NotifyError> {
        let body = format!(
            "Dear {},\n\n\
             Your account has been created and your project trial {} is ready.\n\
             Log in with your institutional credentials to get started.\n\n\
             If you have any questions, visit {}.\n",
            notice.full_name, notice.project_name, self.support_url
        );
        self.send(&notice.email, "Your project trial has been created", body)
            .await
    }

    async fn send_duplicate_notice(&self, notice: &DuplicateNotice) -> Result<(), NotifyError> {
        let body = format!(
            "Dear {},\n\n\
             You signed in with an identity that is already linked to an\n\
             existing account ({}). No new account was created.\n\n\
             If you believe this is a mistake, or you need the identities\n\
             merged, contact support at {}.\n",
            notice.full_name, notice.existing_user_id, self.support_url
        );
        self.send(&notice.email, "Your account already exists", body)
            .await
    }
}
