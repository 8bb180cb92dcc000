use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{info, warn};

use crate::artifacts::{download_filename, ArtifactError, ArtifactStore, PDF_CONTENT_TYPE};
use crate::config::{AppConfig, SmtpConfig};

const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid email address: {0}")]
    InvalidAddress(String),
    #[error("mail delivery is not configured")]
    NotConfigured,
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("mail transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: Address,
    pub subject: String,
    pub body: String,
    pub attachment: Option<MailAttachment>,
}

#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|_| MailError::InvalidAddress(config.from.clone()))?;

        let relay = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        };
        let builder = relay
            .map_err(|err| MailError::Transport(err.to_string()))?
            .port(config.port);

        let builder = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let message = build_message(self.from.clone(), mail)?;
        self.transport
            .send(message)
            .await
            .map_err(|err| MailError::Transport(err.to_string()))?;
        Ok(())
    }
}

/// Used when no SMTP host is configured; every send fails.
pub struct UnconfiguredMailer;

#[async_trait]
impl MailTransport for UnconfiguredMailer {
    async fn send(&self, _mail: OutgoingMail) -> Result<(), MailError> {
        Err(MailError::NotConfigured)
    }
}

pub fn mailer_from_config(config: &AppConfig) -> anyhow::Result<Arc<dyn MailTransport>> {
    match &config.smtp {
        Some(smtp) => {
            let mailer = SmtpMailer::new(smtp)?;
            info!(host = %smtp.host, port = smtp.port, "configured SMTP transport");
            Ok(Arc::new(mailer))
        }
        None => {
            warn!("SMTP_HOST not set; sending documents by email is disabled");
            Ok(Arc::new(UnconfiguredMailer))
        }
    }
}

fn build_message(from: Mailbox, mail: OutgoingMail) -> Result<Message, MailError> {
    let body = SinglePart::plain(mail.body);
    let builder = Message::builder()
        .from(from)
        .to(Mailbox::new(None, mail.to))
        .subject(mail.subject);

    let message = match mail.attachment {
        Some(attachment) => {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|err| MailError::Build(err.to_string()))?;
            builder.multipart(
                MultiPart::mixed()
                    .singlepart(body)
                    .singlepart(
                        Attachment::new(attachment.filename).body(attachment.bytes, content_type),
                    ),
            )
        }
        None => builder.singlepart(body),
    };
    message.map_err(|err| MailError::Build(err.to_string()))
}

pub fn parse_recipient(value: &str) -> Result<Address, MailError> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|_| MailError::InvalidAddress(value.trim().to_string()))
}

/// Emails the newest document of `folio` to `recipient`.
pub async fn send_order_pdf(
    artifacts: &ArtifactStore,
    mailer: &dyn MailTransport,
    business_name: &str,
    folio: &str,
    recipient: &str,
) -> Result<(), MailError> {
    let to = parse_recipient(recipient)?;
    let (_, bytes) = artifacts.load_latest(folio).await?;

    let mail = OutgoingMail {
        to,
        subject: format!("Orden de servicio {folio}"),
        body: format!(
            "Hola,\n\nAdjuntamos la orden de servicio {folio}.\n\nGracias por su preferencia.\n{business_name}"
        ),
        attachment: Some(MailAttachment {
            filename: download_filename(folio),
            content_type: PDF_CONTENT_TYPE.to_string(),
            bytes,
        }),
    };
    mailer.send(mail).await?;
    info!(%folio, "sent order document by email");
    Ok(())
}
