//! Mail transport seam and the SMTP implementation

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::TransportError;
use super::templates::MailBody;
use crate::domain::Credentials;

/// How the SMTP connection is secured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encryption {
    /// Implicit TLS, usually port 465
    #[default]
    Tls,
    /// Plain connection upgraded with STARTTLS, usually port 587
    Starttls,
    /// No encryption at all
    None,
}

impl fmt::Display for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tls => write!(f, "tls"),
            Self::Starttls => write!(f, "starttls"),
            Self::None => write!(f, "none"),
        }
    }
}

/// A fully addressed message ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: MailBody,
}

/// Something that can deliver a message
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError>;
}

/// Connection settings for [`SmtpMailer`]
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub encryption: Encryption,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
}

/// SMTP delivery through lettre
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self, TransportError> {
        debug!(host = %settings.host, port = settings.port, encryption = %settings.encryption, "SmtpMailer::new: called");
        let builder = match settings.encryption {
            Encryption::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
                .map_err(|e| TransportError::Connection(e.to_string()))?,
            Encryption::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| TransportError::Connection(e.to_string()))?,
            Encryption::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host),
        };

        let mut builder = builder.port(settings.port).timeout(Some(settings.timeout));
        if let Some(creds) = &settings.credentials {
            builder = builder.credentials(SmtpCredentials::new(creds.username.clone(), creds.password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            timeout: settings.timeout,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
        debug!(subject = %mail.subject, recipients = mail.to.len(), "SmtpMailer::send: called");
        let message = build_message(mail)?;

        match self.transport.send(message).await {
            Ok(response) => {
                debug!(code = %response.code(), "SmtpMailer::send: accepted");
                Ok(())
            }
            Err(e) if e.is_timeout() => Err(TransportError::Timeout(self.timeout)),
            Err(e) if is_auth_failure(&e) => Err(TransportError::Auth(e.to_string())),
            Err(e) => Err(TransportError::Connection(e.to_string())),
        }
    }
}

/// 530/534/535 are the authentication replies
fn is_auth_failure(err: &lettre::transport::smtp::Error) -> bool {
    err.status().is_some_and(|code| {
        let code = code.to_string();
        code == "530" || code == "534" || code == "535"
    })
}

/// Turn an [`OutgoingMail`] into a MIME message
pub fn build_message(mail: &OutgoingMail) -> Result<Message, TransportError> {
    let from: Mailbox = mail
        .from
        .parse()
        .map_err(|e| TransportError::Message(format!("invalid sender {}: {}", mail.from, e)))?;

    let mut builder = Message::builder().from(from).subject(mail.subject.clone());
    for address in &mail.to {
        let mailbox: Mailbox = address
            .parse()
            .map_err(|e| TransportError::Message(format!("invalid recipient {}: {}", address, e)))?;
        builder = builder.to(mailbox);
    }

    let result = match &mail.body.html {
        Some(html) => builder.multipart(MultiPart::alternative_plain_html(mail.body.text.clone(), html.clone())),
        None => builder.header(ContentType::TEXT_PLAIN).body(mail.body.text.clone()),
    };
    result.map_err(|e| TransportError::Message(e.to_string()))
}
