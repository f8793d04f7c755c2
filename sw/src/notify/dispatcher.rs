//! Notification dispatcher
//!
//! Renders a payload, hands it to a [`MailTransport`] and retries transient
//! failures. The outcome is reported as a [`Delivery`]; nothing in here
//! panics or returns an error to the caller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::aggregate::{NotificationPayload, clean_recipients};
use super::status::{StartupNotice, StatusReport};
use super::templates::{MailBody, TemplateRenderer};
use super::transport::{MailTransport, OutgoingMail, SmtpMailer, SmtpSettings};
use crate::config::EmailConfig;
use crate::domain::{Credentials, TIMESTAMP_FORMAT};

/// Extra attempts after the first one
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Fixed pause between attempts
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Upper bound for a single attempt
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The transport accepted the message
    Sent,
    /// Nothing was attempted, for the given reason
    Skipped(String),
    /// Every attempt failed
    Failed(String),
}

impl Delivery {
    /// `Sent` and `Skipped` both let the caller move on
    pub fn succeeded(&self) -> bool {
        !matches!(self, Delivery::Failed(_))
    }
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Sent => write!(f, "sent"),
            Delivery::Skipped(reason) => write!(f, "skipped ({})", reason),
            Delivery::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Attempts, backoff and per-attempt timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_RETRY_BACKOFF,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

/// Sends change notifications and operational mail
pub struct NotificationDispatcher {
    transport: Option<Arc<dyn MailTransport>>,
    disabled_reason: String,
    from: String,
    renderer: TemplateRenderer,
    policy: RetryPolicy,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn MailTransport>, from: impl Into<String>) -> Self {
        Self {
            transport: Some(transport),
            disabled_reason: String::new(),
            from: from.into(),
            renderer: TemplateRenderer::embedded_only(),
            policy: RetryPolicy::default(),
        }
    }

    /// A dispatcher that skips every delivery
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            transport: None,
            disabled_reason: reason.into(),
            from: String::new(),
            renderer: TemplateRenderer::embedded_only(),
            policy: RetryPolicy::default(),
        }
    }

    /// Build from the `email` section
    ///
    /// Missing host or sender, or missing credentials, yield a dispatcher
    /// that skips deliveries; detection keeps working without mail.
    pub fn from_config(email: &EmailConfig) -> Self {
        debug!("NotificationDispatcher::from_config: called");
        let (host, from) = match (non_empty(&email.host), non_empty(&email.from)) {
            (Some(host), Some(from)) if email.port != 0 => (host, from),
            _ => return Self::disabled("mail configuration incomplete"),
        };
        let Some(credentials) = Credentials::from_parts(email.username.as_deref(), email.password.as_deref()) else {
            return Self::disabled("no SMTP credentials configured");
        };

        let settings = SmtpSettings {
            host: host.to_string(),
            port: email.port,
            encryption: email.encryption,
            credentials: Some(credentials),
            timeout: Duration::from_secs(email.timeout_secs),
        };
        let mailer = match SmtpMailer::new(&settings) {
            Ok(mailer) => mailer,
            Err(e) => {
                error!(error = %e, "Failed to set up SMTP transport");
                return Self::disabled(format!("SMTP transport unavailable: {}", e));
            }
        };

        Self::new(Arc::new(mailer), from)
            .with_renderer(TemplateRenderer::new(email.templates_dir.as_deref()))
            .with_policy(RetryPolicy {
                max_retries: email.max_retries,
                backoff: Duration::from_secs(email.retry_backoff_secs),
                attempt_timeout: Duration::from_secs(email.timeout_secs),
            })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_renderer(mut self, renderer: TemplateRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Deliver one combined change notification
    pub async fn deliver(&self, payload: &NotificationPayload) -> Delivery {
        debug!(subject = %payload.subject, changes = payload.total_changes, "NotificationDispatcher::deliver: called");
        let generated_at = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let delivery = match self.renderer.changes(payload, &generated_at) {
            Ok(body) => self.send(&payload.recipients, &payload.subject, body).await,
            Err(e) => {
                error!(error = %e, "Failed to render change notification");
                Delivery::Failed(e.to_string())
            }
        };

        info!(
            op = "NOTIFICATION",
            repositories = ?payload.repository_ids(),
            changes = payload.total_changes,
            outcome = %delivery,
            "Change notification processed"
        );
        delivery
    }

    /// Send the per-cycle status report
    pub async fn send_status(&self, report: &StatusReport, recipients: &[String]) -> Delivery {
        debug!("NotificationDispatcher::send_status: called");
        let body = self
            .renderer
            .render("status.txt", report)
            .and_then(|text| Ok((text, self.renderer.render("status.html", report)?)));
        match body {
            Ok((text, html)) => {
                self.send(
                    recipients,
                    &report.subject(),
                    MailBody {
                        text,
                        html: Some(html),
                    },
                )
                .await
            }
            Err(e) => Delivery::Failed(e.to_string()),
        }
    }

    /// Announce that the monitor started
    pub async fn send_startup_notice(&self, notice: &StartupNotice, recipients: &[String]) -> Delivery {
        debug!("NotificationDispatcher::send_startup_notice: called");
        match self.renderer.render("startup.txt", notice) {
            Ok(text) => self.send(recipients, &notice.subject(), MailBody { text, html: None }).await,
            Err(e) => Delivery::Failed(e.to_string()),
        }
    }

    async fn send(&self, recipients: &[String], subject: &str, body: MailBody) -> Delivery {
        let Some(transport) = &self.transport else {
            warn!(reason = %self.disabled_reason, %subject, "Mail delivery skipped");
            return Delivery::Skipped(self.disabled_reason.clone());
        };

        let to = clean_recipients(recipients);
        if to.is_empty() {
            warn!(%subject, "Mail delivery skipped, no recipients resolved");
            return Delivery::Skipped("no recipients".to_string());
        }

        let mail = OutgoingMail {
            from: self.from.clone(),
            to,
            subject: subject.to_string(),
            body,
        };
        self.send_with_retry(transport.as_ref(), &mail).await
    }

    async fn send_with_retry(&self, transport: &dyn MailTransport, mail: &OutgoingMail) -> Delivery {
        let mut last_error = String::new();

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                debug!(attempt, backoff = ?self.policy.backoff, "send_with_retry: retrying after transient error");
                tokio::time::sleep(self.policy.backoff).await;
            }

            match tokio::time::timeout(self.policy.attempt_timeout, transport.send(mail)).await {
                Ok(Ok(())) => {
                    info!(subject = %mail.subject, recipients = mail.to.len(), attempt, "Mail sent");
                    return Delivery::Sent;
                }
                Ok(Err(e)) if e.is_retryable() => {
                    warn!(attempt, error = %e, "Mail attempt failed");
                    last_error = e.to_string();
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Mail rejected, not retrying");
                    return Delivery::Failed(e.to_string());
                }
                Err(_) => {
                    warn!(attempt, timeout = ?self.policy.attempt_timeout, "Mail attempt timed out");
                    last_error = format!("timed out after {:?}", self.policy.attempt_timeout);
                }
            }
        }

        error!(subject = %mail.subject, attempts = self.policy.max_retries + 1, error = %last_error, "Mail delivery failed");
        Delivery::Failed(last_error)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
