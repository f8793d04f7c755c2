//! Change notification
//!
//! ```text
//! ChangeRecord[] --aggregate--> NotificationPayload --dispatcher--> MailTransport
//!                      ^                                  |
//!              RecipientResolver                  TemplateRenderer
//! ```

mod aggregate;
mod dispatcher;
mod error;
mod status;
mod templates;
mod transport;

pub use aggregate::{
    NotificationPayload, RECIPIENT_PREFIX, RecipientResolver, RepositorySection, SUBJECT_PREFIX, aggregate,
    clean_recipients,
};
pub use dispatcher::{
    DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF, Delivery, NotificationDispatcher, RetryPolicy,
};
pub use error::{NotifyError, TransportError};
pub use status::{ErrorLine, RepositoryStatus, StartupNotice, StatusReport, WatchedRepository};
pub use templates::{MailBody, TemplateRenderer};
pub use transport::{Encryption, MailTransport, OutgoingMail, SmtpMailer, SmtpSettings, build_message};
