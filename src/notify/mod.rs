//! Transactional email.

use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

pub mod messages;
mod resend;

pub use resend::ResendMailer;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("email not configured")]
    NotConfigured,
    #[error("email provider rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("email provider timed out")]
    Timeout,
    #[error("email transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() { Self::Timeout } else { Self::Transport(e.to_string()) }
    }
}

#[automock]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), NotifyError>;
}
