//! SMTP sender capability (ambient addition — spec §1 names the SMTP sender
//! as an external collaborator but doesn't specify the trait shape; grounded
//! in the `lettre` dependency seen in `other_examples/penserai-acteon`).

use crate::error::MailerError;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_one_time_secret(&self, to: &str, secret: &str) -> Result<(), MailerError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        relay: &str,
        username: String,
        password: String,
        from: Mailbox,
    ) -> Result<Self, MailerError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(relay)
            .map_err(|e| MailerError::Send(e.to_string()))?
            .credentials(Credentials::new(username, password))
            .build();
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_one_time_secret(&self, to: &str, secret: &str) -> Result<(), MailerError> {
        let to_mailbox: Mailbox = to.parse().map_err(|e: lettre::address::AddressError| {
            MailerError::Send(e.to_string())
        })?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject("Your diagramastext.dev sign-in code")
            .body(format!("Your one-time code is: {secret}\nIt expires in 10 minutes."))
            .map_err(|e| MailerError::Send(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| MailerError::Send(e.to_string()))?;
        Ok(())
    }
}

/// Test double that records nothing and always succeeds.
#[derive(Default)]
pub struct NullMailer;

#[async_trait]
impl Mailer for NullMailer {
    async fn send_one_time_secret(&self, _to: &str, _secret: &str) -> Result<(), MailerError> {
        Ok(())
    }
}
