use std::time;

use anyhow::Context;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::domain::EmailAddress;

/// Port on which SMTP relays expect implicit TLS
const SMTPS_PORT: u16 = 465;

/// Capability to hand one fully rendered email to an external mail system
///
/// A call either delivers the whole message to the transport or fails; there
/// are no retries at this level.
#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(
        &self,
        subject: &str,
        from: &EmailAddress,
        to: &EmailAddress,
        text_body: &str,
        html_body: &str,
    ) -> anyhow::Result<()>;
}

/// Transactional email API client
#[derive(Debug)]
pub struct PostmarkClient {
    http_client: Client,
    base_url: Url,
    authorization_token: SecretString,
}

/// Postmark request body
#[derive(serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html_body: &'a str,
    text_body: &'a str,
}

impl PostmarkClient {
    pub fn new(
        base_url: Url,
        authorization_token: SecretString,
        timeout: time::Duration,
    ) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build the HTTP client")?;
        Ok(Self {
            http_client,
            base_url,
            authorization_token,
        })
    }
}

#[async_trait::async_trait]
impl MailTransport for PostmarkClient {
    /// Send an email using Postmark's REST API
    /// <https://postmarkapp.com/developer/user-guide/send-email-with-api>
    async fn send(
        &self,
        subject: &str,
        from: &EmailAddress,
        to: &EmailAddress,
        text_body: &str,
        html_body: &str,
    ) -> anyhow::Result<()> {
        let url = self
            .base_url
            .join("/email")
            .context("Failed to build the email API URL")?;
        let request_body = SendEmailRequest {
            from: from.as_ref(),
            to: to.as_ref(),
            subject,
            html_body,
            text_body,
        };

        self.http_client
            .post(url)
            .header(
                "X-Postmark-Server-Token",
                self.authorization_token.expose_secret(),
            )
            .json(&request_body)
            .send()
            .await
            .context("Failed to reach the email API")?
            .error_for_status()
            .context("The email API rejected the request")?;
        Ok(())
    }
}

/// SMTP relay client
pub struct SmtpRelay {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpRelay {
    /// Build a relay client; with `tls` unset the connection is plaintext
    pub fn new(
        host: &str,
        port: u16,
        credentials: Option<(String, SecretString)>,
        tls: bool,
        timeout: time::Duration,
    ) -> anyhow::Result<Self> {
        let mut builder = match (tls, port) {
            (false, _) => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
            (true, SMTPS_PORT) => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .context("Failed to set up the SMTP relay")?,
            (true, _) => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .context("Failed to set up the SMTP relay")?,
        };
        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(
                username,
                password.expose_secret().to_owned(),
            ));
        }
        let transport = builder.port(port).timeout(Some(timeout)).build();
        Ok(Self { transport })
    }
}

#[async_trait::async_trait]
impl MailTransport for SmtpRelay {
    async fn send(
        &self,
        subject: &str,
        from: &EmailAddress,
        to: &EmailAddress,
        text_body: &str,
        html_body: &str,
    ) -> anyhow::Result<()> {
        let from: Mailbox = from.as_ref().parse().context("Invalid sender address")?;
        let to: Mailbox = to.as_ref().parse().context("Invalid recipient address")?;
        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                text_body.to_owned(),
                html_body.to_owned(),
            ))
            .context("Failed to build the email message")?;

        self.transport
            .send(message)
            .await
            .context("The SMTP relay rejected the message")?;
        Ok(())
    }
}
