use std::{fmt, sync::Arc};

use html_escape::encode_safe;
use tokio::sync::{mpsc, Semaphore};
use tracing::Instrument;

use crate::domain::{EmailAddress, Submission};
use crate::email_client::MailTransport;
use crate::utils::error_chain_fmt;

/// Subject line of every owner notification
pub const NOTIFICATION_SUBJECT: &str = "New Contact Form Submission";

/// Notification error type
#[derive(thiserror::Error)]
pub enum NotificationError {
    #[error("Notifications are disabled: {0}")]
    Disabled(String),
    #[error("Failed to deliver the notification email")]
    Transport(#[source] anyhow::Error),
}

impl fmt::Debug for NotificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Rendered owner notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEmail {
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

impl NotificationEmail {
    /// Render both representations of a submission
    ///
    /// User-supplied fields are HTML-escaped before they reach the HTML body.
    pub fn render(submission: &Submission) -> Self {
        let name = submission.name.as_ref();
        let email = submission.email.as_ref();
        let message = submission.message.as_ref();

        let text_body = format!(
            "New contact form submission\n\nName: {name}\nEmail: {email}\nMessage:\n{message}\n"
        );
        let html_body = render_html(&encode_safe(name), &encode_safe(email), &encode_safe(message));

        Self {
            subject: NOTIFICATION_SUBJECT.into(),
            text_body,
            html_body,
        }
    }
}

/// Fill the HTML layout with already-escaped values
fn render_html(name: &str, email: &str, message: &str) -> String {
    format!(
        r#"<html>
  <body style="font-family: Arial, sans-serif; background:#fafbfc; margin:0; padding:30px;">
    <div style="max-width:480px; margin:auto; background:#fff; border-radius:8px; box-shadow:0 3px 12px #eee; padding:32px 24px;">
      <h2 style="color:#2552d0; margin-top:0;">New Contact Form Submission</h2>
      <table style="width:100%; margin:16px 0 24px 0; border-collapse:collapse;">
        <tr>
          <td style="font-weight:600; padding:8px 0; width:100px;">Name:</td>
          <td style="padding:8px 0;">{name}</td>
        </tr>
        <tr>
          <td style="font-weight:600; padding:8px 0;">Email:</td>
          <td style="padding:8px 0;">{email}</td>
        </tr>
        <tr>
          <td style="font-weight:600; padding:8px 0; vertical-align:top;">Message:</td>
          <td style="padding:8px 0; white-space:pre-wrap;">{message}</td>
        </tr>
      </table>
      <div style="color:#9da3ae; font-size:13px; border-top:1px solid #ededed; padding-top:24px; margin-top:24px;">
        <em>This message was sent from your website contact form.</em>
      </div>
    </div>
  </body>
</html>
"#
    )
}

/// Sends owner notifications, or explains why it cannot
pub enum Notifier {
    Enabled {
        transport: Arc<dyn MailTransport>,
        sender: EmailAddress,
        recipient: EmailAddress,
    },
    Disabled {
        reason: String,
    },
}

impl Notifier {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        sender: EmailAddress,
        recipient: EmailAddress,
    ) -> Self {
        Self::Enabled {
            transport,
            sender,
            recipient,
        }
    }

    /// A notifier that skips every notification, e.g. when mail settings are incomplete
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self::Disabled {
            reason: reason.into(),
        }
    }

    /// Make a single attempt at notifying the site owner about a submission
    #[tracing::instrument(
        name = "Notifying the site owner about a new submission",
        skip_all,
        fields(submitter_email = %submission.email)
    )]
    pub async fn notify(&self, submission: &Submission) -> Result<(), NotificationError> {
        match self {
            Self::Disabled { reason } => Err(NotificationError::Disabled(reason.clone())),
            Self::Enabled {
                transport,
                sender,
                recipient,
            } => {
                let email = NotificationEmail::render(submission);
                transport
                    .send(
                        &email.subject,
                        sender,
                        recipient,
                        &email.text_body,
                        &email.html_body,
                    )
                    .await
                    .map_err(NotificationError::Transport)
            }
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled {
                sender, recipient, ..
            } => f
                .debug_struct("Enabled")
                .field("sender", sender)
                .field("recipient", recipient)
                .finish_non_exhaustive(),
            Self::Disabled { reason } => f.debug_struct("Disabled").field("reason", reason).finish(),
        }
    }
}

/// Handle used by the request path to schedule notifications
#[derive(Clone, Debug)]
pub struct NotificationQueue {
    sender: mpsc::Sender<Submission>,
}

impl NotificationQueue {
    /// Schedule a notification without waiting
    ///
    /// Returns whether the submission was queued. A full or closed queue drops
    /// the notification; the caller's outcome is unaffected either way.
    pub fn schedule(&self, submission: Submission) -> bool {
        match self.sender.try_send(submission) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(submission)) => {
                tracing::error!(
                    submitter_email = %submission.email,
                    "Notification queue is full, dropping notification"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(submission)) => {
                tracing::error!(
                    submitter_email = %submission.email,
                    "Notification worker has stopped, dropping notification"
                );
                false
            }
        }
    }
}

/// Background worker draining the notification queue
#[derive(Debug)]
pub struct NotificationWorker {
    receiver: mpsc::Receiver<Submission>,
    notifier: Arc<Notifier>,
    in_flight: Arc<Semaphore>,
}

/// Create a bounded notification queue and the worker that consumes it
///
/// `capacity` bounds both the queued notifications and the sends in flight.
pub fn notification_channel(
    notifier: Arc<Notifier>,
    capacity: usize,
) -> (NotificationQueue, NotificationWorker) {
    let capacity = capacity.max(1);
    let (sender, receiver) = mpsc::channel(capacity);
    (
        NotificationQueue { sender },
        NotificationWorker {
            receiver,
            notifier,
            in_flight: Arc::new(Semaphore::new(capacity)),
        },
    )
}

impl NotificationWorker {
    /// Run the worker until every queue handle has been dropped
    ///
    /// Each notification runs as its own task so that a slow transport does
    /// not hold back the ones queued behind it. Once every send permit is
    /// taken the worker stops draining, and the queue fills up behind it.
    pub async fn run_until_stopped(mut self) {
        while let Some(submission) = self.receiver.recv().await {
            let Ok(permit) = Arc::clone(&self.in_flight).acquire_owned().await else {
                break;
            };
            let notifier = Arc::clone(&self.notifier);
            let span = tracing::info_span!("Notification task", submitter_email = %submission.email);
            tokio::spawn(
                async move {
                    log_outcome(notifier.notify(&submission).await);
                    drop(permit);
                }
                .instrument(span),
            );
        }
    }
}

/// Report a notification outcome; this is the only place it is observed
fn log_outcome(outcome: Result<(), NotificationError>) {
    match outcome {
        Ok(()) => tracing::info!("Notification email sent"),
        Err(e @ NotificationError::Disabled(_)) => {
            tracing::warn!(error.message = %e, "Skipping notification");
        }
        Err(e) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "Failed to notify the site owner"
            );
        }
    }
}
