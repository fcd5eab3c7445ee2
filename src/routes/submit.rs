use std::fmt;

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use tracing::field::display;
use tracing::Span;

use crate::domain::Submission;
use crate::notifier::NotificationQueue;
use crate::startup::InsertDeadline;
use crate::store::{insert_with_deadline, MessageStore, PersistenceError};
use crate::utils::error_chain_fmt;

/// Status reported to the caller once a submission is stored
pub const SUCCESS_STATUS: &str = "Message saved successfully";

/// JSON body of the contact form
#[derive(serde::Deserialize)]
pub struct FormData {
    name: Option<String>,
    email: Option<String>,
    message: Option<String>,
}

impl TryFrom<FormData> for Submission {
    type Error = String;

    fn try_from(value: FormData) -> Result<Self, Self::Error> {
        let name = value.name.ok_or("name is required")?;
        let email = value.email.ok_or("email is required")?;
        let message = value.message.ok_or("message is required")?;
        Self::parse(name, email, message)
    }
}

/// Submission error type
#[derive(thiserror::Error)]
pub enum SubmitError {
    #[error("{0}")]
    ValidationError(String),
    #[error("Failed to save message")]
    PersistenceError(#[source] PersistenceError),
}

impl fmt::Debug for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for SubmitError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::PersistenceError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": self.to_string() }))
    }
}

/// JSON extractor configuration for the submission endpoint
///
/// Malformed or oversized bodies are reported with the same error envelope
/// as field validation failures. The content type is not enforced, since
/// browsers posting `text/plain` skip the preflight round trip.
pub fn submission_json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .content_type_required(false)
        .error_handler(|err, _req: &HttpRequest| {
            SubmitError::ValidationError(err.to_string()).into()
        })
}

/// Contact form submission handler
///
/// Responds as soon as the submission is durably stored. The owner
/// notification is queued and never awaited.
#[tracing::instrument(
    name = "Accepting a contact form submission",
    skip(form, store, notifications, deadline),
    fields(
        submitter_name = tracing::field::Empty,
        submitter_email = tracing::field::Empty
    )
)]
pub async fn submit(
    form: web::Json<FormData>,
    store: web::Data<dyn MessageStore>,
    notifications: web::Data<NotificationQueue>,
    deadline: web::Data<InsertDeadline>,
) -> Result<HttpResponse, SubmitError> {
    // Validate before touching the store
    let submission: Submission = form.0.try_into().map_err(SubmitError::ValidationError)?;
    Span::current()
        .record("submitter_name", display(submission.name.as_ref()))
        .record("submitter_email", display(&submission.email));

    insert_with_deadline(store.get_ref(), &submission, deadline.0)
        .await
        .map_err(SubmitError::PersistenceError)?;

    // Ownership of the submission moves to the notification worker
    notifications.schedule(submission);

    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": SUCCESS_STATUS })))
}

/// Answer an `OPTIONS` request the CORS middleware lets through
///
/// Full preflights are handled by the middleware; anything else, such as an
/// `OPTIONS` without `Access-Control-Request-Method`, still gets an empty 200.
pub async fn preflight() -> HttpResponse {
    HttpResponse::Ok().finish()
}
