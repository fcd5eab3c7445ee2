use std::{fmt, time};

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::Submission;
use crate::utils::error_chain_fmt;

/// Acknowledgement of a durable write
#[derive(Debug, Clone, Copy)]
pub struct StoreAck {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
}

/// Persistence error type
#[derive(thiserror::Error)]
pub enum PersistenceError {
    #[error("The store did not acknowledge the insert within {0:?}")]
    Timeout(time::Duration),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl fmt::Debug for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Write-only, single-record storage for submissions
///
/// Implementations assign the record id and the `received_at` timestamp
/// themselves, right before writing.
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, submission: &Submission) -> anyhow::Result<StoreAck>;
}

/// Insert a submission, giving up once `deadline` has elapsed
///
/// The underlying write is dropped on timeout; whether the store eventually
/// completes it is not observed.
#[tracing::instrument(
    name = "Saving new submission in the store",
    skip(store, submission),
    fields(submission_id = tracing::field::Empty)
)]
pub async fn insert_with_deadline(
    store: &dyn MessageStore,
    submission: &Submission,
    deadline: time::Duration,
) -> Result<StoreAck, PersistenceError> {
    let ack = tokio::time::timeout(deadline, store.insert(submission))
        .await
        .map_err(|_| PersistenceError::Timeout(deadline))??;
    tracing::Span::current().record("submission_id", tracing::field::display(ack.id));
    Ok(ack)
}

/// PostgreSQL-backed message store
#[derive(Clone, Debug)]
pub struct PgMessageStore {
    db_pool: PgPool,
}

impl PgMessageStore {
    pub const fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait::async_trait]
impl MessageStore for PgMessageStore {
    async fn insert(&self, submission: &Submission) -> anyhow::Result<StoreAck> {
        let ack = StoreAck {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
        };
        sqlx::query(
            r#"
            INSERT INTO messages (id, name, email, message, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(ack.id)
        .bind(submission.name.as_ref())
        .bind(submission.email.as_ref())
        .bind(submission.message.as_ref())
        .bind(ack.received_at)
        .execute(&self.db_pool)
        .await
        .context("Failed to insert submission into the messages table")?;
        Ok(ack)
    }
}
