use crate::job::{
    ErrorStatus, JobEvent, JobId, JobState, NewTransferItem, NewTransferJob, TransferItem,
    TransferJob,
};
use crate::store::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

const JOB_COLUMNS: &str = "id, kind, source_path, target_path, resource, credentials, state, \
     error_status, last_successful_path, global_error, global_error_trace, created_at, started_at";

const ITEM_COLUMNS: &str =
    "id, job_id, source_path, target_path, is_directory, is_error, error_message, transferred_at";

/// Durable queue state. Every public operation runs in its own transaction.
///
/// The pool is capped at one connection, so transactions are serialized and a
/// read-modify-write never interleaves with another writer.
pub struct TransferStore {
    pool: SqlitePool,
}

impl TransferStore {
    /// Open (or create) the queue database at `database_url`
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transfer_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                source_path TEXT NOT NULL,
                target_path TEXT NOT NULL,
                resource TEXT NOT NULL,
                credentials TEXT NOT NULL,
                state TEXT NOT NULL,
                error_status TEXT NOT NULL,
                last_successful_path TEXT NOT NULL DEFAULT '',
                global_error TEXT NOT NULL DEFAULT '',
                global_error_trace TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                started_at INTEGER
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transfer_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id INTEGER NOT NULL REFERENCES transfer_jobs(id) ON DELETE CASCADE,
                source_path TEXT NOT NULL,
                target_path TEXT NOT NULL,
                is_directory INTEGER NOT NULL,
                is_error INTEGER NOT NULL,
                error_message TEXT NOT NULL DEFAULT '',
                transferred_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        // Indexes for the queue views
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_state ON transfer_jobs(state)")
            .execute(&pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_error ON transfer_jobs(error_status)")
            .execute(&pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_created ON transfer_jobs(created_at)")
            .execute(&pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_job ON transfer_items(job_id)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// Create store with in-memory database (for testing)
    pub async fn new_in_memory() -> StoreResult<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Persist a new job in ENQUEUED/OK and return its id
    pub async fn enqueue(&self, job: &NewTransferJob) -> StoreResult<JobId> {
        let credentials = serde_json::to_string(&job.account)?;

        let result = sqlx::query(
            r#"
            INSERT INTO transfer_jobs
            (kind, source_path, target_path, resource, credentials, state, error_status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.kind.as_str())
        .bind(&job.source_path)
        .bind(&job.target_path)
        .bind(&job.resource)
        .bind(credentials)
        .bind(JobState::Enqueued.as_str())
        .bind(ErrorStatus::Ok.as_str())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find(&self, id: JobId) -> StoreResult<Option<TransferJob>> {
        let mut conn = self.pool.acquire().await?;
        fetch_job(&mut conn, id).await
    }

    /// ENQUEUED and PROCESSING jobs, oldest first
    pub async fn current_queue(&self) -> StoreResult<Vec<TransferJob>> {
        self.list(
            &format!(
                "SELECT {JOB_COLUMNS} FROM transfer_jobs WHERE state IN (?, ?) \
                 ORDER BY created_at ASC, id ASC"
            ),
            &[JobState::Enqueued.as_str(), JobState::Processing.as_str()],
        )
        .await
    }

    /// PROCESSING plus terminal jobs not yet purged, newest first
    pub async fn recent_queue(&self) -> StoreResult<Vec<TransferJob>> {
        self.list(
            &format!(
                "SELECT {JOB_COLUMNS} FROM transfer_jobs WHERE state IN (?, ?, ?) \
                 ORDER BY created_at DESC, id DESC"
            ),
            &[
                JobState::Processing.as_str(),
                JobState::Complete.as_str(),
                JobState::Cancelled.as_str(),
            ],
        )
        .await
    }

    /// The most recent `n` jobs in any state, newest first
    pub async fn last_n(&self, n: u32) -> StoreResult<Vec<TransferJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM transfer_jobs ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(i64::from(n))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(job_from_row).collect()
    }

    pub async fn error_queue(&self) -> StoreResult<Vec<TransferJob>> {
        self.by_error_status(ErrorStatus::Error).await
    }

    pub async fn warning_queue(&self) -> StoreResult<Vec<TransferJob>> {
        self.by_error_status(ErrorStatus::Warning).await
    }

    /// Items of a job in completion order; empty for an unknown id
    pub async fn items_for(&self, job_id: JobId) -> StoreResult<Vec<TransferItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM transfer_items WHERE job_id = ? ORDER BY id ASC"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }

    pub async fn error_items_for(&self, job_id: JobId) -> StoreResult<Vec<TransferItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM transfer_items WHERE job_id = ? AND is_error = 1 \
             ORDER BY id ASC"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }

    pub async fn mark_processing(&self, id: JobId) -> StoreResult<TransferJob> {
        self.transition(id, |job| job.apply(JobEvent::Dequeued { at: Utc::now() }))
            .await
    }

    pub async fn mark_complete(&self, id: JobId, status: ErrorStatus) -> StoreResult<TransferJob> {
        self.transition(id, |job| job.apply(JobEvent::Completed(status)))
            .await
    }

    pub async fn mark_error_and_terminate(
        &self,
        id: JobId,
        message: &str,
        trace: &str,
    ) -> StoreResult<TransferJob> {
        self.transition(id, |job| job.apply(JobEvent::Failed { message, trace }))
            .await
    }

    /// Append one file result; a successful file advances the checkpoint and
    /// a failed one escalates the job to at least WARNING.
    pub async fn append_item(
        &self,
        job_id: JobId,
        item: &NewTransferItem,
    ) -> StoreResult<(TransferJob, TransferItem)> {
        let mut tx = self.pool.begin().await?;
        let mut job = fetch_job(&mut tx, job_id)
            .await?
            .ok_or(StoreError::NotFound(job_id))?;

        let result = sqlx::query(
            r#"
            INSERT INTO transfer_items
            (job_id, source_path, target_path, is_directory, is_error, error_message, transferred_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job_id)
        .bind(&item.source_path)
        .bind(&item.target_path)
        .bind(item.is_directory)
        .bind(item.is_error)
        .bind(&item.error_message)
        .bind(item.transferred_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        let event = if item.is_error {
            JobEvent::FileFailed
        } else {
            JobEvent::FileSucceeded {
                path: &item.source_path,
            }
        };
        if job.apply(event) {
            update_job(&mut tx, &job).await?;
        }

        tx.commit().await?;

        let stored = TransferItem {
            id: result.last_insert_rowid(),
            job_id,
            source_path: item.source_path.clone(),
            target_path: item.target_path.clone(),
            is_directory: item.is_directory,
            is_error: item.is_error,
            error_message: item.error_message.clone(),
            transferred_at: item.transferred_at,
        };
        Ok((job, stored))
    }

    /// Re-enqueue keeping the checkpoint and item history
    pub async fn restart(&self, id: JobId) -> StoreResult<TransferJob> {
        self.transition(id, |job| job.apply(JobEvent::Restarted)).await
    }

    /// Re-enqueue from scratch: clears the checkpoint and deletes all items
    pub async fn resubmit(&self, id: JobId) -> StoreResult<TransferJob> {
        let mut tx = self.pool.begin().await?;
        let mut job = fetch_job(&mut tx, id)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        if job.apply(JobEvent::Resubmitted) {
            sqlx::query("DELETE FROM transfer_items WHERE job_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            update_job(&mut tx, &job).await?;
        }

        tx.commit().await?;
        Ok(job)
    }

    /// CANCELLED from ENQUEUED or PROCESSING; terminal jobs are left as they are
    pub async fn cancel(&self, id: JobId) -> StoreResult<TransferJob> {
        self.transition(id, |job| job.apply(JobEvent::Cancelled)).await
    }

    /// Delete every COMPLETE job (any error status) together with its items
    pub async fn purge(&self) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM transfer_items WHERE job_id IN \
             (SELECT id FROM transfer_jobs WHERE state = ?)",
        )
        .bind(JobState::Complete.as_str())
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM transfer_jobs WHERE state = ?")
            .bind(JobState::Complete.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Claim the oldest ENQUEUED job, moving it to PROCESSING in the same
    /// transaction as the read.
    pub async fn dequeue_next(&self) -> StoreResult<Option<TransferJob>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM transfer_jobs WHERE state = ? \
             ORDER BY created_at ASC, id ASC LIMIT 1"
        ))
        .bind(JobState::Enqueued.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let mut job = job_from_row(&row)?;
        job.apply(JobEvent::Dequeued { at: Utc::now() });
        update_job(&mut tx, &job).await?;

        tx.commit().await?;
        Ok(Some(job))
    }

    /// Put jobs left PROCESSING by a previous run back in the queue
    pub async fn recover_interrupted(&self) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM transfer_jobs WHERE state = ?"
        ))
        .bind(JobState::Processing.as_str())
        .fetch_all(&mut *tx)
        .await?;

        let mut recovered = 0u64;
        for row in rows {
            let mut job = job_from_row(&row)?;
            if job.apply(JobEvent::Interrupted) {
                update_job(&mut tx, &job).await?;
                recovered += 1;
            }
        }

        tx.commit().await?;
        Ok(recovered)
    }

    pub async fn count_in_state(&self, state: JobState) -> StoreResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM transfer_jobs WHERE state = ?")
            .bind(state.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("count")?)
    }

    /// Close database connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn by_error_status(&self, status: ErrorStatus) -> StoreResult<Vec<TransferJob>> {
        self.list(
            &format!(
                "SELECT {JOB_COLUMNS} FROM transfer_jobs WHERE error_status = ? \
                 ORDER BY created_at DESC, id DESC"
            ),
            &[status.as_str()],
        )
        .await
    }

    async fn list(&self, sql: &str, binds: &[&str]) -> StoreResult<Vec<TransferJob>> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(*value);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(job_from_row).collect()
    }

    /// Load, mutate and write back one job inside a single transaction
    async fn transition<F>(&self, id: JobId, apply: F) -> StoreResult<TransferJob>
    where
        F: FnOnce(&mut TransferJob) -> bool,
    {
        let mut tx = self.pool.begin().await?;
        let mut job = fetch_job(&mut tx, id)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        if apply(&mut job) {
            update_job(&mut tx, &job).await?;
        }

        tx.commit().await?;
        Ok(job)
    }
}

async fn fetch_job(conn: &mut SqliteConnection, id: JobId) -> StoreResult<Option<TransferJob>> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM transfer_jobs WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

async fn update_job(conn: &mut SqliteConnection, job: &TransferJob) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE transfer_jobs
        SET state = ?, error_status = ?, last_successful_path = ?,
            global_error = ?, global_error_trace = ?, started_at = ?
        WHERE id = ?
        "#,
    )
    .bind(job.state.as_str())
    .bind(job.error_status.as_str())
    .bind(&job.last_successful_path)
    .bind(&job.global_error)
    .bind(&job.global_error_trace)
    .bind(job.started_at.map(|at| at.timestamp_millis()))
    .bind(job.id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn job_from_row(row: &SqliteRow) -> StoreResult<TransferJob> {
    Ok(TransferJob {
        id: row.try_get("id")?,
        kind: row.try_get::<String, _>("kind")?.parse()?,
        source_path: row.try_get("source_path")?,
        target_path: row.try_get("target_path")?,
        resource: row.try_get("resource")?,
        account: serde_json::from_str(&row.try_get::<String, _>("credentials")?)?,
        state: row.try_get::<String, _>("state")?.parse()?,
        error_status: row.try_get::<String, _>("error_status")?.parse()?,
        last_successful_path: row.try_get("last_successful_path")?,
        global_error: row.try_get("global_error")?,
        global_error_trace: row.try_get("global_error_trace")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        started_at: row
            .try_get::<Option<i64>, _>("started_at")?
            .map(from_millis)
            .transpose()?,
    })
}

fn item_from_row(row: &SqliteRow) -> StoreResult<TransferItem> {
    Ok(TransferItem {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        source_path: row.try_get("source_path")?,
        target_path: row.try_get("target_path")?,
        is_directory: row.try_get("is_directory")?,
        is_error: row.try_get("is_error")?,
        error_message: row.try_get("error_message")?,
        transferred_at: from_millis(row.try_get("transferred_at")?)?,
    })
}

fn from_millis(millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {millis}")))
}
