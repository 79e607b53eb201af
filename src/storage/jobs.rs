use anyhow::{anyhow, Result};

use super::schema::Database;
use super::types::{Job, JobEvent, JobEventType, JobProgress, JobType};

impl Database {
    // ========================================================================
    // Job Operations
    // ========================================================================

    /// Create a job started now, with no end date.
    pub async fn create_job(&self, user_id: i64, job_type: JobType) -> Result<Job> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (user_id, job_type, start_date)
            VALUES (?, ?, ?)
            RETURNING id, user_id, job_type, start_date, end_date
            "#,
        )
        .bind(user_id)
        .bind(job_type.as_str())
        .bind(chrono::Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await?;
        Ok(job)
    }

    /// Set the end date of a job. A job that already ended keeps its date.
    pub async fn finish_job(&self, job_id: i64) -> Result<()> {
        sqlx::query("UPDATE jobs SET end_date = ? WHERE id = ? AND end_date IS NULL")
            .bind(chrono::Utc::now().timestamp())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_job(&self, job_id: i64) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            "SELECT id, user_id, job_type, start_date, end_date FROM jobs WHERE id = ?",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    /// Jobs of a user, most recent first.
    pub async fn get_jobs(&self, user_id: i64) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(
            "SELECT id, user_id, job_type, start_date, end_date FROM jobs WHERE user_id = ? ORDER BY id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    // ========================================================================
    // Job Event Operations
    // ========================================================================

    /// Append an event to a job's log. Events are never updated afterwards.
    pub async fn append_job_event(
        &self,
        job_id: i64,
        event_type: JobEventType,
        message: &str,
    ) -> Result<JobEvent> {
        let event = sqlx::query_as::<_, JobEvent>(
            r#"
            INSERT INTO job_events (job_id, event_type, message, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, job_id, event_type, message, created_at
            "#,
        )
        .bind(job_id)
        .bind(event_type.as_str())
        .bind(message)
        .bind(chrono::Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await?;
        Ok(event)
    }

    /// A job's events in append order.
    pub async fn get_job_events(&self, job_id: i64) -> Result<Vec<JobEvent>> {
        let events = sqlx::query_as::<_, JobEvent>(
            "SELECT id, job_id, event_type, message, created_at FROM job_events WHERE job_id = ? ORDER BY id",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    /// Progress of a job computed from its summary and per-item events.
    pub async fn job_progress(&self, job_id: i64) -> Result<JobProgress> {
        let job = self
            .get_job(job_id)
            .await?
            .ok_or_else(|| anyhow!("Job {} not found", job_id))?;
        let events = self.get_job_events(job_id).await?;

        let mut progress = JobProgress {
            job_id,
            feed_count: 0,
            starred_count: 0,
            processed: 0,
            succeeded: 0,
            failed: 0,
            finished: job.end_date.is_some(),
        };

        for event in &events {
            let Some(kind) = event.kind() else {
                tracing::debug!(job_id, event_type = %event.event_type, "Unknown job event type");
                continue;
            };
            match kind {
                JobEventType::FeedCount => {
                    progress.feed_count = event.message.parse().unwrap_or(0);
                }
                JobEventType::StarredArticleCount => {
                    progress.starred_count = event.message.parse().unwrap_or(0);
                }
                kind => {
                    progress.processed += 1;
                    if kind.is_failure() {
                        progress.failed += 1;
                    } else {
                        progress.succeeded += 1;
                    }
                }
            }
        }

        Ok(progress)
    }
}
