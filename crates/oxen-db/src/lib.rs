//! Typed wrapper over the `oxen_queue` table.
//!
//! `Store` encapsulates every statement the engine issues against Postgres:
//! enqueue, the tag-then-read claim protocol, finalize, requeue, and the
//! stuck-job scan/recover pair. Nothing above this crate writes raw SQL.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use oxen_core::{EnqueueOutcome, Job, JobStatus, NewJob};

pub const ENV_DB_URL: &str = "OXEN_DATABASE_URL";
pub const DEFAULT_TABLE: &str = "oxen_queue";

/// Connect to Postgres using `OXEN_DATABASE_URL`, sized for `max_connections`
/// concurrent users. Callers MUST size this to at least
/// `sum(concurrency across local Controllers) + 2` —
/// `oxen-config` enforces that arithmetic at startup; this function just
/// takes the final number.
pub async fn connect_from_env(max_connections: u32) -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")
}

/// Test helper: connect using `OXEN_DATABASE_URL` and ensure migrations are applied.
pub async fn testkit_db_pool() -> Result<PgPool> {
    let pool = connect_from_env(10).await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_queue_table: bool,
}

/// Connectivity + schema-presence check, used by `oxen-cli db status`.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as(
        r#"
        select exists (
            select 1 from information_schema.tables
            where table_schema = 'public' and table_name = $1
        )
        "#,
    )
    .bind(DEFAULT_TABLE)
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_queue_table: exists,
    })
}

/// Validate that every configured extra field has a matching column on the
/// queue table. Called once at `Controller::start_processing` — a missing
/// column is a fatal configuration error caught at startup rather than on
/// the first enqueue.
pub async fn assert_extra_fields_are_columns(pool: &PgPool, extra_fields: &[String]) -> Result<()> {
    for field in extra_fields {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            select exists (
                select 1 from information_schema.columns
                where table_schema = 'public' and table_name = $1 and column_name = $2
            )
            "#,
        )
        .bind(DEFAULT_TABLE)
        .bind(field)
        .fetch_one(pool)
        .await
        .context("extra-field column-existence check failed")?;

        if !exists {
            anyhow::bail!(
                "extraFields declares '{field}' but {DEFAULT_TABLE} has no such column"
            );
        }
    }
    Ok(())
}

/// Typed handle over `oxen_queue`, bound to a Postgres pool and (optionally)
/// a configured list of extra JSON keys projected into identically named
/// columns at enqueue time.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    extra_fields: Vec<String>,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            extra_fields: Vec::new(),
        }
    }

    pub fn with_extra_fields(mut self, extra_fields: Vec<String>) -> Self {
        self.extra_fields = extra_fields;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn extra_fields(&self) -> &[String] {
        &self.extra_fields
    }

    /// Enqueue a single job. A `unique_key` conflict is reported as
    /// `Deduplicated`, not an error.
    pub async fn enqueue(&self, job: &NewJob) -> Result<EnqueueOutcome> {
        let priority = job.priority.unwrap_or_else(|| Utc::now().timestamp_millis());
        let start_time = job.start_time.unwrap_or_else(Utc::now);
        let body_text = job.body.to_string();

        let (cols, placeholders, extras) = self.extra_field_insert_fragments(&job.body, 6);
        let sql = format!(
            r#"
            insert into {table} (job_type, body, priority, created_ts, status, unique_key{cols})
            values ($1, $2, $3, $4, 'waiting', $5{placeholders})
            on conflict do nothing
            returning id
            "#,
            table = DEFAULT_TABLE,
        );

        let mut q = sqlx::query(&sql)
            .bind(&job.job_type)
            .bind(&body_text)
            .bind(priority)
            .bind(start_time)
            .bind(job.unique_key.map(|k| k as i32));
        for extra in extras {
            q = q.bind(extra);
        }

        let row = q
            .fetch_optional(&self.pool)
            .await
            .context("enqueue failed")?;

        Ok(match row {
            Some(row) => EnqueueOutcome::Inserted(row.try_get::<i64, _>("id")?),
            None => EnqueueOutcome::Deduplicated,
        })
    }

    /// Enqueue a batch in a single multi-row insert. Non-conflicting rows
    /// are persisted; a duplicate live `unique_key` is silently dropped.
    pub async fn enqueue_many(&self, jobs: &[NewJob]) -> Result<Vec<EnqueueOutcome>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.context("enqueue_many begin")?;
        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in jobs {
            let priority = job.priority.unwrap_or_else(|| Utc::now().timestamp_millis());
            let start_time = job.start_time.unwrap_or_else(Utc::now);
            let body_text = job.body.to_string();

            let row: Option<(i64,)> = sqlx::query_as(
                r#"
                insert into oxen_queue (job_type, body, priority, created_ts, status, unique_key)
                values ($1, $2, $3, $4, 'waiting', $5)
                on conflict do nothing
                returning id
                "#,
            )
            .bind(&job.job_type)
            .bind(&body_text)
            .bind(priority)
            .bind(start_time)
            .bind(job.unique_key.map(|k| k as i32))
            .fetch_optional(&mut *tx)
            .await
            .context("enqueue_many row insert failed")?;

            outcomes.push(match row {
                Some((id,)) => EnqueueOutcome::Inserted(id),
                None => EnqueueOutcome::Deduplicated,
            });
        }
        tx.commit().await.context("enqueue_many commit")?;
        Ok(outcomes)
    }

    fn extra_field_insert_fragments(
        &self,
        body: &serde_json::Value,
        start_index: usize,
    ) -> (String, String, Vec<Option<String>>) {
        if self.extra_fields.is_empty() {
            return (String::new(), String::new(), Vec::new());
        }
        let mut cols = String::new();
        let mut placeholders = String::new();
        let mut values = Vec::with_capacity(self.extra_fields.len());
        for (i, field) in self.extra_fields.iter().enumerate() {
            cols.push_str(", ");
            cols.push_str(field);
            placeholders.push_str(&format!(", ${}", start_index + i));
            let v = body.get(field).map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            values.push(v);
        }
        (cols, placeholders, values)
    }

    /// The hot path: tag-then-read claim. Mints a fresh `batch_id` from a
    /// dedicated sequence, then a single `UPDATE ... RETURNING` whose inner
    /// `SELECT ... FOR UPDATE SKIP LOCKED ORDER BY priority ASC LIMIT N` does
    /// the eligible-row selection —
    /// Postgres lets the tag and read-back steps collapse into one round
    /// trip while still satisfying "batch_id is the sole claim handle".
    pub async fn claim_batch(&self, job_type: &str, n: i64) -> Result<Vec<Job>> {
        if n <= 0 {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.context("claim_batch begin")?;

        let (batch_id,): (i64,) = sqlx::query_as("select nextval('oxen_batch_id_seq')")
            .fetch_one(&mut *tx)
            .await
            .context("claim_batch batch_id allocation failed")?;

        let rows = sqlx::query(
            r#"
            with to_claim as (
                select id
                from oxen_queue
                where job_type = $1
                  and status = 'waiting'
                  and batch_id is null
                  and (created_ts <= now())
                order by priority asc
                limit $2
                for update skip locked
            )
            update oxen_queue
               set batch_id = $3,
                   started_ts = now(),
                   status = 'processing'
             where id in (select id from to_claim)
            returning id, job_type, status, body, priority, created_ts, batch_id,
                      unique_key, started_ts, result, recovered, running_time
            "#,
        )
        .bind(job_type)
        .bind(n)
        .bind(batch_id)
        .fetch_all(&mut *tx)
        .await
        .context("claim_batch tag-and-return failed")?;

        tx.commit().await.context("claim_batch commit")?;

        rows.iter().map(row_to_job).collect()
    }

    /// Finalize a success outcome. Leaves `batch_id` untouched for forensics.
    pub async fn finalize_success(&self, id: i64, result: &serde_json::Value) -> Result<bool> {
        self.finalize(id, JobStatus::Success, result).await
    }

    /// Finalize an error (or timeout) outcome.
    pub async fn finalize_error(&self, id: i64, error: &serde_json::Value) -> Result<bool> {
        self.finalize(id, JobStatus::Error, error).await
    }

    async fn finalize(&self, id: i64, status: JobStatus, result: &serde_json::Value) -> Result<bool> {
        let res = sqlx::query(
            r#"
            update oxen_queue
               set status = $2,
                   result = $3,
                   running_time = extract(epoch from (now() - started_ts))::int
             where id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(result.to_string())
        .execute(&self.pool)
        .await
        .with_context(|| format!("finalize({status}) failed for job {id}"))?;

        Ok(res.rows_affected() > 0)
    }

    /// Requeue a job for retry: `waiting`, claim cleared, eligibility moved
    /// `delay` into the future.
    pub async fn requeue(&self, id: i64, delay: chrono::Duration) -> Result<bool> {
        let res = sqlx::query(
            r#"
            update oxen_queue
               set status = 'waiting',
                   batch_id = null,
                   created_ts = now() + $2
             where id = $1
            "#,
        )
        .bind(id)
        .bind(delay)
        .execute(&self.pool)
        .await
        .with_context(|| format!("requeue failed for job {id}"))?;

        Ok(res.rows_affected() > 0)
    }

    /// Select ids of rows stranded in `processing` past `threshold`.
    pub async fn scan_stuck(&self, job_type: &str, threshold: chrono::Duration) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            select id from oxen_queue
            where job_type = $1
              and status = 'processing'
              and started_ts < now() - $2
            "#,
        )
        .bind(job_type)
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .context("scan_stuck failed")?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Flip stranded rows back to `waiting`, clear `batch_id`, mark
    /// `recovered`. Returns how many rows moved.
    pub async fn recover_stuck(&self, job_type: &str, threshold: chrono::Duration) -> Result<u64> {
        let res = sqlx::query(
            r#"
            update oxen_queue
               set status = 'waiting',
                   batch_id = null,
                   recovered = true
             where job_type = $1
               and status = 'processing'
               and started_ts < now() - $2
            "#,
        )
        .bind(job_type)
        .bind(threshold)
        .execute(&self.pool)
        .await
        .context("recover_stuck failed")?;
        Ok(res.rows_affected())
    }

    /// Fetch a single row by id — used by tests and `debug()` snapshots.
    pub async fn fetch(&self, id: i64) -> Result<Option<Job>> {
        let row = sqlx::query(
            r#"
            select id, job_type, status, body, priority, created_ts, batch_id,
                   unique_key, started_ts, result, recovered, running_time
            from oxen_queue where id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetch failed")?;

        row.map(|r| row_to_job(&r)).transpose()
    }
}

fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<Job> {
    let status_str: String = row.try_get("status")?;
    let body_text: String = row.try_get("body")?;
    let result_text: Option<String> = row.try_get("result")?;
    let created_ts: DateTime<Utc> = row.try_get("created_ts")?;

    Ok(Job {
        id: row.try_get("id")?,
        job_type: row.try_get("job_type")?,
        status: JobStatus::parse(&status_str)?,
        body: serde_json::from_str(&body_text).context("job body is not valid JSON")?,
        priority: row.try_get("priority")?,
        start_time: created_ts,
        batch_id: row.try_get("batch_id")?,
        unique_key: row
            .try_get::<Option<i32>, _>("unique_key")?
            .map(|k| k as u32),
        started_ts: row.try_get("started_ts")?,
        result: result_text
            .map(|s| serde_json::from_str(&s).context("job result is not valid JSON"))
            .transpose()?,
        recovered: row.try_get("recovered")?,
        running_time: row.try_get("running_time")?,
    })
}
