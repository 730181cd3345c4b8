//! SQLite-based run history store

use crate::core::pipeline::PipelineKind;
use crate::core::state::RunStatus;
use crate::persistence::{PersistenceBackend, RunSummary, StepRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

/// SQLite run store
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    /// Create a new SQLite store, creating the database file if needed
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .context("Invalid database path")?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("greenroom");
        std::fs::create_dir_all(&db_dir)?;

        let db_path = db_dir.join("runs.db");
        Self::new(&db_path.to_string_lossy()).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                recipe TEXT NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                service_url TEXT,
                steps TEXT NOT NULL DEFAULT '[]',
                completed_steps INTEGER NOT NULL DEFAULT 0,
                total_steps INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_recipe ON runs(recipe);
            CREATE INDEX IF NOT EXISTS idx_status ON runs(status);
            CREATE INDEX IF NOT EXISTS idx_started_at ON runs(started_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn row_to_summary(row: &SqliteRow) -> Result<RunSummary> {
        let steps: Vec<StepRecord> = serde_json::from_str(&row.get::<String, _>("steps"))
            .context("Corrupt step records in run row")?;

        Ok(RunSummary {
            run_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            recipe: row.get("recipe"),
            kind: PipelineKind::from_label(&row.get::<String, _>("kind"))
                .unwrap_or(PipelineKind::Setup),
            status: match row.get::<String, _>("status").as_str() {
                "Pending" => RunStatus::Pending,
                "Running" => RunStatus::Running,
                "Completed" => RunStatus::Completed,
                "Failed" => RunStatus::Failed,
                "Cancelled" => RunStatus::Cancelled,
                _ => RunStatus::Pending,
            },
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: row
                .get::<Option<NaiveDateTime>, _>("completed_at")
                .map(Self::from_naive),
            service_url: row.get("service_url"),
            steps,
            completed_steps: row.get::<i64, _>("completed_steps") as usize,
            total_steps: row.get::<i64, _>("total_steps") as usize,
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteRunStore {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        let steps = serde_json::to_string(&run.steps)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, recipe, kind, status, started_at, completed_at, service_url, steps, completed_steps, total_steps)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(run.run_id.to_string())
        .bind(&run.recipe)
        .bind(run.kind.label())
        .bind(format!("{:?}", run.status))
        .bind(Self::to_naive(run.started_at))
        .bind(run.completed_at.map(Self::to_naive))
        .bind(&run.service_url)
        .bind(steps)
        .bind(run.completed_steps as i64)
        .bind(run.total_steps as i64)
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let row = sqlx::query(
            r#"
            SELECT id, recipe, kind, status, started_at, completed_at, service_url, steps, completed_steps, total_steps
            FROM runs
            WHERE id = ?1
            "#,
        )
        .bind(run_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load run")?;

        row.map(|row| Self::row_to_summary(&row)).transpose()
    }

    async fn list_runs(&self, recipe: Option<&str>, limit: usize) -> Result<Vec<RunSummary>> {
        let rows = match recipe {
            Some(name) => {
                sqlx::query(
                    r#"
                    SELECT id, recipe, kind, status, started_at, completed_at, service_url, steps, completed_steps, total_steps
                    FROM runs
                    WHERE recipe = ?1
                    ORDER BY started_at DESC
                    LIMIT ?2
                    "#,
                )
                .bind(name)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, recipe, kind, status, started_at, completed_at, service_url, steps, completed_steps, total_steps
                    FROM runs
                    ORDER BY started_at DESC
                    LIMIT ?1
                    "#,
                )
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to list runs")?;

        rows.iter().map(Self::row_to_summary).collect()
    }

    async fn latest_run(&self, recipe: &str, kind: PipelineKind) -> Result<Option<RunSummary>> {
        let row = sqlx::query(
            r#"
            SELECT id, recipe, kind, status, started_at, completed_at, service_url, steps, completed_steps, total_steps
            FROM runs
            WHERE recipe = ?1 AND kind = ?2
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(recipe)
        .bind(kind.label())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get latest run")?;

        row.map(|row| Self::row_to_summary(&row)).transpose()
    }

    async fn list_recipes(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT recipe
            FROM runs
            ORDER BY recipe ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list recipes")?;

        Ok(rows.iter().map(|row| row.get("recipe")).collect())
    }
}
