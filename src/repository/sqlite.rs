use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{migrate::MigrateDatabase, Row, Sqlite};
use tracing::info;
use uuid::Uuid;

use super::{checkpoints_from_defs, RepositoryError, StatusUpdate, WorkflowRepository};
use crate::ids::{CheckpointId, WorkOrderId};
use crate::templates::CheckpointDef;
use crate::work_orders::{Checkpoint, CheckpointStatus, WorkOrder, WorkOrderHeader};

const CHECKPOINT_COLUMNS: &str =
    "id, work_order_id, ord, name, owner_dept_id, status, started_at, ended_at";

/// SQLite-backed repository. The conditional status write is one UPDATE
/// statement, so it stays atomic across engine instances sharing the file.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Connect, creating the database file if needed and optionally running migrations
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        auto_migrate: bool,
    ) -> Result<Self, RepositoryError> {
        if !Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        if auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
    }

    async fn checkpoints_of(&self, work_order_id: &WorkOrderId) -> Result<Vec<Checkpoint>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints WHERE work_order_id = ?1 ORDER BY ord ASC"
        ))
        .bind(work_order_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(checkpoint_from_row).collect()
    }
}

fn format_timestamp(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

fn parse_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| RepositoryError::Corrupt(format!("bad timestamp '{raw}': {e}")))
        })
        .transpose()
}

fn parse_uuid(raw: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(raw).map_err(|e| RepositoryError::Corrupt(format!("bad id '{raw}': {e}")))
}

fn checkpoint_from_row(row: &SqliteRow) -> Result<Checkpoint, RepositoryError> {
    let id: String = row.try_get("id")?;
    let work_order_id: String = row.try_get("work_order_id")?;
    let owner: String = row.try_get("owner_dept_id")?;
    let status: String = row.try_get("status")?;

    Ok(Checkpoint {
        id: CheckpointId(parse_uuid(&id)?),
        work_order_id: WorkOrderId(parse_uuid(&work_order_id)?),
        order: row.try_get("ord")?,
        name: row.try_get("name")?,
        owner_dept_id: owner.into(),
        status: status.parse::<CheckpointStatus>().map_err(RepositoryError::Corrupt)?,
        started_at: parse_timestamp(row.try_get("started_at")?)?,
        ended_at: parse_timestamp(row.try_get("ended_at")?)?,
    })
}

fn header_from_row(row: &SqliteRow) -> Result<WorkOrderHeader, RepositoryError> {
    let id: String = row.try_get("id")?;
    let priority: String = row.try_get("priority")?;
    let created_by: String = row.try_get("created_by")?;
    let created_at: Option<String> = row.try_get("created_at")?;

    Ok(WorkOrderHeader {
        id: WorkOrderId(parse_uuid(&id)?),
        company: row.try_get("company")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        priority: priority.parse().map_err(RepositoryError::Corrupt)?,
        deadline: parse_timestamp(row.try_get("deadline")?)?,
        created_by: created_by.into(),
        created_at: parse_timestamp(created_at)?
            .ok_or_else(|| RepositoryError::Corrupt(format!("work order {id} has no created_at")))?,
    })
}

#[async_trait]
impl WorkflowRepository for SqliteRepository {
    async fn load_checkpoint_with_siblings(
        &self,
        id: &CheckpointId,
    ) -> Result<Option<(Checkpoint, Vec<Checkpoint>)>, RepositoryError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CHECKPOINT_COLUMNS} FROM checkpoints
            WHERE work_order_id = (SELECT work_order_id FROM checkpoints WHERE id = ?1)
            ORDER BY ord ASC
            "#
        ))
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let siblings = rows
            .iter()
            .map(checkpoint_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(siblings
            .iter()
            .find(|checkpoint| &checkpoint.id == id)
            .cloned()
            .map(|checkpoint| (checkpoint, siblings)))
    }

    async fn compare_and_swap_status(&self, update: &StatusUpdate) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE checkpoints
            SET status = ?1, started_at = ?2, ended_at = ?3
            WHERE id = ?4
              AND status = ?5
              AND (?6 = 0 OR NOT EXISTS (
                  SELECT 1 FROM checkpoints AS predecessor
                  WHERE predecessor.work_order_id = checkpoints.work_order_id
                    AND predecessor.ord < checkpoints.ord
                    AND predecessor.status != 'COMPLETED'
              ))
            "#,
        )
        .bind(update.new_status.as_str())
        .bind(format_timestamp(update.started_at))
        .bind(format_timestamp(update.ended_at))
        .bind(update.checkpoint_id.to_string())
        .bind(update.expected.as_str())
        .bind(update.require_completed_predecessors)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_work_order(&self, header: &WorkOrderHeader) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO work_orders (id, company, title, description, priority, deadline, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(header.id.to_string())
        .bind(&header.company)
        .bind(&header.title)
        .bind(&header.description)
        .bind(header.priority.as_str())
        .bind(format_timestamp(header.deadline))
        .bind(header.created_by.as_str())
        .bind(format_timestamp(Some(header.created_at)))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(RepositoryError::DuplicateWorkOrder(header.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create_checkpoints_for_work_order(
        &self,
        work_order_id: &WorkOrderId,
        defs: &[CheckpointDef],
    ) -> Result<Vec<Checkpoint>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM work_orders WHERE id = ?1")
            .bind(work_order_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(RepositoryError::MissingWorkOrder(*work_order_id));
        }

        let checkpoints = checkpoints_from_defs(*work_order_id, defs);
        for checkpoint in &checkpoints {
            sqlx::query(
                r#"
                INSERT INTO checkpoints (id, work_order_id, ord, name, owner_dept_id, status)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(checkpoint.id.to_string())
            .bind(work_order_id.to_string())
            .bind(checkpoint.order)
            .bind(&checkpoint.name)
            .bind(checkpoint.owner_dept_id.as_str())
            .bind(checkpoint.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(checkpoints)
    }

    async fn load_work_order(&self, id: &WorkOrderId) -> Result<Option<WorkOrder>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, company, title, description, priority, deadline, created_by, created_at
            FROM work_orders
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let header = header_from_row(&row)?;
        let checkpoints = self.checkpoints_of(id).await?;
        Ok(Some(WorkOrder::from_parts(header, checkpoints)))
    }

    async fn remove_work_order(&self, id: &WorkOrderId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM checkpoints WHERE work_order_id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM work_orders WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::Priority;
    use tempfile::TempDir;

    async fn repository(dir: &TempDir) -> SqliteRepository {
        let url = format!("sqlite://{}", dir.path().join("flow.db").display());
        SqliteRepository::connect(&url, 4, true).await.unwrap()
    }

    fn header() -> WorkOrderHeader {
        WorkOrderHeader {
            id: WorkOrderId::new(),
            company: "Acme".to_string(),
            title: "Pump overhaul".to_string(),
            description: "Replace seals".to_string(),
            priority: Priority::Urgent,
            deadline: None,
            created_by: "creator".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_work_order_round_trip() {
        let dir = TempDir::new().unwrap();
        let repo = repository(&dir).await;
        let header = header();

        repo.insert_work_order(&header).await.unwrap();
        repo.create_checkpoints_for_work_order(
            &header.id,
            &[
                CheckpointDef::new(1, "Review", "dept-a"),
                CheckpointDef::new(2, "Approve", "dept-b"),
            ],
        )
        .await
        .unwrap();

        let loaded = repo.load_work_order(&header.id).await.unwrap().unwrap();
        assert_eq!(loaded.header(), header);
        assert_eq!(loaded.checkpoints.len(), 2);
        assert!(loaded
            .checkpoints
            .iter()
            .all(|checkpoint| checkpoint.status == CheckpointStatus::Pending));

        assert!(matches!(
            repo.insert_work_order(&header).await,
            Err(RepositoryError::DuplicateWorkOrder(_))
        ));
    }

    #[tokio::test]
    async fn test_conditional_update_rechecks_status_and_predecessors() {
        let dir = TempDir::new().unwrap();
        let repo = repository(&dir).await;
        let header = header();
        repo.insert_work_order(&header).await.unwrap();
        let checkpoints = repo
            .create_checkpoints_for_work_order(
                &header.id,
                &[
                    CheckpointDef::new(1, "Review", "dept-a"),
                    CheckpointDef::new(2, "Approve", "dept-b"),
                ],
            )
            .await
            .unwrap();

        let start = |checkpoint: &Checkpoint| StatusUpdate {
            checkpoint_id: checkpoint.id,
            expected: CheckpointStatus::Pending,
            new_status: CheckpointStatus::Processing,
            started_at: Some(Utc::now()),
            ended_at: None,
            require_completed_predecessors: true,
        };

        assert!(!repo.compare_and_swap_status(&start(&checkpoints[1])).await.unwrap());
        assert!(repo.compare_and_swap_status(&start(&checkpoints[0])).await.unwrap());
        assert!(!repo.compare_and_swap_status(&start(&checkpoints[0])).await.unwrap());

        let (stored, siblings) = repo
            .load_checkpoint_with_siblings(&checkpoints[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, CheckpointStatus::Processing);
        assert!(stored.started_at.is_some());
        assert_eq!(siblings.len(), 2);
    }
}
