use super::{parse_timestamp, DbPool, RepoError};
use crate::model::{WorkflowDefinition, WorkflowId};

#[derive(sqlx::FromRow, Debug, Clone)]
struct WorkflowDefinitionRow {
    id: String,
    slug: String,
    name: String,
    category: String,
    version: String,
    is_active: i64,
    requires_mask: i64,
    ui_graph: String,
    spec: String,
    created_at: String,
}

impl TryFrom<WorkflowDefinitionRow> for WorkflowDefinition {
    type Error = RepoError;

    fn try_from(row: WorkflowDefinitionRow) -> Result<Self, Self::Error> {
        Ok(WorkflowDefinition {
            id: WorkflowId(uuid::Uuid::parse_str(&row.id).map_err(|e| RepoError::Malformed(e.to_string()))?),
            slug: row.slug,
            name: row.name,
            category: row.category,
            version: row.version,
            is_active: row.is_active != 0,
            requires_mask: row.requires_mask != 0,
            ui_graph: serde_json::from_str(&row.ui_graph).map_err(|e| RepoError::Malformed(e.to_string()))?,
            spec: serde_json::from_str(&row.spec).map_err(|e| RepoError::Malformed(e.to_string()))?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[derive(Clone)]
pub struct WorkflowRepo {
    pool: DbPool,
}

impl WorkflowRepo {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: WorkflowId) -> Result<Option<WorkflowDefinition>, RepoError> {
        let sql = "SELECT * FROM workflow_definitions WHERE id = $1";
        let row: Option<WorkflowDefinitionRow> = match &self.pool {
            DbPool::Postgres(pool) => sqlx::query_as(sql).bind(id.0.to_string()).fetch_optional(pool).await?,
            DbPool::Sqlite(pool) => sqlx::query_as(sql).bind(id.0.to_string()).fetch_optional(pool).await?,
        };
        row.map(WorkflowDefinition::try_from).transpose()
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<WorkflowDefinition>, RepoError> {
        let sql = "SELECT * FROM workflow_definitions WHERE slug = $1 AND is_active = $2";
        let row: Option<WorkflowDefinitionRow> = match &self.pool {
            DbPool::Postgres(pool) => sqlx::query_as(sql).bind(slug).bind(1i64).fetch_optional(pool).await?,
            DbPool::Sqlite(pool) => sqlx::query_as(sql).bind(slug).bind(1i64).fetch_optional(pool).await?,
        };
        row.map(WorkflowDefinition::try_from).transpose()
    }

    pub async fn create(&self, workflow: &WorkflowDefinition) -> Result<(), RepoError> {
        let sql = "INSERT INTO workflow_definitions (id, slug, name, category, version, is_active, \
                    requires_mask, ui_graph, spec, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)";
        let ui_graph_json =
            serde_json::to_string(&workflow.ui_graph).map_err(|e| RepoError::Malformed(e.to_string()))?;
        let spec_json = serde_json::to_string(&workflow.spec).map_err(|e| RepoError::Malformed(e.to_string()))?;

        match &self.pool {
            DbPool::Postgres(pool) => {
                sqlx::query(sql)
                    .bind(workflow.id.0.to_string())
                    .bind(&workflow.slug)
                    .bind(&workflow.name)
                    .bind(&workflow.category)
                    .bind(&workflow.version)
                    .bind(workflow.is_active as i64)
                    .bind(workflow.requires_mask as i64)
                    .bind(&ui_graph_json)
                    .bind(&spec_json)
                    .bind(workflow.created_at.to_rfc3339())
                    .execute(pool)
                    .await?;
            }
            DbPool::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(workflow.id.0.to_string())
                    .bind(&workflow.slug)
                    .bind(&workflow.name)
                    .bind(&workflow.category)
                    .bind(&workflow.version)
                    .bind(workflow.is_active as i64)
                    .bind(workflow.requires_mask as i64)
                    .bind(&ui_graph_json)
                    .bind(&spec_json)
                    .bind(workflow.created_at.to_rfc3339())
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }
}
