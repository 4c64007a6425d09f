use crate::constants::history::{DEFAULT_LIMIT, MAX_LIMIT};
use crate::models::{
    Api, CategoryCount, Credential, CredentialKind, CredentialPatch, Endpoint, EndpointContext,
    Execution, ExecutionFilter, ExecutionWithInsights, Insight, InsightFilter, InsightSummary,
    ModelCount, NewCredential, NewExecution, NewInsight,
};
use crate::stores::{new_record_id, RecordStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS apis (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    base_url    TEXT NOT NULL,
    description TEXT,
    auth_type   TEXT NOT NULL,
    session     TEXT
);

CREATE TABLE IF NOT EXISTS endpoints (
    id          TEXT PRIMARY KEY,
    api_id      TEXT NOT NULL REFERENCES apis(id) ON DELETE CASCADE,
    method      TEXT NOT NULL,
    path        TEXT NOT NULL,
    parameters  TEXT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS credentials (
    id         TEXT PRIMARY KEY,
    api_id     TEXT NOT NULL REFERENCES apis(id) ON DELETE CASCADE,
    kind       TEXT NOT NULL,
    cred_key   TEXT NOT NULL,
    secret     TEXT NOT NULL,
    is_active  INTEGER NOT NULL,
    metadata   TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS credentials_api_key ON credentials(api_id, cred_key, is_active);

CREATE TABLE IF NOT EXISTS executions (
    id            TEXT PRIMARY KEY,
    endpoint_id   TEXT NOT NULL REFERENCES endpoints(id) ON DELETE CASCADE,
    parameters    TEXT NOT NULL,
    response      TEXT NOT NULL,
    status_code   INTEGER NOT NULL,
    success       INTEGER NOT NULL,
    error_message TEXT,
    executed_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS executions_endpoint ON executions(endpoint_id, executed_at);

CREATE TABLE IF NOT EXISTS insights (
    id           TEXT PRIMARY KEY,
    execution_id TEXT NOT NULL REFERENCES executions(id) ON DELETE CASCADE,
    ai_model     TEXT NOT NULL,
    title        TEXT NOT NULL,
    description  TEXT NOT NULL,
    category     TEXT NOT NULL,
    confidence   INTEGER NOT NULL,
    metadata     TEXT NOT NULL,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS insights_execution ON insights(execution_id, confidence);
"#;

const API_COLUMNS: &str = "id, name, base_url, description, auth_type, session";
const ENDPOINT_COLUMNS: &str = "id, api_id, method, path, parameters, description";
const CREDENTIAL_COLUMNS: &str =
    "id, api_id, kind, cred_key, secret, is_active, metadata, created_at, updated_at";
const EXECUTION_COLUMNS: &str =
    "id, endpoint_id, parameters, response, status_code, success, error_message, executed_at";
const INSIGHT_COLUMNS: &str =
    "id, execution_id, ai_model, title, description, category, confidence, metadata, created_at";

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn json_column(row: &Row, idx: usize) -> rusqlite::Result<Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|err| conversion_error(idx, err))
}

fn time_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| conversion_error(idx, err))
}

/// Current time at the precision the schema stores.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn format_time(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn api_from_row(row: &Row) -> rusqlite::Result<Api> {
    let auth_type: String = row.get(4)?;
    let session: Option<String> = row.get(5)?;
    Ok(Api {
        id: row.get(0)?,
        name: row.get(1)?,
        base_url: row.get(2)?,
        description: row.get(3)?,
        auth_type: auth_type.parse().map_err(|err| conversion_error(4, err))?,
        session: session
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|err| conversion_error(5, err))?,
    })
}

fn endpoint_from_row(row: &Row) -> rusqlite::Result<Endpoint> {
    let method: String = row.get(2)?;
    let parameters: String = row.get(4)?;
    Ok(Endpoint {
        id: row.get(0)?,
        api_id: row.get(1)?,
        method: method.parse().map_err(|err| conversion_error(2, err))?,
        path: row.get(3)?,
        parameters: serde_json::from_str(&parameters).map_err(|err| conversion_error(4, err))?,
        description: row.get(5)?,
    })
}

fn credential_from_row(row: &Row) -> rusqlite::Result<Credential> {
    let kind: String = row.get(2)?;
    Ok(Credential {
        id: row.get(0)?,
        api_id: row.get(1)?,
        kind: CredentialKind::from_label(&kind),
        key: row.get(3)?,
        value: row.get(4)?,
        is_active: row.get(5)?,
        metadata: json_column(row, 6)?,
        created_at: time_column(row, 7)?,
        updated_at: time_column(row, 8)?,
    })
}

fn execution_from_row(row: &Row) -> rusqlite::Result<Execution> {
    let status_code: i64 = row.get(4)?;
    Ok(Execution {
        id: row.get(0)?,
        endpoint_id: row.get(1)?,
        parameters: json_column(row, 2)?,
        response: json_column(row, 3)?,
        status_code: u16::try_from(status_code).map_err(|err| conversion_error(4, err))?,
        success: row.get(5)?,
        error_message: row.get(6)?,
        executed_at: time_column(row, 7)?,
    })
}

fn insight_from_row(row: &Row) -> rusqlite::Result<Insight> {
    let category: String = row.get(5)?;
    let confidence: i64 = row.get(6)?;
    Ok(Insight {
        id: row.get(0)?,
        execution_id: row.get(1)?,
        ai_model: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        category: category.parse().map_err(|err| conversion_error(5, err))?,
        confidence: confidence.clamp(0, 100) as u8,
        metadata: json_column(row, 7)?,
        created_at: time_column(row, 8)?,
    })
}

fn insights_for(conn: &Connection, execution_id: &str) -> Result<Vec<Insight>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM insights WHERE execution_id = ?1 ORDER BY created_at, rowid",
        INSIGHT_COLUMNS
    ))?;
    let rows = stmt.query_map(params![execution_id], insight_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn api_exists(conn: &Connection, api_id: &str) -> Result<bool, StoreError> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM apis WHERE id = ?1", params![api_id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

fn deactivate_siblings(
    conn: &Connection,
    api_id: &str,
    key: &str,
    keep_id: &str,
    now: &str,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE credentials SET is_active = 0, updated_at = ?4
         WHERE api_id = ?1 AND cred_key = ?2 AND is_active = 1 AND id != ?3",
        params![api_id, key, keep_id, now],
    )?;
    Ok(())
}

/// SQLite-backed record store. Foreign keys cascade deletes from APIs and endpoints down to
/// executions and insights.
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                StoreError::Unavailable(format!(
                    "cannot create directory {}: {}",
                    parent.display(),
                    err
                ))
            })?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| {
                StoreError::Unavailable("sqlite connection lock poisoned".to_string())
            })?;
            f(&mut guard)
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("sqlite task failed: {}", err)))?
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn save_api(&self, api: Api) -> Result<Api, StoreError> {
        let session = api.session.as_ref().map(serde_json::to_string).transpose()?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO apis (id, name, base_url, description, auth_type, session)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    base_url = excluded.base_url,
                    description = excluded.description,
                    auth_type = excluded.auth_type,
                    session = excluded.session",
                params![
                    api.id,
                    api.name,
                    api.base_url,
                    api.description,
                    api.auth_type.as_str(),
                    session
                ],
            )?;
            Ok(api)
        })
        .await
    }

    async fn get_api(&self, api_id: &str) -> Result<Option<Api>, StoreError> {
        let api_id = api_id.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM apis WHERE id = ?1", API_COLUMNS),
                    params![api_id],
                    api_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn delete_api(&self, api_id: &str) -> Result<bool, StoreError> {
        let api_id = api_id.to_string();
        self.with_conn(move |conn| {
            Ok(conn.execute("DELETE FROM apis WHERE id = ?1", params![api_id])? > 0)
        })
        .await
    }

    async fn save_endpoint(&self, endpoint: Endpoint) -> Result<Endpoint, StoreError> {
        let parameters = serde_json::to_string(&endpoint.parameters)?;
        self.with_conn(move |conn| {
            if !api_exists(conn, &endpoint.api_id)? {
                return Err(StoreError::MissingParent {
                    entity: "API",
                    id: endpoint.api_id.clone(),
                });
            }
            conn.execute(
                "INSERT INTO endpoints (id, api_id, method, path, parameters, description)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    api_id = excluded.api_id,
                    method = excluded.method,
                    path = excluded.path,
                    parameters = excluded.parameters,
                    description = excluded.description",
                params![
                    endpoint.id,
                    endpoint.api_id,
                    endpoint.method.as_str(),
                    endpoint.path,
                    parameters,
                    endpoint.description
                ],
            )?;
            Ok(endpoint)
        })
        .await
    }

    async fn get_endpoint(&self, endpoint_id: &str) -> Result<Option<Endpoint>, StoreError> {
        let endpoint_id = endpoint_id.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM endpoints WHERE id = ?1", ENDPOINT_COLUMNS),
                    params![endpoint_id],
                    endpoint_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn list_endpoints(&self, api_id: &str) -> Result<Vec<Endpoint>, StoreError> {
        let api_id = api_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM endpoints WHERE api_id = ?1 ORDER BY rowid",
                ENDPOINT_COLUMNS
            ))?;
            let rows = stmt.query_map(params![api_id], endpoint_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn delete_endpoint(&self, endpoint_id: &str) -> Result<bool, StoreError> {
        let endpoint_id = endpoint_id.to_string();
        self.with_conn(move |conn| {
            Ok(conn.execute("DELETE FROM endpoints WHERE id = ?1", params![endpoint_id])? > 0)
        })
        .await
    }

    async fn endpoint_with_context(
        &self,
        endpoint_id: &str,
    ) -> Result<Option<EndpointContext>, StoreError> {
        let endpoint_id = endpoint_id.to_string();
        self.with_conn(move |conn| {
            let Some(endpoint) = conn
                .query_row(
                    &format!("SELECT {} FROM endpoints WHERE id = ?1", ENDPOINT_COLUMNS),
                    params![endpoint_id],
                    endpoint_from_row,
                )
                .optional()?
            else {
                return Ok(None);
            };
            let Some(api) = conn
                .query_row(
                    &format!("SELECT {} FROM apis WHERE id = ?1", API_COLUMNS),
                    params![endpoint.api_id],
                    api_from_row,
                )
                .optional()?
            else {
                return Ok(None);
            };
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM credentials WHERE api_id = ?1 AND is_active = 1 ORDER BY rowid",
                CREDENTIAL_COLUMNS
            ))?;
            let credentials = stmt
                .query_map(params![api.id], credential_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(EndpointContext {
                endpoint,
                api,
                credentials,
            }))
        })
        .await
    }

    async fn insert_credential(&self, credential: NewCredential) -> Result<Credential, StoreError> {
        let metadata = serde_json::to_string(&credential.metadata)?;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if !api_exists(&tx, &credential.api_id)? {
                return Err(StoreError::MissingParent {
                    entity: "API",
                    id: credential.api_id.clone(),
                });
            }
            let created = now();
            let stamp = format_time(&created);
            let record = Credential {
                id: new_record_id(),
                api_id: credential.api_id,
                kind: credential.kind,
                key: credential.key,
                value: credential.value,
                is_active: true,
                metadata: credential.metadata,
                created_at: created,
                updated_at: created,
            };
            deactivate_siblings(&tx, &record.api_id, &record.key, &record.id, &stamp)?;
            tx.execute(
                "INSERT INTO credentials
                    (id, api_id, kind, cred_key, secret, is_active, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?7)",
                params![
                    record.id,
                    record.api_id,
                    record.kind.as_str(),
                    record.key,
                    record.value,
                    metadata,
                    stamp
                ],
            )?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn update_credential(
        &self,
        credential_id: &str,
        patch: CredentialPatch,
    ) -> Result<Option<Credential>, StoreError> {
        let credential_id = credential_id.to_string();
        let metadata = patch.metadata.as_ref().map(serde_json::to_string).transpose()?;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let Some(current) = tx
                .query_row(
                    &format!("SELECT {} FROM credentials WHERE id = ?1", CREDENTIAL_COLUMNS),
                    params![credential_id],
                    credential_from_row,
                )
                .optional()?
            else {
                return Ok(None);
            };
            let stamp = format_time(&now());
            if patch.is_active == Some(true) {
                deactivate_siblings(&tx, &current.api_id, &current.key, &current.id, &stamp)?;
            }
            tx.execute(
                "UPDATE credentials SET
                    secret = COALESCE(?2, secret),
                    is_active = COALESCE(?3, is_active),
                    metadata = COALESCE(?4, metadata),
                    updated_at = ?5
                 WHERE id = ?1",
                params![credential_id, patch.value, patch.is_active, metadata, stamp],
            )?;
            let updated = tx.query_row(
                &format!("SELECT {} FROM credentials WHERE id = ?1", CREDENTIAL_COLUMNS),
                params![credential_id],
                credential_from_row,
            )?;
            tx.commit()?;
            Ok(Some(updated))
        })
        .await
    }

    async fn get_credential(&self, credential_id: &str) -> Result<Option<Credential>, StoreError> {
        let credential_id = credential_id.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM credentials WHERE id = ?1", CREDENTIAL_COLUMNS),
                    params![credential_id],
                    credential_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn list_credentials(&self, api_id: &str) -> Result<Vec<Credential>, StoreError> {
        let api_id = api_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM credentials WHERE api_id = ?1 ORDER BY rowid",
                CREDENTIAL_COLUMNS
            ))?;
            let rows = stmt.query_map(params![api_id], credential_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn active_credentials(
        &self,
        api_id: &str,
        kind: Option<CredentialKind>,
    ) -> Result<Vec<Credential>, StoreError> {
        let api_id = api_id.to_string();
        let kind = kind.map(|kind| kind.as_str().to_string());
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM credentials
                 WHERE api_id = ?1 AND is_active = 1 AND (?2 IS NULL OR kind = ?2)
                 ORDER BY rowid",
                CREDENTIAL_COLUMNS
            ))?;
            let rows = stmt.query_map(params![api_id, kind], credential_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn delete_credential(&self, credential_id: &str) -> Result<bool, StoreError> {
        let credential_id = credential_id.to_string();
        self.with_conn(move |conn| {
            Ok(conn.execute(
                "DELETE FROM credentials WHERE id = ?1",
                params![credential_id],
            )? > 0)
        })
        .await
    }

    async fn create_execution(&self, execution: NewExecution) -> Result<Execution, StoreError> {
        let parameters = serde_json::to_string(&execution.parameters)?;
        let response = serde_json::to_string(&execution.response)?;
        self.with_conn(move |conn| {
            let endpoint_found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM endpoints WHERE id = ?1",
                    params![execution.endpoint_id],
                    |row| row.get(0),
                )
                .optional()?;
            if endpoint_found.is_none() {
                return Err(StoreError::MissingParent {
                    entity: "Endpoint",
                    id: execution.endpoint_id.clone(),
                });
            }
            let record = Execution {
                id: new_record_id(),
                endpoint_id: execution.endpoint_id,
                parameters: execution.parameters,
                response: execution.response,
                status_code: execution.status_code,
                success: execution.success,
                error_message: execution.error_message,
                executed_at: now(),
            };
            conn.execute(
                "INSERT INTO executions
                    (id, endpoint_id, parameters, response, status_code, success, error_message, executed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.endpoint_id,
                    parameters,
                    response,
                    i64::from(record.status_code),
                    record.success,
                    record.error_message,
                    format_time(&record.executed_at)
                ],
            )?;
            Ok(record)
        })
        .await
    }

    async fn get_execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<ExecutionWithInsights>, StoreError> {
        let execution_id = execution_id.to_string();
        self.with_conn(move |conn| {
            let Some(execution) = conn
                .query_row(
                    &format!("SELECT {} FROM executions WHERE id = ?1", EXECUTION_COLUMNS),
                    params![execution_id],
                    execution_from_row,
                )
                .optional()?
            else {
                return Ok(None);
            };
            let insights = insights_for(conn, &execution.id)?;
            Ok(Some(ExecutionWithInsights {
                execution,
                insights,
            }))
        })
        .await
    }

    async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> Result<Vec<ExecutionWithInsights>, StoreError> {
        let endpoint_id = filter.endpoint_id.clone();
        let api_id = filter.api_id.clone();
        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as i64;
        self.with_conn(move |conn| {
            let columns = EXECUTION_COLUMNS
                .split(", ")
                .map(|column| format!("e.{}", column))
                .collect::<Vec<_>>()
                .join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM executions e JOIN endpoints p ON p.id = e.endpoint_id
                 WHERE (?1 IS NULL OR e.endpoint_id = ?1) AND (?2 IS NULL OR p.api_id = ?2)
                 ORDER BY e.executed_at DESC, e.rowid DESC
                 LIMIT ?3",
                columns
            ))?;
            let executions = stmt
                .query_map(params![endpoint_id, api_id, limit], execution_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            let mut out = Vec::with_capacity(executions.len());
            for execution in executions {
                let insights = insights_for(conn, &execution.id)?;
                out.push(ExecutionWithInsights {
                    execution,
                    insights,
                });
            }
            Ok(out)
        })
        .await
    }

    async fn create_insight(&self, insight: NewInsight) -> Result<Insight, StoreError> {
        let metadata = serde_json::to_string(&insight.metadata)?;
        self.with_conn(move |conn| {
            let execution_found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM executions WHERE id = ?1",
                    params![insight.execution_id],
                    |row| row.get(0),
                )
                .optional()?;
            if execution_found.is_none() {
                return Err(StoreError::MissingParent {
                    entity: "Execution",
                    id: insight.execution_id.clone(),
                });
            }
            let record = Insight {
                id: new_record_id(),
                execution_id: insight.execution_id,
                ai_model: insight.ai_model,
                title: insight.title,
                description: insight.description,
                category: insight.category,
                confidence: insight.confidence.min(100),
                metadata: insight.metadata,
                created_at: now(),
            };
            conn.execute(
                "INSERT INTO insights
                    (id, execution_id, ai_model, title, description, category, confidence, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    record.execution_id,
                    record.ai_model,
                    record.title,
                    record.description,
                    record.category.as_str(),
                    i64::from(record.confidence),
                    metadata,
                    format_time(&record.created_at)
                ],
            )?;
            Ok(record)
        })
        .await
    }

    async fn list_insights(&self, filter: &InsightFilter) -> Result<Vec<Insight>, StoreError> {
        let execution_id = filter.execution_id.clone();
        let category = filter.category.map(|category| category.as_str());
        let ranked = filter.ranks_by_confidence();
        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as i64;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM insights
                 WHERE (?1 IS NULL OR execution_id = ?1) AND (?2 IS NULL OR category = ?2)
                 ORDER BY CASE WHEN ?3 THEN confidence ELSE 0 END DESC,
                          created_at DESC, rowid DESC
                 LIMIT ?4",
                INSIGHT_COLUMNS
            ))?;
            let rows = stmt.query_map(
                params![execution_id, category, ranked, limit],
                insight_from_row,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn delete_insight(&self, insight_id: &str) -> Result<bool, StoreError> {
        let insight_id = insight_id.to_string();
        self.with_conn(move |conn| {
            Ok(conn.execute("DELETE FROM insights WHERE id = ?1", params![insight_id])? > 0)
        })
        .await
    }

    async fn insight_summary(&self) -> Result<InsightSummary, StoreError> {
        self.with_conn(|conn| {
            let (total, average_confidence): (i64, Option<f64>) = conn.query_row(
                "SELECT COUNT(*), AVG(confidence) FROM insights",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let mut stmt = conn.prepare(
                "SELECT category, COUNT(*) FROM insights GROUP BY category ORDER BY category",
            )?;
            let by_category = stmt
                .query_map([], |row| {
                    let category: String = row.get(0)?;
                    let count: i64 = row.get(1)?;
                    Ok(CategoryCount {
                        category: category.parse().map_err(|err| conversion_error(0, err))?,
                        count: count.max(0) as u64,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare(
                "SELECT ai_model, COUNT(*) FROM insights GROUP BY ai_model ORDER BY ai_model",
            )?;
            let by_model = stmt
                .query_map([], |row| {
                    let count: i64 = row.get(1)?;
                    Ok(ModelCount {
                        model: row.get(0)?,
                        count: count.max(0) as u64,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(InsightSummary {
                total: total.max(0) as u64,
                by_category,
                by_model,
                average_confidence,
            })
        })
        .await
    }
}
