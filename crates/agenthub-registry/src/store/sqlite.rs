//! SQLite store engine.
//!
//! One database file in WAL mode, accessed through short-lived pooled
//! connections with a busy timeout. Publish, update and delete run in
//! `IMMEDIATE` transactions. Identity, version string and the single-latest
//! flag are additionally backed by unique indexes, so a lost race surfaces as
//! a constraint violation rather than a second row.
//!
//! Integers are stored as `INTEGER` (i64); timestamps as microseconds since
//! the Unix epoch.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;
use uuid::Uuid;

use agenthub_core::model::timestamp_now;
use agenthub_core::{
    Artifact, ArtifactId, ArtifactMetadata, ArtifactPatch, Category, ContentDigest, PrincipalId,
    Version, VersionId, VersionStatus, Visibility,
};

use super::{Counter, RegistryStore};
use crate::error::{RegistryError, Result};
use crate::query::{self, ArtifactQuery, Page, PageRequest, Scope, SortKey};

/// Idle connections kept for reuse.
const MAX_IDLE_CONNECTIONS: usize = 8;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS artifacts (
    id          TEXT PRIMARY KEY,
    namespace   TEXT NOT NULL,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    category    TEXT NOT NULL,
    tags        TEXT NOT NULL DEFAULT '[]',
    visibility  TEXT NOT NULL,
    license     TEXT,
    homepage    TEXT,
    repository  TEXT,
    owner       TEXT NOT NULL,
    downloads   INTEGER NOT NULL DEFAULT 0 CHECK (downloads >= 0),
    likes       INTEGER NOT NULL DEFAULT 0 CHECK (likes >= 0),
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL,
    UNIQUE (namespace, name)
);
CREATE INDEX IF NOT EXISTS artifacts_listing ON artifacts(visibility, category);
CREATE INDEX IF NOT EXISTS artifacts_owner ON artifacts(owner);

CREATE TABLE IF NOT EXISTS versions (
    id           TEXT PRIMARY KEY,
    artifact_id  TEXT NOT NULL REFERENCES artifacts(id) ON DELETE CASCADE,
    version      TEXT NOT NULL,
    payload      BLOB NOT NULL,
    digest       TEXT NOT NULL,
    size         INTEGER NOT NULL,
    changelog    TEXT NOT NULL DEFAULT '',
    is_latest    INTEGER NOT NULL DEFAULT 0,
    status       TEXT NOT NULL,
    published_at INTEGER NOT NULL,
    published_by TEXT NOT NULL,
    downloads    INTEGER NOT NULL DEFAULT 0 CHECK (downloads >= 0),
    UNIQUE (artifact_id, version)
);
CREATE UNIQUE INDEX IF NOT EXISTS versions_single_latest
    ON versions(artifact_id) WHERE is_latest = 1;
"#;

const ARTIFACT_COLUMNS: &str = "id, namespace, name, description, category, tags, visibility, \
     license, homepage, repository, owner, downloads, likes, created_at, updated_at";

const VERSION_COLUMNS: &str = "id, artifact_id, version, payload, digest, size, changelog, \
     is_latest, status, published_at, published_by, downloads";

/// SQLite-backed store of record.
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
    idle: Mutex<Vec<Connection>>,
}

/// A connection checked out of the pool; returned on drop.
struct PooledConnection<'a> {
    conn: Option<Connection>,
    store: &'a SqliteStore,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only `Drop` takes the connection out.
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let mut idle = self.store.idle.lock();
            if idle.len() < MAX_IDLE_CONNECTIONS {
                idle.push(conn);
            }
        }
    }
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let store = SqliteStore {
            path: path.as_ref().to_path_buf(),
            busy_timeout,
            idle: Mutex::new(Vec::new()),
        };
        {
            let conn = store.connection()?;
            conn.execute_batch(SCHEMA)?;
        }
        debug!(path = %store.path.display(), "opened sqlite store");
        Ok(store)
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connection(&self) -> Result<PooledConnection<'_>> {
        let reused = self.idle.lock().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => self.open_connection()?,
        };
        Ok(PooledConnection {
            conn: Some(conn),
            store: self,
        })
    }

    fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.create_scalar_function(
            "contains_ci",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let haystack: String = ctx.get(0)?;
                let needle: String = ctx.get(1)?;
                Ok(query::contains_ci(&haystack, &needle))
            },
        )?;
        Ok(conn)
    }

    fn with_immediate_tx<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    fn artifact_where(conn: &Connection, clause: &str, param: &str) -> Result<Option<Artifact>> {
        let sql = format!("SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE {clause}");
        let row = conn
            .query_row(&sql, params![param], ArtifactRow::read)
            .optional()?;
        row.map(Artifact::try_from).transpose()
    }

    fn version_where(conn: &Connection, clause: &str, args: &[&str]) -> Result<Option<Version>> {
        let sql = format!("SELECT {VERSION_COLUMNS} FROM versions WHERE {clause}");
        let row = conn
            .query_row(&sql, rusqlite::params_from_iter(args), VersionRow::read)
            .optional()?;
        row.map(Version::try_from).transpose()
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64, column: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| RegistryError::Corrupt {
        detail: format!("negative {column}: {value}"),
    })
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(micros: i64, column: &str) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| RegistryError::Corrupt {
        detail: format!("{column} out of range: {micros}"),
    })
}

fn parse_uuid(value: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| RegistryError::Corrupt {
        detail: format!("{column} '{value}': {e}"),
    })
}

/// Raw artifact columns, decoded after the row borrow ends.
struct ArtifactRow {
    id: String,
    namespace: String,
    name: String,
    description: String,
    category: String,
    tags: String,
    visibility: String,
    license: Option<String>,
    homepage: Option<String>,
    repository: Option<String>,
    owner: String,
    downloads: i64,
    likes: i64,
    created_at: i64,
    updated_at: i64,
}

impl ArtifactRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ArtifactRow {
            id: row.get(0)?,
            namespace: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            category: row.get(4)?,
            tags: row.get(5)?,
            visibility: row.get(6)?,
            license: row.get(7)?,
            homepage: row.get(8)?,
            repository: row.get(9)?,
            owner: row.get(10)?,
            downloads: row.get(11)?,
            likes: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }
}

impl TryFrom<ArtifactRow> for Artifact {
    type Error = RegistryError;

    fn try_from(row: ArtifactRow) -> Result<Self> {
        let visibility: Visibility = row
            .visibility
            .parse()
            .map_err(|detail: String| RegistryError::Corrupt { detail })?;
        Ok(Artifact {
            id: ArtifactId::from_uuid(parse_uuid(&row.id, "artifacts.id")?),
            namespace: row.namespace,
            name: row.name,
            metadata: ArtifactMetadata {
                description: row.description,
                category: Category::new(row.category),
                tags: serde_json::from_str(&row.tags)?,
                visibility,
                license: row.license,
                homepage: row.homepage,
                repository: row.repository,
            },
            owner: PrincipalId::new(row.owner),
            downloads: from_sql_int(row.downloads, "downloads")?,
            likes: from_sql_int(row.likes, "likes")?,
            created_at: from_micros(row.created_at, "created_at")?,
            updated_at: from_micros(row.updated_at, "updated_at")?,
        })
    }
}

struct VersionRow {
    id: String,
    artifact_id: String,
    version: String,
    payload: Vec<u8>,
    digest: String,
    size: i64,
    changelog: String,
    is_latest: bool,
    status: String,
    published_at: i64,
    published_by: String,
    downloads: i64,
}

impl VersionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(VersionRow {
            id: row.get(0)?,
            artifact_id: row.get(1)?,
            version: row.get(2)?,
            payload: row.get(3)?,
            digest: row.get(4)?,
            size: row.get(5)?,
            changelog: row.get(6)?,
            is_latest: row.get(7)?,
            status: row.get(8)?,
            published_at: row.get(9)?,
            published_by: row.get(10)?,
            downloads: row.get(11)?,
        })
    }
}

impl TryFrom<VersionRow> for Version {
    type Error = RegistryError;

    fn try_from(row: VersionRow) -> Result<Self> {
        let status: VersionStatus = row
            .status
            .parse()
            .map_err(|detail: String| RegistryError::Corrupt { detail })?;
        Ok(Version {
            id: VersionId::from_uuid(parse_uuid(&row.id, "versions.id")?),
            artifact_id: ArtifactId::from_uuid(parse_uuid(&row.artifact_id, "versions.artifact_id")?),
            version: row.version,
            payload: row.payload,
            digest: ContentDigest::parse(&row.digest)?,
            size: from_sql_int(row.size, "size")?,
            changelog: row.changelog,
            is_latest: row.is_latest,
            status,
            published_at: from_micros(row.published_at, "published_at")?,
            published_by: PrincipalId::new(row.published_by),
            downloads: from_sql_int(row.downloads, "version downloads")?,
        })
    }
}

/// SQL text and bound values for a catalog filter.
fn filter_sql(query: &ArtifactQuery) -> (String, Vec<Value>) {
    let filter = &query.filter;
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    match &filter.scope {
        Scope::Public => {
            clauses.push("visibility = 'public'".to_string());
        }
        Scope::OwnedBy(owner) => {
            values.push(Value::Text(owner.as_str().to_string()));
            clauses.push(format!("owner = ?{}", values.len()));
        }
    }
    if let Some(category) = &filter.category {
        values.push(Value::Text(category.as_str().to_string()));
        clauses.push(format!("category = ?{}", values.len()));
    }
    if let Some(owner) = &filter.owner {
        values.push(Value::Text(owner.as_str().to_string()));
        clauses.push(format!("owner = ?{}", values.len()));
    }
    if let Some(namespace) = &filter.namespace {
        values.push(Value::Text(namespace.clone()));
        clauses.push(format!("namespace = ?{}", values.len()));
    }
    if let Some(search) = &filter.search {
        values.push(Value::Text(search.clone()));
        let n = values.len();
        clauses.push(format!(
            "(contains_ci(name, ?{n}) OR contains_ci(description, ?{n}))"
        ));
    }

    (clauses.join(" AND "), values)
}

fn order_sql(sort: SortKey) -> &'static str {
    match sort {
        SortKey::Updated => "updated_at DESC, id ASC",
        SortKey::Downloads => "downloads DESC, id ASC",
        SortKey::Likes => "likes DESC, id ASC",
        SortKey::Name => "name ASC, id ASC",
    }
}

impl RegistryStore for SqliteStore {
    fn engine(&self) -> &'static str {
        "sqlite"
    }

    fn insert_artifact(&self, artifact: &Artifact) -> Result<()> {
        let conn = self.connection()?;
        let metadata = &artifact.metadata;
        let result = conn.execute(
            "INSERT INTO artifacts (id, namespace, name, description, category, tags, \
             visibility, license, homepage, repository, owner, downloads, likes, \
             created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                artifact.id.to_string(),
                artifact.namespace,
                artifact.name,
                metadata.description,
                metadata.category.as_str(),
                serde_json::to_string(&metadata.tags)?,
                metadata.visibility.as_str(),
                metadata.license,
                metadata.homepage,
                metadata.repository,
                artifact.owner.as_str(),
                to_sql_int(artifact.downloads),
                to_sql_int(artifact.likes),
                to_micros(artifact.created_at),
                to_micros(artifact.updated_at),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(RegistryError::ArtifactExists {
                artifact: artifact.full_name(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn artifact(&self, namespace: &str, name: &str) -> Result<Option<Artifact>> {
        let conn = self.connection()?;
        let sql =
            format!("SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE namespace = ?1 AND name = ?2");
        let row = conn
            .query_row(&sql, params![namespace, name], ArtifactRow::read)
            .optional()?;
        row.map(Artifact::try_from).transpose()
    }

    fn artifact_by_id(&self, id: ArtifactId) -> Result<Option<Artifact>> {
        let conn = self.connection()?;
        Self::artifact_where(&conn, "id = ?1", &id.to_string())
    }

    fn update_artifact(
        &self,
        id: ArtifactId,
        patch: &ArtifactPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Artifact>> {
        self.with_immediate_tx(|tx| {
            let Some(mut artifact) = Self::artifact_where(tx, "id = ?1", &id.to_string())? else {
                return Ok(None);
            };
            patch.apply_to(&mut artifact.metadata);
            artifact.updated_at = updated_at;

            let metadata = &artifact.metadata;
            tx.execute(
                "UPDATE artifacts SET description = ?2, category = ?3, tags = ?4, \
                 visibility = ?5, license = ?6, homepage = ?7, repository = ?8, \
                 updated_at = ?9 WHERE id = ?1",
                params![
                    id.to_string(),
                    metadata.description,
                    metadata.category.as_str(),
                    serde_json::to_string(&metadata.tags)?,
                    metadata.visibility.as_str(),
                    metadata.license,
                    metadata.homepage,
                    metadata.repository,
                    to_micros(updated_at),
                ],
            )?;
            Ok(Some(artifact))
        })
    }

    fn delete_artifact(&self, id: ArtifactId) -> Result<bool> {
        self.with_immediate_tx(|tx| {
            let id = id.to_string();
            tx.execute("DELETE FROM versions WHERE artifact_id = ?1", params![id])?;
            let removed = tx.execute("DELETE FROM artifacts WHERE id = ?1", params![id])?;
            Ok(removed > 0)
        })
    }

    fn increment_counter(&self, id: ArtifactId, counter: Counter) -> Result<Option<u64>> {
        let conn = self.connection()?;
        let column = counter.as_str();
        let sql = format!(
            "UPDATE artifacts SET {column} = {column} + 1 WHERE id = ?1 RETURNING {column}"
        );
        let value: Option<i64> = conn
            .query_row(&sql, params![id.to_string()], |row| row.get(0))
            .optional()?;
        value.map(|v| from_sql_int(v, column)).transpose()
    }

    fn decrement_counter(&self, id: ArtifactId, counter: Counter) -> Result<Option<u64>> {
        let conn = self.connection()?;
        let column = counter.as_str();
        let sql = format!(
            "UPDATE artifacts SET {column} = MAX({column} - 1, 0) WHERE id = ?1 RETURNING {column}"
        );
        let value: Option<i64> = conn
            .query_row(&sql, params![id.to_string()], |row| row.get(0))
            .optional()?;
        value.map(|v| from_sql_int(v, column)).transpose()
    }

    fn insert_latest_version(
        &self,
        artifact: &Artifact,
        version: &Version,
    ) -> Result<DateTime<Utc>> {
        let artifact_id = artifact.id.to_string();
        let exists = |e: rusqlite::Error| {
            if is_constraint_violation(&e) {
                RegistryError::VersionExists {
                    artifact: artifact.full_name(),
                    version: version.version.clone(),
                }
            } else {
                e.into()
            }
        };

        self.with_immediate_tx(|tx| {
            let live: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM artifacts WHERE id = ?1",
                    params![artifact_id],
                    |row| row.get(0),
                )
                .optional()?;
            if live.is_none() {
                return Err(RegistryError::ArtifactNotFound {
                    artifact: artifact.full_name(),
                });
            }

            let previous: Option<i64> = tx
                .query_row(
                    "SELECT published_at FROM versions WHERE artifact_id = ?1 AND is_latest = 1",
                    params![artifact_id],
                    |row| row.get(0),
                )
                .optional()?;
            let now = to_micros(timestamp_now());
            let published_at = previous.map_or(now, |prev| now.max(prev));

            tx.execute(
                "UPDATE versions SET is_latest = 0 WHERE artifact_id = ?1 AND is_latest = 1",
                params![artifact_id],
            )?;
            tx.execute(
                "INSERT INTO versions (id, artifact_id, version, payload, digest, size, \
                 changelog, is_latest, status, published_at, published_by, downloads) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9, ?10, ?11)",
                params![
                    version.id.to_string(),
                    artifact_id,
                    version.version,
                    version.payload,
                    version.digest.as_str(),
                    to_sql_int(version.size),
                    version.changelog,
                    version.status.as_str(),
                    published_at,
                    version.published_by.as_str(),
                    to_sql_int(version.downloads),
                ],
            )
            .map_err(exists)?;
            tx.execute(
                "UPDATE artifacts SET updated_at = MAX(updated_at, ?2) WHERE id = ?1",
                params![artifact_id, published_at],
            )?;
            from_micros(published_at, "published_at")
        })
    }

    fn version(&self, artifact_id: ArtifactId, version: &str) -> Result<Option<Version>> {
        let conn = self.connection()?;
        Self::version_where(
            &conn,
            "artifact_id = ?1 AND version = ?2",
            &[&artifact_id.to_string(), version],
        )
    }

    fn latest_version(&self, artifact_id: ArtifactId) -> Result<Option<Version>> {
        let conn = self.connection()?;
        Self::version_where(
            &conn,
            "artifact_id = ?1 AND is_latest = 1",
            &[&artifact_id.to_string()],
        )
    }

    fn versions(&self, artifact_id: ArtifactId) -> Result<Vec<Version>> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT {VERSION_COLUMNS} FROM versions WHERE artifact_id = ?1 \
             ORDER BY published_at DESC, rowid DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![artifact_id.to_string()], VersionRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(Version::try_from).collect()
    }

    fn increment_version_downloads(
        &self,
        artifact_id: ArtifactId,
        version_id: VersionId,
    ) -> Result<Option<u64>> {
        let conn = self.connection()?;
        let value: Option<i64> = conn
            .query_row(
                "UPDATE versions SET downloads = downloads + 1 \
                 WHERE id = ?1 AND artifact_id = ?2 RETURNING downloads",
                params![version_id.to_string(), artifact_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        value.map(|v| from_sql_int(v, "version downloads")).transpose()
    }

    fn query_artifacts(
        &self,
        query: &ArtifactQuery,
        page: PageRequest,
    ) -> Result<Page<Artifact>> {
        let (where_sql, mut values) = filter_sql(query);
        let mut conn = self.connection()?;
        // Count and page from one read snapshot.
        let tx = conn.transaction()?;

        let total: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM artifacts WHERE {where_sql}"),
            rusqlite::params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        values.push(Value::Integer(i64::from(page.page_size())));
        let limit = values.len();
        values.push(Value::Integer(to_sql_int(page.offset())));
        let offset = values.len();
        let sql = format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE {where_sql} \
             ORDER BY {} LIMIT ?{limit} OFFSET ?{offset}",
            order_sql(query.sort)
        );
        let mut stmt = tx.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), ArtifactRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        tx.commit()?;

        let items = rows
            .into_iter()
            .map(Artifact::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            total: from_sql_int(total, "count")?,
            page: page.page(),
            page_size: page.page_size(),
        })
    }

    fn category_counts(&self) -> Result<BTreeMap<Category, u64>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*) FROM artifacts WHERE visibility = 'public' \
             GROUP BY category",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(category, count)| Ok((Category::new(category), from_sql_int(count, "count")?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ArtifactFilter;

    fn open(dir: &tempfile::TempDir) -> SqliteStore {
        SqliteStore::open(dir.path().join("registry.db"), Duration::from_secs(5)).unwrap()
    }

    fn artifact(name: &str) -> Artifact {
        Artifact::new(
            "alice",
            name,
            ArtifactMetadata::default()
                .with_description("A helpful bot")
                .with_category("coding")
                .with_tag("review"),
            PrincipalId::new("u-alice"),
        )
    }

    fn version(artifact: &Artifact, v: &str) -> Version {
        let payload = format!("runtime:\n  type: prompt\n# {v}\n").into_bytes();
        Version {
            id: VersionId::new(),
            artifact_id: artifact.id,
            version: v.to_string(),
            digest: ContentDigest::compute(&payload),
            size: payload.len() as u64,
            payload,
            changelog: format!("release {v}"),
            is_latest: true,
            status: VersionStatus::Active,
            published_at: timestamp_now(),
            published_by: artifact.owner.clone(),
            downloads: 0,
        }
    }

    #[test]
    fn artifact_round_trips_through_sql() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let a = artifact("bot");
        store.insert_artifact(&a).unwrap();
        assert_eq!(store.artifact("alice", "bot").unwrap(), Some(a.clone()));
        assert_eq!(store.artifact_by_id(a.id).unwrap(), Some(a));
        assert_eq!(store.artifact("alice", "Bot").unwrap(), None);
    }

    #[test]
    fn duplicate_identity_is_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        store.insert_artifact(&artifact("bot")).unwrap();
        let err = store.insert_artifact(&artifact("bot")).unwrap_err();
        assert!(matches!(err, RegistryError::ArtifactExists { .. }));
    }

    #[test]
    fn publish_moves_latest_and_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let a = artifact("bot");
        store.insert_artifact(&a).unwrap();
        let v1 = version(&a, "1.0.0");
        store.insert_latest_version(&a, &v1).unwrap();
        store.insert_latest_version(&a, &version(&a, "1.1.0")).unwrap();

        let err = store
            .insert_latest_version(&a, &version(&a, "1.0.0"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::VersionExists { .. }));

        let latest = store.latest_version(a.id).unwrap().unwrap();
        assert_eq!(latest.version, "1.1.0");
        let old = store.version(a.id, "1.0.0").unwrap().unwrap();
        assert!(!old.is_latest);
        assert_eq!(old.payload, v1.payload);
        assert!(old.verify());

        let all = store.versions(a.id).unwrap();
        assert_eq!(
            all.iter().map(|v| v.version.as_str()).collect::<Vec<_>>(),
            vec!["1.1.0", "1.0.0"]
        );
    }

    #[test]
    fn stale_timestamp_never_precedes_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let a = artifact("bot");
        store.insert_artifact(&a).unwrap();
        let mut stale = version(&a, "1.0.0");
        stale.published_at = DateTime::<Utc>::UNIX_EPOCH;
        let first = store.insert_latest_version(&a, &version(&a, "2.0.0")).unwrap();
        let second = store.insert_latest_version(&a, &stale).unwrap();

        assert!(second >= first);
        let all = store.versions(a.id).unwrap();
        assert_eq!(all[0].version, "1.0.0");
        assert!(all[0].is_latest);
        assert_eq!(all[0].published_at, second);
        assert_eq!(store.artifact_by_id(a.id).unwrap().unwrap().updated_at, second);
    }

    #[test]
    fn delete_cascades_versions() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let a = artifact("bot");
        store.insert_artifact(&a).unwrap();
        store.insert_latest_version(&a, &version(&a, "1.0.0")).unwrap();
        assert!(store.delete_artifact(a.id).unwrap());
        assert!(store.versions(a.id).unwrap().is_empty());
        assert!(store.artifact_by_id(a.id).unwrap().is_none());
        let err = store
            .insert_latest_version(&a, &version(&a, "2.0.0"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::ArtifactNotFound { .. }));
    }

    #[test]
    fn counters_update_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let a = artifact("bot");
        store.insert_artifact(&a).unwrap();
        assert_eq!(store.increment_counter(a.id, Counter::Downloads).unwrap(), Some(1));
        assert_eq!(store.increment_counter(a.id, Counter::Downloads).unwrap(), Some(2));
        assert_eq!(store.decrement_counter(a.id, Counter::Likes).unwrap(), Some(0));
        assert_eq!(
            store.increment_counter(ArtifactId::new(), Counter::Likes).unwrap(),
            None
        );
    }

    #[test]
    fn search_uses_case_insensitive_function() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        store.insert_artifact(&artifact("Reviewer")).unwrap();
        let mut hidden = artifact("hidden");
        hidden.metadata.visibility = Visibility::Private;
        store.insert_artifact(&hidden).unwrap();

        let query = ArtifactQuery::new(ArtifactFilter::public().with_search("HELPFUL"), SortKey::Name);
        let page = store
            .query_artifacts(&query, PageRequest::new(1, 10, 100).unwrap())
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "Reviewer");

        let counts = store.category_counts().unwrap();
        assert_eq!(counts.get(&Category::new("coding")), Some(&1));
    }

    #[test]
    fn reopen_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let a = artifact("bot");
        {
            let store = open(&dir);
            store.insert_artifact(&a).unwrap();
        }
        let store = open(&dir);
        assert!(store.artifact_by_id(a.id).unwrap().is_some());
    }
}
