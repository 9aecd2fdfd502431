pub mod repository;

use rusqlite_migration::{Migrations, M};

use crate::error::{Error, Result};
use crate::metrics::MetricSource;
use crate::query::builder::{MetricQuery, Scope};
use crate::query::period::DateRange;

/// Database wraps two `tokio_rusqlite::Connection` instances (writer + reader)
/// using WAL mode, so dashboard reads never queue behind a write.
#[derive(Clone)]
pub struct Database {
    writer: tokio_rusqlite::Connection,
    reader: tokio_rusqlite::Connection,
}

impl Database {
    /// Open the database at the default path (`~/.sitepulse/sitepulse.db`).
    pub async fn open() -> Result<Self> {
        let dir = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".sitepulse");
        std::fs::create_dir_all(&dir).map_err(|e| Error::Config(e.to_string()))?;
        Self::open_at(dir.join("sitepulse.db")).await
    }

    /// Open the database at the given path.
    pub async fn open_at(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening database at {}", path.display());

        let writer = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_writer(&writer).await?;

        let reader = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_reader(&reader).await?;

        Ok(Self { writer, reader })
    }

    /// Open an in-memory database (for testing).
    pub async fn open_memory() -> Result<Self> {
        let writer = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init_writer(&writer).await?;

        // In-memory DBs are per-connection, so reader and writer share one.
        Ok(Self {
            reader: writer.clone(),
            writer,
        })
    }

    async fn init_writer(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA foreign_keys=ON;\
                 PRAGMA busy_timeout=5000;",
            )
            .map_err(|e| e.to_string())?;
            let migrations = Migrations::new(vec![M::up(include_str!(
                "migrations/001_initial.sql"
            ))]);
            migrations.to_latest(conn).map_err(|e| e.to_string())?;
            Ok::<(), String>(())
        })
        .await
        .map_err(|e| Error::Migration(e.to_string()))
    }

    async fn init_reader(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA foreign_keys=ON;\
                 PRAGMA busy_timeout=5000;\
                 PRAGMA query_only=ON;",
            )?;
            Ok::<(), rusqlite::Error>(())
        })
        .await?;
        Ok(())
    }

    /// Get a reference to the writer connection.
    pub fn writer(&self) -> &tokio_rusqlite::Connection {
        &self.writer
    }

    /// Get a reference to the reader connection.
    pub fn reader(&self) -> &tokio_rusqlite::Connection {
        &self.reader
    }

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::DataUnavailable(e.to_string()))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::DataUnavailable(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::DataUnavailable(e.to_string()))
    }

    pub async fn table_counts(&self) -> Result<Vec<repository::TableCount>> {
        self.reader()
            .call(|conn| repository::table_row_counts(conn))
            .await
            .map_err(|e| Error::DataUnavailable(e.to_string()))
    }
}

impl MetricSource for Database {
    async fn aggregate(&self, query: MetricQuery, scope: Scope, window: DateRange) -> Result<f64> {
        let value = self
            .reader
            .call(move |conn| repository::aggregate(conn, &query, &scope, &window))
            .await?;
        Ok(value)
    }

    async fn resolve_user(&self, site_id: String, identifier: String) -> Result<Option<String>> {
        let resolved = self
            .reader
            .call(move |conn| repository::resolve_user_identifier(conn, &site_id, &identifier))
            .await?;
        Ok(resolved)
    }
}
