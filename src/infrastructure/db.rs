use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

pub async fn connect(database_url: &str) -> Result<Pool<Sqlite>> {
    // Each connection to `sqlite::memory:` is its own database, so keep exactly one alive.
    let options = if is_memory(database_url) {
        SqlitePoolOptions::new().max_connections(1).idle_timeout(None).max_lifetime(None)
    } else {
        prepare_sqlite_file(database_url)?;
        SqlitePoolOptions::new().max_connections(5)
    };
    let pool = options
        .connect(database_url)
        .await
        .with_context(|| format!("connecting to {database_url}"))?;
    Ok(pool)
}

fn is_memory(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

/// Ensures the file behind a `sqlite://` URL exists so the pool can open it.
fn prepare_sqlite_file(database_url: &str) -> Result<()> {
    if let Some(path) = database_url.strip_prefix("sqlite://") {
        let path = path.split('?').next().unwrap_or(path);
        // On Windows, absolute paths may look like /C:/path; strip the leading slash
        let path = if cfg!(windows) && path.len() >= 3 && path.as_bytes()[0] == b'/' && path.as_bytes()[2] == b':' {
            &path[1..]
        } else {
            path
        };
        use std::{fs, fs::OpenOptions, path::Path};
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            if !parent.as_os_str().is_empty() { fs::create_dir_all(parent)?; }
        }
        if !p.exists() {
            OpenOptions::new().create(true).append(true).open(p)?;
        }
    }
    Ok(())
}

/// Fixed-width RFC 3339 so that text ordering in SQL matches time ordering.
pub(crate) fn encode_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_time(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid timestamp {s:?}"))?
        .with_timezone(&Utc))
}
