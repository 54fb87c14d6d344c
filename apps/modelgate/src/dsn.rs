use std::error::Error;
use std::fs::OpenOptions;
use std::path::PathBuf;

/// The configured DSN, or a sqlite file at `<data_dir>/db/modelgate.db`.
pub(crate) fn resolve_dsn(
    input: Option<&str>,
    data_dir: &str,
) -> Result<String, Box<dyn Error + Send + Sync>> {
    if let Some(input) = input.map(str::trim).filter(|input| !input.is_empty()) {
        ensure_sqlite_dsn(input)?;
        return Ok(input.to_string());
    }

    let db_path = PathBuf::from(data_dir).join("db").join("modelgate.db");
    let db_path = db_path.to_string_lossy();
    let dsn = if db_path.starts_with('/') {
        format!("sqlite:///{}", db_path.trim_start_matches('/'))
    } else {
        format!("sqlite://{db_path}")
    };
    ensure_sqlite_dsn(&dsn)?;
    Ok(dsn)
}

fn sqlite_path(dsn: &str) -> Option<&str> {
    let rest = dsn.strip_prefix("sqlite:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    if rest.starts_with(":memory:") || rest.starts_with("memory:") {
        return None;
    }
    let path = rest.split('?').next().unwrap_or("");
    if path.is_empty() { None } else { Some(path) }
}

/// Creates the sqlite file and its parent directories so the first connect
/// does not fail on a fresh data dir.
pub(crate) fn ensure_sqlite_dsn(dsn: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let Some(path) = sqlite_path(dsn) else {
        return Ok(());
    };

    let path = PathBuf::from(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
    }
    Ok(())
}
