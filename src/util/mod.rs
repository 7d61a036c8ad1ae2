use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use directories::BaseDirs;

use crate::error::Result;

const DB_FILENAME: &str = "pagediff.db";

pub fn pagediff_root() -> Result<PathBuf> {
    let base = BaseDirs::new().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "failed to locate home directory")
    })?;
    let dir = base.home_dir().join(".pagediff");
    ensure_dir(&dir)?;
    Ok(dir)
}

pub fn default_db_path() -> Result<PathBuf> {
    Ok(pagediff_root()?.join(DB_FILENAME))
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
