use std::{ffi::OsString, fs::remove_file, io::ErrorKind, path::PathBuf};

use anyhow::{Context as _, Result};
use log::{info, trace};

use crate::config::Config;

/// The database file together with the journal files SQLite keeps next to
/// it.
fn database_files(config: &Config) -> Vec<PathBuf> {
    let db = config.metadata_db();
    let mut files = vec![db.clone()];
    for suffix in ["-wal", "-shm"] {
        let mut name = OsString::from(db.as_os_str());
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    files
}

pub fn nuke(config: &Config) -> Result<()> {
    info!("nuking metadata store {}", config.metadata_db().display());
    for file in database_files(config) {
        match remove_file(&file) {
            Ok(()) => trace!("removed {}", file.display()),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => {
                return Err(error).with_context(|| format!("removing {} failed", file.display()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assertables::*;
    use rstest::*;

    use super::*;
    use crate::metadata::SqliteMetadataStore;

    #[rstest]
    fn test_nuke_removes_the_store() {
        let dir = assert_ok!(tempfile::tempdir());
        let db = dir.path().join("state").join("openchange.db");
        let config = assert_ok!(Config::parse(&format!(
            "metadata_db = {:?}",
            db.to_string_lossy()
        )));
        drop(assert_ok!(SqliteMetadataStore::open(&db)));
        assert!(db.exists());

        assert_ok!(nuke(&config));
        assert!(!db.exists());
        assert_ok!(nuke(&config));
    }
}
