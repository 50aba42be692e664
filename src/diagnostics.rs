//! Startup diagnostics — run before the store opens. Any failure here is a
//! `Fatal startup` error per §7: the process refuses to start.

use std::fs;
use std::path::Path;

use crate::error::CoreError;

pub fn run_startup_checks(
    root_dir: &Path,
    database_path: &Path,
    organization_strategy: crate::config::OrganizationStrategy,
) -> Result<(), CoreError> {
    check_root_dir_writable(root_dir)?;
    check_database_path_creatable(database_path)?;
    check_organization_strategy_supported(organization_strategy)?;
    Ok(())
}

fn check_root_dir_writable(root_dir: &Path) -> Result<(), CoreError> {
    if !root_dir.exists() {
        return Err(CoreError::FatalStartup(format!("root_dir does not exist: {root_dir:?}")));
    }
    if !root_dir.is_dir() {
        return Err(CoreError::FatalStartup(format!("root_dir is not a directory: {root_dir:?}")));
    }
    let probe = root_dir.join(".write_probe");
    match fs::write(&probe, b"") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            Ok(())
        }
        Err(e) => Err(CoreError::FatalStartup(format!("root_dir {root_dir:?} is not writable: {e}"))),
    }
}

fn check_database_path_creatable(database_path: &Path) -> Result<(), CoreError> {
    let parent = database_path.parent().unwrap_or(Path::new("."));
    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| {
            CoreError::FatalStartup(format!("cannot create database directory {parent:?}: {e}"))
        })?;
    }
    Ok(())
}

fn check_organization_strategy_supported(
    strategy: crate::config::OrganizationStrategy,
) -> Result<(), CoreError> {
    use crate::config::OrganizationStrategy::*;
    match strategy {
        Auto | Copy | Hardlink | Reflink | Symlink => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn accepts_writable_root() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("sub").join("library.db");
        let result = run_startup_checks(dir.path(), &db_path, crate::config::OrganizationStrategy::Auto);
        assert!(result.is_ok());
        assert!(db_path.parent().unwrap().exists());
    }

    #[test]
    fn rejects_missing_root() {
        let result = run_startup_checks(
            Path::new("/nonexistent/path/xyz"),
            Path::new("/tmp/db"),
            crate::config::OrganizationStrategy::Auto,
        );
        assert!(result.is_err());
    }
}
