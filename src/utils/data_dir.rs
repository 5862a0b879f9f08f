//! Data directory for logs.
//!
//! Defaults to `~/.duolink/` but can be overridden via `--data-dir`.

use anyhow::Context;
use std::path::{Path, PathBuf};

const DEFAULT_DIR_NAME: &str = ".duolink";

/// Resolve the data directory and make sure it exists.
pub fn resolve(custom: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = match custom {
        Some(p) => p.to_path_buf(),
        None => dirs::home_dir()
            .context("No home directory found; pass --data-dir")?
            .join(DEFAULT_DIR_NAME),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
    Ok(dir)
}

pub fn log_file(data_dir: &Path) -> PathBuf {
    data_dir.join("logs").join("duolink.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_dir_is_created() {
        let dir = std::env::temp_dir().join(format!("duolink-test-{}", uuid::Uuid::new_v4()));
        let resolved = resolve(Some(&dir)).unwrap();
        assert_eq!(resolved, dir);
        assert!(dir.is_dir());
        assert!(log_file(&dir).ends_with("logs/duolink.log"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
