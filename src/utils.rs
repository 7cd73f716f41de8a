use std::{
    fs,
    path::{Path, PathBuf},
};

use dirs::data_dir;
use once_cell::sync::Lazy;
use tracing::warn;

/// `<platform data dir>/cantina`, created on first use. Without a platform
/// data dir the working directory stands in.
static DATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    let root = data_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cantina");
    create_dir(&root);
    root
});

pub fn database_path() -> PathBuf {
    DATA_ROOT.join("cantina.sqlite")
}

pub fn config_path() -> PathBuf {
    DATA_ROOT.join("config.json")
}

/// Creates the directory holding `file`. Failures are only logged; opening
/// the file afterwards reports the real error.
pub fn ensure_parent(file: &Path) {
    if let Some(dir) = file.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        create_dir(dir);
    }
}

fn create_dir(dir: &Path) {
    if let Err(err) = fs::create_dir_all(dir) {
        warn!(dir = %dir.display(), "could not create directory: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parent_directories_are_created() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("nested").join("deeper").join("cantina.sqlite");
        ensure_parent(&file);
        assert!(file.parent().unwrap().is_dir());

        // A bare file name has no directory to create.
        ensure_parent(Path::new("cantina.sqlite"));
    }

    #[test]
    fn default_files_share_the_data_root() {
        assert_eq!(database_path().parent(), config_path().parent());
        assert!(database_path().ends_with("cantina/cantina.sqlite"));
    }
}
