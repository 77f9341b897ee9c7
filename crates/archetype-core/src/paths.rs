use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "archetype.yaml";
pub const DATA_DIR: &str = ".archetype";
pub const USERS_DIR: &str = ".archetype/users";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn data_dir(root: &Path) -> PathBuf {
    root.join(DATA_DIR)
}

pub fn users_dir(root: &Path) -> PathBuf {
    root.join(USERS_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/site");
        assert_eq!(config_path(root), PathBuf::from("/tmp/site/archetype.yaml"));
        assert_eq!(users_dir(root), PathBuf::from("/tmp/site/.archetype/users"));
    }
}
