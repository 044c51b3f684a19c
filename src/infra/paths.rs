// src/infra/paths.rs — Config and data locations
//
// THINKCHAIN_HOME overrides everything. Otherwise config lives in
// ~/.thinkchain/ and trajectories default to the platform data dir.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

fn thinkchain_home() -> Option<PathBuf> {
    std::env::var_os("THINKCHAIN_HOME").map(PathBuf::from)
}

/// Configuration directory: $THINKCHAIN_HOME/ or ~/.thinkchain/
pub fn config_dir() -> Option<PathBuf> {
    if let Some(home) = thinkchain_home() {
        return Some(home);
    }
    BaseDirs::new().map(|b| b.home_dir().join(".thinkchain"))
}

/// Data directory: $THINKCHAIN_HOME/data/ or the XDG data dir.
pub fn data_dir() -> Option<PathBuf> {
    if let Some(home) = thinkchain_home() {
        return Some(home.join("data"));
    }
    ProjectDirs::from("", "", "thinkchain").map(|p| p.data_local_dir().to_path_buf())
}

pub fn config_file_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Default JSONL file that `run` appends trajectories to.
pub fn trajectories_path() -> Option<PathBuf> {
    data_dir().map(|d| d.join("trajectories.jsonl"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_is_toml() {
        if let Some(p) = config_file_path() {
            assert_eq!(p.file_name().and_then(|n| n.to_str()), Some("config.toml"));
        }
    }

    #[test]
    fn test_trajectories_under_data_dir() {
        if let (Some(data), Some(file)) = (data_dir(), trajectories_path()) {
            assert!(file.starts_with(data));
        }
    }
}
