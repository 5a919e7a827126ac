//! Configuration paths
//!
//! The config file lives under the platform config directory; the device
//! identity and device tokens live under the platform data directory. Each
//! location can be pinned with an environment variable.

use std::path::PathBuf;

const APP_DIR: &str = "gatelink";
const CONFIG_FILE: &str = "config.json";

/// Override variable, then the platform directory, then a home-relative fallback
fn resolve(override_var: &str, platform_dir: Option<PathBuf>, home_fallback: &[&str]) -> PathBuf {
    if let Some(dir) = std::env::var_os(override_var) {
        return PathBuf::from(dir);
    }

    platform_dir
        .or_else(|| {
            dirs::home_dir().map(|home| home_fallback.iter().fold(home, |path, part| path.join(part)))
        })
        .map(|base| base.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_DIR)))
}

/// Configuration directory (`GATELINK_CONFIG_DIR`)
pub fn config_dir() -> PathBuf {
    resolve("GATELINK_CONFIG_DIR", dirs::config_dir(), &[".config"])
}

/// Main configuration file (`GATELINK_CONFIG`)
pub fn config_path() -> PathBuf {
    std::env::var_os("GATELINK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir().join(CONFIG_FILE))
}

/// State directory for the device identity and tokens (`GATELINK_STATE_DIR`)
pub fn state_dir() -> PathBuf {
    resolve("GATELINK_STATE_DIR", dirs::data_dir(), &[".local", "share"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_fallbacks() {
        let unset = "GATELINK_TEST_UNSET_PATH_VAR";

        let platform = resolve(unset, Some(PathBuf::from("/xdg")), &[".config"]);
        assert_eq!(platform, PathBuf::from("/xdg/gatelink"));

        let home = resolve(unset, None, &[".local", "share"]);
        assert!(home.ends_with(".local/share/gatelink") || home == PathBuf::from(".gatelink"));
    }

    #[test]
    fn test_config_path_is_json_in_config_dir() {
        if std::env::var_os("GATELINK_CONFIG").is_none() {
            assert_eq!(config_path(), config_dir().join("config.json"));
        }
    }
}
