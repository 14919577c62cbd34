/* Daemon configuration, read from an INI file:
 *
 * [Daemon]
 * Backend=debugfs
 * DebugfsPath=/sys/kernel/debug/asus-nb-wmi
 * ModelDir=/usr/share/armouryd/models
 * LogLevel=info
 *
 * Every key is optional and a missing file means all defaults. */

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use configparser::ini::Ini;
use tracing::debug;

use crate::wmi::debugfs::DEFAULT_DEBUGFS_PATH;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/armouryd/armouryd.conf";
pub const CONFIG_PATH_ENV: &str = "ARMOURYD_CONFIG";
pub const DEFAULT_MODEL_DIR: &str = "/usr/share/armouryd/models";

const SECTION: &str = "daemon";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /* "debugfs", or "simulated" with the dev-hooks feature. */
    pub backend: String,
    pub debugfs_path: PathBuf,
    pub model_dir: PathBuf,
    /* JSON machine description for the simulated backend. */
    #[cfg_attr(not(feature = "dev-hooks"), allow(dead_code))]
    pub simulated_firmware: Option<PathBuf>,
    /* Filter used when `RUST_LOG` is not set. */
    pub log_level: String,
    /* Overrides the DMI product name used for the tunable limits. */
    pub product_name: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            backend: "debugfs".to_string(),
            debugfs_path: PathBuf::from(DEFAULT_DEBUGFS_PATH),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            simulated_firmware: None,
            log_level: "info".to_string(),
            product_name: None,
        }
    }
}

/* The configuration file to use: `$ARMOURYD_CONFIG` or the default path. */
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/* Load the configuration at `path`; a file that does not exist yields the
 * defaults, any other read or parse failure is an error. */
pub fn load_config(path: &Path) -> Result<DaemonConfig> {
    if !path.exists() {
        debug!("No config file at {}, using defaults", path.display());
        return Ok(DaemonConfig::default());
    }

    let mut ini = Ini::new();
    ini.load(path)
        .map_err(|e| anyhow!(e))
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(from_ini(&ini))
}

/* configparser lowercases section and key names. */
fn from_ini(ini: &Ini) -> DaemonConfig {
    let get = |key: &str| {
        ini.get(SECTION, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let defaults = DaemonConfig::default();

    DaemonConfig {
        backend: get("backend")
            .map(|b| b.to_ascii_lowercase())
            .unwrap_or(defaults.backend),
        debugfs_path: get("debugfspath")
            .map(PathBuf::from)
            .unwrap_or(defaults.debugfs_path),
        model_dir: get("modeldir")
            .map(PathBuf::from)
            .unwrap_or(defaults.model_dir),
        simulated_firmware: get("simulatedfirmware").map(PathBuf::from),
        log_level: get("loglevel").unwrap_or(defaults.log_level),
        product_name: get("productname"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> DaemonConfig {
        let mut ini = Ini::new();
        ini.read(text.to_string()).unwrap();
        from_ini(&ini)
    }

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(parse(""), DaemonConfig::default());
    }

    #[test]
    fn keys_are_case_insensitive() {
        let config = parse(
            "[Daemon]\nBackend=Simulated\nSimulatedFirmware=/tmp/g14.json\nLogLevel=debug\n\
             ProductName=ROG Zephyrus G14 GA402RJ\n",
        );
        assert_eq!(config.backend, "simulated");
        assert_eq!(config.simulated_firmware, Some(PathBuf::from("/tmp/g14.json")));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.product_name.as_deref(), Some("ROG Zephyrus G14 GA402RJ"));
        assert_eq!(config.model_dir, PathBuf::from(DEFAULT_MODEL_DIR));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = parse("[Daemon]\nDebugfsPath=\nProductName=  \n");
        assert_eq!(config.debugfs_path, PathBuf::from(DEFAULT_DEBUGFS_PATH));
        assert_eq!(config.product_name, None);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = load_config(Path::new("/nonexistent/armouryd.conf")).unwrap();
        assert_eq!(config, DaemonConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("armouryd.conf");
        std::fs::write(&path, "[Daemon]\nModelDir=/opt/models\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(config.backend, "debugfs");
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let path = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/data/armouryd.conf"));
        assert_eq!(load_config(path).unwrap(), DaemonConfig::default());
    }
}
