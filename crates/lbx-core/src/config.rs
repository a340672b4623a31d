use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use lbx_crypto::KdfParams;

use crate::error::{VaultError, VaultResult};

/// Top-level vault configuration (loaded from latchbox.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub store: StoreConfig,
    pub log: LogConfig,
    pub kdf: KdfConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the vault database file
    pub db_path: PathBuf,
    /// Where `backup` writes its snapshot (optional)
    pub backup_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Argon2id cost parameters for the default deriver version.
///
/// The defaults are the frozen values; changing them changes every derived
/// key, so overrides are only for test rigs and future version migrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    pub mem_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("~/.local/share/latchbox/vault.redb"),
            backup_path: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for KdfConfig {
    fn default() -> Self {
        let params = KdfParams::default();
        Self {
            mem_cost_kib: params.mem_cost_kib,
            time_cost: params.time_cost,
            parallelism: params.parallelism,
        }
    }
}

impl VaultConfig {
    /// Load a configuration from a TOML file; absent sections get defaults.
    pub fn load(path: impl AsRef<Path>) -> VaultResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| VaultError::Config(format!("{}: {e}", path.as_ref().display())))?;
        toml::from_str(&raw).map_err(|e| VaultError::Config(e.to_string()))
    }

    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            mem_cost_kib: self.kdf.mem_cost_kib,
            time_cost: self.kdf.time_cost,
            parallelism: self.kdf.parallelism,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[store]
db_path = "/tmp/test-vault.redb"
backup_path = "/tmp/test-vault.bak"

[log]
level = "debug"
format = "json"

[kdf]
mem_cost_kib = 131072
time_cost = 4
parallelism = 8
"#;
        let config: VaultConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.store.db_path, PathBuf::from("/tmp/test-vault.redb"));
        assert_eq!(
            config.store.backup_path,
            Some(PathBuf::from("/tmp/test-vault.bak"))
        );
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
        assert_eq!(config.kdf.mem_cost_kib, 131072);
        assert_eq!(config.kdf_params().time_cost, 4);
    }

    #[test]
    fn test_parse_defaults() {
        let config: VaultConfig = toml::from_str("").unwrap();

        assert_eq!(config.log.level, "info");
        assert!(config.store.backup_path.is_none());
        assert_eq!(config.kdf.mem_cost_kib, 65536);
        assert_eq!(config.kdf.time_cost, 3);
        assert_eq!(config.kdf.parallelism, 4);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: VaultConfig = toml::from_str("[log]\nlevel = \"trace\"\n").unwrap();

        assert_eq!(config.log.level, "trace");
        assert_eq!(config.log.format, "text");
        assert_eq!(config.kdf.parallelism, 4);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = VaultConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: VaultConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.store.db_path, config.store.db_path);
        assert_eq!(parsed.log.level, config.log.level);
        assert_eq!(parsed.kdf.mem_cost_kib, config.kdf.mem_cost_kib);
    }
}
