use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CmfError, CmfResult};
use crate::types::HashAlgo;

/// Top-level configuration (loaded from cmf.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CmfConfig {
    pub store: StoreConfig,
    pub manifest: ManifestConfig,
    pub chunking: ChunkingConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the loose-object store
    pub path: PathBuf,
    /// Hash algorithm for new objects (default: blake3)
    pub hash_algo: HashAlgo,
    /// zstd level for stored objects (0 = zstd default)
    pub compression_level: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Manifest format version used when building (only 1 exists)
    pub version: u32,
    /// Treat a malformed chunk entry as end-of-manifest instead of an error
    pub lenient_entries: bool,
}

/// Content-defined chunking overrides. Unset fields fall back to
/// size classes chosen from the file extension.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub min_size: Option<u32>,
    pub avg_size: Option<u32>,
    pub max_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.local/share/cmf/store"),
            hash_algo: HashAlgo::Blake3,
            compression_level: 3,
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            version: 1,
            lenient_entries: false,
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

impl ChunkingConfig {
    /// Explicit (min, avg, max) sizes, only when all three are set
    pub fn sizes(&self) -> Option<(u32, u32, u32)> {
        match (self.min_size, self.avg_size, self.max_size) {
            (Some(min), Some(avg), Some(max)) => Some((min, avg, max)),
            _ => None,
        }
    }
}

impl CmfConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> CmfResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|source| CmfError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CmfError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work. The manifest version is checked
    /// against the format registry when a builder is created.
    pub fn validate(&self) -> CmfResult<()> {
        if self.manifest.version == 0 {
            return Err(CmfError::Config("manifest.version must be >= 1".into()));
        }

        let set = [
            self.chunking.min_size,
            self.chunking.avg_size,
            self.chunking.max_size,
        ]
        .iter()
        .filter(|s| s.is_some())
        .count();
        if set != 0 && set != 3 {
            return Err(CmfError::Config(
                "chunking.min_size, avg_size and max_size must be set together".into(),
            ));
        }
        if let Some((min, avg, max)) = self.chunking.sizes() {
            if !(min <= avg && avg <= max) {
                return Err(CmfError::Config(format!(
                    "chunking sizes must satisfy min <= avg <= max (got {min}/{avg}/{max})"
                )));
            }
        }

        if !(0..=22).contains(&self.store.compression_level) {
            return Err(CmfError::Config(format!(
                "store.compression_level must be within 0..=22 (got {})",
                self.store.compression_level
            )));
        }

        match self.log.format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(CmfError::Config(format!(
                "log.format must be \"json\" or \"text\" (got {other:?})"
            ))),
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
path = "/var/lib/cmf"
hash_algo = "sha256"
compression_level = 9

[manifest]
version = 1
lenient_entries = true

[chunking]
min_size = 4096
avg_size = 8192
max_size = 32768

[log]
level = "debug"
format = "json"
"#;
        let config: CmfConfig = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();

        assert_eq!(config.store.path, PathBuf::from("/var/lib/cmf"));
        assert_eq!(config.store.hash_algo, HashAlgo::Sha256);
        assert_eq!(config.store.compression_level, 9);
        assert!(config.manifest.lenient_entries);
        assert_eq!(config.chunking.sizes(), Some((4096, 8192, 32768)));
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config: CmfConfig = toml::from_str("").unwrap();

        assert_eq!(config.store.hash_algo, HashAlgo::Blake3);
        assert_eq!(config.store.compression_level, 3);
        assert_eq!(config.manifest.version, 1);
        assert!(!config.manifest.lenient_entries);
        assert_eq!(config.chunking.sizes(), None);
        assert_eq!(config.log.level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_chunking_rejected() {
        let config: CmfConfig = toml::from_str("[chunking]\nmin_size = 4096\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_chunking_rejected() {
        let toml_str = "[chunking]\nmin_size = 9000\navg_size = 4096\nmax_size = 16384\n";
        let config: CmfConfig = toml::from_str(toml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min <= avg <= max"));
    }

    #[test]
    fn test_version_zero_rejected() {
        let config: CmfConfig = toml::from_str("[manifest]\nversion = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_algo_fails_parse() {
        let result = toml::from_str::<CmfConfig>("[store]\nhash_algo = \"md5\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CmfConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.manifest.version, 1);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmf.toml");
        std::fs::write(&path, "[log]\nlevel = \"trace\"\n").unwrap();
        let config = CmfConfig::load(&path).unwrap();
        assert_eq!(config.log.level, "trace");
        assert_eq!(config.log.format, "text");
    }

    #[test]
    fn test_load_unreadable_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CmfConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, CmfError::Io { ref path, .. } if path == dir.path()));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = CmfConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: CmfConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.store.path, parsed.store.path);
        assert_eq!(config.manifest.version, parsed.manifest.version);
    }
}
