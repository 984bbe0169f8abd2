use std::{io, path::Path};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_EMULATED_ARENA_SIZE, DEFAULT_EMULATED_PHYS_BASE};

const DEFAULT_CONFIG_PATH: &str = "/etc/ddekit/pages.toml";

/// Errors raised while loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// The file is not valid TOML for `PageConfig`
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Which raw memory provider backs the allocator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Anonymous host mappings
    #[default]
    Host,
    /// Buddy-managed arena with a linear physical window
    Emulated,
}

/// What freeing an untracked page does.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovePolicy {
    /// Report a double free as `PageError::NotFound`
    #[default]
    Strict,
    /// Log a double free and return success
    Lenient,
}

/// Settings of the emulated provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatedConfig {
    /// Arena size in bytes, rounded up to a power of two
    pub arena_size: usize,
    /// Physical address the arena start translates to
    pub phys_base: u64,
}

impl Default for EmulatedConfig {
    fn default() -> Self {
        Self {
            arena_size: DEFAULT_EMULATED_ARENA_SIZE,
            phys_base: DEFAULT_EMULATED_PHYS_BASE,
        }
    }
}

/// Page allocator configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub provider: ProviderKind,
    /// Pin host pages with `mlock` after mapping them
    pub lock_pages: bool,
    pub remove_policy: RemovePolicy,
    pub emulated: EmulatedConfig,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the configuration from the default path.
    pub fn load_default() -> Result<PageConfig, ConfigError> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Loads the configuration from the default path, using defaults if the file does not exist.
    pub fn load_or_default() -> Result<PageConfig, ConfigError> {
        if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_default()
        } else {
            log::debug!("{DEFAULT_CONFIG_PATH} not found, using default configuration");
            Ok(PageConfig::default())
        }
    }

    /// Loads the configuration from the specified path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<PageConfig, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses a configuration from TOML text.
    pub fn parse(content: &str) -> Result<PageConfig, ConfigError> {
        let config: PageConfig = toml::from_str(content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ConfigLoader::parse("").unwrap();
        assert_eq!(config, PageConfig::default());
        assert_eq!(config.provider, ProviderKind::Host);
        assert_eq!(config.remove_policy, RemovePolicy::Strict);
        assert!(!config.lock_pages);
    }

    #[test]
    fn parse_full_config() {
        let text = r#"
            provider = "emulated"
            lock_pages = true
            remove_policy = "lenient"

            [emulated]
            arena_size = 1048576
            phys_base = 0x40000000
        "#;
        let config = ConfigLoader::parse(text).unwrap();
        assert_eq!(config.provider, ProviderKind::Emulated);
        assert_eq!(config.remove_policy, RemovePolicy::Lenient);
        assert!(config.lock_pages);
        assert_eq!(config.emulated.arena_size, 1 << 20);
        assert_eq!(config.emulated.phys_base, 0x4000_0000);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = ConfigLoader::parse(r#"provider = "dma""#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ConfigLoader::load_from_path("/nonexistent/ddekit/pages.toml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
