//! Common utilities and types shared across mmthunk crates

pub mod codes;

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid thunk pool bounds: initial {initial} > max {max}")]
    PoolBounds { initial: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Narrow (8-bit) code page used when recoding strings between the 16-bit
/// and the wide side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodePage {
    /// ISO-8859-1: every byte maps to the code point of the same value
    #[default]
    Latin1,
    /// 7-bit ASCII, anything above 0x7F becomes `?`
    Ascii,
}

impl CodePage {
    /// Get the display name for this code page
    pub fn display_name(&self) -> &str {
        match self {
            CodePage::Latin1 => "ISO-8859-1",
            CodePage::Ascii => "US-ASCII",
        }
    }

    /// Character substituted for code points the page cannot represent
    pub fn default_char(&self) -> u8 {
        b'?'
    }
}

/// Sizing of the callback registry that stands in for the legacy thunk pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThunkConfig {
    /// Slots reserved when the pool is first created
    pub initial_slots: usize,
    /// Hard upper bound; `None` lets the pool grow on demand
    pub max_slots: Option<usize>,
    /// Synthetic callable address of slot 0
    pub base_address: u32,
}

impl Default for ThunkConfig {
    fn default() -> Self {
        Self {
            initial_slots: 32,
            max_slots: None,
            base_address: 0x7FF0_0000,
        }
    }
}

impl ThunkConfig {
    /// A pool that never grows past `slots` records
    pub fn bounded(slots: usize) -> Self {
        Self {
            initial_slots: slots,
            max_slots: Some(slots),
            ..Default::default()
        }
    }
}

/// Segmented memory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Number of LDT entries available for selectors
    pub selector_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            selector_limit: 8192,
        }
    }
}

/// Application-wide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub log_level: String,
    pub codepage: CodePage,
    pub thunks: ThunkConfig,
    pub memory: MemoryConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            codepage: CodePage::default(),
            thunks: ThunkConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: BridgeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        tracing::debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Render the configuration back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<()> {
        if let Some(max) = self.thunks.max_slots {
            if self.thunks.initial_slots > max {
                return Err(ConfigError::PoolBounds {
                    initial: self.thunks.initial_slots,
                    max,
                });
            }
        }
        Ok(())
    }
}
