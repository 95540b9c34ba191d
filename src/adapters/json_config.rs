//! JSON configuration adapter.
//!
//! Implements [`ConfigPort`] over a JSON document, either held in memory
//! or read from a file at load time.  Missing keys take their defaults;
//! the result is validated before it is returned.

use std::path::PathBuf;

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::DisinfectionConfig;

enum Document {
    Text(String),
    File(PathBuf),
}

/// [`ConfigPort`] backed by a JSON document.
pub struct JsonConfigSource {
    document: Document,
}

impl JsonConfigSource {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            document: Document::Text(text.into()),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            document: Document::File(path.into()),
        }
    }

    fn parse(text: &str) -> Result<DisinfectionConfig, ConfigError> {
        let config: DisinfectionConfig = serde_json::from_str(text).map_err(|e| {
            warn!("JsonConfigSource: {}", e);
            ConfigError::Corrupted
        })?;
        config.validate()?;
        Ok(config)
    }
}

impl ConfigPort for JsonConfigSource {
    fn load(&self) -> Result<DisinfectionConfig, ConfigError> {
        let config = match &self.document {
            Document::Text(text) => Self::parse(text)?,
            Document::File(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    warn!("JsonConfigSource: {}: {}", path.display(), e);
                    if e.kind() == std::io::ErrorKind::NotFound {
                        ConfigError::NotFound
                    } else {
                        ConfigError::Corrupted
                    }
                })?;
                Self::parse(&text)?
            }
        };
        info!("JsonConfigSource: configuration loaded");
        Ok(config)
    }
}
