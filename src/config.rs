// Configuration for embedding applications

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_ngram_size() -> usize {
    6
}

/// Settings for loading and comparing a melody collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory or zip archive melodies are loaded from
    pub source_path: PathBuf,

    /// Collection name override; the source path's stem when unset
    #[serde(default)]
    pub collection_name: Option<String>,

    /// Window length for n-gram extraction
    #[serde(default = "default_ngram_size")]
    pub ngram_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("melodies"),
            collection_name: None,
            ngram_size: default_ngram_size(),
        }
    }
}

impl Config {
    /// Load config from disk or return the default.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => {
                        log::warn!("failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    log::warn!("failed to read config file: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Save config to disk.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }
}
