use std::{fs, path::{Path, PathBuf}};
use serde::{Serialize, Deserialize};
use toml;
use anyhow::{self, Context};

use crate::backend::{FileStore, RecordNaming};
use crate::core::{Amount, MalformedPolicy, Progress};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
    #[serde(flatten)]
    pub naming: RecordNaming
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig { dir: PathBuf::from("./output"), naming: RecordNaming::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub on_malformed: MalformedPolicy
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub goal: Amount,
    pub currency: String,
    pub refresh_secs: u64
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            goal: Amount::from(Progress::DEFAULT_GOAL),
            currency: "€".to_owned(),
            refresh_secs: 5
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub storage: StorageConfig,
    pub aggregation: AggregationConfig,
    pub display: DisplayConfig
}

impl LedgerConfig {
    pub fn read(filepath: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file_content = fs::read_to_string(filepath)
            .with_context(|| "failed to read config file")?;
        return Self::parse(&file_content);
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config = toml::from_str(content)
            .with_context(|| "failed to parse config file")?;
        return Ok(config);
    }

    pub fn open_store(&self) -> FileStore {
        FileStore::with_naming(&self.storage.dir, self.storage.naming.clone())
    }
}
