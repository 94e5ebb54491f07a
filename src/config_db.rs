use std::path::{Path, PathBuf};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;

use crate::{
    chunking::{ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE},
    error::{Error, Result},
    model_manager::{DEFAULT_MODEL_ID, MODEL_ENV_VAR},
};

const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

pub const MODEL_NAME_KEY: &str = "model_name";
pub const DOCUMENTS_DIR_KEY: &str = "documents_dir";
pub const CHUNK_SIZE_KEY: &str = "chunk_size";
pub const CHUNK_OVERLAP_KEY: &str = "chunk_overlap";
pub const TOP_K_KEY: &str = "top_k";

/// Every key `config set` accepts.
pub const SETTING_KEYS: &[&str] = &[
    MODEL_NAME_KEY,
    DOCUMENTS_DIR_KEY,
    CHUNK_SIZE_KEY,
    CHUNK_OVERLAP_KEY,
    TOP_K_KEY,
];

pub const DOCUMENTS_ENV_VAR: &str = "DOCRAG_DOCS";

/// Number of chunks returned when no count is given.
pub const DEFAULT_TOP_K: usize = 3;

pub struct ConfigDb {
    db: Database,
}

impl ConfigDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(redb::Error::from)?;

        // Ensure the table exists by opening it in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    /// Get a setting, returning the default if not set.
    pub fn get_setting_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_setting(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(result)
    }
}

impl std::fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDb").finish_non_exhaustive()
    }
}

/// Reject unknown keys and values that would not parse later.
pub fn validate_setting(key: &str, value: &str) -> Result<()> {
    match key {
        CHUNK_SIZE_KEY | CHUNK_OVERLAP_KEY | TOP_K_KEY => {
            parse_count(key, value)?;
        }
        MODEL_NAME_KEY | DOCUMENTS_DIR_KEY => {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{key} cannot be empty")));
            }
        }
        _ => {
            return Err(Error::NotFound {
                kind: "setting",
                name: key.to_string(),
            });
        }
    }
    Ok(())
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!(
            "{key} must be a non-negative integer, got '{value}'"
        ))
    })
}

/// Values supplied on the command line; `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct SettingOverrides {
    pub model: Option<String>,
    pub documents_dir: Option<PathBuf>,
    pub chunk_size: Option<usize>,
    pub overlap: Option<usize>,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub model: String,
    pub documents_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

impl Settings {
    /// Resolve each setting from, in order of priority:
    /// 1. The command-line override
    /// 2. Its environment variable (`DOCRAG_MODEL`, `DOCRAG_DOCS`)
    /// 3. The value stored in config.db
    /// 4. The built-in default
    pub fn resolve(
        config_db: &ConfigDb,
        overrides: &SettingOverrides,
        default_documents_dir: &Path,
    ) -> Result<Self> {
        let model = match &overrides.model {
            Some(m) => m.clone(),
            None => match std::env::var(MODEL_ENV_VAR) {
                Ok(m) => m,
                Err(_) => config_db.get_setting_or(MODEL_NAME_KEY, DEFAULT_MODEL_ID)?,
            },
        };

        let documents_dir = match &overrides.documents_dir {
            Some(p) => p.clone(),
            None => match std::env::var(DOCUMENTS_ENV_VAR) {
                Ok(p) => PathBuf::from(p),
                Err(_) => config_db
                    .get_setting(DOCUMENTS_DIR_KEY)?
                    .map(PathBuf::from)
                    .unwrap_or_else(|| default_documents_dir.to_path_buf()),
            },
        };

        let chunk_size = match overrides.chunk_size {
            Some(n) => n,
            None => stored_count(config_db, CHUNK_SIZE_KEY, DEFAULT_CHUNK_SIZE)?,
        };
        let chunk_overlap = match overrides.overlap {
            Some(n) => n,
            None => stored_count(config_db, CHUNK_OVERLAP_KEY, DEFAULT_CHUNK_OVERLAP)?,
        };
        let top_k = stored_count(config_db, TOP_K_KEY, DEFAULT_TOP_K)?;

        Ok(Self {
            model,
            documents_dir,
            chunk_size,
            chunk_overlap,
            top_k,
        })
    }

    pub fn chunking(&self) -> Result<ChunkingConfig> {
        ChunkingConfig::new(self.chunk_size, self.chunk_overlap)
    }
}

fn stored_count(config_db: &ConfigDb, key: &str, default: usize) -> Result<usize> {
    match config_db.get_setting(key)? {
        Some(value) => parse_count(key, &value),
        None => Ok(default),
    }
}
