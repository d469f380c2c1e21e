use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::db;
use crate::error::{NoisesError, Result};
use crate::params::{GenerationConfig, Mode, MusicalKey};

/// Name of the single store entry that holds the preset list.
pub const PRESETS_KEY: &str = "noises.presets";

const LABEL_CHARS: usize = 20;

/// A saved prompt with the few parameters worth recalling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: String,
    pub label: String,
    pub prompt: String,
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<MusicalKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Preset {
    /// Capture the current config under a fresh time-ordered id.
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            label: label_for(&config.prompt),
            prompt: config.prompt.clone(),
            mode: config.mode(),
            bpm: config.loop_params().map(|p| p.bpm),
            key: config.key,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }
}

/// First 20 characters of the prompt, with `...` when it was cut.
pub fn label_for(prompt: &str) -> String {
    let prompt = prompt.trim();
    if prompt.chars().count() > LABEL_CHARS {
        let head: String = prompt.chars().take(LABEL_CHARS).collect();
        format!("{}...", head)
    } else {
        prompt.to_string()
    }
}

/// Durable, newest-first list of presets.
///
/// Every mutation is written through to the key-value store before it
/// returns, and the in-memory list only changes once that write succeeded.
/// Unreadable stored data is treated as an empty list.
pub struct PresetStore {
    conn: Connection,
    presets: Vec<Preset>,
    limit: Option<usize>,
}

impl PresetStore {
    /// Open the store at `path`, or in memory when `None`.
    ///
    /// A database file that cannot be opened is moved aside to
    /// `<path>.corrupt` and recreated empty. If that fails too, presets are
    /// kept in memory for the session.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::from_connection(db::open_database(None)?);
        };
        let err = match Self::open_file(path) {
            Ok(store) => return Ok(store),
            Err(e) => e,
        };
        warn!(error = %err, path = %path.display(), "preset store is unreadable, moving it aside");

        match move_aside(path).and_then(|_| Self::open_file(path)) {
            Ok(store) => Ok(store),
            Err(e) => {
                warn!(error = %e, "keeping presets in memory for this session");
                Self::from_connection(db::open_database(None)?)
            }
        }
    }

    fn open_file(path: &Path) -> Result<Self> {
        Self::from_connection(db::open_database(Some(path))?)
    }

    /// Load presets from an already opened key-value database.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let presets = match db::get_value(&conn, PRESETS_KEY)? {
            Some(raw) => match serde_json::from_str::<Vec<Preset>>(&raw) {
                Ok(presets) => presets,
                Err(e) => {
                    warn!(error = %e, "stored presets are unreadable, starting empty");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        debug!(count = presets.len(), "loaded presets");
        Ok(Self {
            conn,
            presets,
            limit: None,
        })
    }

    /// Keep at most `limit` presets; the oldest are dropped on save.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Save the current config as a new preset and return it.
    pub fn save(&mut self, config: &GenerationConfig) -> Result<Preset> {
        let preset = Preset::from_config(config);
        let mut presets = Vec::with_capacity(self.presets.len() + 1);
        presets.push(preset.clone());
        presets.extend(self.presets.iter().cloned());
        if let Some(limit) = self.limit {
            presets.truncate(limit.max(1));
        }
        self.commit(presets)?;
        Ok(preset)
    }

    /// Delete a preset by id. Returns whether it existed.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        if self.get(id).is_none() {
            return Ok(false);
        }
        let presets = self.presets.iter().filter(|p| p.id != id).cloned().collect();
        self.commit(presets)?;
        Ok(true)
    }

    /// Drop every preset and the stored entry itself.
    pub fn clear(&mut self) -> Result<()> {
        db::delete_value(&self.conn, PRESETS_KEY)?;
        self.presets.clear();
        Ok(())
    }

    pub fn list(&self) -> &[Preset] {
        &self.presets
    }

    pub fn get(&self, id: &str) -> Option<&Preset> {
        self.presets.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    fn commit(&mut self, presets: Vec<Preset>) -> Result<()> {
        let raw = serde_json::to_string(&presets)?;
        db::put_value(&self.conn, PRESETS_KEY, &raw)?;
        self.presets = presets;
        Ok(())
    }
}

fn move_aside(path: &Path) -> Result<()> {
    let mut aside = path.as_os_str().to_owned();
    aside.push(".corrupt");
    std::fs::rename(path, &aside).map_err(|e| {
        NoisesError::Store(format!("Failed to move {} aside: {}", path.display(), e))
    })?;
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        if let Err(e) = std::fs::remove_file(&sidecar) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(error = %e, "could not remove stale journal file");
            }
        }
    }
    Ok(())
}
