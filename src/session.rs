//! Session persistence: autosave snapshots and named style presets over
//! a small key-value store abstraction.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context as _;

use crate::config::{BgConfig, RenderConfig, TextConfig};
use crate::error::LyrvidResult;
use crate::model::LyricEntry;

const AUTOSAVE_KEY: &str = "lyrvid_session";
const PRESETS_KEY: &str = "lyrvid_style_presets";

/// String key-value persistence; a JSON file in production, memory in
/// tests.
pub trait KvStore {
    fn get(&self, key: &str) -> LyrvidResult<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> LyrvidResult<()>;
    fn remove(&mut self, key: &str) -> LyrvidResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryKvStore {
    map: BTreeMap<String, String>,
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> LyrvidResult<Option<String>> {
        Ok(self.map.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> LyrvidResult<()> {
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> LyrvidResult<()> {
        self.map.remove(key);
        Ok(())
    }
}

/// Write-through store backed by one JSON file holding a string map.
#[derive(Debug)]
pub struct JsonFileKvStore {
    path: PathBuf,
    map: BTreeMap<String, String>,
}

impl JsonFileKvStore {
    pub fn open(path: impl Into<PathBuf>) -> LyrvidResult<Self> {
        let path = path.into();
        let map = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read session store '{}'", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("malformed session store '{}'", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, map })
    }

    fn flush(&self) -> LyrvidResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create session directory '{}'", parent.display())
            })?;
        }
        let raw = serde_json::to_string_pretty(&self.map).context("serialize session store")?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("failed to write session store '{}'", self.path.display()))?;
        Ok(())
    }
}

impl KvStore for JsonFileKvStore {
    fn get(&self, key: &str) -> LyrvidResult<Option<String>> {
        Ok(self.map.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> LyrvidResult<()> {
        self.map.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> LyrvidResult<()> {
        if self.map.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// Which parser produced the current lyrics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LyricSourceKind {
    #[default]
    Normal,
    Apple,
}

/// Everything needed to restore an editing session.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionSnapshot {
    pub synced_lyrics: Vec<LyricEntry>,
    pub config: RenderConfig,
    pub lyric_type: LyricSourceKind,
}

/// Named look preset: the text styling plus the background treatment.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StylePreset {
    pub text: TextConfig,
    pub bg: BgConfig,
}

pub fn save_snapshot(store: &mut dyn KvStore, snapshot: &SessionSnapshot) -> LyrvidResult<()> {
    let raw = serde_json::to_string(snapshot).context("serialize session snapshot")?;
    store.set(AUTOSAVE_KEY, &raw)
}

/// The last autosaved snapshot, or `None` when there is nothing to
/// restore.
pub fn load_snapshot(store: &dyn KvStore) -> LyrvidResult<Option<SessionSnapshot>> {
    let Some(raw) = store.get(AUTOSAVE_KEY)? else {
        return Ok(None);
    };
    let snapshot = serde_json::from_str(&raw).context("malformed session snapshot")?;
    Ok(Some(snapshot))
}

pub fn clear_snapshot(store: &mut dyn KvStore) -> LyrvidResult<()> {
    store.remove(AUTOSAVE_KEY)
}

pub fn load_presets(store: &dyn KvStore) -> LyrvidResult<BTreeMap<String, StylePreset>> {
    let Some(raw) = store.get(PRESETS_KEY)? else {
        return Ok(BTreeMap::new());
    };
    let presets = serde_json::from_str(&raw).context("malformed style presets")?;
    Ok(presets)
}

pub fn save_preset(
    store: &mut dyn KvStore,
    name: &str,
    preset: StylePreset,
) -> LyrvidResult<()> {
    let mut presets = load_presets(store)?;
    presets.insert(name.to_string(), preset);
    let raw = serde_json::to_string(&presets).context("serialize style presets")?;
    store.set(PRESETS_KEY, &raw)
}

pub fn delete_preset(store: &mut dyn KvStore, name: &str) -> LyrvidResult<()> {
    let mut presets = load_presets(store)?;
    if presets.remove(name).is_some() {
        let raw = serde_json::to_string(&presets).context("serialize style presets")?;
        store.set(PRESETS_KEY, &raw)?;
    }
    Ok(())
}
