//! Indicator catalog: which indicators the user has configured, with what
//! parameters, and whether they are switched on.
//!
//! Persistence goes through an injected [`CatalogStore`], so the core never
//! touches ambient storage itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Largest period any indicator parameter resolves to.
pub const MAX_PERIOD: usize = 10_000;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("indicator id already in catalog: {0}")]
    DuplicateId(String),

    #[error("no indicator with id: {0}")]
    NotFound(String),

    #[error("catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where an indicator is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// On the price scale.
    Overlay,
    /// In its own panel.
    Separate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub id: String,
    pub name: String,
    pub kind: Placement,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl IndicatorConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: Placement) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            params: BTreeMap::new(),
            enabled: true,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn param(&self, key: &str) -> Option<f64> {
        self.params.get(key).copied()
    }

    /// Integer parameter (periods), falling back to `default` when missing
    /// or not a usable positive number. Capped at [`MAX_PERIOD`].
    pub fn period(&self, key: &str, default: usize) -> usize {
        match self.param(key) {
            Some(v) if v.is_finite() && v >= 1.0 => (v.round() as usize).min(MAX_PERIOD),
            _ => default,
        }
    }
}

/// Load/save hook for the catalog.
pub trait CatalogStore: Send {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<Vec<IndicatorConfig>>, CatalogError>;

    fn save(&self, entries: &[IndicatorConfig]) -> Result<(), CatalogError>;
}

/// Catalog persisted as pretty JSON on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogStore for JsonFileStore {
    fn load(&self) -> Result<Option<Vec<IndicatorConfig>>, CatalogError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, entries: &[IndicatorConfig]) -> Result<(), CatalogError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), count = entries.len(), "catalog saved");
        Ok(())
    }
}

/// In-process store. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<Vec<IndicatorConfig>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<IndicatorConfig>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(entries))),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Vec<IndicatorConfig>>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CatalogStore for MemoryStore {
    fn load(&self) -> Result<Option<Vec<IndicatorConfig>>, CatalogError> {
        Ok(self.lock().clone())
    }

    fn save(&self, entries: &[IndicatorConfig]) -> Result<(), CatalogError> {
        *self.lock() = Some(entries.to_vec());
        Ok(())
    }
}

/// Ordered list of indicator configs with unique ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorCatalog {
    entries: Vec<IndicatorConfig>,
}

impl IndicatorCatalog {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The eight built-in indicators with their standard parameters.
    pub fn default_catalog() -> Self {
        let entries = vec![
            IndicatorConfig::new("rsi", "RSI", Placement::Separate).with_param("period", 14.0),
            IndicatorConfig::new("macd", "MACD", Placement::Separate)
                .with_param("fast", 12.0)
                .with_param("slow", 26.0)
                .with_param("signal", 9.0),
            IndicatorConfig::new("bollinger", "Bollinger Bands", Placement::Overlay)
                .with_param("period", 20.0)
                .with_param("std_dev", 2.0),
            IndicatorConfig::new("ema", "EMA", Placement::Overlay).with_param("period", 20.0),
            IndicatorConfig::new("sma", "SMA", Placement::Overlay)
                .with_param("period", 50.0)
                .disabled(),
            IndicatorConfig::new("stochastic", "Stochastic", Placement::Separate)
                .with_param("k_period", 14.0)
                .with_param("d_period", 3.0)
                .disabled(),
            IndicatorConfig::new("atr", "ATR", Placement::Separate)
                .with_param("period", 14.0)
                .disabled(),
            IndicatorConfig::new("volume", "Volume", Placement::Separate)
                .with_param("period", 20.0),
        ];
        Self { entries }
    }

    /// Build from stored entries. Later duplicates of an id are rejected.
    pub fn from_entries(entries: Vec<IndicatorConfig>) -> Result<Self, CatalogError> {
        let mut catalog = Self::empty();
        for entry in entries {
            catalog.add(entry)?;
        }
        Ok(catalog)
    }

    /// Load from `store`, or the default catalog when nothing is stored.
    pub fn load(store: &dyn CatalogStore) -> Result<Self, CatalogError> {
        match store.load()? {
            Some(entries) => Self::from_entries(entries),
            None => Ok(Self::default_catalog()),
        }
    }

    pub fn save(&self, store: &dyn CatalogStore) -> Result<(), CatalogError> {
        store.save(&self.entries)
    }

    pub fn list(&self) -> &[IndicatorConfig] {
        &self.entries
    }

    pub fn enabled(&self) -> impl Iterator<Item = &IndicatorConfig> {
        self.entries.iter().filter(|e| e.enabled)
    }

    pub fn get(&self, id: &str) -> Option<&IndicatorConfig> {
        self.entries.iter().find(|e| e.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut IndicatorConfig, CatalogError> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    pub fn add(&mut self, config: IndicatorConfig) -> Result<(), CatalogError> {
        if self.get(&config.id).is_some() {
            return Err(CatalogError::DuplicateId(config.id));
        }
        self.entries.push(config);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<IndicatorConfig, CatalogError> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        Ok(self.entries.remove(pos))
    }

    /// Flip `enabled`; returns the new value.
    pub fn toggle(&mut self, id: &str) -> Result<bool, CatalogError> {
        let entry = self.get_mut(id)?;
        entry.enabled = !entry.enabled;
        Ok(entry.enabled)
    }

    /// Merge `params` into the entry, overwriting keys that already exist.
    pub fn update_params(
        &mut self,
        id: &str,
        params: BTreeMap<String, f64>,
    ) -> Result<(), CatalogError> {
        let entry = self.get_mut(id)?;
        entry.params.extend(params);
        Ok(())
    }
}

impl Default for IndicatorCatalog {
    fn default() -> Self {
        Self::default_catalog()
    }
}
