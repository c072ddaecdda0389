//! Mapping presets stored on disk.
//!
//! Each preset is one JSON file under the registry directory, holding a
//! [`MappingSet`] and the source columns it reads. When a new CSV arrives,
//! [`MappingRegistry::find_compatible`] ranks presets by how many of their
//! columns the file actually has.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::api::logs::{log_info, log_warning};
use crate::config::DEFAULT_REGISTRY_DIR;
use crate::error::{RegistryError, RegistryResult};
use crate::transform::MappingSet;

/// Presets scoring at or below this share of matching columns are not offered.
const MIN_COMPATIBILITY: f64 = 0.5;

/// A saved mapping with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMapping {
    pub id: String,
    pub name: String,
    pub mappings: MappingSet,
    /// Source columns referenced by `mappings`.
    pub source_columns: Vec<String>,
    /// RFC 3339.
    pub created_at: String,
    #[serde(default)]
    pub last_used: Option<String>,
    #[serde(default)]
    pub use_count: u32,
}

pub struct MappingRegistry {
    registry_dir: PathBuf,
    presets: HashMap<String, StoredMapping>,
}

impl MappingRegistry {
    /// Open the registry in [`DEFAULT_REGISTRY_DIR`].
    pub fn new() -> Self {
        Self::with_dir(DEFAULT_REGISTRY_DIR)
    }

    /// Open a registry in `dir`, loading every readable preset.
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut registry = Self {
            registry_dir: dir.as_ref().to_path_buf(),
            presets: HashMap::new(),
        };
        registry.load_all();
        registry
    }

    fn load_all(&mut self) {
        let Ok(entries) = fs::read_dir(&self.registry_dir) else {
            return;
        };

        for path in entries.flatten().map(|e| e.path()) {
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let loaded = fs::read_to_string(&path)
                .map_err(RegistryError::from)
                .and_then(|content| Ok(serde_json::from_str::<StoredMapping>(&content)?));
            match loaded {
                Ok(preset) => {
                    self.presets.insert(preset.id.clone(), preset);
                }
                Err(e) => log_warning(format!("Skipping preset {}: {}", path.display(), e)),
            }
        }
    }

    /// Presets sorted by name.
    pub fn list(&self) -> Vec<&StoredMapping> {
        let mut presets: Vec<_> = self.presets.values().collect();
        presets.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        presets
    }

    pub fn get(&self, id: &str) -> RegistryResult<&StoredMapping> {
        self.presets
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Presets usable with a CSV exposing `column_keys`, best first.
    ///
    /// The score is the share of a preset's source columns present in the
    /// file (case-insensitive). Ties go to the most used preset.
    pub fn find_compatible(&self, column_keys: &[String]) -> Vec<(&StoredMapping, f64)> {
        let mut compatible: Vec<_> = self
            .presets
            .values()
            .map(|p| (p, compatibility(&p.source_columns, column_keys)))
            .filter(|(_, score)| *score > MIN_COMPATIBILITY)
            .collect();

        compatible.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.use_count.cmp(&a.0.use_count))
        });
        compatible
    }

    /// Store `mappings` under `name`, returning the new preset id.
    pub fn save(&mut self, mappings: MappingSet, name: &str) -> RegistryResult<String> {
        fs::create_dir_all(&self.registry_dir)?;

        let preset = StoredMapping {
            id: preset_id(name),
            name: name.to_string(),
            source_columns: mappings.source_columns(),
            mappings,
            created_at: Utc::now().to_rfc3339(),
            last_used: None,
            use_count: 0,
        };
        self.write(&preset)?;

        log_info(format!("Saved mapping preset '{}' ({})", preset.name, preset.id));
        let id = preset.id.clone();
        self.presets.insert(id.clone(), preset);
        Ok(id)
    }

    /// Store a mapping JSON file as a preset. The name defaults to the file stem.
    pub fn import(&mut self, path: &Path, name: Option<&str>) -> RegistryResult<String> {
        let content = fs::read_to_string(path)?;
        let mappings: MappingSet = serde_json::from_str(&content)?;

        let name = name.unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("imported")
        });
        self.save(mappings, name)
    }

    /// Record one use of a preset.
    pub fn mark_used(&mut self, id: &str) -> RegistryResult<()> {
        let preset = self
            .presets
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        preset.use_count += 1;
        preset.last_used = Some(Utc::now().to_rfc3339());

        let preset = preset.clone();
        self.write(&preset)
    }

    pub fn delete(&mut self, id: &str) -> RegistryResult<()> {
        if self.presets.remove(id).is_none() {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        fs::remove_file(self.path_of(id))?;
        log_info(format!("Deleted mapping preset {}", id));
        Ok(())
    }

    fn write(&self, preset: &StoredMapping) -> RegistryResult<()> {
        let content = serde_json::to_string_pretty(preset)?;
        fs::write(self.path_of(&preset.id), content)?;
        Ok(())
    }

    fn path_of(&self, id: &str) -> PathBuf {
        self.registry_dir.join(format!("{}.json", id))
    }
}

impl Default for MappingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn compatibility(stored: &[String], columns: &[String]) -> f64 {
    if stored.is_empty() {
        return 0.0;
    }
    let columns: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();
    let hits = stored
        .iter()
        .filter(|s| columns.contains(&s.to_lowercase()))
        .count();
    hits as f64 / stored.len() as f64
}

/// `"Ghana Co-op!"` -> `"ghana-co-op-1a2b3c4d"`
fn preset_id(name: &str) -> String {
    let slug = name
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let suffix = Uuid::new_v4().simple().to_string();
    let slug = if slug.is_empty() { "preset".to_string() } else { slug };
    format!("{}-{}", slug, &suffix[..8])
}
