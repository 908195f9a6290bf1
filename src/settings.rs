//! Arena layout and its persistence
//!
//! The layout is the set of coordinates a match needs: the lobby anchor
//! everyone gathers at, and the map slots with their arena location and
//! spawn points. The engine edits it only while Idle and hands every change
//! to a [`LayoutStore`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{ConfigError, Rejection, StartRefusal};

/// A point in a named world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }
}

/// One votable arena.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapSlot {
    pub name: String,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub spawns: Vec<Location>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArenaLayout {
    #[serde(default)]
    pub lobby: Option<Location>,
    #[serde(default)]
    pub maps: Vec<MapSlot>,
}

impl ArenaLayout {
    /// Load a layout from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let layout: ArenaLayout = ron::from_str(&contents).map_err(|source| ConfigError::Ron {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), maps = layout.maps.len(), "loaded arena layout");
        Ok(layout)
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    pub fn map(&self, name: &str) -> Option<&MapSlot> {
        self.maps.iter().find(|map| map.name == name)
    }

    fn map_mut(&mut self, name: &str) -> Result<&mut MapSlot, Rejection> {
        self.maps
            .iter_mut()
            .find(|map| map.name == name)
            .ok_or_else(|| Rejection::UnknownMap(name.to_string()))
    }

    pub fn map_names(&self) -> Vec<String> {
        self.maps.iter().map(|map| map.name.clone()).collect()
    }

    /// First missing piece that stops a match from starting.
    pub fn check(&self) -> Result<(), StartRefusal> {
        if self.lobby.is_none() {
            return Err(StartRefusal::NoLobby);
        }
        if self.maps.is_empty() {
            return Err(StartRefusal::NoMaps);
        }
        for map in &self.maps {
            if map.location.is_none() {
                return Err(StartRefusal::MapWithoutLocation(map.name.clone()));
            }
            if map.spawns.is_empty() {
                return Err(StartRefusal::MapWithoutSpawns(map.name.clone()));
            }
        }
        Ok(())
    }

    pub fn set_lobby(&mut self, at: Location) {
        self.lobby = Some(at);
    }

    pub fn add_map(&mut self, name: &str) -> Result<(), Rejection> {
        if self.map(name).is_some() {
            return Err(Rejection::DuplicateMap(name.to_string()));
        }
        self.maps.push(MapSlot {
            name: name.to_string(),
            location: None,
            spawns: Vec::new(),
        });
        Ok(())
    }

    pub fn remove_map(&mut self, name: &str) -> Result<MapSlot, Rejection> {
        let index = self
            .maps
            .iter()
            .position(|map| map.name == name)
            .ok_or_else(|| Rejection::UnknownMap(name.to_string()))?;
        Ok(self.maps.remove(index))
    }

    pub fn set_map_location(&mut self, name: &str, at: Location) -> Result<(), Rejection> {
        self.map_mut(name)?.location = Some(at);
        Ok(())
    }

    pub fn add_map_spawn(&mut self, name: &str, at: Location) -> Result<(), Rejection> {
        self.map_mut(name)?.spawns.push(at);
        Ok(())
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Persistence sink for lobby and map coordinates.
pub trait LayoutStore: Send + Sync {
    fn save(&mut self, layout: &ArenaLayout) -> bool;
}

/// Writes the layout as pretty RON to a file.
#[derive(Debug, Clone)]
pub struct RonLayoutStore {
    path: PathBuf,
}

impl RonLayoutStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored layout, or an empty one if the file does not exist yet.
    pub fn load(&self) -> Result<ArenaLayout, ConfigError> {
        if self.path.exists() {
            ArenaLayout::load(&self.path)
        } else {
            tracing::info!(path = %self.path.display(), "no layout file found, starting empty");
            Ok(ArenaLayout::default())
        }
    }
}

impl LayoutStore for RonLayoutStore {
    fn save(&mut self, layout: &ArenaLayout) -> bool {
        let contents = match layout.to_ron() {
            Ok(contents) => contents,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize layout");
                return false;
            }
        };
        match fs::write(&self.path, contents) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "saved arena layout");
                true
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed to save layout");
                false
            }
        }
    }
}

/// Keeps the last saved layout in memory. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryLayoutStore {
    saved: Arc<Mutex<Option<ArenaLayout>>>,
}

impl MemoryLayoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_saved(&self) -> Option<ArenaLayout> {
        self.saved.lock().ok().and_then(|saved| saved.clone())
    }
}

impl LayoutStore for MemoryLayoutStore {
    fn save(&mut self, layout: &ArenaLayout) -> bool {
        match self.saved.lock() {
            Ok(mut saved) => {
                *saved = Some(layout.clone());
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn here() -> Location {
        Location::new("arena", 0.0, 64.0, 0.0)
    }

    #[test]
    fn test_check_names_first_missing_piece() {
        let mut layout = ArenaLayout::default();
        assert_eq!(layout.check(), Err(StartRefusal::NoLobby));
        layout.set_lobby(here());
        assert_eq!(layout.check(), Err(StartRefusal::NoMaps));
        layout.add_map("ruins").unwrap();
        assert_eq!(layout.check(), Err(StartRefusal::MapWithoutLocation("ruins".to_string())));
        layout.set_map_location("ruins", here()).unwrap();
        assert_eq!(layout.check(), Err(StartRefusal::MapWithoutSpawns("ruins".to_string())));
        layout.add_map_spawn("ruins", here()).unwrap();
        assert_eq!(layout.check(), Ok(()));
    }

    #[test]
    fn test_edits_reject_unknown_and_duplicate_maps() {
        let mut layout = ArenaLayout::default();
        layout.add_map("ruins").unwrap();
        assert_eq!(layout.add_map("ruins"), Err(Rejection::DuplicateMap("ruins".to_string())));
        assert_eq!(
            layout.add_map_spawn("docks", here()),
            Err(Rejection::UnknownMap("docks".to_string()))
        );
    }

    #[test]
    fn test_layout_ron_round_trip() {
        let mut layout = ArenaLayout::default();
        layout.set_lobby(here());
        layout.add_map("ruins").unwrap();
        layout.add_map_spawn("ruins", Location::new("arena", 5.0, 64.0, -5.0)).unwrap();
        let parsed: ArenaLayout = ron::from_str(&layout.to_ron().unwrap()).unwrap();
        assert_eq!(parsed, layout);
    }
}
