//! Canonical location names and their centroids.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Kilometres per degree used for the planar distance approximation.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Latitude/longitude centroid in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Euclidean distance in degrees.
    pub fn degrees_to(&self, other: &Coordinate) -> f64 {
        ((self.lat - other.lat).powi(2) + (self.lon - other.lon).powi(2)).sqrt()
    }

    /// Planar distance in kilometres (degrees scaled by 111).
    pub fn km_to(&self, other: &Coordinate) -> f64 {
        self.degrees_to(other) * KM_PER_DEGREE
    }
}

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("location '{0}' is already registered")]
    Duplicate(String),
    #[error("alias '{alias}' points to unknown location '{canonical}'")]
    UnknownCanonical { alias: String, canonical: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationEntry {
    pub name: String,
    pub coordinate: Coordinate,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Closed set of locations with fixed centroids and name aliases.
///
/// Lookups are case-insensitive and ignore surrounding whitespace. The
/// registry is passed explicitly to everything that needs coordinates or
/// name normalisation.
#[derive(Debug, Clone, Default)]
pub struct LocationRegistry {
    entries: Vec<LocationEntry>,
    index: HashMap<String, usize>,
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl LocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry covering the PIHPS markets of West Java and Jakarta.
    pub fn west_java() -> Self {
        let mut registry = Self::new();
        let entries: [(&str, f64, f64, &[&str]); 11] = [
            ("DKI Jakarta", -6.2088, 106.8456, &["Jakarta", "Provinsi DKI Jakarta"]),
            ("Jakarta Pusat", -6.1805, 106.8284, &["Kota Jakarta Pusat"]),
            ("Bandung", -6.9175, 107.6191, &["Kota Bandung"]),
            ("Bogor", -6.5971, 106.8060, &["Kota Bogor"]),
            ("Bekasi", -6.2383, 106.9756, &["Kota Bekasi"]),
            ("Depok", -6.4025, 106.7942, &["Kota Depok"]),
            ("Cirebon", -6.7320, 108.5523, &["Kota Cirebon"]),
            ("Sukabumi", -6.9277, 106.9300, &["Kota Sukabumi"]),
            ("Tasikmalaya", -7.3196, 108.2207, &["Kota Tasikmalaya"]),
            ("Kab. Cirebon", -6.7500, 108.5000, &["Kabupaten Cirebon"]),
            ("Kab. Tasikmalaya", -7.3500, 108.2500, &["Kabupaten Tasikmalaya"]),
        ];

        for (name, lat, lon, aliases) in entries {
            registry.index.insert(key(name), registry.entries.len());
            registry.entries.push(LocationEntry {
                name: name.to_string(),
                coordinate: Coordinate::new(lat, lon),
                aliases: Vec::new(),
            });
            for alias in aliases {
                registry.index.insert(key(alias), registry.entries.len() - 1);
                if let Some(entry) = registry.entries.last_mut() {
                    entry.aliases.push((*alias).to_string());
                }
            }
        }
        registry
    }

    /// Build a registry from serialised entries.
    pub fn from_entries(entries: Vec<LocationEntry>) -> Result<Self, LocationError> {
        let mut registry = Self::new();
        for entry in entries {
            let aliases = entry.aliases.clone();
            registry.register(&entry.name, entry.coordinate)?;
            for alias in aliases {
                registry.add_alias(&alias, &entry.name)?;
            }
        }
        Ok(registry)
    }

    /// Register a canonical location.
    pub fn register(&mut self, name: &str, coordinate: Coordinate) -> Result<(), LocationError> {
        let k = key(name);
        if self.index.contains_key(&k) {
            return Err(LocationError::Duplicate(name.to_string()));
        }
        self.index.insert(k, self.entries.len());
        self.entries.push(LocationEntry {
            name: name.trim().to_string(),
            coordinate,
            aliases: Vec::new(),
        });
        Ok(())
    }

    /// Map an alternative spelling onto a registered location.
    pub fn add_alias(&mut self, alias: &str, canonical: &str) -> Result<(), LocationError> {
        let idx = *self
            .index
            .get(&key(canonical))
            .ok_or_else(|| LocationError::UnknownCanonical {
                alias: alias.to_string(),
                canonical: canonical.to_string(),
            })?;
        let k = key(alias);
        if let Some(&existing) = self.index.get(&k) {
            if existing != idx {
                return Err(LocationError::Duplicate(alias.to_string()));
            }
            return Ok(());
        }
        self.index.insert(k, idx);
        self.entries[idx].aliases.push(alias.trim().to_string());
        Ok(())
    }

    /// Canonical name for a raw name or alias.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.index
            .get(&key(name))
            .map(|&idx| self.entries[idx].name.as_str())
    }

    pub fn coordinate(&self, name: &str) -> Option<Coordinate> {
        self.index
            .get(&key(name))
            .map(|&idx| self.entries[idx].coordinate)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&key(name))
    }

    /// Canonical names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn entries(&self) -> &[LocationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
