//! Remote firmware catalog: one entry per board with its flash layout.

use crate::errors::{InstallerError, InstallerResult};
use cpi_hal::ChipFamily;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Latest CircuitPython release, substituted for `VERSION` in filenames.
    pub semver: String,
    pub firmwares: Vec<BoardFirmwareEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardFirmwareEntry {
    pub id: String,
    pub name: String,
    pub chip_family: ChipFamily,
    pub settings: BoardSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSettings {
    /// Hex offset where the generated settings file is written.
    pub offset: String,
    /// Hex offset -> version-templated filename, in declared order.
    pub structure: StructureMap,
    /// Version-templated name of the .uf2 to copy, when the board has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uf2: Option<String>,
}

/// Ordered `offset -> filename` pairs.
///
/// Kept as a list so writes happen in the order the catalog declares them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructureMap(pub Vec<(String, String)>);

impl StructureMap {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StructureMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        StructureMap(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Serialize for StructureMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (offset, filename) in &self.0 {
            map.serialize_entry(offset, filename)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StructureMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = StructureMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of hex offsets to filenames")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<StructureMap, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((offset, filename)) = access.next_entry::<String, String>()? {
                    entries.push((offset, filename));
                }
                Ok(StructureMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

impl Catalog {
    pub fn from_json(text: &str) -> InstallerResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| InstallerError::Fetch(format!("Invalid firmware catalog: {}", e)))
    }

    /// Entry for the selected board.
    pub fn lookup(&self, board_id: Option<&str>) -> InstallerResult<&BoardFirmwareEntry> {
        let board_id = board_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| InstallerError::CatalogLookup("No board selected.".to_string()))?;
        self.firmwares
            .iter()
            .find(|entry| entry.id == board_id)
            .ok_or_else(|| {
                InstallerError::CatalogLookup(format!("No firmware entry for: {}", board_id))
            })
    }

    /// Boards whose catalog entry declares `chip`.
    pub fn compatible_with(&self, chip: ChipFamily) -> Vec<&BoardFirmwareEntry> {
        self.firmwares
            .iter()
            .filter(|entry| entry.chip_family == chip)
            .collect()
    }

    /// Parsed release version, if the catalog carries a valid one.
    pub fn version(&self) -> Option<semver::Version> {
        semver::Version::parse(self.semver.trim_start_matches('v')).ok()
    }
}
