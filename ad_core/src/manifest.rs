use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Error;

/// One downloadable file with its expected digest (hex, any supported length).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub url: String,
    #[serde(default)]
    pub hash: String,
}

impl ManifestFile {
    pub fn new(url: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            hash: hash.into(),
        }
    }
}

/// Locale- or version-keyed table of files, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionManifest {
    entries: Vec<(String, Vec<ManifestFile>)>,
}

impl VersionManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the files listed under `key`.
    pub fn insert(&mut self, key: impl Into<String>, files: Vec<ManifestFile>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = files,
            None => self.entries.push((key, files)),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[ManifestFile])> {
        self.entries
            .iter()
            .map(|(key, files)| (key.as_str(), files.as_slice()))
    }

    pub fn get(&self, key: &str) -> Option<&[ManifestFile]> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, files)| files.as_slice())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when every listed URL is already absolute.
    pub fn all_urls_absolute(&self) -> bool {
        self.entries
            .iter()
            .flat_map(|(_, files)| files)
            .all(|f| f.url.to_ascii_lowercase().starts_with("http"))
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<ManifestFile>)> for VersionManifest {
    fn from_iter<I: IntoIterator<Item = (K, Vec<ManifestFile>)>>(iter: I) -> Self {
        let mut manifest = VersionManifest::new();
        for (key, files) in iter {
            manifest.insert(key, files);
        }
        manifest
    }
}

impl Serialize for VersionManifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, files) in &self.entries {
            map.serialize_entry(key, files)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for VersionManifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ManifestVisitor;

        impl<'de> Visitor<'de> for ManifestVisitor {
            type Value = VersionManifest;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of keys to file lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut manifest = VersionManifest::new();
                while let Some((key, files)) = access.next_entry::<String, Vec<ManifestFile>>()? {
                    manifest.insert(key, files);
                }
                Ok(manifest)
            }
        }

        deserializer.deserialize_map(ManifestVisitor)
    }
}

/// Everything needed to fetch and install one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    pub install_dir: PathBuf,
    /// Current files, keyed by locale
    pub download: VersionManifest,
    /// Update files, keyed by the installed package version
    #[serde(default)]
    pub update: Option<VersionManifest>,
    /// Selects a private source and its credentials
    #[serde(default)]
    pub server_key: Option<String>,
}

impl PackageSpec {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::InvalidConfig {
            message: format!("failed to parse package description: {e}"),
        })
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfig {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_json(&json)
    }
}
