//! Loading element stores from JSON files.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use glob::glob;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use takeoff_domain::EntityStore;
use takeoff_types::Element;
use takeoff_types::element::ElementsFile;
use takeoff_types::schema::TAKEOFF_ELEMENTS_V1;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct LoadedStore {
    /// Unique name used for artifact directories.
    pub name: String,
    pub path: Utf8PathBuf,
    pub sha256: Option<String>,
    pub store: EntityStore,
}

impl LoadedStore {
    pub fn new(name: impl Into<String>, path: impl Into<Utf8PathBuf>, store: EntityStore) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            sha256: None,
            store,
        }
    }
}

/// Expand `patterns`, then load every matched file in path order.
///
/// A pattern that matches no file is an error.
pub fn load_stores(patterns: &[String]) -> anyhow::Result<Vec<LoadedStore>> {
    let paths = expand(patterns)?;
    let names = store_names(&paths);

    let mut out = Vec::with_capacity(paths.len());
    for (path, name) in paths.into_iter().zip(names) {
        out.push(load_store(&path, name)?);
    }
    Ok(out)
}

pub fn load_store(path: &Utf8Path, name: String) -> anyhow::Result<LoadedStore> {
    let bytes = fs::read(path)?;
    let sha256 = sha256_hex(&bytes);
    let elements = parse_elements(&bytes).with_context(|| format!("parse store {path}"))?;
    let store = EntityStore::from_elements(elements).with_context(|| format!("index store {path}"))?;

    debug!(store = %name, path = %path, elements = store.len(), "loaded store");
    Ok(LoadedStore {
        name,
        path: path.to_path_buf(),
        sha256: Some(sha256),
        store,
    })
}

/// Parse a store document: either `{"schema", "elements"}` or a bare array.
pub fn parse_elements(bytes: &[u8]) -> anyhow::Result<Vec<Element>> {
    let value: serde_json::Value = serde_json::from_slice(bytes).context("invalid JSON")?;
    if value.is_array() {
        return serde_json::from_value(value).context("invalid element array");
    }

    let file: ElementsFile = serde_json::from_value(value).context("invalid elements document")?;
    if file.schema != TAKEOFF_ELEMENTS_V1 {
        warn!(schema = %file.schema, "unexpected store schema; reading anyway");
    }
    Ok(file.elements)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn expand(patterns: &[String]) -> anyhow::Result<Vec<Utf8PathBuf>> {
    let mut paths = BTreeSet::new();
    for pattern in patterns {
        debug!(pattern = %pattern, "scanning for element stores");

        let mut matched = 0usize;
        for entry in glob(pattern).with_context(|| format!("glob {pattern}"))? {
            let path = entry.map_err(|e| anyhow::anyhow!("glob error: {e}"))?;
            let path = Utf8PathBuf::from_path_buf(path)
                .map_err(|p| anyhow::anyhow!("non UTF-8 path {}", p.display()))?;
            if path.is_file() {
                paths.insert(path);
                matched += 1;
            }
        }
        if matched == 0 {
            anyhow::bail!("no element store matches `{pattern}`");
        }
    }
    // Deterministic order matters.
    Ok(paths.into_iter().collect())
}

/// File stems, prefixed with the parent directory name where two stems collide.
fn store_names(paths: &[Utf8PathBuf]) -> Vec<String> {
    let stem = |p: &Utf8PathBuf| p.file_stem().unwrap_or("store").to_string();

    let mut stems: BTreeMap<String, usize> = BTreeMap::new();
    for p in paths {
        *stems.entry(stem(p)).or_default() += 1;
    }

    let mut taken = BTreeSet::new();
    paths
        .iter()
        .map(|p| {
            let base = stem(p);
            let mut name = if stems[&base] > 1 {
                let parent = p.parent().and_then(|d| d.file_name()).unwrap_or("root");
                format!("{parent}-{base}")
            } else {
                base
            };
            if taken.contains(&name) {
                let mut n = 2;
                while taken.contains(&format!("{name}-{n}")) {
                    n += 1;
                }
                name = format!("{name}-{n}");
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}
