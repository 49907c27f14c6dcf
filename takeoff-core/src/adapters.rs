//! Default filesystem-backed port implementations.

use crate::load::{LoadedStore, load_stores};
use crate::ports::{ElementSource, WritePort};
use anyhow::Context;
use camino::Utf8Path;
use fs_err as fs;

/// Loads stores from files matched by glob patterns.
#[derive(Debug, Clone)]
pub struct FsElementSource {
    pub patterns: Vec<String>,
}

impl FsElementSource {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }
}

impl ElementSource for FsElementSource {
    fn load_stores(&self) -> anyhow::Result<Vec<LoadedStore>> {
        load_stores(&self.patterns)
            .with_context(|| format!("load stores from {}", self.patterns.join(", ")))
    }
}

/// In-memory store source for embedding and testing.
///
/// Sorts by path on construction to match `FsElementSource` ordering.
#[derive(Debug, Clone)]
pub struct InMemoryElementSource {
    stores: Vec<LoadedStore>,
}

impl InMemoryElementSource {
    pub fn new(mut stores: Vec<LoadedStore>) -> Self {
        stores.sort_by(|a, b| a.path.cmp(&b.path));
        Self { stores }
    }
}

impl ElementSource for InMemoryElementSource {
    fn load_stores(&self) -> anyhow::Result<Vec<LoadedStore>> {
        Ok(self.stores.clone())
    }
}

/// Filesystem write operations.
#[derive(Debug, Clone, Default)]
pub struct FsWritePort;

impl WritePort for FsWritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create parent dir for {}", path))?;
        }
        fs::write(path, contents).with_context(|| format!("write {}", path))
    }

    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()> {
        fs::create_dir_all(path).with_context(|| format!("create_dir_all {}", path))
    }
}
