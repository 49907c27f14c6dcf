//! Port traits abstracting all I/O away from the pipeline.

use crate::load::LoadedStore;
use camino::Utf8Path;

/// Source of element stores.
pub trait ElementSource {
    fn load_stores(&self) -> anyhow::Result<Vec<LoadedStore>>;
}

/// File-system write operations.
pub trait WritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()>;
    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()>;
}
