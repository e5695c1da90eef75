pub mod def_use;
pub mod document;
pub mod export;
pub mod geometry;
pub mod import;
pub mod material;
pub mod numeric;
pub mod texture_store;
pub mod transform;

use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::config::ExchangeConfig;
use crate::error::Diagnostics;
use crate::scene_graph::SceneHost;

pub use document::Element;
pub use export::{export_scene, ExportOutcome};
pub use import::{import_document, ImportOutcome};
pub use texture_store::{DirectoryTextureStore, TextureStore};

/// Exports the hierarchies under `roots` to `path`, writing textures and
/// lightmaps next to it.
pub fn write_x3d_file<H: SceneHost>(
    host: &H,
    roots: &[H::NodeId],
    path: &Path,
    config: &ExchangeConfig,
) -> anyhow::Result<Diagnostics> {
    let mut textures = DirectoryTextureStore::beside(path);
    let outcome = export_scene(host, roots, config, &mut textures)
        .with_context(|| format!("Failed to export {}", path.display()))?;

    let text = document::write_document(&outcome.document)?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;

    log::info!(
        "Wrote {} ({} diagnostics)",
        path.display(),
        outcome.diagnostics.len()
    );

    Ok(outcome.diagnostics)
}

/// Imports the document at `path` into `host`. Texture URLs are resolved
/// relative to the document's directory.
pub fn read_x3d_file<H: SceneHost>(
    host: &mut H,
    path: &Path,
) -> anyhow::Result<ImportOutcome<H::NodeId>> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let root = document::parse_document(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let textures = DirectoryTextureStore::beside(path);
    let outcome = import_document(host, &root, &textures)
        .with_context(|| format!("Failed to import {}", path.display()))?;

    Ok(outcome)
}
