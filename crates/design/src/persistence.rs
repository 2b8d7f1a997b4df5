//! Scene documents (`.mcx` JSON) and mesh file import.
//!
//! Documents reference meshes by asset name; geometry is stored in the
//! [`AssetCache`] and linked back after the tree is loaded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use shared::{AssetRef, NodeDocument, SceneDocument};

use crate::assets::{stl, AssetCache, AssetStatus};
use crate::clone::deep_copy;
use crate::csg::ProgressFn;
use crate::error::PersistenceError;
use crate::geometry::matrix::from_cols_array;
use crate::geometry::{Mesh, SharedMesh};
use crate::node::{Node, NodeKind};
use crate::settings::EngineSettings;

/// Serialize a subtree. Non-persistable nodes are left out.
///
/// With an asset cache every mesh is stored and its asset name recorded on
/// the node; without one the node's existing `mesh_path` is written. A
/// placeholder standing in for an unresolved asset keeps that asset's name.
pub fn to_document(node: &Node, assets: Option<&AssetCache>) -> Result<NodeDocument, PersistenceError> {
    let existing = node.mesh_path();
    let mesh_path = match (assets, node.mesh()) {
        (Some(_), Some(mesh)) if existing.is_some() && mesh.is_placeholder() => existing,
        (Some(assets), Some(mesh)) => {
            let asset = assets.persist(&mesh)?;
            node.set_mesh_path(Some(asset.clone()));
            Some(asset)
        }
        _ => existing,
    };

    let children = node
        .children()
        .iter()
        .filter(|c| c.persistable())
        .map(|c| to_document(c, assets))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NodeDocument {
        id: node.id(),
        owner_id: node.owner_id(),
        clone_id: node.clone_id(),
        clone_update_count: node.clone_update_count(),
        name: node.name(),
        matrix: node.matrix().to_cols_array(),
        color: node.color(),
        output_type: node.output_type(),
        visible: node.visible(),
        mesh_path,
        kind: node.kind().to_document(),
        children,
    })
}

/// Build a tree from a document. Meshes stay unlinked until
/// [`load_mesh_links`] runs.
pub fn from_document(doc: &NodeDocument, max_depth: usize) -> Result<Node, PersistenceError> {
    build_node(doc, 1, max_depth)
}

fn build_node(doc: &NodeDocument, depth: usize, max_depth: usize) -> Result<Node, PersistenceError> {
    if depth > max_depth {
        return Err(PersistenceError::DepthExceeded { max: max_depth });
    }
    let node = Node::with_id(doc.id.clone());
    let _lock = node.rebuild_lock();
    node.set_owner_id(doc.owner_id.clone());
    node.set_clone_id(doc.clone_id.clone());
    node.set_clone_update_count(doc.clone_update_count);
    node.set_name(doc.name.clone());
    // non-finite matrices become identity
    node.set_matrix_direct(from_cols_array(&doc.matrix));
    node.set_color(doc.color);
    node.set_output_type(doc.output_type);
    node.set_visible(doc.visible);
    node.set_mesh_path(doc.mesh_path.clone());
    node.with_kind_mut(|kind| *kind = NodeKind::from_document(&doc.kind));

    let children = doc
        .children
        .iter()
        .map(|c| build_node(c, depth + 1, max_depth))
        .collect::<Result<Vec<_>, _>>()?;
    node.set_children_direct(children);
    Ok(node)
}

/// Reject JSON nested deeper than `max_nesting` without parsing it.
fn check_json_depth(text: &str, max_nesting: usize) -> Result<(), PersistenceError> {
    let mut nesting = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for byte in text.bytes() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => {
                nesting += 1;
                if nesting > max_nesting {
                    return Err(PersistenceError::DepthExceeded { max: max_nesting });
                }
            }
            b'}' | b']' => nesting = nesting.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

/// JSON nesting allowed for a document whose node tree may be `max_depth`
/// deep: two levels per node (object and children array) plus headroom for
/// the per-node fields.
fn json_nesting_limit(max_depth: usize) -> usize {
    max_depth * 2 + 8
}

/// Parse a scene document, enforcing the node depth limit.
pub fn parse_document(text: &str, max_depth: usize) -> Result<SceneDocument, PersistenceError> {
    let limit = json_nesting_limit(max_depth);
    check_json_depth(text, limit).map_err(|_| PersistenceError::DepthExceeded { max: max_depth })?;
    let mut deserializer = serde_json::Deserializer::from_str(text);
    deserializer.disable_recursion_limit();
    let document = SceneDocument::deserialize(&mut deserializer)?;
    deserializer.end()?;
    Ok(document)
}

pub fn document_to_string(root: &Node, assets: Option<&AssetCache>) -> Result<String, PersistenceError> {
    let document = SceneDocument::new(to_document(root, assets)?);
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Write `root` as a `.mcx` document, storing its meshes in `assets`.
pub fn save_scene(root: &Node, path: &Path, assets: &AssetCache) -> Result<(), PersistenceError> {
    let json = document_to_string(root, Some(assets))?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, json)?;
    tracing::info!("saved scene to {}", path.display());
    Ok(())
}

/// De-duplication shared by the loads of one operation.
#[derive(Debug, Default)]
pub struct CacheContext {
    /// Meshes already linked, by asset name
    pub meshes: HashMap<AssetRef, SharedMesh>,
    /// Mesh files already imported, by path
    pub items: HashMap<PathBuf, Node>,
}

impl CacheContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Load a `.mcx` document or import a `.stl` mesh.
///
/// Repeated imports of the same mesh file through one context return deep
/// copies of the first import.
pub fn try_load(path: &Path, context: &mut CacheContext, settings: &EngineSettings) -> Result<Node, PersistenceError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "mcx" => {
            let text = std::fs::read_to_string(path)?;
            let document = parse_document(&text, settings.max_document_depth)?;
            from_document(&document.root, settings.max_document_depth)
        }
        "stl" => {
            if let Some(cached) = context.items.get(path) {
                return Ok(deep_copy(cached)?);
            }
            let bytes = std::fs::read(path)?;
            let node = Node::with_mesh(stl::read(&bytes)?);
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                node.set_name(stem);
            }
            context.items.insert(path.to_path_buf(), node.clone());
            Ok(node)
        }
        _ => Err(PersistenceError::UnsupportedExtension(path.to_path_buf())),
    }
}

/// [`try_load`] that reports failure in the log and returns `None`.
pub fn load(path: &Path, context: &mut CacheContext, settings: &EngineSettings) -> Option<Node> {
    match try_load(path, context, settings) {
        Ok(node) => Some(node),
        Err(e) => {
            tracing::warn!("failed to load {}: {}", path.display(), e);
            None
        }
    }
}

/// Attach meshes to every node that names an asset but has no mesh.
///
/// Unavailable assets get the placeholder mesh; the asset name is kept so
/// the reference survives the next save. Returns how many placeholders were
/// used.
pub fn load_mesh_links(
    root: &Node,
    context: &mut CacheContext,
    assets: &AssetCache,
    progress: &mut ProgressFn<'_>,
) -> usize {
    let pending: Vec<(Node, AssetRef)> = root
        .descendants_and_self()
        .into_iter()
        .filter(|n| !n.has_mesh())
        .filter_map(|n| n.mesh_path().map(|p| (n, p)))
        .collect();

    let total = pending.len();
    let mut placeholders = 0;
    for (i, (node, asset)) in pending.into_iter().enumerate() {
        let mesh = match context.meshes.get(&asset) {
            Some(mesh) => Some(mesh.clone()),
            None => match assets.resolve(&asset) {
                AssetStatus::Ready(mesh) => {
                    context.meshes.insert(asset.clone(), mesh.clone());
                    Some(mesh)
                }
                status => {
                    tracing::warn!("asset {} for {} unavailable ({:?}); using placeholder", asset, node.id(), status);
                    None
                }
            },
        };
        let mesh = mesh.unwrap_or_else(|| {
            placeholders += 1;
            Arc::new(Mesh::placeholder())
        });
        node.set_mesh_direct(Some(mesh));
        progress((i + 1) as f64 / total as f64, Some(asset));
    }
    placeholders
}
