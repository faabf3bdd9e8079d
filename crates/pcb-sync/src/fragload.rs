//! Fragment loading from board files.
//!
//! A group's `layout_path` names a directory holding a pre-laid board file.
//! Paths of the form `scheme://package/sub/dir` resolve through the
//! `package_roots` map; anything else is treated as a plain filesystem path.
//! The referenced board is loaded through [`MemoryBoard`] and distilled into
//! a [`FragmentData`]: all routing, per-footprint placements keyed by
//! reference and by path, and the pad→net map used for net remapping.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;

use pcb_lens::backend::LayoutBackend;
use pcb_lens::fragment::{FragmentData, FragmentLoader};
use pcb_lens::types::FootprintComplement;

use crate::memory::MemoryBoard;

/// Board file name inside a fragment layout directory.
pub const FRAGMENT_BOARD_FILE: &str = "layout.json";

/// Resolve a `layout_path` string to a filesystem directory.
pub fn resolve_layout_path(
    layout_path: &str,
    package_roots: &BTreeMap<String, String>,
) -> anyhow::Result<PathBuf> {
    if let Some((root_url, root_dir)) = package_roots
        .iter()
        .filter(|(root_url, _)| {
            layout_path == root_url.as_str()
                || layout_path.starts_with(&format!("{root_url}/"))
        })
        .max_by_key(|(root_url, _)| root_url.len())
    {
        let remainder = layout_path[root_url.len()..].trim_start_matches('/');
        let mut dir = PathBuf::from(root_dir);
        if !remainder.is_empty() {
            dir.push(remainder);
        }
        return Ok(dir);
    }

    if layout_path.contains("://") {
        anyhow::bail!("no package root registered for '{layout_path}'");
    }
    Ok(PathBuf::from(layout_path))
}

/// Distill a loaded board into fragment data.
pub fn extract_fragment(board: &MemoryBoard) -> anyhow::Result<FragmentData> {
    let mut data = FragmentData::default();

    for handle in board.footprints() {
        let record = board.footprint(handle)?;
        let complement = FootprintComplement {
            position: record.position,
            orientation: record.orientation,
            layer: record.layer,
            locked: record.locked,
            reference_position: record.reference_position,
            reference_visible: record.reference_visible,
            value_position: record.value_position,
            value_visible: record.value_visible,
        };
        // Positions are looked up by relative path first, reference second.
        if !record.path_field.is_empty() {
            data.footprint_complements
                .insert(record.path_field.clone(), complement.clone());
        }
        if !record.reference.is_empty() {
            data.footprint_complements
                .entry(record.reference.clone())
                .or_insert(complement);
        }

        for pad in &record.pads {
            if !pad.net_name.is_empty() {
                data.pad_net_map.insert(
                    (record.path_field.clone(), pad.name.clone()),
                    pad.net_name.clone(),
                );
            }
        }
    }

    for handle in board.groups() {
        let record = board.group(handle)?;
        for item in record.items {
            match item {
                pcb_lens::backend::RoutingItem::Track(t) => data.group_complement.tracks.push(t),
                pcb_lens::backend::RoutingItem::Via(v) => data.group_complement.vias.push(v),
                pcb_lens::backend::RoutingItem::Zone(z) => data.group_complement.zones.push(z),
                pcb_lens::backend::RoutingItem::Graphic(g) => {
                    data.group_complement.graphics.push(g)
                }
            }
        }
    }

    Ok(data)
}

/// Loads fragments from board files on disk.
#[derive(Debug, Clone, Default)]
pub struct FileFragmentLoader {
    pub package_roots: BTreeMap<String, String>,
}

impl FileFragmentLoader {
    pub fn new(package_roots: BTreeMap<String, String>) -> Self {
        Self { package_roots }
    }
}

impl FragmentLoader for FileFragmentLoader {
    fn load(&self, layout_path: &str) -> anyhow::Result<FragmentData> {
        let dir = resolve_layout_path(layout_path, &self.package_roots)?;
        let file = dir.join(FRAGMENT_BOARD_FILE);
        let board = MemoryBoard::load(&file)
            .with_context(|| format!("reading fragment board '{}'", file.display()))?;
        extract_fragment(&board)
    }
}
