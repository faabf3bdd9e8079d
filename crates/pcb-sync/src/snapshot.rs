//! Canonical layout snapshot emission.
//!
//! The snapshot is a deterministic JSON document used as a regression oracle
//! in tests: object keys are sorted, and every list is sorted by the JSON
//! string representation of its elements. Top-level keys: `footprints`,
//! `groups`, `zones`, `tracks`, `vias`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde_json::{json, Value};

use pcb_lens::backend::{BackendError, LayoutBackend, RoutingItem};
use pcb_lens::diagnostics::Diagnostics;

/// Recursively canonicalize a JSON value for deterministic output.
///
/// Maps are already key-sorted (`serde_json` uses a sorted map); lists are
/// sorted by their serialized form.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect(),
        ),
        Value::Array(items) => {
            let mut canonical: Vec<Value> = items.into_iter().map(canonicalize).collect();
            canonical.sort_by_key(|v| v.to_string());
            Value::Array(canonical)
        }
        other => other,
    }
}

/// Build the snapshot document for a board.
pub fn layout_snapshot(backend: &dyn LayoutBackend) -> Result<Value, BackendError> {
    // Map footprint paths to their owning group for the footprint records.
    let mut group_by_path: BTreeMap<String, String> = BTreeMap::new();
    let mut groups = Vec::new();
    let mut tracks = Vec::new();
    let mut vias = Vec::new();
    let mut zones = Vec::new();

    for handle in backend.groups() {
        let record = backend.group(handle)?;
        for path in &record.member_paths {
            group_by_path.insert(path.clone(), record.name.clone());
        }
        groups.push(json!({
            "name": record.name,
            "footprints": record.member_paths,
        }));

        for item in &record.items {
            match item {
                RoutingItem::Track(t) => tracks.push(json!({
                    "net_name": t.net_name,
                    "layer": t.layer,
                    "width": t.width,
                    "start": {"x": t.start.x, "y": t.start.y},
                    "end": {"x": t.end.x, "y": t.end.y},
                })),
                RoutingItem::Via(v) => vias.push(json!({
                    "net_name": v.net_name,
                    "position": {"x": v.position.x, "y": v.position.y},
                    "drill": v.drill,
                    "diameter": v.diameter,
                    "via_type": v.via_type,
                })),
                RoutingItem::Zone(z) => zones.push(json!({
                    "name": z.name,
                    "net_name": z.net_name,
                    "layer": z.layer,
                    "priority": z.priority,
                    "points": z.outline.iter()
                        .map(|p| json!({"x": p.x, "y": p.y}))
                        .collect::<Vec<_>>(),
                })),
                RoutingItem::Graphic(_) => {}
            }
        }
    }

    let mut footprints = Vec::new();
    for handle in backend.footprints() {
        let record = backend.footprint(handle)?;
        footprints.push(json!({
            "footprint": record.fpid,
            "group": group_by_path.get(&record.path_field),
            "layer": record.layer.as_str(),
            "locked": record.locked,
            "orientation": record.orientation,
            "position": {"x": record.position.x, "y": record.position.y},
            "reference": record.reference,
            "uuid": record.kiid_path.trim_matches('/').split('/').next_back(),
            "value": ascii_only(&record.value),
            "dnp": record.dnp,
            "exclude_from_bom": record.exclude_from_bom,
            "exclude_from_pos_files": record.exclude_from_pos,
            "pads": record.pads.iter()
                .map(|p| json!({"name": p.name, "net": p.net_name}))
                .collect::<Vec<_>>(),
        }));
    }

    Ok(canonicalize(json!({
        "footprints": footprints,
        "groups": groups,
        "zones": zones,
        "tracks": tracks,
        "vias": vias,
    })))
}

/// Cross-platform unicode normalization is a headache; strip non-ASCII.
fn ascii_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii()).collect()
}

/// Write the canonical snapshot next to the board.
pub fn write_snapshot(backend: &dyn LayoutBackend, path: &Path) -> anyhow::Result<()> {
    let snapshot = layout_snapshot(backend)?;
    let json = serde_json::to_string_pretty(&snapshot)?;
    std::fs::write(path, json)
        .with_context(|| format!("writing layout snapshot '{}'", path.display()))?;
    log::info!("saved layout snapshot to {}", path.display());
    Ok(())
}

/// Export collected diagnostics as `{"diagnostics": [...]}`.
pub fn write_diagnostics(diagnostics: &Diagnostics, path: &Path) -> anyhow::Result<()> {
    let json = diagnostics.to_json()?;
    std::fs::write(path, json)
        .with_context(|| format!("writing diagnostics '{}'", path.display()))?;
    if !diagnostics.is_empty() {
        log::info!(
            "saved {} diagnostic(s) to {}",
            diagnostics.len(),
            path.display()
        );
    }
    Ok(())
}
