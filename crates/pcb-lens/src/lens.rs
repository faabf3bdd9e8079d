//! Core lens operations for layout synchronization.
//!
//! 1. [`extract`]: decompose a board into (view, complement) in a single
//!    pass.
//! 2. [`adapt_complement`]: adapt an old complement to a new view structure.
//! 3. [`check_invariants`]: verify the lens laws for a view/complement pair.
//!
//! Together with `project::get` these enable source-driven synchronization
//! where view data comes from the netlist and complement (placement) data is
//! preserved from the destination board.
//!
//! Renames (moved() paths) are resolved upstream before `get` runs; paths
//! here are already in their final form.

use std::collections::{BTreeMap, HashMap};

use crate::backend::{BackendError, LayoutBackend, RoutingItem};
use crate::diagnostics::{kind, Diagnostic, Diagnostics, Severity};
use crate::types::{
    kiid_path_for, Board, BoardComplement, BoardView, EntityId, EntityPath, FootprintComplement,
    FootprintView, GroupComplement, GroupView, NetView,
};

/// Group-name prefix used by backend-internal bookkeeping groups.
const INTERNAL_GROUP_PREFIX: &str = "group-board";

/// Extract both view and complement from a board in a single pass.
///
/// `kiid_to_path` maps backend stable-id UUIDs to path strings for legacy
/// boards whose footprints carry no Path field. Footprints whose stable-id
/// path does not match the expected `/<u>/<u>` for their Path field are
/// reported as `layout.sync.unmanaged_footprint` and excluded from both
/// halves (they are treated as manual duplicates).
pub fn extract(
    backend: &dyn LayoutBackend,
    kiid_to_path: &HashMap<String, String>,
    diagnostics: &mut Diagnostics,
) -> Result<Board, BackendError> {
    let mut footprint_views: BTreeMap<EntityId, FootprintView> = BTreeMap::new();
    let mut footprint_complements: BTreeMap<EntityId, FootprintComplement> = BTreeMap::new();
    let mut group_views: BTreeMap<EntityId, GroupView> = BTreeMap::new();
    let mut group_complements: BTreeMap<EntityId, GroupComplement> = BTreeMap::new();
    let mut net_connections: BTreeMap<String, Vec<(EntityId, String)>> = BTreeMap::new();

    for handle in backend.footprints() {
        let record = backend.footprint(handle)?;

        // Canonical source is the Path field; fall back to the KIID map for
        // legacy boards.
        let mut path_str = record.path_field.clone();
        if path_str.is_empty() {
            if let Some(last) = record.kiid_path.trim_matches('/').split('/').next_back() {
                path_str = kiid_to_path.get(last).cloned().unwrap_or_default();
            }
        }
        if path_str.is_empty() {
            continue;
        }

        // A managed footprint's stable-id path must equal /<u>/<u> derived
        // from its Path field. Any mismatch is a manual duplicate or extra.
        let expected_kiid_path = kiid_path_for(&path_str);
        if record.kiid_path != expected_kiid_path {
            diagnostics.push(
                Diagnostic::new(
                    kind::UNMANAGED_FOOTPRINT,
                    Severity::Warning,
                    format!(
                        "Footprint {} ({}:{}) is not managed by sync",
                        record.reference, path_str, record.fpid
                    ),
                )
                .with_path(path_str)
                .with_reference(record.reference.clone()),
            );
            continue;
        }

        let entity_path = EntityPath::parse(&path_str);
        let entity_id = EntityId::new(entity_path, record.fpid.clone());

        footprint_views.insert(
            entity_id.clone(),
            FootprintView {
                entity_id: entity_id.clone(),
                reference: record.reference.clone(),
                value: record.value.clone(),
                fpid: record.fpid.clone(),
                dnp: record.dnp,
                exclude_from_bom: record.exclude_from_bom,
                exclude_from_pos: record.exclude_from_pos,
                fields: record.fields.clone(),
            },
        );

        footprint_complements.insert(
            entity_id.clone(),
            FootprintComplement {
                position: record.position,
                orientation: record.orientation,
                layer: record.layer,
                locked: record.locked,
                reference_position: record.reference_position,
                reference_visible: record.reference_visible,
                value_position: record.value_position,
                value_visible: record.value_visible,
            },
        );

        for pad in &record.pads {
            if !pad.net_name.is_empty() {
                net_connections
                    .entry(pad.net_name.clone())
                    .or_default()
                    .push((entity_id.clone(), pad.name.clone()));
            }
        }
    }

    for handle in backend.groups() {
        let record = backend.group(handle)?;
        if record.name.is_empty() || record.name.starts_with(INTERNAL_GROUP_PREFIX) {
            continue;
        }

        let entity_path = EntityPath::parse(&record.name);
        let entity_id = EntityId::group(entity_path.clone());

        let member_ids: Vec<EntityId> = footprint_views
            .keys()
            .filter(|fp_id| entity_path.is_ancestor_of(&fp_id.path))
            .cloned()
            .collect();

        group_views.insert(
            entity_id.clone(),
            GroupView {
                entity_id: entity_id.clone(),
                member_ids,
                layout_path: None, // not stored on the board
            },
        );

        let mut complement = GroupComplement::default();
        for item in record.items {
            match item {
                RoutingItem::Track(t) => complement.tracks.push(t),
                RoutingItem::Via(v) => complement.vias.push(v),
                RoutingItem::Zone(z) => complement.zones.push(z),
                RoutingItem::Graphic(g) => complement.graphics.push(g),
            }
        }
        group_complements.insert(entity_id, complement);
    }

    let nets: BTreeMap<String, NetView> = net_connections
        .into_iter()
        .map(|(name, connections)| {
            (
                name.clone(),
                NetView {
                    name,
                    connections,
                    kind: "Net".to_string(),
                    logical_ports: Vec::new(),
                },
            )
        })
        .collect();

    Ok(Board {
        view: BoardView {
            footprints: footprint_views,
            groups: group_views,
            nets,
            not_connected_pads: Default::default(),
        },
        complement: BoardComplement {
            footprints: footprint_complements,
            groups: group_complements,
        },
    })
}

/// Adapt an old complement to match the structure of a new view.
///
/// This is the core lens operation: for each footprint id in the view, an
/// entry with the same `(path, fpid)` is carried over verbatim; new entities
/// get the default complement (HierPlace positions them later). Entries whose
/// ids are not in the view are dropped. FPID changes naturally become remove
/// (old path+fpid) + add (new path+fpid).
pub fn adapt_complement(
    new_view: &BoardView,
    old_complement: &BoardComplement,
    diagnostics: &mut Diagnostics,
) -> BoardComplement {
    let mut footprints: BTreeMap<EntityId, FootprintComplement> = BTreeMap::new();
    let mut groups: BTreeMap<EntityId, GroupComplement> = BTreeMap::new();

    for entity_id in new_view.footprints.keys() {
        let complement = old_complement
            .footprints
            .get(entity_id)
            .cloned()
            .unwrap_or_default();
        footprints.insert(entity_id.clone(), complement);
    }

    for entity_id in new_view.groups.keys() {
        let complement = old_complement
            .groups
            .get(entity_id)
            .cloned()
            .unwrap_or_default();
        groups.insert(entity_id.clone(), complement);
    }

    let new_complement = BoardComplement { footprints, groups };

    check_invariants(new_view, &new_complement, diagnostics);
    debug_assert!(
        new_complement.footprints.len() == new_view.footprints.len()
            && new_complement.groups.len() == new_view.groups.len(),
        "adapt_complement produced a domain mismatch"
    );

    new_complement
}

/// Verify the lens laws hold for a view/complement pair.
///
/// Violations are appended to `diagnostics`; nothing here is fatal.
pub fn check_invariants(
    view: &BoardView,
    complement: &BoardComplement,
    diagnostics: &mut Diagnostics,
) {
    // The complement domains must exactly match the view domains.
    let missing_fps: Vec<&EntityId> = view
        .footprints
        .keys()
        .filter(|id| !complement.footprints.contains_key(id))
        .collect();
    let extra_fps: Vec<&EntityId> = complement
        .footprints
        .keys()
        .filter(|id| !view.footprints.contains_key(id))
        .collect();
    if !missing_fps.is_empty() {
        diagnostics.push(Diagnostic::new(
            kind::DOMAIN_MISMATCH,
            Severity::Error,
            format!("Footprints missing in complement: {}", join_ids(&missing_fps)),
        ));
    }
    if !extra_fps.is_empty() {
        diagnostics.push(Diagnostic::new(
            kind::DOMAIN_MISMATCH,
            Severity::Error,
            format!("Extra footprints in complement: {}", join_ids(&extra_fps)),
        ));
    }

    let missing_groups: Vec<&EntityId> = view
        .groups
        .keys()
        .filter(|id| !complement.groups.contains_key(id))
        .collect();
    let extra_groups: Vec<&EntityId> = complement
        .groups
        .keys()
        .filter(|id| !view.groups.contains_key(id))
        .collect();
    if !missing_groups.is_empty() {
        diagnostics.push(Diagnostic::new(
            kind::DOMAIN_MISMATCH,
            Severity::Error,
            format!("Groups missing in complement: {}", join_ids(&missing_groups)),
        ));
    }
    if !extra_groups.is_empty() {
        diagnostics.push(Diagnostic::new(
            kind::DOMAIN_MISMATCH,
            Severity::Error,
            format!("Extra groups in complement: {}", join_ids(&extra_groups)),
        ));
    }

    // NoLeafGroups: no group path may equal a footprint path.
    let fp_paths: std::collections::BTreeSet<&EntityPath> =
        view.footprints.keys().map(|id| &id.path).collect();
    for group_id in view.groups.keys() {
        if fp_paths.contains(&group_id.path) {
            diagnostics.push(
                Diagnostic::new(
                    kind::NO_LEAF_GROUPS,
                    Severity::Error,
                    format!("Group path {} equals a footprint path", group_id.path),
                )
                .with_path(group_id.path.to_string()),
            );
        }
    }

    // GroupMembership: members must be view footprints under the group path.
    for (group_id, group_view) in &view.groups {
        for member_id in &group_view.member_ids {
            if !view.footprints.contains_key(member_id) {
                diagnostics.push(
                    Diagnostic::new(
                        kind::INVALID_GROUP_MEMBER,
                        Severity::Error,
                        format!(
                            "Group {} has member {} which is not a footprint",
                            group_id.path, member_id.path
                        ),
                    )
                    .with_path(group_id.path.to_string()),
                );
            } else if !group_id.path.is_ancestor_of(&member_id.path) {
                diagnostics.push(
                    Diagnostic::new(
                        kind::INVALID_GROUP_MEMBER,
                        Severity::Error,
                        format!(
                            "Member {} is not a descendant of group {}",
                            member_id.path, group_id.path
                        ),
                    )
                    .with_path(group_id.path.to_string()),
                );
            }
        }
    }

    // A group with no members, no fragment reference and no routing is inert.
    for (group_id, group_view) in &view.groups {
        let has_members = !group_view.member_ids.is_empty();
        let has_layout = group_view.layout_path.is_some();
        let has_complement = complement
            .groups
            .get(group_id)
            .is_some_and(|c| !c.is_empty());
        if !(has_members || has_layout || has_complement) {
            diagnostics.push(
                Diagnostic::new(
                    kind::EMPTY_GROUP,
                    Severity::Warning,
                    format!(
                        "Group {} has no members, no layout_path, and empty complement",
                        group_id.path
                    ),
                )
                .with_path(group_id.path.to_string()),
            );
        }
    }

    // Routing may only reference view nets (or the no-net sentinel).
    let mut unknown_nets: std::collections::BTreeSet<&str> = Default::default();
    for group_comp in complement.groups.values() {
        let net_names = group_comp
            .tracks
            .iter()
            .map(|t| t.net_name.as_str())
            .chain(group_comp.vias.iter().map(|v| v.net_name.as_str()))
            .chain(group_comp.zones.iter().map(|z| z.net_name.as_str()));
        for net_name in net_names {
            if !net_name.is_empty() && !view.nets.contains_key(net_name) {
                unknown_nets.insert(net_name);
            }
        }
    }
    if !unknown_nets.is_empty() {
        let sample: Vec<&str> = unknown_nets.iter().take(5).copied().collect();
        diagnostics.push(Diagnostic::new(
            kind::UNKNOWN_NETS,
            Severity::Warning,
            format!(
                "Routing references {} unknown net(s): {:?}",
                unknown_nets.len(),
                sample
            ),
        ));
    }
}

fn join_ids(ids: &[&EntityId]) -> String {
    ids.iter()
        .map(|id| id.path.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
