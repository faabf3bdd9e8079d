//! Layout fragment composition.
//!
//! A *fragment* is a pre-laid sub-layout referenced by a group via its
//! `layout_path`. On first materialization the fragment's routing is
//! duplicated into the destination group with net names rewritten, and its
//! footprint positions act as hints for newly added members.
//!
//! When fragment groups nest, only the outermost group carrying a
//! `layout_path` is authoritative for its descendant region; nested fragment
//! groups are suppressed and entities covered by an authoritative fragment
//! are not re-placed by HierPlace.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Context;

use crate::types::{
    BoardView, EntityId, EntityPath, FootprintComplement, GroupComplement,
};

/// Data extracted from a layout fragment for lens logic.
///
/// Contains plain lens types only; the apply phase duplicates routing from
/// this record into the destination board.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentData {
    /// Routing/graphics with fragment-local net names.
    pub group_complement: GroupComplement,
    /// Positions keyed by reference and by path relative to the fragment
    /// root (both keys are inserted).
    pub footprint_complements: BTreeMap<String, FootprintComplement>,
    /// Maps `(relative_path, pad_name)` to the fragment-local net name.
    pub pad_net_map: BTreeMap<(String, String), String>,
}

impl FragmentData {
    /// Look up a member's placement hint by relative path, falling back to
    /// its reference designator.
    pub fn footprint_hint(
        &self,
        relative_path: &str,
        reference: &str,
    ) -> Option<&FootprintComplement> {
        self.footprint_complements
            .get(relative_path)
            .or_else(|| self.footprint_complements.get(reference))
    }
}

/// Loads fragment layouts referenced by `layout_path` strings.
pub trait FragmentLoader {
    fn load(&self, layout_path: &str) -> anyhow::Result<FragmentData>;
}

/// Which fragments own which entities for this sync pass.
///
/// Centralizes fragment-related decisions: which fragments are authoritative,
/// which entities they cover, and which footprints belong to each fragment.
#[derive(Debug, Clone, Default)]
pub struct FragmentPlan {
    /// Authoritative fragments only.
    pub loaded: BTreeMap<EntityId, FragmentData>,
    /// Entity -> owning authoritative fragment.
    pub owner: BTreeMap<EntityId, EntityId>,
    /// All entities covered by any authoritative fragment.
    covered: BTreeSet<EntityId>,
    /// Fragment -> covered member footprints.
    pub covered_footprints: BTreeMap<EntityId, Vec<EntityId>>,
}

impl FragmentPlan {
    /// Entity is covered by an authoritative fragment (and must not be
    /// re-placed by HierPlace).
    pub fn is_covered(&self, entity_id: &EntityId) -> bool {
        self.covered.contains(entity_id)
    }

    /// Entity is itself an authoritative fragment group.
    pub fn is_authoritative(&self, entity_id: &EntityId) -> bool {
        self.loaded.contains_key(entity_id)
    }
}

/// Decide whether a fragment group needs materialization at all.
///
/// A group repair whose members already exist must NOT trigger fragment
/// placement: re-creating the container around existing user-placed
/// footprints leaves them untouched. Only a group with at least one newly
/// added member loads its fragment.
pub fn fragment_needs_materialization(
    member_ids: &[EntityId],
    added_footprints: &BTreeSet<EntityId>,
) -> bool {
    member_ids.iter().any(|id| added_footprints.contains(id))
}

/// Build the fragment plan for this sync pass.
///
/// `candidates` are the groups eligible for fragment materialization (they
/// carry a `layout_path` and passed the repair guard). Groups are visited in
/// pre-order; a group is admitted as authoritative only if no ancestor has
/// already been admitted.
pub fn build_fragment_plan(
    view: &BoardView,
    candidates: &BTreeSet<EntityId>,
    loader: &dyn FragmentLoader,
) -> anyhow::Result<FragmentPlan> {
    let mut plan = FragmentPlan::default();

    // BTreeSet iteration visits ancestors before descendants (a path sorts
    // before any path it prefixes), which is exactly pre-order.
    for group_id in candidates {
        let already_owned = plan
            .loaded
            .keys()
            .any(|admitted| admitted.path.is_ancestor_of(&group_id.path));
        if already_owned {
            log::debug!(
                "fragment group {} suppressed by an authoritative ancestor",
                group_id.path
            );
            continue;
        }

        let Some(group_view) = view.groups.get(group_id) else {
            continue;
        };
        let Some(layout_path) = group_view.layout_path.as_deref() else {
            continue;
        };

        let data = loader.load(layout_path).with_context(|| {
            format!(
                "loading fragment '{}' for group {}",
                layout_path, group_id.path
            )
        })?;

        let mut footprints = Vec::new();
        for entity_id in view.footprints.keys() {
            if group_id.path.is_ancestor_of(&entity_id.path) {
                plan.covered.insert(entity_id.clone());
                plan.owner.insert(entity_id.clone(), group_id.clone());
                footprints.push(entity_id.clone());
            }
        }
        for entity_id in view.groups.keys() {
            if group_id.path.is_ancestor_of(&entity_id.path) {
                plan.covered.insert(entity_id.clone());
                plan.owner.insert(entity_id.clone(), group_id.clone());
            }
        }

        plan.covered_footprints.insert(group_id.clone(), footprints);
        plan.loaded.insert(group_id.clone(), data);
    }

    Ok(plan)
}

/// Build a net remapping from fragment-local nets to board nets.
///
/// For each member footprint, find what net each pad connects to on the
/// board and map the fragment's local net name onto it. The first board net
/// wins in case of conflict; conflicts are reported as warnings.
pub fn build_fragment_net_remap(
    group_path: &EntityPath,
    member_paths: &[EntityPath],
    fragment_pad_net_map: &BTreeMap<(String, String), String>,
    board_pad_net_map: &BTreeMap<(EntityId, String), String>,
) -> (BTreeMap<String, String>, Vec<String>) {
    let mut net_remap: BTreeMap<String, String> = BTreeMap::new();
    let mut warnings: Vec<String> = Vec::new();
    let group_prefix = format!("{group_path}.");

    for member_path in member_paths {
        let member_str = member_path.to_string();
        let relative_path = member_str
            .strip_prefix(&group_prefix)
            .unwrap_or(&member_str)
            .to_string();

        for ((entity_id, pad_name), board_net_name) in board_pad_net_map {
            if &entity_id.path != member_path {
                continue;
            }
            let Some(fragment_net) =
                fragment_pad_net_map.get(&(relative_path.clone(), pad_name.clone()))
            else {
                continue;
            };
            if fragment_net.is_empty() {
                continue;
            }
            match net_remap.get(fragment_net) {
                Some(existing) if existing != board_net_name => {
                    warnings.push(format!(
                        "Net remap conflict: {fragment_net} -> {existing} vs {board_net_name}"
                    ));
                }
                Some(_) => {}
                None => {
                    net_remap.insert(fragment_net.clone(), board_net_name.clone());
                }
            }
        }
    }

    (net_remap, warnings)
}

/// Rewrite fragment net names onto board nets. Unmapped nets become no-net.
pub fn remap_group_nets(
    complement: &GroupComplement,
    net_remap: &BTreeMap<String, String>,
    valid_nets: &BTreeSet<String>,
    context: &str,
) -> GroupComplement {
    let mut orphan_nets: BTreeSet<String> = BTreeSet::new();

    let mut map_net = |net: &str| -> String {
        let mapped = net_remap.get(net).map(String::as_str).unwrap_or(net);
        if mapped.is_empty() || valid_nets.contains(mapped) {
            mapped.to_string()
        } else {
            orphan_nets.insert(net.to_string());
            String::new()
        }
    };

    let mut result = complement.clone();
    for track in &mut result.tracks {
        track.net_name = map_net(&track.net_name);
    }
    for via in &mut result.vias {
        via.net_name = map_net(&via.net_name);
    }
    for zone in &mut result.zones {
        zone.net_name = map_net(&zone.net_name);
    }

    if !orphan_nets.is_empty() {
        let sample: Vec<&String> = orphan_nets.iter().take(5).collect();
        log::warn!(
            "{context}: {} items converted to no-net (unmapped nets: {sample:?})",
            orphan_nets.len()
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GroupView, Position, TrackComplement};

    struct MapLoader(BTreeMap<String, FragmentData>);

    impl FragmentLoader for MapLoader {
        fn load(&self, layout_path: &str) -> anyhow::Result<FragmentData> {
            self.0
                .get(layout_path)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("fragment not found: {layout_path}"))
        }
    }

    fn group_view(path: &str, layout_path: Option<&str>, members: &[&EntityId]) -> GroupView {
        GroupView {
            entity_id: EntityId::group(EntityPath::parse(path)),
            member_ids: members.iter().map(|id| (*id).clone()).collect(),
            layout_path: layout_path.map(str::to_string),
        }
    }

    #[test]
    fn repair_guard_blocks_existing_members() {
        let f1 = EntityId::parse("G1.F1", "Lib:R");
        let added = BTreeSet::new();
        assert!(!fragment_needs_materialization(&[f1.clone()], &added));

        let added = BTreeSet::from([f1.clone()]);
        assert!(fragment_needs_materialization(&[f1], &added));
    }

    #[test]
    fn topmost_fragment_wins() {
        let mut view = BoardView::default();
        let outer = EntityId::group(EntityPath::parse("Outer"));
        let inner = EntityId::group(EntityPath::parse("Outer.Inner"));
        view.groups.insert(
            outer.clone(),
            group_view("Outer", Some("outer-layout"), &[]),
        );
        view.groups.insert(
            inner.clone(),
            group_view("Outer.Inner", Some("inner-layout"), &[]),
        );

        let fp = EntityId::parse("Outer.Inner.R1", "Lib:R");
        view.footprints.insert(fp.clone(), Default::default());

        let loader = MapLoader(BTreeMap::from([
            ("outer-layout".to_string(), FragmentData::default()),
            ("inner-layout".to_string(), FragmentData::default()),
        ]));

        let candidates = BTreeSet::from([outer.clone(), inner.clone()]);
        let plan = build_fragment_plan(&view, &candidates, &loader).unwrap();

        assert!(plan.is_authoritative(&outer));
        assert!(!plan.is_authoritative(&inner));
        assert!(plan.is_covered(&inner));
        assert!(plan.is_covered(&fp));
        assert_eq!(plan.owner.get(&fp), Some(&outer));
        assert_eq!(plan.covered_footprints[&outer], vec![fp]);
    }

    #[test]
    fn net_remap_first_board_net_wins() {
        let group_path = EntityPath::parse("Reg");
        let member = EntityPath::parse("Reg.C1");

        let fragment_pads = BTreeMap::from([
            (("C1".to_string(), "1".to_string()), "VIN_LOCAL".to_string()),
            (("C1".to_string(), "2".to_string()), "VIN_LOCAL".to_string()),
        ]);
        let c1 = EntityId::parse("Reg.C1", "Lib:C");
        let board_pads = BTreeMap::from([
            ((c1.clone(), "1".to_string()), "VCC_3V3".to_string()),
            ((c1.clone(), "2".to_string()), "GND".to_string()),
        ]);

        let (remap, warnings) =
            build_fragment_net_remap(&group_path, &[member], &fragment_pads, &board_pads);

        // Pad "1" maps first (sorted map order), so VIN_LOCAL -> VCC_3V3 and
        // the pad-2 binding becomes a conflict warning.
        assert_eq!(remap.get("VIN_LOCAL").map(String::as_str), Some("VCC_3V3"));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("conflict"));
    }

    #[test]
    fn unmapped_nets_become_no_net() {
        let complement = GroupComplement {
            tracks: vec![
                TrackComplement {
                    uuid: "t1".to_string(),
                    start: Position::new(0, 0),
                    end: Position::new(10, 0),
                    width: 200_000,
                    layer: "F.Cu".to_string(),
                    net_name: "LOCAL_A".to_string(),
                },
                TrackComplement {
                    uuid: "t2".to_string(),
                    start: Position::new(0, 0),
                    end: Position::new(0, 10),
                    width: 200_000,
                    layer: "F.Cu".to_string(),
                    net_name: "LOCAL_B".to_string(),
                },
            ],
            ..Default::default()
        };

        let remap = BTreeMap::from([("LOCAL_A".to_string(), "VCC".to_string())]);
        let valid = BTreeSet::from(["VCC".to_string()]);

        let result = remap_group_nets(&complement, &remap, &valid, "Reg");
        assert_eq!(result.tracks[0].net_name, "VCC");
        assert_eq!(result.tracks[1].net_name, "");
    }
}
