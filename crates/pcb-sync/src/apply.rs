//! Changeset application protocol.
//!
//! Consumes a [`SyncChangeset`] and a [`LayoutBackend`] capability and
//! executes the ordered phases:
//!
//! 1. net reconciliation
//! 2. deletions (group containers first, then footprints)
//! 3. additions (footprints from the library, then groups)
//! 4. view updates for pre-existing footprints
//! 5. group-membership rebuild
//! 6. fragment composition with net remapping
//! 7. hierarchical placement of new entities
//!
//! Complement writes (position, orientation, layer, lock, text positions)
//! happen exactly once, at the end, followed by a connectivity rebuild.
//! Backend handles are re-enumerated after every structural mutation and at
//! the start of every phase that reads them.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use pcb_lens::backend::{BackendError, FootprintHandle, GroupHandle, LayoutBackend, RoutingItem};
use pcb_lens::changeset::SyncChangeset;
use pcb_lens::diagnostics::Diagnostics;
use pcb_lens::fragment::{
    build_fragment_net_remap, build_fragment_plan, fragment_needs_materialization,
    remap_group_nets, FragmentLoader, FragmentPlan,
};
use pcb_lens::hierplace::{compute_cluster_bbox, hierplace, pack_at_origin, PlacementRect, Rect};
use pcb_lens::oplog::OpLog;
use pcb_lens::types::{BoardView, EntityId, EntityPath, FootprintComplement, Position};

/// Fatal errors from changeset application. Partial progress up to the
/// failing phase is retained; the backend is not rolled back.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("fragment composition failed: {0}")]
    Fragment(#[from] anyhow::Error),
}

/// Apply a changeset to the backend, recording every action in the returned
/// [`OpLog`].
pub fn apply_changeset(
    changeset: &SyncChangeset,
    backend: &mut dyn LayoutBackend,
    loader: &dyn FragmentLoader,
    _diagnostics: &mut Diagnostics,
) -> Result<OpLog, ApplyError> {
    let mut oplog = OpLog::new();
    let view = &changeset.view;
    let pad_nets = build_pad_net_map(view);

    // Removed footprints indexed by path: an added footprint at the same
    // path is an FPID change and inherits the old placement.
    let removed_by_path: BTreeMap<String, (&EntityId, &FootprintComplement)> = changeset
        .removed_footprints
        .iter()
        .map(|(id, c)| (id.path.to_string(), (id, c)))
        .collect();

    reconcile_nets(changeset, backend, &mut oplog)?;
    delete_entities(changeset, backend, &mut oplog)?;
    add_entities(changeset, backend, &pad_nets, &removed_by_path, &mut oplog)?;
    update_views(changeset, backend)?;
    rebuild_memberships(changeset, backend, &mut oplog)?;
    let (plan, mut overrides) =
        compose_fragments(changeset, backend, loader, &pad_nets, &mut oplog)?;
    place_new_entities(
        changeset,
        backend,
        &plan,
        &removed_by_path,
        &mut overrides,
        &mut oplog,
    )?;

    // Complement writes, exactly once, at the very end.
    let fp_index = footprint_index(&*backend)?;
    for (id, complement) in &changeset.complement.footprints {
        let complement = overrides.get(id).unwrap_or(complement);
        if let Some(&handle) = fp_index.get(&id.path.to_string()) {
            backend.set_placement(handle, complement)?;
        }
    }

    backend.rebuild_connectivity();

    log::info!(
        "sync complete: +{} -{} footprints",
        changeset.added_footprints.len(),
        changeset.removed_footprints.len()
    );

    Ok(oplog)
}

/// `(footprint id, pad name) -> net name` from the source view.
fn build_pad_net_map(view: &BoardView) -> BTreeMap<(EntityId, String), String> {
    let mut map = BTreeMap::new();
    for (net_name, net) in &view.nets {
        for (entity_id, pad) in &net.connections {
            map.entry((entity_id.clone(), pad.clone()))
                .or_insert_with(|| net_name.clone());
        }
    }
    map
}

/// Fresh `stored path -> handle` index. Must be rebuilt after every
/// structural mutation.
fn footprint_index(
    backend: &dyn LayoutBackend,
) -> Result<BTreeMap<String, FootprintHandle>, BackendError> {
    let mut index = BTreeMap::new();
    for handle in backend.footprints() {
        let record = backend.footprint(handle)?;
        if !record.path_field.is_empty() {
            index.insert(record.path_field, handle);
        }
    }
    Ok(index)
}

/// Fresh `group name -> handle` index.
fn group_index(
    backend: &dyn LayoutBackend,
) -> Result<BTreeMap<String, GroupHandle>, BackendError> {
    let mut index = BTreeMap::new();
    for handle in backend.groups() {
        let record = backend.group(handle)?;
        index.insert(record.name, handle);
    }
    Ok(index)
}

// Phase 1 -------------------------------------------------------------------

fn reconcile_nets(
    changeset: &SyncChangeset,
    backend: &mut dyn LayoutBackend,
    oplog: &mut OpLog,
) -> Result<(), ApplyError> {
    let backend_nets: BTreeSet<String> = backend.net_names().into_iter().collect();

    for net_name in changeset.view.nets.keys() {
        if !backend_nets.contains(net_name) {
            backend.create_net(net_name)?;
            oplog.net_add(net_name);
        }
    }

    for net_name in &backend_nets {
        if !changeset.view.nets.contains_key(net_name) {
            backend.delete_net(net_name)?;
            oplog.net_remove(net_name);
        }
    }

    Ok(())
}

// Phase 2 -------------------------------------------------------------------

fn delete_entities(
    changeset: &SyncChangeset,
    backend: &mut dyn LayoutBackend,
    oplog: &mut OpLog,
) -> Result<(), ApplyError> {
    // Group containers first; their contents are never deleted with them.
    for group_id in changeset.removed_groups.keys() {
        let index = group_index(&*backend)?;
        if let Some(&handle) = index.get(&group_id.path.to_string()) {
            let record = backend.group(handle)?;
            let items = record.items.len() as i64;
            backend.delete_group(handle)?;
            oplog.gr_remove(&group_id.path.to_string(), items);
        }
    }

    for footprint_id in changeset.removed_footprints.keys() {
        let index = footprint_index(&*backend)?;
        if let Some(&handle) = index.get(&footprint_id.path.to_string()) {
            backend.delete_footprint(handle)?;
            oplog.fp_remove(&footprint_id.path.to_string());
        }
    }

    Ok(())
}

// Phase 3 -------------------------------------------------------------------

fn add_entities(
    changeset: &SyncChangeset,
    backend: &mut dyn LayoutBackend,
    pad_nets: &BTreeMap<(EntityId, String), String>,
    removed_by_path: &BTreeMap<String, (&EntityId, &FootprintComplement)>,
    oplog: &mut OpLog,
) -> Result<(), ApplyError> {
    for id in &changeset.added_footprints {
        let Some(view_fp) = changeset.view.footprints.get(id) else {
            debug_assert!(false, "changeset added footprint {id} missing from view");
            continue;
        };

        let handle = backend.add_footprint(view_fp)?;
        let record = backend.footprint(handle)?;

        // Pads bind to source nets only; prior pad-net relationships are
        // never consulted.
        for pad in &record.pads {
            if let Some(net) = pad_nets.get(&(id.clone(), pad.name.clone())) {
                backend.assign_pad_net(handle, &pad.name, net)?;
            }
        }

        let complement = changeset
            .complement
            .footprints
            .get(id)
            .cloned()
            .unwrap_or_default();
        let path = id.path.to_string();
        match removed_by_path.get(&path) {
            Some((old_id, old_complement)) => oplog.fp_replace(
                &path,
                &old_id.fpid,
                &id.fpid,
                old_complement.position.x,
                old_complement.position.y,
                complement.layer.as_str(),
                record.pads.len() as i64,
            ),
            None => oplog.fp_add(
                &path,
                &view_fp.reference,
                &view_fp.fpid,
                &view_fp.value,
                complement.position.x,
                complement.position.y,
                complement.layer.as_str(),
                record.pads.len() as i64,
            ),
        }
    }

    for group_id in &changeset.added_groups {
        backend.add_group(&group_id.path.to_string())?;
        oplog.gr_add(&group_id.path.to_string());
    }

    Ok(())
}

// Phase 4 -------------------------------------------------------------------

fn update_views(
    changeset: &SyncChangeset,
    backend: &mut dyn LayoutBackend,
) -> Result<(), ApplyError> {
    let index = footprint_index(&*backend)?;

    for (id, view_fp) in &changeset.view.footprints {
        if changeset.added_footprints.contains(id) {
            continue;
        }
        let Some(&handle) = index.get(&id.path.to_string()) else {
            continue;
        };
        let record = backend.footprint(handle)?;

        // Only the view half is updated here: reference, value, fields and
        // the DNP flags. Position is never updated (that is the complement's
        // domain), and pad bindings are only written when a footprint is
        // instantiated.
        let view_changed = record.reference != view_fp.reference
            || record.value != view_fp.value
            || record.dnp != view_fp.dnp
            || record.exclude_from_bom != view_fp.exclude_from_bom
            || record.exclude_from_pos != view_fp.exclude_from_pos
            || record.fields != view_fp.fields;
        if view_changed {
            backend.update_footprint_view(handle, view_fp)?;
        }
    }

    Ok(())
}

// Phase 5 -------------------------------------------------------------------

fn rebuild_memberships(
    changeset: &SyncChangeset,
    backend: &mut dyn LayoutBackend,
    oplog: &mut OpLog,
) -> Result<(), ApplyError> {
    let fp_index = footprint_index(&*backend)?;
    let gr_index = group_index(&*backend)?;
    let view = &changeset.view;

    // Membership tolerates re-created groups and moved footprints: it is
    // recomputed from view paths, not carried over. Backends give an item a
    // single parent group, so each footprint goes to the innermost view
    // group containing it.
    let mut owner: BTreeMap<&EntityId, &EntityId> = BTreeMap::new();
    for fp_id in view.footprints.keys() {
        let innermost = view
            .groups
            .keys()
            .filter(|group_id| group_id.path.is_ancestor_of(&fp_id.path))
            .max_by_key(|group_id| group_id.path.depth());
        if let Some(group_id) = innermost {
            owner.insert(fp_id, group_id);
        }
    }

    for group_id in view.groups.keys() {
        let group_path = group_id.path.to_string();
        let Some(&group_handle) = gr_index.get(&group_path) else {
            continue;
        };
        let record = backend.group(group_handle)?;
        let current: BTreeSet<String> = record.member_paths.into_iter().collect();

        let mut desired: BTreeSet<String> = BTreeSet::new();
        for (fp_id, fp_owner) in &owner {
            if *fp_owner == group_id {
                desired.insert(fp_id.path.to_string());
            }
        }

        if current == desired {
            continue;
        }
        for path in desired.difference(&current) {
            if let Some(&fp_handle) = fp_index.get(path) {
                backend.add_to_group(group_handle, fp_handle)?;
            }
        }
        for path in current.difference(&desired) {
            if let Some(&fp_handle) = fp_index.get(path) {
                backend.remove_from_group(group_handle, fp_handle)?;
            }
        }
        let members: Vec<String> = desired.into_iter().collect();
        oplog.gr_member(&group_path, &members);
    }

    Ok(())
}

// Phase 6 -------------------------------------------------------------------

type ComplementOverrides = BTreeMap<EntityId, FootprintComplement>;

fn compose_fragments(
    changeset: &SyncChangeset,
    backend: &mut dyn LayoutBackend,
    loader: &dyn FragmentLoader,
    pad_nets: &BTreeMap<(EntityId, String), String>,
    oplog: &mut OpLog,
) -> Result<(FragmentPlan, ComplementOverrides), ApplyError> {
    let view = &changeset.view;
    let mut overrides = ComplementOverrides::new();

    // Only fragments that actually introduce footprints are materialized: a
    // group repair whose members all pre-exist loads nothing and moves
    // nothing.
    let candidates: BTreeSet<EntityId> = view
        .groups
        .iter()
        .filter(|(_, g)| g.layout_path.is_some())
        .filter(|(_, g)| {
            fragment_needs_materialization(&g.member_ids, &changeset.added_footprints)
        })
        .map(|(id, _)| id.clone())
        .collect();

    let plan = build_fragment_plan(view, &candidates, loader)?;
    if plan.loaded.is_empty() {
        return Ok((plan, overrides));
    }

    let valid_nets: BTreeSet<String> = view.nets.keys().cloned().collect();
    let gr_index = group_index(&*backend)?;

    for (group_id, data) in &plan.loaded {
        let group_path = group_id.path.to_string();
        let Some(group_view) = view.groups.get(group_id) else {
            continue;
        };
        let Some(&group_handle) = gr_index.get(&group_path) else {
            continue;
        };

        // Fragment-local coordinates stay as-is for a brand-new group (the
        // whole group is positioned later); for a pre-existing group they are
        // aligned onto the group's current content.
        let is_new_group = changeset.added_groups.contains(group_id);
        let delta = if is_new_group {
            Position::default()
        } else {
            fragment_alignment_delta(&*backend, group_handle, data)?
        };

        let member_paths: Vec<EntityPath> = group_view
            .member_ids
            .iter()
            .map(|m| m.path.clone())
            .collect();
        let (net_remap, conflicts) =
            build_fragment_net_remap(&group_id.path, &member_paths, &data.pad_net_map, pad_nets);
        for conflict in conflicts {
            log::warn!("{group_path}: {conflict}");
        }

        let remapped =
            remap_group_nets(&data.group_complement, &net_remap, &valid_nets, &group_path);
        let remapped = remapped.translated(delta);

        for track in &remapped.tracks {
            backend.add_routing(group_handle, &RoutingItem::Track(track.clone()))?;
            oplog.frag_track(
                &group_path,
                &track.net_name,
                &track.layer,
                track.start.x,
                track.start.y,
                track.end.x,
                track.end.y,
                track.width,
            );
        }
        for via in &remapped.vias {
            backend.add_routing(group_handle, &RoutingItem::Via(via.clone()))?;
            oplog.frag_via(&group_path, &via.net_name, via.position.x, via.position.y, via.drill);
        }
        for zone in &remapped.zones {
            backend.add_routing(group_handle, &RoutingItem::Zone(zone.clone()))?;
            oplog.frag_zone(&group_path, &zone.net_name, &zone.layer, &zone.name);
        }
        for graphic in &remapped.graphics {
            backend.add_routing(group_handle, &RoutingItem::Graphic(graphic.clone()))?;
            oplog.frag_graphic(&group_path, &graphic.graphic_type, &graphic.layer);
        }

        // Fragment positions are hints for newly added members only;
        // pre-existing members keep their user-authored placement.
        for member_id in &group_view.member_ids {
            if !changeset.added_footprints.contains(member_id) {
                continue;
            }
            let relative = member_id
                .path
                .relative_to(&group_id.path)
                .map(|p| p.to_string())
                .unwrap_or_default();
            let member_view = view.footprints.get(member_id);
            let reference = member_view.map(|f| f.reference.as_str()).unwrap_or("");
            if let Some(hint) = data.footprint_hint(&relative, reference) {
                overrides.insert(member_id.clone(), hint.translated(delta));
            }
        }
    }

    Ok((plan, overrides))
}

/// Align fragment-local coordinates onto a pre-existing group's content:
/// translate the fragment bbox's top-left onto the group bbox's top-left.
fn fragment_alignment_delta(
    backend: &dyn LayoutBackend,
    group_handle: GroupHandle,
    data: &pcb_lens::fragment::FragmentData,
) -> Result<Position, BackendError> {
    let Some(group_bbox) = backend.group_bbox(group_handle)? else {
        return Ok(Position::default());
    };
    let Some(fragment_bbox) = fragment_bbox(data) else {
        return Ok(Position::default());
    };
    Ok(Position::new(
        group_bbox.left - fragment_bbox.left,
        group_bbox.top - fragment_bbox.top,
    ))
}

/// Bounding region of a fragment's content in fragment-local coordinates.
fn fragment_bbox(data: &pcb_lens::fragment::FragmentData) -> Option<Rect> {
    let mut bbox: Option<Rect> = None;
    let mut merge_point = |p: Position| {
        let r = Rect::new(p.x, p.y, 0, 0);
        bbox = Some(match bbox {
            Some(existing) => existing.merge(&r),
            None => r,
        });
    };
    for complement in data.footprint_complements.values() {
        merge_point(complement.position);
    }
    for track in &data.group_complement.tracks {
        merge_point(track.start);
        merge_point(track.end);
    }
    for via in &data.group_complement.vias {
        merge_point(via.position);
    }
    for zone in &data.group_complement.zones {
        for point in &zone.outline {
            merge_point(*point);
        }
    }
    bbox
}

// Phase 7 -------------------------------------------------------------------

fn place_new_entities(
    changeset: &SyncChangeset,
    backend: &mut dyn LayoutBackend,
    plan: &FragmentPlan,
    removed_by_path: &BTreeMap<String, (&EntityId, &FootprintComplement)>,
    overrides: &mut ComplementOverrides,
    oplog: &mut OpLog,
) -> Result<(), ApplyError> {
    let view = &changeset.view;
    let fp_index = footprint_index(&*backend)?;
    let gr_index = group_index(&*backend)?;

    // FPID changes inherit the removed footprint's placement instead of
    // being re-packed. The replacement arrives unlocked with fresh text
    // positions since the new geometry may differ.
    let mut inherited: BTreeSet<EntityId> = BTreeSet::new();
    for id in &changeset.added_footprints {
        if plan.is_covered(id) {
            continue;
        }
        let path = id.path.to_string();
        if let Some((old_id, old_complement)) = removed_by_path.get(&path) {
            overrides.insert(
                id.clone(),
                FootprintComplement {
                    position: old_complement.position,
                    orientation: old_complement.orientation,
                    layer: old_complement.layer,
                    ..Default::default()
                },
            );
            inherited.insert(id.clone());
            oplog.place_fp_inherit(
                &path,
                old_complement.position.x,
                old_complement.position.y,
                &old_id.fpid,
                &id.fpid,
            );
        }
    }

    // Anchor: bounding box of all pre-existing content.
    let mut anchor: Option<Rect> = None;
    let mut merge_anchor = |r: Rect| {
        anchor = Some(match anchor {
            Some(existing) => existing.merge(&r),
            None => r,
        });
    };
    for id in view.footprints.keys() {
        if changeset.added_footprints.contains(id) {
            continue;
        }
        if let Some(&handle) = fp_index.get(&id.path.to_string()) {
            merge_anchor(backend.footprint_bbox(handle)?);
        }
    }
    for id in view.groups.keys() {
        if changeset.added_groups.contains(id) {
            continue;
        }
        if let Some(&handle) = gr_index.get(&id.path.to_string()) {
            if let Some(bbox) = backend.group_bbox(handle)? {
                merge_anchor(bbox);
            }
        }
    }

    // Top-most added groups become placement units; loose new footprints
    // (outside every added group, not inherited, not fragment-owned by a
    // pre-existing group) are units of their own.
    let top_groups: Vec<&EntityId> = changeset
        .added_groups
        .iter()
        .filter(|g| {
            !changeset
                .added_groups
                .iter()
                .any(|other| other.path.is_ancestor_of(&g.path))
        })
        .collect();

    let inside_added_group = |id: &EntityId| {
        changeset
            .added_groups
            .iter()
            .any(|g| g.path.is_ancestor_of(&id.path))
    };

    let mut unit_rects: Vec<PlacementRect> = Vec::new();
    // Per-unit data: local member layouts to translate after placement.
    let mut group_units: BTreeMap<EntityId, GroupUnit> = BTreeMap::new();
    let mut loose_units: BTreeMap<EntityId, LooseUnit> = BTreeMap::new();

    for group_id in top_groups {
        let Some(group_view) = view.groups.get(group_id) else {
            continue;
        };
        let new_members: Vec<EntityId> = group_view
            .member_ids
            .iter()
            .filter(|m| changeset.added_footprints.contains(*m) && !inherited.contains(*m))
            .cloned()
            .collect();

        if plan.is_authoritative(group_id) {
            // Members already sit at fragment-local positions; the group
            // travels as one rect.
            let mut content: Vec<PlacementRect> = Vec::new();
            for member_id in &new_members {
                let Some(&handle) = fp_index.get(&member_id.path.to_string()) else {
                    continue;
                };
                let bbox = backend.footprint_bbox(handle)?;
                let complement = overrides
                    .get(member_id)
                    .cloned()
                    .unwrap_or_default();
                let mut rect =
                    PlacementRect::new(member_id.clone(), bbox.width, bbox.height);
                rect.x = complement.position.x - bbox.width / 2;
                rect.y = complement.position.y - bbox.height / 2;
                content.push(rect);
            }
            let Some(local_bbox) = compute_cluster_bbox(&content) else {
                continue;
            };
            unit_rects.push(PlacementRect::new(
                group_id.clone(),
                local_bbox.width,
                local_bbox.height,
            ));
            group_units.insert(
                group_id.clone(),
                GroupUnit {
                    local_origin: Position::new(local_bbox.left, local_bbox.top),
                    members: new_members,
                    translate_routing: true,
                    log_member_placements: false,
                },
            );
        } else if new_members.is_empty() {
            // Pure group restoration: nothing moves, no PLACE_GR.
            continue;
        } else {
            // Pack the new members into a local cluster first.
            let mut member_rects: Vec<PlacementRect> = Vec::new();
            let mut member_geometry: BTreeMap<EntityId, Rect> = BTreeMap::new();
            for member_id in &new_members {
                let Some(&handle) = fp_index.get(&member_id.path.to_string()) else {
                    continue;
                };
                let bbox = backend.footprint_bbox(handle)?;
                member_rects.push(PlacementRect::new(
                    member_id.clone(),
                    bbox.width,
                    bbox.height,
                ));
                member_geometry.insert(member_id.clone(), bbox);
            }
            let local = pack_at_origin(&member_rects);
            let mut content: Vec<PlacementRect> = Vec::new();
            for rect in &member_rects {
                if let Some(pos) = local.get(&rect.entity_id) {
                    // Footprint origins are bbox centers in local space.
                    let complement = FootprintComplement {
                        position: Position::new(
                            pos.x + rect.width / 2,
                            pos.y + rect.height / 2,
                        ),
                        ..Default::default()
                    };
                    overrides.insert(rect.entity_id.clone(), complement);
                    content.push(rect.move_to(pos.x, pos.y));
                }
            }
            let Some(local_bbox) = compute_cluster_bbox(&content) else {
                continue;
            };
            unit_rects.push(PlacementRect::new(
                group_id.clone(),
                local_bbox.width,
                local_bbox.height,
            ));
            group_units.insert(
                group_id.clone(),
                GroupUnit {
                    local_origin: Position::new(local_bbox.left, local_bbox.top),
                    members: member_geometry.keys().cloned().collect(),
                    translate_routing: false,
                    log_member_placements: true,
                },
            );
        }
    }

    for id in &changeset.added_footprints {
        if inherited.contains(id) || plan.is_covered(id) || inside_added_group(id) {
            continue;
        }
        let Some(&handle) = fp_index.get(&id.path.to_string()) else {
            continue;
        };
        let bbox = backend.footprint_bbox(handle)?;
        unit_rects.push(PlacementRect::new(id.clone(), bbox.width, bbox.height));
        loose_units.insert(id.clone(), LooseUnit { bbox });
    }

    if unit_rects.is_empty() {
        return Ok(());
    }

    let placed = hierplace(&unit_rects, anchor);

    for rect in &unit_rects {
        let Some(target) = placed.get(&rect.entity_id) else {
            continue;
        };

        if let Some(unit) = group_units.get(&rect.entity_id) {
            let delta = *target - unit.local_origin;
            for member_id in &unit.members {
                let base = overrides.get(member_id).cloned().unwrap_or_default();
                let translated = base.translated(delta);
                if unit.log_member_placements {
                    oplog.place_fp(
                        &member_id.path.to_string(),
                        translated.position.x,
                        translated.position.y,
                        0,
                        0,
                    );
                }
                overrides.insert(member_id.clone(), translated);
            }
            if unit.translate_routing {
                if let Some(&group_handle) = gr_index.get(&rect.entity_id.path.to_string()) {
                    backend.translate_group(group_handle, delta)?;
                }
            }
            oplog.place_gr(
                &rect.entity_id.path.to_string(),
                target.x,
                target.y,
                rect.width,
                rect.height,
            );
        } else if let Some(unit) = loose_units.get(&rect.entity_id) {
            // Packed coordinates address the bbox top-left; recover the
            // footprint origin from its bbox offset.
            let complement = changeset
                .complement
                .footprints
                .get(&rect.entity_id)
                .cloned()
                .unwrap_or_default();
            let offset = complement.position - Position::new(unit.bbox.left, unit.bbox.top);
            let final_position = *target + offset;
            overrides.insert(rect.entity_id.clone(), complement.with_position(final_position));
            oplog.place_fp(
                &rect.entity_id.path.to_string(),
                final_position.x,
                final_position.y,
                rect.width,
                rect.height,
            );
        }
    }

    Ok(())
}

#[derive(Debug)]
struct GroupUnit {
    /// Top-left of the unit's content in its local coordinate space.
    local_origin: Position,
    members: Vec<EntityId>,
    /// Fragment routing was duplicated at local coordinates and must move
    /// with the group.
    translate_routing: bool,
    log_member_placements: bool,
}

#[derive(Debug)]
struct LooseUnit {
    bbox: Rect,
}

/// A fragment loader for boards that reference no fragments: any lookup is
/// an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFragmentLoader;

impl FragmentLoader for NoFragmentLoader {
    fn load(&self, layout_path: &str) -> anyhow::Result<pcb_lens::fragment::FragmentData> {
        anyhow::bail!("no fragment loader configured (requested '{layout_path}')")
    }
}
