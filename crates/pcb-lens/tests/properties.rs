//! Property-based tests for the lens laws and the placement engine.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use pcb_lens::changeset::build_changeset;
use pcb_lens::diagnostics::Diagnostics;
use pcb_lens::hierplace::{
    compute_cluster_bbox, hierplace, pack_at_origin, PlacementRect, Rect, DEFAULT_MARGIN,
};
use pcb_lens::lens::adapt_complement;
use pcb_lens::types::{
    BoardComplement, BoardView, EntityId, EntityPath, FootprintComplement, FootprintView,
    GroupComplement, GroupView, Layer, Position, TrackComplement,
};

// Strategies ----------------------------------------------------------------

fn segment() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_]{0,7}"
}

fn entity_path() -> impl Strategy<Value = EntityPath> {
    prop::collection::vec(segment(), 1..=4).prop_map(EntityPath::new)
}

fn fpid() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "Resistor_SMD:R_0402".to_string(),
        "Resistor_SMD:R_0603".to_string(),
        "Capacitor_SMD:C_0603".to_string(),
        "Package_SO:SOIC-8".to_string(),
    ])
}

fn entity_id() -> impl Strategy<Value = EntityId> {
    (entity_path(), fpid()).prop_map(|(path, fpid)| EntityId::new(path, fpid))
}

fn position() -> impl Strategy<Value = Position> {
    (-100_000_000i64..100_000_000, -100_000_000i64..100_000_000)
        .prop_map(|(x, y)| Position::new(x, y))
}

fn footprint_complement() -> impl Strategy<Value = FootprintComplement> {
    (
        position(),
        prop::sample::select(vec![0.0, 90.0, 180.0, 270.0]),
        prop::bool::ANY,
        prop::bool::ANY,
    )
        .prop_map(|(position, orientation, back, locked)| FootprintComplement {
            position,
            orientation,
            layer: if back { Layer::BackCu } else { Layer::FrontCu },
            locked,
            ..Default::default()
        })
}

fn footprint_view(id: EntityId) -> FootprintView {
    FootprintView {
        reference: id.path.name().to_string(),
        value: "1k".to_string(),
        fpid: id.fpid.clone(),
        entity_id: id,
        ..Default::default()
    }
}

/// A view plus an old complement that overlaps it partially: some entities
/// survive, some are new, some are stale.
fn view_and_old_complement() -> impl Strategy<Value = (BoardView, BoardComplement)> {
    (
        prop::collection::btree_set(entity_id(), 0..12),
        prop::collection::btree_set(entity_id(), 0..12),
        prop::collection::vec(footprint_complement(), 24),
    )
        .prop_map(|(view_ids, old_ids, complements)| {
            let mut view = BoardView::default();
            for id in &view_ids {
                view.footprints.insert(id.clone(), footprint_view(id.clone()));
            }

            let mut old = BoardComplement::default();
            for (i, id) in old_ids.iter().enumerate() {
                old.footprints.insert(id.clone(), complements[i].clone());
            }
            (view, old)
        })
}

fn placement_rects() -> impl Strategy<Value = Vec<PlacementRect>> {
    prop::collection::btree_map(entity_path(), (0i64..30_000_000, 0i64..30_000_000), 1..10)
        .prop_map(|sizes| {
            sizes
                .into_iter()
                .map(|(path, (w, h))| PlacementRect::new(EntityId::group(path), w, h))
                .collect()
        })
}

fn placed(rects: &[PlacementRect], layout: &BTreeMap<EntityId, Position>) -> Vec<PlacementRect> {
    rects
        .iter()
        .filter_map(|r| layout.get(&r.entity_id).map(|p| r.move_to(p.x, p.y)))
        .collect()
}

// Lens laws -----------------------------------------------------------------

proptest! {
    // Adapting a complement yields exactly the view's domain.
    #[test]
    fn adapted_domain_matches_view((view, old) in view_and_old_complement()) {
        let mut diags = Diagnostics::default();
        let adapted = adapt_complement(&view, &old, &mut diags);
        let view_ids: BTreeSet<&EntityId> = view.footprints.keys().collect();
        let adapted_ids: BTreeSet<&EntityId> = adapted.footprints.keys().collect();
        prop_assert_eq!(view_ids, adapted_ids);
    }

    // Entities present in both old and new domains keep their complement
    // byte-for-byte.
    #[test]
    fn surviving_complements_preserved((view, old) in view_and_old_complement()) {
        let mut diags = Diagnostics::default();
        let adapted = adapt_complement(&view, &old, &mut diags);
        for (id, complement) in &old.footprints {
            if view.footprints.contains_key(id) {
                prop_assert_eq!(adapted.footprints.get(id), Some(complement));
            }
        }
    }

    // Adapting twice changes nothing, and a second sync produces an empty
    // changeset.
    #[test]
    fn adapt_is_idempotent((view, old) in view_and_old_complement()) {
        let mut diags = Diagnostics::default();
        let once = adapt_complement(&view, &old, &mut diags);
        let twice = adapt_complement(&view, &once, &mut diags);
        prop_assert_eq!(&once, &twice);

        let second_pass = build_changeset(&view, &twice, &once);
        prop_assert!(second_pass.is_empty());
    }

    // Routing in an adapted complement references only view nets (or the
    // no-net sentinel), provided the old complement did.
    #[test]
    fn routing_nets_stay_valid(
        (mut view, old) in view_and_old_complement(),
        group_path in entity_path(),
        use_net in prop::bool::ANY,
    ) {
        view.nets.insert("VCC".to_string(), Default::default());
        let group_id = EntityId::group(group_path);
        view.groups.insert(group_id.clone(), GroupView {
            entity_id: group_id.clone(),
            member_ids: vec![],
            layout_path: Some("x".to_string()),
        });

        let mut old = old;
        old.groups.insert(group_id, GroupComplement {
            tracks: vec![TrackComplement {
                uuid: "t".to_string(),
                start: Position::new(0, 0),
                end: Position::new(1, 0),
                width: 1,
                layer: "F.Cu".to_string(),
                net_name: if use_net { "VCC".to_string() } else { String::new() },
            }],
            ..Default::default()
        });

        let mut diags = Diagnostics::default();
        let adapted = adapt_complement(&view, &old, &mut diags);

        let valid: BTreeSet<&str> = view.nets.keys().map(String::as_str).chain([""]).collect();
        for group in adapted.groups.values() {
            for track in &group.tracks {
                prop_assert!(valid.contains(track.net_name.as_str()));
            }
        }
    }

    // EntityId identity is the (path, fpid) pair and the derived UUID is
    // deterministic in it.
    #[test]
    fn entity_id_identity(path in entity_path(), a in fpid(), b in fpid()) {
        let id_a = EntityId::new(path.clone(), a.clone());
        let id_b = EntityId::new(path.clone(), b.clone());
        prop_assert_eq!(id_a == id_b, a == b);
        prop_assert_eq!(id_a.uuid() == id_b.uuid(), a == b);

        let mut other_segments = path.segments().to_vec();
        other_segments.push("x".to_string());
        let id_c = EntityId::new(EntityPath::new(other_segments), a.clone());
        prop_assert_ne!(&id_a, &id_c);
        prop_assert_ne!(id_a.uuid(), id_c.uuid());

        // Deterministic.
        prop_assert_eq!(id_a.uuid(), EntityId::new(path, a).uuid());
    }
}

// Placement -----------------------------------------------------------------

proptest! {
    // pack_at_origin is normalized, overlap-free, size-preserving and
    // deterministic.
    #[test]
    fn pack_invariants(rects in placement_rects()) {
        let layout = pack_at_origin(&rects);

        let positive: Vec<&PlacementRect> =
            rects.iter().filter(|r| r.width > 0 && r.height > 0).collect();
        prop_assert_eq!(layout.len(), positive.len());

        if layout.is_empty() {
            return Ok(());
        }

        let placed = placed(&rects, &layout);
        let bbox = compute_cluster_bbox(&placed).unwrap();
        prop_assert_eq!(bbox.left, 0);
        prop_assert_eq!(bbox.top, 0);
        for pos in layout.values() {
            prop_assert!(pos.x >= 0 && pos.y >= 0);
        }

        for (i, a) in placed.iter().enumerate() {
            for b in placed.iter().skip(i + 1) {
                prop_assert!(!a.rect().intersects(&b.rect()));
            }
        }

        // Deterministic: a second run yields the identical layout.
        prop_assert_eq!(pack_at_origin(&rects), layout);
    }

    // hierplace is a pure translation of pack_at_origin; with an anchor
    // the cluster clears the anchor's right edge.
    #[test]
    fn hierplace_translates_packing(
        rects in placement_rects(),
        anchor_pos in position(),
        anchor_w in 1i64..50_000_000,
        anchor_h in 1i64..50_000_000,
    ) {
        let packed = pack_at_origin(&rects);
        let anchor = Rect::new(anchor_pos.x, anchor_pos.y, anchor_w, anchor_h);
        let layout = hierplace(&rects, Some(anchor));

        prop_assert_eq!(layout.len(), packed.len());
        if layout.is_empty() {
            return Ok(());
        }

        // One shared translation delta.
        let first = layout.keys().next().unwrap();
        let delta = *layout.get(first).unwrap() - *packed.get(first).unwrap();
        for (id, pos) in &layout {
            prop_assert_eq!(*pos - *packed.get(id).unwrap(), delta);
        }

        // Cluster left edge sits a margin right of the anchor.
        let placed = placed(&rects, &layout);
        let bbox = compute_cluster_bbox(&placed).unwrap();
        prop_assert_eq!(bbox.left, anchor.right() + DEFAULT_MARGIN);
        prop_assert!(bbox.left >= anchor.right());
    }
}
