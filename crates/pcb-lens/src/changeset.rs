//! Changeset synthesis: the interface between pure lens computation and
//! effectful application.
//!
//! A [`SyncChangeset`] is computed by pure set difference between the adapted
//! complement and the previous complement. Removed entries keep their old
//! complement so the applier can recover position/rotation as hints (FPID
//! changes inherit the old placement).

use std::collections::{BTreeMap, BTreeSet};

use crate::diagnostics::{kind, Diagnostic, Diagnostics, Severity};
use crate::oplog::{format_line, OpKind, Value};
use crate::types::{BoardComplement, BoardView, EntityId, FootprintComplement, GroupComplement};

/// The full set of changes one sync pass wants to apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncChangeset {
    /// The source view (authoritative).
    pub view: BoardView,
    /// The adapted complement whose domain matches `view`.
    pub complement: BoardComplement,
    pub added_footprints: BTreeSet<EntityId>,
    /// Removed footprints with their old complements as placement hints.
    pub removed_footprints: BTreeMap<EntityId, FootprintComplement>,
    pub added_groups: BTreeSet<EntityId>,
    pub removed_groups: BTreeMap<EntityId, GroupComplement>,
}

impl SyncChangeset {
    pub fn is_empty(&self) -> bool {
        self.added_footprints.is_empty()
            && self.removed_footprints.is_empty()
            && self.added_groups.is_empty()
            && self.removed_groups.is_empty()
    }

    /// Deterministic plaintext rendering: one line per change, sorted by
    /// path within each change kind, fields in fixed order.
    pub fn to_plaintext(&self) -> String {
        let mut lines: Vec<String> = Vec::new();

        for id in &self.added_footprints {
            let fp = self.view.footprints.get(id);
            let position = self
                .complement
                .footprints
                .get(id)
                .map(|c| c.position)
                .unwrap_or_default();
            let fields = vec![
                ("path".to_string(), Value::from(id.path.to_string())),
                (
                    "ref".to_string(),
                    Value::from(fp.map(|f| f.reference.clone()).unwrap_or_default()),
                ),
                ("fpid".to_string(), Value::from(id.fpid.clone())),
                (
                    "value".to_string(),
                    Value::from(fp.map(|f| f.value.clone()).unwrap_or_default()),
                ),
                ("x".to_string(), Value::Int(position.x)),
                ("y".to_string(), Value::Int(position.y)),
            ];
            lines.push(format_line(OpKind::FpAdd, &fields));
        }

        for (id, old) in &self.removed_footprints {
            let fields = vec![
                ("path".to_string(), Value::from(id.path.to_string())),
                ("x".to_string(), Value::Int(old.position.x)),
                ("y".to_string(), Value::Int(old.position.y)),
            ];
            lines.push(format_line(OpKind::FpRemove, &fields));
        }

        for id in &self.added_groups {
            let fields = vec![("path".to_string(), Value::from(id.path.to_string()))];
            lines.push(format_line(OpKind::GrAdd, &fields));
        }

        for id in self.removed_groups.keys() {
            let fields = vec![("path".to_string(), Value::from(id.path.to_string()))];
            lines.push(format_line(OpKind::GrRemove, &fields));
        }

        if lines.is_empty() {
            return String::new();
        }
        lines.join("\n") + "\n"
    }

    /// Report additions/removals as diagnostics: added footprints are info,
    /// removed footprints are warnings.
    pub fn to_diagnostics(&self, out: &mut Diagnostics) {
        for id in &self.added_footprints {
            let reference = self
                .view
                .footprints
                .get(id)
                .map(|f| f.reference.clone())
                .unwrap_or_default();
            out.push(
                Diagnostic::new(
                    kind::MISSING_FOOTPRINT,
                    Severity::Info,
                    format!("Footprint {} ({}) will be added to the layout", id.path, id.fpid),
                )
                .with_path(id.path.to_string())
                .with_reference(reference),
            );
        }
        for id in self.removed_footprints.keys() {
            out.push(
                Diagnostic::new(
                    kind::EXTRA_FOOTPRINT,
                    Severity::Warning,
                    format!(
                        "Footprint {} ({}) is not in the source netlist and will be removed",
                        id.path, id.fpid
                    ),
                )
                .with_path(id.path.to_string()),
            );
        }
    }
}

/// Compute the changeset between the adapted complement and the previous one.
pub fn build_changeset(
    new_view: &BoardView,
    new_complement: &BoardComplement,
    old_complement: &BoardComplement,
) -> SyncChangeset {
    let added_footprints: BTreeSet<EntityId> = new_complement
        .footprints
        .keys()
        .filter(|id| !old_complement.footprints.contains_key(id))
        .cloned()
        .collect();

    let removed_footprints: BTreeMap<EntityId, FootprintComplement> = old_complement
        .footprints
        .iter()
        .filter(|(id, _)| !new_complement.footprints.contains_key(id))
        .map(|(id, c)| (id.clone(), c.clone()))
        .collect();

    let added_groups: BTreeSet<EntityId> = new_complement
        .groups
        .keys()
        .filter(|id| !old_complement.groups.contains_key(id))
        .cloned()
        .collect();

    let removed_groups: BTreeMap<EntityId, GroupComplement> = old_complement
        .groups
        .iter()
        .filter(|(id, _)| !new_complement.groups.contains_key(id))
        .map(|(id, c)| (id.clone(), c.clone()))
        .collect();

    SyncChangeset {
        view: new_view.clone(),
        complement: new_complement.clone(),
        added_footprints,
        removed_footprints,
        added_groups,
        removed_groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FootprintView, Position};

    fn view_with(paths: &[(&str, &str)]) -> BoardView {
        let mut view = BoardView::default();
        for (path, fpid) in paths {
            let id = EntityId::parse(path, fpid);
            view.footprints.insert(
                id.clone(),
                FootprintView {
                    entity_id: id,
                    reference: path.rsplit('.').next().unwrap().to_string(),
                    value: "10k".to_string(),
                    fpid: fpid.to_string(),
                    ..Default::default()
                },
            );
        }
        view
    }

    fn complement_with(paths: &[(&str, &str, i64, i64)]) -> BoardComplement {
        let mut complement = BoardComplement::default();
        for (path, fpid, x, y) in paths {
            complement.footprints.insert(
                EntityId::parse(path, fpid),
                FootprintComplement {
                    position: Position::new(*x, *y),
                    ..Default::default()
                },
            );
        }
        complement
    }

    #[test]
    fn empty_changeset() {
        let changeset = build_changeset(
            &BoardView::default(),
            &BoardComplement::default(),
            &BoardComplement::default(),
        );
        assert!(changeset.is_empty());
        assert_eq!(changeset.to_plaintext(), "");
    }

    #[test]
    fn detects_added_and_removed() {
        let view = view_with(&[("A", "Lib:R"), ("B", "Lib:R")]);
        let new = complement_with(&[("A", "Lib:R", 0, 0), ("B", "Lib:R", 0, 0)]);
        let old = complement_with(&[("A", "Lib:R", 10, 10), ("C", "Lib:R", 5, 5)]);

        let changeset = build_changeset(&view, &new, &old);

        assert_eq!(
            changeset.added_footprints,
            BTreeSet::from([EntityId::parse("B", "Lib:R")])
        );
        assert_eq!(changeset.removed_footprints.len(), 1);
        let (removed_id, removed_old) = changeset.removed_footprints.iter().next().unwrap();
        assert_eq!(removed_id, &EntityId::parse("C", "Lib:R"));
        assert_eq!(removed_old.position, Position::new(5, 5));
    }

    #[test]
    fn serialization_format_and_order() {
        let view = view_with(&[("B.R1", "Lib:R"), ("A.R1", "Lib:R"), ("C.R1", "Lib:R")]);
        let new = complement_with(&[
            ("A.R1", "Lib:R", 0, 0),
            ("B.R1", "Lib:R", 0, 0),
            ("C.R1", "Lib:R", 0, 0),
        ]);
        let old = complement_with(&[("Legacy.R9", "Lib:R", 1000, 2000)]);

        let changeset = build_changeset(&view, &new, &old);
        let text = changeset.to_plaintext();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "FP_ADD path=A.R1 ref=R1 fpid=Lib:R value=10k x=0 y=0"
        );
        assert_eq!(
            lines[1],
            "FP_ADD path=B.R1 ref=R1 fpid=Lib:R value=10k x=0 y=0"
        );
        assert_eq!(
            lines[2],
            "FP_ADD path=C.R1 ref=R1 fpid=Lib:R value=10k x=0 y=0"
        );
        assert_eq!(lines[3], "FP_REMOVE path=Legacy.R9 x=1000 y=2000");
    }

    #[test]
    fn diagnostics_for_changes() {
        let view = view_with(&[("Power.R1", "Lib:R")]);
        let new = complement_with(&[("Power.R1", "Lib:R", 0, 0)]);
        let old = complement_with(&[("Legacy.R1", "Lib:R", 0, 0)]);

        let changeset = build_changeset(&view, &new, &old);
        let mut diags = Diagnostics::default();
        changeset.to_diagnostics(&mut diags);

        assert_eq!(diags.len(), 2);
        let added = diags
            .iter()
            .find(|d| d.kind == kind::MISSING_FOOTPRINT)
            .unwrap();
        assert_eq!(added.severity, Severity::Info);
        assert!(added.body.contains("Power.R1"));

        let removed = diags
            .iter()
            .find(|d| d.kind == kind::EXTRA_FOOTPRINT)
            .unwrap();
        assert_eq!(removed.severity, Severity::Warning);
        assert_eq!(removed.path, "Legacy.R1");
    }

    #[test]
    fn second_pass_changeset_is_empty() {
        // Idempotence at the changeset level: diffing a complement with
        // itself yields no changes.
        let new = complement_with(&[("A", "Lib:R", 3, 4)]);
        let view = view_with(&[("A", "Lib:R")]);
        let changeset = build_changeset(&view, &new, &new.clone());
        assert!(changeset.is_empty());
    }
}
