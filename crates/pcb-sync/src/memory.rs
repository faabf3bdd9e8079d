//! In-memory reference implementation of the layout backend.
//!
//! [`MemoryBoard`] is both the concrete backend used for file-backed boards
//! (it loads and saves a JSON board document) and the required test double
//! for SWIG-style handle invalidation: every structural mutation bumps a
//! generation counter, and any handle minted under an older generation fails
//! with [`BackendError::StaleHandle`] on use.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use pcb_lens::backend::{
    BackendError, FootprintHandle, FootprintRecord, GroupHandle, GroupRecord, LayoutBackend,
    PadRecord, RoutingItem,
};
use pcb_lens::hierplace::Rect;
use pcb_lens::types::{FootprintComplement, FootprintView, Position};

/// Pad layout and dimensions used to instantiate a footprint from the
/// library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootprintPrototype {
    pub pads: Vec<String>,
    pub width: i64,
    pub height: i64,
}

impl FootprintPrototype {
    pub fn new(pads: &[&str], width: i64, height: i64) -> Self {
        Self {
            pads: pads.iter().map(|p| p.to_string()).collect(),
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredPad {
    name: String,
    net_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredFootprint {
    path_field: String,
    kiid_path: String,
    fpid: String,
    reference: String,
    value: String,
    dnp: bool,
    exclude_from_bom: bool,
    exclude_from_pos: bool,
    fields: BTreeMap<String, String>,
    position: Position,
    orientation: f64,
    layer: pcb_lens::types::Layer,
    locked: bool,
    reference_position: Option<Position>,
    reference_visible: bool,
    value_position: Option<Position>,
    value_visible: bool,
    pads: Vec<StoredPad>,
    width: i64,
    height: i64,
    /// Name of the owning group, if any.
    group: Option<String>,
}

impl StoredFootprint {
    fn bbox(&self) -> Rect {
        Rect::new(
            self.position.x - self.width / 2,
            self.position.y - self.height / 2,
            self.width,
            self.height,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredGroup {
    name: String,
    items: Vec<RoutingItem>,
}

/// Serialized board document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BoardDoc {
    nets: Vec<String>,
    footprints: Vec<StoredFootprint>,
    groups: Vec<StoredGroup>,
}

/// In-memory board with generation-checked handles.
#[derive(Debug, Default)]
pub struct MemoryBoard {
    nets: BTreeSet<String>,
    footprints: Vec<StoredFootprint>,
    groups: Vec<StoredGroup>,
    library: BTreeMap<String, FootprintPrototype>,
    fallback_prototype: Option<FootprintPrototype>,
    generation: u64,
    connectivity_rebuilds: u64,
}

impl MemoryBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a library prototype under its `lib:name` identifier.
    pub fn register_prototype(&mut self, fpid: &str, prototype: FootprintPrototype) {
        self.library.insert(fpid.to_string(), prototype);
    }

    /// Prototype used when an fpid has no library entry. Without one,
    /// instantiation of an unknown fpid is a fatal error.
    pub fn set_fallback_prototype(&mut self, prototype: FootprintPrototype) {
        self.fallback_prototype = Some(prototype);
    }

    /// Number of connectivity rebuilds requested so far.
    pub fn connectivity_rebuilds(&self) -> u64 {
        self.connectivity_rebuilds
    }

    /// Load a board document from disk. The library starts empty.
    pub fn load(path: &Path) -> Result<Self, BackendError> {
        let contents = std::fs::read_to_string(path)?;
        let doc: BoardDoc = serde_json::from_str(&contents)?;
        let mut board = MemoryBoard::new();
        board.nets = doc.nets.into_iter().collect();
        board.footprints = doc.footprints;
        board.groups = doc.groups;
        Ok(board)
    }

    // Handle encoding: generation in the high 32 bits, index in the low 32.

    fn mint(&self, index: usize) -> u64 {
        (self.generation << 32) | index as u64
    }

    fn check(&self, raw: u64, len: usize) -> Result<usize, BackendError> {
        if raw >> 32 != self.generation {
            return Err(BackendError::StaleHandle);
        }
        let index = (raw & 0xffff_ffff) as usize;
        if index >= len {
            return Err(BackendError::StaleHandle);
        }
        Ok(index)
    }

    fn footprint_at(&self, handle: FootprintHandle) -> Result<&StoredFootprint, BackendError> {
        let index = self.check(handle.raw(), self.footprints.len())?;
        Ok(&self.footprints[index])
    }

    fn footprint_at_mut(
        &mut self,
        handle: FootprintHandle,
    ) -> Result<&mut StoredFootprint, BackendError> {
        let index = self.check(handle.raw(), self.footprints.len())?;
        Ok(&mut self.footprints[index])
    }

    fn group_at(&self, handle: GroupHandle) -> Result<&StoredGroup, BackendError> {
        let index = self.check(handle.raw(), self.groups.len())?;
        Ok(&self.groups[index])
    }

    fn resolve_prototype(&self, fpid: &str) -> Result<FootprintPrototype, BackendError> {
        self.library
            .get(fpid)
            .or(self.fallback_prototype.as_ref())
            .cloned()
            .ok_or_else(|| BackendError::UnresolvedFootprint(fpid.to_string()))
    }

    fn to_doc(&self) -> BoardDoc {
        let mut footprints = self.footprints.clone();
        footprints.sort_by(|a, b| a.path_field.cmp(&b.path_field));
        let mut groups = self.groups.clone();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        BoardDoc {
            nets: self.nets.iter().cloned().collect(),
            footprints,
            groups,
        }
    }
}

fn routing_bbox(item: &RoutingItem) -> Option<Rect> {
    match item {
        RoutingItem::Track(t) => {
            let left = t.start.x.min(t.end.x);
            let top = t.start.y.min(t.end.y);
            let right = t.start.x.max(t.end.x);
            let bottom = t.start.y.max(t.end.y);
            Some(Rect::new(left, top, right - left, bottom - top))
        }
        RoutingItem::Via(v) => {
            let r = v.diameter / 2;
            Some(Rect::new(
                v.position.x - r,
                v.position.y - r,
                v.diameter,
                v.diameter,
            ))
        }
        RoutingItem::Zone(z) => {
            let xs: Vec<i64> = z.outline.iter().map(|p| p.x).collect();
            let ys: Vec<i64> = z.outline.iter().map(|p| p.y).collect();
            let left = *xs.iter().min()?;
            let top = *ys.iter().min()?;
            let right = *xs.iter().max()?;
            let bottom = *ys.iter().max()?;
            Some(Rect::new(left, top, right - left, bottom - top))
        }
        RoutingItem::Graphic(_) => None,
    }
}

fn translate_item(item: &mut RoutingItem, delta: Position) {
    match item {
        RoutingItem::Track(t) => {
            t.start = t.start + delta;
            t.end = t.end + delta;
        }
        RoutingItem::Via(v) => v.position = v.position + delta,
        RoutingItem::Zone(z) => {
            for point in &mut z.outline {
                *point = *point + delta;
            }
        }
        RoutingItem::Graphic(_) => {}
    }
}

impl LayoutBackend for MemoryBoard {
    fn footprints(&self) -> Vec<FootprintHandle> {
        (0..self.footprints.len())
            .map(|i| FootprintHandle::new(self.mint(i)))
            .collect()
    }

    fn groups(&self) -> Vec<GroupHandle> {
        (0..self.groups.len())
            .map(|i| GroupHandle::new(self.mint(i)))
            .collect()
    }

    fn footprint(&self, handle: FootprintHandle) -> Result<FootprintRecord, BackendError> {
        let fp = self.footprint_at(handle)?;
        Ok(FootprintRecord {
            path_field: fp.path_field.clone(),
            kiid_path: fp.kiid_path.clone(),
            fpid: fp.fpid.clone(),
            reference: fp.reference.clone(),
            value: fp.value.clone(),
            dnp: fp.dnp,
            exclude_from_bom: fp.exclude_from_bom,
            exclude_from_pos: fp.exclude_from_pos,
            fields: fp.fields.clone(),
            position: fp.position,
            orientation: fp.orientation,
            layer: fp.layer,
            locked: fp.locked,
            reference_position: fp.reference_position,
            reference_visible: fp.reference_visible,
            value_position: fp.value_position,
            value_visible: fp.value_visible,
            pads: fp
                .pads
                .iter()
                .map(|p| PadRecord {
                    name: p.name.clone(),
                    net_name: p.net_name.clone(),
                })
                .collect(),
        })
    }

    fn group(&self, handle: GroupHandle) -> Result<GroupRecord, BackendError> {
        let group = self.group_at(handle)?;
        let member_paths = self
            .footprints
            .iter()
            .filter(|fp| fp.group.as_deref() == Some(group.name.as_str()))
            .map(|fp| fp.path_field.clone())
            .collect();
        Ok(GroupRecord {
            name: group.name.clone(),
            member_paths,
            items: group.items.clone(),
        })
    }

    fn net_names(&self) -> Vec<String> {
        self.nets.iter().cloned().collect()
    }

    fn footprint_bbox(&self, handle: FootprintHandle) -> Result<Rect, BackendError> {
        Ok(self.footprint_at(handle)?.bbox())
    }

    fn group_bbox(&self, handle: GroupHandle) -> Result<Option<Rect>, BackendError> {
        let group = self.group_at(handle)?;
        let mut bbox: Option<Rect> = None;
        let mut merge = |r: Rect| {
            bbox = Some(match bbox {
                Some(existing) => existing.merge(&r),
                None => r,
            });
        };
        for fp in &self.footprints {
            if fp.group.as_deref() == Some(group.name.as_str()) {
                merge(fp.bbox());
            }
        }
        for item in &group.items {
            if let Some(r) = routing_bbox(item) {
                merge(r);
            }
        }
        Ok(bbox)
    }

    fn create_net(&mut self, name: &str) -> Result<(), BackendError> {
        if !self.nets.insert(name.to_string()) {
            return Err(BackendError::DuplicateNet(name.to_string()));
        }
        Ok(())
    }

    fn delete_net(&mut self, name: &str) -> Result<(), BackendError> {
        if !self.nets.remove(name) {
            return Err(BackendError::UnknownNet(name.to_string()));
        }
        // Release pads and routing bound to the deleted net.
        for fp in &mut self.footprints {
            for pad in &mut fp.pads {
                if pad.net_name == name {
                    pad.net_name.clear();
                }
            }
        }
        for group in &mut self.groups {
            for item in &mut group.items {
                match item {
                    RoutingItem::Track(t) if t.net_name == name => t.net_name.clear(),
                    RoutingItem::Via(v) if v.net_name == name => v.net_name.clear(),
                    RoutingItem::Zone(z) if z.net_name == name => z.net_name.clear(),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn delete_footprint(&mut self, handle: FootprintHandle) -> Result<(), BackendError> {
        let index = self.check(handle.raw(), self.footprints.len())?;
        self.footprints.remove(index);
        self.generation += 1;
        Ok(())
    }

    fn delete_group(&mut self, handle: GroupHandle) -> Result<(), BackendError> {
        let index = self.check(handle.raw(), self.groups.len())?;
        let name = self.groups[index].name.clone();
        // Container only: release members, keep them on the board.
        for fp in &mut self.footprints {
            if fp.group.as_deref() == Some(name.as_str()) {
                fp.group = None;
            }
        }
        self.groups.remove(index);
        self.generation += 1;
        Ok(())
    }

    fn add_footprint(&mut self, view: &FootprintView) -> Result<FootprintHandle, BackendError> {
        let prototype = self.resolve_prototype(&view.fpid)?;
        let path = view.entity_id.path.to_string();
        self.footprints.push(StoredFootprint {
            path_field: path,
            kiid_path: view.entity_id.kiid_path(),
            fpid: view.fpid.clone(),
            reference: view.reference.clone(),
            value: view.value.clone(),
            dnp: view.dnp,
            exclude_from_bom: view.exclude_from_bom,
            exclude_from_pos: view.exclude_from_pos,
            fields: view.fields.clone(),
            position: Position::default(),
            orientation: 0.0,
            layer: pcb_lens::types::Layer::FrontCu,
            locked: false,
            reference_position: None,
            reference_visible: true,
            value_position: None,
            value_visible: false,
            pads: prototype
                .pads
                .iter()
                .map(|name| StoredPad {
                    name: name.clone(),
                    net_name: String::new(),
                })
                .collect(),
            width: prototype.width,
            height: prototype.height,
            group: None,
        });
        self.generation += 1;
        Ok(FootprintHandle::new(self.mint(self.footprints.len() - 1)))
    }

    fn add_group(&mut self, name: &str) -> Result<GroupHandle, BackendError> {
        if self.groups.iter().any(|g| g.name == name) {
            return Err(BackendError::DuplicateGroup(name.to_string()));
        }
        self.groups.push(StoredGroup {
            name: name.to_string(),
            items: Vec::new(),
        });
        self.generation += 1;
        Ok(GroupHandle::new(self.mint(self.groups.len() - 1)))
    }

    fn update_footprint_view(
        &mut self,
        handle: FootprintHandle,
        view: &FootprintView,
    ) -> Result<(), BackendError> {
        let fp = self.footprint_at_mut(handle)?;
        fp.reference = view.reference.clone();
        fp.value = view.value.clone();
        fp.dnp = view.dnp;
        fp.exclude_from_bom = view.exclude_from_bom;
        fp.exclude_from_pos = view.exclude_from_pos;
        fp.fields = view.fields.clone();
        fp.fpid = view.fpid.clone();
        Ok(())
    }

    fn assign_pad_net(
        &mut self,
        handle: FootprintHandle,
        pad: &str,
        net_name: &str,
    ) -> Result<(), BackendError> {
        if !net_name.is_empty() && !self.nets.contains(net_name) {
            return Err(BackendError::UnknownNet(net_name.to_string()));
        }
        let fp = self.footprint_at_mut(handle)?;
        let path = fp.path_field.clone();
        match fp.pads.iter_mut().find(|p| p.name == pad) {
            Some(stored) => {
                stored.net_name = net_name.to_string();
                Ok(())
            }
            None => Err(BackendError::UnknownPad {
                path,
                pad: pad.to_string(),
            }),
        }
    }

    fn add_to_group(
        &mut self,
        group: GroupHandle,
        footprint: FootprintHandle,
    ) -> Result<(), BackendError> {
        let name = self.group_at(group)?.name.clone();
        self.footprint_at_mut(footprint)?.group = Some(name);
        Ok(())
    }

    fn remove_from_group(
        &mut self,
        group: GroupHandle,
        footprint: FootprintHandle,
    ) -> Result<(), BackendError> {
        let name = self.group_at(group)?.name.clone();
        let fp = self.footprint_at_mut(footprint)?;
        if fp.group.as_deref() == Some(name.as_str()) {
            fp.group = None;
        }
        Ok(())
    }

    fn add_routing(&mut self, group: GroupHandle, item: &RoutingItem) -> Result<(), BackendError> {
        let net_name = item.net_name();
        if !net_name.is_empty() && !self.nets.contains(net_name) {
            return Err(BackendError::UnknownNet(net_name.to_string()));
        }
        let index = self.check(group.raw(), self.groups.len())?;
        self.groups[index].items.push(item.clone());
        Ok(())
    }

    fn set_placement(
        &mut self,
        handle: FootprintHandle,
        complement: &FootprintComplement,
    ) -> Result<(), BackendError> {
        let fp = self.footprint_at_mut(handle)?;
        fp.position = complement.position;
        fp.orientation = complement.orientation;
        fp.layer = complement.layer;
        fp.locked = complement.locked;
        fp.reference_position = complement.reference_position;
        fp.reference_visible = complement.reference_visible;
        fp.value_position = complement.value_position;
        fp.value_visible = complement.value_visible;
        Ok(())
    }

    fn translate_group(&mut self, group: GroupHandle, delta: Position) -> Result<(), BackendError> {
        let index = self.check(group.raw(), self.groups.len())?;
        let name = self.groups[index].name.clone();
        for item in &mut self.groups[index].items {
            translate_item(item, delta);
        }
        for fp in &mut self.footprints {
            if fp.group.as_deref() == Some(name.as_str()) {
                fp.position = fp.position + delta;
                fp.reference_position = fp.reference_position.map(|p| p + delta);
                fp.value_position = fp.value_position.map(|p| p + delta);
            }
        }
        Ok(())
    }

    fn rebuild_connectivity(&mut self) {
        self.connectivity_rebuilds += 1;
    }

    fn save(&self, path: &Path) -> Result<(), BackendError> {
        let doc = self.to_doc();
        let json = serde_json::to_string_pretty(&doc)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Test-oriented builder for boards with pre-placed footprints.
#[derive(Debug, Default)]
pub struct MemoryBoardBuilder {
    board: MemoryBoard,
}

impl MemoryBoardBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prototype(mut self, fpid: &str, prototype: FootprintPrototype) -> Self {
        self.board.register_prototype(fpid, prototype);
        self
    }

    pub fn net(mut self, name: &str) -> Self {
        self.board.nets.insert(name.to_string());
        self
    }

    /// Add a managed footprint at a position, instantiating from the library.
    pub fn footprint(
        mut self,
        view: &FootprintView,
        complement: &FootprintComplement,
    ) -> Result<Self, BackendError> {
        let handle = self.board.add_footprint(view)?;
        self.board.set_placement(handle, complement)?;
        Ok(self)
    }

    pub fn group(mut self, name: &str) -> Result<Self, BackendError> {
        self.board.add_group(name)?;
        Ok(self)
    }

    pub fn build(self) -> MemoryBoard {
        self.board
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcb_lens::types::EntityId;

    fn view(path: &str, fpid: &str) -> FootprintView {
        let id = EntityId::parse(path, fpid);
        FootprintView {
            entity_id: id.clone(),
            reference: path.rsplit('.').next().unwrap().to_string(),
            value: "1k".to_string(),
            fpid: fpid.to_string(),
            ..Default::default()
        }
    }

    fn board_with_one() -> (MemoryBoard, FootprintHandle) {
        let mut board = MemoryBoard::new();
        board.register_prototype("Lib:R", FootprintPrototype::new(&["1", "2"], 1000, 500));
        let handle = board.add_footprint(&view("A", "Lib:R")).unwrap();
        (board, handle)
    }

    #[test]
    fn handles_go_stale_after_structural_mutation() {
        let (mut board, first) = board_with_one();
        // The handle returned by add_footprint carries the new generation.
        assert!(board.footprint(first).is_ok());

        board.add_footprint(&view("B", "Lib:R")).unwrap();
        assert!(matches!(
            board.footprint(first),
            Err(BackendError::StaleHandle)
        ));

        // Re-enumeration heals.
        let fresh = board.footprints();
        assert_eq!(fresh.len(), 2);
        assert!(board.footprint(fresh[0]).is_ok());
    }

    #[test]
    fn non_structural_updates_keep_handles_valid() {
        let (mut board, handle) = board_with_one();
        board.create_net("VCC").unwrap();
        board.assign_pad_net(handle, "1", "VCC").unwrap();
        let record = board.footprint(handle).unwrap();
        assert_eq!(record.pads[0].net_name, "VCC");
    }

    #[test]
    fn delete_net_releases_pads() {
        let (mut board, handle) = board_with_one();
        board.create_net("VCC").unwrap();
        board.assign_pad_net(handle, "1", "VCC").unwrap();
        board.delete_net("VCC").unwrap();
        let record = board.footprint(handle).unwrap();
        assert_eq!(record.pads[0].net_name, "");
    }

    #[test]
    fn delete_group_preserves_members() {
        let (mut board, _) = board_with_one();
        let group = board.add_group("A_GROUP").unwrap();
        let fp = board.footprints()[0];
        board.add_to_group(group, fp).unwrap();
        let group = board.groups()[0];
        board.delete_group(group).unwrap();

        assert_eq!(board.footprints().len(), 1);
        assert!(board.groups().is_empty());
        let fp = board.footprints()[0];
        let record = board.footprint(fp).unwrap();
        assert_eq!(record.path_field, "A");
    }

    #[test]
    fn unresolved_footprint_is_fatal() {
        let mut board = MemoryBoard::new();
        assert!(matches!(
            board.add_footprint(&view("A", "Nope:Missing")),
            Err(BackendError::UnresolvedFootprint(_))
        ));
    }

    #[test]
    fn save_load_roundtrip() {
        let mut board = MemoryBoardBuilder::new()
            .prototype("Lib:R", FootprintPrototype::new(&["1", "2"], 1000, 500))
            .net("VCC")
            .footprint(
                &view("A", "Lib:R"),
                &FootprintComplement {
                    position: Position::new(3, 4),
                    ..Default::default()
                },
            )
            .unwrap()
            .build();
        let handle = board.footprints()[0];
        board.assign_pad_net(handle, "1", "VCC").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        board.save(&path).unwrap();

        let loaded = MemoryBoard::load(&path).unwrap();
        assert_eq!(loaded.net_names(), vec!["VCC".to_string()]);
        let fp = loaded.footprints()[0];
        let record = loaded.footprint(fp).unwrap();
        assert_eq!(record.path_field, "A");
        assert_eq!(record.pads[0].net_name, "VCC");
    }
}
