//! Layout backend capability contract.
//!
//! The board store is modeled as an opaque handle-set: handles obtained from
//! enumeration are valid only until the next structural mutation (add or
//! delete of a footprint or group). Callers must re-enumerate after every
//! structural mutation and rebuild any `path -> handle` index they keep;
//! backends are expected to fail stale accesses with
//! [`BackendError::StaleHandle`] rather than misbehave.
//!
//! Binding this contract to a concrete PCB toolkit is outside the core's
//! scope; `pcb-sync` ships an in-memory reference implementation.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

use crate::hierplace::Rect;
use crate::types::{
    FootprintComplement, FootprintView, GraphicComplement, Layer, Position, TrackComplement,
    ViaComplement, ZoneComplement,
};

/// Error type for backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("stale backend handle: the board was structurally mutated since enumeration")]
    StaleHandle,

    #[error("unknown net: '{0}'")]
    UnknownNet(String),

    #[error("net already exists: '{0}'")]
    DuplicateNet(String),

    #[error("footprint library has no entry for '{0}'")]
    UnresolvedFootprint(String),

    #[error("unknown pad '{pad}' on footprint {path}")]
    UnknownPad { path: String, pad: String },

    #[error("group already exists: '{0}'")]
    DuplicateGroup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("board document error: {0}")]
    Document(#[from] serde_json::Error),
}

/// Opaque token for a stored footprint. Valid until the next structural
/// mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FootprintHandle(u64);

impl FootprintHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Opaque token for a stored group. Valid until the next structural mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupHandle(u64);

impl GroupHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// One pad of a stored footprint: its name and bound net ("" for no net).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PadRecord {
    pub name: String,
    pub net_name: String,
}

/// Everything the sync core reads from a stored footprint in one call.
#[derive(Debug, Clone, PartialEq)]
pub struct FootprintRecord {
    /// Stored "Path" property ("" when absent).
    pub path_field: String,
    /// The backend's stable-id path (`/<uuid>/<uuid>` for managed parts).
    pub kiid_path: String,
    pub fpid: String,
    pub reference: String,
    pub value: String,
    pub dnp: bool,
    pub exclude_from_bom: bool,
    pub exclude_from_pos: bool,
    /// All stored fields except Reference/Value/Footprint.
    pub fields: BTreeMap<String, String>,
    pub position: Position,
    pub orientation: f64,
    pub layer: Layer,
    pub locked: bool,
    pub reference_position: Option<Position>,
    pub reference_visible: bool,
    pub value_position: Option<Position>,
    pub value_visible: bool,
    pub pads: Vec<PadRecord>,
}

/// A routing or graphic item inside a group.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RoutingItem {
    Track(TrackComplement),
    Via(ViaComplement),
    Zone(ZoneComplement),
    Graphic(GraphicComplement),
}

impl RoutingItem {
    /// Net name carried by the item ("" for graphics and no-net items).
    pub fn net_name(&self) -> &str {
        match self {
            RoutingItem::Track(t) => &t.net_name,
            RoutingItem::Via(v) => &v.net_name,
            RoutingItem::Zone(z) => &z.net_name,
            RoutingItem::Graphic(_) => "",
        }
    }
}

/// Everything the sync core reads from a stored group in one call.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRecord {
    pub name: String,
    /// Stored "Path" property values of member footprints.
    pub member_paths: Vec<String>,
    pub items: Vec<RoutingItem>,
}

/// Capability contract for the concrete layout store.
///
/// Reads take `&self`; in-place (non-structural) updates and structural
/// mutations take `&mut self`. Only structural mutations invalidate handles.
pub trait LayoutBackend {
    // Enumeration (returns fresh handles) ------------------------------------

    fn footprints(&self) -> Vec<FootprintHandle>;
    fn groups(&self) -> Vec<GroupHandle>;

    // Reads ------------------------------------------------------------------

    fn footprint(&self, handle: FootprintHandle) -> Result<FootprintRecord, BackendError>;
    fn group(&self, handle: GroupHandle) -> Result<GroupRecord, BackendError>;
    fn net_names(&self) -> Vec<String>;
    /// Bounding box of a footprint's copper/silkscreen content.
    fn footprint_bbox(&self, handle: FootprintHandle) -> Result<Rect, BackendError>;
    /// Bounding box of a group's contents, or `None` for an empty group.
    fn group_bbox(&self, handle: GroupHandle) -> Result<Option<Rect>, BackendError>;

    // Nets -------------------------------------------------------------------

    fn create_net(&mut self, name: &str) -> Result<(), BackendError>;
    /// Delete a net by name. Pads bound to it are released to no-net.
    fn delete_net(&mut self, name: &str) -> Result<(), BackendError>;

    // Structural mutations (invalidate all handles) --------------------------

    fn delete_footprint(&mut self, handle: FootprintHandle) -> Result<(), BackendError>;
    /// Delete a group container only; its contents stay on the board.
    fn delete_group(&mut self, handle: GroupHandle) -> Result<(), BackendError>;
    /// Instantiate a fresh footprint from the library for `view.fpid`, apply
    /// the view's fields and flags, and attach the canonical Path/KIID.
    fn add_footprint(&mut self, view: &FootprintView) -> Result<FootprintHandle, BackendError>;
    fn add_group(&mut self, name: &str) -> Result<GroupHandle, BackendError>;

    // In-place updates (non-structural) --------------------------------------

    /// Update reference/value/fields/DNP flags in place. Never touches
    /// position.
    fn update_footprint_view(
        &mut self,
        handle: FootprintHandle,
        view: &FootprintView,
    ) -> Result<(), BackendError>;
    fn assign_pad_net(
        &mut self,
        handle: FootprintHandle,
        pad: &str,
        net_name: &str,
    ) -> Result<(), BackendError>;
    fn add_to_group(
        &mut self,
        group: GroupHandle,
        footprint: FootprintHandle,
    ) -> Result<(), BackendError>;
    fn remove_from_group(
        &mut self,
        group: GroupHandle,
        footprint: FootprintHandle,
    ) -> Result<(), BackendError>;
    /// Duplicate a routing/graphic item into a group; the item's net name is
    /// already remapped to a destination net (or "" for no-net).
    fn add_routing(&mut self, group: GroupHandle, item: &RoutingItem) -> Result<(), BackendError>;
    /// Write the user-authored placement (position, orientation, layer, lock,
    /// text positions).
    fn set_placement(
        &mut self,
        handle: FootprintHandle,
        complement: &FootprintComplement,
    ) -> Result<(), BackendError>;
    /// Move a group and everything in it by `delta`.
    fn translate_group(&mut self, group: GroupHandle, delta: Position) -> Result<(), BackendError>;

    // Lifecycle --------------------------------------------------------------

    fn rebuild_connectivity(&mut self);
    fn save(&self, path: &Path) -> Result<(), BackendError>;
}
