//! Core data types for the lens-based layout synchronization system.
//!
//! The layout is decomposed into a *view* (what the source netlist says must
//! exist) and a *complement* (where the user put things, plus routing). Both
//! halves are plain immutable records keyed by [`EntityId`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// UUID namespace used for all derived entity UUIDs.
/// This matches Python: uuid.NAMESPACE_URL
pub const UUID_NAMESPACE_URL: Uuid = Uuid::from_u128(0x6ba7b811_9dad_11d1_80b4_00c04fd430c8);

/// Hierarchical path identifying an entity. Immutable and hashable.
///
/// The empty path is a sentinel meaning "no path" and is treated as falsy via
/// [`EntityPath::is_empty`].
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(into = "String", from = "String")]
pub struct EntityPath {
    segments: Vec<String>,
}

impl EntityPath {
    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    /// Parse a dot-joined path string. The empty string yields the empty
    /// sentinel path.
    pub fn parse(path: &str) -> Self {
        if path.is_empty() {
            return Self::default();
        }
        Self {
            segments: path.split('.').map(str::to_string).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, or `""` for the empty path.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    pub fn parent(&self) -> Option<EntityPath> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(EntityPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Strict ancestor test: a path is not its own ancestor.
    pub fn is_ancestor_of(&self, other: &EntityPath) -> bool {
        other.segments.len() > self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// Path of `self` relative to `ancestor`, or `None` when `ancestor` is
    /// neither an ancestor nor equal.
    pub fn relative_to(&self, ancestor: &EntityPath) -> Option<EntityPath> {
        if !ancestor.is_ancestor_of(self) && ancestor != self {
            return None;
        }
        Some(EntityPath {
            segments: self.segments[ancestor.segments.len()..].to_vec(),
        })
    }
}

impl fmt::Display for EntityPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<EntityPath> for String {
    fn from(path: EntityPath) -> Self {
        path.to_string()
    }
}

impl From<String> for EntityPath {
    fn from(path: String) -> Self {
        EntityPath::parse(&path)
    }
}

impl From<&str> for EntityPath {
    fn from(path: &str) -> Self {
        EntityPath::parse(path)
    }
}

/// Unique identifier for an entity, derived from path and fpid.
///
/// For footprints, identity includes the FPID: changing FPID means the old
/// entity is removed and a new one is added. Groups use an empty fpid.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EntityId {
    pub path: EntityPath,
    pub fpid: String,
}

impl EntityId {
    pub fn new(path: EntityPath, fpid: impl Into<String>) -> Self {
        Self {
            path,
            fpid: fpid.into(),
        }
    }

    /// Identifier for a group (empty fpid).
    pub fn group(path: EntityPath) -> Self {
        Self {
            path,
            fpid: String::new(),
        }
    }

    pub fn parse(path: &str, fpid: &str) -> Self {
        Self::new(EntityPath::parse(path), fpid)
    }

    /// Stable UUID derived from `(path, fpid)`.
    pub fn uuid(&self) -> Uuid {
        let key = format!("{}\0{}", self.path, self.fpid);
        Uuid::new_v5(&UUID_NAMESPACE_URL, key.as_bytes())
    }

    /// UUID for KIID-path matching (path only, no fpid).
    ///
    /// This is the UUID used in the backend's stable-id path, which is
    /// computed only from the hierarchical path.
    pub fn kiid_uuid(&self) -> Uuid {
        kiid_uuid_for(&self.path.to_string())
    }

    /// The `/<u>/<u>` stable-id path a managed footprint must carry.
    pub fn kiid_path(&self) -> String {
        kiid_path_for(&self.path.to_string())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// Path-only UUID for a raw path string.
pub fn kiid_uuid_for(path: &str) -> Uuid {
    Uuid::new_v5(&UUID_NAMESPACE_URL, path.as_bytes())
}

/// Expected stable-id path for a raw path string.
pub fn kiid_path_for(path: &str) -> String {
    let u = kiid_uuid_for(path);
    format!("/{u}/{u}")
}

/// 2D position in board internal units (nanometers).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn offset_by(self, dx: i64, dy: i64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl std::ops::Add for Position {
    type Output = Position;
    fn add(self, other: Position) -> Position {
        Position {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl std::ops::Sub for Position {
    type Output = Position;
    fn sub(self, other: Position) -> Position {
        Position {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

/// Copper side of a footprint. Routing items carry free-form layer names;
/// footprints are constrained to the front/back copper pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layer {
    #[default]
    #[serde(rename = "F.Cu")]
    FrontCu,
    #[serde(rename = "B.Cu")]
    BackCu,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::FrontCu => "F.Cu",
            Layer::BackCu => "B.Cu",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Layer {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "F.Cu" => Ok(Layer::FrontCu),
            "B.Cu" => Ok(Layer::BackCu),
            _ => Err(format!("unknown copper layer: '{s}'")),
        }
    }
}

/// View portion of a footprint - derived from the SOURCE netlist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootprintView {
    pub entity_id: EntityId,
    pub reference: String,
    pub value: String,
    pub fpid: String,
    pub dnp: bool,
    pub exclude_from_bom: bool,
    pub exclude_from_pos: bool,
    pub fields: BTreeMap<String, String>,
}

impl FootprintView {
    pub fn path(&self) -> &EntityPath {
        &self.entity_id.path
    }
}

/// Complement portion of a footprint - user-authored placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootprintComplement {
    pub position: Position,
    pub orientation: f64,
    pub layer: Layer,
    pub locked: bool,
    pub reference_position: Option<Position>,
    pub reference_visible: bool,
    pub value_position: Option<Position>,
    pub value_visible: bool,
}

impl FootprintComplement {
    pub fn with_position(&self, position: Position) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }

    /// Shift the placement (and any text positions) by `delta`.
    pub fn translated(&self, delta: Position) -> Self {
        Self {
            position: self.position + delta,
            reference_position: self.reference_position.map(|p| p + delta),
            value_position: self.value_position.map(|p| p + delta),
            ..self.clone()
        }
    }

    pub fn with_locked(&self, locked: bool) -> Self {
        Self {
            locked,
            ..self.clone()
        }
    }
}

/// Default placement for a new footprint: origin, unrotated, front copper.
impl Default for FootprintComplement {
    fn default() -> Self {
        Self {
            position: Position::default(),
            orientation: 0.0,
            layer: Layer::FrontCu,
            locked: false,
            reference_position: None,
            reference_visible: true,
            value_position: None,
            value_visible: false,
        }
    }
}

/// View portion of a group - derived from the SOURCE netlist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupView {
    pub entity_id: EntityId,
    /// All footprint descendants of the group's path (not just direct
    /// children).
    pub member_ids: Vec<EntityId>,
    pub layout_path: Option<String>,
}

impl GroupView {
    pub fn path(&self) -> &EntityPath {
        &self.entity_id.path
    }
}

/// Complement for a track segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackComplement {
    pub uuid: String,
    pub start: Position,
    pub end: Position,
    pub width: i64,
    pub layer: String,
    pub net_name: String,
}

/// Complement for a via.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViaComplement {
    pub uuid: String,
    pub position: Position,
    pub diameter: i64,
    pub drill: i64,
    pub via_type: String,
    pub net_name: String,
}

/// Complement for a copper zone. The outline is the first contour of the
/// zone's polygon set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneComplement {
    pub uuid: String,
    pub name: String,
    pub outline: Vec<Position>,
    pub layer: String,
    pub priority: i64,
    pub net_name: String,
}

/// Complement for a graphic element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicComplement {
    pub uuid: String,
    pub graphic_type: String,
    pub layer: String,
    #[serde(default)]
    pub geometry: serde_json::Value,
}

/// Complement for a group - routing and graphics within the group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupComplement {
    pub tracks: Vec<TrackComplement>,
    pub vias: Vec<ViaComplement>,
    pub zones: Vec<ZoneComplement>,
    pub graphics: Vec<GraphicComplement>,
}

impl GroupComplement {
    /// Shift all routing geometry by `delta`.
    pub fn translated(&self, delta: Position) -> Self {
        let mut out = self.clone();
        for track in &mut out.tracks {
            track.start = track.start + delta;
            track.end = track.end + delta;
        }
        for via in &mut out.vias {
            via.position = via.position + delta;
        }
        for zone in &mut out.zones {
            for point in &mut zone.outline {
                *point = *point + delta;
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
            && self.vias.is_empty()
            && self.zones.is_empty()
            && self.graphics.is_empty()
    }
}

/// View portion of a net - derived from the SOURCE netlist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetView {
    pub name: String,
    /// `(footprint id, pad name)` connections, duplicate-free, in source
    /// order.
    pub connections: Vec<(EntityId, String)>,
    /// Net kind (e.g. "Net", "Power", "Ground", "NotConnected").
    pub kind: String,
    /// Sorted `(component_ref, pin_name)` pairs, independent of pad fanout.
    pub logical_ports: Vec<(String, String)>,
}

impl NetView {
    pub fn has_connection_to(&self, entity_id: &EntityId) -> bool {
        self.connections.iter().any(|(fp_id, _)| fp_id == entity_id)
    }
}

/// Complete View derived from the SOURCE netlist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardView {
    pub footprints: BTreeMap<EntityId, FootprintView>,
    pub groups: BTreeMap<EntityId, GroupView>,
    pub nets: BTreeMap<String, NetView>,
    /// Pads that belong to NotConnected-kind nets; their "no connect"
    /// behaviour is expressed at apply time via pad pin type.
    pub not_connected_pads: BTreeSet<(EntityId, String)>,
}

/// Complete Complement - all user-authored data from the destination board.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardComplement {
    pub footprints: BTreeMap<EntityId, FootprintComplement>,
    pub groups: BTreeMap<EntityId, GroupComplement>,
}

impl BoardComplement {
    pub fn footprint(&self, entity_id: &EntityId) -> Option<&FootprintComplement> {
        self.footprints.get(entity_id)
    }

    pub fn group(&self, entity_id: &EntityId) -> Option<&GroupComplement> {
        self.groups.get(entity_id)
    }
}

/// A board is the pair of its view and its complement.
#[derive(Debug, Clone, Default)]
pub struct Board {
    pub view: BoardView,
    pub complement: BoardComplement,
}
