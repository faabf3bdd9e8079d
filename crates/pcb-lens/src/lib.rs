//! Bidirectional lens core for netlist ⇆ layout synchronization.
//!
//! A layout is decomposed into a source-authoritative *view* (what the
//! netlist says must exist) and a layout-authoritative *complement* (where
//! the user put things, plus routing). Synchronization is the lens round:
//!
//! 1. [`project::get`] derives the view from the source netlist.
//! 2. [`lens::extract`] decomposes the current board into view + complement.
//! 3. [`lens::adapt_complement`] adapts the old complement to the new view,
//!    preserving every surviving entity byte-for-byte.
//! 4. [`changeset::build_changeset`] diffs the complements into the changes
//!    to apply.
//!
//! The apply protocol itself lives in `pcb-sync`; this crate supplies the
//! [`backend::LayoutBackend`] capability contract it runs against, the
//! [`hierplace`] placement engine, [`fragment`] composition, and the
//! deterministic [`oplog`] used as a snapshot oracle in tests.

pub mod backend;
pub mod changeset;
pub mod diagnostics;
pub mod fragment;
pub mod hierplace;
pub mod lens;
pub mod oplog;
pub mod project;
pub mod types;

pub use backend::{
    BackendError, FootprintHandle, FootprintRecord, GroupHandle, GroupRecord, LayoutBackend,
    PadRecord, RoutingItem,
};
pub use changeset::{build_changeset, SyncChangeset};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use fragment::{FragmentData, FragmentLoader, FragmentPlan};
pub use hierplace::{hierplace, pack_at_origin, PlacementRect, Rect};
pub use lens::{adapt_complement, check_invariants, extract};
pub use oplog::{OpEvent, OpKind, OpLog};
pub use project::get;
pub use types::{
    Board, BoardComplement, BoardView, EntityId, EntityPath, FootprintComplement, FootprintView,
    GraphicComplement, GroupComplement, GroupView, Layer, NetView, Position, TrackComplement,
    ViaComplement, ZoneComplement, UUID_NAMESPACE_URL,
};
