//! Changeset application and the reference layout backend.
//!
//! `pcb-lens` computes *what* must change; this crate makes it so:
//!
//! * [`apply::apply_changeset`] drives the ordered apply phases against any
//!   [`pcb_lens::LayoutBackend`], producing the deterministic OpLog.
//! * [`memory::MemoryBoard`] is the reference backend: an in-memory board
//!   with SWIG-style handle invalidation, loadable from and savable to a
//!   JSON board document.
//! * [`fragload::FileFragmentLoader`] resolves `layout_path` references
//!   through package roots and distills fragment boards into lens data.
//! * [`snapshot`] emits the canonical layout snapshot and diagnostics files.
//!
//! [`sync_board`] wires the full round together: project the netlist,
//! extract the board, adapt the complement, diff, and apply.

pub mod apply;
pub mod fragload;
pub mod memory;
pub mod snapshot;

pub use apply::{apply_changeset, ApplyError, NoFragmentLoader};
pub use fragload::{extract_fragment, resolve_layout_path, FileFragmentLoader};
pub use memory::{FootprintPrototype, MemoryBoard, MemoryBoardBuilder};
pub use snapshot::{layout_snapshot, write_diagnostics, write_snapshot};

use std::collections::HashMap;

use pcb_lens::changeset::{build_changeset, SyncChangeset};
use pcb_lens::diagnostics::Diagnostics;
use pcb_lens::fragment::FragmentLoader;
use pcb_lens::lens::{adapt_complement, extract};
use pcb_lens::oplog::OpLog;
use pcb_lens::LayoutBackend;
use pcb_netlist::ResolvedNetlist;

/// Result of one full sync pass.
#[derive(Debug)]
pub struct SyncReport {
    pub changeset: SyncChangeset,
    pub oplog: OpLog,
}

/// Run the complete lens round against a backend.
///
/// Diagnostics accumulate across every stage and are delivered together; the
/// board itself is only saved by the caller after a successful apply.
pub fn sync_board(
    netlist: &ResolvedNetlist,
    backend: &mut dyn LayoutBackend,
    loader: &dyn FragmentLoader,
    diagnostics: &mut Diagnostics,
) -> Result<SyncReport, ApplyError> {
    let view = pcb_lens::project::get(netlist);
    let board = extract(&*backend, &HashMap::new(), diagnostics)?;
    let new_complement = adapt_complement(&view, &board.complement, diagnostics);
    let changeset = build_changeset(&view, &new_complement, &board.complement);
    changeset.to_diagnostics(diagnostics);

    let oplog = apply_changeset(&changeset, backend, loader, diagnostics)?;
    oplog.log_all();

    Ok(SyncReport { changeset, oplog })
}
