/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Mindweave: a collaborative mind-mapping document engine.
//!
//! The crate is organized around [`document::MindMapDocument`], which
//! owns the node graph and funnels every mutation through one intent
//! reducer. Around it:
//!
//! - [`graph`]: the petgraph-backed node/edge structure, traversal,
//!   and collapse-driven visibility.
//! - [`history`]: the linear undo/redo log with full before/after
//!   snapshots and save-point tracking.
//! - [`collab`]: idempotent, order-independent application of remote
//!   collaborator changes.
//! - [`clipboard`]: copy/cut buffers and cursor-anchored paste with
//!   fresh node identities.
//! - [`persistence`]: snapshot plus mutation-journal storage.

pub mod clipboard;
pub mod collab;
pub mod document;
pub mod graph;
pub mod history;
pub mod persistence;

pub use document::{DocumentIntent, MindMapDocument, SelectionUpdateMode};
pub use graph::{EdgeKind, Graph, Node, NodeContent, NodeId};
