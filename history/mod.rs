/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Linear undo/redo history for document mutations.
//!
//! Every recorded action carries a full restorable snapshot of the
//! document content before and after the mutation. Node payloads are
//! heterogeneous across node types, which rules out field-level diffs:
//! a partial entry that cannot restore prior state is worse than the
//! memory cost of the snapshot. Redo replays the stored after-state
//! rather than re-running the action's effect, so undo and redo are
//! exact inverses by construction.

use euclid::default::Point2D;

use crate::graph::{Customization, EdgeKind, Graph, NodeId, Stroke};

/// Oldest entries are trimmed beyond this cap.
pub const MAX_HISTORY_ENTRIES: usize = 128;

/// What kind of mutation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    AddNode,
    MoveNode,
    ConnectNodes,
    DisconnectNodes,
    DeleteNode,
    UpdateNode,
    UpdateTitle,
    ResizeNode,
    ChangeEdgeKind,
    ChangeBackgroundColor,
    ChangeDotColor,
    DrawingChange,
    MoveStroke,
}

/// What changed, for display and grouping. Restoration never reads this;
/// it goes through the full before/after snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPayload {
    Node {
        node_id: NodeId,
    },
    /// Final positions. A multi-select drag carries every moved node so
    /// the whole set restores atomically.
    Move {
        moves: Vec<(NodeId, Point2D<f32>)>,
    },
    Edge {
        edge_id: String,
    },
    /// Deleted node plus every descendant removed in the same cascade.
    Delete {
        affected_nodes: Vec<NodeId>,
    },
    /// Nodes inserted by one paste, restored or re-removed atomically.
    Paste {
        affected_nodes: Vec<NodeId>,
    },
    Resize {
        node_id: NodeId,
        width: f32,
        height: f32,
    },
    Title {
        title: String,
    },
    EdgeKind {
        kind: EdgeKind,
    },
    Color {
        color: Option<String>,
    },
    Drawing,
    StrokeMove {
        stroke_id: String,
    },
}

/// Full restorable snapshot of document content.
#[derive(Clone)]
pub struct DocumentState {
    pub graph: Graph,
    pub title: String,
    pub customization: Customization,
    pub strokes: Vec<Stroke>,
}

impl DocumentState {
    pub fn empty() -> Self {
        Self {
            graph: Graph::new(),
            title: String::new(),
            customization: Customization::default(),
            strokes: Vec::new(),
        }
    }
}

/// One recorded mutation. `before` is required at the type level; an
/// entry that cannot restore prior state cannot be constructed.
#[derive(Clone)]
pub struct HistoryAction {
    pub kind: ActionKind,
    pub payload: ActionPayload,
    pub before: DocumentState,
    pub after: DocumentState,
}

/// A presentation-side run of consecutive same-kind actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionGroup {
    pub kind: ActionKind,
    pub start: usize,
    pub len: usize,
}

/// Whether two adjacent entries belong to the same display group.
pub fn should_group(a: &HistoryAction, b: &HistoryAction) -> bool {
    a.kind == b.kind
}

/// Coalesce consecutive same-kind actions into groups. Pure read-side
/// transform; deriving groups from the same slice always yields the same
/// boundaries, and a run of one degrades to a single-entry group.
pub fn group_actions(actions: &[HistoryAction]) -> Vec<ActionGroup> {
    let mut groups: Vec<ActionGroup> = Vec::new();
    for (index, action) in actions.iter().enumerate() {
        match groups.last_mut() {
            Some(group)
                if group.kind == action.kind && group.start + group.len == index =>
            {
                group.len += 1;
            }
            _ => groups.push(ActionGroup {
                kind: action.kind,
                start: index,
                len: 1,
            }),
        }
    }
    groups
}

/// Ordered action log with a current cursor and a last-saved cursor.
///
/// Cursors are `None` when positioned before the first entry, so a fresh
/// or just-loaded document has both at "no history".
pub struct HistoryEngine {
    entries: Vec<HistoryAction>,
    current: Option<usize>,
    last_saved: Option<usize>,
}

fn cursor_value(cursor: Option<usize>) -> isize {
    cursor.map_or(-1, |i| i as isize)
}

impl HistoryEngine {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            current: None,
            last_saved: None,
        }
    }

    /// Append an entry, discarding any redo branch beyond the cursor.
    pub fn record(&mut self, action: HistoryAction) {
        let keep = self.current.map_or(0, |i| i + 1);
        self.entries.truncate(keep);
        // A save point inside the discarded branch no longer exists.
        if let Some(saved) = self.last_saved
            && saved >= keep
        {
            self.last_saved = None;
        }

        self.entries.push(action);
        self.current = Some(self.entries.len() - 1);

        if self.entries.len() > MAX_HISTORY_ENTRIES {
            let drop = self.entries.len() - MAX_HISTORY_ENTRIES;
            self.entries.drain(..drop);
            self.current = self.current.and_then(|i| i.checked_sub(drop));
            self.last_saved = self.last_saved.and_then(|i| i.checked_sub(drop));
        }
    }

    /// Undo stops at the last save point.
    pub fn can_undo(&self) -> bool {
        cursor_value(self.current) > cursor_value(self.last_saved)
    }

    pub fn can_redo(&self) -> bool {
        match self.current {
            None => !self.entries.is_empty(),
            Some(i) => i + 1 < self.entries.len(),
        }
    }

    /// Step the cursor back and return the state to restore.
    pub fn undo(&mut self) -> Option<DocumentState> {
        if !self.can_undo() {
            return None;
        }
        let index = self.current?;
        let state = self.entries[index].before.clone();
        self.current = index.checked_sub(1);
        Some(state)
    }

    /// Step the cursor forward and return the state to restore.
    pub fn redo(&mut self) -> Option<DocumentState> {
        if !self.can_redo() {
            return None;
        }
        let next = self.current.map_or(0, |i| i + 1);
        self.current = Some(next);
        Some(self.entries[next].after.clone())
    }

    /// Record that the document was persisted at the current position.
    pub fn mark_saved(&mut self) {
        self.last_saved = self.current;
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.current != self.last_saved
    }

    /// Drop the whole log and both cursors. Called on snapshot load, so
    /// the act of loading never appears as an undoable mutation.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.current = None;
        self.last_saved = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn last_saved_index(&self) -> Option<usize> {
        self.last_saved
    }

    pub fn entries(&self) -> &[HistoryAction] {
        &self.entries
    }

    /// Display groups over the full log.
    pub fn grouped(&self) -> Vec<ActionGroup> {
        group_actions(&self.entries)
    }
}

impl Default for HistoryEngine {
    fn default() -> Self {
        Self::new()
    }
}
