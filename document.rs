/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Document state and the intent reducer.
//!
//! `MindMapDocument` owns the graph, canvas state, selection, history,
//! clipboard, and the optional persistence and collaboration handles.
//! Every mutation funnels through `apply_intent`, which is the single
//! place that records history, journals mutations, and keeps selection
//! consistent with the graph.

use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, Sender, unbounded};
use euclid::default::{Point2D, Vector2D};
use uuid::Uuid;

use crate::clipboard::{ClipboardBuffer, Viewport, create_paste_fragment};
use crate::collab::{ChangeAction, ChangeEntity, CollabSession, RemoteChange, apply_remote_change};
use crate::graph::{
    Customization, EdgeKind, Graph, Node, NodeContent, NodeId, NodeStyle, Stroke, persist_edge,
    persist_edge_kind, persist_node, restore_edge_kind,
};
use crate::history::{
    ActionKind, ActionPayload, DocumentState, HistoryAction, HistoryEngine,
};
use crate::persistence::DocumentStore;
use crate::persistence::types::{
    DocumentSnapshot, LogEntry, PersistedStroke, PersistedStrokePoint,
};

/// Minimum pointer travel, in canvas pixels, before a drag or resize
/// gesture produces a history entry. Sub-pixel jitter from a click is
/// not an undoable move.
pub const GESTURE_HISTORY_THRESHOLD: f32 = 1.0;

/// How an `UpdateSelection` intent combines with the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionUpdateMode {
    Replace,
    Add,
    Toggle,
}

/// Selected nodes, in selection order, with a primary node.
///
/// `revision` increments on every observable change so views can cheaply
/// detect staleness without diffing the set.
#[derive(Debug, Default, Clone)]
pub struct SelectionState {
    nodes: HashSet<NodeId>,
    order: Vec<NodeId>,
    primary: Option<NodeId>,
    revision: u64,
}

impl SelectionState {
    /// Click-selection. Plain click replaces the selection; a
    /// multi-select click toggles membership.
    pub fn select(&mut self, id: NodeId, multi_select: bool) {
        if multi_select {
            if self.nodes.contains(&id) {
                self.nodes.remove(&id);
                self.order.retain(|n| *n != id);
                self.primary = self.order.last().copied();
            } else {
                self.nodes.insert(id);
                self.order.push(id);
                self.primary = Some(id);
            }
        } else {
            self.nodes.clear();
            self.order.clear();
            self.nodes.insert(id);
            self.order.push(id);
            self.primary = Some(id);
        }
        self.revision += 1;
    }

    pub fn clear(&mut self) {
        if self.nodes.is_empty() {
            return;
        }
        self.nodes.clear();
        self.order.clear();
        self.primary = None;
        self.revision += 1;
    }

    /// Bulk update, e.g. from a rubber-band select.
    pub fn update_many(&mut self, ids: Vec<NodeId>, mode: SelectionUpdateMode) {
        match mode {
            SelectionUpdateMode::Replace => {
                self.nodes.clear();
                self.order.clear();
                for id in ids {
                    if self.nodes.insert(id) {
                        self.order.push(id);
                    }
                }
            },
            SelectionUpdateMode::Add => {
                for id in ids {
                    if self.nodes.insert(id) {
                        self.order.push(id);
                    }
                }
            },
            SelectionUpdateMode::Toggle => {
                for id in ids {
                    if self.nodes.remove(&id) {
                        self.order.retain(|n| *n != id);
                    } else {
                        self.nodes.insert(id);
                        self.order.push(id);
                    }
                }
            },
        }
        self.primary = self.order.last().copied();
        self.revision += 1;
    }

    pub fn primary(&self) -> Option<NodeId> {
        self.primary
    }

    pub fn ordered(&self) -> &[NodeId] {
        &self.order
    }

    /// First two selected nodes in selection order, for pair operations
    /// like connecting.
    pub fn ordered_pair(&self) -> Option<(NodeId, NodeId)> {
        if self.order.len() < 2 {
            return None;
        }
        Some((self.order[0], self.order[1]))
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Drop selected nodes that no longer exist in the graph.
    pub fn retain_present(&mut self, graph: &Graph) {
        let before = self.order.len();
        self.order.retain(|id| graph.contains_node(*id));
        if self.order.len() == before {
            return;
        }
        self.nodes.retain(|id| graph.contains_node(*id));
        if let Some(primary) = self.primary
            && !self.nodes.contains(&primary)
        {
            self.primary = self.order.last().copied();
        }
        self.revision += 1;
    }
}

impl Deref for SelectionState {
    type Target = HashSet<NodeId>;

    fn deref(&self) -> &Self::Target {
        &self.nodes
    }
}

/// A mode the UI is waiting to complete, dismissable with Escape or a
/// click elsewhere. Cancelling leaves no trace in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingMode {
    /// Next canvas click pastes the clipboard there.
    Paste,
    /// Next node click adds that node's track to the playlist.
    AddToPlaylist { playlist_node: NodeId },
}

/// Renderer-measured node dimensions, delivered over a channel so the
/// layout pass never re-enters the reducer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionEvent {
    pub node_id: NodeId,
    pub width: f32,
    pub height: f32,
    /// User-driven resizes are undoable; renderer auto-measurements are
    /// not.
    pub user_initiated: bool,
}

/// In-flight drag. The start snapshot is captured when the gesture
/// begins and becomes the history `before` state when it ends.
struct DragGesture {
    node_ids: Vec<NodeId>,
    with_children: bool,
    start: DocumentState,
    start_positions: HashMap<NodeId, Point2D<f32>>,
    /// Set when a remote delete removes a dragged node mid-gesture; the
    /// gesture then ends without recording history.
    cancelled: bool,
}

struct ResizeGesture {
    node_id: NodeId,
    start: DocumentState,
    start_width: f32,
    start_height: f32,
    cancelled: bool,
}

/// All mutations and interactions the document accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentIntent {
    SetTitle { title: String },
    CreateNode { content: NodeContent, position: Point2D<f32> },
    UpdateNodeContent { node_id: NodeId, content: NodeContent },
    UpdateNodeStyle { node_id: NodeId, style: NodeStyle },
    AddTrackToPlaylist { playlist_node: NodeId, track_id: String },
    DeleteNode { node_id: NodeId },
    DeleteSelected,
    ConnectNodes { source: NodeId, target: NodeId },
    ConnectSelectedPair,
    DisconnectNodes { source: NodeId, target: NodeId },
    SetEdgeKind { edge_id: String, kind: EdgeKind },
    SetDefaultEdgeKind { kind: EdgeKind },
    SetBackgroundColor { color: Option<String> },
    SetDotColor { color: Option<String> },
    SetFont { font: Option<String> },
    SelectNode { node_id: NodeId, multi_select: bool },
    UpdateSelection { node_ids: Vec<NodeId>, mode: SelectionUpdateMode },
    SelectAll,
    ClearSelection,
    ToggleCollapsed { node_id: NodeId },
    BeginDrag { node_ids: Vec<NodeId>, with_children: bool },
    DragMove { node_id: NodeId, position: Point2D<f32> },
    EndDrag,
    CancelDrag,
    BeginResize { node_id: NodeId },
    ResizeMove { node_id: NodeId, width: f32, height: f32 },
    EndResize,
    SetStrokes { strokes: Vec<Stroke> },
    MoveStroke { stroke_id: String, delta: Vector2D<f32> },
    Copy,
    Cut,
    Paste { cursor_screen: Point2D<f32> },
    SetPendingMode { mode: PendingMode },
    CancelPendingMode,
    Undo,
    Redo,
    Save,
}

/// The mind-map document: graph content, canvas state, and the
/// machinery around it.
pub struct MindMapDocument {
    pub graph: Graph,
    pub title: String,
    pub customization: Customization,
    pub strokes: Vec<Stroke>,
    /// Collapsed nodes; their descendants are hidden. View state, not
    /// part of undo history.
    pub collapsed: HashSet<NodeId>,
    /// The root node cannot be deleted.
    pub root_node_id: Option<NodeId>,
    pub selection: SelectionState,
    pub viewport: Viewport,

    history: HistoryEngine,
    clipboard: ClipboardBuffer,
    drag: Option<DragGesture>,
    resize: Option<ResizeGesture>,
    pending_mode: Option<PendingMode>,
    store: Option<DocumentStore>,
    collab: Option<CollabSession>,
    dimension_tx: Sender<DimensionEvent>,
    dimension_rx: Receiver<DimensionEvent>,
}

impl MindMapDocument {
    pub fn new() -> Self {
        let (dimension_tx, dimension_rx) = unbounded();
        Self {
            graph: Graph::new(),
            title: String::new(),
            customization: Customization::default(),
            strokes: Vec::new(),
            collapsed: HashSet::new(),
            root_node_id: None,
            selection: SelectionState::default(),
            viewport: Viewport::new(),
            history: HistoryEngine::new(),
            clipboard: ClipboardBuffer::default(),
            drag: None,
            resize: None,
            pending_mode: None,
            store: None,
            collab: None,
            dimension_tx,
            dimension_rx,
        }
    }

    /// Open a document backed by a store, recovering persisted state.
    /// Recovery never creates history entries.
    pub fn with_store(store: DocumentStore) -> Self {
        let mut doc = Self::new();
        if let Some(snapshot) = store.recover() {
            doc.apply_snapshot(&snapshot);
        }
        doc.store = Some(store);
        doc
    }

    pub fn attach_collab(&mut self, session: CollabSession) {
        self.collab = Some(session);
    }

    /// End the collaboration session; queued undelivered changes are
    /// dropped with it.
    pub fn detach_collab(&mut self) {
        self.collab = None;
    }

    /// Sender half for injecting remote changes, mostly useful in tests
    /// and in the transport glue.
    pub fn collab_sender(&self) -> Option<Sender<RemoteChange>> {
        self.collab.as_ref().map(|s| s.sender())
    }

    /// Sender half for renderer dimension reports.
    pub fn dimension_sender(&self) -> Sender<DimensionEvent> {
        self.dimension_tx.clone()
    }

    // --- Accessors ---

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.history.has_unsaved_changes()
    }

    pub fn history(&self) -> &HistoryEngine {
        &self.history
    }

    pub fn clipboard(&self) -> &ClipboardBuffer {
        &self.clipboard
    }

    pub fn pending_mode(&self) -> Option<PendingMode> {
        self.pending_mode
    }

    pub fn drag_active(&self) -> bool {
        self.drag.is_some()
    }

    pub fn resize_active(&self) -> bool {
        self.resize.is_some()
    }

    /// Nodes hidden by the current collapse set.
    pub fn hidden_nodes(&self) -> HashSet<NodeId> {
        self.graph.hidden_nodes(&self.collapsed)
    }

    // --- Intent dispatch ---

    pub fn apply_intents<I: IntoIterator<Item = DocumentIntent>>(&mut self, intents: I) {
        for intent in intents {
            self.apply_intent(intent);
        }
        self.maybe_snapshot();
    }

    pub fn apply_intent(&mut self, intent: DocumentIntent) {
        match intent {
            DocumentIntent::SetTitle { title } => self.set_title(title),
            DocumentIntent::CreateNode { content, position } => {
                self.create_node(content, position);
            },
            DocumentIntent::UpdateNodeContent { node_id, content } => {
                self.update_node_content(node_id, content);
            },
            DocumentIntent::UpdateNodeStyle { node_id, style } => {
                self.update_node_style(node_id, style);
            },
            DocumentIntent::AddTrackToPlaylist { playlist_node, track_id } => {
                self.add_track_to_playlist(playlist_node, track_id);
            },
            DocumentIntent::DeleteNode { node_id } => {
                self.delete_nodes(&[node_id]);
            },
            DocumentIntent::DeleteSelected => {
                let ids: Vec<NodeId> = self.selection.ordered().to_vec();
                self.delete_nodes(&ids);
            },
            DocumentIntent::ConnectNodes { source, target } => {
                self.connect_nodes(source, target);
            },
            DocumentIntent::ConnectSelectedPair => {
                if let Some((source, target)) = self.selection.ordered_pair() {
                    self.connect_nodes(source, target);
                }
            },
            DocumentIntent::DisconnectNodes { source, target } => {
                self.disconnect_nodes(source, target);
            },
            DocumentIntent::SetEdgeKind { edge_id, kind } => {
                self.set_edge_kind(edge_id, kind);
            },
            DocumentIntent::SetDefaultEdgeKind { kind } => {
                self.set_default_edge_kind(kind);
            },
            DocumentIntent::SetBackgroundColor { color } => {
                self.set_background_color(color);
            },
            DocumentIntent::SetDotColor { color } => self.set_dot_color(color),
            DocumentIntent::SetFont { font } => self.set_font(font),
            DocumentIntent::SelectNode { node_id, multi_select } => {
                if self.graph.contains_node(node_id) {
                    self.selection.select(node_id, multi_select);
                }
            },
            DocumentIntent::UpdateSelection { node_ids, mode } => {
                let present: Vec<NodeId> = node_ids
                    .into_iter()
                    .filter(|id| self.graph.contains_node(*id))
                    .collect();
                self.selection.update_many(present, mode);
            },
            DocumentIntent::SelectAll => {
                let all: Vec<NodeId> = self.graph.node_ids().collect();
                self.selection.update_many(all, SelectionUpdateMode::Replace);
            },
            DocumentIntent::ClearSelection => self.selection.clear(),
            DocumentIntent::ToggleCollapsed { node_id } => self.toggle_collapsed(node_id),
            DocumentIntent::BeginDrag { node_ids, with_children } => {
                self.begin_drag(node_ids, with_children);
            },
            DocumentIntent::DragMove { node_id, position } => {
                self.drag_move(node_id, position);
            },
            DocumentIntent::EndDrag => self.end_drag(),
            DocumentIntent::CancelDrag => self.cancel_drag(),
            DocumentIntent::BeginResize { node_id } => self.begin_resize(node_id),
            DocumentIntent::ResizeMove { node_id, width, height } => {
                self.resize_move(node_id, width, height);
            },
            DocumentIntent::EndResize => self.end_resize(),
            DocumentIntent::SetStrokes { strokes } => self.set_strokes(strokes),
            DocumentIntent::MoveStroke { stroke_id, delta } => {
                self.move_stroke(stroke_id, delta);
            },
            DocumentIntent::Copy => self.copy_selection(),
            DocumentIntent::Cut => self.cut_selection(),
            DocumentIntent::Paste { cursor_screen } => self.paste_at(cursor_screen),
            DocumentIntent::SetPendingMode { mode } => {
                self.pending_mode = Some(mode);
            },
            DocumentIntent::CancelPendingMode => {
                self.pending_mode = None;
            },
            DocumentIntent::Undo => {
                self.undo();
            },
            DocumentIntent::Redo => {
                self.redo();
            },
            DocumentIntent::Save => self.save(),
        }
    }

    // --- History plumbing ---

    fn current_state(&self) -> DocumentState {
        DocumentState {
            graph: self.graph.clone(),
            title: self.title.clone(),
            customization: self.customization.clone(),
            strokes: self.strokes.clone(),
        }
    }

    fn record_action(&mut self, kind: ActionKind, payload: ActionPayload, before: DocumentState) {
        let after = self.current_state();
        self.history.record(HistoryAction { kind, payload, before, after });
    }

    /// The one restoration path. Undo, redo, and gesture cancellation
    /// all replace document content through here.
    fn restore_state(&mut self, state: DocumentState) {
        self.graph = state.graph;
        self.title = state.title;
        self.customization = state.customization;
        self.strokes = state.strokes;
        self.selection.retain_present(&self.graph);
        self.collapsed.retain(|id| self.graph.contains_node(*id));
    }

    fn log(&mut self, entry: LogEntry) {
        if let Some(store) = &mut self.store {
            store.log_mutation(&entry);
        }
    }

    fn maybe_snapshot(&mut self) {
        if self.store.as_ref().is_some_and(|s| s.snapshot_due()) {
            let snapshot = self.to_snapshot();
            if let Some(store) = &mut self.store {
                store.take_snapshot(&snapshot);
            }
        }
    }

    // --- Content mutations ---

    fn set_title(&mut self, title: String) {
        if title == self.title {
            return;
        }
        let before = self.current_state();
        self.title = title.clone();
        self.record_action(ActionKind::UpdateTitle, ActionPayload::Title { title: title.clone() }, before);
        self.log(LogEntry::UpdateTitle { title });
    }

    fn create_node(&mut self, content: NodeContent, position: Point2D<f32>) -> NodeId {
        let before = self.current_state();
        let node = Node::new(content, position);
        let node_id = node.id;
        let persisted = persist_node(&node);
        self.graph.insert_node(node);
        // The first node anchors the map and is protected from deletion.
        if self.root_node_id.is_none() {
            self.root_node_id = Some(node_id);
        }
        self.selection.select(node_id, false);
        self.record_action(ActionKind::AddNode, ActionPayload::Node { node_id }, before);
        self.log(LogEntry::AddNode { node: persisted });
        node_id
    }

    fn update_node_content(&mut self, node_id: NodeId, content: NodeContent) {
        let Some(node) = self.graph.get_node_by_id(node_id) else {
            return;
        };
        if node.content == content {
            return;
        }
        let before = self.current_state();
        if let Some(node) = self.graph.get_node_by_id_mut(node_id) {
            node.content = content;
        }
        let persisted = self.graph.get_node_by_id(node_id).map(persist_node);
        self.record_action(ActionKind::UpdateNode, ActionPayload::Node { node_id }, before);
        if let Some(node) = persisted {
            self.log(LogEntry::UpdateNode { node });
        }
    }

    fn update_node_style(&mut self, node_id: NodeId, style: NodeStyle) {
        let Some(node) = self.graph.get_node_by_id(node_id) else {
            return;
        };
        if node.style == style {
            return;
        }
        let before = self.current_state();
        if let Some(node) = self.graph.get_node_by_id_mut(node_id) {
            node.style = style;
        }
        let persisted = self.graph.get_node_by_id(node_id).map(persist_node);
        self.record_action(ActionKind::UpdateNode, ActionPayload::Node { node_id }, before);
        if let Some(node) = persisted {
            self.log(LogEntry::UpdateNode { node });
        }
    }

    fn add_track_to_playlist(&mut self, playlist_node: NodeId, track_id: String) {
        let Some(node) = self.graph.get_node_by_id(playlist_node) else {
            return;
        };
        match &node.content {
            NodeContent::Playlist { track_ids } if !track_ids.contains(&track_id) => {},
            _ => return,
        }
        let before = self.current_state();
        if let Some(node) = self.graph.get_node_by_id_mut(playlist_node)
            && let NodeContent::Playlist { track_ids } = &mut node.content
        {
            track_ids.push(track_id);
        }
        let persisted = self.graph.get_node_by_id(playlist_node).map(persist_node);
        self.record_action(
            ActionKind::UpdateNode,
            ActionPayload::Node { node_id: playlist_node },
            before,
        );
        if let Some(node) = persisted {
            self.log(LogEntry::UpdateNode { node });
        }
        if self.pending_mode == Some(PendingMode::AddToPlaylist { playlist_node }) {
            self.pending_mode = None;
        }
    }

    /// Delete nodes and their descendants as one undoable action.
    fn delete_nodes(&mut self, node_ids: &[NodeId]) {
        let before = self.current_state();
        let mut affected = Vec::new();
        for node_id in node_ids {
            if Some(*node_id) == self.root_node_id {
                log::warn!("Refusing to delete the root node");
                continue;
            }
            if !self.graph.contains_node(*node_id) {
                continue;
            }
            affected.extend(self.graph.remove_subtree(*node_id));
        }
        if affected.is_empty() {
            return;
        }
        for id in &affected {
            self.collapsed.remove(id);
            self.log(LogEntry::RemoveNode { node_id: id.to_string() });
        }
        self.selection.retain_present(&self.graph);
        self.record_action(
            ActionKind::DeleteNode,
            ActionPayload::Delete { affected_nodes: affected },
            before,
        );
    }

    fn connect_nodes(&mut self, source: NodeId, target: NodeId) {
        let before = self.current_state();
        let kind = self.customization.default_edge_kind;
        if self.graph.connect(source, target, kind).is_none() {
            return;
        }
        let view = self
            .graph
            .edges()
            .find(|e| e.source == source && e.target == target);
        let Some(view) = view else {
            return;
        };
        let edge_id = view.id.clone();
        let persisted = persist_edge(&view);
        self.record_action(ActionKind::ConnectNodes, ActionPayload::Edge { edge_id }, before);
        self.log(LogEntry::AddEdge { edge: persisted });
    }

    fn disconnect_nodes(&mut self, source: NodeId, target: NodeId) {
        let ids: Vec<String> = self
            .graph
            .edges()
            .filter(|e| e.source == source && e.target == target)
            .map(|e| e.id)
            .collect();
        let Some(first) = ids.first().cloned() else {
            return;
        };
        let before = self.current_state();
        for id in ids {
            if self.graph.disconnect(&id) {
                self.log(LogEntry::RemoveEdge { edge_id: id });
            }
        }
        self.record_action(
            ActionKind::DisconnectNodes,
            ActionPayload::Edge { edge_id: first },
            before,
        );
    }

    fn set_edge_kind(&mut self, edge_id: String, kind: EdgeKind) {
        let current = self.graph.get_edge_by_id(&edge_id).map(|e| e.kind);
        if current.is_none() || current == Some(kind) {
            return;
        }
        let before = self.current_state();
        if !self.graph.set_edge_kind(&edge_id, kind) {
            return;
        }
        self.record_action(ActionKind::ChangeEdgeKind, ActionPayload::EdgeKind { kind }, before);
        self.log(LogEntry::UpdateEdgeKind {
            edge_id,
            kind: persist_edge_kind(kind),
        });
    }

    fn set_default_edge_kind(&mut self, kind: EdgeKind) {
        if self.customization.default_edge_kind == kind {
            return;
        }
        let before = self.current_state();
        self.customization.default_edge_kind = kind;
        self.record_action(ActionKind::ChangeEdgeKind, ActionPayload::EdgeKind { kind }, before);
        self.log(LogEntry::UpdateDefaultEdgeKind {
            kind: persist_edge_kind(kind),
        });
    }

    fn set_background_color(&mut self, color: Option<String>) {
        if self.customization.background_color == color {
            return;
        }
        let before = self.current_state();
        self.customization.background_color = color.clone();
        self.record_action(
            ActionKind::ChangeBackgroundColor,
            ActionPayload::Color { color: color.clone() },
            before,
        );
        self.log(LogEntry::UpdateBackgroundColor { color });
    }

    fn set_dot_color(&mut self, color: Option<String>) {
        if self.customization.dot_color == color {
            return;
        }
        let before = self.current_state();
        self.customization.dot_color = color.clone();
        self.record_action(
            ActionKind::ChangeDotColor,
            ActionPayload::Color { color: color.clone() },
            before,
        );
        self.log(LogEntry::UpdateDotColor { color });
    }

    /// Font is a cosmetic preference, journaled but not undoable.
    fn set_font(&mut self, font: Option<String>) {
        if self.customization.font == font {
            return;
        }
        self.customization.font = font.clone();
        self.log(LogEntry::UpdateFont { font });
    }

    fn toggle_collapsed(&mut self, node_id: NodeId) {
        if !self.graph.contains_node(node_id) {
            return;
        }
        let collapsed = if self.collapsed.remove(&node_id) {
            false
        } else {
            self.collapsed.insert(node_id);
            true
        };
        self.log(LogEntry::SetCollapsed { node_id: node_id.to_string(), collapsed });
    }

    // --- Drawing layer ---

    fn set_strokes(&mut self, strokes: Vec<Stroke>) {
        if strokes == self.strokes {
            return;
        }
        let before = self.current_state();
        self.strokes = strokes;
        self.record_action(ActionKind::DrawingChange, ActionPayload::Drawing, before);
        self.log(LogEntry::SetStrokes { strokes: strokes_to_persisted(&self.strokes) });
    }

    fn move_stroke(&mut self, stroke_id: String, delta: Vector2D<f32>) {
        if !self.strokes.iter().any(|s| s.id == stroke_id) {
            return;
        }
        let before = self.current_state();
        for stroke in &mut self.strokes {
            if stroke.id == stroke_id {
                stroke.translate(delta);
            }
        }
        self.record_action(ActionKind::MoveStroke, ActionPayload::StrokeMove { stroke_id }, before);
        self.log(LogEntry::SetStrokes { strokes: strokes_to_persisted(&self.strokes) });
    }

    // --- Drag and resize gestures ---

    /// Start a drag. Positions are applied live during the gesture and
    /// collapse into at most one history entry when it ends.
    fn begin_drag(&mut self, node_ids: Vec<NodeId>, with_children: bool) {
        if self.drag.is_some() {
            return;
        }
        let node_ids: Vec<NodeId> = node_ids
            .into_iter()
            .filter(|id| self.graph.contains_node(*id))
            .collect();
        if node_ids.is_empty() {
            return;
        }
        let start_positions = node_ids
            .iter()
            .filter_map(|id| self.graph.get_node_by_id(*id).map(|n| (*id, n.position)))
            .collect();
        self.drag = Some(DragGesture {
            node_ids,
            with_children,
            start: self.current_state(),
            start_positions,
            cancelled: false,
        });
    }

    fn drag_move(&mut self, node_id: NodeId, position: Point2D<f32>) {
        let Some(gesture) = &self.drag else {
            return;
        };
        if !gesture.node_ids.contains(&node_id) {
            return;
        }
        let with_children = gesture.with_children;
        let Some(current) = self.graph.get_node_by_id(node_id).map(|n| n.position) else {
            return;
        };
        let delta = position - current;
        self.graph.translate(node_id, delta, with_children);
    }

    fn end_drag(&mut self) {
        let Some(gesture) = self.drag.take() else {
            return;
        };
        if gesture.cancelled {
            return;
        }
        let moved = gesture.start_positions.iter().any(|(id, start)| {
            self.graph.get_node_by_id(*id).is_some_and(|n| {
                let delta = n.position - *start;
                delta.x.abs() >= GESTURE_HISTORY_THRESHOLD
                    || delta.y.abs() >= GESTURE_HISTORY_THRESHOLD
            })
        });
        if !moved {
            return;
        }
        let moves: Vec<(NodeId, Point2D<f32>)> = gesture
            .node_ids
            .iter()
            .filter_map(|id| self.graph.get_node_by_id(*id).map(|n| (*id, n.position)))
            .collect();
        for (node_id, position) in &moves {
            self.log(LogEntry::MoveNode {
                node_id: node_id.to_string(),
                position_x: position.x,
                position_y: position.y,
            });
        }
        self.record_action(ActionKind::MoveNode, ActionPayload::Move { moves }, gesture.start);
    }

    /// Abort the drag, restoring every dragged node (and its children,
    /// for subtree drags) to where the gesture started.
    fn cancel_drag(&mut self) {
        let Some(gesture) = self.drag.take() else {
            return;
        };
        for (id, start) in &gesture.start_positions {
            let Some(current) = self.graph.get_node_by_id(*id).map(|n| n.position) else {
                continue;
            };
            let back = *start - current;
            self.graph.translate(*id, back, gesture.with_children);
        }
    }

    fn begin_resize(&mut self, node_id: NodeId) {
        if self.resize.is_some() {
            return;
        }
        let Some(node) = self.graph.get_node_by_id(node_id) else {
            return;
        };
        self.resize = Some(ResizeGesture {
            node_id,
            start: self.current_state(),
            start_width: node.width.unwrap_or(0.0),
            start_height: node.height.unwrap_or(0.0),
            cancelled: false,
        });
    }

    fn resize_move(&mut self, node_id: NodeId, width: f32, height: f32) {
        if self.resize.as_ref().is_none_or(|g| g.node_id != node_id) {
            return;
        }
        if let Some(node) = self.graph.get_node_by_id_mut(node_id) {
            node.width = Some(width);
            node.height = Some(height);
        }
    }

    fn end_resize(&mut self) {
        let Some(gesture) = self.resize.take() else {
            return;
        };
        if gesture.cancelled {
            return;
        }
        let Some(node) = self.graph.get_node_by_id(gesture.node_id) else {
            return;
        };
        let width = node.width.unwrap_or(0.0);
        let height = node.height.unwrap_or(0.0);
        if (width - gesture.start_width).abs() < GESTURE_HISTORY_THRESHOLD
            && (height - gesture.start_height).abs() < GESTURE_HISTORY_THRESHOLD
        {
            return;
        }
        self.record_action(
            ActionKind::ResizeNode,
            ActionPayload::Resize { node_id: gesture.node_id, width, height },
            gesture.start,
        );
        self.log(LogEntry::ResizeNode {
            node_id: gesture.node_id.to_string(),
            width,
            height,
        });
    }

    /// Drain renderer dimension reports. User-initiated resizes become
    /// history entries; auto-measurements apply silently.
    pub fn process_dimension_events(&mut self) -> usize {
        let events: Vec<DimensionEvent> = self.dimension_rx.try_iter().collect();
        let mut applied = 0;
        for event in events {
            if !self.graph.contains_node(event.node_id) {
                continue;
            }
            let before = event.user_initiated.then(|| self.current_state());
            if let Some(node) = self.graph.get_node_by_id_mut(event.node_id) {
                node.width = Some(event.width);
                node.height = Some(event.height);
            }
            if let Some(before) = before {
                self.record_action(
                    ActionKind::ResizeNode,
                    ActionPayload::Resize {
                        node_id: event.node_id,
                        width: event.width,
                        height: event.height,
                    },
                    before,
                );
            }
            self.log(LogEntry::ResizeNode {
                node_id: event.node_id.to_string(),
                width: event.width,
                height: event.height,
            });
            applied += 1;
        }
        applied
    }

    // --- Clipboard ---

    /// Copy selected nodes and the edges between them. Descendants are
    /// not pulled in implicitly.
    fn copy_selection(&mut self) {
        if self.selection.is_empty() {
            return;
        }
        let ids: HashSet<NodeId> = self.selection.iter().copied().collect();
        let nodes: Vec<Node> = self
            .selection
            .ordered()
            .iter()
            .filter_map(|id| self.graph.get_node_by_id(*id).cloned())
            .collect();
        let edges = self
            .graph
            .edges()
            .filter(|e| ids.contains(&e.source) && ids.contains(&e.target))
            .collect();
        self.clipboard = ClipboardBuffer { nodes, edges };
    }

    /// Cut is copy plus delete, recorded as one delete action.
    fn cut_selection(&mut self) {
        self.copy_selection();
        if self.clipboard.is_empty() {
            return;
        }
        let ids: Vec<NodeId> = self.selection.ordered().to_vec();
        self.delete_nodes(&ids);
    }

    fn paste_at(&mut self, cursor_screen: Point2D<f32>) {
        let fragment = create_paste_fragment(&self.clipboard, cursor_screen, &self.viewport);
        if self.pending_mode == Some(PendingMode::Paste) {
            self.pending_mode = None;
        }
        if fragment.nodes.is_empty() {
            return;
        }
        let before = self.current_state();
        let mut pasted = Vec::with_capacity(fragment.nodes.len());
        for node in fragment.nodes {
            let persisted = persist_node(&node);
            pasted.push(node.id);
            self.graph.insert_node(node);
            self.log(LogEntry::AddNode { node: persisted });
        }
        for edge in fragment.edges {
            let persisted = persist_edge(&edge);
            if self
                .graph
                .connect_with_id(edge.id, edge.source, edge.target, edge.kind)
                .is_some()
            {
                self.log(LogEntry::AddEdge { edge: persisted });
            }
        }
        self.selection.update_many(pasted.clone(), SelectionUpdateMode::Replace);
        self.record_action(
            ActionKind::AddNode,
            ActionPayload::Paste { affected_nodes: pasted },
            before,
        );
    }

    // --- Undo / redo / save ---

    /// Undo is refused while a gesture is in flight; the gesture owns
    /// the document until it ends.
    pub fn undo(&mut self) -> bool {
        if self.drag.is_some() || self.resize.is_some() {
            return false;
        }
        let Some(state) = self.history.undo() else {
            return false;
        };
        self.restore_state(state);
        self.snapshot_restored();
        true
    }

    pub fn redo(&mut self) -> bool {
        if self.drag.is_some() || self.resize.is_some() {
            return false;
        }
        let Some(state) = self.history.redo() else {
            return false;
        };
        self.restore_state(state);
        self.snapshot_restored();
        true
    }

    /// Restoration replaces whole subtrees of state, so the journal is
    /// rebased onto a fresh snapshot rather than patched entry by entry.
    fn snapshot_restored(&mut self) {
        let snapshot = self.to_snapshot();
        if let Some(store) = &mut self.store {
            store.take_snapshot(&snapshot);
        }
    }

    pub fn save(&mut self) {
        let snapshot = self.to_snapshot();
        if let Some(store) = &mut self.store {
            store.take_snapshot(&snapshot);
        }
        self.history.mark_saved();
    }

    // --- Collaboration ---

    /// Drain and apply queued remote changes. Remote edits never create
    /// local history entries.
    pub fn sync_remote_changes(&mut self) -> usize {
        let (changes, local_user) = match &self.collab {
            Some(session) => (session.drain(), session.user_id().to_string()),
            None => return 0,
        };
        let mut applied = 0;
        for change in changes {
            if change.entity == ChangeEntity::Node
                && change.action == ChangeAction::Delete
                && change.user_id != local_user
                && let Ok(node_id) = Uuid::parse_str(&change.id)
            {
                self.cancel_gestures_for(node_id);
            }
            if apply_remote_change(&mut self.graph, &mut self.customization, &local_user, &change) {
                applied += 1;
            }
        }
        if applied > 0 {
            self.selection.retain_present(&self.graph);
            self.collapsed.retain(|id| self.graph.contains_node(*id));
        }
        applied
    }

    /// A remote delete of a node under an active gesture voids that
    /// gesture's history recording.
    fn cancel_gestures_for(&mut self, node_id: NodeId) {
        if let Some(gesture) = &mut self.drag
            && gesture.node_ids.contains(&node_id)
        {
            gesture.cancelled = true;
        }
        if let Some(gesture) = &mut self.resize
            && gesture.node_id == node_id
        {
            gesture.cancelled = true;
        }
    }

    // --- Snapshot conversion ---

    pub fn to_snapshot(&self) -> DocumentSnapshot {
        let (nodes, edges) = self.graph.to_persisted();
        let timestamp_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        DocumentSnapshot {
            title: self.title.clone(),
            default_edge_kind: persist_edge_kind(self.customization.default_edge_kind),
            background_color: self.customization.background_color.clone(),
            dot_color: self.customization.dot_color.clone(),
            font: self.customization.font.clone(),
            root_node_id: self.root_node_id.map(|id| id.to_string()),
            collapsed_node_ids: self.collapsed.iter().map(|id| id.to_string()).collect(),
            nodes,
            edges,
            strokes: strokes_to_persisted(&self.strokes),
            timestamp_secs,
        }
    }

    /// Replace document content from a snapshot. Loading suppresses
    /// history: the engine is reset so the loaded state is the floor
    /// undo cannot cross.
    pub fn apply_snapshot(&mut self, snapshot: &DocumentSnapshot) {
        self.graph = Graph::from_persisted(&snapshot.nodes, &snapshot.edges);
        self.title = snapshot.title.clone();
        self.customization = Customization {
            default_edge_kind: restore_edge_kind(snapshot.default_edge_kind),
            background_color: snapshot.background_color.clone(),
            dot_color: snapshot.dot_color.clone(),
            font: snapshot.font.clone(),
        };
        self.strokes = strokes_from_persisted(&snapshot.strokes);
        let collapsed: HashSet<NodeId> = snapshot
            .collapsed_node_ids
            .iter()
            .filter_map(|s| Uuid::parse_str(s).ok())
            .filter(|id| self.graph.contains_node(*id))
            .collect();
        self.collapsed = collapsed;
        self.root_node_id = snapshot
            .root_node_id
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok())
            .filter(|id| self.graph.contains_node(*id));
        self.selection.clear();
        self.drag = None;
        self.resize = None;
        self.pending_mode = None;
        self.history.reset();
    }

    // --- Named maps (sub-map storage) ---

    pub fn save_named(&mut self, name: &str) -> bool {
        let snapshot = self.to_snapshot();
        match &mut self.store {
            Some(store) => match store.save_named_map(name, &snapshot) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Failed to save named map {name:?}: {e}");
                    false
                },
            },
            None => false,
        }
    }

    pub fn load_named(&mut self, name: &str) -> bool {
        let Some(snapshot) = self.store.as_ref().and_then(|s| s.load_named_map(name)) else {
            return false;
        };
        self.apply_snapshot(&snapshot);
        true
    }

    pub fn list_named(&self) -> Vec<String> {
        self.store
            .as_ref()
            .map(|s| s.list_named_map_names())
            .unwrap_or_default()
    }
}

impl Default for MindMapDocument {
    fn default() -> Self {
        Self::new()
    }
}

fn strokes_to_persisted(strokes: &[Stroke]) -> Vec<PersistedStroke> {
    strokes
        .iter()
        .map(|s| PersistedStroke {
            stroke_id: s.id.clone(),
            points: s
                .points
                .iter()
                .map(|p| PersistedStrokePoint { x: p.x, y: p.y })
                .collect(),
            color: s.color.clone(),
            width: s.width,
        })
        .collect()
}

fn strokes_from_persisted(strokes: &[PersistedStroke]) -> Vec<Stroke> {
    strokes
        .iter()
        .map(|s| Stroke {
            id: s.stroke_id.clone(),
            points: s.points.iter().map(|p| Point2D::new(p.x, p.y)).collect(),
            color: s.color.clone(),
            width: s.width,
        })
        .collect()
}
