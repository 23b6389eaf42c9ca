/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Graph data structures for the mind-map document.
//!
//! Core structures:
//! - `Graph`: main container backed by petgraph::StableGraph
//! - `Node`: typed mind-map node with position, size, and style
//! - `EdgePayload`: directed connection carrying a stable string edge id

use euclid::default::{Point2D, Vector2D};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::{Directed, Direction};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::persistence::types::{
    PersistedEdge, PersistedEdgeKind, PersistedNode, PersistedNodeContent, PersistedSocialPlatform,
};

/// Stable node handle (petgraph NodeIndex, survives other deletions)
pub type NodeKey = NodeIndex;

/// Stable edge handle (petgraph EdgeIndex)
pub type EdgeKey = EdgeIndex;

/// Stable node identity, unique across documents and clients.
pub type NodeId = Uuid;

/// Social platform discriminator for embed nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialPlatform {
    Twitter,
    Instagram,
    Tiktok,
    Facebook,
}

/// Node payload, tagged by node type.
///
/// The closed set of node types the document supports. Every site that
/// reads a payload matches exhaustively, so adding a variant is a compile
/// error at each of them.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeContent {
    Text { label: String },
    Image { url: String },
    Audio { url: String },
    Link { url: String, title: String },
    SocialEmbed { platform: SocialPlatform, handle: String },
    SubMap { map_id: String },
    Playlist { track_ids: Vec<String> },
}

impl NodeContent {
    /// Human-readable label used for display and search.
    pub fn label(&self) -> &str {
        match self {
            NodeContent::Text { label } => label,
            NodeContent::Image { url } => url,
            NodeContent::Audio { url } => url,
            NodeContent::Link { title, .. } => title,
            NodeContent::SocialEmbed { handle, .. } => handle,
            NodeContent::SubMap { map_id } => map_id,
            NodeContent::Playlist { .. } => "playlist",
        }
    }

    /// Short type tag, stable across releases (used in logs and grouping).
    pub fn kind(&self) -> &'static str {
        match self {
            NodeContent::Text { .. } => "text",
            NodeContent::Image { .. } => "image",
            NodeContent::Audio { .. } => "audio",
            NodeContent::Link { .. } => "link",
            NodeContent::SocialEmbed { .. } => "social",
            NodeContent::SubMap { .. } => "submap",
            NodeContent::Playlist { .. } => "playlist",
        }
    }
}

/// Per-node visual style overrides.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NodeStyle {
    pub background_color: Option<String>,
    pub border_color: Option<String>,
}

/// A node in the mind-map graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Stable node identity.
    pub id: NodeId,

    /// Typed payload; the shape depends on the node type.
    pub content: NodeContent,

    /// Position in canvas space.
    pub position: Point2D<f32>,

    /// Explicit width, when the node has been sized (by user or renderer).
    pub width: Option<f32>,

    /// Explicit height, when the node has been sized.
    pub height: Option<f32>,

    /// Visual style overrides.
    pub style: NodeStyle,
}

impl Node {
    pub fn new(content: NodeContent, position: Point2D<f32>) -> Self {
        Self::with_id(Uuid::new_v4(), content, position)
    }

    pub fn with_id(id: NodeId, content: NodeContent, position: Point2D<f32>) -> Self {
        Self {
            id,
            content,
            position,
            width: None,
            height: None,
            style: NodeStyle::default(),
        }
    }
}

/// Edge rendering style. Stored per edge, so changing the document-wide
/// default only affects edges created afterwards until re-applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    #[default]
    Bezier,
    Straight,
    Step,
}

/// Directed edge payload with a stable string id.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EdgePayload {
    pub id: String,
    pub kind: EdgeKind,
}

/// Read-only view of an edge, resolved to node ids.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeView {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
}

/// Default edge id for a source/target pair.
pub(crate) fn default_edge_id(source: NodeId, target: NodeId) -> String {
    format!("{source}-{target}")
}

/// Document-wide styling, shared with collaborators.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Customization {
    pub default_edge_kind: EdgeKind,
    pub background_color: Option<String>,
    pub dot_color: Option<String>,
    pub font: Option<String>,
}

/// Freehand drawing stroke on the canvas, separate from graph topology.
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub id: String,
    pub points: Vec<Point2D<f32>>,
    pub color: String,
    pub width: f32,
}

impl Stroke {
    /// Translate every point of the stroke by `delta`.
    pub fn translate(&mut self, delta: Vector2D<f32>) {
        for point in &mut self.points {
            *point += delta;
        }
    }
}

/// Main graph structure backed by petgraph::StableGraph
#[derive(Clone)]
pub struct Graph {
    /// The underlying petgraph stable graph
    pub(crate) inner: StableGraph<Node, EdgePayload, Directed>,

    /// Stable UUID to node mapping.
    id_to_node: HashMap<NodeId, NodeKey>,

    /// Stable edge-id to edge mapping.
    id_to_edge: HashMap<String, EdgeKey>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self {
            inner: StableGraph::new(),
            id_to_node: HashMap::new(),
            id_to_edge: HashMap::new(),
        }
    }

    // Topology mutators are crate-internal: all writes flow through the
    // document reducer, which owns history capture and mutation logging.

    /// Add a new node to the graph
    pub(crate) fn add_node(&mut self, content: NodeContent, position: Point2D<f32>) -> NodeKey {
        self.insert_node(Node::new(content, position))
    }

    /// Insert a fully-formed node (paste, remote create, snapshot load).
    pub(crate) fn insert_node(&mut self, node: Node) -> NodeKey {
        let id = node.id;
        let key = self.inner.add_node(node);
        self.id_to_node.insert(id, key);
        key
    }

    /// Insert only if the id is not already present. Idempotent-apply and
    /// replay helper.
    pub(crate) fn insert_node_if_missing(&mut self, node: Node) -> Option<NodeKey> {
        if self.id_to_node.contains_key(&node.id) {
            return None;
        }
        Some(self.insert_node(node))
    }

    /// Remove a node and all its incident edges.
    pub(crate) fn remove_node(&mut self, key: NodeKey) -> bool {
        // Incident edge ids must leave the secondary index before petgraph
        // drops the edges themselves.
        let incident: Vec<String> = self
            .inner
            .edges_directed(key, Direction::Outgoing)
            .chain(self.inner.edges_directed(key, Direction::Incoming))
            .map(|edge| edge.weight().id.clone())
            .collect();
        for edge_id in incident {
            self.id_to_edge.remove(&edge_id);
        }

        if let Some(node) = self.inner.remove_node(key) {
            self.id_to_node.remove(&node.id);
            true
        } else {
            false
        }
    }

    /// Remove a node by stable id. Tolerant of already-absent ids.
    pub(crate) fn remove_node_by_id(&mut self, id: NodeId) -> bool {
        let Some(key) = self.key_of(id) else {
            return false;
        };
        self.remove_node(key)
    }

    /// Remove a node and every descendant reachable from it, in one step.
    /// Returns the removed node ids (the start node first when present).
    pub(crate) fn remove_subtree(&mut self, start: NodeId) -> Vec<NodeId> {
        if self.key_of(start).is_none() {
            return Vec::new();
        }
        let mut removed = vec![start];
        removed.extend(self.descendants(start));
        for id in &removed {
            self.remove_node_by_id(*id);
        }
        removed
    }

    /// Connect two nodes with a freshly-minted edge id.
    ///
    /// Rejected (returns `None`): self-referential edges, missing
    /// endpoints, and pairs that are already connected.
    pub(crate) fn connect(
        &mut self,
        source: NodeId,
        target: NodeId,
        kind: EdgeKind,
    ) -> Option<EdgeKey> {
        if source == target {
            return None;
        }
        let from = self.key_of(source)?;
        let to = self.key_of(target)?;
        if self.inner.find_edge(from, to).is_some() {
            return None;
        }

        let mut id = default_edge_id(source, target);
        // Duplicate pairs are rejected above, but a stale id can linger
        // when the same pair was connected, disconnected through another
        // path, and reconnected within one remote batch.
        while self.id_to_edge.contains_key(&id) {
            id = format!(
                "{}-{:04x}",
                default_edge_id(source, target),
                rand::random::<u16>()
            );
        }
        let key = self
            .inner
            .add_edge(from, to, EdgePayload { id: id.clone(), kind });
        self.id_to_edge.insert(id, key);
        Some(key)
    }

    /// Connect with a caller-supplied edge id, only if that id is absent.
    /// Remote-create and replay helper.
    pub(crate) fn connect_with_id(
        &mut self,
        id: String,
        source: NodeId,
        target: NodeId,
        kind: EdgeKind,
    ) -> Option<EdgeKey> {
        if source == target || self.id_to_edge.contains_key(&id) {
            return None;
        }
        let from = self.key_of(source)?;
        let to = self.key_of(target)?;
        if self.inner.find_edge(from, to).is_some() {
            return None;
        }
        let key = self
            .inner
            .add_edge(from, to, EdgePayload { id: id.clone(), kind });
        self.id_to_edge.insert(id, key);
        Some(key)
    }

    /// Change the rendering style of an existing edge.
    pub(crate) fn set_edge_kind(&mut self, edge_id: &str, kind: EdgeKind) -> bool {
        let Some(key) = self.id_to_edge.get(edge_id) else {
            return false;
        };
        match self.inner.edge_weight_mut(*key) {
            Some(payload) => {
                payload.kind = kind;
                true
            }
            None => false,
        }
    }

    /// Remove an edge by stable id. Tolerant of already-absent ids.
    pub(crate) fn disconnect(&mut self, edge_id: &str) -> bool {
        let Some(key) = self.id_to_edge.remove(edge_id) else {
            return false;
        };
        self.inner.remove_edge(key).is_some()
    }

    /// Remove every directed edge from `source` to `target`.
    /// Returns how many edges were removed.
    pub(crate) fn disconnect_between(&mut self, source: NodeId, target: NodeId) -> usize {
        let ids: Vec<String> = self
            .edges()
            .filter(|edge| edge.source == source && edge.target == target)
            .map(|edge| edge.id)
            .collect();
        let mut removed = 0usize;
        for id in ids {
            if self.disconnect(&id) {
                removed += 1;
            }
        }
        removed
    }

    /// Get a node by key
    pub fn get_node(&self, key: NodeKey) -> Option<&Node> {
        self.inner.node_weight(key)
    }

    /// Get a node by stable id.
    pub fn get_node_by_id(&self, id: NodeId) -> Option<&Node> {
        self.inner.node_weight(self.key_of(id)?)
    }

    /// Get a mutable node by stable id.
    pub(crate) fn get_node_by_id_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let key = self.key_of(id)?;
        self.inner.node_weight_mut(key)
    }

    /// Node key for a stable id.
    pub fn key_of(&self, id: NodeId) -> Option<NodeKey> {
        self.id_to_node.get(&id).copied()
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.id_to_node.contains_key(&id)
    }

    /// Edge payload by stable edge id.
    pub fn get_edge_by_id(&self, edge_id: &str) -> Option<&EdgePayload> {
        self.inner.edge_weight(*self.id_to_edge.get(edge_id)?)
    }

    pub fn contains_edge(&self, edge_id: &str) -> bool {
        self.id_to_edge.contains_key(edge_id)
    }

    /// Check if a directed edge exists from `source` to `target`
    pub fn has_edge_between(&self, source: NodeId, target: NodeId) -> bool {
        let (Some(from), Some(to)) = (self.key_of(source), self.key_of(target)) else {
            return false;
        };
        self.inner.find_edge(from, to).is_some()
    }

    /// Iterate over all nodes as (key, node) pairs
    pub fn nodes(&self) -> impl Iterator<Item = (NodeKey, &Node)> {
        self.inner
            .node_indices()
            .map(move |idx| (idx, &self.inner[idx]))
    }

    /// Iterate over all node ids.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inner.node_indices().map(move |idx| self.inner[idx].id)
    }

    /// Iterate over all edges as EdgeView
    pub fn edges(&self) -> impl Iterator<Item = EdgeView> + '_ {
        self.inner.edge_references().filter_map(|e| {
            let source = self.inner.node_weight(e.source())?.id;
            let target = self.inner.node_weight(e.target())?.id;
            Some(EdgeView {
                id: e.weight().id.clone(),
                source,
                target,
                kind: e.weight().kind,
            })
        })
    }

    /// Count of nodes in the graph
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Count of edges in the graph
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    // --- Ancestry and visibility traversal ---
    //
    // The graph is a tree or DAG in normal use, but malformed data (a
    // corrupted paste, a bad remote batch) must not cause unbounded
    // traversal. Every walk carries an explicit visited set and terminates
    // with the partial reachable set.

    /// All nodes reachable from `start` following source → target edges.
    /// `start` itself is not included.
    pub fn descendants(&self, start: NodeId) -> Vec<NodeId> {
        self.reachable(start, Direction::Outgoing)
    }

    /// All nodes reaching `start` following target → source edges.
    /// `start` itself is not included.
    pub fn ancestors(&self, start: NodeId) -> Vec<NodeId> {
        self.reachable(start, Direction::Incoming)
    }

    fn reachable(&self, start: NodeId, direction: Direction) -> Vec<NodeId> {
        let Some(start_key) = self.key_of(start) else {
            return Vec::new();
        };
        let mut visited: HashSet<NodeKey> = HashSet::new();
        visited.insert(start_key);
        let mut stack = vec![start_key];
        let mut out = Vec::new();
        while let Some(key) = stack.pop() {
            for neighbor in self.inner.neighbors_directed(key, direction) {
                if visited.insert(neighbor) {
                    if let Some(node) = self.inner.node_weight(neighbor) {
                        out.push(node.id);
                    }
                    stack.push(neighbor);
                }
            }
        }
        out
    }

    /// Nodes hidden because some ancestor, at any depth, is collapsed.
    ///
    /// Recomputed from the current collapse set on every call; collapse
    /// state is never stored per descendant.
    pub fn hidden_nodes(&self, collapsed: &HashSet<NodeId>) -> HashSet<NodeId> {
        let mut hidden = HashSet::new();
        for id in collapsed {
            hidden.extend(self.descendants(*id));
        }
        hidden
    }

    /// Translate a node and optionally every descendant by `delta`.
    pub(crate) fn translate(&mut self, id: NodeId, delta: Vector2D<f32>, with_children: bool) {
        let mut targets = vec![id];
        if with_children {
            targets.extend(self.descendants(id));
        }
        for target in targets {
            if let Some(node) = self.get_node_by_id_mut(target) {
                node.position += delta;
            }
        }
    }

    // --- Snapshot conversion ---

    /// Serialize nodes and edges into their persisted forms.
    pub fn to_persisted(&self) -> (Vec<PersistedNode>, Vec<PersistedEdge>) {
        let nodes = self.nodes().map(|(_, node)| persist_node(node)).collect();

        let edges = self.edges().map(|edge| persist_edge(&edge)).collect();

        (nodes, edges)
    }

    /// Rebuild a graph from persisted nodes and edges.
    ///
    /// Nodes with unparseable ids and edges referencing missing nodes are
    /// dropped with a warning; a corrupted snapshot degrades, it doesn't
    /// fail the whole load.
    pub fn from_persisted(nodes: &[PersistedNode], edges: &[PersistedEdge]) -> Self {
        let mut graph = Graph::new();

        for pnode in nodes {
            let Ok(node_id) = Uuid::parse_str(&pnode.node_id) else {
                log::warn!("Dropping persisted node with invalid id: {}", pnode.node_id);
                continue;
            };
            let mut node = Node::with_id(
                node_id,
                restore_content(&pnode.content),
                Point2D::new(pnode.position_x, pnode.position_y),
            );
            node.width = pnode.width;
            node.height = pnode.height;
            node.style = NodeStyle {
                background_color: pnode.background_color.clone(),
                border_color: pnode.border_color.clone(),
            };
            let _ = graph.insert_node_if_missing(node);
        }

        for pedge in edges {
            let source = Uuid::parse_str(&pedge.source_node_id).ok();
            let target = Uuid::parse_str(&pedge.target_node_id).ok();
            if let (Some(source), Some(target)) = (source, target) {
                if graph
                    .connect_with_id(
                        pedge.edge_id.clone(),
                        source,
                        target,
                        restore_edge_kind(pedge.kind),
                    )
                    .is_none()
                {
                    log::warn!("Dropping persisted edge {}: endpoint missing", pedge.edge_id);
                }
            } else {
                log::warn!("Dropping persisted edge {}: invalid endpoint id", pedge.edge_id);
            }
        }

        graph
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn persist_edge(edge: &EdgeView) -> PersistedEdge {
    PersistedEdge {
        edge_id: edge.id.clone(),
        source_node_id: edge.source.to_string(),
        target_node_id: edge.target.to_string(),
        kind: persist_edge_kind(edge.kind),
    }
}

pub(crate) fn persist_node(node: &Node) -> PersistedNode {
    PersistedNode {
        node_id: node.id.to_string(),
        content: persist_content(&node.content),
        position_x: node.position.x,
        position_y: node.position.y,
        width: node.width,
        height: node.height,
        background_color: node.style.background_color.clone(),
        border_color: node.style.border_color.clone(),
    }
}

fn persist_content(content: &NodeContent) -> PersistedNodeContent {
    match content {
        NodeContent::Text { label } => PersistedNodeContent::Text {
            label: label.clone(),
        },
        NodeContent::Image { url } => PersistedNodeContent::Image { url: url.clone() },
        NodeContent::Audio { url } => PersistedNodeContent::Audio { url: url.clone() },
        NodeContent::Link { url, title } => PersistedNodeContent::Link {
            url: url.clone(),
            title: title.clone(),
        },
        NodeContent::SocialEmbed { platform, handle } => PersistedNodeContent::SocialEmbed {
            platform: match platform {
                SocialPlatform::Twitter => PersistedSocialPlatform::Twitter,
                SocialPlatform::Instagram => PersistedSocialPlatform::Instagram,
                SocialPlatform::Tiktok => PersistedSocialPlatform::Tiktok,
                SocialPlatform::Facebook => PersistedSocialPlatform::Facebook,
            },
            handle: handle.clone(),
        },
        NodeContent::SubMap { map_id } => PersistedNodeContent::SubMap {
            map_id: map_id.clone(),
        },
        NodeContent::Playlist { track_ids } => PersistedNodeContent::Playlist {
            track_ids: track_ids.clone(),
        },
    }
}

fn restore_content(content: &PersistedNodeContent) -> NodeContent {
    match content {
        PersistedNodeContent::Text { label } => NodeContent::Text {
            label: label.clone(),
        },
        PersistedNodeContent::Image { url } => NodeContent::Image { url: url.clone() },
        PersistedNodeContent::Audio { url } => NodeContent::Audio { url: url.clone() },
        PersistedNodeContent::Link { url, title } => NodeContent::Link {
            url: url.clone(),
            title: title.clone(),
        },
        PersistedNodeContent::SocialEmbed { platform, handle } => NodeContent::SocialEmbed {
            platform: match platform {
                PersistedSocialPlatform::Twitter => SocialPlatform::Twitter,
                PersistedSocialPlatform::Instagram => SocialPlatform::Instagram,
                PersistedSocialPlatform::Tiktok => SocialPlatform::Tiktok,
                PersistedSocialPlatform::Facebook => SocialPlatform::Facebook,
            },
            handle: handle.clone(),
        },
        PersistedNodeContent::SubMap { map_id } => NodeContent::SubMap {
            map_id: map_id.clone(),
        },
        PersistedNodeContent::Playlist { track_ids } => NodeContent::Playlist {
            track_ids: track_ids.clone(),
        },
    }
}

pub(crate) fn persist_edge_kind(kind: EdgeKind) -> PersistedEdgeKind {
    match kind {
        EdgeKind::Bezier => PersistedEdgeKind::Bezier,
        EdgeKind::Straight => PersistedEdgeKind::Straight,
        EdgeKind::Step => PersistedEdgeKind::Step,
    }
}

pub(crate) fn restore_edge_kind(kind: PersistedEdgeKind) -> EdgeKind {
    match kind {
        PersistedEdgeKind::Bezier => EdgeKind::Bezier,
        PersistedEdgeKind::Straight => EdgeKind::Straight,
        PersistedEdgeKind::Step => EdgeKind::Step,
    }
}
