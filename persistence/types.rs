/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Serializable types for document persistence.

use rkyv::{Archive, Deserialize, Serialize};

/// Social platform tag for persistence (mirrors `SocialPlatform` in the
/// graph model).
#[derive(
    Archive,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    PartialEq,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug, PartialEq))]
pub enum PersistedSocialPlatform {
    Twitter,
    Instagram,
    Tiktok,
    Facebook,
}

/// Node payload for persistence (mirrors `NodeContent`).
#[derive(Archive, Serialize, Deserialize, Clone, Debug, serde::Serialize, serde::Deserialize)]
#[rkyv(derive(Debug))]
pub enum PersistedNodeContent {
    Text {
        label: String,
    },
    Image {
        url: String,
    },
    Audio {
        url: String,
    },
    Link {
        url: String,
        title: String,
    },
    SocialEmbed {
        platform: PersistedSocialPlatform,
        handle: String,
    },
    SubMap {
        map_id: String,
    },
    Playlist {
        track_ids: Vec<String>,
    },
}

/// Persisted node.
#[derive(Archive, Serialize, Deserialize, Clone, Debug)]
pub struct PersistedNode {
    /// Stable node identity.
    pub node_id: String,
    pub content: PersistedNodeContent,
    pub position_x: f32,
    pub position_y: f32,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub background_color: Option<String>,
    pub border_color: Option<String>,
}

/// Edge rendering style for persistence.
#[derive(
    Archive,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    PartialEq,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug, PartialEq))]
pub enum PersistedEdgeKind {
    Bezier,
    Straight,
    Step,
}

impl Default for PersistedEdgeKind {
    fn default() -> Self {
        Self::Bezier
    }
}

/// Persisted edge.
#[derive(Archive, Serialize, Deserialize, Clone, Debug)]
pub struct PersistedEdge {
    pub edge_id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    pub kind: PersistedEdgeKind,
}

/// A single point of a freehand stroke, in canvas coordinates.
#[derive(Archive, Serialize, Deserialize, Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
#[rkyv(derive(Debug))]
pub struct PersistedStrokePoint {
    pub x: f32,
    pub y: f32,
}

/// Persisted freehand drawing stroke.
#[derive(Archive, Serialize, Deserialize, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PersistedStroke {
    pub stroke_id: String,
    pub points: Vec<PersistedStrokePoint>,
    pub color: String,
    pub width: f32,
}

/// Full document snapshot for periodic saves.
#[derive(Archive, Serialize, Deserialize, Clone, Debug)]
pub struct DocumentSnapshot {
    pub title: String,
    pub default_edge_kind: PersistedEdgeKind,
    pub background_color: Option<String>,
    pub dot_color: Option<String>,
    pub font: Option<String>,
    /// Root node, protected from deletion. Absent in legacy snapshots.
    pub root_node_id: Option<String>,
    pub collapsed_node_ids: Vec<String>,
    pub nodes: Vec<PersistedNode>,
    pub edges: Vec<PersistedEdge>,
    pub strokes: Vec<PersistedStroke>,
    pub timestamp_secs: u64,
}

/// Log entry for mutation journaling.
#[derive(Archive, Serialize, Deserialize, Clone, Debug)]
pub enum LogEntry {
    AddNode {
        node: PersistedNode,
    },
    MoveNode {
        node_id: String,
        position_x: f32,
        position_y: f32,
    },
    ResizeNode {
        node_id: String,
        width: f32,
        height: f32,
    },
    /// Node payloads are heterogeneous across node types, so content
    /// updates journal the full node rather than a field diff.
    UpdateNode {
        node: PersistedNode,
    },
    RemoveNode {
        node_id: String,
    },
    AddEdge {
        edge: PersistedEdge,
    },
    RemoveEdge {
        edge_id: String,
    },
    UpdateEdgeKind {
        edge_id: String,
        kind: PersistedEdgeKind,
    },
    UpdateTitle {
        title: String,
    },
    UpdateDefaultEdgeKind {
        kind: PersistedEdgeKind,
    },
    UpdateBackgroundColor {
        color: Option<String>,
    },
    UpdateDotColor {
        color: Option<String>,
    },
    UpdateFont {
        font: Option<String>,
    },
    SetCollapsed {
        node_id: String,
        collapsed: bool,
    },
    /// The drawing layer is journaled whole; strokes are small and edits
    /// to them are rare compared to graph mutations.
    SetStrokes {
        strokes: Vec<PersistedStroke>,
    },
    ClearDocument,
}
