/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Collaboration merge layer.
//!
//! Remote change events arrive asynchronously and unordered relative to
//! local edits. Each event is applied as an independent idempotent
//! operation against current state: ids are globally unique, inserts are
//! insert-if-absent, and deletes are absorbing, so commutative apply is
//! safe without buffering or reordering. Concurrent edits to the same
//! field resolve last-write-wins by arrival order.

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::graph::{Customization, EdgeKind, Graph, Node, NodeContent, NodeId, NodeStyle};

/// Which part of the document a change targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeEntity {
    Node,
    Edge,
    Customization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

/// One change event from a remote collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteChange {
    /// Id of the affected entity (node uuid, edge id, or the literal
    /// `"customization"` for document styling).
    pub id: String,
    #[serde(rename = "type")]
    pub entity: ChangeEntity,
    pub action: ChangeAction,
    #[serde(default)]
    pub data: serde_json::Value,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct PointData {
    x: f32,
    y: f32,
}

/// Node payload of a create or update event. Every field is optional so
/// an update can carry just the fields that changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NodeChangeData {
    #[serde(default)]
    content: Option<NodeContent>,
    #[serde(default)]
    position: Option<PointData>,
    #[serde(default)]
    width: Option<f32>,
    #[serde(default)]
    height: Option<f32>,
    #[serde(default)]
    style: Option<NodeStyle>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EdgeChangeData {
    #[serde(default)]
    source: Option<NodeId>,
    #[serde(default)]
    target: Option<NodeId>,
    #[serde(default)]
    kind: Option<EdgeKind>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CustomizationChangeData {
    #[serde(default)]
    default_edge_kind: Option<EdgeKind>,
    #[serde(default)]
    background_color: Option<String>,
    #[serde(default)]
    dot_color: Option<String>,
    #[serde(default)]
    font: Option<String>,
}

/// Apply one remote change to local state. Returns whether local state
/// actually changed; redeliveries, stale events, and self-echoes all
/// come back `false`.
pub fn apply_remote_change(
    graph: &mut Graph,
    customization: &mut Customization,
    local_user_id: &str,
    change: &RemoteChange,
) -> bool {
    // Echo of a local edit already applied optimistically.
    if change.user_id == local_user_id {
        return false;
    }

    match change.entity {
        ChangeEntity::Node => apply_node_change(graph, change),
        ChangeEntity::Edge => apply_edge_change(graph, change),
        ChangeEntity::Customization => apply_customization_change(customization, change),
    }
}

fn apply_node_change(graph: &mut Graph, change: &RemoteChange) -> bool {
    let Ok(node_id) = Uuid::parse_str(&change.id) else {
        warn!("Remote node change with invalid id: {}", change.id);
        return false;
    };

    match change.action {
        ChangeAction::Create => {
            let data: NodeChangeData = match serde_json::from_value(change.data.clone()) {
                Ok(d) => d,
                Err(e) => {
                    warn!("Malformed remote node create for {node_id}: {e}");
                    return false;
                },
            };
            let (Some(content), Some(position)) = (data.content, data.position) else {
                warn!("Remote node create for {node_id} missing content or position");
                return false;
            };
            let mut node = Node::with_id(
                node_id,
                content,
                euclid::default::Point2D::new(position.x, position.y),
            );
            node.width = data.width;
            node.height = data.height;
            node.style = data.style.unwrap_or_default();
            graph.insert_node_if_missing(node).is_some()
        },
        ChangeAction::Update => {
            let data: NodeChangeData = match serde_json::from_value(change.data.clone()) {
                Ok(d) => d,
                Err(e) => {
                    warn!("Malformed remote node update for {node_id}: {e}");
                    return false;
                },
            };
            // Already deleted locally: the delete absorbed this update.
            let Some(node) = graph.get_node_by_id_mut(node_id) else {
                debug!("Remote node update for absent node {node_id}, skipping");
                return false;
            };
            if let Some(content) = data.content {
                node.content = content;
            }
            if let Some(position) = data.position {
                node.position = euclid::default::Point2D::new(position.x, position.y);
            }
            if let Some(width) = data.width {
                node.width = Some(width);
            }
            if let Some(height) = data.height {
                node.height = Some(height);
            }
            if let Some(style) = data.style {
                node.style = style;
            }
            true
        },
        // Incident edges are pruned in the same step.
        ChangeAction::Delete => graph.remove_node_by_id(node_id),
    }
}

fn apply_edge_change(graph: &mut Graph, change: &RemoteChange) -> bool {
    match change.action {
        ChangeAction::Create => {
            let data: EdgeChangeData = match serde_json::from_value(change.data.clone()) {
                Ok(d) => d,
                Err(e) => {
                    warn!("Malformed remote edge create {}: {e}", change.id);
                    return false;
                },
            };
            let (Some(source), Some(target)) = (data.source, data.target) else {
                warn!("Remote edge create {} missing endpoints", change.id);
                return false;
            };
            graph
                .connect_with_id(
                    change.id.clone(),
                    source,
                    target,
                    data.kind.unwrap_or_default(),
                )
                .is_some()
        },
        ChangeAction::Update => {
            let data: EdgeChangeData = match serde_json::from_value(change.data.clone()) {
                Ok(d) => d,
                Err(e) => {
                    warn!("Malformed remote edge update {}: {e}", change.id);
                    return false;
                },
            };
            match data.kind {
                Some(kind) => graph.set_edge_kind(&change.id, kind),
                None => false,
            }
        },
        ChangeAction::Delete => graph.disconnect(&change.id),
    }
}

fn apply_customization_change(customization: &mut Customization, change: &RemoteChange) -> bool {
    if change.action != ChangeAction::Update {
        debug!("Ignoring customization {:?} event", change.action);
        return false;
    }
    let data: CustomizationChangeData = match serde_json::from_value(change.data.clone()) {
        Ok(d) => d,
        Err(e) => {
            warn!("Malformed remote customization update: {e}");
            return false;
        },
    };

    // Each field is applied only when the incoming value differs, so a
    // redelivered event never forces a redundant re-render and a value the
    // local user just changed is not clobbered by an equal echo.
    let mut changed = false;
    if let Some(kind) = data.default_edge_kind
        && customization.default_edge_kind != kind
    {
        customization.default_edge_kind = kind;
        changed = true;
    }
    if let Some(color) = data.background_color
        && customization.background_color.as_ref() != Some(&color)
    {
        customization.background_color = Some(color);
        changed = true;
    }
    if let Some(color) = data.dot_color
        && customization.dot_color.as_ref() != Some(&color)
    {
        customization.dot_color = Some(color);
        changed = true;
    }
    if let Some(font) = data.font
        && customization.font.as_ref() != Some(&font)
    {
        customization.font = Some(font);
        changed = true;
    }
    changed
}

/// Channel-backed session for one collaborating user.
///
/// The transport side pushes decoded events through a cloned sender; the
/// document drains them on its own schedule and applies each through
/// [`apply_remote_change`].
pub struct CollabSession {
    user_id: String,
    sender: Sender<RemoteChange>,
    receiver: Receiver<RemoteChange>,
}

impl CollabSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            user_id: user_id.into(),
            sender,
            receiver,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Sender handle for the transport side.
    pub fn sender(&self) -> Sender<RemoteChange> {
        self.sender.clone()
    }

    /// All events queued since the last drain, in arrival order.
    pub fn drain(&self) -> Vec<RemoteChange> {
        self.receiver.try_iter().collect()
    }
}
