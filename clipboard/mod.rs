/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! In-memory clipboard and paste id-remapping.
//!
//! The buffer holds a detached snapshot of a selection. Paste mints
//! fresh ids for every node, rewrites edges through the old-id to
//! new-id mapping, and drops edges whose endpoints were not part of the
//! copied selection. The pasted fragment lands centered on the cursor
//! while keeping the relative layout of the copied subgraph.

use euclid::default::{Point2D, Vector2D};
use std::collections::HashMap;
use uuid::Uuid;

use crate::graph::{EdgeView, Node, NodeId, default_edge_id};

pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 10.0;

/// Canvas viewport: pan offset plus zoom factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub pan: Vector2D<f32>,
    pub zoom: f32,
}

impl Viewport {
    pub fn new() -> Self {
        Self {
            pan: Vector2D::zero(),
            zoom: 1.0,
        }
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    /// Map a screen-space point into canvas space.
    pub fn screen_to_canvas(&self, screen: Point2D<f32>) -> Point2D<f32> {
        (screen - self.pan) / self.zoom
    }

    pub fn canvas_to_screen(&self, canvas: Point2D<f32>) -> Point2D<f32> {
        canvas * self.zoom + self.pan
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new()
    }
}

/// Detached snapshot of a copied selection.
#[derive(Debug, Clone, Default)]
pub struct ClipboardBuffer {
    pub nodes: Vec<Node>,
    /// Edges whose endpoints were both selected at copy time.
    pub edges: Vec<EdgeView>,
}

impl ClipboardBuffer {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A pasted fragment ready to insert: fresh node ids, rewritten edges.
#[derive(Debug, Clone, Default)]
pub struct PasteFragment {
    pub nodes: Vec<Node>,
    pub edges: Vec<EdgeView>,
}

/// Build a paste fragment positioned at the cursor.
///
/// Ids are freshly minted per invocation, so pasting the same buffer
/// twice yields two disjoint fragments that never collide with existing
/// nodes or with each other.
pub fn create_paste_fragment(
    buffer: &ClipboardBuffer,
    cursor_screen: Point2D<f32>,
    viewport: &Viewport,
) -> PasteFragment {
    if buffer.nodes.is_empty() {
        return PasteFragment::default();
    }

    let centroid = {
        let sum = buffer
            .nodes
            .iter()
            .fold(Vector2D::zero(), |acc: Vector2D<f32>, node| {
                acc + node.position.to_vector()
            });
        (sum / buffer.nodes.len() as f32).to_point()
    };
    let target = viewport.screen_to_canvas(cursor_screen);
    let offset = target - centroid;

    let mut mapping: HashMap<NodeId, NodeId> = HashMap::with_capacity(buffer.nodes.len());
    let nodes = buffer
        .nodes
        .iter()
        .map(|node| {
            let fresh = Uuid::new_v4();
            mapping.insert(node.id, fresh);
            let mut pasted = node.clone();
            pasted.id = fresh;
            pasted.position += offset;
            pasted
        })
        .collect();

    // An edge survives only when both endpoints were copied; anything
    // dangling outside the selection is dropped, not remapped.
    let edges = buffer
        .edges
        .iter()
        .filter_map(|edge| {
            let source = *mapping.get(&edge.source)?;
            let target = *mapping.get(&edge.target)?;
            Some(EdgeView {
                id: default_edge_id(source, target),
                source,
                target,
                kind: edge.kind,
            })
        })
        .collect();

    PasteFragment { nodes, edges }
}
