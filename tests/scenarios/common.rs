/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use euclid::default::Point2D;
use mindweave::{DocumentIntent, MindMapDocument, NodeContent, NodeId};

pub fn text(label: &str) -> NodeContent {
    NodeContent::Text { label: label.to_string() }
}

/// Create one node per label, 100px apart, returning their ids in
/// order. Creation selects the new node, which is how its id is read
/// back out.
pub fn build_doc(labels: &[&str]) -> (MindMapDocument, Vec<NodeId>) {
    let mut doc = MindMapDocument::new();
    let mut ids = Vec::with_capacity(labels.len());
    for (i, label) in labels.iter().enumerate() {
        doc.apply_intent(DocumentIntent::CreateNode {
            content: text(label),
            position: Point2D::new(i as f32 * 100.0, 0.0),
        });
        ids.push(doc.selection.primary().unwrap());
    }
    (doc, ids)
}

pub fn connect(doc: &mut MindMapDocument, source: NodeId, target: NodeId) {
    doc.apply_intent(DocumentIntent::ConnectNodes { source, target });
}
