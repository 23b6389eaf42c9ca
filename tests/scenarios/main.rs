/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! End-to-end scenarios driven through the public intent API.

mod common;

mod collaboration;
mod history_flow;
mod persistence_flow;
mod visibility;

#[test]
fn scenarios_smoke_empty_document() {
    let doc = mindweave::MindMapDocument::new();
    assert_eq!(doc.graph.node_count(), 0);
    assert!(!doc.can_undo());
    assert!(!doc.can_redo());
    assert!(!doc.has_unsaved_changes());
}
