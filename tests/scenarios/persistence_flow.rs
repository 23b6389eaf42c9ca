/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Crash-and-reopen flows against a real on-disk store.

use euclid::default::Point2D;
use mindweave::persistence::DocumentStore;
use mindweave::{DocumentIntent, MindMapDocument, SelectionUpdateMode};

use crate::common::text;

fn open_doc(dir: &std::path::Path) -> MindMapDocument {
    let store = DocumentStore::open(dir.to_path_buf()).unwrap();
    MindMapDocument::with_store(store)
}

#[test]
fn saved_document_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut doc = open_doc(dir.path());
        doc.apply_intent(DocumentIntent::SetTitle { title: "Reading list".to_string() });
        doc.apply_intent(DocumentIntent::CreateNode {
            content: text("root"),
            position: Point2D::new(0.0, 0.0),
        });
        doc.apply_intent(DocumentIntent::CreateNode {
            content: text("book"),
            position: Point2D::new(100.0, 0.0),
        });
        doc.apply_intent(DocumentIntent::SetBackgroundColor {
            color: Some("#112233".to_string()),
        });
        doc.apply_intent(DocumentIntent::Save);
    }

    let doc = open_doc(dir.path());
    assert_eq!(doc.title, "Reading list");
    assert_eq!(doc.graph.node_count(), 2);
    assert_eq!(doc.customization.background_color, Some("#112233".to_string()));
    assert!(doc.root_node_id.is_some());
    // Recovery is the history floor.
    assert!(!doc.can_undo());
}

#[test]
fn unsaved_mutations_replay_from_the_journal() {
    let dir = tempfile::tempdir().unwrap();
    let (root, leaf);
    {
        let mut doc = open_doc(dir.path());
        doc.apply_intent(DocumentIntent::CreateNode {
            content: text("root"),
            position: Point2D::new(0.0, 0.0),
        });
        root = doc.selection.primary().unwrap();
        doc.apply_intent(DocumentIntent::Save);

        // Everything after the save lives only in the mutation log.
        doc.apply_intent(DocumentIntent::CreateNode {
            content: text("leaf"),
            position: Point2D::new(50.0, 50.0),
        });
        leaf = doc.selection.primary().unwrap();
        doc.apply_intent(DocumentIntent::ConnectNodes { source: root, target: leaf });
    }

    let doc = open_doc(dir.path());
    assert_eq!(doc.graph.node_count(), 2);
    assert!(doc.graph.has_edge_between(root, leaf));
}

#[test]
fn deletions_replay_and_prune_edges() {
    let dir = tempfile::tempdir().unwrap();
    let (root, gone);
    {
        let mut doc = open_doc(dir.path());
        doc.apply_intent(DocumentIntent::CreateNode {
            content: text("root"),
            position: Point2D::new(0.0, 0.0),
        });
        root = doc.selection.primary().unwrap();
        doc.apply_intent(DocumentIntent::CreateNode {
            content: text("gone"),
            position: Point2D::new(80.0, 0.0),
        });
        gone = doc.selection.primary().unwrap();
        doc.apply_intent(DocumentIntent::ConnectNodes { source: root, target: gone });
        doc.apply_intent(DocumentIntent::DeleteNode { node_id: gone });
    }

    let doc = open_doc(dir.path());
    assert_eq!(doc.graph.node_count(), 1);
    assert!(doc.graph.contains_node(root));
    assert!(!doc.graph.contains_node(gone));
    assert_eq!(doc.graph.edge_count(), 0);
}

#[test]
fn undo_rebases_the_store_on_the_restored_state() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut doc = open_doc(dir.path());
        doc.apply_intent(DocumentIntent::CreateNode {
            content: text("kept"),
            position: Point2D::new(0.0, 0.0),
        });
        doc.apply_intent(DocumentIntent::CreateNode {
            content: text("undone"),
            position: Point2D::new(60.0, 0.0),
        });
        doc.apply_intent(DocumentIntent::Undo);
    }

    let doc = open_doc(dir.path());
    assert_eq!(doc.graph.node_count(), 1);
}

#[test]
fn named_maps_store_independent_documents() {
    let dir = tempfile::tempdir().unwrap();
    let mut doc = open_doc(dir.path());
    doc.apply_intent(DocumentIntent::SetTitle { title: "Inner map".to_string() });
    doc.apply_intent(DocumentIntent::CreateNode {
        content: text("inner"),
        position: Point2D::new(0.0, 0.0),
    });
    assert!(doc.save_named("submap-1"));

    doc.apply_intent(DocumentIntent::SetTitle { title: "Outer map".to_string() });
    doc.apply_intent(DocumentIntent::CreateNode {
        content: text("outer"),
        position: Point2D::new(10.0, 10.0),
    });
    assert_eq!(doc.graph.node_count(), 2);

    assert_eq!(doc.list_named(), vec!["submap-1".to_string()]);
    assert!(doc.load_named("submap-1"));
    assert_eq!(doc.title, "Inner map");
    assert_eq!(doc.graph.node_count(), 1);
    assert!(!doc.can_undo());
}

#[test]
fn collapse_state_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let (parent, child);
    {
        let mut doc = open_doc(dir.path());
        doc.apply_intent(DocumentIntent::CreateNode {
            content: text("parent"),
            position: Point2D::new(0.0, 0.0),
        });
        parent = doc.selection.primary().unwrap();
        doc.apply_intent(DocumentIntent::CreateNode {
            content: text("child"),
            position: Point2D::new(40.0, 0.0),
        });
        child = doc.selection.primary().unwrap();
        doc.apply_intent(DocumentIntent::ConnectNodes { source: parent, target: child });
        doc.apply_intent(DocumentIntent::ToggleCollapsed { node_id: parent });
        doc.apply_intent(DocumentIntent::Save);
    }

    let doc = open_doc(dir.path());
    assert!(doc.collapsed.contains(&parent));
    assert!(doc.hidden_nodes().contains(&child));
}

#[test]
fn cut_and_paste_roundtrip_persists() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut doc = open_doc(dir.path());
        doc.apply_intent(DocumentIntent::CreateNode {
            content: text("root"),
            position: Point2D::new(0.0, 0.0),
        });
        doc.apply_intent(DocumentIntent::CreateNode {
            content: text("moved"),
            position: Point2D::new(100.0, 0.0),
        });
        let moved = doc.selection.primary().unwrap();
        doc.apply_intent(DocumentIntent::UpdateSelection {
            node_ids: vec![moved],
            mode: SelectionUpdateMode::Replace,
        });
        doc.apply_intent(DocumentIntent::Cut);
        doc.apply_intent(DocumentIntent::Paste { cursor_screen: Point2D::new(300.0, 300.0) });
    }

    let doc = open_doc(dir.path());
    assert_eq!(doc.graph.node_count(), 2);
}
