/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Undo/redo walks, save points, and gesture batching across a full
//! editing session.

use euclid::default::Point2D;
use mindweave::DocumentIntent;
use mindweave::history::ActionKind;

use crate::common::{build_doc, connect};

#[test]
fn undo_walks_back_through_edits_in_exact_reverse() {
    let (mut doc, ids) = build_doc(&["root", "a"]);
    connect(&mut doc, ids[0], ids[1]);
    doc.apply_intent(DocumentIntent::SetTitle { title: "Session".to_string() });

    // Four entries: two creates, connect, title.
    assert_eq!(doc.history().len(), 4);

    doc.apply_intent(DocumentIntent::Undo);
    assert_eq!(doc.title, "");
    assert!(doc.graph.has_edge_between(ids[0], ids[1]));

    doc.apply_intent(DocumentIntent::Undo);
    assert!(!doc.graph.has_edge_between(ids[0], ids[1]));
    assert_eq!(doc.graph.node_count(), 2);

    doc.apply_intent(DocumentIntent::Undo);
    assert_eq!(doc.graph.node_count(), 1);

    doc.apply_intent(DocumentIntent::Undo);
    assert_eq!(doc.graph.node_count(), 0);
    assert!(!doc.can_undo());

    // Redo replays the same path forward.
    doc.apply_intent(DocumentIntent::Redo);
    doc.apply_intent(DocumentIntent::Redo);
    doc.apply_intent(DocumentIntent::Redo);
    doc.apply_intent(DocumentIntent::Redo);
    assert_eq!(doc.title, "Session");
    assert!(doc.graph.has_edge_between(ids[0], ids[1]));
    assert!(!doc.can_redo());
}

#[test]
fn new_edit_after_undo_discards_the_redo_branch() {
    let (mut doc, _ids) = build_doc(&["root"]);
    doc.apply_intent(DocumentIntent::SetTitle { title: "first".to_string() });
    doc.apply_intent(DocumentIntent::SetTitle { title: "second".to_string() });

    doc.apply_intent(DocumentIntent::Undo);
    assert!(doc.can_redo());

    doc.apply_intent(DocumentIntent::SetTitle { title: "divergent".to_string() });
    assert!(!doc.can_redo());
    doc.apply_intent(DocumentIntent::Redo);
    assert_eq!(doc.title, "divergent");
}

#[test]
fn save_point_floors_undo_and_tracks_unsaved_changes() {
    let (mut doc, _ids) = build_doc(&["root"]);
    doc.apply_intent(DocumentIntent::Save);
    assert!(!doc.has_unsaved_changes());
    assert!(!doc.can_undo());

    doc.apply_intent(DocumentIntent::SetTitle { title: "draft".to_string() });
    assert!(doc.has_unsaved_changes());
    assert!(doc.can_undo());

    doc.apply_intent(DocumentIntent::Undo);
    assert!(!doc.has_unsaved_changes());
    assert!(!doc.can_undo());
}

#[test]
fn whole_drag_session_is_one_undoable_step() {
    let (mut doc, ids) = build_doc(&["root", "leaf"]);
    connect(&mut doc, ids[0], ids[1]);
    let history_before = doc.history().len();

    doc.apply_intent(DocumentIntent::BeginDrag {
        node_ids: vec![ids[1]],
        with_children: false,
    });
    for step in 1..=25 {
        doc.apply_intent(DocumentIntent::DragMove {
            node_id: ids[1],
            position: Point2D::new(100.0 + step as f32 * 4.0, step as f32 * 2.0),
        });
    }
    doc.apply_intent(DocumentIntent::EndDrag);

    assert_eq!(doc.history().len(), history_before + 1);
    let entry = doc.history().entries().last().unwrap();
    assert_eq!(entry.kind, ActionKind::MoveNode);

    doc.apply_intent(DocumentIntent::Undo);
    assert_eq!(
        doc.graph.get_node_by_id(ids[1]).unwrap().position,
        Point2D::new(100.0, 0.0)
    );
}

#[test]
fn subtree_drag_moves_children_and_undoes_together() {
    let (mut doc, ids) = build_doc(&["root", "parent", "child"]);
    connect(&mut doc, ids[1], ids[2]);

    doc.apply_intent(DocumentIntent::BeginDrag {
        node_ids: vec![ids[1]],
        with_children: true,
    });
    doc.apply_intent(DocumentIntent::DragMove {
        node_id: ids[1],
        position: Point2D::new(150.0, 50.0),
    });
    doc.apply_intent(DocumentIntent::EndDrag);

    // Child followed the parent by the same delta.
    assert_eq!(
        doc.graph.get_node_by_id(ids[2]).unwrap().position,
        Point2D::new(250.0, 50.0)
    );

    doc.apply_intent(DocumentIntent::Undo);
    assert_eq!(
        doc.graph.get_node_by_id(ids[1]).unwrap().position,
        Point2D::new(100.0, 0.0)
    );
    assert_eq!(
        doc.graph.get_node_by_id(ids[2]).unwrap().position,
        Point2D::new(200.0, 0.0)
    );
}

#[test]
fn grouped_history_coalesces_consecutive_same_kind_runs() {
    let (mut doc, ids) = build_doc(&["root", "a", "b"]);
    doc.apply_intent(DocumentIntent::SetTitle { title: "one".to_string() });
    doc.apply_intent(DocumentIntent::SetTitle { title: "two".to_string() });
    connect(&mut doc, ids[0], ids[1]);

    let groups = doc.history().grouped();
    // Three creates, two title edits, one connect.
    assert_eq!(groups.len(), 3);
    assert_eq!(groups[0].kind, ActionKind::AddNode);
    assert_eq!(groups[0].len, 3);
    assert_eq!(groups[1].kind, ActionKind::UpdateTitle);
    assert_eq!(groups[1].len, 2);
    assert_eq!(groups[2].kind, ActionKind::ConnectNodes);
    assert_eq!(groups[2].len, 1);
}
