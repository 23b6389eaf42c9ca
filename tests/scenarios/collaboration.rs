/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Remote change application: echo suppression, redelivery tolerance,
//! and order independence between peers.

use mindweave::MindMapDocument;
use mindweave::collab::{ChangeAction, ChangeEntity, CollabSession, RemoteChange};
use serde_json::json;
use uuid::Uuid;

use crate::common::build_doc;

fn node_create(id: Uuid, label: &str, x: f32, y: f32, user: &str) -> RemoteChange {
    RemoteChange {
        id: id.to_string(),
        entity: ChangeEntity::Node,
        action: ChangeAction::Create,
        data: json!({
            "content": { "type": "text", "label": label },
            "position": { "x": x, "y": y },
        }),
        user_id: user.to_string(),
    }
}

fn node_update_position(id: Uuid, x: f32, y: f32, user: &str) -> RemoteChange {
    RemoteChange {
        id: id.to_string(),
        entity: ChangeEntity::Node,
        action: ChangeAction::Update,
        data: json!({ "position": { "x": x, "y": y } }),
        user_id: user.to_string(),
    }
}

fn node_delete(id: Uuid, user: &str) -> RemoteChange {
    RemoteChange {
        id: id.to_string(),
        entity: ChangeEntity::Node,
        action: ChangeAction::Delete,
        data: serde_json::Value::Null,
        user_id: user.to_string(),
    }
}

fn doc_with_session(user: &str) -> MindMapDocument {
    let mut doc = MindMapDocument::new();
    doc.attach_collab(CollabSession::new(user));
    doc
}

fn sync_with(doc: &mut MindMapDocument, changes: &[RemoteChange]) -> usize {
    let sender = doc.collab_sender().unwrap();
    for change in changes {
        sender.send(change.clone()).unwrap();
    }
    doc.sync_remote_changes()
}

#[test]
fn own_echoes_are_dropped_but_other_users_apply() {
    let mut doc = doc_with_session("alice");
    let mine = Uuid::new_v4();
    let theirs = Uuid::new_v4();

    let applied = sync_with(
        &mut doc,
        &[
            node_create(mine, "echo", 0.0, 0.0, "alice"),
            node_create(theirs, "real", 10.0, 10.0, "bob"),
        ],
    );

    assert_eq!(applied, 1);
    assert!(!doc.graph.contains_node(mine));
    assert!(doc.graph.contains_node(theirs));
}

#[test]
fn redelivered_batch_is_absorbed_without_duplicates() {
    let mut doc = doc_with_session("alice");
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let batch = vec![
        node_create(a, "a", 0.0, 0.0, "bob"),
        node_create(b, "b", 50.0, 0.0, "bob"),
        RemoteChange {
            id: format!("{a}-{b}"),
            entity: ChangeEntity::Edge,
            action: ChangeAction::Create,
            data: json!({ "source": a.to_string(), "target": b.to_string() }),
            user_id: "bob".to_string(),
        },
    ];

    assert_eq!(sync_with(&mut doc, &batch), 3);
    // The transport redelivers the whole batch.
    sync_with(&mut doc, &batch);

    assert_eq!(doc.graph.node_count(), 2);
    assert_eq!(doc.graph.edge_count(), 1);
}

#[test]
fn peers_converge_regardless_of_update_order() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let setup = vec![
        node_create(a, "a", 0.0, 0.0, "carol"),
        node_create(b, "b", 100.0, 0.0, "carol"),
    ];
    let update_a = node_update_position(a, 40.0, 40.0, "bob");
    let update_b = node_update_position(b, 140.0, 40.0, "dave");

    let mut left = doc_with_session("alice");
    sync_with(&mut left, &setup);
    sync_with(&mut left, &[update_a.clone(), update_b.clone()]);

    let mut right = doc_with_session("alice");
    sync_with(&mut right, &setup);
    sync_with(&mut right, &[update_b, update_a]);

    for id in [a, b] {
        assert_eq!(
            left.graph.get_node_by_id(id).unwrap().position,
            right.graph.get_node_by_id(id).unwrap().position,
        );
    }
}

#[test]
fn delete_then_update_redelivery_stays_deleted() {
    let mut doc = doc_with_session("alice");
    let a = Uuid::new_v4();
    sync_with(&mut doc, &[node_create(a, "a", 0.0, 0.0, "bob")]);

    // Out-of-order arrival: the delete lands before a stale update.
    sync_with(
        &mut doc,
        &[node_delete(a, "bob"), node_update_position(a, 99.0, 99.0, "carol")],
    );

    assert!(!doc.graph.contains_node(a));
}

#[test]
fn remote_edits_never_enter_local_history() {
    let (mut doc, _ids) = build_doc(&["root"]);
    doc.attach_collab(CollabSession::new("alice"));
    let history_before = doc.history().len();

    let a = Uuid::new_v4();
    sync_with(&mut doc, &[node_create(a, "remote", 5.0, 5.0, "bob")]);

    assert!(doc.graph.contains_node(a));
    assert_eq!(doc.history().len(), history_before);
    // And local undo cannot erase the remote node's creation entry,
    // only local edits around it.
    assert_eq!(doc.history().entries().len(), history_before);
}

#[test]
fn customization_update_applies_partially() {
    let mut doc = doc_with_session("alice");
    let change = RemoteChange {
        id: "customization".to_string(),
        entity: ChangeEntity::Customization,
        action: ChangeAction::Update,
        data: json!({ "background_color": "#202020" }),
        user_id: "bob".to_string(),
    };
    assert_eq!(sync_with(&mut doc, &[change]), 1);
    assert_eq!(doc.customization.background_color, Some("#202020".to_string()));
    assert_eq!(doc.customization.dot_color, None);
}

#[test]
fn wire_format_parses_from_raw_json() {
    let raw = r##"{
        "id": "customization",
        "type": "customization",
        "action": "update",
        "data": { "dot_color": "#ff00ff" },
        "user_id": "bob"
    }"##;
    let change: RemoteChange = serde_json::from_str(raw).unwrap();

    let mut doc = doc_with_session("alice");
    assert_eq!(sync_with(&mut doc, &[change]), 1);
    assert_eq!(doc.customization.dot_color, Some("#ff00ff".to_string()));
}
