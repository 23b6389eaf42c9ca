/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Ancestry traversal and collapse-driven hiding on branching and
//! cyclic graphs.

use mindweave::DocumentIntent;

use crate::common::{build_doc, connect};

#[test]
fn collapse_hides_the_whole_transitive_subtree() {
    let (mut doc, ids) = build_doc(&["root", "a", "b", "c", "d"]);
    connect(&mut doc, ids[0], ids[1]);
    connect(&mut doc, ids[1], ids[2]);
    connect(&mut doc, ids[1], ids[3]);
    connect(&mut doc, ids[3], ids[4]);

    doc.apply_intent(DocumentIntent::ToggleCollapsed { node_id: ids[1] });

    let hidden = doc.hidden_nodes();
    assert_eq!(hidden.len(), 3);
    assert!(hidden.contains(&ids[2]));
    assert!(hidden.contains(&ids[3]));
    assert!(hidden.contains(&ids[4]));
    // The collapsed node itself stays visible.
    assert!(!hidden.contains(&ids[1]));
}

#[test]
fn nested_collapse_sets_union_without_double_counting() {
    let (mut doc, ids) = build_doc(&["root", "a", "b", "c"]);
    connect(&mut doc, ids[0], ids[1]);
    connect(&mut doc, ids[1], ids[2]);
    connect(&mut doc, ids[2], ids[3]);

    doc.apply_intent(DocumentIntent::ToggleCollapsed { node_id: ids[0] });
    doc.apply_intent(DocumentIntent::ToggleCollapsed { node_id: ids[2] });

    let hidden = doc.hidden_nodes();
    assert_eq!(hidden.len(), 3);
    assert!(!hidden.contains(&ids[0]));
}

#[test]
fn two_node_cycle_traversal_is_finite() {
    let (mut doc, ids) = build_doc(&["root", "a"]);
    connect(&mut doc, ids[0], ids[1]);
    connect(&mut doc, ids[1], ids[0]);

    assert_eq!(doc.graph.descendants(ids[0]), vec![ids[1]]);
    assert_eq!(doc.graph.ancestors(ids[0]), vec![ids[1]]);
}

#[test]
fn traversal_terminates_on_cycles() {
    let (mut doc, ids) = build_doc(&["root", "a", "b"]);
    connect(&mut doc, ids[0], ids[1]);
    connect(&mut doc, ids[1], ids[2]);
    // Close the loop.
    connect(&mut doc, ids[2], ids[0]);

    let descendants = doc.graph.descendants(ids[0]);
    assert_eq!(descendants.len(), 2);

    let ancestors = doc.graph.ancestors(ids[0]);
    assert_eq!(ancestors.len(), 2);

    doc.apply_intent(DocumentIntent::ToggleCollapsed { node_id: ids[0] });
    // Within a cycle the start node is reachable from itself, but it is
    // never hidden by its own collapse.
    let hidden = doc.hidden_nodes();
    assert!(hidden.contains(&ids[1]));
    assert!(hidden.contains(&ids[2]));
}

#[test]
fn deleting_a_collapsed_branch_clears_its_collapse_entry() {
    let (mut doc, ids) = build_doc(&["root", "branch", "leaf"]);
    connect(&mut doc, ids[1], ids[2]);
    doc.apply_intent(DocumentIntent::ToggleCollapsed { node_id: ids[1] });
    assert!(!doc.hidden_nodes().is_empty());

    doc.apply_intent(DocumentIntent::DeleteNode { node_id: ids[1] });
    assert!(doc.hidden_nodes().is_empty());
    assert!(!doc.collapsed.contains(&ids[1]));
}
