//! Contract checks every adapter must pass. Adapter test modules call
//! [`run_all`] with a fresh, empty instance.

use serde_json::json;

use keystone_core::{
    EdgeFilter, KeystoneError, NewEdge, NewNode, NodeId, NodeQuery, OrgId, PropFilter, Props,
    TypeFilter,
};

use super::BackendAdapter;

fn props(value: serde_json::Value) -> Props {
    value.as_object().cloned().unwrap_or_default()
}

fn draft(id: &str, type_name: &str, owner: &str, value: serde_json::Value) -> NewNode {
    NewNode {
        id: Some(NodeId::from(id)),
        type_name: type_name.into(),
        owner_id: OrgId::from(owner),
        properties: props(value),
    }
}

fn link(source: &str, target: &str, role: &str) -> NewEdge {
    NewEdge {
        source_id: NodeId::from(source),
        target_id: NodeId::from(target),
        role: role.into(),
        owner_id: OrgId::from("o-1"),
        created_by: None,
    }
}

pub(crate) async fn run_all(backend: &dyn BackendAdapter) {
    nodes_round_trip(backend).await;
    queries_are_owner_scoped(backend).await;
    edges_are_idempotent_and_ordered(backend).await;
    delete_node_severs_edges(backend).await;
}

async fn nodes_round_trip(backend: &dyn BackendAdapter) {
    let created = backend
        .create_node(draft("rt-1", "Doc", "o-1", json!({"title": "a", "n": 1})))
        .await
        .unwrap();
    assert_eq!(created.id, NodeId::from("rt-1"));

    let fetched = backend.get_node(&created.id, None).await.unwrap().unwrap();
    assert_eq!(fetched.properties, created.properties);
    assert_eq!(fetched.sort_value, created.sort_value);

    assert!(backend
        .get_node(&created.id, Some(&OrgId::from("o-2")))
        .await
        .unwrap()
        .is_none());

    let dup = backend
        .create_node(draft("rt-1", "Doc", "o-1", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(dup, KeystoneError::InvalidArgument(_)));

    let updated = backend
        .update_node(&created.id, props(json!({"title": "b"})))
        .await
        .unwrap();
    assert_eq!(updated.property("title"), Some(&json!("b")));
    assert_eq!(updated.property("n"), None);
    assert!(updated.updated_at >= created.updated_at);
    assert_eq!(updated.owner_id, created.owner_id);

    let missing = backend
        .update_node(&NodeId::from("rt-missing"), Props::new())
        .await
        .unwrap_err();
    assert!(missing.is_not_found());

    backend.delete_node(&created.id).await.unwrap();
    assert!(backend.get_node(&created.id, None).await.unwrap().is_none());
}

async fn queries_are_owner_scoped(backend: &dyn BackendAdapter) {
    backend
        .create_node(draft("q-1", "Task", "o-1", json!({"status": "open"})))
        .await
        .unwrap();
    backend
        .create_node(draft("q-2", "Task", "o-2", json!({"status": "open"})))
        .await
        .unwrap();
    backend
        .create_node(draft("q-3", "Task", "o-1", json!({"status": "done"})))
        .await
        .unwrap();
    backend
        .create_node(draft("q-4", "Bug", "o-1", json!({"status": "open"})))
        .await
        .unwrap();

    let open = PropFilter::new().eq("status", "open");
    let scoped = backend
        .query_nodes(
            &NodeQuery::of_type("Task")
                .with_props(open.clone())
                .owned_by(Some(OrgId::from("o-1"))),
        )
        .await
        .unwrap();
    assert_eq!(scoped.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), vec!["q-1"]);

    let unscoped = backend
        .query_nodes(&NodeQuery::of_type("Task").with_props(open))
        .await
        .unwrap();
    assert_eq!(unscoped.len(), 2);

    let polymorphic = backend
        .query_nodes(
            &NodeQuery::of_type(TypeFilter::from(vec!["Task".to_string(), "Bug".to_string()]))
                .owned_by(Some(OrgId::from("o-1"))),
        )
        .await
        .unwrap();
    assert_eq!(
        polymorphic.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
        vec!["q-1", "q-3", "q-4"]
    );

    let by_ids = backend
        .query_nodes(
            &NodeQuery::of_type(TypeFilter::Any)
                .with_ids(vec![NodeId::from("q-4"), NodeId::from("q-2"), NodeId::from("nope")]),
        )
        .await
        .unwrap();
    assert_eq!(by_ids.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), vec!["q-2", "q-4"]);
}

async fn edges_are_idempotent_and_ordered(backend: &dyn BackendAdapter) {
    for id in ["e-a", "e-b", "e-c"] {
        backend
            .create_node(draft(id, "Doc", "o-1", json!({})))
            .await
            .unwrap();
    }
    let first = backend.create_edge(link("e-a", "e-b", "owns")).await.unwrap();
    let again = backend.create_edge(link("e-a", "e-b", "owns")).await.unwrap();
    assert_eq!(first.sort_value, again.sort_value);
    backend.create_edge(link("e-a", "e-b", "cites")).await.unwrap();
    backend.create_edge(link("e-a", "e-c", "owns")).await.unwrap();

    let out = backend
        .query_edges(&EdgeFilter::from_source(&NodeId::from("e-a")))
        .await
        .unwrap();
    assert_eq!(
        out.iter().map(|e| (e.target_id.as_str(), e.role.as_str())).collect::<Vec<_>>(),
        vec![("e-b", "owns"), ("e-b", "cites"), ("e-c", "owns")]
    );

    let owns_in = backend
        .query_edges(&EdgeFilter::to_target(&NodeId::from("e-b")).with_role(Some("owns")))
        .await
        .unwrap();
    assert_eq!(owns_in.len(), 1);

    let dangling = backend
        .create_edge(link("e-a", "e-missing", "owns"))
        .await
        .unwrap_err();
    assert!(dangling.is_not_found());

    backend
        .delete_edge(&NodeId::from("e-a"), &NodeId::from("e-b"), "cites")
        .await
        .unwrap();
    let err = backend
        .delete_edge(&NodeId::from("e-a"), &NodeId::from("e-b"), "cites")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

async fn delete_node_severs_edges(backend: &dyn BackendAdapter) {
    for id in ["d-a", "d-b", "d-c"] {
        backend
            .create_node(draft(id, "Doc", "o-1", json!({})))
            .await
            .unwrap();
    }
    backend.create_edge(link("d-a", "d-b", "owns")).await.unwrap();
    backend.create_edge(link("d-b", "d-c", "owns")).await.unwrap();
    backend.create_edge(link("d-a", "d-c", "owns")).await.unwrap();

    backend.delete_node(&NodeId::from("d-b")).await.unwrap();

    let from_a = backend
        .query_edges(&EdgeFilter::from_source(&NodeId::from("d-a")))
        .await
        .unwrap();
    assert_eq!(from_a.len(), 1);
    assert_eq!(from_a[0].target_id, NodeId::from("d-c"));
    let into_c = backend
        .query_edges(&EdgeFilter::to_target(&NodeId::from("d-c")))
        .await
        .unwrap();
    assert_eq!(into_c.len(), 1);

    let err = backend.delete_node(&NodeId::from("d-b")).await.unwrap_err();
    assert!(err.is_not_found());
}
