// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session services: browse, read, write, node management, value
//! propagation and shutdown behaviour.

mod common;

use std::time::Duration;

use common::{sid, start, Model, ModelFixtures};
use trellis_config::ServerConfig;
use trellis_core::Value;
use trellis_opcua::{AddNodesItem, ModelChangeVerb, NodeKind, StatusCode, SynchronizationEngine};

// =============================================================================
// Browse / Read / Write
// =============================================================================

#[tokio::test]
async fn test_browse_root_folder() {
    let (engine, model) = start(ModelFixtures::config()).await;
    model.add_people(&model.root, "People", &["P0"]);
    let session = engine.open_session().unwrap();

    let references = session.browse(&sid("Root")).unwrap();
    let names: Vec<_> = references.iter().map(|r| r.browse_name.name.as_str()).collect();
    assert!(names.contains(&"Name"));
    assert!(names.contains(&"Members"));
    assert!(names.contains(&"Roles"));
    assert!(names.contains(&"People[0]"));

    let name = references.iter().find(|r| r.browse_name.name == "Name").unwrap();
    assert_eq!(name.node_class, NodeKind::Variable);
    let members = references.iter().find(|r| r.browse_name.name == "Members").unwrap();
    assert_eq!(members.node_class, NodeKind::Folder);

    let err = session.browse(&sid("Nowhere")).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_NODE_ID_UNKNOWN);
}

#[tokio::test]
async fn test_read_errors() {
    let (engine, _model) = start(ModelFixtures::config()).await;
    let session = engine.open_session().unwrap();

    let value = session.read(&sid("Root.Name")).unwrap();
    assert_eq!(value.value, Value::from("Alpha"));
    assert_eq!(value.status, StatusCode::GOOD);

    let err = session.read(&sid("Root.Members")).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_NOT_READABLE);
    let err = session.read(&sid("Root.Missing")).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_NODE_ID_UNKNOWN);
}

#[tokio::test]
async fn test_write_forwards_to_graph() {
    let (engine, model) = start(ModelFixtures::config()).await;
    let session = engine.open_session().unwrap();
    let mut data = session.subscribe_data_changes().unwrap();

    session.write(&sid("Root.Name"), Value::from("Beta")).unwrap();

    assert_eq!(model.root.value("Name").unwrap(), Value::from("Beta"));
    assert_eq!(session.read(&sid("Root.Name")).unwrap().value, Value::from("Beta"));
    let change = data.try_recv().unwrap();
    assert_eq!(change.node_id, sid("Root.Name"));
    assert_eq!(change.value.value, Value::from("Beta"));
    // The graph's own change event is not echoed back.
    assert!(data.try_recv().is_err());
}

#[tokio::test]
async fn test_write_rejections() {
    let (engine, model) = start(ModelFixtures::config()).await;
    model.add_people(&model.root, "Members", &["Ada"]);
    let session = engine.open_session().unwrap();

    let err = session.write(&sid("Root.Name"), Value::Int32(5)).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_TYPE_MISMATCH);
    assert_eq!(model.root.value("Name").unwrap(), Value::from("Alpha"));

    let err = session
        .write(&sid("Root.Members[0].Age"), Value::Int32(31))
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_NOT_WRITABLE);

    let err = session.write(&sid("Root.Members"), Value::from("x")).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_NOT_WRITABLE);

    let err = session.write(&sid("Root.Gone"), Value::from("x")).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_NODE_ID_UNKNOWN);
}

// =============================================================================
// Node management
// =============================================================================

#[tokio::test]
async fn test_add_nodes_into_collections() {
    let (engine, model) = start(ModelFixtures::managed_config()).await;
    model.add_people(&model.root, "People", &["P0", "P1", "P2", "P3"]);
    let session = engine.open_session().unwrap();

    let results = session
        .add_nodes(&[
            AddNodesItem::new(sid("Root"), "People[4]", "Person"),
            AddNodesItem::new(sid("Root"), "People[6]", "Person"),
            AddNodesItem::new(sid("Root.Members"), "Anyone", "Person"),
        ])
        .unwrap();

    assert_eq!(results[0].status_code, StatusCode::GOOD);
    assert_eq!(results[0].added_node_id, Some(sid("Root.People[4]")));
    assert_eq!(results[1].status_code, StatusCode::BAD_REFERENCE_NOT_ALLOWED);
    assert_eq!(results[1].added_node_id, None);
    assert_eq!(results[2].status_code, StatusCode::GOOD);
    assert_eq!(results[2].added_node_id, Some(sid("Root.Members[0]")));

    assert_eq!(model.root.child_count("People").unwrap(), 5);
    assert_eq!(model.root.child_count("Members").unwrap(), 1);
    assert!(engine.address_space().contains(&sid("Root.People[4].FirstName")));
}

#[tokio::test]
async fn test_add_nodes_reference_and_dictionary() {
    let (engine, model) = start(ModelFixtures::managed_config()).await;
    let session = engine.open_session().unwrap();

    let results = session
        .add_nodes(&[
            AddNodesItem::new(sid("Root"), "Lead", "Person"),
            AddNodesItem::new(sid("Root"), "Lead", "Person"),
            AddNodesItem::new(sid("Root.Roles"), "ops", "Person"),
            AddNodesItem::new(sid("Root.Roles"), "ops", "Person"),
        ])
        .unwrap();
    let codes: Vec<_> = results.iter().map(|r| r.status_code).collect();
    assert_eq!(
        codes,
        vec![
            StatusCode::GOOD,
            StatusCode::BAD_REFERENCE_NOT_ALLOWED,
            StatusCode::GOOD,
            StatusCode::BAD_REFERENCE_NOT_ALLOWED,
        ]
    );
    assert_eq!(results[0].added_node_id, Some(sid("Root.Lead")));
    assert_eq!(results[2].added_node_id, Some(sid("Root.Roles[ops]")));
    assert!(model.root.reference("Lead").unwrap().is_some());
}

#[tokio::test]
async fn test_add_nodes_on_subject_node() {
    let (engine, model) = start(ModelFixtures::managed_config()).await;
    let session = engine.open_session().unwrap();

    let results = session
        .add_nodes(&[
            AddNodesItem::new(sid("Root"), "ops", "Person"),
            AddNodesItem::new(sid("Root"), "Members[0]", "Person"),
            AddNodesItem::new(sid("Root"), "Members[3]", "Person"),
            AddNodesItem::new(sid("Root"), "ops", "Person"),
        ])
        .unwrap();
    let codes: Vec<_> = results.iter().map(|r| r.status_code).collect();
    assert_eq!(
        codes,
        vec![
            StatusCode::GOOD,
            StatusCode::GOOD,
            StatusCode::BAD_REFERENCE_NOT_ALLOWED,
            StatusCode::BAD_REFERENCE_NOT_ALLOWED,
        ]
    );
    assert_eq!(results[0].added_node_id, Some(sid("Root.Roles[ops]")));
    assert_eq!(results[1].added_node_id, Some(sid("Root.Members[0]")));
    assert_eq!(model.root.dictionary("Roles").unwrap().len(), 1);
    assert_eq!(model.root.child_count("Members").unwrap(), 1);
}

#[tokio::test]
async fn test_add_nodes_rejections() {
    let (engine, _model) = start(ModelFixtures::managed_config()).await;
    let session = engine.open_session().unwrap();

    let results = session
        .add_nodes(&[
            AddNodesItem::new(sid("Root"), "X", "Dragon"),
            AddNodesItem::new(sid("Root.Name"), "X", "Person"),
            AddNodesItem::new(sid("Root.Members"), "X", "Robot"),
            AddNodesItem::new(sid("Root"), "Members[0]", "Robot"),
        ])
        .unwrap();
    let codes: Vec<_> = results.iter().map(|r| r.status_code).collect();
    assert_eq!(
        codes,
        vec![
            StatusCode::BAD_TYPE_DEFINITION_INVALID,
            StatusCode::BAD_PARENT_NODE_ID_INVALID,
            StatusCode::BAD_TYPE_MISMATCH,
            StatusCode::BAD_REFERENCE_NOT_ALLOWED,
        ]
    );
}

#[tokio::test]
async fn test_node_management_disabled() {
    let (engine, model) = start(ModelFixtures::config()).await;
    model.add_people(&model.root, "Members", &["Ada"]);
    let session = engine.open_session().unwrap();

    let results = session
        .add_nodes(&[AddNodesItem::new(sid("Root.Members"), "X", "Person")])
        .unwrap();
    assert_eq!(results[0].status_code, StatusCode::BAD_SERVICE_UNSUPPORTED);
    let codes = session.delete_nodes(&[sid("Root.Members[0]")]).unwrap();
    assert_eq!(codes, vec![StatusCode::BAD_SERVICE_UNSUPPORTED]);
    assert_eq!(model.root.child_count("Members").unwrap(), 1);
}

#[tokio::test]
async fn test_node_management_without_registry() {
    let model = Model::new();
    let engine = SynchronizationEngine::new(ModelFixtures::managed_config(), model.context.clone());
    engine.start(model.root.clone()).await.unwrap();
    let session = engine.open_session().unwrap();

    for _ in 0..2 {
        let results = session
            .add_nodes(&[AddNodesItem::new(sid("Root.Members"), "X", "Person")])
            .unwrap();
        assert_eq!(results[0].status_code, StatusCode::BAD_SERVICE_UNSUPPORTED);
    }
}

#[tokio::test]
async fn test_delete_nodes() {
    let (engine, model) = start(ModelFixtures::managed_config()).await;
    let ctx = &model.context;
    let kids = model.add_people(&model.root, "Members", &["C0", "C1", "C2"]);
    ctx.insert_key(&model.root, "Roles", "c1", kids[1].clone()).unwrap();
    let session = engine.open_session().unwrap();
    let mut changes = session.subscribe_model_changes().unwrap();

    let codes = session
        .delete_nodes(&[sid("Root.Members[1]"), sid("Root"), sid("Root.Name"), sid("Root.Nope")])
        .unwrap();
    assert_eq!(
        codes,
        vec![
            StatusCode::GOOD,
            StatusCode::BAD_SERVICE_UNSUPPORTED,
            StatusCode::BAD_NODE_ID_UNKNOWN,
            StatusCode::BAD_NODE_ID_UNKNOWN,
        ]
    );

    // Every slot holding the subject is cleared.
    assert_eq!(engine.ref_count(kids[1].id()), 0);
    assert_eq!(model.root.child_count("Members").unwrap(), 2);
    assert!(model.root.dictionary("Roles").unwrap().is_empty());
    assert_eq!(engine.node_id_of(kids[2].id()), Some(sid("Root.Members[1]")));

    let mut deleted = false;
    while let Ok(batch) = changes.try_recv() {
        deleted |= batch.changes.iter().any(|c| c.verb.contains(ModelChangeVerb::NODE_DELETED));
    }
    assert!(deleted);
}

// =============================================================================
// Values
// =============================================================================

#[tokio::test]
async fn test_immediate_value_propagation() {
    let (engine, model) = start(ModelFixtures::config()).await;
    model.context.set_value(&model.root, "Name", "Gamma").unwrap();
    assert_eq!(engine.pending_values(), 0);

    let session = engine.open_session().unwrap();
    assert_eq!(session.read(&sid("Root.Name")).unwrap().value, Value::from("Gamma"));
}

#[tokio::test(start_paused = true)]
async fn test_buffered_values_flush_on_interval() {
    let config = ServerConfig {
        buffer_time_ms: 100,
        ..ModelFixtures::config()
    };
    let (engine, model) = start(config).await;
    let member = model.add_people(&model.root, "Members", &["Ada"]).remove(0);
    let session = engine.open_session().unwrap();

    for name in ["B", "C", "D"] {
        model.context.set_value(&model.root, "Name", name).unwrap();
    }
    model.context.set_value(&member, "FirstName", "Ann").unwrap();
    assert_eq!(engine.pending_values(), 2);
    assert_eq!(session.read(&sid("Root.Name")).unwrap().value, Value::from("Alpha"));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(engine.pending_values(), 0);
    assert_eq!(session.read(&sid("Root.Name")).unwrap().value, Value::from("D"));
    assert_eq!(
        session.read(&sid("Root.Members[0].FirstName")).unwrap().value,
        Value::from("Ann")
    );

    // Protocol writes apply at once and are not buffered again.
    session.write(&sid("Root.Name"), Value::from("E")).unwrap();
    assert_eq!(engine.pending_values(), 0);
    assert_eq!(session.read(&sid("Root.Name")).unwrap().value, Value::from("E"));
}

#[tokio::test(start_paused = true)]
async fn test_protocol_write_supersedes_buffered_value() {
    let config = ServerConfig {
        buffer_time_ms: 100,
        ..ModelFixtures::config()
    };
    let (engine, model) = start(config).await;
    let session = engine.open_session().unwrap();

    model.context.set_value(&model.root, "Name", "Local").unwrap();
    assert_eq!(engine.pending_values(), 1);
    session.write(&sid("Root.Name"), Value::from("Remote")).unwrap();
    assert_eq!(engine.pending_values(), 0);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(session.read(&sid("Root.Name")).unwrap().value, Value::from("Remote"));
    assert_eq!(model.root.value("Name").unwrap(), Value::from("Remote"));
}

#[tokio::test(start_paused = true)]
async fn test_buffered_value_of_removed_node_is_dropped() {
    let config = ServerConfig {
        buffer_time_ms: 100,
        ..ModelFixtures::config()
    };
    let (engine, model) = start(config).await;
    let member = model.add_people(&model.root, "Members", &["Ada"]).remove(0);
    let mut data = engine.subscribe_data_changes();

    model.context.set_value(&member, "FirstName", "Gone").unwrap();
    model.context.remove_at(&model.root, "Members", 0).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(engine.pending_values(), 0);
    assert!(data.try_recv().is_err());
}

// =============================================================================
// Sessions and shutdown
// =============================================================================

#[tokio::test]
async fn test_session_limit() {
    let config = ServerConfig {
        max_sessions: 2,
        ..ModelFixtures::config()
    };
    let (engine, _model) = start(config).await;

    let first = engine.open_session().unwrap();
    let second = engine.open_session().unwrap();
    let err = engine.open_session().unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_TOO_MANY_SESSIONS);
    assert_ne!(first.id(), second.id());

    drop(first);
    assert_eq!(engine.session_count(), 1);
    let third = engine.open_session().unwrap();

    third.close();
    let err = third.read(&sid("Root.Name")).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_SESSION_CLOSED);
    assert_eq!(engine.session_count(), 1);
}

#[tokio::test]
async fn test_shutdown_refuses_sessions_and_clears_state() {
    let (engine, model) = start(ModelFixtures::config()).await;
    model.add_people(&model.root, "Members", &["Ada"]);
    let session = engine.open_session().unwrap();

    engine.shutdown().await;

    assert!(!engine.is_running());
    assert_eq!(model.context.listener_count(), 0);
    assert_eq!(engine.subject_count(), 0);
    assert_eq!(engine.address_space().count_in_namespace(common::NS), 0);
    let err = session.read(&sid("Root.Name")).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_SHUTDOWN);
    let err = engine.open_session().unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_SHUTDOWN);

    // Graph changes after shutdown are not mirrored.
    model.add_people(&model.root, "Members", &["Ben"]);
    assert_eq!(engine.address_space().count_in_namespace(common::NS), 0);

    // A second shutdown is harmless and a restart rebuilds everything.
    engine.shutdown().await;
    engine.start(model.root.clone()).await.unwrap();
    assert!(engine.address_space().contains(&sid("Root.Members[1].FirstName")));
}
