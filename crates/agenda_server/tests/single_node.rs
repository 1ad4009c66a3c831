//! Single node behaviour over real TCP connections.

use agenda_protocol::{
    encode, read_message, write_frame, Response, Snapshot, SyncMessage, DEFAULT_MAX_FRAME_LEN,
};
use agenda_testkit::prelude::*;
use std::collections::BTreeMap;
use tokio::net::TcpStream;

fn snapshot(pairs: &[(&str, &str)]) -> Snapshot {
    pairs
        .iter()
        .map(|(n, p)| (n.to_string(), p.to_string()))
        .collect()
}

#[tokio::test]
async fn add_then_view() {
    let node = TestNode::start().await;
    let mut client = node.client().await;

    let response = client.add("bob", "555-1").await.unwrap();
    assert_eq!(response, Response::success("contact bob added successfully"));
    assert_eq!(client.view().await.unwrap(), snapshot(&[("bob", "555-1")]));

    node.stop().await;
}

#[tokio::test]
async fn duplicate_add_is_rejected() {
    let node = TestNode::start().await;
    let mut client = node.client().await;

    client.add("bob", "555-1").await.unwrap();
    let response = client.add("bob", "555-9").await.unwrap();
    assert!(matches!(response, Response::Error(ref text) if text.contains("already exists")));
    assert_eq!(client.view().await.unwrap(), snapshot(&[("bob", "555-1")]));

    node.stop().await;
}

#[tokio::test]
async fn remove_missing_on_empty_store() {
    let node = TestNode::start().await;
    let mut client = node.client().await;

    let response = client.remove("ghost").await.unwrap();
    assert!(matches!(response, Response::Error(ref text) if text.contains("not found")));
    assert_eq!(
        client.request(&SyncMessage::view()).await.unwrap(),
        Response::Empty
    );

    node.stop().await;
}

#[tokio::test]
async fn update_and_remove_lifecycle() {
    let node = TestNode::start().await;
    let mut client = node.client().await;

    assert!(!client.update("alice", "1").await.unwrap().is_success());
    client.add("alice", "1").await.unwrap();
    assert_eq!(
        client.update("alice", "2").await.unwrap(),
        Response::success("contact alice updated successfully")
    );
    assert_eq!(client.view().await.unwrap(), snapshot(&[("alice", "2")]));
    assert_eq!(
        client.remove("alice").await.unwrap(),
        Response::success("contact alice removed successfully")
    );
    assert!(client.view().await.unwrap().is_empty());

    node.stop().await;
}

#[tokio::test]
async fn malformed_payload_keeps_connection_open() {
    let node = TestNode::start().await;
    let mut stream = TcpStream::connect(node.client_addr()).await.unwrap();

    write_frame(&mut stream, &[0xff, 0x00, 0x13], DEFAULT_MAX_FRAME_LEN)
        .await
        .unwrap();
    let response: Response = read_message(&mut stream, DEFAULT_MAX_FRAME_LEN)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(response, Response::Error(_)));

    let payload = encode(&SyncMessage::add("bob", "555-1")).unwrap();
    write_frame(&mut stream, &payload, DEFAULT_MAX_FRAME_LEN)
        .await
        .unwrap();
    let response: Response = read_message(&mut stream, DEFAULT_MAX_FRAME_LEN)
        .await
        .unwrap()
        .unwrap();
    assert!(response.is_success());

    node.stop().await;
}

#[tokio::test]
async fn fetch_snapshot_on_client_port_is_an_error() {
    let node = TestNode::start().await;
    let mut client = node.client().await;

    let response = client.request(&SyncMessage::fetch_snapshot()).await.unwrap();
    assert!(matches!(response, Response::Error(_)));
    // The connection is still usable.
    assert!(client.add("bob", "1").await.unwrap().is_success());

    node.stop().await;
}

#[tokio::test]
async fn unsupported_version_is_an_error() {
    let node = TestNode::start().await;
    let mut client = node.client().await;

    let mut request = SyncMessage::add("bob", "1");
    request.version = 2;
    let response = client.request(&request).await.unwrap();
    assert!(matches!(response, Response::Error(_)));
    assert!(node.store().is_empty());

    node.stop().await;
}

#[tokio::test]
async fn concurrent_clients_see_one_winner_per_name() {
    let node = TestNode::start().await;
    let addr = node.client_addr();

    let mut tasks = Vec::new();
    for i in 0..16 {
        tasks.push(tokio::spawn(async move {
            let mut client = agenda_server::Client::connect(addr).await.unwrap();
            client
                .add(&format!("name-{}", i % 4), &format!("phone-{i}"))
                .await
                .unwrap()
        }));
    }

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap().is_success() {
            successes += 1;
        }
    }
    assert_eq!(successes, 4);
    assert_eq!(node.store().len(), 4);

    node.stop().await;
}

#[tokio::test]
async fn view_matches_cumulative_effect() {
    let node = TestNode::start().await;
    let mut client = node.client().await;
    let mut model = BTreeMap::new();

    let script = [
        SyncMessage::add("a", "1"),
        SyncMessage::add("b", "2"),
        SyncMessage::add("a", "3"),
        SyncMessage::update("b", "4"),
        SyncMessage::remove("c"),
        SyncMessage::remove("a"),
        SyncMessage::update("a", "5"),
    ];
    for request in &script {
        let ok = client.request(request).await.unwrap().is_success();
        let name = request.name.clone().unwrap();
        let expected_ok = match request.action {
            agenda_protocol::Action::Add => !model.contains_key(&name),
            _ => model.contains_key(&name),
        };
        assert_eq!(ok, expected_ok, "{request:?}");
        if ok {
            match request.action {
                agenda_protocol::Action::Remove => {
                    model.remove(&name);
                }
                _ => {
                    model.insert(name, request.phone.clone().unwrap());
                }
            }
        }
    }
    assert_eq!(client.view().await.unwrap(), model);

    node.stop().await;
}
