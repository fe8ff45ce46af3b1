use super::{mock_node::MockNode, test_config, wait_until};
use crate::{Connection, RemoteState, SocketState, SubscriptionKind};
use serde_json::json;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;

fn active_id(connection: &Connection, kind: SubscriptionKind, id: u64) -> Option<u64> {
    match connection.subscriptions().remote_state(kind, id) {
        Some(RemoteState::Active(server_id)) => Some(server_id),
        _ => None,
    }
}

#[tokio::test]
async fn test_account_subscription_lifecycle() {
    let node = MockNode::start().await;
    let connection = Connection::with_config(&node.http_url, test_config(&node.ws_url)).unwrap();
    let owner = Pubkey::new_unique();
    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();

    let id = connection.on_account_change(&Pubkey::new_unique(), None, move |update| {
        let _ = updates_tx.send(update);
    });
    wait_until(|| active_id(&connection, SubscriptionKind::Account, id).is_some()).await;
    let server_id = active_id(&connection, SubscriptionKind::Account, id).unwrap();

    node.notify(
        "accountNotification",
        server_id,
        json!({
            "context": {"slot": 90},
            "value": {
                "lamports": 123,
                "owner": owner.to_string(),
                "data": ["AQID", "base64"],
                "executable": false,
                "rentEpoch": 0
            }
        }),
    );

    let update = tokio::time::timeout(Duration::from_secs(4), updates_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.context.slot, 90);
    assert_eq!(update.value.lamports, 123);
    assert_eq!(update.value.owner, owner);
    assert_eq!(update.value.data, vec![1, 2, 3]);

    connection.remove_account_change_listener(id).await.unwrap();
    assert_eq!(node.state.ws_count("accountUnsubscribe"), 1);

    // Idle teardown
    wait_until(|| node.state.ws_open.load(Ordering::SeqCst) == 0).await;
    assert_eq!(connection.subscriptions().socket_state(), SocketState::Disconnected);
}

#[tokio::test]
async fn test_signature_subscription_fires_once() {
    let node = MockNode::start().await;
    let connection = Connection::with_config(&node.http_url, test_config(&node.ws_url)).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = fired.clone();
    let id = connection.on_signature(&Signature::from([9u8; 64]), None, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    wait_until(|| active_id(&connection, SubscriptionKind::Signature, id).is_some()).await;
    let server_id = active_id(&connection, SubscriptionKind::Signature, id).unwrap();

    let result = json!({"context": {"slot": 5}, "value": {"err": null}});
    node.notify("signatureNotification", server_id, result.clone());
    wait_until(|| fired.load(Ordering::SeqCst) == 1).await;

    node.notify("signatureNotification", server_id, result);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(connection.subscriptions().subscription_count(SubscriptionKind::Signature), 0);
    assert_eq!(node.state.ws_count("signatureUnsubscribe"), 0);
    assert!(connection.remove_signature_listener(id).await.is_err());
}

#[tokio::test]
async fn test_resubscribes_after_drop() {
    let node = MockNode::start().await;
    let connection = Connection::with_config(&node.http_url, test_config(&node.ws_url)).unwrap();
    let slots = Arc::new(AtomicUsize::new(0));

    let counter = slots.clone();
    let id = connection.on_slot_change(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    wait_until(|| active_id(&connection, SubscriptionKind::Slot, id).is_some()).await;
    let first_server_id = active_id(&connection, SubscriptionKind::Slot, id).unwrap();

    node.kick();
    wait_until(|| {
        node.state.ws_accepted.load(Ordering::SeqCst) == 2
            && matches!(active_id(&connection, SubscriptionKind::Slot, id), Some(server_id) if server_id != first_server_id)
    })
    .await;
    assert_eq!(node.state.ws_count("slotSubscribe"), 2);

    let server_id = active_id(&connection, SubscriptionKind::Slot, id).unwrap();
    node.notify("slotNotification", first_server_id, json!({"parent": 1, "slot": 2, "root": 0}));
    node.notify("slotNotification", server_id, json!({"parent": 2, "slot": 3, "root": 0}));
    wait_until(|| slots.load(Ordering::SeqCst) == 1).await;

    connection.remove_slot_change_listener(id).await.unwrap();
    assert_eq!(node.state.ws_count("slotUnsubscribe"), 1);
}

#[tokio::test]
async fn test_program_subscription_params() {
    let node = MockNode::start().await;
    let connection = Connection::with_config(&node.http_url, test_config(&node.ws_url)).unwrap();
    let program_id = Pubkey::new_unique();

    let id = connection.on_program_account_change(&program_id, None, |_| {});
    wait_until(|| active_id(&connection, SubscriptionKind::Program, id).is_some()).await;
    assert_eq!(node.state.ws_count("programSubscribe"), 1);

    // Reusing a removed id fails
    connection.remove_program_account_change_listener(id).await.unwrap();
    assert!(connection.remove_program_account_change_listener(id).await.is_err());
}
