//! End-to-end tests against an in-process node

mod subscriptions;

use crate::ConnectionConfig;
use std::time::Duration;

/// Config pointing at `ws_url` with fast reconnects and blockhash polls
pub(crate) fn test_config(ws_url: &str) -> ConnectionConfig {
    ConnectionConfig {
        ws_endpoint: Some(ws_url.to_string()),
        blockhash_poll_interval_ms: 1,
        reconnect_initial_ms: 10,
        reconnect_max_ms: 50,
        ..Default::default()
    }
}

pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 4s");
}
