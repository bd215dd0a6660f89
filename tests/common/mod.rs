#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kin_client::{Client, Credential, CredentialStorage, MemoryCredentialStorage, NoticeSink};
use serde_json::{json, Value};
use tokio::sync::Notify;
use wiremock::MockServer;

/// Notice sink that records everything. Dialogs stay open until `release`
/// is called when the sink is gated, otherwise they close immediately.
#[derive(Default)]
pub struct RecordingSink {
    pub transients: Mutex<Vec<String>>,
    pub dialogs: AtomicUsize,
    gated: bool,
    release: Notify,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gated: true,
            ..Self::default()
        })
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn dialog_count(&self) -> usize {
        self.dialogs.load(Ordering::SeqCst)
    }

    pub fn transient_messages(&self) -> Vec<String> {
        self.transients.lock().unwrap().clone()
    }
}

#[async_trait]
impl NoticeSink for RecordingSink {
    fn show_transient(&self, message: &str) {
        self.transients.lock().unwrap().push(message.to_string());
    }

    async fn show_auth_dialog(&self, _title: &str, _message: &str) {
        self.dialogs.fetch_add(1, Ordering::SeqCst);
        if self.gated {
            self.release.notified().await;
        }
    }
}

/// Base URL the client uses against the mock server.
pub fn api_url(server: &MockServer) -> String {
    format!("{}/api", server.uri())
}

/// Client against `server` with the given storage and sink.
pub fn client_with(
    server: &MockServer,
    storage: Arc<dyn CredentialStorage>,
    sink: Arc<RecordingSink>,
) -> Client {
    Client::builder()
        .base_url(api_url(server))
        .storage(storage)
        .notice_sink(sink)
        .build()
        .unwrap()
}

/// Client whose in-memory session holds access token `a1` and refresh token `r1`.
pub fn logged_in_client(server: &MockServer, sink: Arc<RecordingSink>) -> Client {
    let storage = MemoryCredentialStorage::with_credential(
        Credential::new("a1", "r1", 7).with_user_info(json!({"id": 7, "nickname": "Zhao"})),
    );
    client_with(server, Arc::new(storage), sink)
}

pub fn ok(data: Value) -> Value {
    json!({"code": 200, "message": "success", "data": data, "timestamp": 1_700_000_000_000i64})
}

pub fn fail(code: i64, message: &str) -> Value {
    json!({"code": code, "message": message, "data": null, "timestamp": 1_700_000_000_000i64})
}

/// Poll `cond` until it holds or five seconds pass.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
