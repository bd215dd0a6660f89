//! Main client entry point.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::refresh::{RefreshCoordinator, DEFAULT_REFRESH_PATH};
use crate::auth::store::{open_storage, CredentialStorage};
use crate::auth::CredentialStore;
use crate::config::Config;
use crate::envelope::{classify, Outcome, FORBIDDEN_CODE, UNAUTHORIZED_CODE};
use crate::error::{Error, Result};
use crate::net::{HttpClient, HttpTransport, RequestDescriptor, Transport};
use crate::notify::{AcknowledgeHook, LogSink, NoticeSink, Notifier};

/// Authenticated client for the kin API.
///
/// Attaches the stored access token to each request, unwraps the response
/// envelope and recovers expired sessions through a single shared token
/// refresh. Cloning is cheap; clones share credentials, refresh state and
/// the notifier.
///
/// # Examples
///
/// ```rust,no_run
/// use kin_client::{Client, MemoryCredentialStorage};
/// use std::sync::Arc;
///
/// # async fn example() -> kin_client::Result<()> {
/// let client = Client::builder()
///     .base_url("http://localhost:8080/api")
///     .storage(Arc::new(MemoryCredentialStorage::new()))
///     .build()?;
///
/// client.login("admin", "secret").await?;
/// let families = client.get("/families").await?;
/// println!("{families}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    store: Arc<CredentialStore>,
    transport: Arc<dyn Transport>,
    notifier: Arc<Notifier>,
    coordinator: RefreshCoordinator,
}

impl Client {
    /// Create a builder for configuring the client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Send a request and return the envelope's `data` on success.
    ///
    /// Business and transport failures raise a transient notice. A forbidden
    /// response, or an expired session that cannot be refreshed, ends the
    /// session and raises the auth-failure dialog.
    pub async fn send(&self, request: RequestDescriptor) -> Result<Value> {
        let token = self.store.access_token();
        let raw = self.transport.execute(&request, token.as_deref()).await;
        let outcome = classify(raw);
        debug!(
            method = %request.method,
            path = %request.path,
            outcome = outcome.kind(),
            "Request settled"
        );

        let outcome = match outcome {
            Outcome::AuthExpired(_) => {
                self.coordinator
                    .handle_auth_expired(request, token.as_deref())
                    .await?
            }
            other => other,
        };
        self.settle(outcome)
    }

    /// Send a request and deserialize the payload into `T`.
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T> {
        let path = request.path.clone();
        let data = self.send(request).await?;
        decode(&path, data)
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.send(RequestDescriptor::get(path)).await
    }

    /// GET with query parameters.
    pub async fn get_with_query(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let request = query
            .iter()
            .fold(RequestDescriptor::get(path), |req, (k, v)| req.with_query(*k, *v));
        self.send(request).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.send(RequestDescriptor::post(path, body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value> {
        self.send(RequestDescriptor::put(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.send(RequestDescriptor::delete(path)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(RequestDescriptor::get(path)).await
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.send_json(RequestDescriptor::post(path, body)).await
    }

    pub async fn put_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.send_json(RequestDescriptor::put(path, body)).await
    }

    /// Credential store shared by this client.
    pub fn credentials(&self) -> &CredentialStore {
        &self.store
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Send without a token and without session handling.
    ///
    /// Used for the login endpoints: an auth-class answer there means bad
    /// credentials, not an expired session, so it is reported as a business
    /// error and the store is left alone.
    pub(crate) async fn send_unauthenticated(&self, request: RequestDescriptor) -> Result<Value> {
        let raw = self.transport.execute(&request, None).await;
        let outcome = match classify(raw) {
            Outcome::AuthExpired(message) => Outcome::BusinessError {
                code: UNAUTHORIZED_CODE,
                message,
            },
            Outcome::Forbidden(message) => Outcome::BusinessError {
                code: FORBIDDEN_CODE,
                message,
            },
            other => other,
        };
        self.settle(outcome)
    }

    /// Best-effort send used by logout: no notices, no refresh.
    pub(crate) async fn send_quiet(&self, request: &RequestDescriptor) -> Outcome {
        let token = self.store.access_token();
        classify(self.transport.execute(request, token.as_deref()).await)
    }

    /// Apply the terminal handling for one outcome.
    fn settle(&self, outcome: Outcome) -> Result<Value> {
        match outcome {
            Outcome::Success(data) => Ok(data),
            Outcome::BusinessError { code, message } => {
                debug!(code, message = message.as_str(), "Business error");
                self.notifier.notify_transient(&message);
                Err(Error::Business { code, message })
            }
            Outcome::TransportError(message) => {
                self.notifier.notify_transient(&message);
                Err(Error::Transport(message))
            }
            Outcome::Forbidden(message) => {
                warn!(message = message.as_str(), "Access forbidden, ending session");
                self.coordinator.end_session(&message);
                Err(Error::Forbidden(message))
            }
            // Only reachable after a refresh: the new token was rejected too.
            Outcome::AuthExpired(message) => {
                warn!(message = message.as_str(), "Session rejected after refresh, ending session");
                self.coordinator.end_session(&message);
                Err(Error::AuthExpired(message))
            }
        }
    }
}

fn decode<T: DeserializeOwned>(path: &str, data: Value) -> Result<T> {
    serde_json::from_value(data)
        .map_err(|e| Error::Decode(format!("Unexpected payload from {}: {}", path, e)))
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("store", &self.store)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    config: Config,
    storage: Option<Arc<dyn CredentialStorage>>,
    sink: Option<Arc<dyn NoticeSink>>,
    transport: Option<Arc<dyn Transport>>,
    http_client: Option<reqwest::Client>,
    on_login_required: Option<AcknowledgeHook>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            storage: None,
            sink: None,
            transport: None,
            http_client: None,
            on_login_required: None,
        }
    }

    /// Take API, storage and timeout settings from a loaded [`Config`].
    pub fn config(mut self, config: &Config) -> Self {
        self.config = config.clone();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api.base_url = url.into();
        self
    }

    pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
        self.config.api.refresh_path = path.into();
        self
    }

    /// Use an explicit credential storage backend instead of the configured one.
    pub fn storage(mut self, storage: Arc<dyn CredentialStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Where notices are presented. Defaults to [`LogSink`].
    pub fn notice_sink(mut self, sink: Arc<dyn NoticeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the HTTP transport entirely.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a pre-configured reqwest client for the HTTP transport.
    pub fn reqwest_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Run `hook` once the user acknowledges the session-ended dialog.
    pub fn on_login_required(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_login_required = Some(Arc::new(hook));
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client> {
        self.config.validate()?;

        let storage = match self.storage {
            Some(storage) => storage,
            None => open_storage(&self.config.storage)?,
        };
        let store = Arc::new(CredentialStore::load(storage)?);

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let http = match self.http_client {
                    Some(client) => HttpClient::from_reqwest(client),
                    None => HttpClient::builder()
                        .connect_timeout(self.config.api.connect_timeout())
                        .request_timeout(self.config.api.request_timeout())
                        .build()?,
                };
                Arc::new(HttpTransport::new(http, &self.config.api.base_url)?)
            }
        };

        let notifier = Arc::new(Notifier::new(self.sink.unwrap_or_else(|| Arc::new(LogSink))));

        let refresh_path = if self.config.api.refresh_path.is_empty() {
            DEFAULT_REFRESH_PATH.to_string()
        } else {
            self.config.api.refresh_path.clone()
        };
        let coordinator =
            RefreshCoordinator::new(Arc::clone(&store), Arc::clone(&transport), Arc::clone(&notifier))
                .with_refresh_path(refresh_path)
                .with_login_hook(self.on_login_required);

        info!(
            base_url = self.config.api.base_url.as_str(),
            storage = store.storage_name(),
            logged_in = store.read().is_some(),
            "Client ready"
        );

        Ok(Client {
            store,
            transport,
            notifier,
            coordinator,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credential, MemoryCredentialStorage};
    use crate::envelope::RawResponse;
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Mutex;

    /// Transport replaying a fixed list of responses.
    struct FixedTransport {
        responses: Mutex<Vec<RawResponse>>,
        tokens: Mutex<Vec<Option<String>>>,
    }

    impl FixedTransport {
        fn new(mut responses: Vec<RawResponse>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                tokens: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn execute(&self, _request: &RequestDescriptor, token: Option<&str>) -> RawResponse {
            self.tokens.lock().unwrap().push(token.map(str::to_string));
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(RawResponse::Failed { message: None })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        transients: Mutex<Vec<String>>,
        dialogs: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NoticeSink for RecordingSink {
        fn show_transient(&self, message: &str) {
            self.transients.lock().unwrap().push(message.to_string());
        }

        async fn show_auth_dialog(&self, _title: &str, message: &str) {
            self.dialogs.lock().unwrap().push(message.to_string());
        }
    }

    fn client(
        responses: Vec<RawResponse>,
        credential: Option<Credential>,
    ) -> (Client, Arc<FixedTransport>, Arc<RecordingSink>) {
        let transport = FixedTransport::new(responses);
        let sink = Arc::new(RecordingSink::default());
        let storage = match credential {
            Some(c) => MemoryCredentialStorage::with_credential(c),
            None => MemoryCredentialStorage::new(),
        };
        let client = Client::builder()
            .storage(Arc::new(storage))
            .transport(transport.clone())
            .notice_sink(sink.clone())
            .build()
            .unwrap();
        (client, transport, sink)
    }

    #[tokio::test]
    async fn test_success_returns_data() {
        let (client, transport, sink) = client(
            vec![RawResponse::json(200, json!({"code": 200, "data": {"id": 1}}))],
            Some(Credential::new("a1", "r1", 1)),
        );

        assert_eq!(client.get("/families/1").await.unwrap(), json!({"id": 1}));
        assert_eq!(*transport.tokens.lock().unwrap(), vec![Some("a1".to_string())]);
        assert!(sink.transients.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_business_error_is_transient() {
        let (client, _, sink) = client(
            vec![RawResponse::json(200, json!({"code": 500, "message": "boom"}))],
            Some(Credential::new("a1", "r1", 1)),
        );

        let err = client.post("/families", json!({})).await.unwrap_err();
        assert_eq!(err.code(), Some(500));
        assert_eq!(*sink.transients.lock().unwrap(), vec!["boom"]);
        assert!(client.credentials().read().is_some());
    }

    #[tokio::test]
    async fn test_forbidden_ends_session() {
        let (client, _, sink) = client(
            vec![RawResponse::json(200, json!({"code": 403, "message": "no access"}))],
            Some(Credential::new("a1", "r1", 1)),
        );

        let err = client.get("/admin").await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(client.credentials().read().is_none());

        client.notifier().flush().await;
        assert_eq!(*sink.dialogs.lock().unwrap(), vec!["no access"]);
    }

    #[tokio::test]
    async fn test_transport_error_is_transient() {
        let (client, _, sink) = client(
            vec![RawResponse::Failed { message: None }],
            Some(Credential::new("a1", "r1", 1)),
        );

        let err = client.delete("/members/3").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(sink.transients.lock().unwrap().len(), 1);
        assert!(client.credentials().read().is_some());
    }

    #[tokio::test]
    async fn test_expired_then_refreshed() {
        let (client, transport, _) = client(
            vec![
                RawResponse::empty(401),
                RawResponse::json(200, json!({"code": 200, "data": {"accessToken": "a2", "refreshToken": "r2"}})),
                RawResponse::json(200, json!({"code": 200, "data": [1, 2]})),
            ],
            Some(Credential::new("a1", "r1", 1)),
        );

        assert_eq!(client.get("/members").await.unwrap(), json!([1, 2]));
        assert_eq!(
            *transport.tokens.lock().unwrap(),
            vec![Some("a1".to_string()), None, Some("a2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_rejected_after_refresh_ends_session() {
        let (client, _, sink) = client(
            vec![
                RawResponse::empty(401),
                RawResponse::json(200, json!({"code": 200, "data": {"accessToken": "a2", "refreshToken": "r2"}})),
                RawResponse::empty(401),
            ],
            Some(Credential::new("a1", "r1", 1)),
        );

        let err = client.get("/members").await.unwrap_err();
        assert!(matches!(err, Error::AuthExpired(_)));
        assert!(client.credentials().read().is_none());
        client.notifier().flush().await;
        assert_eq!(sink.dialogs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_typed_decode_error() {
        #[derive(Debug, Deserialize)]
        struct Family {
            #[allow(dead_code)]
            name: String,
        }

        let (client, _, sink) = client(
            vec![RawResponse::json(200, json!({"code": 200, "data": {"id": 1}}))],
            Some(Credential::new("a1", "r1", 1)),
        );

        let err = client.get_json::<Family>("/families/1").await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert!(sink.transients.lock().unwrap().is_empty());
        assert!(client.credentials().read().is_some());
    }

    #[tokio::test]
    async fn test_unauthenticated_auth_error_is_business() {
        let (client, transport, sink) = client(
            vec![RawResponse::json(200, json!({"code": 401, "message": "wrong password"}))],
            None,
        );

        let err = client
            .send_unauthenticated(RequestDescriptor::post("/auth/login", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(401));
        assert_eq!(*sink.transients.lock().unwrap(), vec!["wrong password"]);
        assert!(sink.dialogs.lock().unwrap().is_empty());
        assert_eq!(*transport.tokens.lock().unwrap(), vec![None]);
    }

    #[test]
    fn test_build_rejects_bad_base_url() {
        let result = Client::builder()
            .base_url("nope")
            .storage(Arc::new(MemoryCredentialStorage::new()))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
