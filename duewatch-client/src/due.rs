//! Due-items endpoints
//!
//! - `GET /api/{borrow_due|reserve_due}?start_time=..&end_time=..` lists the
//!   records falling due inside a window
//! - `POST /api/{borrow_due|reserve_due}` with a one-element array marks a
//!   record handled; the API sends the notification e-mail and flips the
//!   record's state as a side effect
//!
//! Both calls retry exactly once after a 401, with a token refresh in between.
//! A fetch only returns well-formed records whose due instant lies inside the
//! requested window; anything else is logged and skipped.

use crate::error::{ClientError, Result};
use crate::{AuthClient, LibraryApi};
use async_trait::async_trait;
use duewatch_core::domain::{DueItem, DueKind, TimeWindow};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Remote due-items resource as seen by the poller loops
#[async_trait]
pub trait DueItemApi: Send + Sync {
    /// The record kind this resource serves
    fn kind(&self) -> DueKind;

    /// Fetches the items whose due instant lies in `window`
    async fn fetch_due(&self, window: &TimeWindow) -> Result<Vec<DueItem>>;

    /// Marks a single item handled, triggering its notification
    async fn submit_processed(&self, item: &DueItem) -> Result<()>;
}

/// HTTP implementation of [`DueItemApi`]
pub struct DueItemClient {
    api: LibraryApi,
    auth: Arc<AuthClient>,
    kind: DueKind,
}

impl DueItemClient {
    pub fn new(api: LibraryApi, auth: Arc<AuthClient>, kind: DueKind) -> Self {
        Self { api, auth, kind }
    }

    fn resource_url(&self) -> String {
        self.api.url(self.kind.resource_path())
    }

    /// Runs `call` with the current access token; on 401, recovers the token
    /// once and runs `call` a second time. A second 401 is returned as is.
    async fn with_token_retry<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let access = self.auth.access_token()?;

        match call(access.clone()).await {
            Err(ClientError::Unauthorized) => {
                warn!(kind = %self.kind, "Access token rejected, refreshing");
                self.auth.recover(&access).await?;
                let access = self.auth.access_token()?;
                call(access).await
            }
            other => other,
        }
    }

    async fn get_due(&self, window: &TimeWindow, access: String) -> Result<Vec<Value>> {
        let response = self
            .api
            .http()
            .get(self.resource_url())
            .bearer_auth(access)
            .query(&window.query_params())
            .send()
            .await?;

        LibraryApi::handle_response(response).await
    }

    async fn post_processed(&self, item: &DueItem, access: String) -> Result<()> {
        let response = self
            .api
            .http()
            .post(self.resource_url())
            .bearer_auth(access)
            .json(std::slice::from_ref(item))
            .send()
            .await?;

        LibraryApi::check_status(response).await?;
        Ok(())
    }

    /// Parses each record on its own and drops the ones that do not parse or
    /// fall outside `window`
    fn keep_in_window(&self, window: &TimeWindow, records: Vec<Value>) -> Vec<DueItem> {
        records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| match serde_json::from_value::<DueItem>(record) {
                Ok(item) if window.contains(item.due_at) => Some(item),
                Ok(item) => {
                    warn!(
                        kind = %self.kind,
                        item_id = %item.label(),
                        due_at = %item.due_at,
                        window_start = %window.start,
                        window_end = %window.end,
                        "Discarding item due outside the requested window"
                    );
                    None
                }
                Err(e) => {
                    warn!(kind = %self.kind, index, "Skipping malformed due item: {}", e);
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl DueItemApi for DueItemClient {
    fn kind(&self) -> DueKind {
        self.kind
    }

    async fn fetch_due(&self, window: &TimeWindow) -> Result<Vec<DueItem>> {
        let records = self
            .with_token_retry(|access| self.get_due(window, access))
            .await?;

        let received = records.len();
        let items = self.keep_in_window(window, records);

        debug!(
            kind = %self.kind,
            window_start = %window.start,
            window_end = %window.end,
            received,
            count = items.len(),
            "Fetched due items"
        );

        Ok(items)
    }

    async fn submit_processed(&self, item: &DueItem) -> Result<()> {
        self.with_token_retry(|access| self.post_processed(item, access))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenStore;
    use chrono::{DateTime, Duration};
    use duewatch_core::domain::Credentials;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn window() -> TimeWindow {
        TimeWindow::starting_at(
            DateTime::parse_from_rfc3339("2026-10-16T12:00:00+04:00").unwrap(),
            Duration::minutes(10),
        )
    }

    fn item_json(id: i64, due: &str) -> serde_json::Value {
        json!({
            "id": id,
            "user": {"id": 1, "email": "ann@example.com", "first_name": "Ann", "last_name": "Lee"},
            "book": {"id": 5, "title": "Dune"},
            "due_date": due,
            "returned": false
        })
    }

    /// Client whose store already holds `a1`/`r1`
    fn client_for(server: &MockServer, kind: DueKind) -> DueItemClient {
        let api = LibraryApi::new(server.uri());
        let tokens = Arc::new(TokenStore::new());
        tokens.set(Credentials::new("a1", "r1"));
        let auth = Arc::new(AuthClient::new(api.clone(), tokens));
        DueItemClient::new(api, auth, kind)
    }

    async fn mount_refresh(server: &MockServer, new_access: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .and(body_json(json!({"refresh": "r1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": new_access})))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_sends_window_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/borrow_due"))
            .and(header("authorization", "Bearer a1"))
            .and(query_param("start_time", "2026-10-16T12:00:00+04:00"))
            .and(query_param("end_time", "2026-10-16T12:10:00+04:00"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([item_json(1, "2026-10-16T12:02:00+04:00")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, DueKind::Borrow);
        let items = client.fetch_due(&window()).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label(), "1");
    }

    #[tokio::test]
    async fn test_fetch_drops_items_outside_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/borrow_due"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                item_json(1, "2026-10-16T12:02:00+04:00"),
                item_json(2, "2026-10-16T12:15:00+04:00"),
                item_json(3, "2026-10-16T12:10:00+04:00"),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, DueKind::Borrow);
        let items = client.fetch_due(&window()).await.unwrap();

        let labels: Vec<String> = items.iter().map(DueItem::label).collect();
        assert_eq!(labels, vec!["1"]);
    }

    #[tokio::test]
    async fn test_fetch_skips_malformed_records() {
        let server = MockServer::start().await;
        let mut broken = item_json(2, "2026-10-16T12:03:00+04:00");
        broken["due_date"] = serde_json::Value::Null;

        Mock::given(method("GET"))
            .and(path("/api/borrow_due"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                item_json(1, "2026-10-16T12:02:00+04:00"),
                broken,
                item_json(3, "2026-10-16T12:04:00+04:00"),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, DueKind::Borrow);
        let items = client.fetch_due(&window()).await.unwrap();

        let labels: Vec<String> = items.iter().map(DueItem::label).collect();
        assert_eq!(labels, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_fetch_retries_once_after_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/reserve_due"))
            .and(header("authorization", "Bearer a1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/reserve_due"))
            .and(header("authorization", "Bearer a2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([item_json(9, "2026-10-16T12:05:00+04:00")])),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, "a2", 1).await;

        let client = client_for(&server, DueKind::Reserve);
        let items = client.fetch_due(&window()).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(client.auth.access_token().unwrap(), "a2");
    }

    #[tokio::test]
    async fn test_second_unauthorized_does_not_recurse() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/borrow_due"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        mount_refresh(&server, "a2", 1).await;

        let client = client_for(&server, DueKind::Borrow);
        let err = client.fetch_due(&window()).await.unwrap_err();

        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/borrow_due"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, "a2", 0).await;

        let client = client_for(&server, DueKind::Borrow);
        let err = client.fetch_due(&window()).await.unwrap_err();

        assert!(err.is_transient());
        assert!(matches!(err, ClientError::ApiError { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_fetch_malformed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/borrow_due"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": "nope"})))
            .mount(&server)
            .await;

        let client = client_for(&server, DueKind::Borrow);
        let err = client.fetch_due(&window()).await.unwrap_err();

        assert!(matches!(err, ClientError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_submit_posts_single_item_array() {
        let server = MockServer::start().await;
        let raw = item_json(3, "2026-10-16T12:02:00+04:00");
        let item: DueItem = serde_json::from_value(raw.clone()).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/borrow_due"))
            .and(header("authorization", "Bearer a1"))
            .and(body_json(json!([raw])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([item_json(3, "2026-10-16T12:02:00+04:00")])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, DueKind::Borrow);
        client.submit_processed(&item).await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_retries_once_after_refresh() {
        let server = MockServer::start().await;
        let item: DueItem =
            serde_json::from_value(item_json(3, "2026-10-16T12:02:00+04:00")).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/borrow_due"))
            .and(header("authorization", "Bearer a1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/borrow_due"))
            .and(header("authorization", "Bearer a2"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, "a2", 1).await;

        let client = client_for(&server, DueKind::Borrow);
        client.submit_processed(&item).await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_validation_failure() {
        let server = MockServer::start().await;
        let item: DueItem =
            serde_json::from_value(item_json(3, "2026-10-16T12:02:00+04:00")).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/borrow_due"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, DueKind::Borrow);
        let err = client.submit_processed(&item).await.unwrap_err();

        assert!(err.is_client_error());
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_fetch_without_credentials() {
        let server = MockServer::start().await;
        let api = LibraryApi::new(server.uri());
        let auth = Arc::new(AuthClient::new(api.clone(), Arc::new(TokenStore::new())));
        let client = DueItemClient::new(api, auth, DueKind::Borrow);

        assert!(matches!(
            client.fetch_due(&window()).await,
            Err(ClientError::NotAuthenticated)
        ));
    }
}
