//! JSON-over-HTTP implementation of [`Backend`].
//!
//! Every call is a POST to `<base>/api/method/<method>` with a JSON body.
//! Successful responses wrap their payload in a `{"message": ...}`
//! envelope; the payload is then normalized into the typed models.

use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret as _, SecretString};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::Backend;
use crate::error::{Result, SelfOrderError};
use crate::models::{
    CartLine, CatalogItem, CatalogItemRecord, CorrelationId, ExtendRecord, GroupId, ItemCode,
    ItemGroup, OrderId, OrderRecord, OrderSubmission, PaymentStatusRecord, PaymentStatusReport,
    ProfileId, Session, SessionId, SessionKey, SessionRecord, SessionRequest, TableId,
    TakeawayOutcome, VariantSet, VariantsRecord,
};

/// Environment variable holding the backend base URL.
const BASE_URL_VAR: &str = "SELFORDER_BASE_URL";

/// Environment variable holding the optional API token.
const API_TOKEN_VAR: &str = "SELFORDER_API_TOKEN";

/// Path prefix shared by every remote method.
const METHOD_PATH: &str = "/api/method/";

/// Remote method names.
mod method {
    /// Create or validate a session.
    pub(super) const CREATE_SESSION: &str = "selforder.api.create_session";
    /// Extend a session.
    pub(super) const EXTEND_SESSION: &str = "selforder.api.extend_session";
    /// List item groups.
    pub(super) const ITEM_GROUPS: &str = "selforder.api.item_groups";
    /// List items.
    pub(super) const ITEMS: &str = "selforder.api.items";
    /// Resolve variants.
    pub(super) const ITEM_VARIANTS: &str = "selforder.api.item_variants";
    /// Save the cart snapshot.
    pub(super) const SAVE_CART: &str = "selforder.api.save_cart";
    /// Submit a dine-in order.
    pub(super) const SUBMIT_DINE_IN: &str = "selforder.api.submit_dine_in";
    /// Submit a takeaway order.
    pub(super) const SUBMIT_TAKEAWAY: &str = "selforder.api.submit_takeaway";
    /// Query a payment request.
    pub(super) const PAYMENT_STATUS: &str = "selforder.api.payment_status";
}

/// Response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    /// Payload; absent for fire-and-forget methods.
    message: Option<T>,
}

/// Builder for constructing an [`HttpBackend`].
#[derive(Debug, Default)]
pub struct HttpBackendBuilder {
    /// Backend base URL.
    base_url: Option<String>,
    /// API token sent as a bearer credential.
    api_token: Option<SecretString>,
}

impl HttpBackendBuilder {
    /// Pre-fills the builder from `SELFORDER_BASE_URL` and
    /// `SELFORDER_API_TOKEN`. Unset variables are left empty.
    #[inline]
    #[must_use]
    pub fn from_env() -> Self {
        let mut builder = Self::default();
        if let Ok(url) = std::env::var(BASE_URL_VAR) {
            builder = builder.base_url(url);
        }
        if let Ok(token) = std::env::var(API_TOKEN_VAR) {
            builder = builder.api_token(token);
        }
        builder
    }

    /// Sets the backend base URL, e.g. `https://pos.example.com`.
    #[inline]
    #[must_use]
    pub fn base_url<T: Into<String>>(mut self, url: T) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the API token. Guest endpoints usually need none.
    #[inline]
    #[must_use]
    pub fn api_token<T: Into<String>>(mut self, token: T) -> Self {
        self.api_token = Some(SecretString::from(token.into()));
        self
    }

    /// Builds the backend.
    ///
    /// # Errors
    ///
    /// Returns [`SelfOrderError::Config`] if no base URL was provided or it
    /// is not an absolute `http(s)` URL.
    /// Returns [`SelfOrderError::Http`] if the HTTP client fails to build.
    #[inline]
    #[tracing::instrument(skip_all)]
    pub fn build(self) -> Result<HttpBackend> {
        let raw = self
            .base_url
            .ok_or_else(|| SelfOrderError::Config(format!("backend base URL missing (set {BASE_URL_VAR})")))?;
        let parsed = url::Url::parse(&raw)
            .map_err(|err| SelfOrderError::Config(format!("invalid backend base URL {raw}: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SelfOrderError::Config(format!(
                "backend base URL must be http or https, got {}",
                parsed.scheme()
            )));
        }
        let base_url = parsed.as_str().trim_end_matches('/').to_owned();
        tracing::debug!(base_url = %base_url, "building backend client");
        let http = reqwest::Client::builder().build()?;

        Ok(HttpBackend {
            http,
            base_url,
            api_token: self.api_token,
        })
    }
}

/// HTTP client for the ordering backend.
///
/// Use [`HttpBackend::builder()`] to construct an instance.
#[derive(Debug)]
pub struct HttpBackend {
    /// Underlying HTTP client.
    http: reqwest::Client,
    /// Base URL without trailing slash.
    base_url: String,
    /// Optional bearer token.
    api_token: Option<SecretString>,
}

impl HttpBackend {
    /// Creates a new builder for configuring the backend.
    #[inline]
    #[must_use]
    pub fn builder() -> HttpBackendBuilder {
        HttpBackendBuilder::default()
    }

    /// Calls `method` and returns the envelope payload, if any.
    #[tracing::instrument(skip_all, fields(method = %method))]
    async fn call<Req: Serialize + Sync, Resp: DeserializeOwned>(
        &self,
        method: &str,
        request: &Req,
    ) -> Result<Option<Resp>> {
        let url = format!("{}{METHOD_PATH}{method}", self.base_url);
        tracing::trace!(url = %url, "sending POST request");
        let mut builder = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(request);
        if let Some(token) = self.api_token.as_ref() {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()));
        }
        let response = builder.send().await?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");
        if status.is_success() {
            let body = response.text().await?;
            tracing::trace!(body_len = body.len(), "parsing response body");
            let envelope: Envelope<Resp> = serde_json::from_str(&body)?;
            Ok(envelope.message)
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_owned());
            tracing::debug!(status = status.as_u16(), message = %message, "backend error");
            Err(SelfOrderError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Like [`Self::call`], but a missing payload is an error.
    async fn call_required<Req: Serialize + Sync, Resp: DeserializeOwned>(
        &self,
        method: &str,
        request: &Req,
    ) -> Result<Resp> {
        self.call(method, request)
            .await?
            .ok_or_else(|| SelfOrderError::MalformedPayload(format!("{method} returned no message")))
    }
}

impl Backend for HttpBackend {
    #[inline]
    #[tracing::instrument(skip_all, fields(key = %key))]
    async fn create_session(&self, key: &SessionKey, table: Option<&TableId>) -> Result<Session> {
        let request = SessionRequest::new(key, table.cloned());
        let record: SessionRecord = self.call_required(method::CREATE_SESSION, &request).await?;
        Session::from_record(record, key.clone(), table.cloned())
    }

    #[inline]
    #[tracing::instrument(skip_all, fields(session = %session))]
    async fn extend_session(&self, session: &SessionId) -> Result<DateTime<Utc>> {
        let record: ExtendRecord = self
            .call_required(method::EXTEND_SESSION, &json!({ "session": session }))
            .await?;
        record.into_expiry()
    }

    #[inline]
    #[tracing::instrument(skip_all, fields(profile = %profile))]
    async fn item_groups(&self, profile: &ProfileId) -> Result<Vec<ItemGroup>> {
        let groups: Option<Vec<ItemGroup>> = self
            .call(method::ITEM_GROUPS, &json!({ "pos_profile": profile }))
            .await?;
        Ok(groups.unwrap_or_default())
    }

    #[inline]
    #[tracing::instrument(skip_all, fields(profile = %profile))]
    async fn items(&self, profile: &ProfileId, group: Option<&GroupId>) -> Result<Vec<CatalogItem>> {
        let records: Option<Vec<CatalogItemRecord>> = self
            .call(
                method::ITEMS,
                &json!({ "pos_profile": profile, "item_group": group }),
            )
            .await?;
        Ok(records
            .unwrap_or_default()
            .into_iter()
            .filter_map(|record| match CatalogItem::from_record(record) {
                Ok(item) => Some(item),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping malformed catalog item");
                    None
                }
            })
            .collect())
    }

    #[inline]
    #[tracing::instrument(skip_all, fields(template = %template))]
    async fn item_variants(&self, template: &ItemCode) -> Result<VariantSet> {
        let record: Option<VariantsRecord> = self
            .call(method::ITEM_VARIANTS, &json!({ "template": template }))
            .await?;
        VariantSet::from_record(template.clone(), record.unwrap_or_default())
    }

    #[inline]
    #[tracing::instrument(skip_all, fields(session = %session, lines = lines.len()))]
    async fn save_cart(&self, session: &SessionId, lines: &[CartLine]) -> Result<()> {
        let _ack: Option<IgnoredAny> = self
            .call(
                method::SAVE_CART,
                &json!({ "session": session, "items": lines }),
            )
            .await?;
        Ok(())
    }

    #[inline]
    #[tracing::instrument(skip_all, fields(session = %order.session))]
    async fn submit_dine_in(&self, order: &OrderSubmission) -> Result<OrderId> {
        let record: OrderRecord = self.call_required(method::SUBMIT_DINE_IN, order).await?;
        record.into_order_id()
    }

    #[inline]
    #[tracing::instrument(skip_all, fields(session = %order.session))]
    async fn submit_takeaway(&self, order: &OrderSubmission) -> Result<TakeawayOutcome> {
        let record: OrderRecord = self.call_required(method::SUBMIT_TAKEAWAY, order).await?;
        TakeawayOutcome::from_record(record)
    }

    #[inline]
    #[tracing::instrument(skip_all, fields(correlation = %correlation))]
    async fn payment_status(&self, correlation: &CorrelationId) -> Result<PaymentStatusReport> {
        let record: PaymentStatusRecord = self
            .call_required(
                method::PAYMENT_STATUS,
                &json!({ "correlation_id": correlation }),
            )
            .await?;
        Ok(PaymentStatusReport::from_record(record))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use wiremock::matchers::{body_partial_json, header, method as http_method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::models::{CartItem, OrderType, PaymentStatus};

    fn method_path(name: &str) -> String {
        format!("{METHOD_PATH}{name}")
    }

    async fn backend_for(server: &MockServer) -> HttpBackend {
        HttpBackend::builder()
            .base_url(server.uri())
            .api_token("secret-token")
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_base_url() {
        let err = HttpBackend::builder().build().unwrap_err();
        assert!(matches!(err, SelfOrderError::Config(_)));
    }

    #[test]
    fn builder_rejects_non_http_scheme() {
        let err = HttpBackend::builder()
            .base_url("ftp://pos.example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, SelfOrderError::Config(_)));
    }

    #[test]
    fn builder_strips_trailing_slash() {
        let backend = HttpBackend::builder()
            .base_url("https://pos.example.com/")
            .build()
            .unwrap();
        assert_eq!(backend.base_url, "https://pos.example.com");
    }

    #[tokio::test]
    async fn create_session_normalizes_record() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path(method_path(method::CREATE_SESSION)))
            .and(header("authorization", "Bearer secret-token"))
            .and(body_partial_json(json!({ "slug": "table-7", "table": "T-07" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {
                    "name": "SO-SESS-0001",
                    "pos_profile": "Main",
                    "expires_at": "2030-01-01 12:00:00",
                    "allow_guest": 0
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let key = SessionKey::slug("table-7");
        let session = backend
            .create_session(&key, Some(&TableId::from("T-07")))
            .await
            .unwrap();

        assert_eq!(session.id, SessionId::from("SO-SESS-0001"));
        assert_eq!(session.key, key);
        assert_eq!(session.table, Some(TableId::from("T-07")));
        assert_eq!(session.order_type, OrderType::DineIn);
        assert!(!session.guest_allowed);
        assert!(!session.payment_required);
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path(method_path(method::EXTEND_SESSION)))
            .respond_with(ResponseTemplate::new(403).set_body_string("session closed"))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let err = backend
            .extend_session(&SessionId::from("SO-SESS-0001"))
            .await
            .unwrap_err();
        assert!(matches!(err, SelfOrderError::Api { status: 403, .. }));
        assert!(err.to_string().contains("session closed"));
    }

    #[tokio::test]
    async fn empty_item_list_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path(method_path(method::ITEMS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": [] })))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let items = backend.items(&ProfileId::from("Main"), None).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn items_skip_records_without_code() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path(method_path(method::ITEMS)))
            .and(body_partial_json(json!({ "item_group": "Drinks" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": [
                    { "item_code": "COFFEE", "item_name": "Coffee", "price": "15000.00" },
                    { "item_name": "Ghost" }
                ]
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let items = backend
            .items(&ProfileId::from("Main"), Some(&GroupId::from("Drinks")))
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items.first().map(|item| item.price), Some(Decimal::from(15_000)));
    }

    #[tokio::test]
    async fn variants_without_entries_fail_with_no_variants() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path(method_path(method::ITEM_VARIANTS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": { "variants": [] } })))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let err = backend.item_variants(&ItemCode::from("LATTE")).await.unwrap_err();
        assert!(matches!(err, SelfOrderError::NoVariants(_)));
    }

    #[tokio::test]
    async fn save_cart_accepts_empty_envelope() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path(method_path(method::SAVE_CART)))
            .and(body_partial_json(json!({ "session": "SO-SESS-0001" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let line = CartItem::new(ItemCode::from("TEA"), "Tea", Decimal::from(9_000)).to_line();
        backend
            .save_cart(&SessionId::from("SO-SESS-0001"), &[line])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn takeaway_with_payment_request() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path(method_path(method::SUBMIT_TAKEAWAY)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {
                    "order": "SO-ORD-0009",
                    "payment_request": {
                        "name": "PR-0009",
                        "amount": 30000,
                        "payment_url": "https://pay.example.com/PR-0009"
                    }
                }
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let mut coffee = CartItem::new(ItemCode::from("COFFEE"), "Coffee", Decimal::from(15_000));
        coffee.set_qty(2);
        let order = OrderSubmission::new(
            SessionId::from("SO-SESS-0001"),
            OrderType::Takeaway,
            None,
            &[coffee],
        );
        let request = match backend.submit_takeaway(&order).await.unwrap() {
            TakeawayOutcome::PaymentRequired { request } => Some(request),
            TakeawayOutcome::Finalized { .. } => None,
        }
        .unwrap();
        assert_eq!(request.correlation_id, CorrelationId::from("PR-0009"));
        assert_eq!(request.amount, Decimal::from(30_000));
        assert_eq!(request.order_id, Some(OrderId::from("SO-ORD-0009")));
        assert_eq!(request.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn dine_in_without_order_id_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path(method_path(method::SUBMIT_DINE_IN)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": {} })))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let order = OrderSubmission::new(SessionId::from("S"), OrderType::DineIn, None, &[]);
        let err = backend.submit_dine_in(&order).await.unwrap_err();
        assert!(matches!(err, SelfOrderError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn missing_message_on_required_call_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path(method_path(method::EXTEND_SESSION)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let err = backend
            .extend_session(&SessionId::from("SO-SESS-0001"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains(method::EXTEND_SESSION));
    }

    #[tokio::test]
    async fn payment_status_parses_labels() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path(method_path(method::PAYMENT_STATUS)))
            .and(body_partial_json(json!({ "correlation_id": "PR-0009" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": { "status": "Paid", "order": "SO-ORD-0009" }
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server).await;
        let report = backend
            .payment_status(&CorrelationId::from("PR-0009"))
            .await
            .unwrap();
        assert_eq!(report.status, PaymentStatus::Paid);
        assert_eq!(report.order_id, Some(OrderId::from("SO-ORD-0009")));
    }
}
