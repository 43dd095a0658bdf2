//! Outbound request and buffered response types

use bytes::Bytes;
use common::Secret;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Upper bound on `retry_count`: a request is dispatched at most twice.
pub const MAX_RETRIES: u8 = 1;

/// A logical API call, relative to the configured base URL and prefix.
///
/// `retry_count` is owned by the request layer. Callers build requests with
/// it at zero; only `RetryExecutor` produces the single retry copy.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Bytes>,
    retry_count: u8,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            retry_count: 0,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a header, replacing any previous value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serialize `body` as the JSON payload.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| Error::InvalidRequest(format!("serializing JSON body: {e}")))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }

    /// Use raw bytes as the payload.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn payload(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// 0 for the original dispatch, 1 for the retry.
    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }

    /// The single retry copy of this request.
    pub(crate) fn for_retry(&self) -> Self {
        let mut retry = self.clone();
        retry.retry_count = MAX_RETRIES;
        retry
    }

    /// Replace the Authorization header with `<scheme> <token>`.
    pub(crate) fn set_credential(&mut self, scheme: &str, token: &Secret<String>) -> Result<()> {
        let mut value =
            HeaderValue::from_str(&format!("{scheme} {}", token.expose())).map_err(|e| {
                Error::InvalidRequest(format!("access token is not a valid header value: {e}"))
            })?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// A fully buffered response.
///
/// The body is read before classification so a non-401 response can be
/// handed back to the caller exactly as received.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::Decode(format!("invalid JSON body ({}): {e}", self.status)))
    }

    /// Turn a non-2xx response into `Error::Status`.
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(Error::Status {
                status: self.status.as_u16(),
                body: self.text(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_request_starts_at_zero_retries() {
        let request = ApiRequest::get("/users/me");
        assert_eq!(request.retry_count(), 0);
        assert_eq!(*request.method(), Method::GET);
        assert_eq!(request.path(), "/users/me");
    }

    #[test]
    fn retry_copy_is_bounded_and_keeps_payload() {
        let request = ApiRequest::post("/plans/purchase")
            .json(&serde_json::json!({"plan_id": 3}))
            .unwrap();
        let retry = request.for_retry();
        assert_eq!(retry.retry_count(), MAX_RETRIES);
        assert_eq!(retry.payload(), request.payload());
        assert_eq!(request.retry_count(), 0, "original must be untouched");

        // Retrying a retry never goes past the bound
        assert_eq!(retry.for_retry().retry_count(), MAX_RETRIES);
    }

    #[test]
    fn json_sets_content_type() {
        let request = ApiRequest::post("/plans/redeem-voucher")
            .json(&serde_json::json!({"voucher_code": "ABC-123"}))
            .unwrap();
        assert_eq!(
            request.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body: serde_json::Value =
            serde_json::from_slice(request.payload().unwrap()).unwrap();
        assert_eq!(body["voucher_code"], "ABC-123");
    }

    #[test]
    fn set_credential_replaces_existing_authorization() {
        let mut request = ApiRequest::get("/wallet/balance").header(
            AUTHORIZATION,
            HeaderValue::from_static("Bearer caller-supplied"),
        );
        request
            .set_credential("Bearer", &Secret::new("at_123".into()))
            .unwrap();
        assert_eq!(request.headers().get(AUTHORIZATION).unwrap(), "Bearer at_123");
        assert!(request.headers().get(AUTHORIZATION).unwrap().is_sensitive());
    }

    #[test]
    fn set_credential_rejects_newlines() {
        let mut request = ApiRequest::get("/wallet/balance");
        let err = request
            .set_credential("Bearer", &Secret::new("at\nbad".into()))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)), "got: {err:?}");
    }

    #[test]
    fn query_pairs_accumulate() {
        let request = ApiRequest::get("/admin/users")
            .query("page", "2")
            .query("status", "active");
        assert_eq!(
            request.query_pairs(),
            &[
                ("page".to_string(), "2".to_string()),
                ("status".to_string(), "active".to_string())
            ]
        );
    }

    #[test]
    fn response_json_and_error_for_status() {
        let ok = ApiResponse::new(StatusCode::OK, HeaderMap::new(), r#"{"balance":250}"#);
        let value: serde_json::Value = ok.json().unwrap();
        assert_eq!(value["balance"], 250);
        assert!(ok.error_for_status().is_ok());

        let missing = ApiResponse::new(StatusCode::NOT_FOUND, HeaderMap::new(), "not found");
        let err = missing.error_for_status().unwrap_err();
        assert!(
            matches!(err, Error::Status { status: 404, ref body } if body == "not found"),
            "got: {err:?}"
        );
    }

    #[test]
    fn response_json_decode_error() {
        let response = ApiResponse::new(StatusCode::OK, HeaderMap::new(), "<html>");
        let err = response.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "got: {err:?}");
    }
}
