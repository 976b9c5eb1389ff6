//! REST wrapper for the inventory manager API.

use std::sync::Arc;

use reqwest::{header, Method, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::{
    auth::{self, Token},
    config::{self, ClientConfig, TransportConfig},
};

pub use self::observer::{Failure, LogObserver, Observer};

mod observer;

const X_AUTH_TOKEN: &str = "x-auth-token";

pub struct HttpClient<AuthTokenProvider> {
    client: reqwest::Client,
    base_url: String,
    auth_token: String,
    auth_token_provider: AuthTokenProvider,
    observer: Arc<dyn Observer>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error<AuthError> {
    #[error("auth: {0}")]
    Auth(#[source] AuthError),
    #[error("reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("{status_code} status code")]
    Server {
        status_code: u16,
        /// The response body parsed as JSON, `None` if it was not JSON.
        body: Option<Value>,
        raw: String,
    },
    /// `statusCode` is kept as sent; anything but a numeric 200 lands here.
    #[error("envelope reported status code {status_code}")]
    Envelope { status_code: Value, envelope: Value },
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl<AuthError> Error<AuthError> {
    /// The value a caller gets when it only wants "whatever the server sent":
    /// the whole envelope for envelope failures, the parsed body for error
    /// statuses, nothing otherwise.
    pub fn degraded_body(&self) -> Option<&Value> {
        match self {
            Error::Envelope { envelope, .. } => Some(envelope),
            Error::Server { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}

impl<AuthTokenProvider> HttpClient<AuthTokenProvider>
where
    AuthTokenProvider: auth::TokenProvider,
    AuthTokenProvider::Error: std::fmt::Display,
{
    pub fn new(
        client: reqwest::Client,
        config: &ClientConfig,
        auth_token_provider: AuthTokenProvider,
    ) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            auth_token: config.auth_token.clone(),
            auth_token_provider,
            observer: Arc::new(LogObserver),
        }
    }

    pub fn from_config(
        config: &ClientConfig,
        transport: &TransportConfig,
        auth_token_provider: AuthTokenProvider,
    ) -> Result<Self, config::Error> {
        let client = transport
            .client_builder()
            .build()
            .map_err(config::Error::Tls)?;
        Ok(Self::new(client, config, auth_token_provider))
    }

    /// Replace the default [`LogObserver`].
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Paths are appended verbatim, so they carry their own leading slash.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> Result<Option<Value>, Error<AuthTokenProvider::Error>> {
        self.call(Method::GET, path, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        payload: Option<&Value>,
    ) -> Result<Option<Value>, Error<AuthTokenProvider::Error>> {
        self.call(Method::POST, path, payload).await
    }

    pub async fn put(
        &self,
        path: &str,
        payload: &Value,
    ) -> Result<Option<Value>, Error<AuthTokenProvider::Error>> {
        debug!(message = "PUT payload", path, payload = %payload);
        self.call(Method::PUT, path, Some(payload)).await
    }

    /// The body is only sent when `payload` is given and non-empty: `null`,
    /// `false`, `0`, `""`, `[]` and `{}` all go out as a bodiless DELETE.
    pub async fn delete(
        &self,
        path: &str,
        payload: Option<&Value>,
    ) -> Result<Option<Value>, Error<AuthTokenProvider::Error>> {
        let payload = payload.filter(|payload| model::is_truthy(payload));
        self.call(Method::DELETE, path, payload).await
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Value>,
    ) -> Result<Option<Value>, Error<AuthTokenProvider::Error>> {
        let url = self.url(path);
        let result = self.exchange(method.clone(), &url, payload).await;

        if let Err(err) = &result {
            let raw_body = match err {
                Error::Server { raw, .. } => Some(raw.as_str()),
                _ => None,
            };
            self.observer.request_failed(&Failure {
                method: &method,
                url: &url,
                payload,
                raw_body,
                error: err,
            });
        }

        result
    }

    async fn exchange(
        &self,
        method: Method,
        url: &str,
        payload: Option<&Value>,
    ) -> Result<Option<Value>, Error<AuthTokenProvider::Error>> {
        let auth_token = self.get_auth_token().await?;
        let request = self.build_request(&auth_token, method, url, payload)?;
        let res = self.client.execute(request).await?;
        let status = res.status();
        let raw = res.text().await?;
        Self::unwrap_envelope(status, raw)
    }

    async fn get_auth_token(&self) -> Result<String, Error<AuthTokenProvider::Error>> {
        let token = self
            .auth_token_provider
            .get_auth_token()
            .await
            .map_err(Error::Auth)?;
        Ok(token.access_token().to_owned())
    }

    fn build_request(
        &self,
        auth_token: &str,
        method: Method,
        url: &str,
        payload: Option<&Value>,
    ) -> Result<reqwest::Request, Error<AuthTokenProvider::Error>> {
        let builder = self
            .client
            .request(method, url)
            .header(X_AUTH_TOKEN, &self.auth_token)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(auth_token);

        let builder = match payload {
            Some(payload) => builder.json(payload),
            None => builder,
        };

        builder.build().map_err(Error::Reqwest)
    }

    fn unwrap_envelope(
        status: StatusCode,
        raw: String,
    ) -> Result<Option<Value>, Error<AuthTokenProvider::Error>> {
        if status.as_u16() >= 300 {
            return Err(Error::Server {
                status_code: status.as_u16(),
                body: serde_json::from_str(&raw).ok(),
                raw,
            });
        }

        let envelope: Value = serde_json::from_str(&raw)?;
        let status_code = envelope
            .get(model::STATUS_CODE)
            .cloned()
            .ok_or_else(|| {
                <serde_json::Error as serde::de::Error>::missing_field(model::STATUS_CODE)
            })?;

        if !model::is_ok(&status_code) {
            return Err(Error::Envelope {
                status_code,
                envelope,
            });
        }

        let pay_load = envelope
            .get(model::PAY_LOAD)
            .filter(|pay_load| !pay_load.is_null())
            .cloned();
        Ok(pay_load)
    }
}

mod model {
    use serde_json::Value;

    pub const STATUS_CODE: &str = "statusCode";
    pub const PAY_LOAD: &str = "payLoad";

    /// `200` and `200.0` both count; strings and `null` do not.
    pub fn is_ok(status_code: &Value) -> bool {
        status_code.as_f64() == Some(200.0)
    }

    pub fn is_truthy(value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{convert::Infallible, time::Instant};

    use serde_json::json;

    use super::*;

    struct Static;

    #[async_trait::async_trait]
    impl auth::TokenProvider for Static {
        type Token = auth::token_manager::Record;
        type Error = Infallible;

        async fn get_auth_token(&self) -> Result<Self::Token, Self::Error> {
            Ok(auth::token_manager::Record {
                access_token: "static".into(),
                expires_at: Instant::now(),
            })
        }
    }

    type Client = HttpClient<Static>;

    fn unwrap(status: u16, body: &str) -> Result<Option<Value>, Error<Infallible>> {
        Client::unwrap_envelope(StatusCode::from_u16(status).unwrap(), body.to_owned())
    }

    #[test]
    fn ok_envelope_yields_payload() {
        let payload = unwrap(200, r#"{"statusCode":200,"payLoad":{"a":1}}"#).unwrap();
        assert_eq!(payload, Some(json!({"a": 1})));
    }

    #[test]
    fn ok_envelope_without_payload_yields_nothing() {
        assert_eq!(unwrap(200, r#"{"statusCode":200}"#).unwrap(), None);
        assert_eq!(unwrap(201, r#"{"statusCode":200,"payLoad":null}"#).unwrap(), None);
    }

    #[test]
    fn failed_envelope_is_returned_whole() {
        let err = unwrap(200, r#"{"statusCode":500,"msg":"boom"}"#).unwrap_err();
        match &err {
            Error::Envelope {
                status_code,
                envelope,
            } => {
                assert_eq!(status_code, &json!(500));
                assert_eq!(envelope, &json!({"statusCode": 500, "msg": "boom"}));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            err.degraded_body(),
            Some(&json!({"statusCode": 500, "msg": "boom"}))
        );
    }

    #[test]
    fn error_status_keeps_parsed_body() {
        let err = unwrap(404, r#"{"msg":"x"}"#).unwrap_err();
        assert!(matches!(err, Error::Server { status_code: 404, .. }));
        assert_eq!(err.degraded_body(), Some(&json!({"msg": "x"})));
    }

    #[test]
    fn error_status_with_unparseable_body() {
        let err = unwrap(502, "<html>Bad Gateway</html>").unwrap_err();
        match &err {
            Error::Server { body, raw, .. } => {
                assert_eq!(body, &None);
                assert_eq!(raw, "<html>Bad Gateway</html>");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.degraded_body(), None);
    }

    #[test]
    fn non_numeric_status_code_returns_envelope() {
        for body in [
            json!({"statusCode": "500", "msg": "x"}),
            json!({"statusCode": "200", "payLoad": 1}),
            json!({"statusCode": null, "msg": "x"}),
        ] {
            let err = unwrap(200, &body.to_string()).unwrap_err();
            assert!(
                matches!(&err, Error::Envelope { status_code, .. } if status_code == &body["statusCode"]),
                "unexpected error for {body}: {err}"
            );
            assert_eq!(err.degraded_body(), Some(&body));
        }
    }

    #[test]
    fn float_status_code_counts_as_ok() {
        assert_eq!(
            unwrap(200, r#"{"statusCode":200.0,"payLoad":1}"#).unwrap(),
            Some(json!(1))
        );
    }

    #[test]
    fn malformed_success_body() {
        assert!(matches!(unwrap(200, "not json"), Err(Error::Json(_))));
        assert!(matches!(unwrap(200, r#"{"payLoad":1}"#), Err(Error::Json(_))));
        assert!(matches!(unwrap(200, "[200, 1]"), Err(Error::Json(_))));
        assert!(matches!(unwrap(200, "200"), Err(Error::Json(_))));
    }

    #[test]
    fn truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!model::is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!("x"), json!([0]), json!({"id": "r1"})] {
            assert!(model::is_truthy(&truthy), "{truthy} should be truthy");
        }
    }

    #[test]
    fn url_is_plain_concatenation() {
        let client = Client::new(
            reqwest::Client::new(),
            &ClientConfig {
                base_url: "https://im.example.com/inventory/v1".into(),
                auth_token: "static".into(),
            },
            Static,
        );
        assert_eq!(
            client.url("/default/domain"),
            "https://im.example.com/inventory/v1/default/domain"
        );
    }
}
