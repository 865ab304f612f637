//! Single authenticated GET requests
//!
//! A [`Transport`] turns one [`EndpointId`] into one [`FetchResult`]. It never
//! fails: connection errors and timeouts become [`ResponseStatus::Transport`],
//! and bodies that cannot be decoded are recorded as a [`DecodeFailure`]. There
//! is no retry; one call is one attempt.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{Body, DecodeFailure, EndpointId, FetchResult, ResponseStatus};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use std::time::Instant;
use tracing::debug;

/// Issues a single fetch for one identifier
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch `endpoint` once and report what came back
    async fn fetch(&self, endpoint: &EndpointId) -> FetchResult;
}

/// [`Transport`] over a shared reqwest client with the token in a custom header
pub struct HttpTransport {
    client: reqwest::Client,
    header: HeaderName,
    token: HeaderValue,
    require_json_content_type: bool,
}

impl HttpTransport {
    /// Build a transport from the run configuration and token
    ///
    /// # Errors
    /// Returns a configuration error if the header name or token cannot be sent
    /// as an HTTP header, or a network error if the client cannot be built.
    pub fn new(config: &Config, token: &str) -> Result<Self> {
        let header = HeaderName::from_bytes(config.token_header.as_bytes()).map_err(|e| {
            Error::config(
                format!("invalid header name '{}': {}", config.token_header, e),
                "token_header",
            )
        })?;
        let mut token = HeaderValue::from_str(token).map_err(|e| {
            Error::config(format!("token is not a valid header value: {}", e), "token_file")
        })?;
        token.set_sensitive(true);

        let client = reqwest::Client::builder()
            .timeout(config.fetch.request_timeout)
            .user_agent(config.fetch.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            header,
            token,
            require_json_content_type: config.fetch.require_json_content_type,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, endpoint: &EndpointId) -> FetchResult {
        let started = Instant::now();

        let response = match self
            .client
            .get(endpoint.as_str())
            .header(self.header.clone(), self.token.clone())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(endpoint = %endpoint, error = %e, "request failed");
                return FetchResult::transport_failure(
                    endpoint.clone(),
                    ResponseStatus::Transport {
                        timeout: e.is_timeout(),
                        connect: e.is_connect(),
                        message: e.to_string(),
                    },
                    started.elapsed(),
                );
            }
        };

        let status = ResponseStatus::Http {
            code: response.status().as_u16(),
        };
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = match response.bytes().await {
            Ok(bytes) => decode_body(
                content_type.as_deref(),
                &bytes,
                self.require_json_content_type,
            ),
            Err(e) => Err(DecodeFailure::Read(e.to_string())),
        };

        debug!(
            endpoint = %endpoint,
            status = %status,
            decoded = body.is_ok(),
            "request completed"
        );

        FetchResult {
            endpoint: endpoint.clone(),
            status,
            body,
            elapsed: started.elapsed(),
        }
    }
}

/// Decode a response body into a [`Body`]
///
/// With `require_json` set, a declared Content-Type that is not JSON
/// (`application/json` or any `+json` suffix) is rejected before parsing. A
/// missing Content-Type is always given a chance to parse.
pub fn decode_body(
    content_type: Option<&str>,
    bytes: &[u8],
    require_json: bool,
) -> std::result::Result<Body, DecodeFailure> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeFailure::Empty);
    }
    if require_json
        && let Some(ct) = content_type
        && !is_json_content_type(ct)
    {
        return Err(DecodeFailure::ContentType(ct.to_string()));
    }
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| DecodeFailure::Json(e.to_string()))?;
    Body::from_value(value)
}

fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> Config {
        let mut config = Config::default();
        config.fetch.request_timeout = Duration::from_secs(5);
        config
    }

    #[test]
    fn test_decode_body_classification() {
        assert_eq!(
            decode_body(Some("application/json"), b"", true),
            Err(DecodeFailure::Empty)
        );
        assert_eq!(
            decode_body(None, b"  \n", false),
            Err(DecodeFailure::Empty)
        );
        assert_eq!(
            decode_body(Some("text/html"), b"<html></html>", true),
            Err(DecodeFailure::ContentType("text/html".into()))
        );
        assert!(matches!(
            decode_body(Some("text/html"), b"<html></html>", false),
            Err(DecodeFailure::Json(_))
        ));
        assert!(matches!(
            decode_body(Some("application/json; charset=utf-8"), br#"{"id": 1}"#, true),
            Ok(Body::Record(_))
        ));
        assert!(matches!(
            decode_body(Some("application/problem+json"), br#"[{"id": 1}]"#, true),
            Ok(Body::RecordList(_))
        ));
        assert!(matches!(
            decode_body(None, b"42", true),
            Err(DecodeFailure::NotTabular(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_sends_token_header() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/projects"))
            .and(header("Token", "secret-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": 1}])),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(&test_config(), "secret-token").unwrap();
        let endpoint = EndpointId::new(format!("{}/projects", mock_server.uri()));
        let result = transport.fetch(&endpoint).await;

        assert_eq!(result.endpoint, endpoint);
        assert_eq!(result.status, ResponseStatus::Http { code: 200 });
        assert!(result.is_success());
        assert_eq!(result.body.unwrap().row_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_custom_header_name() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(header("X-Api-Key", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": 1})))
            .mount(&mock_server)
            .await;

        let mut config = test_config();
        config.token_header = "X-Api-Key".to_string();
        let transport = HttpTransport::new(&config, "abc").unwrap();
        let result = transport
            .fetch(&EndpointId::new(format!("{}/anything", mock_server.uri())))
            .await;

        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_fetch_empty_body_is_decode_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(&test_config(), "t").unwrap();
        let result = transport
            .fetch(&EndpointId::new(format!("{}/empty", mock_server.uri())))
            .await;

        assert_eq!(result.status.code(), Some(204));
        assert_eq!(result.body, Err(DecodeFailure::Empty));
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_fetch_error_status_keeps_decoded_payload() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(serde_json::json!({"message": "forbidden"})),
            )
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(&test_config(), "t").unwrap();
        let result = transport
            .fetch(&EndpointId::new(format!("{}/secret", mock_server.uri())))
            .await;

        assert_eq!(result.status.code(), Some(403));
        assert!(result.body.is_ok());
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_fetch_plain_text_is_content_type_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(&test_config(), "t").unwrap();
        let result = transport
            .fetch(&EndpointId::new(format!("{}/text", mock_server.uri())))
            .await;

        assert_eq!(result.status.code(), Some(200));
        assert!(matches!(result.body, Err(DecodeFailure::ContentType(_))));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_transport_status() {
        // Bind then drop a listener to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = HttpTransport::new(&test_config(), "t").unwrap();
        let result = transport
            .fetch(&EndpointId::new(format!("http://127.0.0.1:{}/x", port)))
            .await;

        assert!(matches!(result.status, ResponseStatus::Transport { .. }));
        assert_eq!(result.body, Err(DecodeFailure::NoResponse));
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_transport_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let mut config = test_config();
        config.fetch.request_timeout = Duration::from_millis(200);
        let transport = HttpTransport::new(&config, "t").unwrap();
        let result = transport
            .fetch(&EndpointId::new(format!("{}/slow", mock_server.uri())))
            .await;

        assert!(matches!(
            result.status,
            ResponseStatus::Transport { timeout: true, .. }
        ));
    }

    #[test]
    fn test_rejects_token_with_newline() {
        assert!(HttpTransport::new(&Config::default(), "abc\ndef").is_err());
    }
}
