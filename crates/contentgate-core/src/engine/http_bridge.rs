use async_trait::async_trait;

use super::{EngineBridge, EngineRequest, EngineResponse};
use crate::error::EngineError;

/// Bridge to an engine served on a local HTTP origin.
#[derive(Debug, Clone)]
pub struct HttpEngineBridge {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEngineBridge {
    /// Creates a bridge for `base_url` (e.g. `http://127.0.0.1:8088`).
    ///
    /// Timeouts are enforced by the [`super::EngineAdapter`], not here.
    pub fn new(base_url: impl Into<String>) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| EngineError::failed(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl EngineBridge for HttpEngineBridge {
    async fn execute(&self, request: EngineRequest) -> Result<EngineResponse, EngineError> {
        let url = format!("{}{}", self.base_url, request.path);

        // Bodies are read as-is; a compressed reply would not parse as JSON.
        let mut headers = request.headers;
        headers.remove(http::header::ACCEPT_ENCODING);

        let mut builder = self
            .client
            .request(request.method, url)
            .headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                EngineError::unreachable(e.to_string())
            } else {
                EngineError::failed(e.to_string())
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| EngineError::failed(format!("Failed to read engine response body: {e}")))?;

        Ok(EngineResponse {
            status,
            headers,
            body,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Payload;
    use http::header::{ACCEPT, ACCEPT_ENCODING};
    use http::{HeaderValue, Method, StatusCode};
    use wiremock::matchers::{body_string, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_forwards_method_path_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/jsonapi/node/article/42"))
            .and(query_param("include", "uid"))
            .and(header("accept", "application/vnd.api+json"))
            .and(body_string(r#"{"data":{}}"#))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/vnd.api+json")
                    .set_body_string(r#"{"data":{"id":"42"}}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let bridge = HttpEngineBridge::new(format!("{}/", server.uri())).unwrap();
        let request = EngineRequest::new(Method::PATCH, "/jsonapi/node/article/42?include=uid")
            .with_header(ACCEPT, HeaderValue::from_static("application/vnd.api+json"))
            .with_body(bytes::Bytes::from(r#"{"data":{}}"#));

        let response = bridge.execute(request).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], br#"{"data":{"id":"42"}}"#);
        assert_eq!(
            response.headers["content-type"],
            "application/vnd.api+json"
        );
    }

    #[tokio::test]
    async fn test_never_asks_for_compressed_bodies() {
        let server = MockServer::start().await;
        Mock::given(path("/jsonapi/node/article"))
            .and(header_exists("accept-encoding"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-encoding", "gzip")
                    .set_body_bytes(vec![0x1f, 0x8b, 0x08, 0x00, 0xde, 0xad, 0xbe, 0xef]),
            )
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(path("/jsonapi/node/article"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":[]}"#))
            .mount(&server)
            .await;

        let bridge = HttpEngineBridge::new(server.uri()).unwrap();
        let request = EngineRequest::get("/jsonapi/node/article")
            .with_header(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));

        let response = bridge.execute(request).await.unwrap();
        assert_eq!(
            response.payload(),
            Payload::Json(serde_json::json!({"data": []}))
        );
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let bridge = HttpEngineBridge::new(server.uri()).unwrap();
        let response = bridge.execute(EngineRequest::get("/missing")).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unreachable_engine() {
        // Port 9 (discard) is closed on test hosts
        let bridge = HttpEngineBridge::new("http://127.0.0.1:9").unwrap();
        let err = bridge.execute(EngineRequest::get("/")).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Unreachable(_) | EngineError::Failed(_)
        ));
    }
}
