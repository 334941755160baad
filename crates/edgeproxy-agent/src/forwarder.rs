use edgeproxy_proto::{
    is_hop_by_hop, HttpMethod, HttpRequestPayload, HttpResponsePayload, StringMap,
};
use reqwest::header::COOKIE;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while forwarding an HTTP request
#[derive(Error, Debug)]
pub enum ForwarderError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("{0}")]
    Http(#[from] reqwest::Error),
}

/// Performs dispatched HTTP requests against the local network
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
}

impl HttpForwarder {
    /// Create a forwarder whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, ForwarderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ForwarderError::Client)?;

        Ok(Self { client })
    }

    /// Execute the request and describe the outcome as a reply payload
    ///
    /// Upstream failures become a 502 reply with a descriptive body.
    pub async fn forward(&self, request: &HttpRequestPayload) -> HttpResponsePayload {
        match self.try_forward(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    method = %request.method,
                    url = %request.url,
                    error = %e,
                    "Upstream request failed"
                );
                HttpResponsePayload::bad_gateway(format!("HTTP request failed: {}", e))
            }
        }
    }

    /// Execute the request, surfacing upstream failures as errors
    pub async fn try_forward(
        &self,
        request: &HttpRequestPayload,
    ) -> Result<HttpResponsePayload, ForwarderError> {
        let mut builder = self
            .client
            .request(reqwest_method(request.method), request.url.as_str());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if !request.cookies.is_empty() {
            builder = builder.header(COOKIE, cookie_header(&request.cookies));
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status_code = response.status().as_u16();

        let mut headers = StringMap::new();
        for (name, value) in response.headers() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            match value.to_str() {
                Ok(value) => {
                    headers.insert(name.as_str().to_string(), value.to_string());
                }
                Err(_) => tracing::debug!(header = %name, "Skipping non-text response header"),
            }
        }

        let body = response.text().await?;

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status = status_code,
            "Upstream request completed"
        );

        Ok(HttpResponsePayload {
            status_code,
            headers,
            body,
        })
    }
}

fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

/// Render cookies as one `Cookie` header value, sorted by name
fn cookie_header(cookies: &StringMap) -> String {
    let mut pairs: Vec<_> = cookies.iter().collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header() {
        let mut cookies = StringMap::new();
        cookies.insert("session".to_string(), "abc".to_string());
        cookies.insert("lang".to_string(), "en".to_string());

        assert_eq!(cookie_header(&cookies), "lang=en; session=abc");
    }

    #[test]
    fn test_method_mapping() {
        assert_eq!(reqwest_method(HttpMethod::Get), reqwest::Method::GET);
        assert_eq!(reqwest_method(HttpMethod::Delete), reqwest::Method::DELETE);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_becomes_bad_gateway() {
        // Bind then release a port so nothing is listening on it
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let forwarder = HttpForwarder::new(Duration::from_secs(5)).unwrap();
        let reply = forwarder
            .forward(&HttpRequestPayload::new(
                HttpMethod::Get,
                format!("http://{}/", addr),
            ))
            .await;

        assert_eq!(reply.status_code, 502);
        assert!(reply.body.starts_with("HTTP request failed: "));
        assert!(reply.headers.is_empty());
    }
}
