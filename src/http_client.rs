//! External HTTP collaborators: fetching a peer's `/remailer-conf.txt` and
//! POSTing an outbound envelope to its `/collector.py/msg` endpoint (spec
//! §6). The trait boundary is the in-scope part; the concrete reqwest
//! client is the production implementation, not itself load-bearing for the
//! core's correctness (ground: `forwarder/src/uplink.rs`'s client/error
//! style).

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("connect error: {0}")]
    Connect(String),
    #[error("non-2xx response: {0}")]
    NonSuccess(u16),
    #[error("request timed out")]
    Timeout,
}

/// Fetches a peer descriptor document by address.
#[async_trait::async_trait]
pub trait DescriptorFetcher {
    async fn fetch_descriptor(&self, address: &str) -> Result<String, HttpError>;
}

/// Posts a base64 envelope body to a peer's collector endpoint.
#[async_trait::async_trait]
pub trait EnvelopePoster {
    async fn post_envelope(&self, address: &str, base64_body: &str) -> Result<(), HttpError>;
}

/// Production implementation backed by `reqwest`, with a bounded per-request
/// timeout per the concurrency model's suspension-point requirement (spec
/// §5: "an implementation must therefore set bounded timeouts on all
/// external I/O").
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is valid");
        ReqwestClient { client }
    }
}

#[async_trait::async_trait]
impl DescriptorFetcher for ReqwestClient {
    async fn fetch_descriptor(&self, address: &str) -> Result<String, HttpError> {
        let url = format!("http://{address}/remailer-conf.txt");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        if !response.status().is_success() {
            return Err(HttpError::NonSuccess(response.status().as_u16()));
        }
        response.text().await.map_err(classify_reqwest_error)
    }
}

#[async_trait::async_trait]
impl EnvelopePoster for ReqwestClient {
    async fn post_envelope(&self, address: &str, base64_body: &str) -> Result<(), HttpError> {
        let url = format!("http://{address}/collector.py/msg");
        let response = self
            .client
            .post(&url)
            .form(&[("base64", base64_body)])
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(HttpError::NonSuccess(response.status().as_u16()))
        }
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> HttpError {
    if err.is_timeout() {
        HttpError::Timeout
    } else {
        HttpError::Connect(err.to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn stub_fetcher_returns_configured_descriptor() {
        let mut client = StubHttpClient::default();
        client
            .descriptors
            .insert("peerb.example.com".to_owned(), "Name: peerb\n".to_owned());

        let text = client.fetch_descriptor("peerb.example.com").await.unwrap();
        assert_eq!(text, "Name: peerb\n");
    }

    #[tokio::test]
    async fn stub_fetcher_errors_on_unknown_address() {
        let client = StubHttpClient::default();
        assert!(client.fetch_descriptor("nobody.example.com").await.is_err());
    }

    #[tokio::test]
    async fn stub_poster_records_posted_bodies() {
        let client = StubHttpClient::default();
        client.post_envelope("peerb.example.com", "cGF5bG9hZA==").await.unwrap();
        assert_eq!(
            client.posted.borrow()[0],
            ("peerb.example.com".to_owned(), "cGF5bG9hZA==".to_owned())
        );
    }
}
