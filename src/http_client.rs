use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use std::time::Duration;

/// Status and raw body of an HTTP response. Classifying it is up to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outgoing HTTP used by the notifiers. An `Err` means the request never produced
/// a response (connection refused, DNS, timeout...).
///
/// Errors never carry the request URL: bot tokens live in it.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_json(&self, url: &str, body: &serde_json::Value, timeout: Duration) -> Result<HttpReply>;

    async fn post_form(&self, url: &str, form: &[(&str, String)], timeout: Duration) -> Result<HttpReply>;
}

/// Creates the HTTP client shared by all notifiers
pub fn create_http_client(user_agent: &str) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("application/json")
    );

    let client = Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    Ok(client)
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self> {
        Ok(Self {
            client: create_http_client(user_agent)?,
        })
    }

    async fn into_reply(response: reqwest::Response) -> Result<HttpReply> {
        let status = response.status().as_u16();
        let body = response.text().await
            .context("Failed to read response body")?;
        Ok(HttpReply { status, body })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(&self, url: &str, body: &serde_json::Value, timeout: Duration) -> Result<HttpReply> {
        let response = self.client.post(url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| e.without_url())?;
        Self::into_reply(response).await
    }

    async fn post_form(&self, url: &str, form: &[(&str, String)], timeout: Duration) -> Result<HttpReply> {
        let response = self.client.post(url)
            .form(form)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| e.without_url())?;
        Self::into_reply(response).await
    }
}
