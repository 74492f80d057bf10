//! Client-mode HTTP calls against a running daemon's control surface
//! (spec §6 "HTTP control surface"). Everything the CLI does outside
//! `-d` (daemon mode) goes through here.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not reach daemon at {url}: {source}")]
    Connect { url: String, source: reqwest::Error },
    #[error("daemon returned {status}")]
    Status { status: reqwest::StatusCode },
    #[error("malformed daemon response: {0}")]
    Decode(#[from] reqwest::Error),
}

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub kind: String,
    pub state: String,
    pub monitored: bool,
    pub pending_action: Option<String>,
    pub pid: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub up: usize,
    pub down: usize,
    pub initializing: usize,
    pub unmonitored: usize,
}

impl Client {
    pub fn new(addr: std::net::SocketAddr, credentials: Option<(String, String)>) -> Self {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(10));
        if let Some((user, pass)) = credentials {
            let mut headers = reqwest::header::HeaderMap::new();
            let encoded = {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"))
            };
            if let Ok(value) = reqwest::header::HeaderValue::from_str(&format!("Basic {encoded}")) {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
            builder = builder.default_headers(headers);
        }
        Self { http: builder.build().unwrap_or_default(), base_url: format!("http://{addr}") }
    }

    pub async fn status(&self) -> Result<Vec<ServiceStatus>, ClientError> {
        self.get_json("/_status").await
    }

    pub async fn summary(&self) -> Result<Summary, ClientError> {
        self.get_json("/_summary").await
    }

    pub async fn report(&self, filter: Option<&str>) -> Result<Summary, ClientError> {
        let path = match filter {
            Some(filter) => format!("/_report?filter={filter}"),
            None => "/_report".to_string(),
        };
        self.get_json(&path).await
    }

    pub async fn do_action(&self, service: &str, action: &str) -> Result<(), ClientError> {
        let url = format!("{}/_doaction?action={action}&service={service}", self.base_url);
        let response = self.http.post(&url).send().await.map_err(|source| ClientError::Connect { url: url.clone(), source })?;
        if !response.status().is_success() {
            return Err(ClientError::Status { status: response.status() });
        }
        Ok(())
    }

    pub async fn reload(&self) -> Result<(), ClientError> {
        let url = format!("{}/_runtime?action=validate", self.base_url);
        let response = self.http.post(&url).send().await.map_err(|source| ClientError::Connect { url: url.clone(), source })?;
        if !response.status().is_success() {
            return Err(ClientError::Status { status: response.status() });
        }
        Ok(())
    }

    pub async fn quit(&self) -> Result<(), ClientError> {
        let url = format!("{}/_runtime?action=stop", self.base_url);
        let response = self.http.post(&url).send().await.map_err(|source| ClientError::Connect { url: url.clone(), source })?;
        if !response.status().is_success() {
            return Err(ClientError::Status { status: response.status() });
        }
        Ok(())
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.get(&url).send().await.map_err(|source| ClientError::Connect { url: url.clone(), source })?;
        if !response.status().is_success() {
            return Err(ClientError::Status { status: response.status() });
        }
        Ok(response.json().await?)
    }
}
