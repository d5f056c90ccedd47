//! Client for the network daemon's local API.
//!
//! [`LocalClient`] is the seam the tray engine talks through; [`HttpLocalClient`]
//! implements it over the daemon's HTTP endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{ProfileId, WatchOptions},
    error::ApiError,
    protocol::{ExitNodeSuggestion, LoginProfile, MaskedPrefs, Notify, Prefs, Status},
};
use tracing::debug;
use url::Url;

pub mod error;

pub use error::{is_cancellation, ClientError};

const LOCALAPI_PREFIX: &str = "localapi/v0/";
const LOCALAPI_HEADER: &str = "Sec-Tailscale";
const LOCALAPI_HEADER_VALUE: &str = "localapi";

#[async_trait]
pub trait LocalClient: Send + Sync {
    async fn status(&self) -> Result<Status>;
    /// Returns the current profile and every known profile.
    async fn profile_status(&self) -> Result<(LoginProfile, Vec<LoginProfile>)>;
    async fn edit_prefs(&self, prefs: &MaskedPrefs) -> Result<Prefs>;
    async fn switch_profile(&self, profile_id: &ProfileId) -> Result<()>;
    async fn set_use_exit_node(&self, enabled: bool) -> Result<()>;
    async fn suggest_exit_node(&self) -> Result<ExitNodeSuggestion>;
    async fn watch_ipn_bus(&self, options: WatchOptions) -> Result<Box<dyn BusWatcher>>;
}

/// An open subscription to the daemon's notification bus.
#[async_trait]
pub trait BusWatcher: Send {
    /// Waits for the next notification. Errors once the stream is broken.
    async fn next(&mut self) -> Result<Notify>;
    async fn close(self: Box<Self>);
}

pub struct HttpLocalClient {
    http: Client,
    base_url: Url,
    password: Option<String>,
}

impl HttpLocalClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            password: None,
        })
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(LOCALAPI_PREFIX)?.join(path)?)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let mut builder = self
            .http
            .request(method, self.endpoint(path)?)
            .header(LOCALAPI_HEADER, LOCALAPI_HEADER_VALUE);
        if let Some(password) = &self.password {
            builder = builder.basic_auth("", Some(password));
        }
        Ok(builder)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        let res = builder.send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let body = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiError>(&body)
            .map(|err| err.message)
            .unwrap_or_else(|_| body.trim().to_string());
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let res = self.send(self.request(Method::GET, path)?).await?;
        let body = res.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl LocalClient for HttpLocalClient {
    async fn status(&self) -> Result<Status> {
        self.get_json("status")
            .await
            .context("fetching daemon status")
    }

    async fn profile_status(&self) -> Result<(LoginProfile, Vec<LoginProfile>)> {
        let current = self
            .get_json("profiles/current")
            .await
            .context("fetching current profile")?;
        let all = self
            .get_json("profiles/")
            .await
            .context("fetching profiles")?;
        Ok((current, all))
    }

    async fn edit_prefs(&self, prefs: &MaskedPrefs) -> Result<Prefs> {
        let res = self
            .send(self.request(Method::PATCH, "prefs")?.json(prefs))
            .await
            .context("editing prefs")?;
        let body = res.bytes().await.map_err(ClientError::from)?;
        Ok(serde_json::from_slice(&body).map_err(ClientError::from)?)
    }

    async fn switch_profile(&self, profile_id: &ProfileId) -> Result<()> {
        let path = format!("profiles/{profile_id}");
        self.send(self.request(Method::POST, &path)?)
            .await
            .with_context(|| format!("switching to profile {profile_id}"))?;
        Ok(())
    }

    async fn set_use_exit_node(&self, enabled: bool) -> Result<()> {
        let builder = self
            .request(Method::POST, "set-use-exit-node-enabled")?
            .query(&[("enabled", enabled)]);
        self.send(builder)
            .await
            .context("toggling exit node use")?;
        Ok(())
    }

    async fn suggest_exit_node(&self) -> Result<ExitNodeSuggestion> {
        self.get_json("suggest-exit-node")
            .await
            .context("requesting exit node suggestion")
    }

    async fn watch_ipn_bus(&self, options: WatchOptions) -> Result<Box<dyn BusWatcher>> {
        let builder = self
            .request(Method::GET, "watch-ipn-bus")?
            .query(&[("mask", options.mask())]);
        let response = self
            .send(builder)
            .await
            .context("watching ipn bus")?;
        debug!(mask = options.mask(), "ipn bus subscription opened");
        Ok(Box::new(HttpBusWatcher {
            response,
            buf: Vec::new(),
        }))
    }
}

/// Reads newline-delimited JSON notifications off a streaming response body.
struct HttpBusWatcher {
    response: Response,
    buf: Vec<u8>,
}

#[async_trait]
impl BusWatcher for HttpBusWatcher {
    async fn next(&mut self) -> Result<Notify> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                return Ok(serde_json::from_str(line).map_err(ClientError::from)?);
            }
            match self.response.chunk().await.map_err(ClientError::from)? {
                Some(chunk) => self.buf.extend_from_slice(&chunk),
                None => return Err(ClientError::StreamClosed.into()),
            }
        }
    }

    async fn close(self: Box<Self>) {
        debug!(buffered = self.buf.len(), "ipn bus subscription closed");
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
