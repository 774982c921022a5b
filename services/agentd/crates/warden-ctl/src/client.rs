//! Blocking HTTP client for the agent daemon.

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use warden_common::{Envelope, endpoint};

pub struct AgentClient {
    base_url: String,
    agent: ureq::Agent,
}

impl AgentClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            agent: ureq::AgentBuilder::new()
                .timeout(std::time::Duration::from_secs(30))
                .build(),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = endpoint(&self.base_url, path);
        Self::unwrap_envelope(self.agent.get(&url).call(), &url)
    }

    /// `GET path?limit=N`.
    pub fn get_limited<T: DeserializeOwned>(&self, path: &str, limit: usize) -> Result<T> {
        let url = endpoint(&self.base_url, path);
        Self::unwrap_envelope(
            self.agent
                .get(&url)
                .query("limit", &limit.to_string())
                .call(),
            &url,
        )
    }

    pub fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = endpoint(&self.base_url, path);
        Self::unwrap_envelope(self.agent.post(&url).send_json(body), &url)
    }

    /// Error statuses still carry an envelope; only transport failures
    /// have no body to decode.
    fn unwrap_envelope<T: DeserializeOwned>(
        result: Result<ureq::Response, ureq::Error>,
        url: &str,
    ) -> Result<T> {
        let response = match result {
            Ok(response) | Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => {
                return Err(anyhow!(transport))
                    .with_context(|| format!("cannot reach agent at {url}"));
            }
        };
        let envelope: Envelope<T> = response
            .into_json()
            .with_context(|| format!("invalid response from {url}"))?;
        Ok(envelope.into_result()?)
    }
}
