//! HTTP GET test backed by `reqwest::blocking`.
//!
//! A response of any status is an outcome (successful below 400). Failing to
//! get a response at all is an [`InvocationError`].

use std::fmt;
use std::time::{Duration, Instant};

pub use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::invocable::{Invocable, InvocationError, Outcome, TestId};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking client with a per-request timeout, shareable between tests.
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpOutcome {
    pub status: u16,
    pub bytes: u64,
    /// Time from sending the request to reading the whole body.
    pub elapsed: Duration,
}

impl Outcome for HttpOutcome {
    fn is_successful(&self) -> bool {
        self.status < 400
    }
}

#[derive(Debug, Clone)]
pub struct HttpTest {
    id: TestId,
    description: String,
    url: String,
    client: Client,
}

impl HttpTest {
    pub fn new(
        id: TestId,
        description: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InvocationError> {
        let client = build_client(timeout).map_err(|e| InvocationError::Other {
            test: id,
            message: format!("build HTTP client: {e}"),
        })?;
        Ok(Self::with_client(id, description, url, client))
    }

    /// Share one connection pool between several tests.
    pub fn with_client(
        id: TestId,
        description: impl Into<String>,
        url: impl Into<String>,
        client: Client,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Invocable for HttpTest {
    type Output = HttpOutcome;

    fn id(&self) -> TestId {
        self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn invoke(&self) -> Result<HttpOutcome, InvocationError> {
        let started = Instant::now();
        let response = self.client.get(&self.url).send().map_err(|e| {
            if e.is_timeout() {
                InvocationError::Timeout { test: self.id }
            } else {
                InvocationError::Transport {
                    test: self.id,
                    message: e.to_string(),
                }
            }
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| InvocationError::Transport {
            test: self.id,
            message: format!("read body: {e}"),
        })?;

        Ok(HttpOutcome {
            status,
            bytes: body.len() as u64,
            elapsed: started.elapsed(),
        })
    }
}

impl fmt::Display for HttpTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            write!(f, "Test {} GET {}", self.id, self.url)
        } else {
            write!(f, "Test {} ({}) GET {}", self.id, self.description, self.url)
        }
    }
}
