//! Network collaborator: the `Fetch` capability and its reqwest-backed
//! implementation.

use async_trait::async_trait;
use std::time::Duration;

use crate::cache::{Request, Snapshot};
use crate::error::{CacheError, Result};

/// How a response relates to the request that produced it.
///
/// Only direct responses are eligible for write-back. Redirected and
/// cross-origin responses are passed through to the caller uncached, since
/// caching them could later serve stale or wrong-origin content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
  /// Same-origin response served without redirects
  Direct,
  /// The network layer followed one or more redirects
  Redirected,
  /// Response from a different origin than the request
  CrossOrigin,
}

/// A response obtained from the network collaborator.
#[derive(Debug, Clone)]
pub struct NetworkResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub kind: ResponseKind,
}

impl NetworkResponse {
  /// Whether this response may be persisted into a generation.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 && self.kind == ResponseKind::Direct
  }

  /// Capture a snapshot, leaving the response untouched.
  ///
  /// The captured copy and the response are independent: persisting one can
  /// never exhaust or alias the other.
  pub fn snapshot(&self) -> Snapshot {
    Snapshot {
      status: self.status,
      headers: self.headers.clone(),
      body: self.body.clone(),
    }
  }

  /// Consume the response into the snapshot handed to the caller.
  pub fn into_snapshot(self) -> Snapshot {
    Snapshot {
      status: self.status,
      headers: self.headers,
      body: self.body,
    }
  }
}

/// Abstract network capability used by install and request resolution.
#[async_trait]
pub trait Fetch: Send + Sync {
  /// Issue the request, returning a response or a network failure.
  async fn fetch(&self, request: &Request) -> Result<NetworkResponse>;
}

/// HTTP fetcher backed by reqwest.
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  /// Build a fetcher with the default client settings.
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("qrcache/", env!("CARGO_PKG_VERSION")))
      .timeout(Duration::from_secs(30))
      .build()?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Fetch for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<NetworkResponse> {
    let method: reqwest::Method =
      request
        .method
        .parse()
        .map_err(|_| CacheError::InvalidResource {
          path: request.method.clone(),
          reason: "unsupported method".to_string(),
        })?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| CacheError::NetworkUnavailable {
        url: request.url.to_string(),
        reason: e.to_string(),
      })?;

    // The client follows redirects, so a final URL differing from the
    // requested one means the response is not a direct result.
    let final_url = response.url().clone();
    let kind = if final_url.origin() != request.url.origin() {
      ResponseKind::CrossOrigin
    } else if final_url != request.url {
      ResponseKind::Redirected
    } else {
      ResponseKind::Direct
    };

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .map(|(name, value)| {
        (
          name.to_string(),
          String::from_utf8_lossy(value.as_bytes()).into_owned(),
        )
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| CacheError::NetworkUnavailable {
        url: request.url.to_string(),
        reason: e.to_string(),
      })?
      .to_vec();

    Ok(NetworkResponse {
      status,
      headers,
      body,
      kind,
    })
  }
}

#[cfg(test)]
pub(crate) mod testing {
  //! Scripted fetcher for exercising the cache without a network.

  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  use async_trait::async_trait;

  use crate::cache::Request;
  use crate::error::{CacheError, Result};

  use super::{Fetch, NetworkResponse, ResponseKind};

  /// Fetcher that serves canned responses and counts every call.
  ///
  /// URLs without a canned response fail as network-unavailable.
  pub struct StaticFetcher {
    routes: Mutex<HashMap<String, NetworkResponse>>,
    calls: AtomicUsize,
  }

  impl StaticFetcher {
    pub fn new() -> Self {
      Self {
        routes: Mutex::new(HashMap::new()),
        calls: AtomicUsize::new(0),
      }
    }

    /// Serve `body` as a direct 200 response for `url`.
    pub fn ok(self, url: &str, body: &[u8]) -> Self {
      self.respond(
        url,
        NetworkResponse {
          status: 200,
          headers: vec![("content-type".to_string(), "text/plain".to_string())],
          body: body.to_vec(),
          kind: ResponseKind::Direct,
        },
      )
    }

    /// Serve an arbitrary canned response for `url`.
    pub fn respond(self, url: &str, response: NetworkResponse) -> Self {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), response);
      self
    }

    /// Number of fetches issued so far.
    pub fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl Fetch for StaticFetcher {
    async fn fetch(&self, request: &Request) -> Result<NetworkResponse> {
      self.calls.fetch_add(1, Ordering::SeqCst);

      let routes = self.routes.lock().unwrap();
      match routes.get(request.url.as_str()) {
        Some(response) => Ok(response.clone()),
        None => Err(CacheError::NetworkUnavailable {
          url: request.url.to_string(),
          reason: "unreachable".to_string(),
        }),
      }
    }
  }
}
