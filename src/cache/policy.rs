//! Cache-first request resolution with network fallback and write-back.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::net::Fetch;

use super::store::GenerationStore;
use super::types::{GenerationLabel, Request, Resolved, ResourceId};

/// Resolution policy for intercepted requests.
///
/// Cache strictly precedes network, with no freshness check: correctness of
/// the cached set is owned by the install/activate generation mechanism,
/// not by per-entry staleness.
pub struct FetchPolicy<S, F> {
  store: Arc<S>,
  fetcher: Arc<F>,
  /// Document served when a navigation cannot reach the network.
  fallback: ResourceId,
}

impl<S: GenerationStore, F: Fetch> FetchPolicy<S, F> {
  pub fn new(store: Arc<S>, fetcher: Arc<F>, fallback: ResourceId) -> Self {
    Self {
      store,
      fetcher,
      fallback,
    }
  }

  /// Resolve one request against the given generation.
  ///
  /// 1. A stored snapshot is returned immediately.
  /// 2. On a miss the request goes to the network; if that fails, document
  ///    navigations fall back to the stored fallback document.
  /// 3. Successful direct 200 responses are written back; everything else
  ///    passes through uncached.
  pub async fn resolve(&self, generation: &GenerationLabel, request: &Request) -> Result<Resolved> {
    let id = ResourceId::from_request(request);

    if let Some(snapshot) = self.store.lookup(generation, &id)? {
      debug!(resource = %id, "serving from cache");
      return Ok(Resolved::from_cache(snapshot));
    }

    debug!(resource = %id, "cache miss, fetching from network");
    let response = match self.fetcher.fetch(request).await {
      Ok(response) => response,
      Err(err @ CacheError::NetworkUnavailable { .. }) => {
        if request.is_navigation() {
          if let Some(snapshot) = self.store.lookup(generation, &self.fallback)? {
            warn!(resource = %id, "network unavailable, serving fallback document");
            return Ok(Resolved::fallback(snapshot));
          }
        }
        return Err(err);
      }
      Err(err) => return Err(err),
    };

    if response.is_cacheable() {
      // The persisted snapshot is captured before the response is handed
      // back, so the caller's copy and the stored copy are independent.
      let snapshot = response.snapshot();
      if let Err(err) = self.store.put(generation, &id, &snapshot) {
        // The in-flight response is still served; it just stays uncached.
        warn!(resource = %id, error = %err, "write-back failed");
      }
    } else {
      debug!(resource = %id, status = response.status, "response not cacheable, passing through");
    }

    Ok(Resolved::from_network(response.into_snapshot()))
  }
}

impl<S, F> Clone for FetchPolicy<S, F> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      fetcher: Arc::clone(&self.fetcher),
      fallback: self.fallback.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  use crate::cache::store::{GenerationInfo, SqliteStore};
  use crate::cache::types::{ServedFrom, Snapshot};
  use crate::net::testing::StaticFetcher;
  use crate::net::{NetworkResponse, ResponseKind};

  fn origin() -> Url {
    Url::parse("https://qr.example.app").unwrap()
  }

  fn g1() -> GenerationLabel {
    GenerationLabel::new("g1")
  }

  fn resource(path: &str) -> ResourceId {
    ResourceId::from_origin_path(&origin(), path).unwrap()
  }

  fn request(path: &str) -> Request {
    Request::get(origin().join(path).unwrap())
  }

  fn snapshot(body: &[u8]) -> Snapshot {
    Snapshot {
      status: 200,
      headers: Vec::new(),
      body: body.to_vec(),
    }
  }

  fn policy(
    store: Arc<SqliteStore>,
    fetcher: Arc<StaticFetcher>,
  ) -> FetchPolicy<SqliteStore, StaticFetcher> {
    FetchPolicy::new(store, fetcher, resource("/index.html"))
  }

  fn seeded_store() -> Arc<SqliteStore> {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.open_generation(&g1()).unwrap();
    store
  }

  #[tokio::test]
  async fn test_cache_hit_issues_no_network_call() {
    let store = seeded_store();
    store.put(&g1(), &resource("/a.css"), &snapshot(b"cached")).unwrap();

    let fetcher = Arc::new(StaticFetcher::new());
    let policy = policy(Arc::clone(&store), Arc::clone(&fetcher));

    let resolved = policy.resolve(&g1(), &request("/a.css")).await.unwrap();

    assert_eq!(resolved.served_from, ServedFrom::Cache);
    assert_eq!(resolved.snapshot.body, b"cached");
    assert_eq!(fetcher.calls(), 0);
  }

  #[tokio::test]
  async fn test_miss_fetches_and_writes_back_once() {
    let store = seeded_store();
    let fetcher = Arc::new(
      StaticFetcher::new().ok("https://qr.example.app/missing.png", b"png bytes"),
    );
    let policy = policy(Arc::clone(&store), Arc::clone(&fetcher));

    let first = policy.resolve(&g1(), &request("/missing.png")).await.unwrap();
    let second = policy.resolve(&g1(), &request("/missing.png")).await.unwrap();

    assert_eq!(first.served_from, ServedFrom::Network);
    assert_eq!(second.served_from, ServedFrom::Cache);
    assert_eq!(first.snapshot.body, second.snapshot.body);

    // Exactly one snapshot is stored for the identifier.
    let info = store.describe().unwrap();
    assert_eq!(info[0].entries, 1);
    assert_eq!(fetcher.calls(), 1);
  }

  #[tokio::test]
  async fn test_navigation_falls_back_to_root_document() {
    let store = seeded_store();
    store
      .put(&g1(), &resource("/index.html"), &snapshot(b"<html>offline</html>"))
      .unwrap();

    let fetcher = Arc::new(StaticFetcher::new());
    let policy = policy(store, fetcher);

    let navigation = Request::navigation(origin().join("/somewhere").unwrap());
    let resolved = policy.resolve(&g1(), &navigation).await.unwrap();

    assert_eq!(resolved.served_from, ServedFrom::Fallback);
    assert_eq!(resolved.snapshot.body, b"<html>offline</html>");
  }

  #[tokio::test]
  async fn test_subresource_failure_propagates() {
    let store = seeded_store();
    store
      .put(&g1(), &resource("/index.html"), &snapshot(b"offline"))
      .unwrap();

    let policy = policy(store, Arc::new(StaticFetcher::new()));
    let err = policy.resolve(&g1(), &request("/gone.js")).await.unwrap_err();

    assert!(matches!(err, CacheError::NetworkUnavailable { .. }));
  }

  #[tokio::test]
  async fn test_navigation_without_fallback_propagates() {
    let store = seeded_store();
    let policy = policy(store, Arc::new(StaticFetcher::new()));

    let navigation = Request::navigation(origin().join("/somewhere").unwrap());
    let err = policy.resolve(&g1(), &navigation).await.unwrap_err();

    assert!(matches!(err, CacheError::NetworkUnavailable { .. }));
  }

  #[tokio::test]
  async fn test_uncacheable_responses_pass_through_unstored() {
    let store = seeded_store();
    let fetcher = Arc::new(
      StaticFetcher::new()
        .respond(
          "https://qr.example.app/moved.css",
          NetworkResponse {
            status: 200,
            headers: Vec::new(),
            body: b"redirected".to_vec(),
            kind: ResponseKind::Redirected,
          },
        )
        .respond(
          "https://qr.example.app/gone.png",
          NetworkResponse {
            status: 404,
            headers: Vec::new(),
            body: b"not found".to_vec(),
            kind: ResponseKind::Direct,
          },
        ),
    );
    let policy = policy(Arc::clone(&store), fetcher);

    let moved = policy.resolve(&g1(), &request("/moved.css")).await.unwrap();
    assert_eq!(moved.served_from, ServedFrom::Network);
    assert_eq!(moved.snapshot.body, b"redirected");

    let gone = policy.resolve(&g1(), &request("/gone.png")).await.unwrap();
    assert_eq!(gone.snapshot.status, 404);

    assert!(store.lookup(&g1(), &resource("/moved.css")).unwrap().is_none());
    assert!(store.lookup(&g1(), &resource("/gone.png")).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_write_back_failure_still_serves_response() {
    let store = Arc::new(FullStore {
      inner: SqliteStore::open_in_memory().unwrap(),
    });
    store.open_generation(&g1()).unwrap();

    let fetcher = Arc::new(StaticFetcher::new().ok("https://qr.example.app/a.css", b"css"));
    let policy = FetchPolicy::new(Arc::clone(&store), fetcher, resource("/index.html"));

    let resolved = policy.resolve(&g1(), &request("/a.css")).await.unwrap();

    assert_eq!(resolved.served_from, ServedFrom::Network);
    assert_eq!(resolved.snapshot.body, b"css");
    assert!(store.lookup(&g1(), &resource("/a.css")).unwrap().is_none());
  }

  /// Store whose `put` always reports exhausted capacity.
  struct FullStore {
    inner: SqliteStore,
  }

  impl GenerationStore for FullStore {
    fn open_generation(&self, label: &GenerationLabel) -> Result<()> {
      self.inner.open_generation(label)
    }

    fn insert_batch(
      &self,
      label: &GenerationLabel,
      entries: &[(ResourceId, Snapshot)],
    ) -> Result<()> {
      self.inner.insert_batch(label, entries)
    }

    fn lookup(&self, label: &GenerationLabel, id: &ResourceId) -> Result<Option<Snapshot>> {
      self.inner.lookup(label, id)
    }

    fn put(&self, _label: &GenerationLabel, _id: &ResourceId, _snapshot: &Snapshot) -> Result<()> {
      Err(CacheError::StorageCapacity)
    }

    fn list_generations(&self) -> Result<Vec<GenerationLabel>> {
      self.inner.list_generations()
    }

    fn delete_generation(&self, label: &GenerationLabel) -> Result<()> {
      self.inner.delete_generation(label)
    }

    fn describe(&self) -> Result<Vec<GenerationInfo>> {
      self.inner.describe()
    }
  }
}
