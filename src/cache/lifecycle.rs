//! Lifecycle controller: install, activation, and request interception.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{CacheError, Result};
use crate::manifest::Manifest;
use crate::net::Fetch;

use super::policy::FetchPolicy;
use super::store::GenerationStore;
use super::types::{GenerationLabel, Request, Resolved, ResourceId, Snapshot};

/// Phases of one generation's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// Created, not yet populated
  Installing,
  /// Fully populated, not yet serving traffic
  Waiting,
  /// The generation serving intercepted requests
  Active,
  /// Displaced by a newer activated generation
  Superseded,
}

impl Phase {
  fn name(self) -> &'static str {
    match self {
      Phase::Installing => "installing",
      Phase::Waiting => "waiting",
      Phase::Active => "active",
      Phase::Superseded => "superseded",
    }
  }
}

/// Drives one generation from install through activation to serving.
///
/// One instance exists per generation label, and at most one generation is
/// active at a time across the process. `install` is legal only in
/// `Installing`, `activate` only in `Waiting`, `intercept` only in
/// `Active`.
pub struct LifecycleController<S, F> {
  label: GenerationLabel,
  resources: Vec<ResourceId>,
  store: Arc<S>,
  fetcher: Arc<F>,
  policy: FetchPolicy<S, F>,
  phase: Phase,
}

impl<S: GenerationStore, F: Fetch> LifecycleController<S, F> {
  /// Controller for a fresh install of the manifest's generation.
  pub fn new(
    manifest: &Manifest,
    origin: &Url,
    store: Arc<S>,
    fetcher: Arc<F>,
    fallback_document: &str,
  ) -> Result<Self> {
    let label = manifest.generation_label();
    let resources = manifest.resources(origin)?;
    let fallback = ResourceId::from_origin_path(origin, fallback_document)?;
    let policy = FetchPolicy::new(Arc::clone(&store), Arc::clone(&fetcher), fallback);

    Ok(Self {
      label,
      resources,
      store,
      fetcher,
      policy,
      phase: Phase::Installing,
    })
  }

  /// Rebuild a controller for a generation that may already be stored.
  ///
  /// The phase is recovered from store contents: an absent generation is
  /// still to be installed, one stored next to older generations is
  /// waiting, and the sole stored generation is the active one.
  pub fn resume(
    manifest: &Manifest,
    origin: &Url,
    store: Arc<S>,
    fetcher: Arc<F>,
    fallback_document: &str,
  ) -> Result<Self> {
    let mut controller = Self::new(manifest, origin, store, fetcher, fallback_document)?;

    let stored = controller.store.list_generations()?;
    controller.phase = if !stored.contains(&controller.label) {
      Phase::Installing
    } else if stored.len() == 1 {
      Phase::Active
    } else {
      Phase::Waiting
    };

    Ok(controller)
  }

  pub fn label(&self) -> &GenerationLabel {
    &self.label
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  /// Install transition: populate this generation from the manifest.
  ///
  /// All assets or none. If any fetch fails the generation region is
  /// removed again, the failure is reported, and the previous generation,
  /// if any, keeps serving.
  pub async fn install(&mut self) -> Result<()> {
    self.expect(Phase::Installing, "install")?;
    info!(generation = %self.label, assets = self.resources.len(), "installing");

    self.store.open_generation(&self.label)?;
    let populated = self.populate_all().await;
    match populated.and_then(|entries| self.store.insert_batch(&self.label, &entries)) {
      Ok(()) => {
        self.phase = Phase::Waiting;
        info!(generation = %self.label, "install complete, waiting for activation");
        Ok(())
      }
      Err(err) => {
        // Leave no visible partial generation behind.
        if let Err(cleanup) = self.store.delete_generation(&self.label) {
          warn!(generation = %self.label, error = %cleanup, "could not discard aborted generation");
        }
        warn!(generation = %self.label, error = %err, "install aborted");
        Err(err)
      }
    }
  }

  /// Fetch every manifest resource; succeed only if all of them do.
  async fn populate_all(&self) -> Result<Vec<(ResourceId, Snapshot)>> {
    let fetches = self.resources.iter().map(|id| {
      let fetcher = Arc::clone(&self.fetcher);
      async move {
        let request = id.to_request()?;
        let response = fetcher.fetch(&request).await.map_err(|err| {
          warn!(resource = %id, error = %err, "manifest fetch failed");
          CacheError::PopulateFailure {
            resource: id.to_string(),
          }
        })?;

        if !response.is_cacheable() {
          warn!(resource = %id, status = response.status, "manifest fetch not a direct 200");
          return Err(CacheError::PopulateFailure {
            resource: id.to_string(),
          });
        }

        debug!(resource = %id, "fetched for install");
        Ok((id.clone(), response.into_snapshot()))
      }
    });

    join_all(fetches).await.into_iter().collect()
  }

  /// Activate transition: delete every non-current generation and begin
  /// serving. Last generation wins; there is no rollback once activation
  /// completes.
  pub fn activate(&mut self) -> Result<()> {
    self.expect(Phase::Waiting, "activate")?;

    // No prior generations on a first install makes this a no-op.
    for stale in self.store.list_generations()? {
      if stale != self.label {
        info!(generation = %stale, "deleting superseded generation");
        self.store.delete_generation(&stale)?;
      }
    }

    self.phase = Phase::Active;
    info!(generation = %self.label, "active, serving requests");
    Ok(())
  }

  /// Steady state: resolve one intercepted request against the active
  /// generation.
  pub async fn intercept(&self, request: &Request) -> Result<Resolved> {
    if self.phase != Phase::Active {
      return Err(CacheError::InvalidPhase {
        operation: "intercept",
        phase: self.phase.name(),
      });
    }
    self.policy.resolve(&self.label, request).await
  }

  /// Mark this controller displaced by a newer activated generation. Any
  /// in-flight resolutions complete against the generation they started
  /// with; new interceptions are refused.
  pub fn supersede(&mut self) {
    self.phase = Phase::Superseded;
  }

  fn expect(&self, phase: Phase, operation: &'static str) -> Result<()> {
    if self.phase == phase {
      Ok(())
    } else {
      Err(CacheError::InvalidPhase {
        operation,
        phase: self.phase.name(),
      })
    }
  }
}
