//! Core types for the generational response cache.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{CacheError, Result};

/// Opaque name of one generation of the cached asset set.
///
/// Exactly one generation is current at any time. Recency ordering comes
/// from the store's insertion order, never from the label text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenerationLabel(String);

impl GenerationLabel {
  pub fn new(label: impl Into<String>) -> Self {
    Self(label.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for GenerationLabel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// What kind of consumer is asking for a resource.
///
/// Only `Document` requests are eligible for the offline navigation
/// fallback; sub-resource failures propagate unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
  /// Top-level document navigation
  Document,
  /// Script, stylesheet, image, or any other sub-resource
  Subresource,
}

/// A request descriptor as handed over by the host environment.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: String,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub destination: Destination,
}

impl Request {
  /// A plain GET for a sub-resource.
  pub fn get(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      headers: Vec::new(),
      destination: Destination::Subresource,
    }
  }

  /// A GET for a top-level document.
  pub fn navigation(url: Url) -> Self {
    Self {
      destination: Destination::Document,
      ..Self::get(url)
    }
  }

  pub fn is_navigation(&self) -> bool {
    self.destination == Destination::Document
  }
}

/// Normalized request identity used as the cache key.
///
/// Unique within a generation. The storage key is a SHA-256 of the
/// normalized form so keys stay fixed-length; the readable form is kept
/// alongside for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
  method: String,
  url: String,
}

impl ResourceId {
  /// Build an identifier from a method and URL.
  ///
  /// The method is uppercased and the URL fragment dropped; scheme and host
  /// are already lowercased by the `url` parser.
  pub fn new(method: &str, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.to_ascii_uppercase(),
      url: url.to_string(),
    }
  }

  pub fn from_request(request: &Request) -> Self {
    Self::new(&request.method, &request.url)
  }

  /// Resolve a manifest path against the application origin.
  pub fn from_origin_path(origin: &Url, path: &str) -> Result<Self> {
    let url = origin.join(path).map_err(|e| CacheError::InvalidResource {
      path: path.to_string(),
      reason: e.to_string(),
    })?;
    Ok(Self::new("GET", &url))
  }

  /// Reconstruct a plain GET request for this identifier.
  pub fn to_request(&self) -> Result<Request> {
    let url = Url::parse(&self.url).map_err(|e| CacheError::InvalidResource {
      path: self.url.clone(),
      reason: e.to_string(),
    })?;
    Ok(Request {
      method: self.method.clone(),
      url,
      headers: Vec::new(),
      destination: Destination::Subresource,
    })
  }

  /// SHA256 hash of the normalized form, for stable fixed-length keys.
  pub fn storage_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }

  pub fn url(&self) -> &str {
    &self.url
  }
}

impl std::fmt::Display for ResourceId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// An immutable capture of a response at the moment it was cached.
///
/// Snapshots are replaced whole under their key; they are never mutated in
/// place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

/// Result of resolving one intercepted request.
#[derive(Debug, Clone)]
pub struct Resolved {
  pub snapshot: Snapshot,
  pub served_from: ServedFrom,
}

impl Resolved {
  pub fn from_cache(snapshot: Snapshot) -> Self {
    Self {
      snapshot,
      served_from: ServedFrom::Cache,
    }
  }

  pub fn from_network(snapshot: Snapshot) -> Self {
    Self {
      snapshot,
      served_from: ServedFrom::Network,
    }
  }

  pub fn fallback(snapshot: Snapshot) -> Self {
    Self {
      snapshot,
      served_from: ServedFrom::Fallback,
    }
  }
}

/// Where a resolved response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
  /// Stored snapshot in the active generation
  Cache,
  /// Fresh network response
  Network,
  /// Offline navigation fallback document
  Fallback,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn origin() -> Url {
    Url::parse("https://qr.example.app").unwrap()
  }

  #[test]
  fn test_resource_id_normalizes_method_and_fragment() {
    let url = Url::parse("https://qr.example.app/style.css#section").unwrap();
    let id = ResourceId::new("get", &url);

    assert_eq!(id.to_string(), "GET https://qr.example.app/style.css");
  }

  #[test]
  fn test_storage_key_is_stable_and_distinct() {
    let a = ResourceId::from_origin_path(&origin(), "/a.css").unwrap();
    let a_again = ResourceId::from_origin_path(&origin(), "/a.css").unwrap();
    let b = ResourceId::from_origin_path(&origin(), "/b.js").unwrap();

    assert_eq!(a.storage_key(), a_again.storage_key());
    assert_ne!(a.storage_key(), b.storage_key());
    assert_eq!(a.storage_key().len(), 64);
  }

  #[test]
  fn test_from_origin_path_resolves_relative_paths() {
    let root = ResourceId::from_origin_path(&origin(), "/").unwrap();
    let icon = ResourceId::from_origin_path(&origin(), "/icon.jpg").unwrap();

    assert_eq!(root.url(), "https://qr.example.app/");
    assert_eq!(icon.url(), "https://qr.example.app/icon.jpg");
  }

  #[test]
  fn test_to_request_round_trips_the_url() {
    let id = ResourceId::from_origin_path(&origin(), "/qr-generator.js").unwrap();
    let request = id.to_request().unwrap();

    assert_eq!(request.method, "GET");
    assert_eq!(request.url.as_str(), "https://qr.example.app/qr-generator.js");
    assert!(!request.is_navigation());
  }

  #[test]
  fn test_navigation_destination() {
    let request = Request::navigation(origin());
    assert!(request.is_navigation());

    let request = Request::get(origin());
    assert!(!request.is_navigation());
  }
}
