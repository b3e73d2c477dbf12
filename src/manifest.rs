//! The fixed set of assets that must be offline-available.

use url::Url;

use crate::cache::{GenerationLabel, ResourceId};
use crate::error::Result;

/// Version marker for the shipped asset set.
///
/// The marker names the generation, so changing `OFFLINE_ASSETS` requires
/// bumping it: a changed asset set always installs as a new generation.
pub const CACHE_VERSION: &str = "qr-generator-v1";

/// Assets making up the minimum offline-available set, in install order.
const OFFLINE_ASSETS: &[&str] = &[
  "/",
  "/index.html",
  "/style.css",
  "/qr-generator.js",
  "/qrcode.min.js",
  "/manifest.json",
  "/icon.jpg",
];

/// The ordered asset list for one generation, paired with the version
/// marker that labels the generation. Constant for the lifetime of a
/// generation; consumed once during install.
#[derive(Debug, Clone, Copy)]
pub struct Manifest {
  version: &'static str,
  assets: &'static [&'static str],
}

impl Manifest {
  /// The manifest compiled into this build.
  pub fn current() -> Self {
    Self {
      version: CACHE_VERSION,
      assets: OFFLINE_ASSETS,
    }
  }

  #[cfg(test)]
  pub(crate) fn with_assets(version: &'static str, assets: &'static [&'static str]) -> Self {
    Self { version, assets }
  }

  /// The generation label named by this manifest.
  pub fn generation_label(&self) -> GenerationLabel {
    GenerationLabel::new(self.version)
  }

  /// Asset paths in install order.
  pub fn assets(&self) -> &[&'static str] {
    self.assets
  }

  /// Resolve every asset path against the application origin.
  pub fn resources(&self, origin: &Url) -> Result<Vec<ResourceId>> {
    self
      .assets
      .iter()
      .map(|path| ResourceId::from_origin_path(origin, path))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_label_is_the_version_marker() {
    assert_eq!(
      Manifest::current().generation_label(),
      GenerationLabel::new(CACHE_VERSION)
    );
  }

  #[test]
  fn test_resources_preserve_install_order() {
    let origin = Url::parse("https://qr.example.app").unwrap();
    let resources = Manifest::current().resources(&origin).unwrap();

    assert_eq!(resources.len(), OFFLINE_ASSETS.len());
    assert_eq!(resources[0].url(), "https://qr.example.app/");
    assert_eq!(resources[1].url(), "https://qr.example.app/index.html");
  }

  #[test]
  fn test_resources_are_unique_within_the_manifest() {
    let origin = Url::parse("https://qr.example.app").unwrap();
    let resources = Manifest::current().resources(&origin).unwrap();

    let keys: std::collections::HashSet<String> =
      resources.iter().map(|r| r.storage_key()).collect();
    assert_eq!(keys.len(), resources.len());
  }
}
