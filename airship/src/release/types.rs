//! Logical payloads of the release-check call.

use serde::{Deserialize, Serialize};

/// Request body of a release check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseCheckRequest {
    pub app_version: String,
    pub platform: String,
    pub project_id: String,
    /// Hash of the build currently active; empty on first launch.
    pub applied_bundle_hash: String,
}

/// A newer bundle offered by the release service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOffer {
    pub update_available: bool,
    pub download_url: String,
    pub release_hash: String,
    pub target_app_version: String,
    /// Advertised archive size; 0 when the service did not say.
    pub bundle_size_bytes: u64,
}

impl ReleaseOffer {
    /// Both the hash and URL are present.
    pub fn is_usable(&self) -> bool {
        !self.release_hash.is_empty() && !self.download_url.is_empty()
    }

    /// Advertised size, if positive.
    pub fn known_size(&self) -> Option<u64> {
        (self.bundle_size_bytes > 0).then_some(self.bundle_size_bytes)
    }
}

/// Status of the build currently running in the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedBundleStatus {
    pub is_rolled_back: bool,
    pub target_app_version: String,
}

/// Release-check response normalized from any accepted wire shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRelease {
    pub offer: Option<ReleaseOffer>,
    pub applied: Option<AppliedBundleStatus>,
}
