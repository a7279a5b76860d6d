//! Normalization of release-check responses.
//!
//! Two response shapes are accepted:
//!
//! ```text
//! direct:  { "updateAvailable": true, "downloadUrl": .., "releaseHash": ..,
//!            "targetAppVersion": .., "bundleSize": .. }
//! legacy:  { "success": true, "data": {
//!              "appliedBundleData": { "isRolledBack": .., "targetAppVersion": .. },
//!              "newBundleData": { "downloadUrl": .., "checksum": .., .. } } }
//! ```
//!
//! The legacy shape is only consulted when the direct shape reports no update.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::types::{AppliedBundleStatus, NormalizedRelease, ReleaseOffer};
use crate::error::{EngineError, EngineResult};

// Every field is optional: a `null` reads as absent, and the hash may arrive
// under both of its names.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectResponse {
    #[serde(default)]
    update_available: Option<bool>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    release_hash: Option<String>,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default)]
    target_app_version: Option<String>,
    #[serde(default)]
    bundle_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    data: Option<LegacyData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyData {
    #[serde(default)]
    applied_bundle_data: Option<LegacyApplied>,
    #[serde(default)]
    new_bundle_data: Option<LegacyNewBundle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyApplied {
    #[serde(default)]
    is_rolled_back: Option<bool>,
    #[serde(default)]
    target_app_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyNewBundle {
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default)]
    release_hash: Option<String>,
    #[serde(default)]
    target_app_version: Option<String>,
    #[serde(default)]
    bundle_size: Option<u64>,
}

/// Normalize a raw release-check body.
///
/// `app_version` is the local app version; the direct shape carries no
/// applied-bundle section, so its status is inferred from it.
pub fn normalize_release(body: &Value, app_version: &str) -> EngineResult<NormalizedRelease> {
    if !body.is_object() {
        return Err(EngineError::ResponseParseError(format!(
            "expected a JSON object, got {}",
            json_kind(body)
        )));
    }

    let direct: DirectResponse = serde_json::from_value(body.clone())
        .map_err(|e| EngineError::ResponseParseError(e.to_string()))?;

    if direct.update_available.unwrap_or_default() {
        let release_hash = direct.release_hash.or(direct.checksum).unwrap_or_default();
        debug!(hash = %release_hash, "Release check returned direct shape");
        return Ok(NormalizedRelease {
            offer: Some(ReleaseOffer {
                update_available: true,
                download_url: direct.download_url.unwrap_or_default(),
                release_hash,
                target_app_version: direct.target_app_version.unwrap_or_default(),
                bundle_size_bytes: direct.bundle_size.unwrap_or(0),
            }),
            applied: Some(AppliedBundleStatus {
                is_rolled_back: false,
                target_app_version: app_version.to_string(),
            }),
        });
    }

    let legacy: LegacyResponse = serde_json::from_value(body.clone())
        .map_err(|e| EngineError::ResponseParseError(e.to_string()))?;

    if !legacy.success.unwrap_or_default() {
        debug!("Release check reports no update");
        return Ok(NormalizedRelease::default());
    }
    let Some(data) = legacy.data else {
        debug!("Legacy response carries no data object");
        return Ok(NormalizedRelease::default());
    };

    Ok(NormalizedRelease {
        offer: data.new_bundle_data.map(|b| ReleaseOffer {
            update_available: true,
            download_url: b.download_url.unwrap_or_default(),
            release_hash: b.checksum.or(b.release_hash).unwrap_or_default(),
            target_app_version: b.target_app_version.unwrap_or_default(),
            bundle_size_bytes: b.bundle_size.unwrap_or(0),
        }),
        applied: data.applied_bundle_data.map(|a| AppliedBundleStatus {
            is_rolled_back: a.is_rolled_back.unwrap_or_default(),
            target_app_version: a.target_app_version.unwrap_or_default(),
        }),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_shape() {
        let body = json!({
            "updateAvailable": true,
            "downloadUrl": "https://cdn.example.com/b.zip",
            "releaseHash": "B",
            "targetAppVersion": "1.0.0",
            "bundleSize": 4096,
            "releaseNotes": "ignored"
        });

        let release = normalize_release(&body, "1.0.0").unwrap();
        let offer = release.offer.unwrap();
        assert_eq!(offer.release_hash, "B");
        assert_eq!(offer.known_size(), Some(4096));
        assert!(offer.is_usable());

        let applied = release.applied.unwrap();
        assert!(!applied.is_rolled_back);
        assert_eq!(applied.target_app_version, "1.0.0");
    }

    #[test]
    fn test_direct_shape_without_size() {
        let body = json!({
            "updateAvailable": true,
            "downloadUrl": "https://cdn.example.com/b.zip",
            "releaseHash": "B"
        });
        let offer = normalize_release(&body, "1.0.0").unwrap().offer.unwrap();
        assert_eq!(offer.known_size(), None);
        assert_eq!(offer.target_app_version, "");
    }

    #[test]
    fn test_legacy_shape() {
        let body = json!({
            "success": true,
            "data": {
                "appliedBundleData": { "isRolledBack": true, "targetAppVersion": "1.0.0" },
                "newBundleData": {
                    "downloadUrl": "https://cdn.example.com/c.zip",
                    "checksum": "C",
                    "targetAppVersion": "1.0.0"
                }
            }
        });

        let release = normalize_release(&body, "1.0.0").unwrap();
        assert_eq!(release.offer.unwrap().release_hash, "C");
        assert!(release.applied.unwrap().is_rolled_back);
    }

    #[test]
    fn test_legacy_shape_accepts_release_hash_key() {
        let body = json!({
            "updateAvailable": false,
            "success": true,
            "data": { "newBundleData": { "downloadUrl": "u", "releaseHash": "D" } }
        });
        let release = normalize_release(&body, "1.0.0").unwrap();
        assert_eq!(release.offer.unwrap().release_hash, "D");
        assert!(release.applied.is_none());
    }

    #[test]
    fn test_no_update() {
        let release = normalize_release(&json!({ "updateAvailable": false }), "1.0.0").unwrap();
        assert_eq!(release, NormalizedRelease::default());

        let release = normalize_release(&json!({ "success": true }), "1.0.0").unwrap();
        assert_eq!(release, NormalizedRelease::default());
    }

    #[test]
    fn test_rejects_non_object() {
        let result = normalize_release(&json!([1, 2, 3]), "1.0.0");
        assert!(matches!(result, Err(EngineError::ResponseParseError(_))));
    }

    #[test]
    fn test_null_fields_read_as_absent() {
        let body = json!({
            "updateAvailable": true,
            "downloadUrl": "https://cdn.example.com/b.zip",
            "releaseHash": "B",
            "targetAppVersion": null,
            "bundleSize": null
        });
        let offer = normalize_release(&body, "1.0.0").unwrap().offer.unwrap();
        assert_eq!(offer.release_hash, "B");
        assert_eq!(offer.target_app_version, "");
        assert_eq!(offer.known_size(), None);

        let body = json!({ "updateAvailable": null, "releaseHash": null, "success": null });
        assert_eq!(normalize_release(&body, "1.0.0").unwrap(), NormalizedRelease::default());
    }

    #[test]
    fn test_both_hash_keys_accepted() {
        let body = json!({
            "updateAvailable": true,
            "downloadUrl": "https://cdn.example.com/b.zip",
            "releaseHash": "B",
            "checksum": "ignored"
        });
        let offer = normalize_release(&body, "1.0.0").unwrap().offer.unwrap();
        assert_eq!(offer.release_hash, "B");

        let body = json!({
            "success": true,
            "data": {
                "appliedBundleData": null,
                "newBundleData": { "downloadUrl": "u", "checksum": "C", "releaseHash": "other" }
            }
        });
        let release = normalize_release(&body, "1.0.0").unwrap();
        assert_eq!(release.offer.unwrap().release_hash, "C");
        assert!(release.applied.is_none());
    }

    #[test]
    fn test_rejects_mistyped_fields() {
        let body = json!({ "updateAvailable": "yes" });
        let result = normalize_release(&body, "1.0.0");
        assert!(matches!(result, Err(EngineError::ResponseParseError(_))));
    }
}
