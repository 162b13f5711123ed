use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::VersionError;

/// Immutable metadata record for a release, as advertised by the backend.
/// Superseded only by a re-fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    pub version_id: String,
    pub release_timestamp: String,
    pub download_locator: String,
    pub size_bytes: u64,
    /// SHA-256 hex digest of the packaged payload.
    pub content_digest: String,
}

/// Ground truth for "what the user currently has playable". Rewritten only
/// after a download+verify+install cycle completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledVersionRecord {
    pub version_id: String,
    pub install_path: PathBuf,
    pub verified_at: SystemTime,
}

/// Fetches the authoritative version record. Stateless; no caching, callers
/// decide polling cadence.
pub struct VersionResolver {
    http: reqwest::Client,
    base_url: String,
}

impl VersionResolver {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        VersionResolver { http, base_url }
    }

    /// `GET /game/version`. Transport failures and non-2xx statuses map to
    /// `Unreachable`, undecodable bodies to `MalformedResponse`.
    pub async fn fetch_latest(&self) -> Result<VersionDescriptor, VersionError> {
        let response = self
            .http
            .get(format!("{}/game/version", self.base_url))
            .send()
            .await
            .map_err(|e| VersionError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VersionError::Unreachable(format!(
                "version endpoint returned status {status}"
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| VersionError::Unreachable(e.to_string()))?;
        let descriptor: VersionDescriptor =
            serde_json::from_str(&text).map_err(|e| VersionError::MalformedResponse(e.to_string()))?;

        log::info!(
            "latest version: {} ({} bytes)",
            descriptor.version_id,
            descriptor.size_bytes
        );
        Ok(descriptor)
    }
}

/// Whether two version ids denote the same release. Ids that both parse as
/// semver compare by semver equality (so `1.2.3` == `1.2.3+build.5`
/// metadata aside); anything else is an opaque string compare.
pub fn same_version(a: &str, b: &str) -> bool {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => va == vb,
        _ => a == b,
    }
}

/// True when `remote` supersedes `installed`. Only used for logging which
/// direction a mismatch points; the update decision itself is inequality.
pub fn is_newer(remote: &str, installed: &str) -> bool {
    match (semver::Version::parse(remote), semver::Version::parse(installed)) {
        (Ok(r), Ok(i)) => r > i,
        _ => remote != installed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semver_ids_compare_by_precedence() {
        assert!(same_version("1.2.3", "1.2.3"));
        assert!(!same_version("1.2.3", "1.2.4"));
        assert!(is_newer("1.10.0", "1.9.9"));
        assert!(!is_newer("1.2.3", "1.2.3"));
    }

    #[test]
    fn opaque_ids_fall_back_to_string_equality() {
        assert!(same_version("build-2024-01", "build-2024-01"));
        assert!(!same_version("build-2024-01", "build-2024-02"));
        assert!(is_newer("build-b", "build-a"));
    }

    #[test]
    fn mixed_ids_are_opaque() {
        // One side not semver: string comparison decides.
        assert!(!same_version("1.2.3", "release-1.2.3"));
    }
}
