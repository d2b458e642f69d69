//! Remote version file handling
//!
//! The origin publishes one version file per language listing, for every
//! series and major-version line, the latest (minor, patch) and the patch
//! level of the most recent full snapshot. The file is fetched once per
//! language and cached in memory; a failed update drops the cache entry so
//! the retry re-reads the origin.

use std::sync::Arc;

use dashmap::DashMap;
use reqwest::Client;
use tracing::debug;

use crate::core::series::DataSeries;
use crate::core::version::VersionSpec;
use crate::error::DownloadError;

pub fn manifest_url(base_url: &str, lang: &str) -> String {
    format!("{}jpdict-rc-{}-version.json", base_url, lang)
}

/// Parsed version file.
#[derive(Debug, Clone)]
pub struct VersionManifest {
    root: serde_json::Value,
}

impl VersionManifest {
    pub fn new(root: serde_json::Value) -> Result<Self, DownloadError> {
        if !root.is_object() {
            return Err(DownloadError::VersionFileInvalid {
                reason: "top level is not an object".to_string(),
            });
        }
        Ok(VersionManifest { root })
    }

    /// The slot for (series, major version), validated field by field.
    pub fn version_for(
        &self,
        series: DataSeries,
        major: u32,
    ) -> Result<VersionSpec, DownloadError> {
        let slot = self
            .root
            .get(series.name())
            .and_then(|series| series.get(major.to_string()))
            .ok_or(DownloadError::MajorVersionNotFound { series, major })?;

        parse_version_slot(slot)
    }
}

/// Validate one version slot. Every field the protocol requires must be
/// present and well-typed; anything else means the origin published a
/// malformed file.
pub(crate) fn parse_version_slot(slot: &serde_json::Value) -> Result<VersionSpec, DownloadError> {
    let object = slot
        .as_object()
        .ok_or_else(|| invalid("version entry is not an object"))?;

    let major = required_u32(object, "major")?;
    if major < 1 {
        return Err(invalid("major version must be at least 1"));
    }
    let minor = required_u32(object, "minor")?;
    let patch = required_u32(object, "patch")?;
    let snapshot = required_u32(object, "snapshot")?;

    let database_version = match object.get("databaseVersion") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(invalid("databaseVersion is not a string")),
    };

    let date_of_creation = match object.get("dateOfCreation") {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        Some(serde_json::Value::String(_)) => return Err(invalid("dateOfCreation is empty")),
        _ => return Err(invalid("dateOfCreation is missing or not a string")),
    };

    Ok(VersionSpec {
        major,
        minor,
        patch,
        snapshot,
        database_version,
        date_of_creation,
    })
}

/// A version slot embedded in a data-file header (no snapshot field).
pub(crate) fn parse_header_version(
    slot: &serde_json::Value,
) -> Result<(u32, u32, u32, Option<String>, String), DownloadError> {
    let object = slot
        .as_object()
        .ok_or_else(|| invalid_record("header version is not an object"))?;
    let major = required_u32(object, "major").map_err(as_record_error)?;
    let minor = required_u32(object, "minor").map_err(as_record_error)?;
    let patch = required_u32(object, "patch").map_err(as_record_error)?;
    let database_version = match object.get("databaseVersion") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(invalid_record("header databaseVersion is not a string")),
    };
    let date_of_creation = match object.get("dateOfCreation") {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        _ => return Err(invalid_record("header dateOfCreation is missing or empty")),
    };
    Ok((major, minor, patch, database_version, date_of_creation))
}

fn required_u32(
    object: &serde_json::Map<String, serde_json::Value>,
    field: &str,
) -> Result<u32, DownloadError> {
    object
        .get(field)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| invalid(&format!("field '{}' is missing or not an integer", field)))
}

fn invalid(reason: &str) -> DownloadError {
    DownloadError::VersionFileInvalid {
        reason: reason.to_string(),
    }
}

fn invalid_record(reason: &str) -> DownloadError {
    DownloadError::FileInvalidRecord {
        reason: reason.to_string(),
    }
}

fn as_record_error(err: DownloadError) -> DownloadError {
    match err {
        DownloadError::VersionFileInvalid { reason } => DownloadError::FileInvalidRecord {
            reason: format!("header {}", reason),
        },
        other => other,
    }
}

/// Process-wide, per-language cache of parsed version files.
#[derive(Default)]
pub struct ManifestCache {
    entries: DashMap<String, Arc<VersionManifest>>,
}

impl ManifestCache {
    pub fn new() -> Self {
        ManifestCache::default()
    }

    /// Fetch (or reuse) the version file for a language.
    pub async fn get(
        &self,
        client: &Client,
        base_url: &str,
        lang: &str,
        force_fetch: bool,
    ) -> Result<Arc<VersionManifest>, DownloadError> {
        if !force_fetch {
            if let Some(cached) = self.entries.get(lang) {
                return Ok(Arc::clone(&cached));
            }
        }
        let manifest = Arc::new(fetch_manifest(client, base_url, lang).await?);
        self.entries.insert(lang.to_string(), Arc::clone(&manifest));
        Ok(manifest)
    }

    /// Drop the cached file for a language (after a failed update, so the
    /// retry sees a fresh copy).
    pub fn invalidate(&self, lang: &str) {
        self.entries.remove(lang);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

async fn fetch_manifest(
    client: &Client,
    base_url: &str,
    lang: &str,
) -> Result<VersionManifest, DownloadError> {
    let url = manifest_url(base_url, lang);
    debug!(%url, "fetching version file");

    let response =
        client
            .get(&url)
            .send()
            .await
            .map_err(|e| DownloadError::VersionFileNotAccessible {
                url: url.clone(),
                reason: e.to_string(),
            })?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(DownloadError::VersionFileNotFound { url });
    }
    if !response.status().is_success() {
        return Err(DownloadError::VersionFileNotAccessible {
            reason: format!("status {}", response.status()),
            url,
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| DownloadError::VersionFileNotAccessible {
            url: url.clone(),
            reason: e.to_string(),
        })?;

    let root: serde_json::Value =
        serde_json::from_str(&body).map_err(|e| DownloadError::VersionFileInvalid {
            reason: e.to_string(),
        })?;

    VersionManifest::new(root)
}
