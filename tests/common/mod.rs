//! Common test utilities: a wiremock data origin plus builders for
//! version files and `.ljson` bodies.
#![allow(dead_code)]

use std::time::Duration;

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jpdict::core::config::{
    DatabaseConfig, DownloadConfig, RemoteConfig, RetryConfig, StoreConfig,
};
use jpdict::Database;

pub fn test_config(server: &MockServer, dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        remote: RemoteConfig {
            base_url: format!("{}/", server.uri()),
            lang: "en".to_string(),
        },
        store: StoreConfig {
            path: dir.path().join("store"),
            batch_size: 4000,
        },
        download: DownloadConfig {
            max_progress_resolution: 0.05,
            stall_timeout_secs: 5,
            channel_capacity: 64,
        },
        retry: RetryConfig {
            // Keep test retries fast; the backoff shape is covered by
            // unit tests against the real defaults.
            initial_backoff_min_ms: 10,
            initial_backoff_max_ms: 30,
            max_backoff_ms: 1_000,
            max_constraint_retries: 2,
        },
    }
}

pub fn test_database(server: &MockServer, dir: &TempDir) -> Database {
    Database::new(test_config(server, dir))
}

/// One version-file slot.
pub fn version_slot(major: u32, minor: u32, patch: u32, snapshot: u32) -> serde_json::Value {
    serde_json::json!({
        "major": major,
        "minor": minor,
        "patch": patch,
        "snapshot": snapshot,
        "databaseVersion": "2024-05-01T00:00:00Z",
        "dateOfCreation": "2024-05-01",
    })
}

pub fn header_line(major: u32, minor: u32, patch: u32, records: usize) -> String {
    serde_json::json!({
        "type": "header",
        "version": {
            "major": major,
            "minor": minor,
            "patch": patch,
            "dateOfCreation": "2024-05-01",
        },
        "records": records,
    })
    .to_string()
}

/// Join JSON lines into an `.ljson` body.
pub fn ljson(lines: &[String]) -> String {
    let mut body = lines.join("\n");
    body.push('\n');
    body
}

pub async fn mount_version_file(server: &MockServer, lang: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/jpdict-rc-{}-version.json", lang)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_data_file(server: &MockServer, file: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", file)))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

pub async fn mount_data_file_delayed(
    server: &MockServer,
    file: &str,
    body: String,
    delay: Duration,
) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", file)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

// Record line builders

pub fn kanji_line(c: &str, rad: u16, comp: &str) -> String {
    serde_json::json!({
        "c": c,
        "r": { "on": ["イン"], "kun": ["ひ.く"] },
        "m": ["pull"],
        "rad": { "x": rad },
        "refs": {},
        "misc": { "sc": 4, "gr": 2 },
        "comp": comp,
    })
    .to_string()
}

pub fn kanji_deletion_line(c: &str) -> String {
    serde_json::json!({ "c": c, "deleted": true }).to_string()
}

pub fn radical_line(id: &str, r: u16, b: Option<&str>, k: Option<&str>) -> String {
    serde_json::json!({
        "id": id,
        "r": r,
        "s": 3,
        "b": b,
        "k": k,
        "na": [format!("na-{}", id)],
        "m": [format!("meaning-{}", id)],
    })
    .to_string()
}

pub fn name_line(id: u32, k: Option<&str>, r: &str) -> String {
    serde_json::json!({
        "id": id,
        "k": k.map(|k| vec![k]),
        "r": [r],
        "tr": [{ "type": ["surname"], "det": ["Test"] }],
    })
    .to_string()
}

pub fn name_deletion_line(id: u32) -> String {
    serde_json::json!({ "id": id, "deleted": true }).to_string()
}

pub fn word_line(id: u32, k: Option<&str>, r: &str, gloss: &str) -> String {
    serde_json::json!({
        "id": id,
        "k": k.map(|k| vec![k]),
        "r": [r],
        "s": [{ "g": [gloss], "pos": ["n"] }],
    })
    .to_string()
}

/// A version file covering the kanji group, both series with snapshot 0.
pub fn kanji_group_version_file(kanji_patch: u32, radicals_patch: u32) -> serde_json::Value {
    serde_json::json!({
        "kanji": { "4": version_slot(4, 0, kanji_patch, 0) },
        "radicals": { "4": version_slot(4, 0, radicals_patch, 0) },
    })
}

/// Standard radicals snapshot (4.0.0): enough entries for the 引 fixtures.
pub fn radicals_full_body() -> String {
    ljson(&[
        header_line(4, 0, 0, 3),
        radical_line("002", 2, Some("⼁"), None),
        radical_line("030", 30, Some("⼝"), Some("口")),
        radical_line("057", 57, Some("⼸"), Some("弓")),
    ])
}
