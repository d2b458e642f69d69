//! End-to-end update pipeline tests against a mock data origin.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use jpdict::{
    DataSeries, DownloadError, RetryEvent, SeriesSet, UpdateError, UpdateOptions, UpdateState,
    UpdateWithRetry, VersionNumber,
};

fn kanji_series() -> SeriesSet {
    [DataSeries::Kanji].into_iter().collect()
}

fn names_series() -> SeriesSet {
    [DataSeries::Names].into_iter().collect()
}

#[tokio::test]
async fn fresh_install_single_series() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    mount_version_file(&server, "en", kanji_group_version_file(0, 0)).await;
    mount_data_file(
        &server,
        "kanji-rc-en-4.0.0-full.ljson",
        ljson(&[header_line(4, 0, 0, 1), kanji_line("引", 57, "⼸⼁")]),
    )
    .await;
    mount_data_file(&server, "radicals-rc-en-4.0.0-full.ljson", radicals_full_body()).await;

    let db = test_database(&server, &dir);
    db.update(UpdateOptions {
        series: Some(kanji_series()),
        ..Default::default()
    })
    .await?;

    let version = db.get_data_version(DataSeries::Kanji).await?.unwrap();
    assert_eq!(version.version_number(), VersionNumber::new(4, 0, 0));
    assert_eq!(version.lang, "en");
    // Radicals came along implicitly
    assert!(db.get_data_version(DataSeries::Radicals).await?.is_some());

    let results = db.get_kanji(&['引']).await?;
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.c, '引');
    assert_eq!(result.rad.k.as_deref(), Some("弓"));
    assert_eq!(result.comp.len(), 2);
    assert_eq!(result.comp[0].c, "⼸");
    assert_eq!(result.comp[0].k.as_deref(), Some("弓"));
    assert_eq!(result.comp[1].c, "⼁");
    assert!(result.comp[1].k.is_none());
    Ok(())
}

#[tokio::test]
async fn redundant_overlapping_calls_share_one_run() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    // Exactly one version-file fetch for the coalesced run
    Mock::given(method("GET"))
        .and(path("/jpdict-rc-en-version.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(kanji_group_version_file(0, 0)),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_data_file(
        &server,
        "kanji-rc-en-4.0.0-full.ljson",
        ljson(&[header_line(4, 0, 0, 1), kanji_line("引", 57, "⼸⼁")]),
    )
    .await;
    mount_data_file(&server, "radicals-rc-en-4.0.0-full.ljson", radicals_full_body()).await;

    let db = test_database(&server, &dir);
    let options = UpdateOptions {
        series: Some(kanji_series()),
        ..Default::default()
    };
    let (first, second) = tokio::join!(db.update(options.clone()), db.update(options));
    assert!(first.is_ok());
    assert!(second.is_ok());
    Ok(())
}

#[tokio::test]
async fn network_error_triggers_retry() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    mount_version_file(&server, "en", kanji_group_version_file(0, 0)).await;
    // First fetch of the kanji snapshot fails, the retry succeeds
    Mock::given(method("GET"))
        .and(path("/kanji-rc-en-4.0.0-full.ljson"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_data_file(
        &server,
        "kanji-rc-en-4.0.0-full.ljson",
        ljson(&[header_line(4, 0, 0, 1), kanji_line("引", 57, "⼸⼁")]),
    )
    .await;
    mount_data_file(&server, "radicals-rc-en-4.0.0-full.ljson", radicals_full_body()).await;

    let db = test_database(&server, &dir);
    let events: Arc<Mutex<Vec<RetryEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let retry = UpdateWithRetry::new(db.clone(), test_config(&server, &dir).retry, move |event| {
        sink.lock().unwrap().push(event);
    });

    retry
        .update(
            UpdateOptions {
                series: Some(kanji_series()),
                ..Default::default()
            },
            false,
        )
        .await?;

    assert!(db.get_data_version(DataSeries::Kanji).await?.is_some());

    let events = events.lock().unwrap();
    let failure = events
        .iter()
        .find_map(|event| match event {
            RetryEvent::UpdateError {
                error,
                retry_count,
                next_retry,
            } => Some((error.clone(), *retry_count, next_retry.is_some())),
            _ => None,
        })
        .expect("one failure event");
    assert!(matches!(
        failure.0,
        UpdateError::Download(DownloadError::DatabaseFileNotFound { .. })
    ));
    assert_eq!(failure.1, Some(0));
    assert!(failure.2, "a retry must be scheduled");
    assert!(events
        .iter()
        .any(|event| matches!(event, RetryEvent::UpdateComplete)));
    Ok(())
}

#[tokio::test]
async fn cancel_mid_stream_leaves_no_version() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    mount_version_file(&server, "en", kanji_group_version_file(1, 0)).await;
    mount_data_file_delayed(
        &server,
        "kanji-rc-en-4.0.0-full.ljson",
        ljson(&[header_line(4, 0, 0, 1), kanji_line("引", 57, "⼸⼁")]),
        Duration::from_millis(800),
    )
    .await;
    // The patch must never be requested after cancellation
    Mock::given(method("GET"))
        .and(path("/kanji-rc-en-4.0.1-patch.ljson"))
        .respond_with(ResponseTemplate::new(200).set_body_string(String::new()))
        .expect(0)
        .mount(&server)
        .await;
    mount_data_file(&server, "radicals-rc-en-4.0.0-full.ljson", radicals_full_body()).await;

    let db = test_database(&server, &dir);
    let update_db = db.clone();
    let handle = tokio::spawn(async move {
        update_db
            .update(UpdateOptions {
                series: Some(kanji_series()),
                ..Default::default()
            })
            .await
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    db.cancel_update(None).await;

    let outcome = handle.await?;
    assert!(matches!(outcome, Err(UpdateError::Aborted)));
    assert_eq!(db.get_data_version(DataSeries::Kanji).await?, None);
    Ok(())
}

#[tokio::test]
async fn partial_progress_survives_cancel() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    mount_version_file(&server, "en", kanji_group_version_file(1, 0)).await;
    mount_data_file(
        &server,
        "kanji-rc-en-4.0.0-full.ljson",
        ljson(&[header_line(4, 0, 0, 1), kanji_line("引", 57, "⼸⼁")]),
    )
    .await;
    mount_data_file_delayed(
        &server,
        "kanji-rc-en-4.0.1-patch.ljson",
        ljson(&[header_line(4, 0, 1, 1), kanji_line("弓", 57, "⼸")]),
        Duration::from_millis(800),
    )
    .await;
    mount_data_file(&server, "radicals-rc-en-4.0.0-full.ljson", radicals_full_body()).await;

    let db = test_database(&server, &dir);
    let update_db = db.clone();
    let handle = tokio::spawn(async move {
        update_db
            .update(UpdateOptions {
                series: Some(kanji_series()),
                ..Default::default()
            })
            .await
    });

    // Wait until the snapshot has committed, then cancel during patch 1
    let mut committed = false;
    for _ in 0..200 {
        if db.get_data_version(DataSeries::Kanji).await?.is_some() {
            committed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(committed, "snapshot never committed");
    db.cancel_update(None).await;

    let outcome = handle.await?;
    assert!(matches!(outcome, Err(UpdateError::Aborted)));

    let version = db.get_data_version(DataSeries::Kanji).await?.unwrap();
    assert_eq!(version.version_number(), VersionNumber::new(4, 0, 0));

    // The committed snapshot counts as a successful check
    let status = db.series_status(DataSeries::Kanji).await;
    match status.update_state {
        UpdateState::Idle { last_check } => assert!(last_check.is_some()),
        other => panic!("expected idle state, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn language_switch_cancels_and_restarts() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    mount_version_file(&server, "en", kanji_group_version_file(0, 0)).await;
    mount_version_file(&server, "fr", kanji_group_version_file(0, 0)).await;
    mount_data_file_delayed(
        &server,
        "kanji-rc-en-4.0.0-full.ljson",
        ljson(&[header_line(4, 0, 0, 1), kanji_line("引", 57, "⼸⼁")]),
        Duration::from_millis(600),
    )
    .await;
    mount_data_file(
        &server,
        "kanji-rc-fr-4.0.0-full.ljson",
        ljson(&[header_line(4, 0, 0, 1), kanji_line("引", 57, "⼸⼁")]),
    )
    .await;
    mount_data_file(&server, "radicals-rc-en-4.0.0-full.ljson", radicals_full_body()).await;
    mount_data_file(&server, "radicals-rc-fr-4.0.0-full.ljson", radicals_full_body()).await;

    let db = test_database(&server, &dir);
    let english_db = db.clone();
    let english = tokio::spawn(async move {
        english_db
            .update(UpdateOptions {
                series: Some(kanji_series()),
                ..Default::default()
            })
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    db.update(UpdateOptions {
        series: Some(kanji_series()),
        lang: Some("fr".to_string()),
        ..Default::default()
    })
    .await?;

    let english_outcome = english.await?;
    assert!(matches!(english_outcome, Err(UpdateError::Aborted)));

    let version = db.get_data_version(DataSeries::Kanji).await?.unwrap();
    assert_eq!(version.lang, "fr");
    Ok(())
}

#[tokio::test]
async fn patch_applies_entries_and_deletions() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    mount_version_file(
        &server,
        "en",
        serde_json::json!({ "names": { "3": version_slot(3, 0, 1, 0) } }),
    )
    .await;
    mount_data_file(
        &server,
        "names-rc-en-3.0.0-full.ljson",
        ljson(&[
            header_line(3, 0, 0, 3),
            name_line(1, Some("松本"), "まつもと"),
            name_line(2, Some("田中"), "たなか"),
            name_line(3, None, "スミス"),
        ]),
    )
    .await;
    mount_data_file(
        &server,
        "names-rc-en-3.0.1-patch.ljson",
        ljson(&[
            header_line(3, 0, 1, 2),
            name_deletion_line(2),
            name_line(4, Some("鈴木"), "すずき"),
        ]),
    )
    .await;

    let db = test_database(&server, &dir);
    db.update(UpdateOptions {
        series: Some(names_series()),
        ..Default::default()
    })
    .await?;

    let version = db.get_data_version(DataSeries::Names).await?.unwrap();
    assert_eq!(version.version_number(), VersionNumber::new(3, 0, 1));

    // (B \ D) ∪ R: 田中 gone, 鈴木 present, the rest untouched
    assert!(db.get_names("たなか").await?.is_empty());
    assert_eq!(db.get_names("すずき").await?.len(), 1);
    assert_eq!(db.get_names("まつもと").await?.len(), 1);
    // Kana equivalence: hiragana query finds the katakana reading
    assert_eq!(db.get_names("すみす").await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn deletion_in_snapshot_is_fatal_and_commits_nothing() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    mount_version_file(
        &server,
        "en",
        serde_json::json!({ "names": { "3": version_slot(3, 0, 0, 0) } }),
    )
    .await;
    mount_data_file(
        &server,
        "names-rc-en-3.0.0-full.ljson",
        ljson(&[
            header_line(3, 0, 0, 2),
            name_line(1, Some("松本"), "まつもと"),
            name_deletion_line(1),
        ]),
    )
    .await;

    let db = test_database(&server, &dir);
    let outcome = db
        .update(UpdateOptions {
            series: Some(names_series()),
            ..Default::default()
        })
        .await;
    assert!(matches!(
        outcome,
        Err(UpdateError::Download(DownloadError::DeletionInSnapshot))
    ));
    assert_eq!(db.get_data_version(DataSeries::Names).await?, None);
    assert!(db.get_names("まつもと").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn invalid_record_is_fatal_not_skipped() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    mount_version_file(
        &server,
        "en",
        serde_json::json!({ "names": { "3": version_slot(3, 0, 0, 0) } }),
    )
    .await;
    mount_data_file(
        &server,
        "names-rc-en-3.0.0-full.ljson",
        ljson(&[
            header_line(3, 0, 0, 2),
            name_line(1, Some("松本"), "まつもと"),
            // Missing readings and translations
            serde_json::json!({ "id": 2 }).to_string(),
        ]),
    )
    .await;

    let db = test_database(&server, &dir);
    let outcome = db
        .update(UpdateOptions {
            series: Some(names_series()),
            ..Default::default()
        })
        .await;
    assert!(matches!(
        outcome,
        Err(UpdateError::Download(
            DownloadError::FileInvalidRecord { .. }
        ))
    ));
    assert_eq!(db.get_data_version(DataSeries::Names).await?, None);
    Ok(())
}

#[tokio::test]
async fn header_version_must_match_the_url() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    mount_version_file(
        &server,
        "en",
        serde_json::json!({ "names": { "3": version_slot(3, 0, 0, 0) } }),
    )
    .await;
    mount_data_file(
        &server,
        "names-rc-en-3.0.0-full.ljson",
        // Header claims 3.0.1 inside the 3.0.0 file
        ljson(&[header_line(3, 0, 1, 1), name_line(1, None, "まつもと")]),
    )
    .await;

    let db = test_database(&server, &dir);
    let outcome = db
        .update(UpdateOptions {
            series: Some(names_series()),
            ..Default::default()
        })
        .await;
    assert!(matches!(
        outcome,
        Err(UpdateError::Download(
            DownloadError::FileVersionMismatch { .. }
        ))
    ));
    Ok(())
}

#[tokio::test]
async fn local_newer_than_remote_fails_as_too_old() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    mount_version_file(
        &server,
        "en",
        serde_json::json!({ "names": { "3": version_slot(3, 0, 1, 0) } }),
    )
    .await;
    mount_data_file(
        &server,
        "names-rc-en-3.0.0-full.ljson",
        ljson(&[header_line(3, 0, 0, 1), name_line(1, None, "まつもと")]),
    )
    .await;
    mount_data_file(
        &server,
        "names-rc-en-3.0.1-patch.ljson",
        ljson(&[header_line(3, 0, 1, 1), name_line(2, None, "たなか")]),
    )
    .await;

    let db = test_database(&server, &dir);
    db.update(UpdateOptions {
        series: Some(names_series()),
        ..Default::default()
    })
    .await?;
    assert_eq!(
        db.get_data_version(DataSeries::Names)
            .await?
            .unwrap()
            .version_number(),
        VersionNumber::new(3, 0, 1)
    );

    // The origin regresses to an older version file
    server.reset().await;
    mount_version_file(
        &server,
        "en",
        serde_json::json!({ "names": { "3": version_slot(3, 0, 0, 0) } }),
    )
    .await;

    let outcome = db
        .update(UpdateOptions {
            series: Some(names_series()),
            force_fetch: true,
            ..Default::default()
        })
        .await;
    assert!(matches!(
        outcome,
        Err(UpdateError::Download(DownloadError::DatabaseTooOld { .. }))
    ));
    // The local version is untouched
    assert_eq!(
        db.get_data_version(DataSeries::Names)
            .await?
            .unwrap()
            .version_number(),
        VersionNumber::new(3, 0, 1)
    );
    Ok(())
}

#[tokio::test]
async fn offline_parks_until_notified_online() -> Result<()> {
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlagProbe(AtomicBool);
    impl jpdict::update::ReachabilityProbe for FlagProbe {
        fn is_online(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    mount_version_file(&server, "en", kanji_group_version_file(0, 0)).await;
    mount_data_file(
        &server,
        "kanji-rc-en-4.0.0-full.ljson",
        ljson(&[header_line(4, 0, 0, 1), kanji_line("引", 57, "⼸⼁")]),
    )
    .await;
    mount_data_file(&server, "radicals-rc-en-4.0.0-full.ljson", radicals_full_body()).await;

    let probe = Arc::new(FlagProbe(AtomicBool::new(false)));
    let db = test_database(&server, &dir);
    let events: Arc<Mutex<Vec<RetryEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let retry = Arc::new(
        UpdateWithRetry::new(db.clone(), test_config(&server, &dir).retry, move |event| {
            sink.lock().unwrap().push(event);
        })
        .with_probe(probe.clone()),
    );

    let runner = Arc::clone(&retry);
    let handle = tokio::spawn(async move {
        runner
            .update(
                UpdateOptions {
                    series: Some(kanji_series()),
                    ..Default::default()
                },
                false,
            )
            .await
    });

    // Give the controller time to park, then restore connectivity.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|event| matches!(event, RetryEvent::Offline)));
    probe.0.store(true, Ordering::SeqCst);
    retry.notify_online();

    handle.await??;
    assert!(db.get_data_version(DataSeries::Kanji).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn destroy_cancels_updates_and_clears_data() -> Result<()> {
    let server = MockServer::start().await;
    let dir = TempDir::new()?;

    mount_version_file(&server, "en", kanji_group_version_file(0, 0)).await;
    mount_data_file_delayed(
        &server,
        "kanji-rc-en-4.0.0-full.ljson",
        ljson(&[header_line(4, 0, 0, 1), kanji_line("引", 57, "⼸⼁")]),
        Duration::from_millis(600),
    )
    .await;
    mount_data_file(&server, "radicals-rc-en-4.0.0-full.ljson", radicals_full_body()).await;

    let db = test_database(&server, &dir);
    let mut events = db.subscribe();

    let update_db = db.clone();
    let handle = tokio::spawn(async move {
        update_db
            .update(UpdateOptions {
                series: Some(kanji_series()),
                ..Default::default()
            })
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    db.destroy().await?;
    let outcome = handle.await?;
    assert!(matches!(outcome, Err(UpdateError::Aborted)));
    assert_eq!(db.get_data_version(DataSeries::Kanji).await?, None);

    // A Deleted event reached subscribers
    let mut saw_deleted = false;
    while let Ok(event) = events.try_recv() {
        if event == jpdict::DatabaseEvent::Deleted {
            saw_deleted = true;
        }
    }
    assert!(saw_deleted);
    Ok(())
}
