//! End-to-end facade tests over the in-memory store and scripted upstream.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{TimeDelta, Utc};
use rivulet_app::{AppError, Library, LibraryOptions};
use rivulet_core::model::JobStatus;
use rivulet_core::store::CacheStore;
use rivulet_sync::{PopulateOptions, SyncError, Trigger, is_valid_code};
use rivulet_telemetry::Metrics;
use rivulet_test_support::fixtures::{detail_with_files, ready_summary};
use rivulet_test_support::{MemoryStore, ScriptedUpstream};
use tokio::time::sleep;

fn wired_library(
    client: &Arc<ScriptedUpstream>,
    store: &Arc<MemoryStore>,
    options: LibraryOptions,
) -> Result<Library> {
    let metrics = Metrics::new()?;
    Ok(Library::new(
        Arc::clone(client) as Arc<dyn rivulet_debrid::client::UpstreamClient>,
        Arc::clone(store) as Arc<dyn rivulet_core::store::CacheStore>,
        options,
        metrics,
    ))
}

fn fast_options() -> LibraryOptions {
    LibraryOptions {
        populate: PopulateOptions {
            batch_delay: Duration::from_millis(0),
            ..PopulateOptions::default()
        },
        ..LibraryOptions::default()
    }
}

fn seed_upstream(client: &ScriptedUpstream) {
    let now = Utc::now();
    let mut torrents = Vec::new();
    for (id, name, offset) in [
        ("A", "Release.A", 0_i64),
        ("B", "Release.B", 1),
        ("C", "Release.C", 2),
    ] {
        let added = now - TimeDelta::hours(offset);
        torrents.push(ready_summary(id, name, added));
        client.set_detail(detail_with_files(
            id,
            name,
            added,
            &[(&format!("/{name}/movie.mkv"), 1_000, true)],
        ));
    }
    client.set_torrents(torrents);
}

#[tokio::test]
async fn browsing_sees_a_fully_committed_snapshot() -> Result<()> {
    let client = Arc::new(ScriptedUpstream::new());
    let store = Arc::new(MemoryStore::new());
    seed_upstream(&client);
    let library = wired_library(&client, &store, fast_options())?;

    assert!(library.ensure_library_fresh().await?);

    let index = library.directory_index().await?;
    assert_eq!(index.len(), 3);

    let torrents = library.directory("Release.A").await?;
    assert_eq!(torrents.len(), 1);
    assert!(torrents[0].is_detailed());

    let statistics = library.statistics().await?;
    assert_eq!(statistics.total, 3);

    // A second call within the freshness window is a no-op.
    assert!(!library.ensure_library_fresh().await?);
    Ok(())
}

#[tokio::test]
async fn background_population_completes_and_reports_progress() -> Result<()> {
    let client = Arc::new(ScriptedUpstream::new());
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    for (id, name) in [("X", "Release.X"), ("Y", "Release.Y")] {
        store.seed_torrent(rivulet_core::model::Torrent {
            id: id.to_string(),
            name: name.to_string(),
            hash: format!("hash-{id}"),
            added: now,
            ended: None,
            selected_files: std::collections::BTreeMap::new(),
            state: rivulet_core::model::TorrentHealth::Ok,
            total_size: 0,
            cache_timestamp: None,
        });
        client.set_detail(detail_with_files(
            id,
            name,
            now,
            &[(&format!("/{name}/movie.mkv"), 1_000, true)],
        ));
    }
    let library = wired_library(&client, &store, fast_options())?;

    let job_id = library.start_population(Trigger::Manual).await?;
    let mut status = None;
    for _ in 0..50 {
        status = library.population_status(Some(job_id)).await?;
        if status
            .as_ref()
            .is_some_and(|job| !job.is_running())
        {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    let job = status.expect("job row should exist");
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed, 2);
    assert!(store.torrent("X").await?.expect("record").is_detailed());
    Ok(())
}

#[tokio::test]
async fn second_start_reports_the_active_job() -> Result<()> {
    let client = Arc::new(ScriptedUpstream::new());
    let store = Arc::new(MemoryStore::new());
    store.seed_job(rivulet_core::model::RefreshJob {
        id: uuid::Uuid::new_v4(),
        status: JobStatus::Running,
        total: 25,
        processed: 7,
        current_torrent: None,
        started_at: Utc::now(),
        completed_at: None,
        error_message: None,
    });
    let library = wired_library(&client, &store, fast_options())?;

    let error = library
        .start_population(Trigger::Manual)
        .await
        .expect_err("second start must conflict");
    match error {
        AppError::Sync {
            source:
                SyncError::JobConflict {
                    processed, total, ..
                },
            ..
        } => {
            assert_eq!(processed, 7);
            assert_eq!(total, 25);
        }
        other => panic!("expected job conflict, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn stream_codes_round_trip_through_the_facade() -> Result<()> {
    let client = Arc::new(ScriptedUpstream::new());
    let store = Arc::new(MemoryStore::new());
    let library = wired_library(&client, &store, fast_options())?;

    let code = library
        .mint_stream_code(
            "Release.A",
            "A",
            "movie.mkv",
            "https://host.example/direct/A/0",
        )
        .await?;
    assert!(is_valid_code(&code));

    let resolved = library.resolve_stream_code(&code).await?;
    assert_eq!(resolved, "https://host.example/direct/A/0");

    // Unknown codes degrade to the fallback, malformed codes fail fast.
    let fallback = library.resolve_stream_code("ZZZZ9999ZZZZ9999").await?;
    assert!(fallback.ends_with("/not_found.mp4"));
    assert!(library.resolve_stream_code("nope").await.is_err());
    Ok(())
}
