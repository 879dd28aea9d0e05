//! Integration tests for publication runs
//!
//! These tests verify that:
//! - Each source gets its own bundle plus a combined bundle
//! - Shared event rows are written once across concurrent batches
//! - Verbatim sources publish their upstream bundle byte for byte
//! - Extensions without rows are left out of the bundle and descriptor
//! - Working files are removed after finalize and after cancellation
//! - An identical rerun republishes nothing

use dwca_publisher::adapters::storage::FileProviderStore;
use dwca_publisher::config::ArchiveConfig;
use dwca_publisher::core::archive::{ArchiveKind, ProcessInfo};
use dwca_publisher::core::export::PublicationCoordinator;
use dwca_publisher::core::state::{PublicationStatus, StateManager};
use dwca_publisher::domain::{DataProvider, Observation};
use serde_json::json;
use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;

struct Fixture {
    _dir: TempDir,
    store: Arc<FileProviderStore>,
    config: ArchiveConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Fixture {
    async fn new(providers: &[DataProvider]) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileProviderStore::new(dir.path().join("store")));
        store.save_providers(providers).await.unwrap();

        let config = ArchiveConfig {
            export_folder: dir.path().join("export"),
            working_folder: dir.path().join("work"),
            ..Default::default()
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            _dir: dir,
            store,
            config,
            shutdown_tx,
            shutdown_rx,
        }
    }

    fn coordinator(&self) -> Arc<PublicationCoordinator> {
        let state = Arc::new(StateManager::new_with_storage(self.store.clone()));
        Arc::new(PublicationCoordinator::new(
            self.config.clone(),
            self.store.clone(),
            state,
            self.shutdown_rx.clone(),
        ))
    }

    fn export(&self, name: &str) -> PathBuf {
        self.config.export_folder.join(name)
    }
}

fn observation(provider: i32, occurrence_id: &str, event_id: Option<&str>) -> Observation {
    let mut doc = json!({
        "dataProviderId": provider,
        "occurrence": { "occurrenceId": occurrence_id, "basisOfRecord": "HumanObservation" },
        "taxon": { "taxonId": "100024", "scientificName": "Parus major" },
        "location": { "countryCode": "SE", "decimalLatitude": 57.7, "decimalLongitude": 11.9 }
    });
    if let Some(event_id) = event_id {
        doc["event"] = json!({
            "eventId": event_id,
            "startDate": "2024-05-01T06:00:00Z",
            "samplingProtocol": "Point count"
        });
    }
    serde_json::from_value(doc).unwrap()
}

fn with_measurement(mut obs: Observation) -> Observation {
    obs.measurements = vec![serde_json::from_value(json!({
        "measurementType": "wing length",
        "measurementValue": "74",
        "measurementUnit": "mm"
    }))
    .unwrap()];
    obs
}

fn entry_names(bundle: &Path) -> BTreeSet<String> {
    let archive = zip::ZipArchive::new(std::fs::File::open(bundle).unwrap()).unwrap();
    archive.file_names().map(str::to_string).collect()
}

fn entry_text(bundle: &Path, name: &str) -> String {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(bundle).unwrap()).unwrap();
    let mut content = String::new();
    archive
        .by_name(name)
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    content
}

fn data_lines(bundle: &Path, name: &str) -> usize {
    // Header row excluded
    entry_text(bundle, name).lines().count() - 1
}

fn dir_is_empty(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

#[tokio::test]
async fn test_end_to_end_publication() {
    let birds = DataProvider::new(1, "birds");
    let survey = DataProvider::new(2, "survey").with_event_records();
    let fixture = Fixture::new(&[birds.clone(), survey.clone()]).await;
    let coordinator = fixture.coordinator();

    coordinator.begin_run().unwrap();
    assert!(
        coordinator
            .write_batch(
                vec![
                    with_measurement(observation(1, "b-1", None)),
                    observation(1, "b-2", None),
                ],
                &birds,
                "birds-00001",
            )
            .await
    );
    assert!(
        coordinator
            .write_batch(
                vec![
                    observation(2, "s-1", Some("E1")),
                    observation(2, "s-2", Some("E1")),
                    observation(2, "s-3", Some("E2")),
                ],
                &survey,
                "survey-00001",
            )
            .await
    );

    let info = ProcessInfo::new("run-1", chrono::Utc::now())
        .with_provider("birds", 2)
        .with_provider("survey", 3);
    let summary = coordinator.finalize_run(Some(info)).await.unwrap();

    assert!(summary.is_successful());
    assert_eq!(summary.sources_processed, 2);
    assert_eq!(summary.batches_written, 2);
    assert_eq!(summary.changed_bundles().len(), 4);

    let birds_zip = fixture.export("birds.zip");
    let names = entry_names(&birds_zip);
    assert!(names.contains("meta.xml"));
    assert!(names.contains("eml.xml"));
    assert!(names.contains("processinfo.xml"));
    assert!(names.contains("extendedMeasurementOrFact.txt"));
    assert_eq!(data_lines(&birds_zip, "occurrence.txt"), 2);

    let event_zip = fixture.export("survey-event.zip");
    assert_eq!(data_lines(&event_zip, "event.txt"), 2);
    assert_eq!(data_lines(&event_zip, "occurrence.txt"), 3);
    assert!(summary.bundle("survey", ArchiveKind::Event).unwrap().changed);

    let combined = fixture.export("all.zip");
    assert_eq!(data_lines(&combined, "occurrence.txt"), 5);
    assert!(entry_text(&combined, "eml.xml").contains("All data providers"));

    let state = StateManager::new_with_storage(fixture.store.clone());
    let record = state.load_publication("survey").await.unwrap().unwrap();
    assert_eq!(record.status, PublicationStatus::Published);
    assert_eq!(record.publications_count, 1);
    assert!(record.fingerprint.is_some());
}

#[tokio::test]
async fn test_concurrent_batches_write_shared_event_once() {
    let survey = DataProvider::new(2, "survey").with_event_records();
    let fixture = Fixture::new(&[survey.clone()]).await;
    let coordinator = fixture.coordinator();
    coordinator.begin_run().unwrap();

    let mut handles = Vec::new();
    for batch in 0..8 {
        let coordinator = Arc::clone(&coordinator);
        let survey = survey.clone();
        handles.push(tokio::spawn(async move {
            let records = (0..25)
                .map(|i| observation(2, &format!("occ-{batch}-{i}"), Some("shared-event")))
                .collect();
            coordinator
                .write_batch(records, &survey, &format!("survey-{batch:05}"))
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    let summary = coordinator.finalize_run(None).await.unwrap();
    assert_eq!(summary.batches_written, 8);

    let event_zip = fixture.export("survey-event.zip");
    assert_eq!(data_lines(&event_zip, "event.txt"), 1);
    assert_eq!(data_lines(&event_zip, "occurrence.txt"), 200);
    assert_eq!(data_lines(&fixture.export("survey.zip"), "occurrence.txt"), 200);
}

#[tokio::test]
async fn test_verbatim_source_publishes_upstream_bundle() {
    let nors = DataProvider::new(3, "nors").with_upstream_verbatim();
    let birds = DataProvider::new(1, "birds");
    let fixture = Fixture::new(&[nors.clone(), birds.clone()]).await;

    let upstream_dir = fixture.store.root().join("upstream");
    std::fs::create_dir_all(&upstream_dir).unwrap();
    let upstream = {
        let mut buffer = std::io::Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(&mut buffer);
        zip.start_file("meta.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<archive/>").unwrap();
        zip.finish().unwrap();
        buffer.into_inner()
    };
    std::fs::write(upstream_dir.join("nors.zip"), &upstream).unwrap();

    let coordinator = fixture.coordinator();
    coordinator.begin_run().unwrap();
    assert!(
        coordinator
            .write_batch(vec![observation(3, "n-1", None)], &nors, "")
            .await
    );
    assert!(
        coordinator
            .write_batch(vec![observation(1, "b-1", None)], &birds, "")
            .await
    );
    let summary = coordinator.finalize_run(None).await.unwrap();

    assert_eq!(std::fs::read(fixture.export("nors.zip")).unwrap(), upstream);
    assert!(summary.bundle("nors", ArchiveKind::Occurrence).unwrap().verbatim);

    // Verbatim rows never reach the combined bundle
    assert_eq!(data_lines(&fixture.export("all.zip"), "occurrence.txt"), 1);
}

#[tokio::test]
async fn test_missing_upstream_bundle_skips_source() {
    let nors = DataProvider::new(3, "nors").with_upstream_verbatim();
    let fixture = Fixture::new(&[nors.clone()]).await;
    let coordinator = fixture.coordinator();

    coordinator.begin_run().unwrap();
    coordinator.write_batch(Vec::new(), &nors, "").await;
    let summary = coordinator.finalize_run(None).await.unwrap();

    assert!(summary.bundles.is_empty());
    assert!(!fixture.export("nors.zip").exists());
}

#[tokio::test]
async fn test_empty_extensions_are_omitted() {
    let birds = DataProvider::new(1, "birds");
    let fixture = Fixture::new(&[birds.clone()]).await;
    let coordinator = fixture.coordinator();

    coordinator.begin_run().unwrap();
    coordinator
        .write_batch(vec![observation(1, "b-1", None)], &birds, "b1")
        .await;
    coordinator.finalize_run(None).await.unwrap();

    let bundle = fixture.export("birds.zip");
    let names = entry_names(&bundle);
    assert_eq!(
        names,
        ["eml.xml", "meta.xml", "occurrence.txt"]
            .into_iter()
            .map(str::to_string)
            .collect()
    );

    let meta = entry_text(&bundle, "meta.xml");
    assert!(meta.contains("occurrence.txt"));
    assert!(!meta.contains("multimedia.txt"));
    assert!(!meta.contains("extendedMeasurementOrFact.txt"));
}

#[tokio::test]
async fn test_restricted_observations_are_not_published() {
    let birds = DataProvider::new(1, "birds");
    let fixture = Fixture::new(&[birds.clone()]).await;
    let coordinator = fixture.coordinator();

    let mut hidden = observation(1, "secret", None);
    hidden.restricted = true;

    coordinator.begin_run().unwrap();
    coordinator
        .write_batch(vec![observation(1, "b-1", None), hidden], &birds, "b1")
        .await;
    coordinator.finalize_run(None).await.unwrap();

    let rows = entry_text(&fixture.export("birds.zip"), "occurrence.txt");
    assert!(rows.contains("b-1"));
    assert!(!rows.contains("secret"));
}

#[tokio::test]
async fn test_working_files_removed_after_finalize() {
    let birds = DataProvider::new(1, "birds");
    let fixture = Fixture::new(&[birds.clone()]).await;
    let coordinator = fixture.coordinator();

    coordinator.begin_run().unwrap();
    coordinator
        .write_batch(vec![observation(1, "b-1", None)], &birds, "b1")
        .await;
    assert!(!dir_is_empty(&fixture.config.working_folder));

    coordinator.finalize_run(None).await.unwrap();
    assert!(dir_is_empty(&fixture.config.working_folder));

    // Idempotent
    coordinator.cleanup_run();
    assert!(dir_is_empty(&fixture.config.working_folder));
}

#[tokio::test]
async fn test_cancelled_finalize_publishes_nothing_and_cleans_up() {
    let birds = DataProvider::new(1, "birds");
    let fixture = Fixture::new(&[birds.clone()]).await;
    let coordinator = fixture.coordinator();

    coordinator.begin_run().unwrap();
    coordinator
        .write_batch(vec![observation(1, "b-1", None)], &birds, "b1")
        .await;

    fixture.shutdown_tx.send(true).unwrap();
    let err = coordinator.finalize_run(None).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(!fixture.export("birds.zip").exists());
    assert!(dir_is_empty(&fixture.config.working_folder));
}

#[tokio::test]
async fn test_identical_rerun_publishes_nothing() {
    let birds = DataProvider::new(1, "birds");
    let fixture = Fixture::new(&[birds.clone()]).await;

    for run in 0..2 {
        let coordinator = fixture.coordinator();
        coordinator.begin_run().unwrap();
        coordinator
            .write_batch(
                vec![observation(1, "b-1", None), observation(1, "b-2", None)],
                &birds,
                "b1",
            )
            .await;
        let summary = coordinator.finalize_run(None).await.unwrap();

        if run == 0 {
            assert_eq!(summary.changed_bundles().len(), 2);
        } else {
            assert!(summary.changed_bundles().is_empty());
            assert!(!summary.combined().unwrap().changed);
        }
    }

    let state = StateManager::new_with_storage(fixture.store.clone());
    let record = state.load_publication("birds").await.unwrap().unwrap();
    assert_eq!(record.publications_count, 1);
}

#[tokio::test]
async fn test_rerun_with_new_process_info_publishes_nothing() {
    let survey = DataProvider::new(2, "survey").with_event_records();
    let fixture = Fixture::new(&[survey.clone()]).await;

    for (run, started) in [
        ("run-a", "2026-10-15T06:00:00Z"),
        ("run-b", "2026-10-16T06:00:00.123456789Z"),
    ] {
        let coordinator = fixture.coordinator();
        coordinator.begin_run().unwrap();
        coordinator
            .write_batch(
                vec![
                    observation(2, "s-1", Some("E1")),
                    observation(2, "s-2", Some("E2")),
                ],
                &survey,
                "s1",
            )
            .await;

        let start: chrono::DateTime<chrono::Utc> = started.parse().unwrap();
        let info = ProcessInfo::new(format!("{run}-{}", uuid::Uuid::new_v4()), start)
            .with_provider("survey", 2)
            .finished(chrono::Utc::now());
        let summary = coordinator.finalize_run(Some(info)).await.unwrap();

        if run == "run-a" {
            assert_eq!(summary.changed_bundles().len(), 3);
        } else {
            assert!(summary.changed_bundles().is_empty());
            assert!(!summary.combined().unwrap().changed);
        }
    }

    let state = StateManager::new_with_storage(fixture.store.clone());
    let record = state.load_publication("survey").await.unwrap().unwrap();
    assert_eq!(record.publications_count, 1);
}

#[tokio::test]
async fn test_changed_rerun_republishes() {
    let birds = DataProvider::new(1, "birds");
    let fixture = Fixture::new(&[birds.clone()]).await;

    for (run, count) in [(0, 1), (1, 3)] {
        let coordinator = fixture.coordinator();
        coordinator.begin_run().unwrap();
        let records = (0..count)
            .map(|i| observation(1, &format!("b-{i}"), None))
            .collect();
        coordinator.write_batch(records, &birds, "b1").await;
        let summary = coordinator.finalize_run(None).await.unwrap();
        assert!(
            summary.bundle("birds", ArchiveKind::Occurrence).unwrap().changed,
            "run {run} should publish"
        );
    }

    assert_eq!(data_lines(&fixture.export("birds.zip"), "occurrence.txt"), 3);
}

#[tokio::test]
async fn test_shared_event_across_default_and_named_batches() {
    let source = DataProvider::new(5, "source-x").with_event_records();
    let fixture = Fixture::new(&[source.clone()]).await;
    let coordinator = fixture.coordinator();

    coordinator.begin_run().unwrap();
    assert!(
        coordinator
            .write_batch(
                vec![
                    observation(5, "obs1", Some("eventA")),
                    observation(5, "obs2", Some("eventA")),
                ],
                &source,
                "",
            )
            .await
    );
    assert!(
        coordinator
            .write_batch(vec![observation(5, "obs3", Some("eventA"))], &source, "batch2")
            .await
    );
    let summary = coordinator.finalize_run(None).await.unwrap();

    let event_zip = fixture.export("source-x-event.zip");
    assert_eq!(data_lines(&event_zip, "event.txt"), 1);
    assert_eq!(data_lines(&event_zip, "occurrence.txt"), 3);
    assert_eq!(data_lines(&fixture.export("source-x.zip"), "occurrence.txt"), 3);

    // First publication of the source, so the combined bundle goes out too
    assert!(summary.combined().unwrap().changed);
}

#[tokio::test]
async fn test_colliding_bundle_names_fail_finalize() {
    let x = DataProvider::new(1, "x").with_event_records();
    let x_event = DataProvider::new(2, "x-event");
    let fixture = Fixture::new(&[x.clone(), x_event.clone()]).await;
    let coordinator = fixture.coordinator();

    coordinator.begin_run().unwrap();
    assert!(
        coordinator
            .write_batch(vec![observation(1, "x-1", Some("E1"))], &x, "x1")
            .await
    );
    assert!(
        coordinator
            .write_batch(vec![observation(2, "y-1", None)], &x_event, "y1")
            .await
    );

    let err = coordinator.finalize_run(None).await.unwrap_err();
    assert!(err.to_string().contains("x-event.zip"));
    assert!(!fixture.export("x-event.zip").exists());
    assert!(dir_is_empty(&fixture.config.working_folder));
}
