//! Integration tests for the publish command

use dwca_publisher::adapters::storage::FileProviderStore;
use dwca_publisher::cli::commands::publish::PublishArgs;
use dwca_publisher::domain::DataProvider;
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;
use tokio::sync::watch;

fn write_config(dir: &Path) -> String {
    let path = dir.join("dwca-publisher.toml");
    let content = format!(
        r#"
[archive]
export_folder = "{export}"
working_folder = "{work}"

[publication]
batch_size = 2
parallel_batches = 2

[storage]
root = "{store}"

[logging]
local_enabled = false
"#,
        export = dir.join("export").display(),
        work = dir.join("work").display(),
        store = dir.join("store").display(),
    );
    std::fs::write(&path, content).unwrap();
    path.display().to_string()
}

fn args(input: &Path) -> PublishArgs {
    PublishArgs {
        input: input.to_path_buf(),
        batch_size: None,
        parallel_batches: None,
    }
}

#[tokio::test]
async fn test_publish_jsonl_file() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    FileProviderStore::new(dir.path().join("store"))
        .save_providers(&[DataProvider::new(1, "birds"), DataProvider::new(2, "fish")])
        .await
        .unwrap();

    let lines: Vec<String> = [(1, "b-1"), (1, "b-2"), (1, "b-3"), (2, "f-1")]
        .iter()
        .map(|(provider, id)| {
            json!({ "dataProviderId": provider, "occurrence": { "occurrenceId": id } }).to_string()
        })
        .collect();
    let input = dir.path().join("observations.jsonl");
    std::fs::write(&input, lines.join("\n")).unwrap();

    let (_tx, rx) = watch::channel(false);
    let code = args(&input).execute(&config, rx).await.unwrap();

    assert_eq!(code, 0);
    for bundle in ["birds.zip", "fish.zip", "all.zip"] {
        assert!(dir.path().join("export").join(bundle).exists(), "{bundle}");
    }
    assert!(std::fs::read_dir(dir.path().join("work"))
        .unwrap()
        .next()
        .is_none());
}

#[tokio::test]
async fn test_publish_without_providers_is_config_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let input = dir.path().join("observations.jsonl");
    std::fs::write(&input, "").unwrap();

    let (_tx, rx) = watch::channel(false);
    assert_eq!(args(&input).execute(&config, rx).await.unwrap(), 2);
}

#[tokio::test]
async fn test_publish_missing_config() {
    let dir = TempDir::new().unwrap();
    let (_tx, rx) = watch::channel(false);
    let code = args(&dir.path().join("none.jsonl"))
        .execute("does-not-exist.toml", rx)
        .await
        .unwrap();
    assert_eq!(code, 2);
}

#[tokio::test]
async fn test_publish_rejects_provider_named_like_combined_bundle() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    FileProviderStore::new(dir.path().join("store"))
        .save_providers(&[DataProvider::new(1, "birds"), DataProvider::new(2, "all")])
        .await
        .unwrap();
    let input = dir.path().join("observations.jsonl");
    std::fs::write(
        &input,
        json!({ "dataProviderId": 2, "occurrence": { "occurrenceId": "a-1" } }).to_string(),
    )
    .unwrap();

    let (_tx, rx) = watch::channel(false);
    assert_eq!(args(&input).execute(&config, rx).await.unwrap(), 2);
    assert!(!dir.path().join("export").join("all.zip").exists());
}
