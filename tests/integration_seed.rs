#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, clippy::must_use_candidate, missing_debug_implementations, unreachable_pub)]
use geofeed_server::adapters::store::{MemoryMessageStore, MessageStore};
use geofeed_server::config::SeedConfig;
use geofeed_server::services::message_service::SEED_AUTHOR;
use geofeed_server::{AppBuilder, seed_lines, seed_store};
use std::path::PathBuf;
use std::sync::Arc;
mod common;

fn seed_file(content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("geofeed-seed-{}.txt", uuid::Uuid::new_v4()));
    std::fs::write(&path, content).unwrap();
    path
}

async fn message_service(store: &MemoryMessageStore) -> geofeed_server::services::message_service::MessageService {
    common::setup_tracing();
    let app = AppBuilder::new(common::get_test_config()).with_store(Arc::new(store.clone())).build().unwrap();
    app.services.message_service
}

#[test]
fn test_seed_lines_skips_blank_lines() {
    let lines = seed_lines("  Alice was beginning to get very tired  \n\n\t\nof sitting by her sister\r\n");
    assert_eq!(lines, vec!["Alice was beginning to get very tired", "of sitting by her sister"]);
}

#[tokio::test]
async fn test_seed_file_loads_one_message_per_line() {
    let store = MemoryMessageStore::new();
    let service = message_service(&store).await;
    let path = seed_file("Who are you?\n\nI hardly know, sir\njust at present\n");
    let seed = SeedConfig { file: Some(path.clone()), center_lng: 2.35, center_lat: 48.85, spread_deg: 0.01 };

    let inserted = seed_store(&service, &seed).await.unwrap();
    std::fs::remove_file(path).unwrap();

    assert_eq!(inserted, 3);
    assert_eq!(store.count().await.unwrap(), 3);
    let page = store.scan_page(None, 10).await.unwrap();
    assert!(page.iter().all(|m| m.author_id == SEED_AUTHOR));
    assert!(page.iter().all(|m| (m.location.lng - 2.35).abs() <= 0.01 && (m.location.lat - 48.85).abs() <= 0.01));
}

#[tokio::test]
async fn test_no_seed_file_is_a_no_op() {
    let store = MemoryMessageStore::new();
    let service = message_service(&store).await;

    assert_eq!(seed_store(&service, &SeedConfig::default()).await.unwrap(), 0);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_seed_file_is_an_error() {
    let store = MemoryMessageStore::new();
    let service = message_service(&store).await;
    let seed = SeedConfig { file: Some(PathBuf::from("/nonexistent/geofeed/seed.txt")), ..SeedConfig::default() };

    let err = seed_store(&service, &seed).await.unwrap_err();

    assert!(err.to_string().contains("could not read seed file"));
    assert_eq!(store.count().await.unwrap(), 0);
}
