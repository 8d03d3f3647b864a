//! Periodic scanning over generated guilds, and snapshot persistence.

use squadmatch::config::Settings;
use squadmatch::fixture::{FixtureConfig, populate};
use squadmatch::matching::{MatchingService, PoolScanner};
use squadmatch::notify::LogDispatcher;
use squadmatch::storage::{SquadStore, StoreSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn fixture_config() -> FixtureConfig {
    FixtureConfig {
        guilds: 2,
        users_per_guild: 30,
        clusters: 2,
        spread: 0.4,
        seed: 7,
        ..FixtureConfig::default()
    }
}

#[tokio::test]
async fn test_scanner_places_generated_clusters() {
    let (store, index) = populate(&fixture_config()).unwrap();
    let service = MatchingService::new(
        &Settings::default(),
        Arc::new(store.clone()),
        Arc::new(index),
        Arc::new(LogDispatcher),
    )
    .unwrap();

    let scanner = PoolScanner::new(Arc::new(service), Duration::from_millis(10));
    let summary = scanner.run(Some(2)).await;

    assert_eq!(summary.rounds, 2);
    assert_eq!(summary.guilds_scanned, 4);
    assert_eq!(summary.squads_formed, 4);
    assert_eq!(summary.users_placed, 60);
    assert_eq!(summary.guilds_failed, 0);

    for guild in store.guilds().unwrap() {
        let squads = store.squads_in_guild(guild.id).unwrap();
        assert_eq!(squads.len(), 2);
        assert!(squads.iter().all(|s| s.member_count == 15));
    }
}

#[test]
fn test_snapshot_keeps_formed_squads() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state").join("snapshot.json");
    let settings = Settings::default();

    let (store, index) = populate(&fixture_config()).unwrap();
    let guild = store.guilds().unwrap()[0].id;
    let service = MatchingService::new(
        &settings,
        Arc::new(store.clone()),
        Arc::new(index.clone()),
        Arc::new(LogDispatcher),
    )
    .unwrap();
    let report = service.notify_waiting_pool_matches(guild).unwrap();
    assert_eq!(report.formed_squads.len(), 2);

    StoreSnapshot::capture(&store, &index).save(&path).unwrap();
    let (restored_store, restored_index) = StoreSnapshot::load(&path).unwrap().restore().unwrap();

    assert_eq!(
        restored_store.squads_in_guild(guild).unwrap(),
        store.squads_in_guild(guild).unwrap()
    );
    assert_eq!(restored_index.len(), 60);

    let restored = MatchingService::new(
        &settings,
        Arc::new(restored_store),
        Arc::new(restored_index),
        Arc::new(LogDispatcher),
    )
    .unwrap();
    assert!(restored.get_waiting_pool(guild).unwrap().is_empty());
    // The second guild was never scanned
    let other = store.guilds().unwrap()[1].id;
    assert_eq!(restored.get_waiting_pool(other).unwrap().len(), 30);
}
