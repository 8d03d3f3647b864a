//! End-to-end formation passes over a guild's waiting pool.

use crate::common::{World, loner_vector, profile_vector, test_settings, uniform_vector};
use squadmatch::MatchError;
use squadmatch::notify::SquadEvent;
use squadmatch::storage::SquadStore;
use squadmatch::types::{SquadStatus, UserId};
use std::collections::HashSet;
use std::time::Duration;

fn assert_pairwise_compatible(world: &World, members: &[UserId]) {
    let engine = world.service.engine();
    for (i, &a) in members.iter().enumerate() {
        for &b in &members[i + 1..] {
            let score = engine.similarity(a, b).unwrap();
            assert!(
                score >= 0.7 - 1e-6,
                "{a} and {b} grouped at similarity {score}"
            );
        }
    }
}

#[test]
fn test_fifteen_similar_users_form_one_squad() {
    let world = World::new();
    let users = world.enroll_cluster(1..=15, 0.9);

    let report = world
        .service
        .notify_waiting_pool_matches(world.guild)
        .unwrap();

    assert_eq!(report.compatible_groups.len(), 1);
    let group = &report.compatible_groups[0];
    assert_eq!(group.len(), 15);
    assert!((group.average_similarity - 0.9).abs() < 1e-4);
    assert_pairwise_compatible(&world, &group.members);

    let members: HashSet<UserId> = group.members.iter().copied().collect();
    assert_eq!(members, users.iter().copied().collect());
    assert!(world.pool_ids().is_empty());

    let squad = &report.formed_squads[0];
    assert_eq!(squad.status, SquadStatus::Active);
    assert_eq!(squad.member_count, 15);
    assert_eq!(squad.name, "Rustaceans Squad 1");
}

#[test]
fn test_dissimilar_users_stay_in_pool() {
    let world = World::new();
    for user in 1..=12 {
        world.enroll(user, profile_vector(user, 0.3, Some((1, 0.5))));
    }
    for user in 13..=20 {
        world.enroll(user, profile_vector(user, 0.3, None));
    }

    let report = world
        .service
        .notify_waiting_pool_matches(world.guild)
        .unwrap();

    assert_eq!(report.compatible_groups.len(), 1);
    let mut members = report.compatible_groups[0].members.clone();
    members.sort();
    assert_eq!(members, (1..=12).map(UserId).collect::<Vec<_>>());
    assert_pairwise_compatible(&world, &members);

    assert_eq!(world.pool_ids(), (13..=20).map(UserId).collect::<Vec<_>>());
}

#[test]
fn test_small_pool_issues_no_queries() {
    let world = World::new();
    world.enroll_cluster(1..=8, 0.95);
    world.index.reset_counts();

    let report = world
        .service
        .notify_waiting_pool_matches(world.guild)
        .unwrap();

    assert!(report.is_empty());
    assert!(report.notified_user_ids.is_empty());
    assert_eq!(world.index.queries(), 0);
    assert_eq!(world.pool_ids().len(), 8);
    assert!(world.drain_events().is_empty());
}

#[test]
fn test_similarity_at_threshold_is_compatible() {
    let world = World::new();
    let x = world.add_user(1, uniform_vector(1, 0.7));
    let y = world.add_user(2, uniform_vector(2, 0.7));

    let verdict = world
        .service
        .registry()
        .verifier()
        .verify_group(&[x, y])
        .unwrap();
    assert!(verdict.ok, "violations: {:?}", verdict.violations);

    // Whole squads built at exactly the threshold are accepted too
    let users = world.enroll_cluster(3..=14, 0.7);
    let squad = world.service.create_squad(world.guild, &users).unwrap();
    assert_eq!(squad.member_count, 12);
}

#[test]
fn test_formed_squads_are_announced_after_the_pass() {
    let world = World::new();
    world.enroll_cluster(1..=12, 0.85);

    let report = world
        .service
        .notify_waiting_pool_matches(world.guild)
        .unwrap();
    let events = world.drain_events();

    assert_eq!(events.len(), 1);
    match &events[0] {
        SquadEvent::SquadFormed {
            guild_id,
            squad_id,
            user_ids,
        } => {
            assert_eq!(*guild_id, world.guild);
            assert_eq!(*squad_id, report.formed_squads[0].id);
            assert_eq!(user_ids, &report.notified_user_ids);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn test_two_clusters_form_two_squads() {
    let world = World::new();
    for user in 1..=13 {
        world.enroll(user, profile_vector(user, 0.2, Some((1, 0.7))));
    }
    for user in 14..=26 {
        world.enroll(user, profile_vector(user, 0.2, Some((2, 0.7))));
    }
    world.enroll(27, loner_vector(27));

    let report = world
        .service
        .notify_waiting_pool_matches(world.guild)
        .unwrap();

    assert_eq!(report.formed_squads.len(), 2);
    for group in &report.compatible_groups {
        assert_eq!(group.len(), 13);
        assert_pairwise_compatible(&world, &group.members);
    }
    assert_eq!(world.pool_ids(), vec![UserId(27)]);
    assert_eq!(world.store.squads_in_guild(world.guild).unwrap().len(), 2);
}

#[test]
fn test_transient_failure_drops_only_the_seed() {
    let mut settings = test_settings();
    settings.index.retry_max_attempts = 1;
    let world = World::with_settings(settings);
    world.enroll_cluster(1..=16, 0.9);
    world.index.fail_next_queries(1);

    let report = world
        .service
        .notify_waiting_pool_matches(world.guild)
        .unwrap();

    // The first seed's query fails, the next seed still gathers a full squad
    assert_eq!(report.formed_squads.len(), 1);
    assert_eq!(report.compatible_groups[0].len(), 15);
    assert!(!report.notified_user_ids.contains(&UserId(1)));
    assert_eq!(world.pool_ids(), vec![UserId(1)]);
}

#[test]
fn test_transient_failure_is_retried() {
    let world = World::new();
    world.enroll_cluster(1..=12, 0.9);
    world.index.fail_next_queries(2);

    let report = world
        .service
        .notify_waiting_pool_matches(world.guild)
        .unwrap();

    assert_eq!(report.notified_user_ids.len(), 12);
    assert!(world.pool_ids().is_empty());
}

#[test]
fn test_held_lease_rejects_second_pass() {
    let world = World::new();
    world.enroll_cluster(1..=12, 0.9);
    let token = world
        .store
        .acquire_formation_lease(world.guild, Duration::from_secs(60))
        .unwrap()
        .unwrap();

    let err = world
        .service
        .notify_waiting_pool_matches(world.guild)
        .unwrap_err();
    assert!(matches!(err, MatchError::FormationInProgress { .. }));
    assert_eq!(world.pool_ids().len(), 12);

    assert!(
        world
            .store
            .release_formation_lease(world.guild, token)
            .unwrap()
    );
    let report = world
        .service
        .notify_waiting_pool_matches(world.guild)
        .unwrap();
    assert_eq!(report.formed_squads.len(), 1);
}

#[test]
fn test_unknown_guild_fails() {
    let world = World::new();
    let err = world
        .service
        .notify_waiting_pool_matches(squadmatch::types::GuildId(99))
        .unwrap_err();
    assert!(matches!(err, MatchError::GuildNotFound { .. }));
}
