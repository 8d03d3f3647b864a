//! Squad membership rules: activation, capacity, joins and invariants.

use crate::common::{World, loner_vector, profile_vector, uniform_vector};
use squadmatch::MatchError;
use squadmatch::storage::SquadStore;
use squadmatch::types::{SquadStatus, UserId};
use std::collections::HashSet;

fn assert_invariants(world: &World) {
    let squads = world.store.squads_in_guild(world.guild).unwrap();
    for squad in &squads {
        assert!(squad.member_count <= 15, "{} over capacity", squad.id);
        if squad.status == SquadStatus::Active {
            assert!(squad.member_count >= 12, "{} active below minimum", squad.id);
        }
        let members = world.store.squad_members(squad.id).unwrap();
        assert_eq!(members.len(), squad.member_count);
    }

    let members: HashSet<UserId> = world
        .store
        .guild_members(world.guild)
        .unwrap()
        .into_iter()
        .map(|m| m.user_id)
        .collect();
    let seated: HashSet<UserId> = world
        .store
        .guild_squad_memberships(world.guild)
        .unwrap()
        .into_iter()
        .map(|m| m.user_id)
        .collect();
    let pool: HashSet<UserId> = world.pool_ids().into_iter().collect();
    assert_eq!(pool, members.difference(&seated).copied().collect());
}

#[test]
fn test_twelfth_member_activates_squad() {
    let world = World::new();
    let users = world.enroll_cluster(1..=16, 0.9);
    let registry = world.service.registry();
    let squad = registry.open_squad(world.guild, Some("Night Owls")).unwrap();
    assert_eq!(squad.status, SquadStatus::Forming);
    assert_eq!(squad.member_count, 0);

    for (i, &user) in users[..11].iter().enumerate() {
        let updated = world.service.add_member(squad.id, user).unwrap();
        assert_eq!(updated.member_count, i + 1);
        assert_eq!(updated.status, SquadStatus::Forming);
    }

    let updated = world.service.add_member(squad.id, users[11]).unwrap();
    assert_eq!(updated.member_count, 12);
    assert_eq!(updated.status, SquadStatus::Active);

    for &user in &users[12..15] {
        let updated = world.service.add_member(squad.id, user).unwrap();
        assert_eq!(updated.status, SquadStatus::Active);
    }
    assert_invariants(&world);
}

#[test]
fn test_full_squad_rejects_without_mutation() {
    let world = World::new();
    let users = world.enroll_cluster(1..=16, 0.9);
    let squad = world
        .service
        .create_squad(world.guild, &users[..15])
        .unwrap();
    assert_eq!(squad.member_count, 15);

    let err = world.service.add_member(squad.id, users[15]).unwrap_err();
    assert!(matches!(err, MatchError::SquadFull { max: 15, .. }));

    let after = world.service.registry().squad(squad.id).unwrap();
    assert_eq!(after, squad);
    assert_eq!(world.store.squad_members(squad.id).unwrap().len(), 15);
    assert!(world.pool_ids().contains(&users[15]));
}

#[test]
fn test_create_squad_validation() {
    let world = World::new();
    let users = world.enroll_cluster(1..=16, 0.9);
    let service = &world.service;

    assert!(matches!(
        service.create_squad(world.guild, &users[..11]),
        Err(MatchError::InvalidSquadSize { size: 11, .. })
    ));
    assert!(matches!(
        service.create_squad(world.guild, &users),
        Err(MatchError::InvalidSquadSize { size: 16, .. })
    ));

    let mut duplicated = users[..11].to_vec();
    duplicated.push(users[0]);
    assert!(matches!(
        service.create_squad(world.guild, &duplicated),
        Err(MatchError::DuplicateMember { .. })
    ));

    // A user with no embedding cannot be placed
    let mut missing = users[..11].to_vec();
    missing.push(UserId(200));
    assert!(matches!(
        service.create_squad(world.guild, &missing),
        Err(MatchError::UserNotFound { .. })
    ));

    assert!(
        world
            .store
            .squads_in_guild(world.guild)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_create_squad_reports_every_violation() {
    let world = World::new();
    let mut users = world.enroll_cluster(1..=10, 0.9);
    users.push(world.enroll(11, loner_vector(11)));
    users.push(world.enroll(12, loner_vector(12)));

    let err = world
        .service
        .create_squad(world.guild, &users)
        .unwrap_err();
    match err {
        MatchError::CompatibilityViolation { violations, .. } => {
            // Each loner against the 10 others, plus the loner pair
            assert_eq!(violations.len(), 21);
            assert!(violations.iter().all(|v| v.score < 0.7));
        }
        other => panic!("expected compatibility violation, got {other:?}"),
    }
    assert_eq!(world.pool_ids().len(), 12);
}

#[test]
fn test_member_in_squad_cannot_join_another() {
    let world = World::new();
    let users = world.enroll_cluster(1..=13, 0.9);
    let first = world
        .service
        .create_squad(world.guild, &users[..12])
        .unwrap();
    let second = world
        .service
        .registry()
        .open_squad(world.guild, None)
        .unwrap();
    assert_eq!(second.name, "Rustaceans Squad 2");

    let err = world.service.add_member(first.id, users[0]).unwrap_err();
    assert!(matches!(err, MatchError::AlreadyMember { .. }));

    let err = world.service.add_member(second.id, users[0]).unwrap_err();
    assert!(matches!(err, MatchError::SeatTaken { squad, .. } if squad == first.id));
    assert_invariants(&world);
}

#[test]
fn test_incompatible_candidate_is_refused() {
    let world = World::new();
    let users = world.enroll_cluster(1..=12, 0.9);
    let squad = world.service.create_squad(world.guild, &users).unwrap();
    let outsider = world.enroll(13, loner_vector(13));

    let err = world.service.add_member(squad.id, outsider).unwrap_err();
    match err {
        MatchError::CompatibilityViolation { violations, .. } => {
            assert_eq!(violations.len(), 12)
        }
        other => panic!("expected compatibility violation, got {other:?}"),
    }
    let after = world.service.registry().squad(squad.id).unwrap();
    assert_eq!(after.member_count, 12);
}

#[test]
fn test_completed_squad_is_closed() {
    let world = World::new();
    let users = world.enroll_cluster(1..=13, 0.9);
    let squad = world
        .service
        .create_squad(world.guild, &users[..12])
        .unwrap();
    let completed = world.service.registry().complete_squad(squad.id).unwrap();
    assert_eq!(completed.status, SquadStatus::Completed);

    assert!(
        world
            .service
            .find_squad_matches(users[12], world.guild)
            .unwrap()
            .is_empty()
    );
    let err = world.service.add_member(squad.id, users[12]).unwrap_err();
    assert!(matches!(err, MatchError::SquadClosed { .. }));
}

#[test]
fn test_join_places_user_in_best_squad() {
    let world = World::new();
    let near: Vec<UserId> = (1..=12)
        .map(|user| world.enroll(user, profile_vector(user, 0.3, Some((1, 0.6)))))
        .collect();
    let far: Vec<UserId> = (21..=32)
        .map(|user| world.enroll(user, profile_vector(user, 0.3, Some((2, 0.6)))))
        .collect();
    let near_squad = world.service.create_squad(world.guild, &near).unwrap();
    world.service.create_squad(world.guild, &far).unwrap();

    let newcomer = world.add_user(50, profile_vector(50, 0.3, Some((1, 0.6))));
    let matches = world
        .service
        .find_squad_matches(newcomer, world.guild)
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].squad_id, near_squad.id);
    assert!((matches[0].average_similarity - 0.9).abs() < 1e-4);
    assert_eq!(matches[0].available_slots, 3);

    let outcome = world
        .service
        .join_guild_and_match(newcomer, world.guild)
        .unwrap();
    assert!(!outcome.in_waiting_pool);
    let squad = outcome.assigned_squad.unwrap();
    assert_eq!(squad.id, near_squad.id);
    assert_eq!(squad.member_count, 13);
    assert_invariants(&world);
}

#[test]
fn test_join_without_fit_waits_in_pool() {
    let world = World::new();
    let users = world.enroll_cluster(1..=12, 0.9);
    world.service.create_squad(world.guild, &users).unwrap();
    let outsider = world.add_user(40, loner_vector(40));

    let outcome = world
        .service
        .join_guild_and_match(outsider, world.guild)
        .unwrap();
    assert!(outcome.in_waiting_pool);
    assert!(outcome.assigned_squad.is_none());
    assert_eq!(world.pool_ids(), vec![outsider]);
    assert_invariants(&world);
}

#[test]
fn test_join_completing_pool_forms_squad() {
    let world = World::new();
    world.enroll_cluster(1..=11, 0.85);
    let last = world.add_user(12, uniform_vector(12, 0.85));

    let outcome = world
        .service
        .join_guild_and_match(last, world.guild)
        .unwrap();
    let squad = outcome.assigned_squad.unwrap();
    assert_eq!(squad.member_count, 12);
    assert_eq!(squad.status, SquadStatus::Active);
    assert!(world.pool_ids().is_empty());

    // Joining again returns the same seat
    let again = world
        .service
        .join_guild_and_match(last, world.guild)
        .unwrap();
    assert_eq!(again.assigned_squad.map(|s| s.id), Some(squad.id));
    assert_eq!(world.drain_events().len(), 1);
}

#[test]
fn test_reads_do_not_mutate() {
    let world = World::new();
    let users = world.enroll_cluster(1..=14, 0.9);
    world
        .service
        .create_squad(world.guild, &users[..12])
        .unwrap();
    let before_squads = world.store.squads_in_guild(world.guild).unwrap();

    let pool_a = world.service.get_waiting_pool(world.guild).unwrap();
    let pool_b = world.service.get_waiting_pool(world.guild).unwrap();
    assert_eq!(pool_a, pool_b);

    let matches_a = world
        .service
        .find_squad_matches(users[12], world.guild)
        .unwrap();
    let matches_b = world
        .service
        .find_squad_matches(users[12], world.guild)
        .unwrap();
    assert_eq!(matches_a, matches_b);
    assert_eq!(matches_a.len(), 1);

    assert_eq!(world.store.squads_in_guild(world.guild).unwrap(), before_squads);
    assert_eq!(world.pool_ids(), users[12..].to_vec());
}
