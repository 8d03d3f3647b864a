//! Concurrent writers against the same squad or guild.

use crate::common::{World, profile_vector, uniform_vector};
use squadmatch::MatchError;
use squadmatch::storage::SquadStore;
use squadmatch::types::{SquadStatus, UserId};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_concurrent_adds_for_last_seat() {
    let world = World::new();
    let users = world.enroll_cluster(1..=16, 0.9);
    let squad = world
        .service
        .create_squad(world.guild, &users[..14])
        .unwrap();
    assert_eq!(squad.member_count, 14);

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [users[14], users[15]]
        .into_iter()
        .map(|user| {
            let service = world.service.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                service.add_member(squad.id, user)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let joined: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(joined.len(), 1, "results: {results:?}");
    let refused = results.iter().find(|r| r.is_err()).unwrap();
    assert!(
        matches!(refused, Err(MatchError::SquadFull { .. })),
        "unexpected refusal {refused:?}"
    );

    let after = world.service.registry().squad(squad.id).unwrap();
    assert_eq!(after.member_count, 15);
    assert_eq!(after.status, SquadStatus::Active);
    assert_eq!(world.store.squad_members(squad.id).unwrap().len(), 15);
}

#[test]
fn test_many_threads_never_overfill() {
    let world = World::new();
    let users = world.enroll_cluster(1..=24, 0.9);
    let squad = world
        .service
        .registry()
        .open_squad(world.guild, None)
        .unwrap();

    let barrier = Arc::new(Barrier::new(users.len()));
    let handles: Vec<_> = users
        .iter()
        .copied()
        .map(|user| {
            let service = world.service.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                service.registry().try_add_member(squad.id, user)
            })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        if handle.join().unwrap().unwrap().is_joined() {
            admitted += 1;
        }
    }

    let after = world.service.registry().squad(squad.id).unwrap();
    assert!(after.member_count <= 15);
    assert_eq!(after.member_count, admitted);
    assert_eq!(
        world.store.squad_members(squad.id).unwrap().len(),
        after.member_count
    );
    if after.member_count >= 12 {
        assert_eq!(after.status, SquadStatus::Active);
    } else {
        assert_eq!(after.status, SquadStatus::Forming);
    }
}

#[test]
fn test_concurrent_passes_seat_each_user_once() {
    let world = World::new();
    for user in 1..=13 {
        world.enroll(user, profile_vector(user, 0.2, Some((1, 0.7))));
    }
    for user in 14..=26 {
        world.enroll(user, profile_vector(user, 0.2, Some((2, 0.7))));
    }

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = world.service.clone();
            let barrier = barrier.clone();
            let guild = world.guild;
            thread::spawn(move || {
                barrier.wait();
                service.notify_waiting_pool_matches(guild)
            })
        })
        .collect();

    let mut formed = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(report) => formed += report.formed_squads.len(),
            Err(MatchError::FormationInProgress { .. }) => {}
            Err(other) => panic!("unexpected error {other}"),
        }
    }

    let seated: Vec<UserId> = world
        .store
        .guild_squad_memberships(world.guild)
        .unwrap()
        .into_iter()
        .map(|m| m.user_id)
        .collect();
    let unique: HashSet<UserId> = seated.iter().copied().collect();
    assert_eq!(seated.len(), unique.len());
    assert_eq!(
        world.store.squads_in_guild(world.guild).unwrap().len(),
        formed
    );
    assert_eq!(formed, 2);
    assert!(world.pool_ids().is_empty());
}

#[test]
fn test_join_races_formation_pass() {
    let world = World::new();
    world.enroll_cluster(1..=14, 0.9);
    for user in 15..=18 {
        world.add_user(user, uniform_vector(user, 0.9));
    }

    let barrier = Arc::new(Barrier::new(5));
    let mut handles = Vec::new();
    for user in 15..=18u32 {
        let service = world.service.clone();
        let barrier = barrier.clone();
        let guild = world.guild;
        handles.push(thread::spawn(move || {
            barrier.wait();
            service.join_guild_and_match(UserId(user), guild).map(|_| ())
        }));
    }
    {
        let service = world.service.clone();
        let barrier = barrier.clone();
        let guild = world.guild;
        handles.push(thread::spawn(move || {
            barrier.wait();
            match service.notify_waiting_pool_matches(guild) {
                Ok(_) | Err(MatchError::FormationInProgress { .. }) => Ok(()),
                Err(e) => Err(e),
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let seated: Vec<UserId> = world
        .store
        .guild_squad_memberships(world.guild)
        .unwrap()
        .into_iter()
        .map(|m| m.user_id)
        .collect();
    let unique: HashSet<UserId> = seated.iter().copied().collect();
    assert_eq!(seated.len(), unique.len());
    for squad in world.store.squads_in_guild(world.guild).unwrap() {
        assert!(squad.member_count <= 15);
        assert!(squad.status != SquadStatus::Active || squad.member_count >= 12);
    }
}
