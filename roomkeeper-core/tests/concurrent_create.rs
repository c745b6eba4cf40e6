//! Racing room creations against a shared database file

use roomkeeper_core::config::{ListingConfig, StoreConfig};
use roomkeeper_core::core_room::{
    with_creator, ClientRegistry, RoomError, RoomService, SessionTokenIssuer, SqlRoomStore,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn service(dir: &TempDir) -> RoomService {
    let config = StoreConfig {
        database_path: dir.path().join("race.db"),
        pool_size: 8,
        busy_timeout: Duration::from_secs(10),
    };
    RoomService::new(
        SqlRoomStore::open(&config).expect("open store"),
        Arc::new(ClientRegistry::new()),
        Arc::new(SessionTokenIssuer::new()),
        ListingConfig::default(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_name_race_has_one_winner() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);
    let alice = service.create_user("alice".to_string()).await.unwrap();
    let bob = service.create_user("bob".to_string()).await.unwrap();

    for round in 0..5 {
        let name = format!("contested-{}", round);
        let a = {
            let service = service.clone();
            let name = name.clone();
            tokio::spawn(async move {
                service
                    .create_room(name, String::new(), vec![with_creator(alice.id)])
                    .await
            })
        };
        let b = {
            let service = service.clone();
            let name = name.clone();
            tokio::spawn(async move {
                service
                    .create_room(name, String::new(), vec![with_creator(bob.id)])
                    .await
            })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let winners = results.iter().filter(|r| r.is_ok()).count();
        let duplicates = results
            .iter()
            .filter(|r| matches!(r, Err(RoomError::DuplicateRoom(_))))
            .count();

        assert_eq!(winners, 1, "round {}: {:?}", round, results);
        assert_eq!(duplicates, 1, "round {}: {:?}", round, results);

        let winner = results.iter().find_map(|r| r.as_ref().ok()).unwrap();
        let members = service.list_members(winner.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user_id, winner.creator_id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_names_all_succeed() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);
    let alice = service.create_user("alice".to_string()).await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .create_room(format!("room-{}", i), String::new(), vec![with_creator(alice.id)])
                    .await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 16);
    assert_eq!(service.list_rooms_by_creator(alice.id).await.unwrap().len(), 16);
}
