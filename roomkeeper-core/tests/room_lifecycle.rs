//! End-to-end room lifecycle against a database file

use roomkeeper_core::config::{ListingConfig, StoreConfig};
use roomkeeper_core::core_room::{
    with_creator, with_relations, ClientRegistry, ListQuery, MembershipManager, NewRelation,
    Permission, RoomError, RoomManager, RoomManagerImpl, RoomRole, RoomService, RoomSetting,
    SessionTokenIssuer, SortKey, SortOrder, SqlRoomStore,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn file_store(dir: &TempDir) -> SqlRoomStore {
    let config = StoreConfig {
        database_path: dir.path().join("rooms.db"),
        pool_size: 4,
        busy_timeout: Duration::from_secs(5),
    };
    SqlRoomStore::open(&config).expect("open store")
}

#[test]
fn rooms_survive_reopen() {
    let dir = TempDir::new().unwrap();

    let room_id = {
        let manager = RoomManagerImpl::new(file_store(&dir));
        let alice = manager.create_user("alice").unwrap();
        manager
            .create_room("lobby", "hunter2", vec![with_creator(alice.id)])
            .unwrap()
            .id
    };

    let manager = RoomManagerImpl::new(file_store(&dir));
    let loaded = manager.get_room_with_creator(room_id).unwrap();
    assert_eq!(loaded.room.name, "lobby");
    assert_eq!(loaded.creator.username, "alice");
    assert!(loaded.room.need_password());
    assert!(manager.verify_and_enter(loaded.creator.id, room_id, "hunter2").is_ok());
}

#[test]
fn creator_relation_is_unique_and_complete() {
    let dir = TempDir::new().unwrap();
    let manager = RoomManagerImpl::new(file_store(&dir));
    let alice = manager.create_user("alice").unwrap();
    let bob = manager.create_user("bob").unwrap();
    let carol = manager.create_user("carol").unwrap();

    let room = manager
        .create_room(
            "lobby",
            "",
            vec![
                with_creator(alice.id),
                with_relations(vec![
                    NewRelation::with_preset(bob.id, RoomRole::Admin),
                    NewRelation::with_preset(carol.id, RoomRole::Member),
                ]),
            ],
        )
        .unwrap();

    let members = manager.list_members(room.id).unwrap();
    let creators: Vec<_> = members.iter().filter(|r| r.role == RoomRole::Creator).collect();
    assert_eq!(creators.len(), 1);
    assert_eq!(creators[0].user_id, room.creator_id);
    assert_eq!(creators[0].permissions, Permission::ALL);
    assert_eq!(members.len(), 3);
}

#[test]
fn delete_retires_room_and_relations() {
    let dir = TempDir::new().unwrap();
    let manager = RoomManagerImpl::new(file_store(&dir));
    let alice = manager.create_user("alice").unwrap();
    let bob = manager.create_user("bob").unwrap();

    let room = manager.create_room("lobby", "", vec![with_creator(alice.id)]).unwrap();
    manager.grant_role(room.id, bob.id, RoomRole::Member).unwrap();
    manager.delete_room(room.id).unwrap();

    assert!(matches!(manager.get_room(room.id), Err(RoomError::RoomNotFound)));
    for user in [alice.id, bob.id] {
        assert!(matches!(
            manager.check_permission(room.id, user, Permission::SEND_CHAT),
            Err(RoomError::RelationNotFound)
        ));
    }

    let again = manager.create_room("lobby", "", vec![with_creator(alice.id)]).unwrap();
    assert_ne!(again.id, room.id);
}

#[tokio::test]
async fn service_lists_visible_rooms_in_order() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(ClientRegistry::new());
    let service = RoomService::new(
        file_store(&dir),
        registry.clone(),
        Arc::new(SessionTokenIssuer::new()),
        ListingConfig::default(),
    );

    let alice = service.create_user("alice".to_string()).await.unwrap();
    let mut ids = Vec::new();
    for (name, people) in [("room1", 5), ("room2", 5), ("room3", 9)] {
        let room = service
            .create_room(name.to_string(), String::new(), vec![with_creator(alice.id)])
            .await
            .unwrap();
        for _ in 0..people {
            registry.join(room.id);
        }
        ids.push(room.id);
    }
    let hidden = service
        .create_room("hidden".to_string(), String::new(), vec![with_creator(alice.id)])
        .await
        .unwrap();
    service
        .change_setting(hidden.id, RoomSetting { hidden: true })
        .await
        .unwrap();

    let query = |order| ListQuery {
        sort: SortKey::PeopleNum,
        order,
        page: 1,
        max: 10,
    };

    let asc = service.list_rooms(query(SortOrder::Asc)).await.unwrap();
    let asc_ids: Vec<_> = asc.list.iter().map(|r| r.room_id).collect();
    assert_eq!(asc.total, 3);
    assert_eq!(asc_ids, vec![ids[0], ids[1], ids[2]]);

    let desc = service.list_rooms(query(SortOrder::Desc)).await.unwrap();
    let desc_ids: Vec<_> = desc.list.iter().map(|r| r.room_id).collect();
    assert_eq!(desc_ids, vec![ids[2], ids[0], ids[1]]);

    let past_end = ListQuery {
        page: 5,
        ..query(SortOrder::Asc)
    };
    let empty = service.list_rooms(past_end).await.unwrap();
    assert!(empty.list.is_empty());
    assert_eq!(empty.total, 3);
}

#[test]
fn bad_listing_query_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir);
    let manager = RoomManagerImpl::new(store.clone());
    let alice = manager.create_user("alice").unwrap();
    manager.create_room("lobby", "", vec![with_creator(alice.id)]).unwrap();

    let err = ListQuery::parse(Some("mood"), None, None, None, &ListingConfig::default())
        .unwrap_err();
    assert!(matches!(err, RoomError::BadRequest(_)));
    assert_eq!(err.payload().kind.as_str(), "BadRequest");
    assert_eq!(store.list_all().unwrap().len(), 1);
}
