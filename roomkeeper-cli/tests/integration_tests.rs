//! Integration tests for the roomkeeper CLI stack
//!
//! Several users share one database file and walk through:
//! - room creation with and without a password
//! - entry and token issuance
//! - role grants and permission edits
//! - member removal and room deletion

use anyhow::Result;
use roomkeeper_core::{
    config::{Config, StoreConfig},
    core_room::{
        ClientRegistry, ListQuery, MembershipManager, Permission, RoomError, RoomRole,
        RoomService, RoomSetting, SessionTokenIssuer, SqlRoomStore, User,
    },
};
use std::sync::Arc;
use tempfile::TempDir;

/// One shared service plus the issuer so tokens can be resolved
struct TestWorld {
    service: RoomService,
    issuer: Arc<SessionTokenIssuer>,
    registry: Arc<ClientRegistry>,
    #[allow(dead_code)]
    data_dir: TempDir,
}

impl TestWorld {
    fn new() -> Result<Self> {
        let data_dir = TempDir::new()?;
        let config = Config {
            store: StoreConfig {
                database_path: data_dir.path().join("roomkeeper.db"),
                ..Default::default()
            },
            ..Default::default()
        };
        config.validate()?;

        let issuer = Arc::new(SessionTokenIssuer::new());
        let registry = Arc::new(ClientRegistry::new());
        let service = RoomService::new(
            SqlRoomStore::open(&config.store)?,
            registry.clone(),
            issuer.clone(),
            config.listing.clone(),
        );

        Ok(Self {
            service,
            issuer,
            registry,
            data_dir,
        })
    }

    async fn user(&self, name: &str) -> Result<User> {
        Ok(self.service.create_user(name.to_string()).await?)
    }
}

#[tokio::test]
async fn test_password_room_entry() -> Result<()> {
    let world = TestWorld::new()?;
    let alice = world.user("alice").await?;
    let bob = world.user("bob").await?;

    let ticket = world
        .service
        .create_room_and_enter(alice.id, "lobby".into(), "hunter2".into(), RoomSetting::default())
        .await?;
    let claims = world.issuer.resolve(&ticket.token)?.expect("creator token");
    assert_eq!(claims.user_id, alice.id);

    let denied = world
        .service
        .enter_room(bob.id, ticket.room_id, "guess".into())
        .await;
    assert!(matches!(denied, Err(RoomError::AuthFailed)));

    let entry = world
        .service
        .enter_room(bob.id, ticket.room_id, "hunter2".into())
        .await?;
    assert_ne!(entry.token, ticket.token);

    // Entering does not make bob a member
    assert!(matches!(
        world
            .service
            .check_permission(ticket.room_id, bob.id, Permission::SEND_CHAT)
            .await,
        Err(RoomError::RelationNotFound)
    ));

    world.service.set_password(ticket.room_id, String::new()).await?;
    world
        .service
        .enter_room(bob.id, ticket.room_id, "anything".into())
        .await?;

    Ok(())
}

#[tokio::test]
async fn test_moderation_workflow() -> Result<()> {
    let world = TestWorld::new()?;
    let alice = world.user("alice").await?;
    let bob = world.user("bob").await?;
    let carol = world.user("carol").await?;

    let ticket = world
        .service
        .create_room_and_enter(alice.id, "studio".into(), String::new(), RoomSetting::default())
        .await?;
    let room = ticket.room_id;

    world.service.grant_role(room, bob.id, RoomRole::Admin).await?;
    world.service.grant_role(room, carol.id, RoomRole::Member).await?;

    assert!(world.service.check_permission(room, bob.id, Permission::KICK_MEMBER).await?);
    assert!(!world.service.check_permission(room, bob.id, Permission::DELETE_ROOM).await?);
    assert!(!world.service.check_permission(room, carol.id, Permission::KICK_MEMBER).await?);

    world
        .service
        .change_permission(room, carol.id, Permission::SEND_CHAT | Permission::EDIT_MEDIA)
        .await?;
    assert!(world.service.check_permission(room, carol.id, Permission::EDIT_MEDIA).await?);
    assert!(!world.service.check_permission(room, carol.id, Permission::ADD_MEDIA).await?);

    // The creator cannot be demoted or removed
    assert!(world.service.grant_role(room, alice.id, RoomRole::Member).await.is_err());
    assert!(world.service.revoke_member(room, alice.id).await.is_err());

    world.service.revoke_member(room, carol.id).await?;
    let members = world.service.list_members(room).await?;
    let ids: Vec<_> = members.iter().map(|m| m.user_id).collect();
    assert_eq!(members.len(), 2);
    assert!(ids.contains(&alice.id) && ids.contains(&bob.id));

    Ok(())
}

#[tokio::test]
async fn test_listing_and_deletion() -> Result<()> {
    let world = TestWorld::new()?;
    let alice = world.user("alice").await?;
    let config = world.service.directory().config().clone();

    let mut rooms = Vec::new();
    for name in ["room10", "room2", "room1"] {
        let ticket = world
            .service
            .create_room_and_enter(alice.id, name.into(), String::new(), RoomSetting::default())
            .await?;
        rooms.push(ticket.room_id);
    }
    world.registry.join(rooms[1]);

    let by_name = ListQuery::parse(Some("roomName"), Some("asc"), None, None, &config)?;
    let page = world.service.list_rooms(by_name).await?;
    let names: Vec<_> = page.list.iter().map(|r| r.room_name.as_str()).collect();
    assert_eq!(names, vec!["room1", "room2", "room10"]);

    let default = ListQuery::parse(None, None, None, None, &config)?;
    let page = world.service.list_rooms(default).await?;
    assert_eq!(page.list[0].room_id, rooms[1]);
    assert_eq!(page.list[0].people_num, 1);

    world.service.delete_room(rooms[1]).await?;
    assert!(matches!(
        world.service.check_room(rooms[1]).await,
        Err(RoomError::RoomNotFound)
    ));
    assert_eq!(world.service.list_rooms_by_creator(alice.id).await?.len(), 2);

    Ok(())
}

#[test]
fn test_manager_trait_is_object_safe() {
    fn takes(_: &dyn MembershipManager) {}
    let store = SqlRoomStore::memory().unwrap();
    takes(&roomkeeper_core::core_room::RoomManagerImpl::new(store));
}
