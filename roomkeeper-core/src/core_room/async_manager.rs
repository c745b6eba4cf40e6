//! Async facade over the room manager
//!
//! Store calls are blocking SQLite work, so each request runs on tokio's
//! blocking pool. The manager holds no mutable state and is shared through
//! an `Arc` without a lock. A request future that is dropped before its
//! blocking call is spawned never reaches the store.

use super::directory::{RoomDirectory, RoomSettingView, RoomStatus};
use super::error::RoomError;
use super::listing::{ListQuery, RoomPage};
use super::manager::{MembershipManager, RoomManager, RoomTicket};
use super::manager_impl::RoomManagerImpl;
use super::permission::Permission;
use super::room::{Room, RoomModifier, RoomRole, RoomSetting, RoomUserRelation, RoomWithCreator, User};
use super::runtime::RoomRuntime;
use super::session::TokenIssuer;
use super::storage::SqlRoomStore;
use super::types::{RoomId, UserId};
use crate::config::ListingConfig;
use std::sync::Arc;
use tracing::{debug, error};

async fn blocking<S, T, F>(target: &Arc<S>, op: &'static str, f: F) -> Result<T, RoomError>
where
    S: Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T, RoomError> + Send + 'static,
{
    let target = Arc::clone(target);
    tokio::task::spawn_blocking(move || f(target.as_ref()))
        .await
        .map_err(|e| RoomError::internal(format!("{} task failed: {}", op, e)))?
}

/// Async room service
#[derive(Clone)]
pub struct RoomService {
    manager: Arc<RoomManagerImpl>,
    directory: Arc<RoomDirectory>,
    issuer: Arc<dyn TokenIssuer>,
    runtime: Arc<dyn RoomRuntime>,
}

impl RoomService {
    /// Create a new service; the store handle is shared by both sides
    pub fn new(
        store: SqlRoomStore,
        runtime: Arc<dyn RoomRuntime>,
        issuer: Arc<dyn TokenIssuer>,
        listing: ListingConfig,
    ) -> Self {
        Self {
            directory: Arc::new(RoomDirectory::new(store.clone(), Arc::clone(&runtime), listing)),
            manager: Arc::new(RoomManagerImpl::new(store)),
            issuer,
            runtime,
        }
    }

    pub fn directory(&self) -> &RoomDirectory {
        &self.directory
    }

    pub async fn create_user(&self, username: String) -> Result<User, RoomError> {
        blocking(&self.manager, "create_user", move |m| m.create_user(&username)).await
    }

    /// Look a user up by exact username
    pub async fn find_user(&self, username: String) -> Result<Option<User>, RoomError> {
        blocking(&self.manager, "find_user", move |m| {
            m.store().find_user_by_name(&username)
        })
        .await
    }

    pub async fn create_room(
        &self,
        name: String,
        password: String,
        modifiers: Vec<RoomModifier>,
    ) -> Result<Room, RoomError> {
        blocking(&self.manager, "create_room", move |m| {
            m.create_room(&name, &password, modifiers)
        })
        .await
    }

    /// Create a room and hand the creator a session token
    pub async fn create_room_and_enter(
        &self,
        creator_id: UserId,
        name: String,
        password: String,
        setting: RoomSetting,
    ) -> Result<RoomTicket, RoomError> {
        let issuer = Arc::clone(&self.issuer);
        blocking(&self.manager, "create_room_and_enter", move |m| {
            m.create_room_and_enter(creator_id, &name, &password, setting, issuer.as_ref())
        })
        .await
    }

    pub async fn get_room(&self, room_id: RoomId) -> Result<Room, RoomError> {
        blocking(&self.manager, "get_room", move |m| m.get_room(room_id)).await
    }

    pub async fn get_room_with_creator(&self, room_id: RoomId) -> Result<RoomWithCreator, RoomError> {
        blocking(&self.manager, "get_room_with_creator", move |m| {
            m.get_room_with_creator(room_id)
        })
        .await
    }

    pub async fn verify_and_enter(
        &self,
        user_id: UserId,
        room_id: RoomId,
        password: String,
    ) -> Result<Room, RoomError> {
        blocking(&self.manager, "verify_and_enter", move |m| {
            m.verify_and_enter(user_id, room_id, &password)
        })
        .await
    }

    /// Verify the password and issue a session token
    pub async fn enter_room(
        &self,
        user_id: UserId,
        room_id: RoomId,
        password: String,
    ) -> Result<RoomTicket, RoomError> {
        let issuer = Arc::clone(&self.issuer);
        blocking(&self.manager, "enter_room", move |m| {
            m.enter_room(user_id, room_id, &password, issuer.as_ref())
        })
        .await
    }

    pub async fn grant_role(
        &self,
        room_id: RoomId,
        user_id: UserId,
        role: RoomRole,
    ) -> Result<RoomUserRelation, RoomError> {
        blocking(&self.manager, "grant_role", move |m| {
            m.grant_role(room_id, user_id, role)
        })
        .await
    }

    pub async fn revoke_member(&self, room_id: RoomId, user_id: UserId) -> Result<(), RoomError> {
        blocking(&self.manager, "revoke_member", move |m| {
            m.revoke_member(room_id, user_id)
        })
        .await
    }

    pub async fn change_permission(
        &self,
        room_id: RoomId,
        user_id: UserId,
        mask: Permission,
    ) -> Result<(), RoomError> {
        blocking(&self.manager, "change_permission", move |m| {
            m.change_permission(room_id, user_id, mask)
        })
        .await
    }

    pub async fn check_permission(
        &self,
        room_id: RoomId,
        user_id: UserId,
        bit: Permission,
    ) -> Result<bool, RoomError> {
        blocking(&self.manager, "check_permission", move |m| {
            m.check_permission(room_id, user_id, bit)
        })
        .await
    }

    pub async fn list_members(&self, room_id: RoomId) -> Result<Vec<RoomUserRelation>, RoomError> {
        blocking(&self.manager, "list_members", move |m| m.list_members(room_id)).await
    }

    pub async fn set_password(&self, room_id: RoomId, password: String) -> Result<(), RoomError> {
        blocking(&self.manager, "set_password", move |m| {
            m.set_password(room_id, &password)
        })
        .await
    }

    pub async fn change_setting(&self, room_id: RoomId, setting: RoomSetting) -> Result<(), RoomError> {
        blocking(&self.manager, "change_setting", move |m| {
            m.change_setting(room_id, setting)
        })
        .await
    }

    /// Delete a room, then invalidate its tokens and drop its clients
    pub async fn delete_room(&self, room_id: RoomId) -> Result<(), RoomError> {
        let issuer = Arc::clone(&self.issuer);
        let runtime = Arc::clone(&self.runtime);
        blocking(&self.manager, "delete_room", move |m| {
            m.delete_room(room_id)?;
            let revoked = issuer.revoke_room(room_id).map_err(|e| {
                error!(room_id = %room_id, error = %e, "Failed to revoke room tokens");
                RoomError::internal(e.to_string())
            })?;
            runtime.close_room(room_id);
            debug!(room_id = %room_id, revoked, "Room closed");
            Ok(())
        })
        .await
    }

    pub async fn list_rooms_by_creator(&self, creator_id: UserId) -> Result<Vec<Room>, RoomError> {
        blocking(&self.manager, "list_rooms_by_creator", move |m| {
            m.list_rooms_by_creator(creator_id)
        })
        .await
    }

    pub async fn list_rooms(&self, query: ListQuery) -> Result<RoomPage, RoomError> {
        blocking(&self.directory, "list_rooms", move |d| d.list(&query)).await
    }

    pub async fn check_room(&self, room_id: RoomId) -> Result<RoomStatus, RoomError> {
        blocking(&self.directory, "check_room", move |d| d.check(room_id)).await
    }

    pub async fn room_setting(&self, room_id: RoomId) -> Result<RoomSettingView, RoomError> {
        blocking(&self.directory, "room_setting", move |d| d.setting(room_id)).await
    }
}
