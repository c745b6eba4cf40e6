//! Manager trait implementations with business logic

use super::credential::{hash_password, verify_password};
use super::error::RoomError;
use super::manager::{MembershipManager, RoomManager, RoomTicket};
use super::permission::{preset_for, Permission};
use super::room::{
    with_creator, with_setting, NewRoom, Room, RoomModifier, RoomRole, RoomSetting,
    RoomUserRelation, RoomWithCreator, User,
};
use super::session::TokenIssuer;
use super::storage::SqlRoomStore;
use super::types::{RoomId, UserId};
use crate::metrics::{self as room_metrics, ROOMS_CREATED, ROOMS_DELETED, ROOMS_DUPLICATE, TOKENS_ISSUED};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

const MAX_ROOM_NAME_CHARS: usize = 100;
const MAX_USERNAME_CHARS: usize = 64;

/// Manager implementation over the SQL store
///
/// Holds no state besides the store handle, so it is shared freely.
pub struct RoomManagerImpl {
    store: SqlRoomStore,
}

impl RoomManagerImpl {
    /// Create a new manager with storage
    pub fn new(store: SqlRoomStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SqlRoomStore {
        &self.store
    }

    fn validate_room_name(name: &str) -> Result<(), RoomError> {
        if name.trim().is_empty() {
            return Err(RoomError::bad_request("room name is empty"));
        }
        if name.chars().count() > MAX_ROOM_NAME_CHARS {
            return Err(RoomError::bad_request(format!(
                "room name is longer than {} characters",
                MAX_ROOM_NAME_CHARS
            )));
        }
        Ok(())
    }

    fn validate_username(username: &str) -> Result<(), RoomError> {
        if username.trim().is_empty() {
            return Err(RoomError::bad_request("username is empty"));
        }
        if username.chars().count() > MAX_USERNAME_CHARS {
            return Err(RoomError::bad_request(format!(
                "username is longer than {} characters",
                MAX_USERNAME_CHARS
            )));
        }
        Ok(())
    }

    /// One creator, matching `creator_id`, and no user listed twice
    fn validate_relations(room: &NewRoom) -> Result<(), RoomError> {
        let creator_id = room
            .creator_id
            .ok_or_else(|| RoomError::bad_request("room needs a creator"))?;

        let mut creators = room.relations.iter().filter(|r| r.role == RoomRole::Creator);
        match (creators.next(), creators.next()) {
            (Some(creator), None) if creator.user_id == creator_id => {}
            (_, Some(_)) => return Err(RoomError::bad_request("room has more than one creator")),
            _ => return Err(RoomError::bad_request("creator relation does not match creator")),
        }

        let mut seen = HashSet::new();
        for relation in &room.relations {
            if !seen.insert(relation.user_id) {
                return Err(RoomError::bad_request(format!(
                    "user {} listed more than once",
                    relation.user_id
                )));
            }
        }
        Ok(())
    }
}

impl RoomManager for RoomManagerImpl {
    fn create_user(&self, username: &str) -> Result<User, RoomError> {
        Self::validate_username(username)?;
        let user = self.store.create_user(username)?;
        info!(user_id = %user.id, username = %user.username, "User created");
        Ok(user)
    }

    fn create_room(
        &self,
        name: &str,
        password: &str,
        modifiers: Vec<RoomModifier>,
    ) -> Result<Room, RoomError> {
        Self::validate_room_name(name)?;

        let hashed = hash_password(password)?;
        let draft = NewRoom::new(name.to_string(), hashed).apply(modifiers);
        Self::validate_relations(&draft)?;

        match self.store.create(&draft) {
            Ok(room) => {
                room_metrics::record_counter(ROOMS_CREATED, 1);
                info!(
                    room_id = %room.id,
                    creator_id = %room.creator_id,
                    need_password = room.need_password(),
                    "Room created"
                );
                Ok(room)
            }
            Err(RoomError::DuplicateRoom(unpersisted)) => {
                room_metrics::record_counter(ROOMS_DUPLICATE, 1);
                info!(name = %unpersisted.name, "Room name already taken");
                Err(RoomError::DuplicateRoom(unpersisted))
            }
            Err(e) => Err(e),
        }
    }

    fn get_room(&self, room_id: RoomId) -> Result<Room, RoomError> {
        debug!(room_id = %room_id, "Loading room");
        self.store.get_by_id(room_id)
    }

    fn get_room_with_creator(&self, room_id: RoomId) -> Result<RoomWithCreator, RoomError> {
        self.store.get_by_id_with_creator(room_id)
    }

    fn set_password(&self, room_id: RoomId, password: &str) -> Result<(), RoomError> {
        let hashed = hash_password(password)?;
        self.store.update_hashed_password(room_id, &hashed)?;
        info!(room_id = %room_id, need_password = !hashed.is_empty(), "Room password changed");
        Ok(())
    }

    fn change_setting(&self, room_id: RoomId, setting: RoomSetting) -> Result<(), RoomError> {
        self.store.update_setting(room_id, &setting)?;
        info!(room_id = %room_id, hidden = setting.hidden, "Room setting changed");
        Ok(())
    }

    fn delete_room(&self, room_id: RoomId) -> Result<(), RoomError> {
        self.store.delete(room_id)?;
        room_metrics::record_counter(ROOMS_DELETED, 1);
        info!(room_id = %room_id, "Room deleted");
        Ok(())
    }

    fn list_rooms_by_creator(&self, creator_id: UserId) -> Result<Vec<Room>, RoomError> {
        self.store.list_by_creator(creator_id)
    }
}

impl MembershipManager for RoomManagerImpl {
    fn verify_and_enter(
        &self,
        user_id: UserId,
        room_id: RoomId,
        password: &str,
    ) -> Result<Room, RoomError> {
        let room = match self.store.get_by_id(room_id) {
            Ok(room) => room,
            Err(RoomError::RoomNotFound) => {
                room_metrics::record_entry("not_found");
                debug!(room_id = %room_id, user_id = %user_id, "Entry to missing room");
                return Err(RoomError::RoomNotFound);
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self.store.get_user(user_id) {
            if matches!(e, RoomError::RelationNotFound) {
                room_metrics::record_entry("not_found");
                debug!(room_id = %room_id, user_id = %user_id, "Entry by unknown user");
            }
            return Err(e);
        }

        if room.need_password() && !verify_password(&room.hashed_password, password) {
            room_metrics::record_entry("auth_failed");
            warn!(room_id = %room_id, user_id = %user_id, "Room password rejected");
            return Err(RoomError::AuthFailed);
        }

        room_metrics::record_entry("granted");
        debug!(room_id = %room_id, user_id = %user_id, "Room entry granted");
        Ok(room)
    }

    fn enter_room(
        &self,
        user_id: UserId,
        room_id: RoomId,
        password: &str,
        issuer: &dyn TokenIssuer,
    ) -> Result<RoomTicket, RoomError> {
        let room = self.verify_and_enter(user_id, room_id, password)?;
        let token = issuer.issue(user_id, room.id).map_err(|e| {
            error!(room_id = %room.id, user_id = %user_id, error = %e, "Token issuance failed");
            RoomError::internal(format!("token issuance failed: {}", e))
        })?;

        room_metrics::record_counter(TOKENS_ISSUED, 1);
        Ok(RoomTicket {
            room_id: room.id,
            token,
        })
    }

    fn create_room_and_enter(
        &self,
        creator_id: UserId,
        name: &str,
        password: &str,
        setting: RoomSetting,
        issuer: &dyn TokenIssuer,
    ) -> Result<RoomTicket, RoomError> {
        let room = self.create_room(
            name,
            password,
            vec![with_setting(setting), with_creator(creator_id)],
        )?;

        let token = issuer.issue(creator_id, room.id).map_err(|e| {
            error!(room_id = %room.id, user_id = %creator_id, error = %e, "Token issuance failed");
            RoomError::internal(format!("token issuance failed: {}", e))
        })?;

        room_metrics::record_counter(TOKENS_ISSUED, 1);
        Ok(RoomTicket {
            room_id: room.id,
            token,
        })
    }

    fn grant_role(
        &self,
        room_id: RoomId,
        user_id: UserId,
        role: RoomRole,
    ) -> Result<RoomUserRelation, RoomError> {
        if role == RoomRole::Creator {
            return Err(RoomError::bad_request("the creator role cannot be granted"));
        }

        let relation = self
            .store
            .update_role(room_id, user_id, role, preset_for(role))?;
        info!(room_id = %room_id, user_id = %user_id, role = %role, "Role granted");
        Ok(relation)
    }

    fn revoke_member(&self, room_id: RoomId, user_id: UserId) -> Result<(), RoomError> {
        self.store.remove_relation(room_id, user_id)?;
        info!(room_id = %room_id, user_id = %user_id, "Member revoked");
        Ok(())
    }

    fn change_permission(
        &self,
        room_id: RoomId,
        user_id: UserId,
        mask: Permission,
    ) -> Result<(), RoomError> {
        self.store.update_permission(room_id, user_id, mask)?;
        info!(room_id = %room_id, user_id = %user_id, mask = %mask, "Permissions changed");
        Ok(())
    }

    fn check_permission(
        &self,
        room_id: RoomId,
        user_id: UserId,
        bit: Permission,
    ) -> Result<bool, RoomError> {
        let allowed = self.store.get_permission(room_id, user_id)?.has(bit);
        room_metrics::record_permission_check(allowed);
        debug!(room_id = %room_id, user_id = %user_id, bit = %bit, allowed, "Permission checked");
        Ok(allowed)
    }

    fn list_members(&self, room_id: RoomId) -> Result<Vec<RoomUserRelation>, RoomError> {
        if !self.store.exists(room_id)? {
            return Err(RoomError::RoomNotFound);
        }
        self.store.list_relations(room_id)
    }
}
