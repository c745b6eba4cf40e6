//! Manager traits for room and membership operations

use super::error::RoomError;
use super::permission::Permission;
use super::room::{Room, RoomModifier, RoomRole, RoomSetting, RoomUserRelation, RoomWithCreator, User};
use super::session::TokenIssuer;
use super::types::{RoomId, UserId};
use serde::{Deserialize, Serialize};

/// Result of a successful room entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomTicket {
    pub room_id: RoomId,
    pub token: String,
}

/// Manager for room lifecycle operations
///
/// Mutations past creation assume the caller has already checked the
/// acting user's permission.
pub trait RoomManager {
    /// Register a user
    fn create_user(&self, username: &str) -> Result<User, RoomError>;

    /// Create a room, applying modifiers left to right before storing it
    ///
    /// An empty password leaves the room open.
    fn create_room(
        &self,
        name: &str,
        password: &str,
        modifiers: Vec<RoomModifier>,
    ) -> Result<Room, RoomError>;

    /// Get a room by ID
    fn get_room(&self, room_id: RoomId) -> Result<Room, RoomError>;

    /// Get a room with its creator
    fn get_room_with_creator(&self, room_id: RoomId) -> Result<RoomWithCreator, RoomError>;

    /// Re-hash and store the room password; empty clears it
    fn set_password(&self, room_id: RoomId, password: &str) -> Result<(), RoomError>;

    /// Replace the room flags
    fn change_setting(&self, room_id: RoomId, setting: RoomSetting) -> Result<(), RoomError>;

    /// Hard delete a room and its relations
    fn delete_room(&self, room_id: RoomId) -> Result<(), RoomError>;

    /// Rooms created by a user
    fn list_rooms_by_creator(&self, creator_id: UserId) -> Result<Vec<Room>, RoomError>;
}

/// Manager for membership and access control
pub trait MembershipManager {
    /// Check the room password and return the room
    fn verify_and_enter(
        &self,
        user_id: UserId,
        room_id: RoomId,
        password: &str,
    ) -> Result<Room, RoomError>;

    /// Verify, then issue a session token for the pair
    fn enter_room(
        &self,
        user_id: UserId,
        room_id: RoomId,
        password: &str,
        issuer: &dyn TokenIssuer,
    ) -> Result<RoomTicket, RoomError>;

    /// Create a room owned by `creator_id` and issue the creator's token
    fn create_room_and_enter(
        &self,
        creator_id: UserId,
        name: &str,
        password: &str,
        setting: RoomSetting,
        issuer: &dyn TokenIssuer,
    ) -> Result<RoomTicket, RoomError>;

    /// Give a user a role, resetting permissions to the role preset
    fn grant_role(
        &self,
        room_id: RoomId,
        user_id: UserId,
        role: RoomRole,
    ) -> Result<RoomUserRelation, RoomError>;

    /// Remove a user from a room
    fn revoke_member(&self, room_id: RoomId, user_id: UserId) -> Result<(), RoomError>;

    /// Replace a user's permission mask
    fn change_permission(
        &self,
        room_id: RoomId,
        user_id: UserId,
        mask: Permission,
    ) -> Result<(), RoomError>;

    /// Whether the user holds every bit of `bit` in the room
    fn check_permission(
        &self,
        room_id: RoomId,
        user_id: UserId,
        bit: Permission,
    ) -> Result<bool, RoomError>;

    /// Relations of a room
    fn list_members(&self, room_id: RoomId) -> Result<Vec<RoomUserRelation>, RoomError>;
}
