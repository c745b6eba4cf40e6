//! Room data structures and creation modifiers

use super::permission::{preset_for, Permission};
use super::types::{RoomId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A Room as persisted by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Store-assigned surrogate id
    pub id: RoomId,

    /// Human-readable name, unique across the store
    pub name: String,

    /// Opaque credential hash; empty means the room has no password
    #[serde(skip)]
    pub hashed_password: Vec<u8>,

    /// Back-reference to the creating user
    pub creator_id: UserId,

    /// Room flags
    pub setting: RoomSetting,

    /// Set once at creation
    pub created_at: Timestamp,
}

impl Room {
    pub fn need_password(&self) -> bool {
        !self.hashed_password.is_empty()
    }

    pub fn is_hidden(&self) -> bool {
        self.setting.hidden
    }
}

/// Mutable room flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSetting {
    /// Hidden rooms are excluded from discovery
    pub hidden: bool,
}

/// Room-level roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomRole {
    /// Default role for joined users
    Member,
    /// Can manage the room on the creator's behalf
    Admin,
    /// Exactly one per room, seeded with every permission
    Creator,
}

impl RoomRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomRole::Member => "Member",
            RoomRole::Admin => "Admin",
            RoomRole::Creator => "Creator",
        }
    }
}

impl fmt::Display for RoomRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "member" => Ok(RoomRole::Member),
            "admin" => Ok(RoomRole::Admin),
            "creator" => Ok(RoomRole::Creator),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// A relation waiting to be persisted along with its room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRelation {
    pub user_id: UserId,
    pub role: RoomRole,
    pub permissions: Permission,
}

impl NewRelation {
    /// Relation seeded from the role preset
    pub fn with_preset(user_id: UserId, role: RoomRole) -> Self {
        NewRelation {
            user_id,
            role,
            permissions: preset_for(role),
        }
    }
}

/// A user's membership in a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomUserRelation {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: RoomRole,
    pub permissions: Permission,
}

/// A room that has not reached the store yet
///
/// Has no id. Returned inside `DuplicateRoom` when the name is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoom {
    pub name: String,
    pub hashed_password: Vec<u8>,
    pub creator_id: Option<UserId>,
    pub setting: RoomSetting,
    pub relations: Vec<NewRelation>,
    pub created_at: Timestamp,
}

impl NewRoom {
    pub fn new(name: String, hashed_password: Vec<u8>) -> Self {
        NewRoom {
            name,
            hashed_password,
            creator_id: None,
            setting: RoomSetting::default(),
            relations: Vec::new(),
            created_at: Timestamp::now(),
        }
    }

    pub fn need_password(&self) -> bool {
        !self.hashed_password.is_empty()
    }

    /// Applies modifiers in order; later ones see the effects of earlier ones
    pub fn apply(mut self, modifiers: impl IntoIterator<Item = RoomModifier>) -> Self {
        for modifier in modifiers {
            modifier.apply_to(&mut self);
        }
        self
    }

    /// The single Creator relation, if one has been seeded
    pub fn creator_relation(&self) -> Option<&NewRelation> {
        self.relations.iter().find(|r| r.role == RoomRole::Creator)
    }
}

/// Optional adjustments applied to a base room before it is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomModifier {
    /// Replace the room flags
    Setting(RoomSetting),
    /// Set the creator and reset relations to a single Creator relation
    Creator(UserId),
    /// Append extra relations
    Relations(Vec<NewRelation>),
}

impl RoomModifier {
    fn apply_to(self, room: &mut NewRoom) {
        match self {
            RoomModifier::Setting(setting) => room.setting = setting,
            RoomModifier::Creator(user_id) => {
                room.creator_id = Some(user_id);
                room.relations = vec![NewRelation {
                    user_id,
                    role: RoomRole::Creator,
                    permissions: Permission::ALL,
                }];
            }
            RoomModifier::Relations(extra) => room.relations.extend(extra),
        }
    }
}

pub fn with_setting(setting: RoomSetting) -> RoomModifier {
    RoomModifier::Setting(setting)
}

pub fn with_creator(user_id: UserId) -> RoomModifier {
    RoomModifier::Creator(user_id)
}

pub fn with_relations(relations: Vec<NewRelation>) -> RoomModifier {
    RoomModifier::Relations(relations)
}

/// Registered user, only as much as rooms need to refer to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub created_at: Timestamp,
}

/// A room with its creator loaded eagerly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomWithCreator {
    pub room: Room,
    pub creator: User,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creator_modifier_seeds_single_relation() {
        let room = NewRoom::new("lobby".to_string(), Vec::new()).apply([
            with_relations(vec![NewRelation::with_preset(UserId(2), RoomRole::Member)]),
            with_creator(UserId(1)),
        ]);

        assert_eq!(room.creator_id, Some(UserId(1)));
        assert_eq!(room.relations.len(), 1);
        let creator = room.creator_relation().unwrap();
        assert_eq!(creator.user_id, UserId(1));
        assert_eq!(creator.permissions, Permission::ALL);
    }

    #[test]
    fn test_relations_after_creator_are_appended() {
        let room = NewRoom::new("lobby".to_string(), Vec::new()).apply([
            with_creator(UserId(1)),
            with_relations(vec![NewRelation::with_preset(UserId(2), RoomRole::Admin)]),
            with_setting(RoomSetting { hidden: true }),
        ]);

        assert_eq!(room.relations.len(), 2);
        assert_eq!(room.relations[1].role, RoomRole::Admin);
        assert!(room.setting.hidden);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Admin".parse::<RoomRole>().unwrap(), RoomRole::Admin);
        assert_eq!(" member ".parse::<RoomRole>().unwrap(), RoomRole::Member);
        assert!("owner".parse::<RoomRole>().is_err());
    }

    #[test]
    fn test_hashed_password_never_serialized() {
        let room = Room {
            id: RoomId(1),
            name: "lobby".to_string(),
            hashed_password: vec![1, 2, 3],
            creator_id: UserId(1),
            setting: RoomSetting::default(),
            created_at: Timestamp::from_millis(1),
        };
        let json = serde_json::to_value(&room).unwrap();
        assert!(json.get("hashed_password").is_none());
        assert!(room.need_password());
    }

    #[test]
    fn test_setting_defaults_missing_fields() {
        let setting: RoomSetting = serde_json::from_str("{}").unwrap();
        assert!(!setting.hidden);
    }
}
