//! Permission bitmask and role presets
//!
//! Pure data: nothing here touches the store.

use super::room::RoomRole;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Fine-grained room capabilities packed into a fixed-width mask
    ///
    /// Independent of the role; a role only seeds the initial mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Permission: u32 {
        const RENAME_ROOM = 1 << 0;
        const SET_ADMIN = 1 << 1;
        const SET_ROOM_PASSWORD = 1 << 2;
        const SET_ROOM_SETTING = 1 << 3;
        const SET_USER_PERMISSION = 1 << 4;
        const KICK_MEMBER = 1 << 5;
        const ADD_MEDIA = 1 << 6;
        const EDIT_MEDIA = 1 << 7;
        const DELETE_MEDIA = 1 << 8;
        const CHANGE_CURRENT_MEDIA = 1 << 9;
        const CHANGE_PLAYBACK_STATUS = 1 << 10;
        const SEND_CHAT = 1 << 11;
        const DELETE_ROOM = 1 << 12;
    }
}

impl Permission {
    pub const NONE: Permission = Permission::empty();

    /// Every defined capability. Only the Creator preset uses it.
    pub const ALL: Permission = Permission::all();

    /// True when every bit of `bit` is present in `self`
    pub const fn has(self, bit: Permission) -> bool {
        self.contains(bit)
    }

    /// Resolves a capability by name, ignoring case
    ///
    /// `all` names the full mask.
    pub fn parse_name(name: &str) -> Option<Permission> {
        let name = name.trim().to_ascii_uppercase();
        if name == "ALL" {
            return Some(Permission::ALL);
        }
        Permission::from_name(&name)
    }

    /// Parses a comma separated list of names, or a plain integer mask
    pub fn parse_list(input: &str) -> Option<Permission> {
        let input = input.trim();
        if let Ok(bits) = input.parse::<u32>() {
            return Some(Permission::from_bits_truncate(bits));
        }
        input
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .try_fold(Permission::NONE, |acc, name| {
                Permission::parse_name(name).map(|p| acc | p)
            })
    }

    /// Names of the capabilities present in the mask, in bit order
    pub fn names(self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.bits())
    }
}

const MEMBER_PRESET: Permission = Permission::ADD_MEDIA
    .union(Permission::CHANGE_CURRENT_MEDIA)
    .union(Permission::CHANGE_PLAYBACK_STATUS)
    .union(Permission::SEND_CHAT);

const ADMIN_PRESET: Permission = Permission::ALL
    .difference(Permission::DELETE_ROOM)
    .difference(Permission::SET_ADMIN);

/// Initial permissions for each role
pub const ROLE_PRESETS: [(RoomRole, Permission); 3] = [
    (RoomRole::Member, MEMBER_PRESET),
    (RoomRole::Admin, ADMIN_PRESET),
    (RoomRole::Creator, Permission::ALL),
];

pub fn preset_for(role: RoomRole) -> Permission {
    ROLE_PRESETS
        .iter()
        .find(|(r, _)| *r == role)
        .map(|(_, p)| *p)
        .unwrap_or(Permission::NONE)
}
