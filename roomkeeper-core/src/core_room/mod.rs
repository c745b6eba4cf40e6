//! Room membership and access control
//!
//! ## Layers
//!
//! - **credential**, **permission**: pure building blocks
//! - **storage**: SQLite persistence; the only place raw database errors are seen
//! - **manager_impl**: room lifecycle, entry verification, roles and permissions
//! - **listing**, **directory**: discovery over a snapshot of the store
//! - **session**, **runtime**: the token issuer and occupancy boundaries
//! - **async_manager**: `RoomService`, the async facade used by callers
//!
//! The store handle is built once and injected; nothing here is global.

pub mod async_manager;
pub mod credential;
pub mod directory;
pub mod error;
pub mod listing;
pub mod manager;
pub mod manager_impl;
pub mod permission;
pub mod room;
pub mod runtime;
pub mod session;
pub mod storage;
pub mod types;

pub use async_manager::RoomService;
pub use directory::{RoomDirectory, RoomSettingView, RoomStatus};
pub use error::{ErrorKind, ErrorPayload, RoomError};
pub use listing::{ListQuery, RoomPage, RoomSummary, SortKey, SortOrder};
pub use manager::{MembershipManager, RoomManager, RoomTicket};
pub use manager_impl::RoomManagerImpl;
pub use permission::{preset_for, Permission};
pub use room::{
    with_creator, with_relations, with_setting, NewRelation, NewRoom, Room, RoomModifier,
    RoomRole, RoomSetting, RoomUserRelation, RoomWithCreator, User,
};
pub use runtime::{ClientRegistry, RoomRuntime};
pub use session::{SessionTokenIssuer, TokenError, TokenIssuer};
pub use storage::SqlRoomStore;
pub use types::{RoomId, Timestamp, UserId};
