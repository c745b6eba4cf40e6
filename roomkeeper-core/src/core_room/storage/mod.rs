//! Storage layer for rooms
//!
//! Provides SQL-based persistence for rooms, users and their relations.

pub mod migrations;
pub mod sql_store;

pub use migrations::{migrate, CURRENT_ROOM_SCHEMA_VERSION};
pub use sql_store::SqlRoomStore;
