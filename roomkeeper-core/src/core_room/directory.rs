//! Room discovery over a snapshot of the store

use super::error::RoomError;
use super::listing::{ListQuery, RoomPage, RoomSummary};
use super::runtime::RoomRuntime;
use super::storage::SqlRoomStore;
use super::types::RoomId;
use crate::config::ListingConfig;
use crate::metrics::{Timer, LISTING_DURATION_MS};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Occupancy and lock state of one room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
    pub people_num: i64,
    pub need_password: bool,
}

/// Externally visible room flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettingView {
    pub hidden: bool,
    pub need_password: bool,
}

/// Read side of rooms: listing, status checks and settings
#[derive(Clone)]
pub struct RoomDirectory {
    store: SqlRoomStore,
    runtime: Arc<dyn RoomRuntime>,
    config: ListingConfig,
}

impl RoomDirectory {
    pub fn new(store: SqlRoomStore, runtime: Arc<dyn RoomRuntime>, config: ListingConfig) -> Self {
        Self {
            store,
            runtime,
            config,
        }
    }

    pub fn config(&self) -> &ListingConfig {
        &self.config
    }

    /// Summaries of every non-hidden room
    ///
    /// Rooms come from a single read; occupancy is sampled once per room.
    pub fn snapshot(&self) -> Result<Vec<RoomSummary>, RoomError> {
        let rooms = self.store.list_all_with_creator()?;

        Ok(rooms
            .into_iter()
            .filter(|entry| !entry.room.is_hidden())
            .map(|entry| RoomSummary {
                room_id: entry.room.id,
                people_num: self.runtime.client_num(entry.room.id),
                need_password: entry.room.need_password(),
                room_name: entry.room.name,
                creator: entry.creator.username,
                created_at: entry.room.created_at.as_millis(),
            })
            .collect())
    }

    /// Sorted, paginated listing
    pub fn list(&self, query: &ListQuery) -> Result<RoomPage, RoomError> {
        let timer = Timer::new(LISTING_DURATION_MS);
        let page = query.apply(self.snapshot()?);
        timer.stop();

        debug!(
            sort = query.sort.as_str(),
            order = query.order.as_str(),
            page = query.page,
            total = page.total,
            "Listed rooms"
        );
        Ok(page)
    }

    /// Parse raw query values, then list
    ///
    /// Invalid input fails before the store is read.
    pub fn list_raw(
        &self,
        sort: Option<&str>,
        order: Option<&str>,
        page: Option<&str>,
        max: Option<&str>,
    ) -> Result<RoomPage, RoomError> {
        let query = ListQuery::parse(sort, order, page, max, &self.config)?;
        self.list(&query)
    }

    pub fn check(&self, room_id: RoomId) -> Result<RoomStatus, RoomError> {
        let room = self.store.get_by_id(room_id)?;
        Ok(RoomStatus {
            people_num: self.runtime.client_num(room.id),
            need_password: room.need_password(),
        })
    }

    pub fn setting(&self, room_id: RoomId) -> Result<RoomSettingView, RoomError> {
        let room = self.store.get_by_id(room_id)?;
        Ok(RoomSettingView {
            hidden: room.is_hidden(),
            need_password: room.need_password(),
        })
    }
}
