//! Room listing: stable multi-key sort, reversal and pagination
//!
//! Everything here works on an owned snapshot of [`RoomSummary`] values and
//! never touches the store.

use super::error::RoomError;
use super::types::RoomId;
use crate::config::ListingConfig;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::iter::Peekable;
use std::str::{Chars, FromStr};

/// One row of the room listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub room_name: String,
    pub people_num: i64,
    pub need_password: bool,
    pub creator: String,
    /// Unix milliseconds
    pub created_at: i64,
}

/// Field a listing is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    PeopleNum,
    Creator,
    CreatedAt,
    RoomName,
    RoomId,
    NeedPassword,
}

impl SortKey {
    pub const ALL: [SortKey; 6] = [
        SortKey::PeopleNum,
        SortKey::Creator,
        SortKey::CreatedAt,
        SortKey::RoomName,
        SortKey::RoomId,
        SortKey::NeedPassword,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::PeopleNum => "peopleNum",
            SortKey::Creator => "creator",
            SortKey::CreatedAt => "createdAt",
            SortKey::RoomName => "roomName",
            SortKey::RoomId => "roomId",
            SortKey::NeedPassword => "needPassword",
        }
    }

    /// Strict-less and equality predicates for this key
    pub fn comparator(&self) -> Comparator {
        match self {
            SortKey::PeopleNum => Comparator {
                less: |a, b| a.people_num < b.people_num,
                equal: |a, b| a.people_num == b.people_num,
            },
            SortKey::Creator => Comparator {
                less: |a, b| natural_less(&a.creator, &b.creator),
                equal: |a, b| a.creator == b.creator,
            },
            SortKey::CreatedAt => Comparator {
                less: |a, b| a.created_at < b.created_at,
                equal: |a, b| a.created_at == b.created_at,
            },
            SortKey::RoomName => Comparator {
                less: |a, b| natural_less(&a.room_name, &b.room_name),
                equal: |a, b| a.room_name == b.room_name,
            },
            SortKey::RoomId => Comparator {
                less: |a, b| a.room_id < b.room_id,
                equal: |a, b| a.room_id == b.room_id,
            },
            // Rooms with a password come first when ascending
            SortKey::NeedPassword => Comparator {
                less: |a, b| a.need_password && !b.need_password,
                equal: |a, b| a.need_password == b.need_password,
            },
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortKey::ALL
            .iter()
            .find(|key| key.as_str() == s)
            .copied()
            .ok_or_else(|| {
                RoomError::bad_request(format!(
                    "sort must be one of peopleNum, creator, createdAt, roomName, roomId, needPassword; got {:?}",
                    s
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(RoomError::bad_request(format!(
                "order must be asc or desc; got {:?}",
                other
            ))),
        }
    }
}

/// Strict-less plus explicit equality for one sort key
#[derive(Clone, Copy)]
pub struct Comparator {
    pub less: fn(&RoomSummary, &RoomSummary) -> bool,
    pub equal: fn(&RoomSummary, &RoomSummary) -> bool,
}

impl Comparator {
    pub fn ordering(&self, a: &RoomSummary, b: &RoomSummary) -> Ordering {
        if (self.equal)(a, b) {
            Ordering::Equal
        } else if (self.less)(a, b) {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }
}

/// Sort `rooms` in place
///
/// Ascending is a stable sort. Descending reverses the ascending result run
/// by run: groups of equal elements swap places, but inside a group the
/// original relative order is kept.
pub fn sort_rooms(rooms: &mut [RoomSummary], key: SortKey, order: SortOrder) {
    let cmp = key.comparator();
    rooms.sort_by(|a, b| cmp.ordering(a, b));

    if order == SortOrder::Desc {
        reverse_runs(rooms, cmp.equal);
    }
}

fn reverse_runs(rooms: &mut [RoomSummary], equal: fn(&RoomSummary, &RoomSummary) -> bool) {
    rooms.reverse();

    // Each run is now backwards; flip it back
    let mut start = 0;
    while start < rooms.len() {
        let mut end = start + 1;
        while end < rooms.len() && equal(&rooms[start], &rooms[end]) {
            end += 1;
        }
        rooms[start..end].reverse();
        start = end;
    }
}

/// 1-based page of `items`; a page past the end is empty
pub fn paginate<T: Clone>(items: &[T], page: usize, max: usize) -> Vec<T> {
    let start = page.saturating_sub(1).saturating_mul(max);
    if start >= items.len() {
        return Vec::new();
    }
    let end = start.saturating_add(max).min(items.len());
    items[start..end].to_vec()
}

/// Natural ordering: runs of ASCII digits compare by numeric value
///
/// Strings that only differ in leading zeros fall back to plain byte order,
/// which keeps this a total order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let ln = take_digits(&mut left);
                let rn = take_digits(&mut right);
                match compare_numeric(&ln, &rn) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            (Some(l), Some(r)) => {
                left.next();
                right.next();
                match l.cmp(&r) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
        }
    }
}

pub fn natural_less(a: &str, b: &str) -> bool {
    natural_cmp(a, b) == Ordering::Less
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

/// Compares digit strings of any length by value
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// A validated listing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub sort: SortKey,
    pub order: SortOrder,
    pub page: usize,
    pub max: usize,
}

impl ListQuery {
    /// Build a query from raw query-string values
    ///
    /// Missing values take the configured defaults. Unknown sort or order
    /// values and non-positive page numbers are `BadRequest`; `max` above the
    /// configured ceiling is clamped.
    pub fn parse(
        sort: Option<&str>,
        order: Option<&str>,
        page: Option<&str>,
        max: Option<&str>,
        config: &ListingConfig,
    ) -> Result<Self, RoomError> {
        let sort: SortKey = sort.unwrap_or(&config.default_sort).parse()?;
        let order: SortOrder = order.unwrap_or(&config.default_order).parse()?;
        let page = match page {
            Some(raw) => parse_positive("page", raw)?,
            None => 1,
        };
        let max = match max {
            Some(raw) => parse_positive("max", raw)?,
            None => config.default_page_size,
        };

        Ok(ListQuery {
            sort,
            order,
            page,
            max: max.min(config.max_page_size),
        })
    }

    /// Sort the snapshot and cut out the requested page
    pub fn apply(&self, mut rooms: Vec<RoomSummary>) -> RoomPage {
        sort_rooms(&mut rooms, self.sort, self.order);
        RoomPage {
            total: rooms.len(),
            list: paginate(&rooms, self.page, self.max),
        }
    }
}

fn parse_positive(field: &str, raw: &str) -> Result<usize, RoomError> {
    match raw.trim().parse::<i64>() {
        Ok(value) if value >= 1 => usize::try_from(value)
            .map_err(|_| RoomError::bad_request(format!("{} is out of range", field))),
        Ok(_) => Err(RoomError::bad_request(format!("{} must be at least 1", field))),
        Err(_) => Err(RoomError::bad_request(format!("{} must be a number", field))),
    }
}

/// One page of a listing plus the size of the whole listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPage {
    pub total: usize,
    pub list: Vec<RoomSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn summary(id: i64, people: i64) -> RoomSummary {
        RoomSummary {
            room_id: RoomId(id),
            room_name: format!("room{}", id),
            people_num: people,
            need_password: false,
            creator: "alice".to_string(),
            created_at: id,
        }
    }

    fn ids(rooms: &[RoomSummary]) -> Vec<i64> {
        rooms.iter().map(|r| r.room_id.as_i64()).collect()
    }

    #[test]
    fn test_people_num_asc_is_stable() {
        let mut rooms = vec![summary(1, 5), summary(2, 5), summary(3, 9)];
        sort_rooms(&mut rooms, SortKey::PeopleNum, SortOrder::Asc);
        assert_eq!(ids(&rooms), vec![1, 2, 3]);
    }

    #[test]
    fn test_people_num_desc_keeps_ties_in_place() {
        let mut rooms = vec![summary(1, 5), summary(2, 5), summary(3, 9)];
        sort_rooms(&mut rooms, SortKey::PeopleNum, SortOrder::Desc);
        assert_eq!(ids(&rooms), vec![3, 1, 2]);
    }

    #[test]
    fn test_need_password_first_ascending() {
        let mut rooms = vec![summary(1, 0), summary(2, 0), summary(3, 0)];
        rooms[1].need_password = true;
        sort_rooms(&mut rooms, SortKey::NeedPassword, SortOrder::Asc);
        assert_eq!(ids(&rooms), vec![2, 1, 3]);

        sort_rooms(&mut rooms, SortKey::NeedPassword, SortOrder::Desc);
        assert_eq!(ids(&rooms), vec![1, 3, 2]);
    }

    #[test]
    fn test_room_name_natural_order() {
        let mut rooms = vec![summary(1, 0), summary(2, 0), summary(3, 0)];
        rooms[0].room_name = "room10".to_string();
        rooms[1].room_name = "room9".to_string();
        rooms[2].room_name = "Room1".to_string();
        sort_rooms(&mut rooms, SortKey::RoomName, SortOrder::Asc);
        assert_eq!(ids(&rooms), vec![3, 2, 1]);
    }

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("a2", "a10"), Ordering::Less);
        assert_eq!(natural_cmp("a10", "a2"), Ordering::Greater);
        assert_eq!(natural_cmp("a", "a1"), Ordering::Less);
        assert_eq!(natural_cmp("x01", "x1"), Ordering::Less);
        assert_eq!(natural_cmp("same", "same"), Ordering::Equal);
        assert_eq!(natural_cmp("99999999999999999999a", "100000000000000000000"), Ordering::Less);
    }

    #[test]
    fn test_unknown_sort_and_order() {
        let config = ListingConfig::default();
        let err = ListQuery::parse(Some("popularity"), None, None, None, &config).unwrap_err();
        assert!(matches!(err, RoomError::BadRequest(_)));
        let err = ListQuery::parse(None, Some("sideways"), None, None, &config).unwrap_err();
        assert!(matches!(err, RoomError::BadRequest(_)));
    }

    #[test]
    fn test_query_defaults_and_clamp() {
        let config = ListingConfig::default();
        let query = ListQuery::parse(None, None, None, None, &config).unwrap();
        assert_eq!(query.sort, SortKey::PeopleNum);
        assert_eq!(query.order, SortOrder::Desc);
        assert_eq!((query.page, query.max), (1, 10));

        let query = ListQuery::parse(None, None, Some("2"), Some("100000"), &config).unwrap();
        assert_eq!(query.max, config.max_page_size);

        for bad in ["0", "-3", "two"] {
            assert!(ListQuery::parse(None, None, Some(bad), None, &config).is_err());
            assert!(ListQuery::parse(None, None, None, Some(bad), &config).is_err());
        }
    }

    #[test]
    fn test_pagination() {
        let items: Vec<i64> = (1..=25).collect();
        assert_eq!(paginate(&items, 1, 10), (1..=10).collect::<Vec<_>>());
        assert_eq!(paginate(&items, 3, 10), (21..=25).collect::<Vec<_>>());
        assert!(paginate(&items, 4, 10).is_empty());
        assert!(paginate(&items, usize::MAX, usize::MAX).is_empty());
    }

    #[test]
    fn test_apply_reports_total() {
        let query = ListQuery {
            sort: SortKey::RoomId,
            order: SortOrder::Asc,
            page: 2,
            max: 2,
        };
        let page = query.apply((1..=5).map(|i| summary(i, 0)).collect());
        assert_eq!(page.total, 5);
        assert_eq!(ids(&page.list), vec![3, 4]);
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let json = serde_json::to_value(summary(1, 2)).unwrap();
        assert_eq!(json["roomId"], 1);
        assert_eq!(json["peopleNum"], 2);
        assert_eq!(json["needPassword"], false);
    }

    fn arb_room() -> impl Strategy<Value = RoomSummary> {
        (0i64..4, "[a-c0-9]{0,4}", any::<bool>(), 0i64..3).prop_map(
            |(people, name, need_password, created_at)| RoomSummary {
                room_id: RoomId(0),
                room_name: name.clone(),
                people_num: people,
                need_password,
                creator: name,
                created_at,
            },
        )
    }

    fn arb_rooms() -> impl Strategy<Value = Vec<RoomSummary>> {
        prop::collection::vec(arb_room(), 0..24).prop_map(|mut rooms| {
            for (i, room) in rooms.iter_mut().enumerate() {
                room.room_id = RoomId(i as i64);
            }
            rooms
        })
    }

    proptest! {
        #[test]
        fn prop_ascending_is_sorted_and_stable(rooms in arb_rooms(), key_idx in 0usize..6) {
            let key = SortKey::ALL[key_idx];
            let cmp = key.comparator();
            let mut sorted = rooms.clone();
            sort_rooms(&mut sorted, key, SortOrder::Asc);

            prop_assert_eq!(sorted.len(), rooms.len());
            for pair in sorted.windows(2) {
                prop_assert!(!(cmp.less)(&pair[1], &pair[0]));
                if (cmp.equal)(&pair[0], &pair[1]) {
                    prop_assert!(pair[0].room_id < pair[1].room_id);
                }
            }
        }

        #[test]
        fn prop_descending_mirrors_runs(rooms in arb_rooms(), key_idx in 0usize..6) {
            let key = SortKey::ALL[key_idx];
            let cmp = key.comparator();
            let mut desc = rooms.clone();
            sort_rooms(&mut desc, key, SortOrder::Desc);

            for pair in desc.windows(2) {
                prop_assert!(!(cmp.less)(&pair[0], &pair[1]));
                if (cmp.equal)(&pair[0], &pair[1]) {
                    prop_assert!(pair[0].room_id < pair[1].room_id);
                }
            }
        }

        #[test]
        fn prop_natural_cmp_is_antisymmetric(a in "[a-c0-9]{0,6}", b in "[a-c0-9]{0,6}") {
            prop_assert_eq!(natural_cmp(&a, &b), natural_cmp(&b, &a).reverse());
            prop_assert_eq!(natural_cmp(&a, &b) == Ordering::Equal, a == b);
        }

        #[test]
        fn prop_pages_partition_listing(len in 0usize..40, max in 1usize..8) {
            let items: Vec<usize> = (0..len).collect();
            let pages = len.div_ceil(max) + 1;
            let joined: Vec<usize> = (1..=pages).flat_map(|p| paginate(&items, p, max)).collect();
            prop_assert_eq!(joined, items);
        }
    }
}
