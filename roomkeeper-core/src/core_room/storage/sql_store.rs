//! SQL-based storage for rooms, users and relations
//!
//! This is the only place that looks at raw SQLite errors. Uniqueness,
//! foreign-key and no-row signals are turned into [`RoomError`] variants here;
//! everything else becomes `Internal`.

use super::super::error::RoomError;
use super::super::permission::Permission;
use super::super::room::{
    NewRelation, NewRoom, Room, RoomRole, RoomSetting, RoomUserRelation, RoomWithCreator, User,
};
use super::super::types::{RoomId, Timestamp, UserId};
use crate::config::StoreConfig;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{ffi, params, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::time::Duration;
use tracing::{debug, error};

const ROOM_COLUMNS: &str = "r.id, r.name, r.hashed_password, r.creator_id, r.setting, r.created_at";

/// SQL-based storage for rooms
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct SqlRoomStore {
    pool: Pool<SqliteConnectionManager>,
}

/// Which constraint a failed statement tripped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Constraint {
    Unique,
    ForeignKey,
    Other,
}

fn constraint_of(err: &rusqlite::Error) -> Option<Constraint> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            Some(match e.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    Constraint::Unique
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Constraint::ForeignKey,
                _ => Constraint::Other,
            })
        }
        _ => None,
    }
}

fn storage_error(op: &'static str, err: impl std::fmt::Display) -> RoomError {
    error!(op, error = %err, "Room store failure");
    RoomError::internal(format!("{} failed: {}", op, err))
}

fn decode_error(column: usize, ty: Type, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, ty, msg.into())
}

fn room_from_row(row: &Row<'_>) -> Result<Room, rusqlite::Error> {
    let setting_json: String = row.get(4)?;
    let setting: RoomSetting = serde_json::from_str(&setting_json)
        .map_err(|e| decode_error(4, Type::Text, e.to_string()))?;

    Ok(Room {
        id: RoomId(row.get(0)?),
        name: row.get(1)?,
        hashed_password: row.get(2)?,
        creator_id: UserId(row.get(3)?),
        setting,
        created_at: Timestamp::from_millis(row.get(5)?),
    })
}

/// Reads a user from `offset`, `offset + 1`, `offset + 2`
fn user_from_row(row: &Row<'_>, offset: usize) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: UserId(row.get(offset)?),
        username: row.get(offset + 1)?,
        created_at: Timestamp::from_millis(row.get(offset + 2)?),
    })
}

fn room_with_creator_from_row(row: &Row<'_>) -> Result<RoomWithCreator, rusqlite::Error> {
    Ok(RoomWithCreator {
        room: room_from_row(row)?,
        creator: user_from_row(row, 6)?,
    })
}

fn relation_from_row(row: &Row<'_>) -> Result<RoomUserRelation, rusqlite::Error> {
    let role_str: String = row.get(2)?;
    let role = role_str
        .parse::<RoomRole>()
        .map_err(|e| decode_error(2, Type::Text, e))?;

    Ok(RoomUserRelation {
        room_id: RoomId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        role,
        permissions: mask_from_column(row.get(3)?),
    })
}

fn mask_from_column(raw: i64) -> Permission {
    Permission::from_bits_truncate(u32::try_from(raw).unwrap_or_default())
}

fn mask_to_column(mask: Permission) -> i64 {
    i64::from(mask.bits())
}

fn setting_to_column(setting: &RoomSetting) -> Result<String, RoomError> {
    serde_json::to_string(setting).map_err(|e| storage_error("encode setting", e))
}

impl SqlRoomStore {
    /// Wrap an existing pool and bring its schema up to date
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Result<Self, RoomError> {
        super::migrations::migrate(&pool)?;
        Ok(Self { pool })
    }

    /// Open the database described by `config`
    ///
    /// A path of `:memory:` yields a private in-memory database.
    pub fn open(config: &StoreConfig) -> Result<Self, RoomError> {
        if config.is_memory() {
            return Self::memory();
        }

        let manager = SqliteConnectionManager::file(&config.database_path);
        let pool = build_pool(manager, config.pool_size, config.busy_timeout)?;
        debug!(path = %config.database_path.display(), pool_size = config.pool_size, "Opened room store");
        Self::new(pool)
    }

    /// Create a new in-memory store
    ///
    /// Every in-memory connection is its own database, so the pool holds one.
    pub fn memory() -> Result<Self, RoomError> {
        let manager = SqliteConnectionManager::memory();
        let pool = build_pool(manager, 1, Duration::from_secs(5))?;
        Self::new(pool)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, RoomError> {
        self.pool.get().map_err(|e| storage_error("acquire connection", e))
    }

    // ===== Users =====

    /// Register a user. A taken username is `BadRequest`.
    pub fn create_user(&self, username: &str) -> Result<User, RoomError> {
        let conn = self.conn()?;
        let created_at = Timestamp::now();

        conn.execute(
            "INSERT INTO users (username, created_at) VALUES (?, ?)",
            params![username, created_at.as_millis()],
        )
        .map_err(|e| match constraint_of(&e) {
            Some(Constraint::Unique) => {
                RoomError::bad_request(format!("username already taken: {}", username))
            }
            _ => storage_error("create user", e),
        })?;

        let user = User {
            id: UserId(conn.last_insert_rowid()),
            username: username.to_string(),
            created_at,
        };
        debug!(user_id = %user.id, "Created user");
        Ok(user)
    }

    /// Missing users share the "room or user not found" answer
    pub fn get_user(&self, user_id: UserId) -> Result<User, RoomError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, username, created_at FROM users WHERE id = ?",
            params![user_id.as_i64()],
            |row| user_from_row(row, 0),
        )
        .optional()
        .map_err(|e| storage_error("get user", e))?
        .ok_or(RoomError::RelationNotFound)
    }

    pub fn find_user_by_name(&self, username: &str) -> Result<Option<User>, RoomError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, username, created_at FROM users WHERE username = ?",
            params![username],
            |row| user_from_row(row, 0),
        )
        .optional()
        .map_err(|e| storage_error("find user", e))
    }

    pub fn username_of(&self, user_id: UserId) -> Result<Option<String>, RoomError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT username FROM users WHERE id = ?",
            params![user_id.as_i64()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| storage_error("get username", e))
    }

    // ===== Rooms =====

    /// Persist a room and all of its relations in one transaction
    ///
    /// The write lock is taken up front so two creators racing for the same
    /// name serialize on it; the loser sees the uniqueness violation.
    pub fn create(&self, room: &NewRoom) -> Result<Room, RoomError> {
        let creator_id = room
            .creator_id
            .ok_or_else(|| RoomError::bad_request("room has no creator"))?;
        let setting = setting_to_column(&room.setting)?;

        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| storage_error("begin create room", e))?;

        tx.execute(
            "INSERT INTO rooms (name, hashed_password, creator_id, setting, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                &room.name,
                &room.hashed_password,
                creator_id.as_i64(),
                setting,
                room.created_at.as_millis(),
            ],
        )
        .map_err(|e| match constraint_of(&e) {
            Some(Constraint::Unique) => RoomError::DuplicateRoom(Box::new(room.clone())),
            Some(Constraint::ForeignKey) => {
                RoomError::bad_request(format!("creator does not exist: {}", creator_id))
            }
            _ => storage_error("insert room", e),
        })?;

        let room_id = RoomId(tx.last_insert_rowid());

        for relation in &room.relations {
            tx.execute(
                "INSERT INTO room_user_relations (room_id, user_id, role, permissions)
                 VALUES (?, ?, ?, ?)",
                params![
                    room_id.as_i64(),
                    relation.user_id.as_i64(),
                    relation.role.as_str(),
                    mask_to_column(relation.permissions),
                ],
            )
            .map_err(|e| match constraint_of(&e) {
                Some(Constraint::Unique) => RoomError::bad_request(format!(
                    "conflicting relation for user {}",
                    relation.user_id
                )),
                Some(Constraint::ForeignKey) => {
                    RoomError::bad_request(format!("user does not exist: {}", relation.user_id))
                }
                _ => storage_error("insert relation", e),
            })?;
        }

        tx.commit().map_err(|e| storage_error("commit create room", e))?;

        debug!(room_id = %room_id, relations = room.relations.len(), "Stored room");

        Ok(Room {
            id: room_id,
            name: room.name.clone(),
            hashed_password: room.hashed_password.clone(),
            creator_id,
            setting: room.setting,
            created_at: room.created_at,
        })
    }

    pub fn get_by_id(&self, room_id: RoomId) -> Result<Room, RoomError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM rooms r WHERE r.id = ?", ROOM_COLUMNS),
            params![room_id.as_i64()],
            room_from_row,
        )
        .optional()
        .map_err(|e| storage_error("get room", e))?
        .ok_or(RoomError::RoomNotFound)
    }

    /// Load a room together with its creator through `creator_id`
    pub fn get_by_id_with_creator(&self, room_id: RoomId) -> Result<RoomWithCreator, RoomError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {}, u.id, u.username, u.created_at
                 FROM rooms r JOIN users u ON u.id = r.creator_id
                 WHERE r.id = ?",
                ROOM_COLUMNS
            ),
            params![room_id.as_i64()],
            room_with_creator_from_row,
        )
        .optional()
        .map_err(|e| storage_error("get room with creator", e))?
        .ok_or(RoomError::RoomNotFound)
    }

    pub fn update_setting(&self, room_id: RoomId, setting: &RoomSetting) -> Result<(), RoomError> {
        let setting = setting_to_column(setting)?;
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE rooms SET setting = ? WHERE id = ?",
                params![setting, room_id.as_i64()],
            )
            .map_err(|e| storage_error("update setting", e))?;

        if changed == 0 {
            return Err(RoomError::RoomNotFound);
        }
        Ok(())
    }

    pub fn update_hashed_password(&self, room_id: RoomId, hashed: &[u8]) -> Result<(), RoomError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE rooms SET hashed_password = ? WHERE id = ?",
                params![hashed, room_id.as_i64()],
            )
            .map_err(|e| storage_error("update password", e))?;

        if changed == 0 {
            return Err(RoomError::RoomNotFound);
        }
        Ok(())
    }

    /// Hard delete; relations go with the room
    pub fn delete(&self, room_id: RoomId) -> Result<(), RoomError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| storage_error("begin delete room", e))?;

        tx.execute(
            "DELETE FROM room_user_relations WHERE room_id = ?",
            params![room_id.as_i64()],
        )
        .map_err(|e| storage_error("delete relations", e))?;

        let deleted = tx
            .execute("DELETE FROM rooms WHERE id = ?", params![room_id.as_i64()])
            .map_err(|e| storage_error("delete room", e))?;

        if deleted == 0 {
            return Err(RoomError::RoomNotFound);
        }

        tx.commit().map_err(|e| storage_error("commit delete room", e))?;
        debug!(room_id = %room_id, "Deleted room");
        Ok(())
    }

    pub fn exists(&self, room_id: RoomId) -> Result<bool, RoomError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM rooms WHERE id = ?)",
            params![room_id.as_i64()],
            |row| row.get(0),
        )
        .map_err(|e| storage_error("room exists", e))
    }

    pub fn exists_by_name(&self, name: &str) -> Result<bool, RoomError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM rooms WHERE name = ?)",
            params![name],
            |row| row.get(0),
        )
        .map_err(|e| storage_error("room exists by name", e))
    }

    pub fn list_all(&self) -> Result<Vec<Room>, RoomError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM rooms r ORDER BY r.id", ROOM_COLUMNS))
            .map_err(|e| storage_error("list rooms", e))?;

        let rooms = stmt
            .query_map([], room_from_row)
            .map_err(|e| storage_error("list rooms", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| storage_error("list rooms", e))?;

        Ok(rooms)
    }

    /// Every room with its creator, read in a single statement
    pub fn list_all_with_creator(&self) -> Result<Vec<RoomWithCreator>, RoomError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {}, u.id, u.username, u.created_at
                 FROM rooms r JOIN users u ON u.id = r.creator_id
                 ORDER BY r.id",
                ROOM_COLUMNS
            ))
            .map_err(|e| storage_error("list rooms with creator", e))?;

        let rooms = stmt
            .query_map([], room_with_creator_from_row)
            .map_err(|e| storage_error("list rooms with creator", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| storage_error("list rooms with creator", e))?;

        Ok(rooms)
    }

    pub fn list_by_creator(&self, creator_id: UserId) -> Result<Vec<Room>, RoomError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM rooms r WHERE r.creator_id = ? ORDER BY r.id",
                ROOM_COLUMNS
            ))
            .map_err(|e| storage_error("list rooms by creator", e))?;

        let rooms = stmt
            .query_map(params![creator_id.as_i64()], room_from_row)
            .map_err(|e| storage_error("list rooms by creator", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| storage_error("list rooms by creator", e))?;

        Ok(rooms)
    }

    // ===== Relations =====

    pub fn add_relation(
        &self,
        room_id: RoomId,
        relation: &NewRelation,
    ) -> Result<RoomUserRelation, RoomError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO room_user_relations (room_id, user_id, role, permissions)
             VALUES (?, ?, ?, ?)",
            params![
                room_id.as_i64(),
                relation.user_id.as_i64(),
                relation.role.as_str(),
                mask_to_column(relation.permissions),
            ],
        )
        .map_err(|e| match constraint_of(&e) {
            Some(Constraint::Unique) => RoomError::bad_request(format!(
                "user {} already has a relation to room {}",
                relation.user_id, room_id
            )),
            Some(Constraint::ForeignKey) => RoomError::RelationNotFound,
            _ => storage_error("add relation", e),
        })?;

        Ok(RoomUserRelation {
            room_id,
            user_id: relation.user_id,
            role: relation.role,
            permissions: relation.permissions,
        })
    }

    pub fn get_relation(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<RoomUserRelation, RoomError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT room_id, user_id, role, permissions FROM room_user_relations
             WHERE room_id = ? AND user_id = ?",
            params![room_id.as_i64(), user_id.as_i64()],
            relation_from_row,
        )
        .optional()
        .map_err(|e| storage_error("get relation", e))?
        .ok_or(RoomError::RelationNotFound)
    }

    pub fn list_relations(&self, room_id: RoomId) -> Result<Vec<RoomUserRelation>, RoomError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT room_id, user_id, role, permissions FROM room_user_relations
                 WHERE room_id = ? ORDER BY user_id",
            )
            .map_err(|e| storage_error("list relations", e))?;

        let relations = stmt
            .query_map(params![room_id.as_i64()], relation_from_row)
            .map_err(|e| storage_error("list relations", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| storage_error("list relations", e))?;

        Ok(relations)
    }

    /// Insert a relation or replace role and mask of an existing one
    ///
    /// A Creator relation is never overwritten; that case reports `BadRequest`.
    pub fn update_role(
        &self,
        room_id: RoomId,
        user_id: UserId,
        role: RoomRole,
        mask: Permission,
    ) -> Result<RoomUserRelation, RoomError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "INSERT INTO room_user_relations (room_id, user_id, role, permissions)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (room_id, user_id) DO UPDATE
                 SET role = excluded.role, permissions = excluded.permissions
                 WHERE room_user_relations.role <> 'Creator'",
                params![
                    room_id.as_i64(),
                    user_id.as_i64(),
                    role.as_str(),
                    mask_to_column(mask)
                ],
            )
            .map_err(|e| match constraint_of(&e) {
                Some(Constraint::ForeignKey) => RoomError::RelationNotFound,
                Some(Constraint::Unique) => {
                    RoomError::bad_request("room already has a creator")
                }
                _ => storage_error("update role", e),
            })?;

        if changed == 0 {
            return Err(RoomError::bad_request("the creator's role cannot be changed"));
        }

        Ok(RoomUserRelation {
            room_id,
            user_id,
            role,
            permissions: mask,
        })
    }

    /// Remove a non-creator relation
    pub fn remove_relation(&self, room_id: RoomId, user_id: UserId) -> Result<(), RoomError> {
        let conn = self.conn()?;
        let removed = conn
            .execute(
                "DELETE FROM room_user_relations
                 WHERE room_id = ? AND user_id = ? AND role <> 'Creator'",
                params![room_id.as_i64(), user_id.as_i64()],
            )
            .map_err(|e| storage_error("remove relation", e))?;

        if removed > 0 {
            return Ok(());
        }

        let remaining: Option<String> = conn
            .query_row(
                "SELECT role FROM room_user_relations WHERE room_id = ? AND user_id = ?",
                params![room_id.as_i64(), user_id.as_i64()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| storage_error("remove relation", e))?;

        match remaining {
            Some(_) => Err(RoomError::bad_request("the creator cannot be removed")),
            None => Err(RoomError::RelationNotFound),
        }
    }

    pub fn update_permission(
        &self,
        room_id: RoomId,
        user_id: UserId,
        mask: Permission,
    ) -> Result<(), RoomError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE room_user_relations SET permissions = ? WHERE room_id = ? AND user_id = ?",
                params![mask_to_column(mask), room_id.as_i64(), user_id.as_i64()],
            )
            .map_err(|e| storage_error("update permission", e))?;

        if changed == 0 {
            return Err(RoomError::RelationNotFound);
        }
        Ok(())
    }

    pub fn get_permission(&self, room_id: RoomId, user_id: UserId) -> Result<Permission, RoomError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT permissions FROM room_user_relations WHERE room_id = ? AND user_id = ?",
            params![room_id.as_i64(), user_id.as_i64()],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map_err(|e| storage_error("get permission", e))?
        .map(mask_from_column)
        .ok_or(RoomError::RelationNotFound)
    }
}

fn build_pool(
    manager: SqliteConnectionManager,
    max_size: u32,
    busy_timeout: Duration,
) -> Result<Pool<SqliteConnectionManager>, RoomError> {
    let manager = manager.with_init(move |conn| {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(busy_timeout)
    });

    Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(|e| storage_error("create pool", e))
}
