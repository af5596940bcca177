use rusqlite::{Connection, OptionalExtension};

use crate::common::StoreResult;
use crate::db::models::{NewUserRow, RoomRow, UserRow};
use crate::db::Database;

impl Database {
    // -- Rooms --

    pub fn rooms(&self) -> StoreResult<Vec<RoomRow>> {
        self.with_conn(query_rooms)
    }

    pub fn find_room(&self, slack_channel_id: &str, matrix_room_id: &str) -> StoreResult<Option<RoomRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, slack_channel_id, matrix_room_id, last_slack_timestamp
                     FROM rooms WHERE slack_channel_id = ?1 AND matrix_room_id = ?2
                     ORDER BY id ASC LIMIT 1",
                    (slack_channel_id, matrix_room_id),
                    room_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Insert a room link and return its row id.
    pub fn insert_room(&self, slack_channel_id: &str, matrix_room_id: &str) -> StoreResult<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rooms (slack_channel_id, matrix_room_id) VALUES (?1, ?2)",
                (slack_channel_id, matrix_room_id),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn update_slack_timestamp(&self, slack_channel_id: &str, ts: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE rooms SET last_slack_timestamp = ?1 WHERE slack_channel_id = ?2",
                (ts, slack_channel_id),
            )?;
            Ok(())
        })
    }

    // -- Users --

    pub fn users(&self) -> StoreResult<Vec<UserRow>> {
        self.with_conn(query_users)
    }

    pub fn count_user_links(&self, slack_user_id: &str, matrix_user_id: &str) -> StoreResult<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(id) FROM users WHERE slack_user_id = ?1 AND matrix_user_id = ?2",
                (slack_user_id, matrix_user_id),
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn insert_user(&self, user: &NewUserRow<'_>) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (slack_user_id, slack_access_token, matrix_user_id, matrix_access_token, matrix_homeserver)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    user.slack_user_id,
                    user.slack_access_token,
                    user.matrix_user_id,
                    user.matrix_access_token,
                    user.matrix_homeserver,
                ],
            )?;
            Ok(())
        })
    }
}

fn query_rooms(conn: &Connection) -> StoreResult<Vec<RoomRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, slack_channel_id, matrix_room_id, last_slack_timestamp
         FROM rooms ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map([], room_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn room_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoomRow> {
    Ok(RoomRow {
        id: row.get(0)?,
        slack_channel_id: row.get(1)?,
        matrix_room_id: row.get(2)?,
        last_slack_timestamp: row.get(3)?,
    })
}

fn query_users(conn: &Connection) -> StoreResult<Vec<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, slack_user_id, slack_access_token, matrix_user_id, matrix_access_token, matrix_homeserver
         FROM users ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                slack_user_id: row.get(1)?,
                slack_access_token: row.get(2)?,
                matrix_user_id: row.get(3)?,
                matrix_access_token: row.get(4)?,
                matrix_homeserver: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.find_room("C1", "!r:x").unwrap().is_none());

        let id = db.insert_room("C1", "!r:x").unwrap();
        db.update_slack_timestamp("C1", "12.5").unwrap();

        let row = db.find_room("C1", "!r:x").unwrap().unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.last_slack_timestamp.as_deref(), Some("12.5"));
        assert_eq!(db.rooms().unwrap().len(), 1);
    }

    #[test]
    fn test_user_with_missing_slack_token() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&NewUserRow {
            slack_user_id: "U1",
            slack_access_token: None,
            matrix_user_id: "@slack_u1:x",
            matrix_access_token: "as",
            matrix_homeserver: "https://x",
        })
        .unwrap();

        assert_eq!(db.count_user_links("U1", "@slack_u1:x").unwrap(), 1);
        assert_eq!(db.count_user_links("U1", "@other:x").unwrap(), 0);

        let users = db.users().unwrap();
        assert_eq!(users.len(), 1);
        assert!(users[0].slack_access_token.is_none());
        assert_eq!(users[0].matrix_homeserver.as_deref(), Some("https://x"));
    }
}
