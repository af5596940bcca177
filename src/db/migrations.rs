use rusqlite::Connection;
use tracing::info;

use crate::common::StoreResult;

pub fn run(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS rooms (
            id                          INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            slack_channel_id            TEXT,
            matrix_room_id              TEXT,
            last_slack_timestamp        TEXT,
            last_matrix_stream_token    TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_rooms_slack
            ON rooms(slack_channel_id);

        CREATE TABLE IF NOT EXISTS users (
            id                      INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
            slack_user_id           TEXT,
            slack_access_token      TEXT,
            matrix_user_id          TEXT,
            matrix_access_token     TEXT,
            matrix_homeserver       TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_users_pair
            ON users(slack_user_id, matrix_user_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
