/// A persisted room link.
#[derive(Debug, Clone)]
pub struct RoomRow {
    pub id: i64,
    pub slack_channel_id: String,
    pub matrix_room_id: String,
    pub last_slack_timestamp: Option<String>,
}

/// A persisted user link. Credential columns may be absent.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub slack_user_id: String,
    pub slack_access_token: Option<String>,
    pub matrix_user_id: String,
    pub matrix_access_token: Option<String>,
    pub matrix_homeserver: Option<String>,
}

/// Values for a user link insert.
#[derive(Debug, Clone)]
pub struct NewUserRow<'a> {
    pub slack_user_id: &'a str,
    pub slack_access_token: Option<&'a str>,
    pub matrix_user_id: &'a str,
    pub matrix_access_token: &'a str,
    pub matrix_homeserver: &'a str,
}
