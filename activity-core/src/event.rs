use serde::{Deserialize, Serialize};

/// Session id written by producers when the session could not be resolved.
pub const INVALID_SESSION: &str = "invalid_session";

/// Platform written by producers when the platform could not be resolved.
pub const UNKNOWN_PLATFORM: &str = "Unknown";

/// Known platforms.
pub const PLATFORMS: [&str; 3] = ["iOS", "Android", "Web"];

/// Column names of the activity dataset, in file order.
pub const USER_ID: &str = "user_id";
pub const SESSION_ID: &str = "session_id";
pub const PLATFORM: &str = "platform";
pub const ACTIVITY_TIME: &str = "activity_time";
pub const ACTIVITY_TYPE: &str = "activity_type";

pub const EVENT_COLUMNS: [&str; 5] = [USER_ID, SESSION_ID, PLATFORM, ACTIVITY_TIME, ACTIVITY_TYPE];

/// One user activity record.
///
/// Every field may be absent, producers are not trusted. `activity_time` and
/// `activity_type` are never used for ranking, readers leave them empty.
#[derive(Default, Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ActivityEvent {
    pub user_id: Option<String>,

    pub session_id: Option<String>,

    /// `iOS`, `Android`, `Web`, the sentinel `Unknown`, or absent.
    pub platform: Option<String>,

    pub activity_time: Option<String>,

    pub activity_type: Option<String>,
}

impl ActivityEvent {
    /// Create an event with only the columns used for ranking.
    pub fn new(user_id: &str, session_id: &str, platform: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            session_id: Some(session_id.to_string()),
            platform: Some(platform.to_string()),
            activity_time: None,
            activity_type: None,
        }
    }

    /// Drop the columns the ranking does not need.
    pub fn project(mut self) -> Self {
        self.activity_time = None;
        self.activity_type = None;
        self
    }

    /// Replace the platform, used to tag rows with their partition value.
    pub fn with_platform(mut self, platform: &str) -> Self {
        self.platform = Some(platform.to_string());
        self
    }
}

/// One line of a ranking.
///
/// `(platform, user_id)` is unique within one result set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct RankingRow {
    pub platform: String,
    pub user_id: String,
    pub unique_session_count: u64,
}

impl RankingRow {
    pub fn new(platform: &str, user_id: &str, unique_session_count: u64) -> Self {
        Self {
            platform: platform.to_string(),
            user_id: user_id.to_string(),
            unique_session_count,
        }
    }
}
