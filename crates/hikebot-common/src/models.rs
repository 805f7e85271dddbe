use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Display name used for messages posted by the planner.
pub const BOT_SENDER: &str = "HikeBot";

/// Group description marking a two-person direct-message group.
pub const DM_DESCRIPTION: &str = "DM";

/// Prefix of every direct-message group name.
pub const DM_NAME_PREFIX: &str = "DM:";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub user_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FriendSummary {
    pub id: i64,
    pub username: String,
    pub user_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestItem {
    pub id: i64,
    pub from_user_id: i64,
    pub from_username: String,
    pub from_user_code: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Admin,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }
}

impl FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            _ => Err(format!("Invalid member role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("Invalid message role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

impl GroupSummary {
    /// A direct-message group, marked by its `DM` description.
    pub fn is_dm(&self) -> bool {
        self.description.as_deref() == Some(DM_DESCRIPTION)
    }

    /// Whether the group list should hide this group. Also catches DM rooms
    /// whose description was lost but whose name still carries the prefix.
    pub fn looks_like_dm(&self) -> bool {
        self.is_dm() || self.name.to_uppercase().starts_with(DM_NAME_PREFIX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupMember {
    pub user_id: i64,
    pub username: String,
    pub user_code: String,
    pub role: MemberRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessage {
    pub id: i64,
    pub group_id: String,
    pub sender: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrailSummary {
    pub id: i64,
    pub name: String,
    pub length_km: f64,
}

/// A trail the planner can match against.
///
/// Seeded rows only carry a name and a length. The built-in catalog fills
/// in the rest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrailRecord {
    pub name: String,
    pub location: Option<String>,
    pub length_km: f64,
    pub elevation_gain_m: Option<f64>,
    pub difficulty_rating: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub features: Option<String>,
}

impl TrailRecord {
    pub fn named(name: &str, length_km: f64) -> Self {
        Self {
            name: name.to_string(),
            location: None,
            length_km,
            elevation_gain_m: None,
            difficulty_rating: None,
            latitude: None,
            longitude: None,
            features: None,
        }
    }

    pub fn distance_label(&self) -> String {
        format!("{:.1}km", self.length_km)
    }

    pub fn elevation_label(&self) -> String {
        match self.elevation_gain_m {
            Some(m) => format!("{}m", m.round() as i64),
            None => "N/A".to_string(),
        }
    }
}

/// Trails the planner knows about even before the catalog is seeded.
pub fn builtin_catalog() -> Vec<TrailRecord> {
    vec![
        TrailRecord {
            name: "Mailbox Peak".to_string(),
            location: Some("North Bend, WA".to_string()),
            length_km: 15.1,
            elevation_gain_m: Some(1219.0),
            difficulty_rating: Some(5.0),
            latitude: Some(47.4665),
            longitude: Some(-121.6749),
            features: Some("steep,mailbox_at_top,views".to_string()),
        },
        TrailRecord {
            name: "Rattlesnake Ledge".to_string(),
            location: Some("North Bend, WA".to_string()),
            length_km: 6.4,
            elevation_gain_m: Some(353.0),
            difficulty_rating: Some(2.5),
            latitude: Some(47.4326),
            longitude: Some(-121.7679),
            features: Some("lake_view,crowded,easy".to_string()),
        },
    ]
}
