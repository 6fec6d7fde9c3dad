use super::message::{MessageView, UserId};
use serde::Serialize;

/// Profile fields owned by the user service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub username: Option<String>,
    pub avatar_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterpartProfile {
    pub id: UserId,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

impl CounterpartProfile {
    pub fn from_profile(profile: Option<&UserProfile>, id: &UserId, file_base_url: &str) -> Self {
        match profile {
            Some(p) => Self {
                id: p.id.clone(),
                username: p.username.clone(),
                avatar_url: avatar_url(file_base_url, p.avatar_location.as_deref()),
            },
            None => Self {
                id: id.clone(),
                username: None,
                avatar_url: None,
            },
        }
    }
}

/// Latest visible message exchanged with one counterpart.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub counterpart_id: UserId,
    pub user: CounterpartProfile,
    pub last_message: MessageView,
}

pub fn avatar_url(file_base_url: &str, location: Option<&str>) -> Option<String> {
    location
        .filter(|l| !l.is_empty())
        .map(|l| format!("{file_base_url}{l}"))
}
