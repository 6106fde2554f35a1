use crate::domain_model::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One login session/device. Every refresh token descended from the same
/// login carries this id.
#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct FamilyId(pub uuid::Uuid);

impl fmt::Display for FamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for FamilyId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(FamilyId)
    }
}

/// Stored per issued refresh token, keyed by its `jti`.
///
/// Immutable after creation except for `consumed`, which flips at most once.
/// Consumed records are kept until TTL expiry; their presence is what makes
/// replay detectable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRecord {
    pub user_id: UserId,
    pub family_id: FamilyId,
    pub user_agent: String,
    pub consumed: bool,
}

/// Stored per session family, keyed by `family_id`.
///
/// `blocked` is terminal: a blocked family never rotates again, and the
/// record stays queryable until TTL expiry so delayed replays are still
/// rejected rather than read as "unknown".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyRecord {
    pub user_id: UserId,
    pub current_jti: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub blocked: bool,
}

/// What `list_sessions` exposes to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub family_id: FamilyId,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}
