//! Property listings as returned by the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Price, PropertyId, UserId};

/// A rental property owned by a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    /// Owning user.
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub price: Price,
    /// Hosted image URLs.
    #[serde(default)]
    pub images: Vec<String>,
    /// Whether the property can currently be booked.
    #[serde(default = "default_availability")]
    pub availability: bool,
    /// Users assigned to clean the property.
    #[serde(default)]
    pub housekeepers: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

const fn default_availability() -> bool {
    true
}
