//! User roles.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Role a user holds on the platform.
///
/// The backend stores the role as a free-form string; values outside the
/// known set deserialize as [`Role::Other`] and keep the raw value, so they
/// serialize back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// Owns properties and invites staff.
    #[default]
    Host,
    /// Manages properties on behalf of a host.
    Manager,
    /// Housekeeping staff assigned to properties.
    Cleaner,
    /// Any role this client does not know about yet.
    Other(String),
}

impl Role {
    /// The role as the backend spells it.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Host => "host",
            Self::Manager => "manager",
            Self::Cleaner => "cleaner",
            Self::Other(raw) => raw,
        }
    }

    fn from_wire(raw: String) -> Self {
        match raw.as_str() {
            "host" => Self::Host,
            "manager" => Self::Manager,
            "cleaner" => Self::Cleaner,
            _ => Self::Other(raw),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from_wire)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses user input. Only the known roles are accepted.
impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(Self::Host),
            "manager" => Ok(Self::Manager),
            "cleaner" => Ok(Self::Cleaner),
            _ => Err(format!("invalid role: {s} (expected host, manager or cleaner)")),
        }
    }
}
