//! Permission level enumeration.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Level of access a principal holds on a child's records.
///
/// Partially ordered by privilege: `Edit` includes `View`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "permission_level", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PermissionLevel {
    /// Read-only access to the child and their books.
    View,
    /// Read and write access.
    Edit,
}

impl PermissionLevel {
    /// Every level, weakest first.
    pub const ALL: [PermissionLevel; 2] = [Self::View, Self::Edit];

    /// Whether holding `self` satisfies a check for `required`.
    ///
    /// This is the single place the EDIT-implies-VIEW rule lives.
    pub fn satisfies(self, required: PermissionLevel) -> bool {
        match (self, required) {
            (Self::Edit, _) => true,
            (Self::View, Self::View) => true,
            (Self::View, Self::Edit) => false,
        }
    }

    /// Return the level as its canonical uppercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "VIEW",
            Self::Edit => "EDIT",
        }
    }
}

impl PartialOrd for PermissionLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.satisfies(*other), other.satisfies(*self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (false, false) => None,
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = booktracker_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "VIEW" => Ok(Self::View),
            "EDIT" => Ok(Self::Edit),
            _ => Err(booktracker_core::AppError::validation(format!(
                "Invalid permission level: '{s}'"
            ))),
        }
    }
}
