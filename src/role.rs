use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Access level of an authenticated account.
///
/// Ordering is significant: route guards compare with `<` to gate
/// mutations, so variants must stay sorted by privilege.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, ToSchema)]
pub enum Role {
    None,
    Employee,
    Admin,
}

impl Role {
    /// Indicates whether the role may manage reference data
    /// (departments, rooms, files, accounts).
    pub fn can_administrate(self) -> bool {
        self >= Role::Admin
    }
}

impl std::default::Default for Role {
    fn default() -> Self {
        Role::Employee
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::None => write!(f, "none"),
            Role::Employee => write!(f, "employee"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_ordered_by_privilege() {
        assert!(Role::None < Role::Employee);
        assert!(Role::Employee < Role::Admin);
        assert!(Role::Admin.can_administrate());
        assert!(!Role::Employee.can_administrate());
    }
}
