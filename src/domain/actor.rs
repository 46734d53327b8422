use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Traveler,
    Guide,
    Admin,
}

/// The identity and capability under which an operation is invoked.
///
/// Every mutating engine operation takes an explicit `Actor`; there is no
/// ambient "logged in user" state anywhere in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn traveler(id: Uuid) -> Self {
        Self {
            id,
            role: Role::Traveler,
        }
    }

    pub fn guide(id: Uuid) -> Self {
        Self {
            id,
            role: Role::Guide,
        }
    }

    pub fn admin(id: Uuid) -> Self {
        Self {
            id,
            role: Role::Admin,
        }
    }

    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }
}
