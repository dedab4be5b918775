// Authorization policy for checkpoint actions
// Evaluated on every call; membership may change between requests

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::departments::DepartmentRegistry;
use crate::error::EngineError;
use crate::ids::{DepartmentId, UserId};
use crate::work_orders::Checkpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May act on any checkpoint
    Admin,
    /// May act on checkpoints owned by their own department
    Member,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::Member => f.write_str("member"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "member" | "user" => Ok(Role::Member),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// The user on whose behalf an engine call is made
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActingUser {
    pub id: UserId,
    pub role: Role,
    pub department_id: Option<DepartmentId>,
}

impl ActingUser {
    pub fn member(id: impl Into<UserId>, department_id: impl Into<DepartmentId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Member,
            department_id: Some(department_id.into()),
        }
    }

    pub fn admin(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Admin,
            department_id: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// True if `user` is an administrator or belongs to the checkpoint's owning department
pub fn can_act(user: &ActingUser, checkpoint: &Checkpoint) -> bool {
    user.is_admin() || user.department_id.as_ref() == Some(&checkpoint.owner_dept_id)
}

/// [`can_act`] as a typed result whose error names the required department
pub fn authorize(
    user: &ActingUser,
    checkpoint: &Checkpoint,
    departments: &DepartmentRegistry,
) -> Result<(), EngineError> {
    if can_act(user, checkpoint) {
        Ok(())
    } else {
        Err(EngineError::Forbidden {
            department: departments.display_name(&checkpoint.owner_dept_id),
        })
    }
}
