// Department reference data used for checkpoint ownership checks

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::DepartmentId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
}

impl Department {
    pub fn new(id: impl Into<DepartmentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Static registry of departments, keyed by id.
///
/// Departments are never removed; checkpoints reference them by id only.
#[derive(Debug, Clone, Default)]
pub struct DepartmentRegistry {
    departments: BTreeMap<DepartmentId, Department>,
}

impl DepartmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_departments(departments: impl IntoIterator<Item = Department>) -> Self {
        let mut registry = Self::new();
        for department in departments {
            registry.register(department);
        }
        registry
    }

    /// Register a department, replacing the name of an existing entry
    pub fn register(&mut self, department: Department) {
        self.departments.insert(department.id.clone(), department);
    }

    pub fn get(&self, id: &DepartmentId) -> Option<&Department> {
        self.departments.get(id)
    }

    pub fn contains(&self, id: &DepartmentId) -> bool {
        self.departments.contains_key(id)
    }

    /// Human readable name, falling back to the raw id for unknown departments
    pub fn display_name(&self, id: &DepartmentId) -> String {
        self.get(id)
            .map(|department| department.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn list(&self) -> Vec<&Department> {
        self.departments.values().collect()
    }

    pub fn len(&self) -> usize {
        self.departments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.departments.is_empty()
    }
}
