// Catalog and script files for the command line front end
// A catalog declares departments, users and templates; a script drives one work order

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::authorization::{ActingUser, Role};
use crate::departments::{Department, DepartmentRegistry};
use crate::ids::{DepartmentId, TemplateId, UserId};
use crate::priority::Priority;
use crate::templates::{InMemoryTemplateStore, Template, TemplateError, TemplateStore};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Department '{0}' is declared more than once")]
    DuplicateDepartment(DepartmentId),

    #[error("User '{0}' is declared more than once")]
    DuplicateUser(UserId),

    #[error("Template '{0}' is declared more than once")]
    DuplicateTemplate(TemplateId),

    #[error("User '{user}' belongs to unknown department '{department}'")]
    UnknownDepartment { user: UserId, department: DepartmentId },

    #[error("Member '{0}' has no department")]
    MissingDepartment(UserId),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

fn default_role() -> Role {
    Role::Member
}

/// A user as written in a catalog file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub id: UserId,
    #[serde(default)]
    pub department: Option<DepartmentId>,
    #[serde(default = "default_role")]
    pub role: Role,
}

impl From<&UserEntry> for ActingUser {
    fn from(entry: &UserEntry) -> Self {
        ActingUser {
            id: entry.id.clone(),
            role: entry.role,
            department_id: entry.department.clone(),
        }
    }
}

/// Raw catalog file layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub departments: Vec<Department>,
    #[serde(default)]
    pub users: Vec<UserEntry>,
    #[serde(default)]
    pub templates: Vec<Template>,
}

/// A validated catalog, ready to back an engine
#[derive(Debug, Clone)]
pub struct Catalog {
    pub departments: Arc<DepartmentRegistry>,
    pub users: BTreeMap<UserId, ActingUser>,
    pub templates: InMemoryTemplateStore,
}

/// Counts printed by `checkpoint-flow validate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogSummary {
    pub departments: usize,
    pub users: usize,
    pub templates: Vec<TemplateSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSummary {
    pub id: TemplateId,
    pub name: String,
    pub checkpoints: usize,
}

impl Catalog {
    pub async fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = read_file(path).await?;
        let catalog = Self::from_toml_str(&raw).await?;
        info!(path = %path.display(), "Catalog loaded");
        Ok(catalog)
    }

    pub async fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(raw)?;
        Self::from_file(file).await
    }

    /// Check cross references and build the registry, user directory and template store
    pub async fn from_file(file: CatalogFile) -> Result<Self, CatalogError> {
        let mut registry = DepartmentRegistry::new();
        for department in file.departments {
            if registry.contains(&department.id) {
                return Err(CatalogError::DuplicateDepartment(department.id));
            }
            registry.register(department);
        }

        let mut users = BTreeMap::new();
        for entry in &file.users {
            match (&entry.department, entry.role) {
                (Some(department), _) if !registry.contains(department) => {
                    return Err(CatalogError::UnknownDepartment {
                        user: entry.id.clone(),
                        department: department.clone(),
                    });
                }
                (None, Role::Member) => return Err(CatalogError::MissingDepartment(entry.id.clone())),
                _ => {}
            }
            if users.insert(entry.id.clone(), ActingUser::from(entry)).is_some() {
                return Err(CatalogError::DuplicateUser(entry.id.clone()));
            }
        }

        let departments = Arc::new(registry);
        let templates = InMemoryTemplateStore::new(departments.clone());
        for template in file.templates {
            if templates.get_template(&template.id).await.is_some() {
                return Err(CatalogError::DuplicateTemplate(template.id));
            }
            templates.put_template(template).await?;
        }

        debug!(
            departments = departments.len(),
            users = users.len(),
            "Catalog validated"
        );
        Ok(Self {
            departments,
            users,
            templates,
        })
    }

    pub fn user(&self, id: &UserId) -> Option<&ActingUser> {
        self.users.get(id)
    }

    pub async fn summary(&self) -> CatalogSummary {
        let templates = self
            .templates
            .list_templates()
            .await
            .into_iter()
            .map(|t| TemplateSummary {
                checkpoints: t.checkpoint_defs.len(),
                id: t.id,
                name: t.name,
            })
            .collect();
        CatalogSummary {
            departments: self.departments.len(),
            users: self.users.len(),
            templates,
        }
    }
}

/// One action in a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub user: UserId,
    /// `order` of the target checkpoint within the work order
    pub checkpoint: i64,
    pub action: String,
}

/// A work order to create and the actions to apply to it, in sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub template: TemplateId,
    pub company: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    pub created_by: UserId,
    #[serde(default)]
    pub steps: Vec<ScriptStep>,
}

impl Script {
    pub async fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = read_file(path).await?;
        Ok(toml::from_str(&raw)?)
    }
}

async fn read_file(path: &Path) -> Result<String, CatalogError> {
    tokio::fs::read_to_string(path).await.map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })
}
