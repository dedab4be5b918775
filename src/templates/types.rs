use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::departments::DepartmentRegistry;
use crate::ids::{DepartmentId, TemplateId};

/// One stage of a template blueprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointDef {
    pub order: i64,
    pub name: String,
    #[serde(alias = "department")]
    pub owner_dept_id: DepartmentId,
}

impl CheckpointDef {
    pub fn new(order: i64, name: impl Into<String>, owner_dept_id: impl Into<DepartmentId>) -> Self {
        Self {
            order,
            name: name.into(),
            owner_dept_id: owner_dept_id.into(),
        }
    }
}

/// A named, ordered blueprint from which work orders are created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    #[serde(default, alias = "checkpoints")]
    pub checkpoint_defs: Vec<CheckpointDef>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Template '{template}' has no checkpoint definitions")]
    Empty { template: TemplateId },

    #[error("Template '{template}' has a checkpoint with a blank name at order {order}")]
    BlankName { template: TemplateId, order: i64 },

    #[error("Template '{template}' checkpoint '{name}' has order {order}, which does not follow {previous}")]
    OrderNotIncreasing {
        template: TemplateId,
        name: String,
        order: i64,
        previous: i64,
    },

    #[error("Template '{template}' checkpoint '{name}' is owned by unknown department '{department}'")]
    UnknownDepartment {
        template: TemplateId,
        name: String,
        department: DepartmentId,
    },
}

/// Authoring-time checks: at least one definition, non-blank names,
/// strictly increasing orders and known owner departments.
pub fn validate_template(template: &Template, departments: &DepartmentRegistry) -> Result<(), TemplateError> {
    if template.checkpoint_defs.is_empty() {
        return Err(TemplateError::Empty {
            template: template.id.clone(),
        });
    }

    let mut previous: Option<i64> = None;
    for def in &template.checkpoint_defs {
        if def.name.trim().is_empty() {
            return Err(TemplateError::BlankName {
                template: template.id.clone(),
                order: def.order,
            });
        }
        if let Some(previous) = previous {
            if def.order <= previous {
                return Err(TemplateError::OrderNotIncreasing {
                    template: template.id.clone(),
                    name: def.name.clone(),
                    order: def.order,
                    previous,
                });
            }
        }
        if !departments.contains(&def.owner_dept_id) {
            return Err(TemplateError::UnknownDepartment {
                template: template.id.clone(),
                name: def.name.clone(),
                department: def.owner_dept_id.clone(),
            });
        }
        previous = Some(def.order);
    }

    Ok(())
}
