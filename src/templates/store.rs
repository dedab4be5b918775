use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::types::{validate_template, Template, TemplateError};
use crate::departments::DepartmentRegistry;
use crate::ids::TemplateId;

/// Read access to checkpoint templates at work-order creation time.
///
/// Implementations must hand out independent copies: editing a stored
/// template never reaches work orders that were already created from it.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn get_template(&self, id: &TemplateId) -> Option<Template>;

    async fn list_templates(&self) -> Vec<Template>;
}

/// Template store kept in memory, validated against a department registry on write
#[derive(Debug, Clone)]
pub struct InMemoryTemplateStore {
    departments: Arc<DepartmentRegistry>,
    templates: Arc<RwLock<BTreeMap<TemplateId, Template>>>,
}

impl InMemoryTemplateStore {
    pub fn new(departments: Arc<DepartmentRegistry>) -> Self {
        Self {
            departments,
            templates: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Insert or replace a template after validating it
    pub async fn put_template(&self, template: Template) -> Result<(), TemplateError> {
        validate_template(&template, &self.departments)?;
        debug!(
            template_id = %template.id,
            checkpoints = template.checkpoint_defs.len(),
            "Storing template"
        );
        self.templates.write().await.insert(template.id.clone(), template);
        Ok(())
    }

    pub async fn remove_template(&self, id: &TemplateId) -> Option<Template> {
        self.templates.write().await.remove(id)
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn get_template(&self, id: &TemplateId) -> Option<Template> {
        self.templates.read().await.get(id).cloned()
    }

    async fn list_templates(&self) -> Vec<Template> {
        self.templates.read().await.values().cloned().collect()
    }
}
