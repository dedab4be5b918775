// Checkpoint templates: reusable, ordered blueprints for work orders

pub mod store;
pub mod types;

pub use store::{InMemoryTemplateStore, TemplateStore};
pub use types::{validate_template, CheckpointDef, Template, TemplateError};
