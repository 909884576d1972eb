pub mod defaults;
pub mod engine;
pub mod rule;


pub use defaults::default_rules;
pub use engine::{Invalidator, InvalidatorStats};
pub use rule::{IdentifierTemplate, InvalidationRule, RuleView, TemplateError};
