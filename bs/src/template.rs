//! Message template rendering

use std::path::Path;

use eyre::{Context, Result};
use handlebars::Handlebars;
use serde_json::json;

use crate::domain::Contact;

/// Default template when neither config nor CLI provide one
pub const DEFAULT_TEMPLATE: &str = "Hola {{name}}, este es un mensaje automatizado.";

const TEMPLATE_NAME: &str = "message";

/// A compiled message template with `{{name}}` and `{{phone}}` placeholders
pub struct MessageTemplate {
    registry: Handlebars<'static>,
}

impl MessageTemplate {
    /// Compile a template string; syntax errors surface here, not at send time
    pub fn new(text: &str) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry
            .register_template_string(TEMPLATE_NAME, text)
            .context("Invalid message template")?;
        Ok(Self { registry })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read template file {}", path.display()))?;
        Self::new(text.trim_end())
    }

    pub fn render(&self, contact: &Contact) -> Result<String> {
        self.registry
            .render(
                TEMPLATE_NAME,
                &json!({ "name": contact.name, "phone": contact.display }),
            )
            .context("Failed to render message template")
    }
}
