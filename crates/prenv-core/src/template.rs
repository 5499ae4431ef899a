//! File rendering with tera.
//!
//! Every generated artifact (Kubernetes manifests, ArgoCD applications,
//! user-declared files) goes through [`RenderTemplate`]. Templates use tera
//! syntax, e.g. `{{ pullRequest.number }}`, plus a `b64enc` filter.

use std::collections::HashMap;
use std::path::Path;

use base64::Engine;
use serde::Serialize;
use serde_json::Value;
use tera::{Context, Tera};

use crate::error::{PrenvError, Result};

const TEMP_DIR_PREFIX: &str = "prenvrender";

/// A file to render: its relative path, a template body and the data it sees.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTemplate {
    pub name: String,
    pub body: String,
    pub data: Value,
}

impl RenderTemplate {
    pub fn new<T: Serialize>(name: impl Into<String>, body: impl Into<String>, data: &T) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            body: body.into(),
            data: serde_json::to_value(data)?,
        })
    }

    /// Render the body against `data`.
    pub fn execute(&self) -> Result<String> {
        if self.name.is_empty() {
            return Err(PrenvError::Template(format!(
                "name must not be empty (body: {:.40})",
                self.body
            )));
        }
        if self.body.is_empty() {
            return Err(PrenvError::Template(format!(
                "body must not be empty: {}",
                self.name
            )));
        }
        render_named(&self.name, &self.body, &self.data)
    }
}

fn b64enc(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(
            base64::engine::general_purpose::STANDARD.encode(s.as_bytes()),
        )),
        other => Err(tera::Error::msg(format!(
            "b64enc expects a string, got {other}"
        ))),
    }
}

fn engine() -> Tera {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    tera.register_filter("b64enc", b64enc);
    tera
}

fn render_named<T: Serialize>(name: &str, body: &str, data: &T) -> Result<String> {
    let mut tera = engine();
    tera.add_raw_template(name, body)?;
    let context = Context::from_serialize(data)?;
    Ok(tera.render(name, &context)?)
}

/// Render a single template string.
pub fn render_str<T: Serialize>(template: &str, data: &T) -> Result<String> {
    render_named("__inline", template, data)
}

/// Render each template into `dir`, creating parent directories as needed.
/// Returns the written paths relative to `dir`, in input order.
pub fn render_to_dir(dir: &Path, templates: &[RenderTemplate]) -> Result<Vec<String>> {
    let mut wrote = Vec::with_capacity(templates.len());
    for t in templates {
        let content = t.execute()?;
        let path = dir.join(&t.name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        wrote.push(t.name.clone());
    }
    Ok(wrote)
}

/// Render into a fresh temporary directory, removed when the guard drops.
pub fn render_to_temp_dir(templates: &[RenderTemplate]) -> Result<tempfile::TempDir> {
    let dir = tempfile::Builder::new().prefix(TEMP_DIR_PREFIX).tempdir()?;
    render_to_dir(dir.path(), templates)?;
    Ok(dir)
}
