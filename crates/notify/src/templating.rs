//! Minijinja template rendering for operator alerts.
//!
//! Alerts are rendered from a template string (the built-in
//! [`DEFAULT_ALERT_TEMPLATE`] unless one is supplied), so a fresh
//! [`minijinja::Environment`] is created per render call.

use storywatch_core::PipelineError;

use crate::traits::NotifyError;

/// Default alert layout.
pub const DEFAULT_ALERT_TEMPLATE: &str = "\
Error Details:
Type: {{ kind }}
Source: {{ source }}
Message: {{ message | unfence }}
{%- for cause in causes %}
Cause: {{ cause | unfence }}
{%- endfor %}
Time: {{ now }}";

/// Context data available to alert templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertContext {
    /// Error kind label, e.g. `"DeliveryError"`.
    pub kind: String,
    /// Pipeline the error came from, e.g. `"mula"`.
    pub source: String,
    /// Context message without the cause chain.
    pub message: String,
    /// Underlying causes, outermost first.
    pub causes: Vec<String>,
    /// Current timestamp in RFC 3339 format.
    pub now: String,
}

impl AlertContext {
    pub fn from_error(source: &str, err: &PipelineError) -> Self {
        Self {
            kind: err.kind().as_str().to_string(),
            source: source.to_string(),
            message: err.message().to_string(),
            causes: err.causes(),
            now: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        }
    }
}

/// Renders alert templates using minijinja.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    template: String,
}

impl TemplateRenderer {
    /// Renderer using [`DEFAULT_ALERT_TEMPLATE`].
    pub fn new() -> Self {
        Self {
            template: DEFAULT_ALERT_TEMPLATE.to_string(),
        }
    }

    /// Renderer using a custom template; its syntax is checked up front.
    pub fn with_template(template: impl Into<String>) -> Result<Self, NotifyError> {
        let renderer = Self {
            template: template.into(),
        };
        renderer.validate()?;
        Ok(renderer)
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        // Code fences inside an alert would close the surrounding ```md block.
        env.add_filter("unfence", unfence_filter);
        env
    }

    /// Render the template with `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if rendering fails.
    pub fn render(&self, ctx: &AlertContext) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(&self.template, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    fn validate(&self) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(&self.template)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom filter: neutralise triple backticks.
fn unfence_filter(value: String) -> String {
    value.replace("```", "'''")
}
