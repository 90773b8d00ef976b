//! Cooldown-limited forwarding of pipeline failures to the operator.
//!
//! Every reported error is logged. Identical errors (same rendered message)
//! are forwarded to the alert channel at most once per cooldown window,
//! whichever source reports them. One escalator serves the whole process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use storywatch_core::PipelineError;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::chunking;
use crate::templating::{AlertContext, TemplateRenderer};
use crate::traits::{Message, MessageChannel};

/// Default quiet period per error signature.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60 * 60);

/// Chat content limit of the alert channel.
const MAX_ALERT_CHARS: usize = 2000;
const FENCE_OPEN: &str = "```md\n";
const FENCE_CLOSE: &str = "```";

/// What [`ErrorEscalator::report`] did with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Forwarded to the alert channel.
    Escalated,
    /// Logged only; the same error was forwarded within the cooldown.
    Suppressed,
    /// Forwarding was due but the alert channel failed.
    ForwardFailed,
}

pub struct ErrorEscalator {
    cooldown: Duration,
    last_escalated: Mutex<HashMap<String, Instant>>,
    channel: Arc<dyn MessageChannel>,
    renderer: TemplateRenderer,
}

impl ErrorEscalator {
    pub fn new(channel: Arc<dyn MessageChannel>) -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            last_escalated: Mutex::new(HashMap::new()),
            channel,
            renderer: TemplateRenderer::new(),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_renderer(mut self, renderer: TemplateRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Log `err` (raised by `source`) and forward it unless the same error
    /// was forwarded within the cooldown. Never fails.
    pub async fn report(&self, source: &str, err: &PipelineError) -> Escalation {
        error!(source, kind = %err.kind(), error = %err, "pipeline error");

        let signature = err.to_string();
        if !self.should_escalate(&signature) {
            return Escalation::Suppressed;
        }

        let alert = self.render_alert(source, err);
        match self.channel.send(&Message::Text(alert)).await {
            Ok(()) => Escalation::Escalated,
            Err(e) => {
                warn!(
                    source,
                    channel = %self.channel.channel_name(),
                    error = %e,
                    "failed to forward error alert"
                );
                Escalation::ForwardFailed
            }
        }
    }

    /// Number of signatures currently inside their cooldown window.
    pub fn tracked(&self) -> usize {
        self.lock().len()
    }

    /// Decide, record, and purge under one lock.
    fn should_escalate(&self, signature: &str) -> bool {
        let now = Instant::now();
        let mut last = self.lock();

        let due = last
            .get(signature)
            .map_or(true, |at| now.duration_since(*at) > self.cooldown);
        if due {
            last.insert(signature.to_string(), now);
        }
        last.retain(|_, at| now.duration_since(*at) <= self.cooldown);
        due
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instant>> {
        // The map holds plain timestamps; a poisoned guard is still consistent.
        self.last_escalated
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn render_alert(&self, source: &str, err: &PipelineError) -> String {
        let ctx = AlertContext::from_error(source, err);
        let body = self.renderer.render(&ctx).unwrap_or_else(|e| {
            warn!(error = %e, "alert template failed, sending plain message");
            format!("Error Details:\nType: {}\nMessage: {}", ctx.kind, err)
        });
        let room = MAX_ALERT_CHARS - FENCE_OPEN.len() - FENCE_CLOSE.len();
        format!("{FENCE_OPEN}{}{FENCE_CLOSE}", chunking::truncate(&body, room))
    }
}
