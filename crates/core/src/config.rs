use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Key lookup used while building a [`Config`]. Production reads the process
/// environment; tests pass a map.
type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn lookup_opt(get: Lookup<'_>, key: &str) -> Option<String> {
    get(key).map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Read a profiled key: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_opt(get: Lookup<'_>, profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = lookup_opt(get, &prefixed) {
            return Some(v);
        }
    }
    lookup_opt(get, key)
}

fn profiled_or(get: Lookup<'_>, profile: &str, key: &str, default: &str) -> String {
    profiled_opt(get, profile, key).unwrap_or_else(|| default.to_string())
}

/// Collects every configuration problem so startup can report them together.
#[derive(Default)]
struct Problems(Vec<String>);

impl Problems {
    fn require(&mut self, get: Lookup<'_>, profile: &str, key: &str) -> String {
        match profiled_opt(get, profile, key) {
            Some(v) => v,
            None => {
                self.0.push(format!("missing required setting {key}"));
                String::new()
            }
        }
    }

    fn parse<T: FromStr>(&mut self, get: Lookup<'_>, profile: &str, key: &str, default: T) -> T
    where
        T::Err: fmt::Display,
    {
        match profiled_opt(get, profile, key) {
            None => default,
            Some(raw) => match raw.parse() {
                Ok(v) => v,
                Err(e) => {
                    self.0.push(format!("invalid {key}={raw:?}: {e}"));
                    default
                }
            },
        }
    }
}

// ── Enumerations ──────────────────────────────────────────────

/// Operating mode. `Development` redirects every notification to the
/// error-alerting webhook so non-production runs never post publicly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Production,
    Development,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PRODUCTION" | "PROD" => Ok(Mode::Production),
            "DEVELOPMENT" | "DEV" => Ok(Mode::Development),
            other => Err(format!("unknown mode '{other}' (expected PRODUCTION or DEVELOPMENT)")),
        }
    }
}

/// Known story sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    Mula,
    Oak,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Mula, SourceKind::Oak];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Mula => "mula",
            SourceKind::Oak => "oak",
        }
    }

    /// Suffix used by this source's webhook keys (`WEBHOOK_ID_MULA`, ...).
    pub fn env_suffix(&self) -> String {
        self.as_str().to_ascii_uppercase()
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mula" => Ok(SourceKind::Mula),
            "oak" => Ok(SourceKind::Oak),
            other => Err(format!("unknown source '{other}' (expected mula or oak)")),
        }
    }
}

/// Parse a comma-separated source list, dropping duplicates.
pub fn parse_source_list(raw: &str) -> Result<Vec<SourceKind>, String> {
    let mut out = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind: SourceKind = part.parse()?;
        if !out.contains(&kind) {
            out.push(kind);
        }
    }
    if out.is_empty() {
        return Err("no sources enabled".to_string());
    }
    Ok(out)
}

/// What the scheduler does with ticks that elapsed while a cycle was still
/// running. Cycles of one source never overlap regardless of the policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissedTick {
    /// Drop missed ticks and resume on the original cadence.
    #[default]
    Skip,
    /// Start the next cycle a full interval after the late one began.
    Delay,
    /// Fire missed ticks back-to-back until caught up.
    Burst,
}

impl FromStr for MissedTick {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(MissedTick::Skip),
            "delay" => Ok(MissedTick::Delay),
            "burst" => Ok(MissedTick::Burst),
            other => Err(format!("unknown missed-tick policy '{other}' (expected skip, delay or burst)")),
        }
    }
}

// ── Credentials ───────────────────────────────────────────────

/// Webhook id/token pair. `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookCredentials {
    pub id: String,
    pub token: String,
}

impl WebhookCredentials {
    pub fn new(id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for WebhookCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookCredentials")
            .field("id", &self.id)
            .field("token", &"<redacted>")
            .finish()
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub mode: Mode,
    pub sources: Vec<SourceConfig>,
    /// Error-alerting webhook.
    pub alert_webhook: WebhookCredentials,
    pub webhook_base_url: String,
    pub poll: PollConfig,
    pub storage: StorageConfig,
    pub escalation: EscalationConfig,
    pub http: HttpConfig,
    pub mula: MulaConfig,
    pub oak: OakConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub webhook: WebhookCredentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub interval: Duration,
    pub missed_tick: MissedTick,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub dir: PathBuf,
}

impl StorageConfig {
    /// Dedup snapshot path for one source.
    pub fn dedup_file(&self, source: SourceKind) -> PathBuf {
        self.dir.join(format!("{}_sent_stories.json", source.as_str()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    pub cooldown: Duration,
    /// Minijinja alert layout overriding the built-in one.
    pub template: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulaConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OakConfig {
    pub base_url: String,
    pub stories_url: Option<String>,
    /// Explicit API key; when absent it is discovered from the site bundle.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `STORYWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, PipelineError> {
        let get = |key: &str| env::var(key).ok();
        let profile = lookup_opt(&get, "STORYWATCH_PROFILE").unwrap_or_default();
        Self::load(&profile, &get)
    }

    /// Build config from an explicit key/value map.
    pub fn from_map(profile: &str, vars: &HashMap<String, String>) -> Result<Self, PipelineError> {
        let get = |key: &str| vars.get(key).cloned();
        Self::load(profile, &get)
    }

    fn load(profile: &str, get: Lookup<'_>) -> Result<Self, PipelineError> {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let mut problems = Problems::default();

        let mode = problems.parse(get, p, "MODE", Mode::Production);

        let kinds = match parse_source_list(&profiled_or(get, p, "SOURCES", "mula,oak")) {
            Ok(kinds) => kinds,
            Err(e) => {
                problems.0.push(format!("invalid SOURCES: {e}"));
                Vec::new()
            }
        };

        let alert_webhook = WebhookCredentials::new(
            problems.require(get, p, "WEBHOOK_ID_ERROR"),
            problems.require(get, p, "WEBHOOK_TOKEN_ERROR"),
        );

        let sources = kinds
            .iter()
            .map(|&kind| {
                let suffix = kind.env_suffix();
                SourceConfig {
                    kind,
                    webhook: WebhookCredentials::new(
                        problems.require(get, p, &format!("WEBHOOK_ID_{suffix}")),
                        problems.require(get, p, &format!("WEBHOOK_TOKEN_{suffix}")),
                    ),
                }
            })
            .collect();

        let interval_secs: u64 = problems.parse(get, p, "POLL_INTERVAL_SECS", 60);
        if interval_secs == 0 {
            problems.0.push("POLL_INTERVAL_SECS must be greater than zero".to_string());
        }
        let poll = PollConfig {
            interval: Duration::from_secs(interval_secs.max(1)),
            missed_tick: problems.parse(get, p, "MISSED_TICK", MissedTick::Skip),
        };

        let escalation = EscalationConfig {
            cooldown: Duration::from_secs(problems.parse(get, p, "ESCALATION_COOLDOWN_SECS", 3600)),
            template: profiled_opt(get, p, "ALERT_TEMPLATE"),
        };
        let http = HttpConfig {
            timeout: Duration::from_secs(problems.parse(get, p, "HTTP_TIMEOUT_SECS", 30)),
        };

        let oak = OakConfig {
            base_url: trim_slash(profiled_or(get, p, "OAK_URL", "https://oakthu.com")),
            stories_url: profiled_opt(get, p, "OAK_STORIES_URL"),
            api_key: profiled_opt(get, p, "OAK_API_KEY"),
        };
        if kinds.contains(&SourceKind::Oak) && oak.stories_url.is_none() {
            problems.0.push("missing required setting OAK_STORIES_URL (oak source enabled)".to_string());
        }

        let config = Self {
            profile: p.to_string(),
            mode,
            sources,
            alert_webhook,
            webhook_base_url: trim_slash(profiled_or(get, p, "WEBHOOK_BASE_URL", "https://discord.com")),
            poll,
            storage: StorageConfig {
                dir: PathBuf::from(profiled_or(get, p, "STORAGE_DIR", "storage")),
            },
            escalation,
            http,
            mula: MulaConfig {
                base_url: trim_slash(profiled_or(get, p, "MULA_URL", "https://deshimula.com")),
            },
            oak,
        };

        if problems.0.is_empty() {
            Ok(config)
        } else {
            Err(PipelineError::config(format!(
                "invalid configuration: {}",
                problems.0.join("; ")
            )))
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Webhook that receives a source's notifications, honouring [`Mode`].
    pub fn notification_webhook<'a>(&'a self, source: &'a SourceConfig) -> &'a WebhookCredentials {
        match self.mode {
            Mode::Development => &self.alert_webhook,
            Mode::Production => &source.webhook,
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        let names: Vec<&str> = self.sources.iter().map(|s| s.kind.as_str()).collect();
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  mode:        {:?}", self.mode);
        tracing::info!("  sources:     {}", names.join(", "));
        tracing::info!("  poll:        every {}s, missed ticks: {:?}", self.poll.interval.as_secs(), self.poll.missed_tick);
        tracing::info!("  storage:     dir={}", self.storage.dir.display());
        tracing::info!("  escalation:  cooldown={}s", self.escalation.cooldown.as_secs());
        tracing::info!("  webhooks:    base={}", self.webhook_base_url);
    }
}

fn trim_slash(s: String) -> String {
    s.trim_end_matches('/').to_string()
}
