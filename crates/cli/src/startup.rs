//! Process wiring: configuration, per-source components, schedulers.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use storywatch_connector::{mula, oak, HttpFetcher, MulaSource, OakSource};
use storywatch_core::{Config, PipelineError, SourceConfig, SourceKind};
use storywatch_ingest::{IngestionCycle, ItemProcessor, Scheduler, SourceAdapter};
use storywatch_notify::{
    DiscordWebhook, ErrorEscalator, MessageChannel, NotificationSink, TemplateRenderer,
};
use storywatch_storage::DedupStore;

use crate::cli::CliArgs;

/// Resolve configuration from the process environment plus CLI overrides.
pub fn load_config(args: &CliArgs) -> Result<Config, PipelineError> {
    let mut vars: HashMap<String, String> = std::env::vars().collect();
    let profile = vars.get("STORYWATCH_PROFILE").cloned().unwrap_or_default();
    apply_overrides(&mut vars, &profile, args);
    Config::from_map(&profile, &vars)
}

/// Write flag values over their environment keys. The profiled key is set
/// too so a flag always beats `{PROFILE}_{KEY}`.
fn apply_overrides(vars: &mut HashMap<String, String>, profile: &str, args: &CliArgs) {
    let mut set = |key: &str, value: String| {
        let profile = profile.trim().to_uppercase();
        if !profile.is_empty() {
            vars.insert(format!("{profile}_{key}"), value.clone());
        }
        vars.insert(key.to_string(), value);
    };

    if let Some(dir) = &args.storage_dir {
        set("STORAGE_DIR", dir.display().to_string());
    }
    if let Some(secs) = args.interval_secs {
        set("POLL_INTERVAL_SECS", secs.to_string());
    }
    if let Some(sources) = &args.sources {
        set("SOURCES", sources.clone());
    }
}

/// One scheduler per enabled source, all reporting to one escalator.
pub fn build_schedulers(config: &Config) -> Result<Vec<Scheduler>> {
    let fetcher = HttpFetcher::new(config.http.timeout).context("failed to build HTTP client")?;
    let webhook_client = reqwest::Client::builder()
        .timeout(config.http.timeout)
        .build()
        .context("failed to build webhook client")?;

    let alerts: Arc<dyn MessageChannel> = Arc::new(
        DiscordWebhook::new(
            "alerts",
            &config.webhook_base_url,
            &config.alert_webhook,
            webhook_client.clone(),
        )
        .context("invalid error webhook")?,
    );
    let escalator = Arc::new(build_escalator(config, alerts)?);

    config
        .sources
        .iter()
        .map(|source| build_scheduler(config, source, &fetcher, &webhook_client, escalator.clone()))
        .collect()
}

fn build_escalator(config: &Config, alerts: Arc<dyn MessageChannel>) -> Result<ErrorEscalator> {
    let escalator = ErrorEscalator::new(alerts).with_cooldown(config.escalation.cooldown);
    match &config.escalation.template {
        Some(template) => {
            let renderer =
                TemplateRenderer::with_template(template.clone()).context("invalid ALERT_TEMPLATE")?;
            Ok(escalator.with_renderer(renderer))
        }
        None => Ok(escalator),
    }
}

fn build_scheduler(
    config: &Config,
    source: &SourceConfig,
    fetcher: &HttpFetcher,
    webhook_client: &reqwest::Client,
    escalator: Arc<ErrorEscalator>,
) -> Result<Scheduler> {
    let kind = source.kind;
    let name = kind.as_str();

    let (adapter, color) = match kind {
        SourceKind::Mula => {
            let adapter: Arc<dyn SourceAdapter> =
                Arc::new(MulaSource::new(&config.mula.base_url, fetcher.clone())?);
            (adapter, mula::EMBED_COLOR)
        }
        SourceKind::Oak => {
            let stories_url = config
                .oak
                .stories_url
                .clone()
                .context("OAK_STORIES_URL is required for the oak source")?;
            let adapter: Arc<dyn SourceAdapter> = Arc::new(OakSource::new(
                &config.oak.base_url,
                stories_url,
                config.oak.api_key.clone(),
                fetcher.clone(),
            ));
            (adapter, oak::EMBED_COLOR)
        }
    };

    let path = config.storage.dedup_file(kind);
    let store = Arc::new(
        DedupStore::open(&path)
            .with_context(|| format!("failed to open dedup file {}", path.display()))?,
    );

    let channel = DiscordWebhook::new(
        name,
        &config.webhook_base_url,
        config.notification_webhook(source),
        webhook_client.clone(),
    )
    .with_context(|| format!("invalid notification webhook for {name}"))?;
    let sink = Arc::new(NotificationSink::new(Arc::new(channel), color));

    info!(
        source = name,
        known = store.len(),
        dedup_file = %path.display(),
        "source ready"
    );

    let processor = ItemProcessor::new(adapter, store, sink, escalator);
    Ok(Scheduler::new(IngestionCycle::new(processor), config.poll.interval)
        .with_missed_tick(config.poll.missed_tick))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;
    use std::time::Duration;

    fn base_vars() -> HashMap<String, String> {
        [
            ("SOURCES", "mula"),
            ("WEBHOOK_ID_ERROR", "err-id"),
            ("WEBHOOK_TOKEN_ERROR", "err-token"),
            ("WEBHOOK_ID_MULA", "mula-id"),
            ("WEBHOOK_TOKEN_MULA", "mula-token"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn flags_override_environment() {
        let args = CliArgs::try_parse_from([
            "storywatch",
            "--storage-dir",
            "/tmp/sw",
            "--interval-secs",
            "5",
        ])
        .unwrap();
        let mut vars = base_vars();
        vars.insert("POLL_INTERVAL_SECS".to_string(), "90".to_string());
        apply_overrides(&mut vars, "", &args);

        let config = Config::from_map("", &vars).unwrap();
        assert_eq!(config.poll.interval, Duration::from_secs(5));
        assert_eq!(config.storage.dir, PathBuf::from("/tmp/sw"));
    }

    #[test]
    fn flags_beat_profiled_keys() {
        let args = CliArgs::try_parse_from(["storywatch", "--interval-secs", "7"]).unwrap();
        let mut vars = base_vars();
        vars.insert("PROD_POLL_INTERVAL_SECS".to_string(), "300".to_string());
        apply_overrides(&mut vars, "prod", &args);

        let config = Config::from_map("prod", &vars).unwrap();
        assert_eq!(config.poll.interval, Duration::from_secs(7));
    }

    #[test]
    fn sources_flag_narrows_required_credentials() {
        let args = CliArgs::try_parse_from(["storywatch", "--sources", "mula"]).unwrap();
        let mut vars = base_vars();
        vars.remove("SOURCES");
        apply_overrides(&mut vars, "", &args);

        let config = Config::from_map("", &vars).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].kind, SourceKind::Mula);
    }

    #[tokio::test]
    async fn builds_one_scheduler_per_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut vars = base_vars();
        vars.insert("SOURCES".to_string(), "mula,oak".to_string());
        vars.insert("WEBHOOK_ID_OAK".to_string(), "oak-id".to_string());
        vars.insert("WEBHOOK_TOKEN_OAK".to_string(), "oak-token".to_string());
        vars.insert("OAK_STORIES_URL".to_string(), "https://api.test/stories".to_string());
        vars.insert("STORAGE_DIR".to_string(), dir.path().display().to_string());

        let config = Config::from_map("", &vars).unwrap();
        let schedulers = build_schedulers(&config).unwrap();
        let names: Vec<&str> = schedulers.iter().map(|s| s.cycle().source_name()).collect();
        assert_eq!(names, vec!["mula", "oak"]);
        assert!(Arc::ptr_eq(
            schedulers[0].cycle().processor().escalator(),
            schedulers[1].cycle().processor().escalator()
        ));
    }

    #[test]
    fn invalid_alert_template_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut vars = base_vars();
        vars.insert("STORAGE_DIR".to_string(), dir.path().display().to_string());
        vars.insert("ALERT_TEMPLATE".to_string(), "{% for %}".to_string());

        let config = Config::from_map("", &vars).unwrap();
        let err = build_schedulers(&config).err().unwrap();
        assert!(format!("{err:#}").contains("invalid ALERT_TEMPLATE"));
    }

    #[test]
    fn corrupt_dedup_file_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mula_sent_stories.json"), "{not json").unwrap();
        let mut vars = base_vars();
        vars.insert("STORAGE_DIR".to_string(), dir.path().display().to_string());

        let config = Config::from_map("", &vars).unwrap();
        let err = build_schedulers(&config).err().unwrap();
        assert!(format!("{err:#}").contains("failed to open dedup file"));
    }
}
