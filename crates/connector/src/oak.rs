//! JSON API story source.
//!
//! The listing endpoint returns full story objects and needs the site's
//! public API key in both the `Apikey` and `Authorization: Bearer` headers.
//! Unless one is configured, the key is read out of the homepage's
//! `/assets/index-*.js` bundle (the `QC="..."` literal), cached, and
//! rediscovered after the API answers 401 or 403.

use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use storywatch_core::{Candidate, PipelineError, Story};
use storywatch_ingest::SourceAdapter;
use storywatch_notify::Header;

use crate::http::{FetchError, HttpFetcher};
use crate::text::{html_to_text, selector};

/// Accent colour of oak notifications.
pub const EMBED_COLOR: u32 = 0x0D9488;

const BUNDLE_SCRIPT: &str = r#"script[src^="/assets/index-"]"#;
const KEY_MARKER: &str = "QC=\"";
const APIKEY: &str = "apikey";

/// One entry of the listing response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OakStory {
    pub id: String,
    pub title: String,
    /// HTML body.
    pub content: String,
    pub company_name: String,
    pub review_type: String,
    pub status: String,
    pub votes_up: i64,
    pub votes_down: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub struct OakSource {
    base_url: String,
    story_prefix: String,
    stories_url: String,
    api_key: Option<String>,
    discovered_key: Mutex<Option<String>>,
    fetcher: HttpFetcher,
}

impl OakSource {
    pub fn new(
        base_url: &str,
        stories_url: impl Into<String>,
        api_key: Option<String>,
        fetcher: HttpFetcher,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            story_prefix: format!("{base_url}/story/"),
            base_url,
            stories_url: stories_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            discovered_key: Mutex::new(None),
            fetcher,
        }
    }

    /// The configured key, else the cached one, else a freshly discovered one.
    async fn key(&self) -> Result<String, PipelineError> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        if let Some(key) = self.cached_key() {
            return Ok(key);
        }

        let key = self.discover_key().await?;
        *self
            .discovered_key
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(key.clone());
        info!(source = "oak", "discovered API key");
        Ok(key)
    }

    fn cached_key(&self) -> Option<String> {
        self.discovered_key
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn forget_key(&self) {
        self.discovered_key
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    async fn discover_key(&self) -> Result<String, PipelineError> {
        let homepage = self
            .fetcher
            .get_text(&self.base_url)
            .await
            .map_err(|e| PipelineError::network("Failed to fetch token", e))?;

        for src in bundle_scripts(&homepage)? {
            let url = format!("{}{}", self.base_url, src);
            match self.fetcher.get_text(&url).await {
                Ok(bundle) => {
                    if let Some(key) = extract_key(&bundle) {
                        return Ok(key);
                    }
                }
                Err(e) => debug!(url = %url, error = %e, "skipping unreadable bundle"),
            }
        }
        Err(PipelineError::scraping_msg("Failed to parse token"))
    }

    fn auth_headers(key: &str) -> Result<HeaderMap, PipelineError> {
        let invalid = |e| PipelineError::scraping("API key is not a valid header value", e);
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(APIKEY),
            HeaderValue::from_str(key).map_err(invalid)?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {key}")).map_err(invalid)?,
        );
        Ok(headers)
    }

    fn story_link(&self, id: &str) -> String {
        format!("{}{}", self.story_prefix, id)
    }
}

/// `src` of every bundle script on the homepage, in page order.
fn bundle_scripts(homepage: &str) -> Result<Vec<String>, PipelineError> {
    let scripts = selector(BUNDLE_SCRIPT)?;
    let document = Html::parse_document(homepage);
    Ok(document
        .select(&scripts)
        .filter_map(|el| el.value().attr("src"))
        .map(str::to_string)
        .collect())
}

fn extract_key(bundle: &str) -> Option<String> {
    let (_, rest) = bundle.split_once(KEY_MARKER)?;
    let (key, _) = rest.split_once('"')?;
    Some(key.to_string()).filter(|k| !k.is_empty())
}

#[async_trait]
impl SourceAdapter for OakSource {
    fn name(&self) -> &str {
        "oak"
    }

    fn reference_prefix(&self) -> &str {
        &self.story_prefix
    }

    async fn list_candidates(&self) -> Result<Vec<Candidate>, PipelineError> {
        let key = self.key().await?;
        let headers = Self::auth_headers(&key)?;

        let stories: Vec<OakStory> = match self.fetcher.get_json(&self.stories_url, headers).await {
            Ok(stories) => stories,
            Err(e @ FetchError::Decode { .. }) => {
                return Err(PipelineError::scraping("Failed to unmarshal stories", e))
            }
            Err(e) => {
                if matches!(e.status(), Some(401 | 403)) && self.api_key.is_none() {
                    warn!(source = "oak", status = ?e.status(), "API key rejected, will rediscover");
                    self.forget_key();
                }
                return Err(PipelineError::network("Failed to fetch stories", e));
            }
        };

        let mut candidates = Vec::with_capacity(stories.len());
        for story in stories {
            if story.id.trim().is_empty() {
                warn!(source = "oak", title = %story.title, "skipping story without id");
                continue;
            }
            let payload = serde_json::to_value(&story)
                .map_err(|e| PipelineError::scraping("Failed to encode story", e))?;
            candidates.push(Candidate::with_payload(self.story_link(&story.id), payload));
        }
        Ok(candidates)
    }

    async fn parse_item(&self, candidate: &Candidate) -> Result<Story, PipelineError> {
        let payload = candidate
            .payload
            .clone()
            .ok_or_else(|| PipelineError::scraping_msg("Missing story payload"))?;
        let raw: OakStory = serde_json::from_value(payload)
            .map_err(|e| PipelineError::scraping("Failed to parse story", e))?;

        let body = html_to_text(&raw.content)?;
        Ok(Story {
            id: self.identifier(candidate),
            title: raw.title,
            author: None,
            company: Some(raw.company_name).filter(|c| !c.trim().is_empty()),
            tag: Some(raw.review_type).filter(|t| !t.trim().is_empty()),
            link: self.story_link(&raw.id),
            body,
        })
    }

    fn header(&self, story: &Story) -> Header {
        let or_missing = |v: &Option<String>| v.clone().unwrap_or_else(|| "N/A".to_string());
        Header::new(story.title.clone())
            .field("Company", or_missing(&story.company))
            .field("Review Type", or_missing(&story.tag))
            .field("Link", story.link.clone())
    }
}
