//! HTML story source.
//!
//! The listing page links every story with `a.text-decoration-none.hyper-link`
//! (site-relative hrefs). A story page carries the title in the first `h3`,
//! the author in `h6.fw-semibold` ("by <name>"), and company then tag in the
//! first two `.badge`s. The body is every `p`, `h3`, `h4` and list that
//! follows the `.d-flex.my-2` marker inside `main .mt-4 .row .col-12`.

use std::collections::HashSet;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use storywatch_core::{Candidate, PipelineError, Story};
use storywatch_ingest::{story_header, SourceAdapter};
use storywatch_notify::Header;

use crate::http::HttpFetcher;
use crate::text::{element_text, push_block, selector};

/// Accent colour of mula notifications.
pub const EMBED_COLOR: u32 = 0xFFDFBA;

const TITLE_PREFIX: &str = "📢  ";

struct Selectors {
    link: Selector,
    title: Selector,
    author: Selector,
    badge: Selector,
    column: Selector,
    marker: Selector,
    list_item: Selector,
}

impl Selectors {
    fn new() -> Result<Self, PipelineError> {
        Ok(Self {
            link: selector("a.text-decoration-none.hyper-link")?,
            title: selector("h3")?,
            author: selector("h6.fw-semibold")?,
            badge: selector(".badge")?,
            column: selector("main .mt-4 .row .col-12")?,
            marker: selector(".d-flex.my-2")?,
            list_item: selector("li")?,
        })
    }
}

pub struct MulaSource {
    base_url: Url,
    story_prefix: String,
    fetcher: HttpFetcher,
    selectors: Selectors,
}

impl MulaSource {
    pub fn new(base_url: &str, fetcher: HttpFetcher) -> Result<Self, PipelineError> {
        let trimmed = base_url.trim_end_matches('/');
        let parsed = Url::parse(trimmed)
            .map_err(|e| PipelineError::config(format!("invalid MULA_URL '{base_url}': {e}")))?;
        Ok(Self {
            base_url: parsed,
            story_prefix: format!("{trimmed}/story/"),
            fetcher,
            selectors: Selectors::new()?,
        })
    }

    /// Absolute story links in page order, duplicates removed.
    fn parse_listing(&self, html: &str) -> Vec<Candidate> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for anchor in document.select(&self.selectors.link) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if !href.starts_with('/') {
                continue;
            }
            match self.base_url.join(href) {
                Ok(url) => {
                    let reference = url.to_string();
                    if seen.insert(reference.clone()) {
                        candidates.push(Candidate::new(reference));
                    }
                }
                Err(e) => debug!(href, error = %e, "skipping unjoinable story link"),
            }
        }
        candidates
    }

    fn parse_story(&self, candidate: &Candidate, html: &str) -> Result<Story, PipelineError> {
        let document = Html::parse_document(html);
        let s = &self.selectors;

        let title = document
            .select(&s.title)
            .next()
            .map(element_text)
            .unwrap_or_default();

        let author_text: String = document.select(&s.author).flat_map(|el| el.text()).collect();
        let author = author_text.trim();
        let author = author.strip_prefix("by ").unwrap_or(author).trim().to_string();

        let mut badges = document.select(&s.badge).map(element_text);
        let company = badges.next().unwrap_or_default();
        let tag = badges.next().unwrap_or_default();
        if company.is_empty() {
            return Err(PipelineError::scraping_msg("Empty company name"));
        }

        let body = self.story_body(&document);
        if body.is_empty() {
            return Err(PipelineError::scraping_msg("Empty story description"));
        }

        Ok(Story {
            id: self.identifier(candidate),
            title,
            author: Some(author).filter(|a| !a.is_empty()),
            company: Some(company),
            tag: Some(tag).filter(|t| !t.is_empty()),
            link: candidate.reference.clone(),
            body,
        })
    }

    fn story_body(&self, document: &Html) -> String {
        let s = &self.selectors;
        let mut out = String::new();

        for column in document.select(&s.column) {
            for marker in column.select(&s.marker) {
                for sibling in marker.next_siblings().filter_map(ElementRef::wrap) {
                    match sibling.value().name() {
                        "p" | "h3" | "h4" => push_block(&mut out, sibling),
                        "ol" | "ul" => {
                            for item in sibling.select(&s.list_item) {
                                push_block(&mut out, item);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        out.trim().to_string()
    }
}

#[async_trait]
impl SourceAdapter for MulaSource {
    fn name(&self) -> &str {
        "mula"
    }

    fn reference_prefix(&self) -> &str {
        &self.story_prefix
    }

    async fn list_candidates(&self) -> Result<Vec<Candidate>, PipelineError> {
        let html = self
            .fetcher
            .get_text(self.base_url.as_str())
            .await
            .map_err(|e| PipelineError::network("Failed to fetch story links", e))?;

        let candidates = self.parse_listing(&html);
        if candidates.is_empty() {
            warn!(source = "mula", "listing page contained no story links");
        }
        Ok(candidates)
    }

    async fn parse_item(&self, candidate: &Candidate) -> Result<Story, PipelineError> {
        let html = self
            .fetcher
            .get_text(&candidate.reference)
            .await
            .map_err(|e| PipelineError::scraping("Failed to fetch story", e))?;
        self.parse_story(candidate, &html)
    }

    fn header(&self, story: &Story) -> Header {
        let mut header = story_header(story, "Tag");
        header.title = format!("{TITLE_PREFIX}{}", story.title);
        header
    }
}
