use async_trait::async_trait;

use storywatch_core::{Candidate, ItemId, PipelineError, Story};
use storywatch_notify::Header;

/// Placeholder for a header field the source did not provide.
const MISSING: &str = "N/A";

/// A story source: lists candidate references and parses single stories.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short source name used in logs and alerts (e.g. `"mula"`).
    fn name(&self) -> &str;

    /// Prefix stripped from a candidate reference to form its identifier,
    /// e.g. `https://deshimula.com/story/`.
    fn reference_prefix(&self) -> &str;

    /// Dedup key for `candidate`; computed without fetching anything.
    fn identifier(&self, candidate: &Candidate) -> ItemId {
        ItemId::from_reference(&candidate.reference, self.reference_prefix())
    }

    /// Current listing, most recently published first.
    async fn list_candidates(&self) -> Result<Vec<Candidate>, PipelineError>;

    /// Fetch (if needed) and parse one story.
    async fn parse_item(&self, candidate: &Candidate) -> Result<Story, PipelineError>;

    /// Header announcing `story`.
    fn header(&self, story: &Story) -> Header {
        story_header(story, "Tag")
    }
}

/// Author / Company / `tag_label` / Link header for `story`.
pub fn story_header(story: &Story, tag_label: &str) -> Header {
    let or_missing = |v: &Option<String>| {
        v.as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(MISSING)
            .to_string()
    };

    Header::new(story.title.clone())
        .field("Author", or_missing(&story.author))
        .field("Company", or_missing(&story.company))
        .field(tag_label, or_missing(&story.tag))
        .field("Link", story.link.clone())
}
