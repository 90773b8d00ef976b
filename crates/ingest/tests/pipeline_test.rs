//! End-to-end cycle scenarios against an in-memory source and channels.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use storywatch_core::{Candidate, ItemId, PipelineError, Story};
use storywatch_ingest::{IngestionCycle, ItemProcessor, RunState, SourceAdapter};
use storywatch_notify::{ErrorEscalator, Message, MessageChannel, NotificationSink, NotifyError};
use storywatch_storage::DedupStore;

const PREFIX: &str = "https://stories.test/story/";

struct MockSource {
    listing: Mutex<Result<Vec<String>, String>>,
    broken: Mutex<HashSet<String>>,
    parses: AtomicUsize,
}

impl MockSource {
    fn new(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            listing: Mutex::new(Ok(ids.iter().map(|s| s.to_string()).collect())),
            broken: Mutex::new(HashSet::new()),
            parses: AtomicUsize::new(0),
        })
    }

    fn set_listing(&self, ids: &[&str]) {
        *self.listing.lock().unwrap() = Ok(ids.iter().map(|s| s.to_string()).collect());
    }

    fn fail_listing(&self, reason: &str) {
        *self.listing.lock().unwrap() = Err(reason.to_string());
    }

    fn break_story(&self, id: &str) {
        self.broken.lock().unwrap().insert(id.to_string());
    }

    fn fix_story(&self, id: &str) {
        self.broken.lock().unwrap().remove(id);
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn reference_prefix(&self) -> &str {
        PREFIX
    }

    async fn list_candidates(&self) -> Result<Vec<Candidate>, PipelineError> {
        match &*self.listing.lock().unwrap() {
            Ok(ids) => Ok(ids
                .iter()
                .map(|id| Candidate::new(format!("{PREFIX}{id}")))
                .collect()),
            Err(reason) => Err(PipelineError::network(
                "Failed to fetch story links",
                reason.clone(),
            )),
        }
    }

    async fn parse_item(&self, candidate: &Candidate) -> Result<Story, PipelineError> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        let id = self.identifier(candidate);
        if self.broken.lock().unwrap().contains(id.as_str()) {
            return Err(PipelineError::scraping_msg(format!(
                "Empty company name for {id}"
            )));
        }
        Ok(Story {
            title: format!("Story {id}"),
            author: Some("anon".to_string()),
            company: Some("Acme".to_string()),
            tag: Some("Positive".to_string()),
            link: candidate.reference.clone(),
            body: format!("Body of {id}"),
            id,
        })
    }
}

/// Records every message; rejects embeds whose title is in `reject`.
#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<Message>>,
    reject: Mutex<HashSet<String>>,
}

impl RecordingChannel {
    fn titles(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                Message::Embed { title, .. } => Some(title.clone()),
                Message::Text(_) => None,
            })
            .collect()
    }

    fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                Message::Text(t) => Some(t.clone()),
                Message::Embed { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl MessageChannel for RecordingChannel {
    async fn send(&self, message: &Message) -> Result<(), NotifyError> {
        if let Message::Embed { title, .. } = message {
            if self.reject.lock().unwrap().contains(title) {
                return Err(NotifyError::Rejected {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

struct Harness {
    source: Arc<MockSource>,
    stories: Arc<RecordingChannel>,
    alerts: Arc<RecordingChannel>,
    store: Arc<DedupStore>,
    cycle: IngestionCycle,
    dir: TempDir,
}

fn harness(ids: &[&str]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let source = MockSource::new(ids);
    let stories = Arc::new(RecordingChannel::default());
    let alerts = Arc::new(RecordingChannel::default());
    let store =
        Arc::new(DedupStore::open(dir.path().join("storage").join("mock_sent_stories.json")).unwrap());
    let sink = Arc::new(NotificationSink::new(stories.clone(), 0xFFDFBA));
    let escalator = Arc::new(ErrorEscalator::new(alerts.clone()));
    let processor = ItemProcessor::new(source.clone(), store.clone(), sink, escalator);
    Harness {
        source,
        stories,
        alerts,
        store,
        cycle: IngestionCycle::new(processor),
        dir,
    }
}

fn id(s: &str) -> ItemId {
    ItemId::new(s)
}

#[tokio::test]
async fn bootstrap_delivers_only_the_newest() {
    let mut h = harness(&["a", "b", "c"]);

    let report = h.cycle.run().await.unwrap();
    assert_eq!(report.candidates, 3);
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.absorbed, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(h.stories.titles(), vec!["Story a", "Review/Description"]);
    assert!(h.store.has(&id("a")) && h.store.has(&id("b")) && h.store.has(&id("c")));
    assert_eq!(h.cycle.state(), RunState::SteadyState);

    let second = h.cycle.run().await.unwrap();
    assert_eq!(second.delivered, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(h.stories.titles().len(), 2);
}

#[tokio::test]
async fn steady_state_delivers_every_new_story() {
    let mut h = harness(&["a"]);
    h.cycle.run().await.unwrap();

    h.source.set_listing(&["d", "e", "a"]);
    let report = h.cycle.run().await.unwrap();
    assert_eq!(report.dispatched, 3);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.skipped, 1);
    assert!(h.store.has(&id("d")) && h.store.has(&id("e")));

    let titles = h.stories.titles();
    assert!(titles.contains(&"Story d".to_string()));
    assert!(titles.contains(&"Story e".to_string()));
}

#[tokio::test]
async fn parse_failure_leaves_story_unmarked_and_retries_next_cycle() {
    let mut h = harness(&["a"]);
    h.cycle.run().await.unwrap();

    h.source.set_listing(&["x"]);
    h.source.break_story("x");
    let report = h.cycle.run().await.unwrap();
    assert_eq!(report.failed, 1);
    assert!(!h.store.has(&id("x")));
    assert_eq!(h.alerts.texts().len(), 1);
    assert!(h.alerts.texts()[0].contains("Type: ScrapingError"));

    h.source.fix_story("x");
    let retry = h.cycle.run().await.unwrap();
    assert_eq!(retry.delivered, 1);
    assert!(h.store.has(&id("x")));
}

#[tokio::test]
async fn delivery_failure_leaves_story_unmarked() {
    let mut h = harness(&["a"]);
    h.cycle.run().await.unwrap();

    h.stories.reject.lock().unwrap().insert("Story y".to_string());
    h.source.set_listing(&["y"]);
    let report = h.cycle.run().await.unwrap();

    assert_eq!(report.failed, 1);
    assert!(!h.store.has(&id("y")));
    let alerts = h.alerts.texts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains("Type: DeliveryError"));
    assert!(alerts[0].contains("Message: Failed to deliver story\n"));
    assert!(alerts[0].contains("Source: mock\n"));
}

#[tokio::test]
async fn storage_failure_does_not_reverse_delivery() {
    let mut h = harness(&["a"]);
    h.cycle.run().await.unwrap();

    std::fs::remove_dir_all(h.dir.path().join("storage")).unwrap();
    h.source.set_listing(&["z"]);
    let report = h.cycle.run().await.unwrap();

    assert_eq!(report.delivered, 1);
    assert!(h.stories.titles().contains(&"Story z".to_string()));
    assert!(h.store.has(&id("z")));
    let alerts = h.alerts.texts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains("Type: StorageError"));
}

#[tokio::test]
async fn listing_failure_keeps_bootstrap() {
    let mut h = harness(&[]);
    h.source.fail_listing("connection reset");

    let err = h.cycle.run().await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to fetch story links: connection reset");
    assert_eq!(h.cycle.state(), RunState::Bootstrap);

    h.source.set_listing(&["a", "b"]);
    let report = h.cycle.run().await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(report.absorbed, 1);
}

#[tokio::test]
async fn empty_first_listing_ends_bootstrap() {
    let mut h = harness(&[]);
    let report = h.cycle.run().await.unwrap();
    assert_eq!(report.candidates, 0);
    assert_eq!(h.cycle.state(), RunState::SteadyState);

    h.source.set_listing(&["a", "b", "c"]);
    let next = h.cycle.run().await.unwrap();
    assert_eq!(next.delivered, 3);
    assert_eq!(next.absorbed, 0);
}

#[tokio::test]
async fn outage_escalates_once_for_many_stories() {
    let mut h = harness(&["a"]);
    h.cycle.run().await.unwrap();

    for title in ["Story p", "Story q", "Story r"] {
        h.stories.reject.lock().unwrap().insert(title.to_string());
    }
    h.source.set_listing(&["p", "q", "r"]);
    let report = h.cycle.run().await.unwrap();

    assert_eq!(report.failed, 3);
    assert_eq!(h.alerts.texts().len(), 1);
}

#[tokio::test]
async fn storage_outage_escalates_once_for_many_stories() {
    let mut h = harness(&["a"]);
    h.cycle.run().await.unwrap();

    std::fs::remove_dir_all(h.dir.path().join("storage")).unwrap();
    h.source.set_listing(&["s", "t"]);
    let report = h.cycle.run().await.unwrap();

    assert_eq!(report.delivered, 2);
    let alerts = h.alerts.texts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains("Message: Failed to mark story as sent\n"));
}

#[tokio::test]
async fn bootstrap_parse_failure_still_absorbs_backlog() {
    let mut h = harness(&["a", "b", "c"]);
    h.source.break_story("a");

    let report = h.cycle.run().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.absorbed, 2);
    assert!(!h.store.has(&id("a")));
    assert_eq!(h.cycle.state(), RunState::SteadyState);

    h.source.fix_story("a");
    let next = h.cycle.run().await.unwrap();
    assert_eq!(next.delivered, 1);
    assert_eq!(next.skipped, 2);
    assert_eq!(h.source.parses.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn dedup_state_survives_a_restart() {
    let mut h = harness(&["a", "b"]);
    h.cycle.run().await.unwrap();
    let path = h.store.path().to_path_buf();

    let reopened = DedupStore::open(&path).unwrap();
    assert!(reopened.has(&id("a")));
    assert!(reopened.has(&id("b")));
}
