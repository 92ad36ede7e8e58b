//! Per-cycle orchestration.
//!
//! Sequences discovery, classification, detail fetching, content
//! transformation, rendering, payload building, delivery, and the final
//! state commit. Failures are contained: an item failure skips that
//! item, a (game, category) failure skips that tuple, and only a state
//! persistence failure aborts the cycle.

use std::collections::HashMap;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::delivery::DeliverySink;
use crate::error::Result;
use crate::models::{Config, DetailRecord, FeedItem, FeedKey, Game, Platform};
use crate::pipeline::diff::{ItemStatus, classify};
use crate::pipeline::transform::TransformOutcome;
use crate::pipeline::{embed, render, transform};
use crate::services::SourceAdapter;
use crate::storage::{StateRecord, StateStore};
use crate::utils::epoch_to_utc;

/// Environment-level run restrictions.
#[derive(Debug, Clone, Default)]
pub struct RunFilters {
    /// Process only this game
    pub only_game: Option<Game>,

    /// Drop discovered records older than this epoch timestamp
    pub updated_after: Option<i64>,

    /// Log deliveries and skip the state commit
    pub dry_run: bool,
}

/// Counts reported to the caller after a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// The store was empty at cycle start; nothing was delivered
    pub baseline: bool,
    pub discovered: usize,
    pub new: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Items emitted with fallback content after an unparsable quirk payload
    pub flagged: usize,
    /// (game, category) tuples whose discovery call failed
    pub discovery_failures: usize,
}

impl CycleSummary {
    fn count(&mut self, status: ItemStatus) {
        self.discovered += 1;
        match status {
            ItemStatus::New => self.new += 1,
            ItemStatus::Modified => self.modified += 1,
            ItemStatus::Unchanged => self.unchanged += 1,
        }
    }
}

/// Map adapter output onto the unified item entity.
pub fn normalize(
    platform: Platform,
    game: Game,
    detail: DetailRecord,
    outcome: TransformOutcome,
    effective_ts: i64,
) -> FeedItem {
    let published = if detail.created != 0 {
        detail.created
    } else {
        effective_ts
    };

    FeedItem {
        id: detail.id,
        platform,
        game,
        url: detail.url,
        title: detail.title,
        author: detail.author,
        content: outcome.content,
        category: detail.category,
        published: epoch_to_utc(published),
        updated: (detail.last_modified != 0).then(|| epoch_to_utc(detail.last_modified)),
        image: detail.image,
        summary: detail.summary,
        effective_ts,
        needs_review: outcome.needs_review,
    }
}

/// Run one aggregation cycle.
///
/// Baseline mode (empty store at start) records every discovered item
/// without delivering anything. State is committed once, atomically, at
/// the end; in dry-run mode the commit is skipped.
pub async fn run_cycle(
    config: &Config,
    filters: &RunFilters,
    adapters: &HashMap<Platform, Box<dyn SourceAdapter>>,
    sink: &dyn DeliverySink,
    store: &mut StateStore,
) -> Result<CycleSummary> {
    let baseline = store.is_empty();
    if baseline {
        log::info!("State store is empty; baseline cycle, no deliveries will be sent");
    }

    let mut summary = CycleSummary {
        baseline,
        ..CycleSummary::default()
    };
    let delay = Duration::from_millis(config.runtime.request_delay_ms);
    let pause = Duration::from_millis(config.delivery.pause_ms);
    let concurrency = config.runtime.max_concurrent.max(1);

    for source in &config.feeds.sources {
        if filters.only_game.is_some_and(|game| game != source.game) {
            continue;
        }
        let Some(adapter) = adapters.get(&source.platform) else {
            log::warn!("No adapter registered for {}; skipping", source.platform);
            continue;
        };
        let platform = source.platform;
        let game = source.game;

        // Stage 1: discover and classify, isolating failures per tuple.
        // One post can surface in several categories; fetch it once with
        // the highest effective timestamp seen.
        let mut to_fetch: HashMap<String, i64> = HashMap::new();
        for &category in &source.categories {
            let records = match adapter.discover(game, category).await {
                Ok(records) => records,
                Err(e) => {
                    log::warn!("Discovery failed for {platform}:{game}:{category}: {e}");
                    summary.discovery_failures += 1;
                    continue;
                }
            };

            for record in records {
                if filters
                    .updated_after
                    .is_some_and(|cutoff| record.effective() < cutoff)
                {
                    summary.skipped += 1;
                    continue;
                }

                let key = FeedKey::new(platform, game, record.id.clone());
                let status = classify(&record, store.get(&key));
                summary.count(status);

                if baseline {
                    store.stage(
                        &key,
                        StateRecord {
                            last_modified: record.effective(),
                            last_sent_hash: String::new(),
                        },
                    );
                }
                if status.needs_fetch() {
                    let staged = to_fetch.entry(record.id.clone()).or_insert(0);
                    *staged = (*staged).max(record.effective());
                }
            }

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        // Stage 2: bounded concurrent detail fetch, then transform and
        // normalize as results arrive.
        let mut items: Vec<FeedItem> = Vec::new();
        {
            let mut fetch_stream = stream::iter(to_fetch)
                .map(|(id, effective_ts)| async move {
                    let result = adapter.fetch_detail(game, &id).await;
                    (id, effective_ts, result)
                })
                .buffer_unordered(concurrency);

            while let Some((id, effective_ts, result)) = fetch_stream.next().await {
                match result {
                    Ok(detail) => {
                        let outcome = transform::apply(adapter.content_rules(), &detail);
                        if outcome.needs_review {
                            summary.flagged += 1;
                        }
                        items.push(normalize(platform, game, detail, outcome, effective_ts));
                    }
                    Err(e) => {
                        summary.failed += 1;
                        log::warn!("Detail fetch failed for {platform}:{game}:{id}: {e}");
                    }
                }
            }
        }

        if baseline {
            continue;
        }

        // Stage 3: render, build, deliver. State for an item is staged
        // only after its delivery succeeded.
        for item in items {
            let key = item.key();
            let hash = item.content_hash();
            if store
                .get(&key)
                .is_some_and(|record| record.last_sent_hash == hash)
            {
                summary.skipped += 1;
                continue;
            }

            let rendered = render::html_to_text(&item.content);
            let payload = embed::build(&item, &rendered);
            match sink.deliver(&payload).await {
                Ok(()) => {
                    store.stage(
                        &key,
                        StateRecord {
                            last_modified: item.effective_ts,
                            last_sent_hash: hash,
                        },
                    );
                    summary.delivered += 1;
                }
                Err(e) => {
                    summary.failed += 1;
                    log::warn!("Delivery failed for {key}: {e}");
                }
            }

            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
    }

    if filters.dry_run {
        log::info!(
            "[dry-run] Skipping state commit ({} records in memory)",
            store.len()
        );
    } else {
        store.save().await?;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, RawDiscoveryRecord, SourceEntry};
    use crate::pipeline::embed::EmbedPayload;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct StubAdapter {
        records: Vec<RawDiscoveryRecord>,
        fetch_calls: Arc<AtomicUsize>,
    }

    impl StubAdapter {
        fn new(records: Vec<RawDiscoveryRecord>) -> Self {
            Self {
                records,
                fetch_calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn detail_for(id: &str) -> DetailRecord {
            DetailRecord {
                id: id.to_string(),
                url: format!("https://example.com/{id}"),
                title: format!("Post {id}"),
                author: "Stub".to_string(),
                content: format!("<p>Body of {id}</p>"),
                category: Category::Notices,
                created: 1_000,
                last_modified: 0,
                image: None,
                summary: None,
                structured_content: None,
                video: None,
                native_video: false,
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn platform(&self) -> Platform {
            Platform::Hoyolab
        }

        async fn discover(
            &self,
            _game: Game,
            _category: Category,
        ) -> Result<Vec<RawDiscoveryRecord>> {
            Ok(self.records.clone())
        }

        async fn fetch_detail(&self, _game: Game, raw_id: &str) -> Result<DetailRecord> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::detail_for(raw_id))
        }
    }

    struct RecordingSink {
        delivered: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn titles(&self) -> Vec<String> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeliverySink for RecordingSink {
        async fn deliver(&self, payload: &EmbedPayload) -> Result<()> {
            if self.fail {
                return Err(crate::error::AppError::delivery("sink down"));
            }
            self.delivered.lock().unwrap().push(payload.title.clone());
            Ok(())
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.runtime.request_delay_ms = 0;
        config.delivery.pause_ms = 0;
        config.feeds.sources = vec![SourceEntry {
            platform: Platform::Hoyolab,
            game: Game::Genshin,
            categories: vec![Category::Notices],
        }];
        config
    }

    fn record(id: &str, effective: i64) -> RawDiscoveryRecord {
        RawDiscoveryRecord {
            id: id.to_string(),
            created: effective,
            last_modified: 0,
        }
    }

    fn adapters(stub: StubAdapter) -> HashMap<Platform, Box<dyn SourceAdapter>> {
        let mut map: HashMap<Platform, Box<dyn SourceAdapter>> = HashMap::new();
        map.insert(Platform::Hoyolab, Box::new(stub));
        map
    }

    fn key(id: &str) -> FeedKey {
        FeedKey::new(Platform::Hoyolab, Game::Genshin, id)
    }

    async fn empty_store(dir: &TempDir) -> StateStore {
        StateStore::load(dir.path().join("state.json")).await
    }

    /// A store with one unrelated record, so cycles are not baseline.
    async fn primed_store(dir: &TempDir) -> StateStore {
        let mut store = empty_store(dir).await;
        store.stage(
            &FeedKey::new(Platform::Gryphline, Game::Endfield, "seed"),
            StateRecord {
                last_modified: 1,
                last_sent_hash: "seed".to_string(),
            },
        );
        store
    }

    #[tokio::test]
    async fn baseline_cycle_fetches_but_delivers_nothing() {
        let dir = TempDir::new().unwrap();
        let mut store = empty_store(&dir).await;
        let map = adapters(StubAdapter::new(vec![record("1", 100), record("2", 200)]));
        let sink = RecordingSink::new();

        let summary = run_cycle(
            &test_config(),
            &RunFilters::default(),
            &map,
            &sink,
            &mut store,
        )
        .await
        .unwrap();

        assert!(summary.baseline);
        assert_eq!(summary.new, 2);
        assert_eq!(summary.delivered, 0);
        assert!(sink.titles().is_empty());

        // Store holds exactly the discovered keys, with empty hashes.
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get(&key("1")),
            Some(&StateRecord {
                last_modified: 100,
                last_sent_hash: String::new(),
            })
        );

        // Detail fetches still ran; the persisted file exists afterwards.
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn new_items_are_delivered_and_staged() {
        let dir = TempDir::new().unwrap();
        let mut store = primed_store(&dir).await;
        let map = adapters(StubAdapter::new(vec![record("7", 500)]));
        let sink = RecordingSink::new();

        let summary = run_cycle(
            &test_config(),
            &RunFilters::default(),
            &map,
            &sink,
            &mut store,
        )
        .await
        .unwrap();

        assert!(!summary.baseline);
        assert_eq!(summary.new, 1);
        assert_eq!(summary.delivered, 1);
        assert_eq!(sink.titles(), vec!["Post 7"]);

        let staged = store.get(&key("7")).unwrap();
        assert_eq!(staged.last_modified, 500);
        assert!(!staged.last_sent_hash.is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_leaves_state_untouched() {
        let dir = TempDir::new().unwrap();
        let mut store = primed_store(&dir).await;
        // One known-but-stale entry and one brand new item.
        store.stage(
            &key("old"),
            StateRecord {
                last_modified: 100,
                last_sent_hash: "prior".to_string(),
            },
        );
        let map = adapters(StubAdapter::new(vec![
            record("old", 900),
            record("fresh", 900),
        ]));
        let sink = RecordingSink::failing();

        let summary = run_cycle(
            &test_config(),
            &RunFilters::default(),
            &map,
            &sink,
            &mut store,
        )
        .await
        .unwrap();

        assert_eq!(summary.modified, 1);
        assert_eq!(summary.new, 1);
        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.failed, 2);

        // Present stays unchanged, absent stays absent.
        assert_eq!(
            store.get(&key("old")),
            Some(&StateRecord {
                last_modified: 100,
                last_sent_hash: "prior".to_string(),
            })
        );
        assert!(store.get(&key("fresh")).is_none());
    }

    #[tokio::test]
    async fn unchanged_items_skip_detail_fetch() {
        let dir = TempDir::new().unwrap();
        let mut store = primed_store(&dir).await;
        store.stage(
            &key("9"),
            StateRecord {
                last_modified: 300,
                last_sent_hash: "sent".to_string(),
            },
        );
        let stub = StubAdapter::new(vec![record("9", 300)]);
        let fetch_counter = Arc::clone(&stub.fetch_calls);
        let map = adapters(stub);
        let sink = RecordingSink::new();

        let summary = run_cycle(
            &test_config(),
            &RunFilters::default(),
            &map,
            &sink,
            &mut store,
        )
        .await
        .unwrap();

        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.delivered, 0);
        // No detail fetch was issued for the unchanged item.
        assert_eq!(fetch_counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn redelivery_is_hash_gated() {
        let dir = TempDir::new().unwrap();
        let mut store = primed_store(&dir).await;
        let map = adapters(StubAdapter::new(vec![record("3", 100)]));
        let sink = RecordingSink::new();
        let config = test_config();
        let filters = RunFilters::default();

        run_cycle(&config, &filters, &map, &sink, &mut store)
            .await
            .unwrap();
        assert_eq!(sink.titles().len(), 1);
        let staged = store.get(&key("3")).unwrap().clone();

        // Same content resurfaces with a bumped timestamp: classified
        // MODIFIED, fetched again, but not redelivered.
        let map = adapters(StubAdapter::new(vec![record("3", 200)]));
        let sink = RecordingSink::new();
        let summary = run_cycle(&config, &filters, &map, &sink, &mut store)
            .await
            .unwrap();

        assert_eq!(summary.modified, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.delivered, 0);
        assert!(sink.titles().is_empty());
        assert_eq!(store.get(&key("3")), Some(&staged));
    }

    #[tokio::test]
    async fn updated_after_filter_drops_old_records() {
        let dir = TempDir::new().unwrap();
        let mut store = primed_store(&dir).await;
        let map = adapters(StubAdapter::new(vec![
            record("stale", 100),
            record("recent", 900),
        ]));
        let sink = RecordingSink::new();
        let filters = RunFilters {
            updated_after: Some(500),
            ..RunFilters::default()
        };

        let summary = run_cycle(&test_config(), &filters, &map, &sink, &mut store)
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.delivered, 1);
        assert_eq!(sink.titles(), vec!["Post recent"]);
        assert!(store.get(&key("stale")).is_none());
    }

    #[tokio::test]
    async fn only_game_filter_skips_other_sources() {
        let dir = TempDir::new().unwrap();
        let mut store = primed_store(&dir).await;
        let map = adapters(StubAdapter::new(vec![record("1", 100)]));
        let sink = RecordingSink::new();
        let filters = RunFilters {
            only_game: Some(Game::Zzz),
            ..RunFilters::default()
        };

        let summary = run_cycle(&test_config(), &filters, &map, &sink, &mut store)
            .await
            .unwrap();

        assert_eq!(summary.discovered, 0);
        assert_eq!(summary.delivered, 0);
    }

    #[tokio::test]
    async fn dry_run_skips_the_state_commit() {
        let dir = TempDir::new().unwrap();
        let mut store = primed_store(&dir).await;
        let map = adapters(StubAdapter::new(vec![record("1", 100)]));
        let sink = RecordingSink::new();
        let filters = RunFilters {
            dry_run: true,
            ..RunFilters::default()
        };

        run_cycle(&test_config(), &filters, &map, &sink, &mut store)
            .await
            .unwrap();

        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn duplicate_discovery_fetches_once_with_max_timestamp() {
        let dir = TempDir::new().unwrap();
        let mut store = primed_store(&dir).await;
        // Same id surfaces in two categories with different timestamps.
        let mut config = test_config();
        config.feeds.sources[0].categories = vec![Category::Notices, Category::Events];
        let stub = StubAdapter::new(vec![record("5", 100), record("5", 250)]);
        let fetch_counter = Arc::clone(&stub.fetch_calls);
        let map = adapters(stub);
        let sink = RecordingSink::new();

        run_cycle(&config, &RunFilters::default(), &map, &sink, &mut store)
            .await
            .unwrap();

        assert_eq!(fetch_counter.load(Ordering::SeqCst), 1);
        assert_eq!(store.get(&key("5")).unwrap().last_modified, 250);
    }

    #[test]
    fn normalize_falls_back_to_effective_timestamp() {
        let mut detail = StubAdapter::detail_for("1");
        detail.created = 0;
        let outcome = TransformOutcome {
            content: detail.content.clone(),
            needs_review: false,
        };
        let item = normalize(Platform::Hoyolab, Game::Genshin, detail, outcome, 4_200);
        assert_eq!(item.published.timestamp(), 4_200);
        assert!(item.updated.is_none());
    }
}
