use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::info;

use crate::api::MapApi;
use crate::config::Config;
use crate::document::MapDocument;
use crate::error::{Result, ScreepsError};
use crate::fetcher::{FetchOutcome, RoomFetcher};
use crate::pacing::DispatchPacer;
use crate::progress::{group_thousands, ProgressReporter};
use crate::rooms::{build_worklist, RoomTask, StatusPolicy};

pub struct MapDownloader {
    config: Config,
    api: Arc<dyn MapApi>,
}

impl MapDownloader {
    pub fn new(config: Config, api: Arc<dyn MapApi>) -> Self {
        Self { config, api }
    }

    /// Rooms to fetch, from the configured coordinate ranges or, when none are
    /// configured, from the shard's world size.
    pub async fn worklist(&self) -> Result<Vec<RoomTask>> {
        let directions = self.config.directions();
        if let Some((xs, ys)) = self.config.coordinate_ranges() {
            let policy = StatusPolicy::Fixed(self.config.room_status.clone());
            return Ok(build_worklist(&directions, xs, ys, &policy));
        }

        let world = self.api.world_size(&self.config.map_shard).await?;
        info!(width = world.width, height = world.height, "Fetched world size");
        Ok(build_worklist(
            &directions,
            0..world.width / 2,
            0..world.height / 2,
            &StatusPolicy::ByQuadrant,
        ))
    }

    pub async fn run(&self) -> Result<MapDocument> {
        info!("Downloading: {}", self.config.map_description);

        let tasks = self.worklist().await?;
        let total = tasks.len();
        info!("Fetching {} rooms...", group_thousands(total));

        let mut fetcher = RoomFetcher::new(
            self.api.clone(),
            self.config.map_shard.clone(),
            self.config.request_pause(),
        );
        if self.config.progress_bar {
            fetcher = fetcher.with_progress(ProgressReporter::new(total, &self.config.map_shard));
        }

        let document = self.collect(Arc::new(fetcher), tasks).await?;
        info!(
            fetched = document.rooms.len(),
            skipped = document.skipped.len(),
            "Fetched {} of {} rooms",
            document.rooms.len(),
            total
        );

        if let Some(path) = self.config.save_results_filename.as_ref() {
            document.save(path)?;
            info!("Results saved to {}", path.display());
        }
        info!("Complete");
        Ok(document)
    }

    async fn collect(
        &self,
        fetcher: Arc<RoomFetcher>,
        tasks: Vec<RoomTask>,
    ) -> Result<MapDocument> {
        let mut document = MapDocument::new(self.config.map_description.clone());
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut pacer = DispatchPacer::new(self.config.dispatch_interval());
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<Result<FetchOutcome>>();
        let mut handles = JoinSet::new();

        for task in tasks {
            // The tick comes after the permit so dispatches stay one
            // interval apart however long the permit wait was.
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|error| ScreepsError::Task(error.to_string()))?;
            pacer.ready().await;

            // Surface failures from finished tasks without waiting for the
            // whole worklist to be dispatched.
            while let Ok(outcome) = outcome_rx.try_recv() {
                push_outcome(&mut document, outcome?);
            }

            let fetcher = fetcher.clone();
            let outcome_tx = outcome_tx.clone();
            handles.spawn(async move {
                let outcome = fetcher.fetch(&task).await;
                drop(permit);
                let _ = outcome_tx.send(outcome);
            });
        }
        drop(outcome_tx);

        while let Some(outcome) = outcome_rx.recv().await {
            push_outcome(&mut document, outcome?);
        }

        while let Some(joined) = handles.join_next().await {
            joined.map_err(|error| ScreepsError::Task(error.to_string()))?;
        }

        Ok(document)
    }
}

fn push_outcome(document: &mut MapDocument, outcome: FetchOutcome) {
    match outcome {
        FetchOutcome::Fetched(record) => document.rooms.push(record),
        FetchOutcome::Skipped(skipped) => document.skipped.push(skipped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CapturedLogs, MockMapApi, RoomFixture};
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::time::Instant;

    fn config(extra: &str) -> Config {
        let text = format!(
            "map_shard: shard0\nmap_description: Test map\nrequest_pause_ms: 300\n{}",
            extra
        );
        let config: Config = serde_yaml::from_str(&text).expect("config parses");
        config.validate().expect("config is valid");
        config
    }

    fn downloader(config: Config, api: MockMapApi) -> (Arc<MockMapApi>, MapDownloader) {
        let api = Arc::new(api);
        (api.clone(), MapDownloader::new(config, api))
    }

    fn room_names(document: &MapDocument) -> HashSet<String> {
        document.rooms.iter().map(|record| record.room.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn worklist_from_ranges_uses_fixed_status() {
        let (api, downloader) = downloader(
            config("map_size_x: [0, 2]\nmap_size_y: [5, 6]\nmap_dx: [E]\nroom_status: novice\n"),
            MockMapApi::new(),
        );

        let tasks = downloader.worklist().await.expect("worklist");

        assert_eq!(tasks.len(), 3 * 2 * 2);
        assert!(tasks.iter().all(|task| task.status == "novice"));
        assert_eq!(tasks[0].room_name(), "E0N5");
        assert!(api.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn worklist_from_world_size_covers_all_quadrants() {
        let (api, downloader) = downloader(config(""), MockMapApi::new().with_world_size(6, 4));

        let tasks = downloader.worklist().await.expect("worklist");

        assert_eq!(tasks.len(), 3 * 2 * 4);
        assert_eq!(api.rooms_requested("world-size").len(), 1);
        let last = tasks.last().expect("non-empty");
        assert_eq!(last.room_name(), "E2S1");
        assert_eq!(last.status, "not available");
        assert_eq!(last.deposit_type, "mist");
    }

    #[tokio::test(start_paused = true)]
    async fn run_collects_every_room_and_reports_skips() {
        let (api, downloader) = downloader(
            config("map_size_x: [0, 1]\nmap_size_y: [0, 1]\nmap_dx: [W]\nmap_dy: [N]\n"),
            MockMapApi::new()
                .with_room("W1N1", RoomFixture::unavailable("invalid room"))
                .with_room(
                    "W0N0",
                    RoomFixture::ok("2200").with_objects(json!([
                        { "type": "controller", "level": 4, "user": "u1" },
                        { "type": "constructionSite" },
                    ])),
                ),
        );

        let document = downloader.run().await.expect("run");

        assert_eq!(document.description, "Test map");
        assert_eq!(
            room_names(&document),
            HashSet::from(["W0N0".to_string(), "W1N0".to_string(), "W0N1".to_string()])
        );
        assert_eq!(document.skipped.len(), 1);
        assert_eq!(document.skipped[0].room, "W1N1");

        let origin = document.rooms.iter().find(|record| record.room == "W0N0").expect("W0N0");
        assert_eq!(origin.bus, Some(true));
        assert_eq!(origin.deposit_type.as_deref(), Some("silicon"));
        assert_eq!(origin.objects.len(), 1);
        assert_eq!(origin.objects[0].get("level"), Some(&json!(0)));

        assert_eq!(api.rooms_requested("terrain").len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_is_paced() {
        let (api, downloader) = downloader(
            config(
                "map_size_x: [0, 3]\nmap_size_y: [0, 0]\nmap_dx: [W]\nmap_dy: [S]\n\
                 dispatch_interval_ms: 1000\n",
            ),
            MockMapApi::new(),
        );
        let start = Instant::now();

        downloader.run().await.expect("run");

        let offsets: Vec<Duration> = api
            .calls()
            .iter()
            .filter(|call| call.endpoint == "terrain")
            .map(|call| call.at - start)
            .collect();
        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3)
            ]
        );
        assert_eq!(api.rooms_requested("terrain"), vec!["W0S0", "W1S0", "W2S0", "W3S0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_holds_after_waiting_for_a_permit() {
        let (api, downloader) = downloader(
            config(
                "map_size_x: [0, 3]\nmap_size_y: [0, 0]\nmap_dx: [W]\nmap_dy: [N]\n\
                 dispatch_interval_ms: 1000\nmax_concurrency: 2\n",
            ),
            MockMapApi::new()
                .with_status_delay("W0N0", Duration::from_secs(6))
                .with_status_delay("W1N0", Duration::from_secs(5)),
        );
        let start = Instant::now();

        downloader.run().await.expect("run");

        let offsets: Vec<Duration> = api
            .calls()
            .iter()
            .filter(|call| call.endpoint == "terrain")
            .map(|call| call.at - start)
            .collect();
        // Both permits come back at 6.6s; the last two rooms still start a
        // full interval apart.
        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_millis(6_600),
                Duration::from_millis(7_600)
            ]
        );
        assert!(offsets.windows(2).all(|pair| pair[1] - pair[0] >= Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_lines_follow_the_progress_bar_setting() {
        let rooms = "map_size_x: [0, 1]\nmap_size_y: [0, 0]\nmap_dx: [W]\nmap_dy: [N]\n";
        let api = || MockMapApi::new().with_room("W1N0", RoomFixture::unavailable("invalid room"));
        let progress_lines = |logs: &CapturedLogs| -> Vec<String> {
            logs.lines().into_iter().filter(|line| line.contains(" | shard0/")).collect()
        };

        let (logs, guard) = CapturedLogs::install();
        let (_, quiet) = downloader(config(rooms), api());
        quiet.run().await.expect("run");
        assert!(progress_lines(&logs).is_empty(), "{:?}", logs.lines());
        drop(guard);

        let (logs, _guard) = CapturedLogs::install();
        let (_, verbose) = downloader(config(&format!("{rooms}progress_bar: true\n")), api());
        verbose.run().await.expect("run");
        let lines = progress_lines(&logs);
        assert_eq!(lines.len(), 2, "{:?}", lines);
        assert!(lines.iter().any(|line| line.contains("#1/2 | shard0/W0N0 |")), "{:?}", lines);
        assert!(lines.iter().any(|line| line.contains("#2/2 | shard0/W1N0 |")), "{:?}", lines);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let (api, downloader) = downloader(
            config(
                "map_size_x: [0, 9]\nmap_size_y: [0, 0]\ndispatch_interval_ms: 0\n\
                 max_concurrency: 3\n",
            ),
            MockMapApi::new(),
        );

        let document = downloader.run().await.expect("run");

        assert_eq!(document.rooms.len(), 40);
        assert_eq!(api.peak_in_flight(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rooms_arrive_in_completion_order() {
        let (_, downloader) = downloader(
            config(
                "map_size_x: [0, 1]\nmap_size_y: [0, 0]\nmap_dx: [W]\nmap_dy: [N]\n\
                 dispatch_interval_ms: 0\n",
            ),
            MockMapApi::new().with_status_delay("W0N0", Duration::from_secs(5)),
        );

        let document = downloader.run().await.expect("run");

        let order: Vec<&str> = document.rooms.iter().map(|record| record.room.as_str()).collect();
        assert_eq!(order, vec!["W1N0", "W0N0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn api_failure_aborts_the_run() {
        let (_, downloader) = downloader(
            config("map_size_x: [0, 4]\nmap_size_y: [0, 0]\nmap_dx: [W]\nmap_dy: [N]\n"),
            MockMapApi::new().failing_room("W1N0"),
        );

        let result = downloader.run().await;

        assert!(matches!(result, Err(ScreepsError::Network(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn results_are_saved_when_configured() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("rooms.json");
        let (_, downloader) = downloader(
            config(&format!(
                "map_size_x: [9, 10]\nmap_size_y: [0, 0]\nmap_dx: [E]\nmap_dy: [N]\n\
                 progress_bar: true\nsave_results_filename: {}\n",
                path.display()
            )),
            MockMapApi::new(),
        );

        let document = downloader.run().await.expect("run");
        let saved = MapDocument::load(&path).expect("saved document");

        assert_eq!(room_names(&saved), room_names(&document));
        assert_eq!(room_names(&saved), HashSet::from(["E9N0".to_string(), "E10N0".to_string()]));
        let text = std::fs::read_to_string(&path).expect("read");
        assert!(!text.contains(": "));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_worklist_produces_empty_document() {
        let (api, downloader) = downloader(config(""), MockMapApi::new().with_world_size(1, 1));

        let document = downloader.run().await.expect("run");

        assert!(document.rooms.is_empty());
        assert!(document.skipped.is_empty());
        assert!(api.rooms_requested("terrain").is_empty());
    }
}
