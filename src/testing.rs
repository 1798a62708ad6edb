//! In-memory `MapApi` for unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use crate::api::{MapApi, ObjectsResponse, RoomStatusResponse, TerrainResponse, WorldSizeResponse};
use crate::error::{Result, ScreepsError};

#[derive(Debug, Clone)]
pub struct RoomFixture {
    terrain: Value,
    objects: Value,
    status: Value,
}

impl RoomFixture {
    pub fn ok(terrain: &str) -> Self {
        Self {
            terrain: json!({ "ok": 1, "terrain": [{ "terrain": terrain, "type": "terrain" }] }),
            objects: json!({ "ok": 1, "objects": [], "users": {} }),
            status: json!({ "ok": 1, "room": { "status": "normal" } }),
        }
    }

    pub fn unavailable(message: &str) -> Self {
        Self {
            terrain: json!({ "ok": 1, "terrain": [] }),
            objects: json!({ "error": message }),
            status: json!({ "error": message }),
        }
    }

    pub fn with_objects(mut self, objects: Value) -> Self {
        self.objects = json!({ "ok": 1, "objects": objects });
        self
    }

    pub fn with_terrain(mut self, terrain: Value) -> Self {
        self.terrain = terrain;
        self
    }

    pub fn with_status(mut self, status: Value) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiCall {
    pub endpoint: &'static str,
    pub shard: String,
    pub room: String,
    pub at: Instant,
}

pub struct MockMapApi {
    rooms: HashMap<String, RoomFixture>,
    failing: HashSet<String>,
    status_delays: HashMap<String, Duration>,
    world_size: WorldSizeResponse,
    calls: Mutex<Vec<ApiCall>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockMapApi {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
            failing: HashSet::new(),
            status_delays: HashMap::new(),
            world_size: WorldSizeResponse { width: 4, height: 4 },
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_room(mut self, room: &str, fixture: RoomFixture) -> Self {
        self.rooms.insert(room.to_string(), fixture);
        self
    }

    pub fn failing_room(mut self, room: &str) -> Self {
        self.failing.insert(room.to_string());
        self
    }

    pub fn with_status_delay(mut self, room: &str, delay: Duration) -> Self {
        self.status_delays.insert(room.to_string(), delay);
        self
    }

    pub fn with_world_size(mut self, width: u32, height: u32) -> Self {
        self.world_size = WorldSizeResponse { width, height };
        self
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn rooms_requested(&self, endpoint: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.endpoint == endpoint)
            .map(|call| call.room)
            .collect()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, endpoint: &'static str, shard: &str, room: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ApiCall {
                endpoint,
                shard: shard.to_string(),
                room: room.to_string(),
                at: Instant::now(),
            });
        }
    }

    fn fixture(&self, room: &str) -> RoomFixture {
        self.rooms.get(room).cloned().unwrap_or_else(|| RoomFixture::ok("0000"))
    }
}

#[async_trait]
impl MapApi for MockMapApi {
    async fn room_terrain(&self, shard: &str, room: &str) -> Result<TerrainResponse> {
        self.record("terrain", shard, room);
        if self.failing.contains(room) {
            return Err(ScreepsError::Network(format!("connection reset while fetching {}", room)));
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Ok(serde_json::from_value(self.fixture(room).terrain)?)
    }

    async fn room_objects(&self, shard: &str, room: &str) -> Result<ObjectsResponse> {
        self.record("objects", shard, room);
        Ok(serde_json::from_value(self.fixture(room).objects)?)
    }

    async fn room_status(&self, shard: &str, room: &str) -> Result<RoomStatusResponse> {
        if let Some(delay) = self.status_delays.get(room) {
            tokio::time::sleep(*delay).await;
        }
        self.record("status", shard, room);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(serde_json::from_value(self.fixture(room).status)?)
    }

    async fn world_size(&self, shard: &str) -> Result<WorldSizeResponse> {
        self.record("world-size", shard, "");
        Ok(self.world_size)
    }
}

/// Log output of the current thread, kept for assertions while the returned
/// guard lives.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn install() -> (Self, DefaultGuard) {
        let logs = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .without_time()
            .with_target(false)
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    pub fn lines(&self) -> Vec<String> {
        self.0
            .lock()
            .map(|bytes| String::from_utf8_lossy(&bytes).lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Ok(mut bytes) = self.0.lock() {
            bytes.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
