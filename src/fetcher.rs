use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::{MapApi, ObjectsResponse, RoomStatusResponse, TerrainResponse};
use crate::document::{RoomRecord, SkipReason, SkippedRoom};
use crate::error::{Result, ScreepsError};
use crate::objects::sanitize_objects;
use crate::progress::ProgressReporter;
use crate::rooms::{is_highway, RoomTask};

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched(RoomRecord),
    Skipped(SkippedRoom),
}

impl FetchOutcome {
    pub fn room(&self) -> &str {
        match self {
            FetchOutcome::Fetched(record) => &record.room,
            FetchOutcome::Skipped(skipped) => &skipped.room,
        }
    }
}

pub struct RoomFetcher {
    api: Arc<dyn MapApi>,
    shard: String,
    request_pause: Duration,
    progress: Option<ProgressReporter>,
}

impl RoomFetcher {
    pub fn new(api: Arc<dyn MapApi>, shard: impl Into<String>, request_pause: Duration) -> Self {
        Self { api, shard: shard.into(), request_pause, progress: None }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Some(progress);
        self
    }

    async fn pause(&self) {
        if !self.request_pause.is_zero() {
            tokio::time::sleep(self.request_pause).await;
        }
    }

    /// Fetches terrain, objects and status for one room.
    ///
    /// A room whose status reports an error or is not ok comes back as
    /// [`FetchOutcome::Skipped`]; transport and decoding failures are errors.
    pub async fn fetch(&self, task: &RoomTask) -> Result<FetchOutcome> {
        let room = task.room_name();

        let terrain = self.api.room_terrain(&self.shard, &room).await?;
        self.pause().await;
        let objects = self.api.room_objects(&self.shard, &room).await?;
        self.pause().await;
        let status = self.api.room_status(&self.shard, &room).await?;

        let outcome = build_outcome(task, room, terrain, objects, status)?;

        if let Some(progress) = self.progress.as_ref() {
            progress.report(task.index, outcome.room());
        }

        Ok(outcome)
    }
}

fn skip_reason(status: &RoomStatusResponse) -> Option<SkipReason> {
    if let Some(message) = status.error.as_ref() {
        return Some(SkipReason::StatusError(message.clone()));
    }
    if status.ok != Some(1) {
        return Some(SkipReason::StatusNotOk);
    }
    None
}

pub(crate) fn build_outcome(
    task: &RoomTask,
    room: String,
    terrain: TerrainResponse,
    objects: ObjectsResponse,
    status: RoomStatusResponse,
) -> Result<FetchOutcome> {
    if let Some(reason) = skip_reason(&status) {
        warn!(room = %room, reason = %reason, "Skipping room");
        return Ok(FetchOutcome::Skipped(SkippedRoom { room, reason }));
    }

    let encoded_terrain = terrain
        .encoded()
        .ok_or_else(|| ScreepsError::Parse(format!("{}: terrain response is empty", room)))?
        .to_string();
    let objects = objects
        .objects
        .ok_or_else(|| ScreepsError::Parse(format!("{}: objects response has no objects", room)))?;
    let objects = sanitize_objects(objects);

    let highway = is_highway(&room);
    debug!(room = %room, objects = objects.len(), highway, "Fetched room");

    Ok(FetchOutcome::Fetched(RoomRecord {
        room,
        terrain: encoded_terrain,
        objects,
        status: task.status.clone(),
        bus: highway.then_some(true),
        deposit_type: highway.then(|| task.deposit_type.to_string()),
    }))
}
