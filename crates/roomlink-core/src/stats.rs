use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::events::{ParticipantSnapshot, TrackKind};
use crate::sdk::RoomHandle;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackStats {
    pub track_sid: String,
    pub kind: TrackKind,
    /// Published by the local participant (`false` for subscribed tracks).
    pub local: bool,
    pub codec: String,
    pub packets: u64,
    pub packets_lost: u64,
    pub bytes: u64,
    pub round_trip_time_ms: Option<u32>,
    pub jitter_ms: Option<u32>,
}

/// One stats report per peer connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub peer_connection_id: String,
    pub tracks: Vec<TrackStats>,
}

/// Payload of a `StatsUpdate` room event.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct RoomStats {
    pub remote_participants: Vec<ParticipantSnapshot>,
    /// Published local video track sid to track name.
    pub local_video_track_names: BTreeMap<String, String>,
    pub reports: Vec<StatsReport>,
}

impl RoomStats {
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self)
            .inspect_err(|e| tracing::warn!("cannot serialize room stats: {e}"))
            .ok()
    }
}

/// Periodically polls a room's stats provider while the room is connected.
///
/// Polling starts one interval after [`StatsScheduler::start`]. Stopping
/// (or dropping) the scheduler aborts the polling task; the controller
/// additionally drops any report that arrives after the session ended.
pub struct StatsScheduler {
    handle: Option<JoinHandle<()>>,
}

impl StatsScheduler {
    pub fn start<F, Fut>(runtime: &Handle, room: Arc<dyn RoomHandle>, interval: Duration, on_reports: F) -> Self
    where
        F: Fn(Vec<StatsReport>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let reports = room.stats().await;
                on_reports(reports).await;
            }
        });
        tracing::debug!("stats scheduler started, interval={interval:?}");
        Self { handle: Some(handle) }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop polling. Further calls are no-ops.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("stats scheduler stopped");
        }
    }
}

impl Drop for StatsScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
