//! Fire-and-forget playback reporting back to the media server.
//!
//! Reports run on a dedicated worker thread fed by a channel, so a slow or
//! stuck HTTP call can never stall command dispatch.

use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde_json::{Value, json};

use crate::protocol::TrackId;

/// Queue view attached to start/progress reports.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    pub items: Vec<TrackId>,
    pub playing_index: Option<usize>,
}

/// Remote playback reporting operations. All fire-and-forget: failures are
/// logged by implementations and never propagate into playback control.
pub trait RemoteReporter {
    /// Advertise media-control capabilities after (re)connecting.
    fn register_capabilities(&self);
    fn report_start(&self, track: &TrackId, queue: &QueueSnapshot);
    fn report_progress(&self, track: &TrackId, paused: bool, position_ms: u64, queue: &QueueSnapshot);
    fn report_stop(&self);
    /// Flush queued reports and stop the reporting backend; called once when
    /// the bridge exits. Synchronous implementations have nothing to do.
    fn shutdown(&self) {}
}

#[derive(Debug)]
enum ReportJob {
    Capabilities,
    Start {
        track: TrackId,
        queue: QueueSnapshot,
    },
    Progress {
        track: TrackId,
        paused: bool,
        position_ms: u64,
        queue: QueueSnapshot,
    },
    Stop,
    /// Drain marker: everything queued before it still runs.
    Shutdown,
}

/// HTTP reporter handle; the actual requests run on the spawned worker.
pub struct HttpReporter {
    job_tx: Sender<ReportJob>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HttpReporter {
    /// Spawn the reporting worker and return its handle.
    pub fn spawn(base_url: String, token: String) -> Self {
        let (job_tx, job_rx) = unbounded();
        let worker = std::thread::spawn(move || report_worker(base_url, token, job_rx));
        Self {
            job_tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    fn submit(&self, job: ReportJob) {
        if self.job_tx.send(job).is_err() {
            tracing::warn!("reporting worker gone; report dropped");
        }
    }
}

impl RemoteReporter for HttpReporter {
    fn register_capabilities(&self) {
        self.submit(ReportJob::Capabilities);
    }

    fn report_start(&self, track: &TrackId, queue: &QueueSnapshot) {
        self.submit(ReportJob::Start {
            track: track.clone(),
            queue: queue.clone(),
        });
    }

    fn report_progress(&self, track: &TrackId, paused: bool, position_ms: u64, queue: &QueueSnapshot) {
        self.submit(ReportJob::Progress {
            track: track.clone(),
            paused,
            position_ms,
            queue: queue.clone(),
        });
    }

    fn report_stop(&self) {
        self.submit(ReportJob::Stop);
    }

    fn shutdown(&self) {
        // The marker queues behind any pending reports, so joining here means
        // they all went out before the process exits.
        let _ = self.job_tx.send(ReportJob::Shutdown);
        let worker = self.worker.lock().expect("worker lock").take();
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }
}

fn report_worker(base_url: String, token: String, job_rx: Receiver<ReportJob>) {
    for job in job_rx.iter() {
        let (path, payload) = match job {
            ReportJob::Capabilities => ("Sessions/Capabilities/Full", capabilities_payload()),
            ReportJob::Start { track, queue } => {
                ("Sessions/Playing", start_payload(&track, &queue))
            }
            ReportJob::Progress {
                track,
                paused,
                position_ms,
                queue,
            } => (
                "Sessions/Playing/Progress",
                progress_payload(&track, paused, position_ms, &queue),
            ),
            ReportJob::Stop => ("Sessions/Playing/Stopped", stop_payload()),
            ReportJob::Shutdown => break,
        };
        let url = endpoint(&base_url, path, &token);
        let result = ureq::post(&url)
            .config()
            .timeout_per_call(Some(Duration::from_secs(5)))
            .build()
            .send_json(&payload);
        if let Err(err) = result {
            tracing::warn!(error = %err, path, "playback report failed");
        }
    }
    tracing::debug!("reporting worker stopped");
}

fn endpoint(base_url: &str, path: &str, token: &str) -> String {
    format!("{}/{path}?api_key={token}", base_url.trim_end_matches('/'))
}

fn now_playing_queue(queue: &QueueSnapshot) -> Value {
    Value::Array(
        queue
            .items
            .iter()
            .enumerate()
            .map(|(i, id)| {
                json!({
                    "Id": id.0,
                    "PlaylistItemId": format!("playlistItem{i}"),
                })
            })
            .collect(),
    )
}

fn playlist_item_id(queue: &QueueSnapshot) -> Value {
    match queue.playing_index {
        Some(i) => json!(format!("playlistItem{i}")),
        None => Value::Null,
    }
}

fn start_payload(track: &TrackId, queue: &QueueSnapshot) -> Value {
    json!({
        "ItemId": track.0,
        "MediaSourceId": track.0,
        "PositionTicks": 0,
        "CanSeek": true,
        "RepeatMode": "RepeatNone",
        "PlaybackRate": 1,
        "ShuffleMode": "Sorted",
        "NowPlayingQueue": now_playing_queue(queue),
        "PlaylistItemId": playlist_item_id(queue),
    })
}

fn progress_payload(track: &TrackId, paused: bool, position_ms: u64, queue: &QueueSnapshot) -> Value {
    json!({
        "ItemId": track.0,
        "MediaSourceId": track.0,
        // Remote protocol positions are 100-nanosecond ticks.
        "PositionTicks": position_ms * 10_000,
        "IsPaused": paused,
        "CanSeek": true,
        "RepeatMode": "RepeatNone",
        "PlaybackRate": 1,
        "ShuffleMode": "Sorted",
        "NowPlayingQueue": now_playing_queue(queue),
        "PlaylistItemId": playlist_item_id(queue),
    })
}

fn stop_payload() -> Value {
    json!({})
}

fn capabilities_payload() -> Value {
    json!({
        "SupportsMediaControl": true,
        "SupportedCommands": [
            "Play",
            "PlayState",
            "PlayMediaSource",
            "DisplayMessage",
        ],
        "PlayableMediaTypes": ["Audio"],
    })
}
