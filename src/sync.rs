//! Playback synchronization state machine.
//!
//! Reacts to remote commands and engine state changes, one event at a time,
//! mutating the queue/position and pushing progress back to the media server.

use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::engine::{EngineState, PlaybackSink, StateChange};
use crate::events::{BridgeEvent, LinkEvent};
use crate::position::PlaybackPosition;
use crate::protocol::{GeneralCommand, InboundMessage, PlayRequest, PlaystateCommand, PlaystateRequest, TrackId};
use crate::queue::{CursorMove, QueueState};
use crate::report::RemoteReporter;
use crate::stream_url::StreamUrl;

/// Mirror of the engine's reported status. Never claims a status the engine
/// has not itself reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

pub struct Synchronizer {
    queue: QueueState,
    position: PlaybackPosition,
    status: PlaybackStatus,
    /// Set when we commanded the stop ourselves, so the engine's following
    /// Idle notification neither auto-advances nor double-reports.
    stop_in_flight: bool,
    stream: StreamUrl,
    sink: Box<dyn PlaybackSink>,
    reporter: Box<dyn RemoteReporter>,
}

impl Synchronizer {
    pub fn new(stream: StreamUrl, sink: Box<dyn PlaybackSink>, reporter: Box<dyn RemoteReporter>) -> Self {
        Self {
            queue: QueueState::default(),
            position: PlaybackPosition::default(),
            status: PlaybackStatus::Stopped,
            stop_in_flight: false,
            stream,
            sink,
            reporter,
        }
    }

    pub fn queue(&self) -> &QueueState {
        &self.queue
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    /// Drain the bridge event channel until shutdown, then flush pending
    /// reports so the final stop notification reaches the server.
    pub fn run(&mut self, events: Receiver<BridgeEvent>) {
        for event in events.iter() {
            let shutdown = matches!(event, BridgeEvent::Shutdown);
            self.handle(event);
            if shutdown {
                break;
            }
        }
        self.reporter.shutdown();
    }

    pub fn handle(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Link(LinkEvent::Connected) => {
                // Fresh session: the server needs to re-learn what we can do.
                self.reporter.register_capabilities();
            }
            BridgeEvent::Link(LinkEvent::Disconnected) => {
                tracing::debug!("link down; awaiting reconnect");
            }
            BridgeEvent::Link(LinkEvent::Message(msg)) => self.dispatch(msg),
            BridgeEvent::Engine(change) => self.on_engine_state(change),
            BridgeEvent::Shutdown => {
                tracing::info!("shutting down playback");
                if self.status != PlaybackStatus::Stopped {
                    self.stop_engine();
                    self.reporter.report_stop();
                }
            }
        }
    }

    fn dispatch(&mut self, msg: InboundMessage) {
        match msg {
            InboundMessage::Play(req) => self.on_play(req),
            InboundMessage::Playstate(req) => self.on_playstate(req),
            InboundMessage::GeneralCommand(cmd) => self.on_general_command(cmd),
            InboundMessage::KeepAlive => {}
            InboundMessage::Unknown { tag } => {
                tracing::warn!(tag, "no handler for message");
            }
        }
    }

    fn on_play(&mut self, req: PlayRequest) {
        let start_index = req.start_index.unwrap_or(0);
        match self.queue.replace(req.item_ids, start_index) {
            Some(track) => {
                tracing::info!(track = %track, start_index, "queue replaced");
                self.start_track(&track, Duration::ZERO);
                self.reporter.report_start(&track, &self.queue.snapshot());
            }
            None => tracing::warn!("play command with empty track list"),
        }
    }

    fn on_playstate(&mut self, req: PlaystateRequest) {
        match req.command {
            PlaystateCommand::Seek => {
                let Some(track) = self.queue.current().cloned() else {
                    tracing::warn!("seek with no current track");
                    return;
                };
                let ticks = req.seek_position_ticks.unwrap_or(0).max(0) as u64;
                // Ticks are 100 ns; the engine wants the offset in real time.
                let offset = Duration::from_nanos(ticks * 100);
                self.start_track(&track, offset);
            }
            PlaystateCommand::PlayPause => {
                if self.status == PlaybackStatus::Playing {
                    if let Err(err) = self.sink.pause() {
                        tracing::warn!(error = %err, "pause failed");
                    }
                } else {
                    if let Err(err) = self.sink.resume() {
                        tracing::warn!(error = %err, "resume failed");
                    }
                    if let Some(track) = self.queue.current().cloned() {
                        self.reporter.report_progress(
                            &track,
                            false,
                            self.position.last_known_ms(),
                            &self.queue.snapshot(),
                        );
                    }
                }
            }
            PlaystateCommand::Stop => {
                self.stop_engine();
                self.reporter.report_stop();
            }
            PlaystateCommand::NextTrack => {
                let moved = self.queue.advance();
                self.after_cursor_move(moved, "next");
            }
            PlaystateCommand::PreviousTrack => {
                let moved = self.queue.retreat();
                self.after_cursor_move(moved, "previous");
            }
        }
    }

    fn on_general_command(&mut self, cmd: GeneralCommand) {
        match cmd.name.as_str() {
            "DisplayMessage" => {
                tracing::info!(arguments = ?cmd.arguments, "display message");
            }
            other => tracing::warn!(name = other, "unknown general command"),
        }
    }

    fn on_engine_state(&mut self, change: StateChange) {
        tracing::debug!(old = ?change.old, new = ?change.new, "engine state change");
        match change.new {
            EngineState::Playing => {
                self.status = PlaybackStatus::Playing;
                self.report_progress_for_current(false);
            }
            EngineState::Paused => {
                self.status = PlaybackStatus::Paused;
                self.position.mark_paused();
                self.report_progress_for_current(true);
            }
            EngineState::Idle => {
                self.status = PlaybackStatus::Stopped;
                self.position.reset();
                if std::mem::take(&mut self.stop_in_flight) {
                    return;
                }
                // Track ended naturally: move on, or wind the session down.
                match self.queue.advance() {
                    CursorMove::Moved(track) => {
                        self.start_track(&track, Duration::ZERO);
                        self.reporter.report_start(&track, &self.queue.snapshot());
                    }
                    CursorMove::Exhausted => self.reporter.report_stop(),
                    CursorMove::Empty => {}
                }
            }
        }
    }

    fn after_cursor_move(&mut self, moved: CursorMove, direction: &'static str) {
        match moved {
            CursorMove::Moved(track) => {
                tracing::info!(track = %track, direction, "skipping");
                self.start_track(&track, Duration::ZERO);
                self.reporter.report_start(&track, &self.queue.snapshot());
            }
            CursorMove::Exhausted => {
                tracing::info!(direction, "queue exhausted");
                self.stop_engine();
                self.reporter.report_stop();
            }
            CursorMove::Empty => tracing::debug!(direction, "skip with empty queue"),
        }
    }

    fn start_track(&mut self, track: &TrackId, offset: Duration) {
        // Anchor the position to this action's issue time, not the engine's
        // eventual confirmation, so progress stays consistent in between.
        self.position.restart(offset.as_millis() as u64);
        let url = self.stream.for_track(track);
        if let Err(err) = self.sink.play(&url, offset) {
            tracing::warn!(error = %err, track = %track, "failed to start track");
        }
    }

    fn stop_engine(&mut self) {
        if self.status != PlaybackStatus::Stopped {
            self.stop_in_flight = true;
        }
        if let Err(err) = self.sink.stop() {
            tracing::warn!(error = %err, "stop failed");
        }
    }

    fn report_progress_for_current(&mut self, paused: bool) {
        if let Some(track) = self.queue.current().cloned() {
            self.reporter.report_progress(
                &track,
                paused,
                self.position.last_known_ms(),
                &self.queue.snapshot(),
            );
        }
    }
}
