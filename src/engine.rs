//! Playback sink abstraction and the external-player engine.
//!
//! Sink commands are asynchronous requests: completion is observed later via
//! `StateChange` notifications on the bridge event channel, never via a return
//! value.

use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::Sender;
use thiserror::Error;

use crate::events::BridgeEvent;

/// Playback engine states as reported by the engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Playing,
    Paused,
    Idle,
}

/// An engine state transition notification.
#[derive(Debug, Clone, Copy)]
pub struct StateChange {
    pub old: EngineState,
    pub new: EngineState,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to launch player process: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Local audio sink. `play` with offset zero takes the direct source path;
/// a non-zero offset routes through the seekable decode path, since the direct
/// path cannot seek into an already-open stream.
pub trait PlaybackSink {
    fn play(&self, url: &str, offset: Duration) -> Result<(), SinkError>;
    fn pause(&self) -> Result<(), SinkError>;
    fn resume(&self) -> Result<(), SinkError>;
    fn stop(&self) -> Result<(), SinkError>;
}

struct EngineInner {
    child: Option<Child>,
    state: EngineState,
    /// Bumped whenever the current child is replaced or killed, so a watcher
    /// for a superseded child can never report Idle for the current track.
    generation: u64,
}

/// Sink backed by an external player process (one child per track).
///
/// The configured argv gets `-ss <secs>` appended for non-zero offsets and the
/// stream URL last, which fits ffplay/ffmpeg-style players.
pub struct ProcessEngine {
    player_command: Vec<String>,
    events: Sender<BridgeEvent>,
    inner: Arc<Mutex<EngineInner>>,
}

impl ProcessEngine {
    pub fn new(player_command: Vec<String>, events: Sender<BridgeEvent>) -> Self {
        Self {
            player_command,
            events,
            inner: Arc::new(Mutex::new(EngineInner {
                child: None,
                state: EngineState::Idle,
                generation: 0,
            })),
        }
    }

    fn spawn_watcher(&self, generation: u64) {
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        std::thread::spawn(move || {
            loop {
                std::thread::sleep(Duration::from_millis(100));
                let Ok(mut guard) = inner.lock() else { return };
                if guard.generation != generation {
                    return;
                }
                let Some(child) = guard.child.as_mut() else { return };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        tracing::debug!(%status, "player process finished");
                        guard.child = None;
                        transition(&mut guard, EngineState::Idle, &events);
                        return;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "player process wait failed");
                        return;
                    }
                }
            }
        });
    }
}

fn transition(inner: &mut EngineInner, new: EngineState, events: &Sender<BridgeEvent>) {
    let old = inner.state;
    if old == new {
        return;
    }
    inner.state = new;
    let _ = events.send(BridgeEvent::Engine(StateChange { old, new }));
}

fn kill_current(inner: &mut EngineInner) {
    if let Some(mut child) = inner.child.take() {
        let _ = child.kill();
        let _ = child.wait();
    }
}

#[cfg(unix)]
fn signal_child(child: &Child, signal: i32) -> bool {
    // Safety: plain kill(2) on a pid we own.
    unsafe { libc::kill(child.id() as i32, signal) == 0 }
}

impl PlaybackSink for ProcessEngine {
    fn play(&self, url: &str, offset: Duration) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().expect("engine lock");
        kill_current(&mut inner);
        inner.generation += 1;
        let generation = inner.generation;

        let Some((program, args)) = self.player_command.split_first() else {
            return Err(SinkError::Spawn(std::io::Error::other("empty player command")));
        };
        let mut command = Command::new(program);
        command.args(args);
        if !offset.is_zero() {
            // Seekable decode path: start decoding at the requested offset.
            command.arg("-ss").arg(format!("{:.3}", offset.as_secs_f64()));
        }
        command.arg(url);
        command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

        let child = command.spawn()?;
        tracing::info!(pid = child.id(), url, offset_ms = offset.as_millis() as u64, "player started");
        inner.child = Some(child);
        transition(&mut inner, EngineState::Playing, &self.events);
        drop(inner);

        self.spawn_watcher(generation);
        Ok(())
    }

    fn pause(&self) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().expect("engine lock");
        if inner.state != EngineState::Playing {
            return Ok(());
        }
        let Some(child) = inner.child.as_ref() else {
            return Ok(());
        };
        #[cfg(unix)]
        {
            if signal_child(child, libc::SIGSTOP) {
                transition(&mut inner, EngineState::Paused, &self.events);
            } else {
                tracing::warn!(pid = child.id(), "failed to pause player process");
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child;
            tracing::warn!("pause is not supported on this platform");
        }
        Ok(())
    }

    fn resume(&self) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().expect("engine lock");
        if inner.state != EngineState::Paused {
            tracing::debug!(state = ?inner.state, "resume with no paused track");
            return Ok(());
        }
        let Some(child) = inner.child.as_ref() else {
            return Ok(());
        };
        #[cfg(unix)]
        {
            if signal_child(child, libc::SIGCONT) {
                transition(&mut inner, EngineState::Playing, &self.events);
            } else {
                tracing::warn!(pid = child.id(), "failed to resume player process");
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child;
            tracing::warn!("resume is not supported on this platform");
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().expect("engine lock");
        kill_current(&mut inner);
        inner.generation += 1;
        transition(&mut inner, EngineState::Idle, &self.events);
        Ok(())
    }
}
