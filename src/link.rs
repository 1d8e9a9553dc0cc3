//! Persistent duplex link to the media server's control socket.
//!
//! One worker thread owns the websocket: it polls inbound frames with a short
//! read timeout, drains queued outbound frames, emits a heartbeat on a fixed
//! cadence, and rebuilds the connection after a fixed delay whenever it drops.

use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde_json::Value;
use thiserror::Error;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Error as WsError, Message, WebSocket};
use url::Url;

use crate::events::{BridgeEvent, LinkEvent};
use crate::protocol;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const READ_TIMEOUT: Duration = Duration::from_millis(200);
const KEEPALIVE_TAG: &str = "KeepAlive";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("link is not connected")]
    NotConnected,
    #[error("token cannot change while the link is open")]
    TokenUpdateRejected,
    #[error("invalid server address: {0}")]
    BadAddress(#[from] url::ParseError),
}

/// Derive the control socket URL from the server base address, auth token and
/// device id: `http*` becomes `ws*`, the socket path is appended, and the
/// credentials travel as query parameters.
pub fn socket_url(base: &str, token: &str, device: &str) -> Result<String, LinkError> {
    let mut url = Url::parse(base)?;
    let path = format!("{}/socket", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(Some(&format!("api_key={token}&deviceId={device}")));
    Ok(url.to_string().replacen("http", "ws", 1))
}

/// Handle to the persistent control connection.
pub struct DuplexLink {
    base_url: String,
    device_id: String,
    token: Mutex<String>,
    state: Mutex<ConnectionState>,
    outbound_tx: Sender<String>,
    outbound_rx: Receiver<String>,
    events: Sender<BridgeEvent>,
    opened: AtomicBool,
}

impl DuplexLink {
    pub fn new(base_url: String, token: String, device_id: String, events: Sender<BridgeEvent>) -> Self {
        let (outbound_tx, outbound_rx) = unbounded();
        Self {
            base_url,
            device_id,
            token: Mutex::new(token),
            state: Mutex::new(ConnectionState::Disconnected),
            outbound_tx,
            outbound_rx,
            events,
            opened: AtomicBool::new(false),
        }
    }

    /// Start the connection loop. Reconnection is automatic and endless with a
    /// fixed delay; calling `open` again is a no-op.
    pub fn open(self: &Arc<Self>) {
        if self.opened.swap(true, Ordering::SeqCst) {
            return;
        }
        let link = Arc::clone(self);
        std::thread::spawn(move || link.run_loop());
    }

    /// Queue a `{type, data?}` frame for the current session.
    pub fn send(&self, tag: &str, data: Option<Value>) -> Result<(), LinkError> {
        if self.state() != ConnectionState::Connected {
            return Err(LinkError::NotConnected);
        }
        self.outbound_tx
            .send(protocol::encode(tag, data))
            .map_err(|_| LinkError::NotConnected)
    }

    /// Swap the auth token used for the next connection attempt. Rejected while
    /// the link is open; close-by-disconnect must happen first.
    pub fn update_token(&self, new_token: impl Into<String>) -> Result<(), LinkError> {
        if self.state() == ConnectionState::Connected {
            return Err(LinkError::TokenUpdateRejected);
        }
        *self.token.lock().expect("token lock") = new_token.into();
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().expect("state lock")
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().expect("state lock") = state;
    }

    fn run_loop(self: Arc<Self>) {
        loop {
            self.set_state(ConnectionState::Connecting);
            let url = {
                let token = self.token.lock().expect("token lock");
                socket_url(&self.base_url, &token, &self.device_id)
            };
            match url {
                Ok(url) => match tungstenite::connect(url.as_str()) {
                    Ok((mut socket, _response)) => {
                        set_read_timeout(&socket);
                        self.set_state(ConnectionState::Connected);
                        let _ = self.events.send(BridgeEvent::Link(LinkEvent::Connected));
                        tracing::info!(server = %self.base_url, "link connected");
                        self.session(&mut socket);
                        self.set_state(ConnectionState::Disconnected);
                        let _ = self.events.send(BridgeEvent::Link(LinkEvent::Disconnected));
                        tracing::info!("link disconnected");
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, server = %self.base_url, "link connect failed");
                        self.set_state(ConnectionState::Disconnected);
                    }
                },
                Err(err) => {
                    tracing::error!(error = %err, server = %self.base_url, "bad socket url");
                    self.set_state(ConnectionState::Disconnected);
                }
            }
            // Frames queued against the dead session are stale; drop them.
            while self.outbound_rx.try_recv().is_ok() {}
            std::thread::sleep(RECONNECT_DELAY);
        }
    }

    /// One connected session: heartbeat immediately, then poll until the
    /// transport fails. Heartbeat cadence lives on this stack frame, so nothing
    /// of it can leak across reconnects.
    fn session(&self, socket: &mut WebSocket<MaybeTlsStream<TcpStream>>) {
        if socket.send(Message::text(protocol::encode(KEEPALIVE_TAG, None))).is_err() {
            return;
        }
        let mut last_heartbeat = Instant::now();

        loop {
            while let Ok(frame) = self.outbound_rx.try_recv() {
                if socket.send(Message::text(frame)).is_err() {
                    return;
                }
            }

            if last_heartbeat.elapsed() >= HEARTBEAT_INTERVAL {
                if socket.send(Message::text(protocol::encode(KEEPALIVE_TAG, None))).is_err() {
                    return;
                }
                last_heartbeat = Instant::now();
            }

            match socket.read() {
                Ok(Message::Text(text)) => match protocol::decode(text.as_str()) {
                    Ok(msg) => {
                        let _ = self.events.send(BridgeEvent::Link(LinkEvent::Message(msg)));
                    }
                    // One bad frame must never take the link down.
                    Err(err) => tracing::warn!(error = %err, "dropping undecodable frame"),
                },
                Ok(Message::Close(_)) => return,
                Ok(_) => {}
                Err(WsError::Io(err)) if is_timeout(&err) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "link read failed");
                    return;
                }
            }
        }
    }
}

fn set_read_timeout(socket: &WebSocket<MaybeTlsStream<TcpStream>>) {
    let stream = match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => Some(stream),
        MaybeTlsStream::Rustls(tls) => Some(tls.get_ref()),
        _ => None,
    };
    if let Some(stream) = stream {
        let _ = stream.set_read_timeout(Some(READ_TIMEOUT));
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::InboundMessage;
    use std::net::TcpListener;

    #[test]
    fn socket_url_round_trips_credentials() {
        let composed = socket_url("https://media.example:8920/media", "tok123", "bridge-1").unwrap();
        let parsed = Url::parse(&composed).unwrap();
        assert_eq!(parsed.scheme(), "wss");
        assert!(parsed.path().ends_with("/socket"));
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("api_key".into(), "tok123".into())));
        assert!(pairs.contains(&("deviceId".into(), "bridge-1".into())));
    }

    #[test]
    fn socket_url_plain_http_becomes_ws() {
        let composed = socket_url("http://media.local", "t", "d").unwrap();
        assert!(composed.starts_with("ws://media.local/socket?"));
    }

    #[test]
    fn socket_url_rejects_unparseable_address() {
        assert!(matches!(
            socket_url("not a url", "t", "d"),
            Err(LinkError::BadAddress(_))
        ));
    }

    #[test]
    fn send_requires_connection() {
        let (events, _event_rx) = unbounded();
        let link = DuplexLink::new("http://media.local".into(), "t".into(), "d".into(), events);
        assert_eq!(link.send(KEEPALIVE_TAG, None), Err(LinkError::NotConnected));
    }

    #[test]
    fn token_update_is_allowed_while_closed() {
        let (events, _event_rx) = unbounded();
        let link = DuplexLink::new("http://media.local".into(), "t".into(), "d".into(), events);
        assert_eq!(link.update_token("t2"), Ok(()));
    }

    fn expect_link_event(rx: &Receiver<BridgeEvent>) -> LinkEvent {
        match rx.recv_timeout(Duration::from_secs(10)).expect("link event") {
            BridgeEvent::Link(event) => event,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    fn expect_keepalive(ws: &mut WebSocket<TcpStream>) {
        let msg = ws.read().expect("client frame");
        let text = msg.to_text().expect("text frame");
        assert_eq!(text, r#"{"type":"KeepAlive"}"#);
    }

    #[test]
    fn reconnects_and_heartbeats_per_session() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            // First session: expect the immediate heartbeat, then hang up.
            let (stream, _) = listener.accept().unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();
            expect_keepalive(&mut ws);
            drop(ws);

            // The link must come back on its own after the fixed delay, with a
            // fresh immediate heartbeat (and only one).
            let (stream, _) = listener.accept().unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();
            expect_keepalive(&mut ws);
            ws.send(Message::text(r#"{"type":"KeepAlive"}"#.to_string())).unwrap();
            std::thread::sleep(Duration::from_secs(2));
        });

        let (event_tx, event_rx) = unbounded();
        let link = Arc::new(DuplexLink::new(
            format!("http://127.0.0.1:{port}"),
            "tok".into(),
            "dev".into(),
            event_tx,
        ));
        link.open();

        assert!(matches!(expect_link_event(&event_rx), LinkEvent::Connected));
        assert!(matches!(expect_link_event(&event_rx), LinkEvent::Disconnected));
        assert!(matches!(expect_link_event(&event_rx), LinkEvent::Connected));

        // Token rotation is rejected while the second session is open.
        assert_eq!(link.update_token("new"), Err(LinkError::TokenUpdateRejected));
        // Outbound frames are accepted while connected.
        assert_eq!(link.send(KEEPALIVE_TAG, None), Ok(()));

        match expect_link_event(&event_rx) {
            LinkEvent::Message(InboundMessage::KeepAlive) => {}
            other => panic!("unexpected event: {other:?}"),
        }

        server.join().unwrap();
    }
}
