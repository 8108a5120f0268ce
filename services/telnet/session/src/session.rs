//! Core session management for telnet connections.
//!
//! A [`Session`] owns one TCP connection. It runs a background read loop that
//! turns inbound bytes into lines, serializes and throttles outbound lines
//! through a single-slot gate, and funnels every way of ending (caller
//! request, end-of-stream, socket error, cancellation) into one teardown that
//! emits `ConnectionClosed` exactly once.

use crate::error::SessionError;
use crate::events::{ChannelObserver, SessionEvent, SessionObserver};
use crate::handshake::socks4_connect;
use crate::state::{SessionState, StateCell};
use crate::transport::{connect_tcp, resolve_ipv4};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use telnet_wire::{LineCodec, LineEnding, WireError, DEFAULT_MAX_LINE_LENGTH};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

type LineReader = FramedRead<OwnedReadHalf, LineCodec>;
type LineWriter = FramedWrite<OwnedWriteHalf, LineCodec>;

/// Upper bound on flushing and shutting down the output stream during teardown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a telnet session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Minimum spacing between two writes
    pub send_interval: Duration,
    /// Bound on TCP connect and on the SOCKS4 exchange
    pub connect_timeout: Duration,
    /// Terminator appended to outbound lines
    pub line_ending: LineEnding,
    /// Longest inbound line accepted before the session is dropped
    pub max_line_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(30),
            line_ending: LineEnding::CrLf,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// Statistics for a session
#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    /// Lines delivered to the observer
    pub lines_received: u64,
    /// Lines written to the socket
    pub lines_sent: u64,
    /// Payload bytes written, terminators excluded
    pub bytes_sent: u64,
    /// Timestamp of last received line
    pub last_line_in: Option<Instant>,
    /// Timestamp of last sent line
    pub last_line_out: Option<Instant>,
}

/// How a `send` that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Line written and flushed
    Delivered,
    /// Cancellation fired before the line was written
    Cancelled,
    /// Session already torn down; nothing written
    Closed,
}

/// State shared between the caller-facing handle and the read loop
struct Shared {
    host: String,
    port: u16,
    config: SessionConfig,
    cancel: CancellationToken,
    state: StateCell,
    /// The send gate. Holding the lock is the right to write; `None` once
    /// teardown has closed the output stream.
    writer: tokio::sync::Mutex<Option<LineWriter>>,
    stats: Mutex<SessionStats>,
    observer: Arc<dyn SessionObserver>,
    /// Set once `ConnectionClosed` went out; guards all observer dispatch
    closed_fired: Mutex<bool>,
}

/// A single-use, line-oriented TCP client session
pub struct Session {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a session for `host:port`.
    ///
    /// The session cancels itself when `token` is cancelled, but cancelling
    /// the session never cancels `token`.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        config: SessionConfig,
        token: &CancellationToken,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                host: host.into(),
                port,
                config,
                cancel: token.child_token(),
                state: StateCell::new(),
                writer: tokio::sync::Mutex::new(None),
                stats: Mutex::new(SessionStats::default()),
                observer,
                closed_fired: Mutex::new(false),
            }),
            reader: Mutex::new(None),
        }
    }

    /// Create a session whose events arrive on the returned channel
    pub fn with_channel(
        host: impl Into<String>,
        port: u16,
        config: SessionConfig,
        token: &CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (observer, events) = ChannelObserver::new();
        (Self::new(host, port, config, token, Arc::new(observer)), events)
    }

    /// Target host
    pub fn host(&self) -> &str {
        &self.shared.host
    }

    /// Target port
    pub fn port(&self) -> u16 {
        self.shared.port
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.shared.state.get()
    }

    /// Snapshot of the session counters
    pub fn stats(&self) -> SessionStats {
        self.shared.stats()
    }

    /// Connect directly to the target and start reading.
    ///
    /// Returns once the socket is open. May only be called once per session.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.begin_connect()?;
        let shared = self.shared.clone();
        info!("Connecting to {}:{}", shared.host, shared.port);

        let result = self
            .cancellable(connect_tcp(
                &shared.host,
                shared.port,
                shared.config.connect_timeout,
            ))
            .await;
        self.finish_connect(result).await
    }

    /// Connect to the target through a SOCKS4 proxy and start reading.
    ///
    /// The target host is resolved locally to IPv4. May only be called once
    /// per session, and not after [`connect`](Self::connect).
    pub async fn connect_via_proxy(
        &self,
        proxy_host: &str,
        proxy_port: u16,
        user_id: &str,
    ) -> Result<(), SessionError> {
        self.begin_connect()?;
        let shared = self.shared.clone();
        let timeout = shared.config.connect_timeout;
        info!(
            "Connecting to {}:{} via SOCKS4 proxy {}:{}",
            shared.host, shared.port, proxy_host, proxy_port
        );

        let establish = async {
            let mut stream = connect_tcp(proxy_host, proxy_port, timeout).await?;
            let target = resolve_ipv4(&shared.host, shared.port).await?;

            tokio::time::timeout(timeout, socks4_connect(&mut stream, target, user_id))
                .await
                .map_err(|_| {
                    SessionError::Handshake(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "socks4 handshake timed out",
                    ))
                })??;

            Ok::<_, SessionError>(stream)
        };

        let result = self.cancellable(establish).await;
        self.finish_connect(result).await
    }

    /// Write `text` as one line, then hold the gate for the send interval.
    ///
    /// Concurrent callers are admitted one at a time. Races with teardown
    /// come back as [`SendOutcome::Cancelled`] or [`SendOutcome::Closed`];
    /// only genuine transport faults are errors.
    pub async fn send(&self, text: &str) -> Result<SendOutcome, SessionError> {
        let shared = &self.shared;
        match shared.state.get() {
            SessionState::Created | SessionState::Connecting => {
                return Err(SessionError::NotConnected)
            }
            SessionState::Closing | SessionState::Closed => {
                debug!("Send skipped: session is closed");
                return Ok(SendOutcome::Closed);
            }
            SessionState::Connected => {}
        }

        let mut gate = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => {
                debug!("Send aborted while waiting for the gate: cancellation requested");
                return Ok(SendOutcome::Cancelled);
            }
            gate = shared.writer.lock() => gate,
        };

        let Some(writer) = gate.as_mut() else {
            debug!("Send skipped: output stream closed");
            return Ok(SendOutcome::Closed);
        };

        let written = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => None,
            written = writer.send(text) => Some(written),
        };

        let Some(written) = written else {
            // The line may still sit in the codec buffer; teardown must not flush it
            writer.write_buffer_mut().clear();
            debug!("Send aborted mid-write: cancellation requested");
            return Ok(SendOutcome::Cancelled);
        };

        if let Err(e) = written {
            let outcome = classify_write_error(e, shared.cancel.is_cancelled());
            if let Err(e) = &outcome {
                error!("Send to {}:{} failed: {}", shared.host, shared.port, e);
            }
            return outcome;
        }

        {
            let mut stats = shared.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.lines_sent += 1;
            stats.bytes_sent += telnet_wire::strip_terminator(text).len() as u64;
            stats.last_line_out = Some(Instant::now());
        }
        trace!("Sent line to {}:{}: {:?}", shared.host, shared.port, text);

        // Keep the gate closed for the interval so writes stay spaced out
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => {
                debug!("Send throttle cut short: cancellation requested");
            }
            _ = tokio::time::sleep(shared.config.send_interval) => {}
        }

        Ok(SendOutcome::Delivered)
    }

    /// Tear the session down and wait for the read loop to exit.
    ///
    /// Idempotent and safe to call concurrently with `send`. The session is
    /// unusable afterwards.
    pub async fn disconnect(&self) {
        self.shared.teardown().await;

        let handle = self
            .reader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Read loop for {}:{} ended abnormally: {}", self.shared.host, self.shared.port, e);
            }
        }
    }

    fn begin_connect(&self) -> Result<(), SessionError> {
        self.shared
            .state
            .advance(SessionState::Connecting)
            .map_err(|current| {
                warn!(
                    "Connect aborted: session is {}, reconnecting is not supported",
                    current
                );
                SessionError::Reuse
            })?;
        Ok(())
    }

    async fn cancellable<T>(
        &self,
        fut: impl Future<Output = Result<T, SessionError>>,
    ) -> Result<T, SessionError> {
        tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => Err(SessionError::Cancelled),
            result = fut => result,
        }
    }

    async fn finish_connect(
        &self,
        result: Result<TcpStream, SessionError>,
    ) -> Result<(), SessionError> {
        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    "Connect to {}:{} failed: {}",
                    self.shared.host, self.shared.port, e
                );
                self.shared.teardown().await;
                return Err(e);
            }
        };

        let peer = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();
        let codec = LineCodec::with_options(
            self.shared.config.max_line_length,
            self.shared.config.line_ending,
        );

        // Publish the writer and the Connected state together, so a teardown
        // racing with us either sees the writer or makes us back off
        {
            let mut gate = self.shared.writer.lock().await;
            if let Err(current) = self.shared.state.advance(SessionState::Connected) {
                debug!("Connect abandoned: session became {} while connecting", current);
                return Err(SessionError::Cancelled);
            }
            *gate = Some(FramedWrite::new(write_half, codec.clone()));
        }

        info!(
            "Connected to {}:{} (peer {:?})",
            self.shared.host, self.shared.port, peer
        );

        let lines = FramedRead::new(read_half, codec);
        let handle = tokio::spawn(read_loop(self.shared.clone(), lines));
        *self.reader.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.cancel.cancel();

        // A running read loop notices the cancellation and tears down on its
        // own; without one nothing else would
        let reader_started = self
            .reader
            .lock()
            .map(|reader| reader.is_some())
            .unwrap_or(false);
        if !reader_started && self.shared.state.advance(SessionState::Closing).is_ok() {
            if let Ok(mut writer) = self.shared.writer.try_lock() {
                writer.take();
            }
            self.shared.finish_close();
        }
    }
}

impl Shared {
    fn stats(&self) -> SessionStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn dispatch_message(&self, line: &str) {
        let closed = self.closed_fired.lock().unwrap_or_else(|e| e.into_inner());
        if !*closed {
            self.observer.on_message(line);
        }
    }

    /// Mark the session closed and emit `ConnectionClosed` at most once
    fn finish_close(&self) {
        let _ = self.state.advance(SessionState::Closed);

        let mut closed = self.closed_fired.lock().unwrap_or_else(|e| e.into_inner());
        if !*closed {
            *closed = true;
            self.observer.on_closed();
        }
    }

    /// Idempotent shutdown shared by every exit path
    async fn teardown(&self) {
        // Unblocks waiting sends and stops the read loop
        self.cancel.cancel();

        let previous = match self.state.advance(SessionState::Closing) {
            Ok(previous) => previous,
            Err(current) => {
                trace!("Teardown skipped: session already {}", current);
                return;
            }
        };
        let _closed = CloseGuard(self);
        debug!(
            "Tearing down session with {}:{} (was {})",
            self.host, self.port, previous
        );

        // Every gate holder watches the cancellation, so this is prompt
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let close = SinkExt::<&str>::close(&mut writer);
            match tokio::time::timeout(CLOSE_TIMEOUT, close).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Error closing output stream: {}", e),
                Err(_) => debug!("Timed out closing output stream"),
            }
        }

        info!(
            "Session with {}:{} ended. Stats: {:?}",
            self.host,
            self.port,
            self.stats()
        );
    }
}

/// Sort a failed write into a teardown race or a genuine transport fault
fn classify_write_error(err: WireError, cancelled: bool) -> Result<SendOutcome, SessionError> {
    match err {
        WireError::Io(e) if cancelled => {
            debug!("Send failed during teardown: {}", e);
            Ok(SendOutcome::Closed)
        }
        other => Err(other.into()),
    }
}

/// Emits `ConnectionClosed` when teardown finishes, even if it is cut short
struct CloseGuard<'a>(&'a Shared);

impl Drop for CloseGuard<'_> {
    fn drop(&mut self) {
        self.0.finish_close();
    }
}

/// Read lines until cancellation, end-of-stream or error, then tear down
async fn read_loop(shared: Arc<Shared>, mut lines: LineReader) {
    loop {
        if shared.cancel.is_cancelled() {
            debug!("Read loop aborted: cancellation requested");
            break;
        }

        let state = shared.state.get();
        if state != SessionState::Connected {
            debug!("Read loop aborted: session is {}", state);
            break;
        }

        let next = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => {
                debug!("Read loop aborted: cancellation requested");
                break;
            }
            next = lines.next() => next,
        };

        match next {
            Some(Ok(line)) => {
                {
                    let mut stats = shared.stats.lock().unwrap_or_else(|e| e.into_inner());
                    stats.lines_received += 1;
                    stats.last_line_in = Some(Instant::now());
                }
                trace!("Received line from {}:{}: {:?}", shared.host, shared.port, line);
                shared.dispatch_message(&line);
            }
            Some(Err(WireError::Io(e))) => {
                info!(
                    "Read loop aborted: socket to {}:{} disconnected unexpectedly: {}",
                    shared.host, shared.port, e
                );
                break;
            }
            Some(Err(e)) => {
                warn!("Read loop aborted: {}", e);
                break;
            }
            None => {
                debug!("Read loop aborted: reached end of stream");
                break;
            }
        }
    }

    drop(lines);
    debug!("Read loop completed, tearing down");
    shared.teardown().await;
}
