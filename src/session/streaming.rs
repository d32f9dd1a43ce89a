//! One capture → gain → send pipeline
//!
//! Opening happens on the caller's thread so failures can be returned;
//! the capture loop then runs on a dedicated thread until the token is
//! cancelled or the device goes away, and tears down in a fixed order:
//! stop stream, close stream, close socket.

use chrono::{DateTime, Utc};
use crossbeam::atomic::AtomicCell;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use uuid::Uuid;

use crate::audio::{apply_gain_in_place, CaptureBackend, CaptureStream, SharedGain};
use crate::codec::PcmEncoder;
use crate::discovery::PeerEndpoint;
use crate::error::{DeviceError, Result};
use crate::network::AudioSender;
use crate::session::{
    CancellationToken, CloseReason, SessionConfig, SessionState, SessionStats,
    SessionStatsSnapshot,
};

/// Log every Nth repeated loop error at warn level, the rest at debug
const ERROR_LOG_EVERY: u64 = 100;

/// Outcome of a finished session
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedSession {
    pub id: Uuid,
    pub peer: PeerEndpoint,
    pub reason: CloseReason,
    pub stats: SessionStatsSnapshot,
}

/// Handle to a running capture/send pipeline
///
/// Dropping the handle cancels the loop without waiting for teardown.
pub struct StreamingSession {
    id: Uuid,
    peer: PeerEndpoint,
    device_name: String,
    started_at: DateTime<Utc>,
    state: Arc<AtomicCell<SessionState>>,
    cancel: CancellationToken,
    gain: SharedGain,
    stats: Arc<SessionStats>,
    thread_handle: Option<JoinHandle<()>>,
}

impl StreamingSession {
    /// Open the device and socket and start streaming
    pub fn start(config: SessionConfig, backend: &dyn CaptureBackend) -> Result<Self> {
        Self::start_with_hook(config, backend, |_| {})
    }

    /// Like [`start`](Self::start), running `on_closed` on the session
    /// thread once teardown has finished
    pub fn start_with_hook<F>(
        config: SessionConfig,
        backend: &dyn CaptureBackend,
        on_closed: F,
    ) -> Result<Self>
    where
        F: FnOnce(&ClosedSession) + Send + 'static,
    {
        let (device, params) = config.validate()?;
        let device_name = device.name.clone();

        let id = Uuid::new_v4();
        let span = tracing::info_span!("session", id = %id, peer = %config.peer);
        let state = Arc::new(AtomicCell::new(SessionState::Opening));

        let (stream, sender) = span.in_scope(|| -> Result<_> {
            tracing::info!("Opening {} at {} Hz", device.name, params.sample_rate);

            let mut stream = backend.open_stream(device, &params)?;

            let sender = match AudioSender::connect(&config.peer, config.send_buffer_size) {
                Ok(sender) => {
                    tracing::debug!("Socket connected to {}", sender.peer_addr());
                    sender
                }
                Err(e) => {
                    close_stream(stream);
                    return Err(e.into());
                }
            };

            // Release in reverse order of acquisition
            if let Err(e) = stream.start() {
                sender.close();
                close_stream(stream);
                return Err(e.into());
            }

            Ok((stream, sender))
        })
        .inspect_err(|e| {
            tracing::warn!(session = %id, "Session failed to open: {}", e);
            state.store(SessionState::Idle);
        })?;

        state.store(SessionState::Running);

        let cancel = CancellationToken::new();
        let stats = Arc::new(SessionStats::default());

        let worker = CaptureWorker {
            id,
            peer: config.peer.clone(),
            stream,
            sender,
            gain: config.gain.clone(),
            cancel: cancel.clone(),
            stats: stats.clone(),
            state: state.clone(),
            encoder: PcmEncoder::new(params.frame_length),
            frame_length: params.frame_length,
        };

        let loop_span = span.clone();
        let handle = thread::Builder::new()
            .name(format!("session-{}", &id.simple().to_string()[..8]))
            .spawn(move || {
                let _enter = loop_span.enter();
                let closed = worker.run();
                on_closed(&closed);
            });

        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                // The worker, and with it stream and socket, was dropped
                state.store(SessionState::Closed);
                return Err(e.into());
            }
        };

        span.in_scope(|| tracing::info!("Transmitting audio to {}", config.peer));

        Ok(Self {
            id,
            peer: config.peer,
            device_name,
            started_at: Utc::now(),
            state,
            cancel,
            gain: config.gain,
            stats,
            thread_handle: Some(handle),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> &PeerEndpoint {
        &self.peer
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> SessionState {
        self.state.load()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn stats(&self) -> SessionStatsSnapshot {
        self.stats.snapshot()
    }

    /// The live gain read by the loop
    pub fn gain(&self) -> &SharedGain {
        &self.gain
    }

    /// Signal the loop to stop; returns without waiting for teardown
    pub fn stop(&self) {
        let _ = self
            .state
            .compare_exchange(SessionState::Running, SessionState::Stopping);
        self.cancel.cancel();
    }

    /// Stop and wait until teardown has finished
    pub fn join(mut self) {
        self.stop();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!(session = %self.id, "Session thread panicked");
            }
        }
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State moved onto the session thread
struct CaptureWorker {
    id: Uuid,
    peer: PeerEndpoint,
    stream: Box<dyn CaptureStream>,
    sender: AudioSender,
    gain: SharedGain,
    cancel: CancellationToken,
    stats: Arc<SessionStats>,
    state: Arc<AtomicCell<SessionState>>,
    encoder: PcmEncoder,
    frame_length: usize,
}

impl CaptureWorker {
    fn run(mut self) -> ClosedSession {
        let reason = self.capture_loop();

        self.state.store(SessionState::Stopping);
        match reason {
            CloseReason::Stopped => tracing::info!("Stopping transmission"),
            CloseReason::DeviceLost => tracing::error!("Capture device lost, ending session"),
        }

        teardown(self.stream, self.sender);
        self.state.store(SessionState::Closed);

        let encoded = self.encoder.stats();
        tracing::debug!(
            "Encoded {} frames into {} bytes",
            encoded.frames_encoded,
            encoded.bytes_produced
        );

        let stats = self.stats.snapshot();
        tracing::info!(
            "Transmission ended: {} frames, {} bytes sent, {} read errors, {} send errors",
            stats.frames_sent,
            stats.bytes_sent,
            stats.read_errors,
            stats.send_errors
        );

        ClosedSession {
            id: self.id,
            peer: self.peer,
            reason,
            stats,
        }
    }

    fn capture_loop(&mut self) -> CloseReason {
        let mut frame = vec![0i16; self.frame_length];

        while !self.cancel.is_cancelled() {
            match self.stream.read_into(&mut frame) {
                Ok(()) => {}
                Err(DeviceError::ReadTimeout) => {
                    tracing::trace!("No audio within read timeout");
                    continue;
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!("Read failed: {}", e);
                    return CloseReason::DeviceLost;
                }
                Err(e) => {
                    let count = self.stats.record_read_error();
                    log_repeated("Read failed", count, &e);
                    continue;
                }
            }

            apply_gain_in_place(&mut frame, self.gain.get());
            let payload = self.encoder.encode(&frame);

            match self.sender.send(payload) {
                Ok(n) => self.stats.record_sent(n),
                Err(e) => {
                    let count = self.stats.record_send_error();
                    log_repeated("Send failed", count, &e);
                }
            }
        }
        CloseReason::Stopped
    }
}

fn log_repeated(what: &str, count: u64, err: &dyn std::fmt::Display) {
    if count == 1 || count % ERROR_LOG_EVERY == 0 {
        tracing::warn!("{} ({} so far): {}", what, count, err);
    } else {
        tracing::debug!("{}: {}", what, err);
    }
}

/// Release everything; each step runs even if the previous one failed
fn teardown(mut stream: Box<dyn CaptureStream>, sender: AudioSender) {
    if let Err(e) = stream.stop() {
        tracing::warn!("Failed to stop capture stream: {}", e);
    }
    close_stream(stream);
    sender.close();
}

fn close_stream(stream: Box<dyn CaptureStream>) {
    if let Err(e) = stream.close() {
        tracing::warn!("Failed to close capture stream: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::simulated::StreamCall;
    use crate::audio::SimulatedBackend;
    use crate::error::{ConfigError, Error, NetworkError};
    use std::net::UdpSocket;
    use std::time::Duration;

    fn config_for(backend: &SimulatedBackend, peer: PeerEndpoint) -> SessionConfig {
        let mut config = SessionConfig::new(Some(backend.device()), peer, SharedGain::default());
        config.frame_length = 4;
        config.read_timeout = Duration::from_millis(5);
        config
    }

    fn local_receiver() -> (UdpSocket, PeerEndpoint) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, PeerEndpoint::with_port("127.0.0.1", port))
    }

    #[test]
    fn test_gain_applied_and_encoded() {
        let backend = SimulatedBackend::scripted(vec![vec![100, -100, 20000, -20000]]);
        let (receiver, peer) = local_receiver();
        let config = config_for(&backend, peer);
        config.gain.set(2.0).unwrap();

        let session = StreamingSession::start(config, &backend).unwrap();

        let mut buf = [0u8; 16];
        let n = receiver.recv(&mut buf).unwrap();
        assert_eq!(
            crate::codec::decode_frame(&buf[..n]).unwrap(),
            vec![200, -200, i16::MAX, i16::MIN]
        );
        session.join();
    }

    #[test]
    fn test_teardown_order() {
        let backend = SimulatedBackend::scripted(vec![]);
        let (_receiver, peer) = local_receiver();

        let session = StreamingSession::start(config_for(&backend, peer), &backend).unwrap();
        assert_eq!(session.state(), SessionState::Running);
        session.join();

        assert_eq!(
            backend.probe().calls(),
            vec![StreamCall::Open, StreamCall::Start, StreamCall::Stop, StreamCall::Close]
        );
    }

    #[test]
    fn test_teardown_continues_after_stop_failure() {
        let backend = SimulatedBackend::scripted(vec![])
            .fail_stop(DeviceError::StopFailed("busy".into()));
        let (_receiver, peer) = local_receiver();

        StreamingSession::start(config_for(&backend, peer), &backend)
            .unwrap()
            .join();

        assert_eq!(backend.probe().calls().last(), Some(&StreamCall::Close));
    }

    #[test]
    fn test_invalid_config_acquires_nothing() {
        let backend = SimulatedBackend::scripted(vec![]);
        let config = config_for(&backend, PeerEndpoint::new(""));

        let err = StreamingSession::start(config, &backend).err().unwrap();
        assert!(matches!(err, Error::Config(ConfigError::NoPeer)));
        assert!(backend.probe().calls().is_empty());
    }

    #[test]
    fn test_start_failure_closes_stream() {
        let backend = SimulatedBackend::scripted(vec![])
            .fail_start(DeviceError::StartFailed("no permission".into()));
        let (_receiver, peer) = local_receiver();

        let err = StreamingSession::start(config_for(&backend, peer), &backend).err().unwrap();
        assert!(matches!(err, Error::Device(DeviceError::StartFailed(_))));
        assert_eq!(backend.probe().calls(), vec![StreamCall::Open, StreamCall::Close]);
    }

    #[test]
    fn test_dial_failure_closes_stream() {
        let backend = SimulatedBackend::scripted(vec![]);
        let config = config_for(&backend, PeerEndpoint::new("no such host"));

        let err = StreamingSession::start(config, &backend).err().unwrap();
        assert!(matches!(err, Error::Network(NetworkError::DialFailed { .. })));
        assert_eq!(backend.probe().calls(), vec![StreamCall::Open, StreamCall::Close]);
    }

    #[test]
    fn test_device_loss_self_terminates() {
        let backend = SimulatedBackend::scripted(vec![vec![1, 2, 3, 4]]).disconnect_when_exhausted();
        let (_receiver, peer) = local_receiver();
        let (closed_tx, closed_rx) = crossbeam_channel::bounded(1);

        let session = StreamingSession::start_with_hook(config_for(&backend, peer), &backend, move |c| {
            let _ = closed_tx.send(c.clone());
        })
        .unwrap();

        let closed = closed_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(closed.reason, CloseReason::DeviceLost);
        assert_eq!(closed.stats.frames_sent, 1);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(backend.probe().calls().last(), Some(&StreamCall::Close));
    }
}
