//! The single active-session slot
//!
//! Start and stop requests from any thread are serialized by the slot
//! lock. A start reserves the slot, opens the device without holding the
//! lock, then publishes its session. The session leaves the slot on stop
//! or when it ends by itself.

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use uuid::Uuid;

use crate::audio::{CaptureBackend, DeviceDescriptor, SharedGain};
use crate::config::{AudioConfig, NetworkConfig};
use crate::discovery::PeerEndpoint;
use crate::error::{ConfigError, Result, SessionError};
use crate::observer::Observers;
use crate::session::{
    ClosedSession, SessionConfig, SessionState, SessionStatsSnapshot, StreamingSession,
};

/// Lifecycle notifications
///
/// Delivered synchronously; observers must not call back into the
/// controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Started { id: Uuid, peer: String, device: String },
    StopRequested { id: Uuid },
    Closed {
        id: Uuid,
        peer: String,
        reason: crate::session::CloseReason,
        stats: SessionStatsSnapshot,
    },
}

impl From<&ClosedSession> for SessionEvent {
    fn from(closed: &ClosedSession) -> Self {
        SessionEvent::Closed {
            id: closed.id,
            peer: closed.peer.host().to_string(),
            reason: closed.reason,
            stats: closed.stats,
        }
    }
}

/// Summary of the slot for display
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub session_id: Option<Uuid>,
    pub peer: Option<String>,
    pub device: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub gain: f64,
    pub stats: Option<SessionStatsSnapshot>,
}

enum Occupant {
    /// Reserved by a start whose device is still opening
    Opening { cancelled: bool },
    Session(StreamingSession),
}

type Slot = Mutex<Option<Occupant>>;

/// Gatekeeper for starting and stopping the one streaming session
pub struct SessionController {
    backend: Arc<dyn CaptureBackend>,
    audio: AudioConfig,
    network: NetworkConfig,
    slot: Arc<Slot>,
    gain: SharedGain,
    events: Arc<Observers<SessionEvent>>,
}

impl SessionController {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self::with_config(backend, AudioConfig::default(), NetworkConfig::default())
    }

    pub fn with_config(
        backend: Arc<dyn CaptureBackend>,
        audio: AudioConfig,
        network: NetworkConfig,
    ) -> Self {
        let gain = SharedGain::new(audio.default_gain).unwrap_or_default();
        Self {
            backend,
            audio,
            network,
            slot: Arc::new(Mutex::new(None)),
            gain,
            events: Arc::new(Observers::new()),
        }
    }

    /// Start streaming from `device` to `peer`
    ///
    /// Fails with `AlreadyActive` if a session is opening or running.
    /// A failed start puts the previous gain back. Returns once the
    /// pipeline is running; the loop continues on its own thread.
    pub fn start(&self, device: &DeviceDescriptor, peer: &PeerEndpoint, gain: f64) -> Result<Uuid> {
        self.reserve()?;

        let previous_gain = self.gain.get();
        if let Err(e) = self.gain.set(gain) {
            self.slot.lock().take();
            return Err(e.into());
        }

        // Holds back the close hook until the session is published
        let (published_tx, published_rx) = bounded::<()>(0);

        let config = SessionConfig::new(Some(device.clone()), peer.clone(), self.gain.clone())
            .with_settings(&self.audio, &self.network);

        let started = StreamingSession::start_with_hook(
            config,
            self.backend.as_ref(),
            release_on_close(Arc::downgrade(&self.slot), self.events.clone(), published_rx),
        );

        let mut slot = self.slot.lock();
        let session = match started {
            Ok(session) => session,
            Err(e) => {
                slot.take();
                let _ = self.gain.set(previous_gain);
                return Err(e);
            }
        };

        let id = session.id();
        self.events.notify(&SessionEvent::Started {
            id,
            peer: peer.host().to_string(),
            device: device.name.clone(),
        });

        if matches!(*slot, Some(Occupant::Opening { cancelled: true })) {
            slot.take();
            session.stop();
            tracing::info!(session = %id, "Stop requested while opening");
            self.events.notify(&SessionEvent::StopRequested { id });
        } else {
            *slot = Some(Occupant::Session(session));
        }
        drop(slot);
        drop(published_tx);

        Ok(id)
    }

    /// Claim the empty slot for a start that is about to open a device
    fn reserve(&self) -> Result<()> {
        let mut slot = self.slot.lock();
        match slot.as_ref() {
            Some(Occupant::Opening { .. }) => return Err(SessionError::AlreadyActive.into()),
            Some(Occupant::Session(current)) if current.is_active() => {
                return Err(SessionError::AlreadyActive.into())
            }
            // A finished session may linger until its close hook runs
            _ => {}
        }
        *slot = Some(Occupant::Opening { cancelled: false });
        Ok(())
    }

    /// Take the session out of the slot
    ///
    /// A start that is still opening is marked cancelled instead, and
    /// stops its session as soon as the open completes.
    fn take_session(&self) -> Option<StreamingSession> {
        let mut slot = self.slot.lock();
        match slot.take() {
            Some(Occupant::Session(session)) => Some(session),
            Some(Occupant::Opening { .. }) => {
                *slot = Some(Occupant::Opening { cancelled: true });
                None
            }
            None => None,
        }
    }

    /// Signal the active session to stop; a no-op when idle
    ///
    /// Does not wait for teardown to finish.
    pub fn stop(&self) {
        if let Some(session) = self.take_session() {
            session.stop();
            tracing::info!(session = %session.id(), "Stop requested");
            self.events.notify(&SessionEvent::StopRequested { id: session.id() });
        }
    }

    /// Stop the active session and wait for its teardown
    ///
    /// A session still opening is cancelled without waiting.
    pub fn shutdown(&self) {
        // Join without the lock held; the close hook takes it
        if let Some(session) = self.take_session() {
            session.join();
        }
    }

    pub fn is_active(&self) -> bool {
        match self.slot.lock().as_ref() {
            Some(Occupant::Opening { .. }) => true,
            Some(Occupant::Session(s)) => s.is_active(),
            None => false,
        }
    }

    pub fn state(&self) -> SessionState {
        match self.slot.lock().as_ref() {
            Some(Occupant::Opening { .. }) => SessionState::Opening,
            Some(Occupant::Session(s)) => s.state(),
            None => SessionState::Idle,
        }
    }

    pub fn stats(&self) -> Option<SessionStatsSnapshot> {
        match self.slot.lock().as_ref() {
            Some(Occupant::Session(s)) => Some(s.stats()),
            _ => None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        let slot = self.slot.lock();
        let state = match slot.as_ref() {
            Some(Occupant::Opening { .. }) => SessionState::Opening,
            Some(Occupant::Session(s)) => s.state(),
            None => SessionState::Idle,
        };
        let session = match slot.as_ref() {
            Some(Occupant::Session(s)) => Some(s),
            _ => None,
        };
        SessionStatus {
            state,
            session_id: session.map(|s| s.id()),
            peer: session.map(|s| s.peer().host().to_string()),
            device: session.map(|s| s.device_name().to_string()),
            started_at: session.map(|s| s.started_at()),
            gain: self.gain.get(),
            stats: session.map(|s| s.stats()),
        }
    }

    /// Change the gain, taking effect on the next captured frame
    pub fn set_gain(&self, gain: f64) -> std::result::Result<(), ConfigError> {
        self.gain.set(gain)
    }

    pub fn gain(&self) -> f64 {
        self.gain.get()
    }

    pub fn backend(&self) -> &Arc<dyn CaptureBackend> {
        &self.backend
    }

    pub fn audio_config(&self) -> &AudioConfig {
        &self.audio
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback);
    }
}

/// Clears the slot if the closing session still occupies it
///
/// Waits until `published` disconnects so `Closed` always follows
/// `Started`.
fn release_on_close(
    slot: Weak<Slot>,
    events: Arc<Observers<SessionEvent>>,
    published: Receiver<()>,
) -> impl FnOnce(&ClosedSession) + Send + 'static {
    move |closed| {
        let _ = published.recv();
        if let Some(slot) = slot.upgrade() {
            let mut slot = slot.lock();
            if matches!(slot.as_ref(), Some(Occupant::Session(s)) if s.id() == closed.id) {
                slot.take();
            }
        }
        events.notify(&SessionEvent::from(closed));
    }
}
