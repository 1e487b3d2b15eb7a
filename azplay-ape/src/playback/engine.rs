//! Playout engine
//!
//! Owns the collaborators every session shares (registry, telemetry emitter,
//! output device, decoder) and starts sessions for playlist entries. There
//! are no process-wide singletons: the engine is built once in `main` and
//! passed by reference.

use crate::audio::decoder::SourceOpener;
use crate::audio::output::OutputDevice;
use crate::error::Result;
use crate::playback::playlist::PlaylistEntry;
use crate::playback::registry::{SessionRegistry, SessionSnapshot};
use crate::playback::scheduler::Player;
use crate::playback::session::{start_session, SessionConfig, SessionHandle, SessionServices};
use crate::playback::telemetry::TelemetryEmitter;
use crate::shutdown::ShutdownSignal;
use azplay_common::events::{DeviceInfo, PlaylistInfo};
use azplay_common::Cut;
use std::sync::Arc;
use tracing::info;

pub struct PlayoutEngine {
    services: SessionServices,
    device: Arc<dyn OutputDevice>,
}

impl PlayoutEngine {
    pub fn new(
        config: SessionConfig,
        device: Arc<dyn OutputDevice>,
        opener: Arc<dyn SourceOpener>,
        emitter: Arc<TelemetryEmitter>,
        shutdown: Arc<ShutdownSignal>,
    ) -> Self {
        info!(
            "Playout engine ready: origin {}, device {:?}, buffer {} blocks x {} frames",
            emitter.origin(),
            device.info(),
            config.buffer_blocks,
            config.block_frames
        );
        Self {
            services: SessionServices {
                registry: Arc::new(SessionRegistry::new()),
                emitter,
                opener,
                shutdown,
                config,
            },
            device,
        }
    }

    /// Start `cut` on the engine's output device
    pub fn play_cut(&self, cut: Arc<Cut>, placement: PlaylistInfo) -> Result<SessionHandle> {
        start_session(&self.services, Arc::clone(&self.device), cut, placement)
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.services.registry
    }

    pub fn device_info(&self) -> DeviceInfo {
        self.device.info()
    }

    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        self.services.registry.snapshot()
    }

    pub fn config(&self) -> SessionConfig {
        self.services.config
    }
}

impl Player for PlayoutEngine {
    type Session = SessionHandle;

    fn play(&self, entry: &PlaylistEntry) -> Result<SessionHandle> {
        self.play_cut(Arc::clone(&entry.cut), entry.placement())
    }
}

impl<P: Player + ?Sized> Player for Arc<P> {
    type Session = P::Session;

    fn play(&self, entry: &PlaylistEntry) -> Result<Self::Session> {
        (**self).play(entry)
    }
}
