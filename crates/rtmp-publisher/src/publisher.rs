//! # Publisher
//!
//! Caller-facing entry points: media configuration, connection lifecycle and
//! frame pushing.
//!
//! **Control path** (`set_media_info`, `open_url`, `close`) is serialized by
//! one mutex and publishes an immutable `PublishState` snapshot through
//! `ArcSwap`. **Hot path** (`push_video_frame`, `push_audio_frame`) never takes
//! that mutex: it loads the snapshot lock-free. A push racing a control call
//! sees either the old or the new snapshot.
//!
//! Every snapshot that changes media or session carries a fresh keyframe
//! gate. A push holding a stale snapshot can only open the stale gate, and
//! whatever headers it queues go to the stale session.
//!
//! Session I/O never happens on the calling thread; it is queued on the event
//! loop in FIFO order.

use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use bytes::Bytes;
use quanta::Clock;
use tracing::{debug, info, warn};

use crate::config::PublisherConfig;
use crate::dispatch::{
    build_audio_tag, build_video_tag, GateState, KeyframeGate, MAX_REJECTED_VIDEO_LEN,
};
use crate::error::{PublishError, Result};
use crate::event_loop::TaskScheduler;
use crate::media::{configure, ConfiguredMedia, MediaDescriptor};
use crate::nal::is_keyframe;
use crate::pacer::FramePacer;
use crate::session::{
    schedule_close, schedule_handshake, schedule_send, schedule_sends, ConnectionFactory, Session,
    SessionState, Track,
};
use crate::url::RtmpUrl;

/// What happened to an accepted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued for sending at `timestamp` ms.
    Scheduled { timestamp: u64 },
    /// Accepted but not forwarded.
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The frame's track is not configured.
    TrackDisabled,
    /// The keyframe gate is closed.
    AwaitingKeyframe,
}

/// Media configuration, current session and their keyframe gate, swapped as
/// one unit.
struct PublishState {
    media: Arc<ConfiguredMedia>,
    session: Option<Arc<Session>>,
    gate: Arc<KeyframeGate>,
}

impl PublishState {
    fn new(media: Arc<ConfiguredMedia>, session: Option<Arc<Session>>) -> Self {
        let gate = Arc::new(KeyframeGate::new(media.video_enabled()));
        Self {
            media,
            session,
            gate,
        }
    }
}

impl Default for PublishState {
    fn default() -> Self {
        Self::new(Arc::default(), None)
    }
}

/// Publishes H.264/AAC frames to one RTMP session at a time.
pub struct Publisher {
    scheduler: TaskScheduler,
    factory: Box<dyn ConnectionFactory>,
    config: PublisherConfig,
    clock: Clock,
    control: Mutex<()>,
    state: ArcSwap<PublishState>,
    next_session_id: AtomicU64,
}

impl Publisher {
    pub fn new<F>(scheduler: TaskScheduler, factory: F, config: PublisherConfig) -> Self
    where
        F: ConnectionFactory + 'static,
    {
        Self {
            scheduler,
            factory: Box::new(factory),
            config,
            clock: Clock::new(),
            control: Mutex::new(()),
            state: ArcSwap::from_pointee(PublishState::default()),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Use `clock` for the pacers of sessions opened from now on.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    // ─── Control path ───────────────────────────────────────────────────

    /// Replace the media description and rebuild both sequence headers.
    ///
    /// Re-arms the keyframe gate, so the next keyframe re-sends the headers.
    pub fn set_media_info(&self, descriptor: MediaDescriptor) -> Result<Arc<ConfiguredMedia>> {
        let _guard = self.lock_control();

        let media = Arc::new(configure(descriptor)?);
        let session = self.state.load().session.clone();
        self.state
            .store(Arc::new(PublishState::new(media.clone(), session)));

        info!(
            audio = ?media.audio,
            video = ?media.video,
            channels = media.audio_channels,
            sample_rate = ?media.audio_sample_rate,
            "media configured"
        );
        Ok(media)
    }

    /// Connect to `url` and start a new session, closing any previous one.
    ///
    /// The previous session's close is queued before the connect attempt, so
    /// a failed connect leaves no session at all.
    pub fn open_url(&self, url: &str) -> Result<()> {
        let target = RtmpUrl::parse(url).inspect_err(|_| {
            info!(url, "rtmp url was illegal");
        })?;

        let _guard = self.lock_control();
        self.detach_session()?;

        let stream = self.connect(&target)?;
        let conn = self
            .factory
            .create(stream, &target, self.scheduler.clone())
            .map_err(|source| PublishError::ConnectFailed {
                target: target.authority(),
                source,
            })?;

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session::new(
            id,
            target,
            conn,
            FramePacer::with_clock(self.clock.clone()),
        ));
        schedule_handshake(&session, &self.scheduler).map_err(PublishError::EventLoop)?;

        let media = self.state.load().media.clone();
        self.state
            .store(Arc::new(PublishState::new(media, Some(session.clone()))));

        info!(session = id, url = %session.target(), "session installed");
        Ok(())
    }

    /// Queue the close of the current session, if any.
    pub fn close(&self) -> Result<()> {
        let _guard = self.lock_control();
        self.detach_session()
    }

    /// A session exists and its connection is not closed.
    ///
    /// True while the handshake is still in flight.
    pub fn is_connected(&self) -> bool {
        self.state
            .load()
            .session
            .as_ref()
            .is_some_and(|s| !s.is_closed())
    }

    /// Lifecycle state of the current session.
    pub fn session_state(&self) -> Option<SessionState> {
        self.state.load().session.as_ref().map(|s| s.state())
    }

    /// The media configuration in effect.
    pub fn media(&self) -> Arc<ConfiguredMedia> {
        self.state.load().media.clone()
    }

    /// Keyframe gate of the current snapshot.
    pub fn gate_state(&self) -> GateState {
        self.state.load().gate.state()
    }

    fn lock_control(&self) -> MutexGuard<'_, ()> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Clear the current session and queue its close. Caller holds `control`.
    fn detach_session(&self) -> Result<()> {
        let current = self.state.load_full();
        let Some(old) = current.session.clone() else {
            return Ok(());
        };

        self.state.store(Arc::new(PublishState {
            media: current.media.clone(),
            session: None,
            gate: current.gate.clone(),
        }));
        debug!(session = old.id(), "session detached");
        schedule_close(old, &self.scheduler).map_err(PublishError::EventLoop)
    }

    fn connect(&self, target: &RtmpUrl) -> Result<TcpStream> {
        let timeout = self.config.connect_timeout;
        let addrs = target
            .socket_addrs()
            .map_err(|source| PublishError::ConnectFailed {
                target: target.authority(),
                source,
            })?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    if self.config.tcp_nodelay {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!(%addr, error = %e, "TCP_NODELAY failed");
                        }
                    }
                    return Ok(stream);
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    last_err = Some(PublishError::ConnectTimeout { addr, timeout });
                }
                Err(source) => {
                    last_err = Some(PublishError::ConnectFailed {
                        target: addr.to_string(),
                        source,
                    });
                }
            }
        }

        let err = last_err.unwrap_or_else(|| PublishError::ConnectFailed {
            target: target.authority(),
            source: io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses"),
        });
        warn!(url = %target, error = %err, "connect failed");
        Err(err)
    }

    // ─── Hot path ───────────────────────────────────────────────────────

    /// Queue one H.264 access unit in Annex-B form.
    pub fn push_video_frame(&self, frame: &[u8]) -> Result<PushOutcome> {
        let state = self.state.load();
        let session = live_session(&state)?;
        if frame.len() <= MAX_REJECTED_VIDEO_LEN {
            return Err(PublishError::TooShort {
                len: frame.len(),
                min: MAX_REJECTED_VIDEO_LEN + 1,
            });
        }

        let media = &state.media;
        if !media.video_enabled() {
            return Ok(PushOutcome::Dropped(DropReason::TrackDisabled));
        }

        let gate = &state.gate;
        let keyframe = is_keyframe(frame);
        match gate.state() {
            GateState::Streaming => {}
            GateState::Opening => {
                return Ok(PushOutcome::Dropped(DropReason::AwaitingKeyframe));
            }
            from @ (GateState::Closed | GateState::Pending) => {
                if !keyframe || !gate.begin_open(from) {
                    debug!(session = session.id(), "frame before keyframe dropped");
                    return Ok(PushOutcome::Dropped(DropReason::AwaitingKeyframe));
                }
                session.pacer().reset();
                let mut headers = vec![(Track::Video, 0, media.avc_sequence_header().clone())];
                if media.audio_enabled() {
                    headers.push((Track::Audio, 0, media.aac_sequence_header().clone()));
                }
                self.queue_headers(session, gate, from, headers)?;
                info!(session = session.id(), "keyframe received, stream open");
            }
        }

        let timestamp = session.pacer().elapsed_ms();
        let payload = build_video_tag(frame, keyframe, self.config.nal_framing);
        schedule_send(session, &self.scheduler, Track::Video, timestamp, payload)
            .map_err(PublishError::EventLoop)?;
        Ok(PushOutcome::Scheduled { timestamp })
    }

    /// Queue one raw AAC frame (no ADTS header).
    pub fn push_audio_frame(&self, frame: &[u8]) -> Result<PushOutcome> {
        let state = self.state.load();
        let session = live_session(&state)?;
        if frame.is_empty() {
            return Err(PublishError::TooShort { len: 0, min: 1 });
        }

        let media = &state.media;
        if !media.audio_enabled() {
            return Ok(PushOutcome::Dropped(DropReason::TrackDisabled));
        }

        let gate = &state.gate;
        match gate.state() {
            GateState::Streaming => {}
            GateState::Pending if !media.video_enabled() && gate.begin_open(GateState::Pending) => {
                session.pacer().reset();
                let headers = vec![(Track::Audio, 0, media.aac_sequence_header().clone())];
                self.queue_headers(session, gate, GateState::Pending, headers)?;
                info!(session = session.id(), "audio-only stream open");
            }
            _ => return Ok(PushOutcome::Dropped(DropReason::AwaitingKeyframe)),
        }

        let timestamp = session.pacer().elapsed_ms();
        let payload = build_audio_tag(media.audio_tag(), frame);
        schedule_send(session, &self.scheduler, Track::Audio, timestamp, payload)
            .map_err(PublishError::EventLoop)?;
        Ok(PushOutcome::Scheduled { timestamp })
    }

    /// Queue the sequence headers of a gate-open event won from `from`.
    fn queue_headers(
        &self,
        session: &Arc<Session>,
        gate: &KeyframeGate,
        from: GateState,
        headers: Vec<(Track, u64, Bytes)>,
    ) -> Result<()> {
        match schedule_sends(session, &self.scheduler, headers) {
            Ok(()) => {
                gate.finish_open();
                Ok(())
            }
            Err(e) => {
                gate.abort_open(from);
                Err(PublishError::EventLoop(e))
            }
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        if let Err(e) = self.detach_session() {
            debug!(error = %e, "close on drop not queued");
        }
    }
}

fn live_session(state: &PublishState) -> Result<&Arc<Session>> {
    match &state.session {
        Some(session) if !session.is_closed() => Ok(session),
        _ => Err(PublishError::NotConnected),
    }
}
