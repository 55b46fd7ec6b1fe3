//! # Session Lifecycle
//!
//! Wraps the externally supplied RTMP connection with the state this crate
//! tracks for it. The state machine is:
//!
//! ```text
//!   Created ──handshake task──▶ Handshaking ──ok──▶ Open
//!      │                            │                │
//!      └────────── close task ──────┴──▶ Closing ──▶ Closed
//! ```
//!
//! Every transition happens inside a task running on the event loop; the
//! caller-facing API only enqueues those tasks.

use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::event_loop::TaskScheduler;
use crate::pacer::FramePacer;
use crate::url::RtmpUrl;

#[cfg(unix)]
pub type SocketHandle = std::os::fd::RawFd;
#[cfg(windows)]
pub type SocketHandle = std::os::windows::io::RawSocket;
#[cfg(not(any(unix, windows)))]
pub type SocketHandle = i32;

// ─── External collaborators ─────────────────────────────────────────────────

/// An RTMP connection over an established transport.
///
/// Handshake, chunking and AMF commands live behind this trait. `handshake`,
/// `close` and the sends run on the event loop thread; `is_closed` and `fd`
/// are also polled from caller threads.
pub trait Connection: Send + Sync {
    /// Runs the RTMP handshake and publish negotiation.
    fn handshake(&self) -> io::Result<()>;
    fn close(&self);
    fn is_closed(&self) -> bool;
    fn fd(&self) -> SocketHandle;
    /// Sends one video tag body (FLV `VIDEODATA`) at `timestamp` ms.
    fn send_video_data(&self, timestamp: u64, payload: Bytes) -> io::Result<()>;
    /// Sends one audio tag body (FLV `AUDIODATA`) at `timestamp` ms.
    fn send_audio_data(&self, timestamp: u64, payload: Bytes) -> io::Result<()>;
}

/// Builds a [`Connection`] on a freshly connected socket.
pub trait ConnectionFactory: Send + Sync {
    fn create(
        &self,
        stream: TcpStream,
        target: &RtmpUrl,
        scheduler: TaskScheduler,
    ) -> io::Result<Arc<dyn Connection>>;
}

impl<F> ConnectionFactory for F
where
    F: Fn(TcpStream, &RtmpUrl, TaskScheduler) -> io::Result<Arc<dyn Connection>> + Send + Sync,
{
    fn create(
        &self,
        stream: TcpStream,
        target: &RtmpUrl,
        scheduler: TaskScheduler,
    ) -> io::Result<Arc<dyn Connection>> {
        self(stream, target, scheduler)
    }
}

// ─── Session State ──────────────────────────────────────────────────────────

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Connection object built, handshake not started.
    Created = 0,
    /// Handshake task running.
    Handshaking = 1,
    /// Handshake finished.
    Open = 2,
    /// Close task running.
    Closing = 3,
    Closed = 4,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Created,
            1 => SessionState::Handshaking,
            2 => SessionState::Open,
            3 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

// ─── Session ────────────────────────────────────────────────────────────────

/// The current connection plus its timestamp clock.
///
/// Shared through `Arc`: queued tasks keep the session alive after the
/// publisher has moved on to a new one.
pub struct Session {
    id: u64,
    target: RtmpUrl,
    conn: Arc<dyn Connection>,
    pacer: FramePacer,
    state: AtomicU8,
}

impl Session {
    pub fn new(id: u64, target: RtmpUrl, conn: Arc<dyn Connection>, pacer: FramePacer) -> Self {
        Self {
            id,
            target,
            conn,
            pacer,
            state: AtomicU8::new(SessionState::Created as u8),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn target(&self) -> &RtmpUrl {
        &self.target
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn pacer(&self) -> &FramePacer {
        &self.pacer
    }

    /// Whether the connection reports itself closed.
    ///
    /// A session still handshaking is not closed.
    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_closing(&self) -> bool {
        matches!(self.state(), SessionState::Closing | SessionState::Closed)
    }

    /// Event-loop side of the handshake.
    fn run_handshake(&self) {
        if !self.transition(SessionState::Created, SessionState::Handshaking) {
            debug!(session = self.id, state = ?self.state(), "handshake skipped");
            return;
        }
        match self.conn.handshake() {
            Ok(()) => {
                if self.transition(SessionState::Handshaking, SessionState::Open) {
                    info!(session = self.id, url = %self.target, "session open");
                }
            }
            Err(e) => {
                warn!(session = self.id, url = %self.target, error = %e, "handshake failed");
                self.conn.close();
                self.state
                    .store(SessionState::Closed as u8, Ordering::Release);
            }
        }
    }

    /// Event-loop side of close.
    fn run_close(&self) {
        self.state
            .store(SessionState::Closing as u8, Ordering::Release);
        debug!(session = self.id, fd = self.conn.fd(), "closing session");
        self.conn.close();
        self.state
            .store(SessionState::Closed as u8, Ordering::Release);
        info!(session = self.id, url = %self.target, "session closed");
    }

    fn run_send(&self, track: Track, timestamp: u64, payload: Bytes) {
        if self.is_closing() {
            debug!(session = self.id, ?track, timestamp, "send after close dropped");
            return;
        }
        let result = match track {
            Track::Video => self.conn.send_video_data(timestamp, payload),
            Track::Audio => self.conn.send_audio_data(timestamp, payload),
        };
        if let Err(e) = result {
            warn!(session = self.id, ?track, timestamp, error = %e, "send failed");
        }
    }
}

/// Which connection send method a payload goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Video,
    Audio,
}

// ─── Deferred operations ────────────────────────────────────────────────────

/// Queue the handshake of `session` on the event loop.
pub fn schedule_handshake(session: &Arc<Session>, scheduler: &TaskScheduler) -> anyhow::Result<()> {
    let session = session.clone();
    scheduler.add_trigger_event(move || session.run_handshake())
}

/// Queue the close of `session` on the event loop.
///
/// The task owns its own reference, so the session outlives whichever field
/// held it when this was called.
pub fn schedule_close(session: Arc<Session>, scheduler: &TaskScheduler) -> anyhow::Result<()> {
    scheduler.add_trigger_event(move || session.run_close())
}

/// Queue `(timestamp, payload)` sends in order as a single task.
pub fn schedule_sends(
    session: &Arc<Session>,
    scheduler: &TaskScheduler,
    sends: Vec<(Track, u64, Bytes)>,
) -> anyhow::Result<()> {
    let session = session.clone();
    scheduler.add_trigger_event(move || {
        for (track, timestamp, payload) in sends {
            session.run_send(track, timestamp, payload);
        }
    })
}

/// Queue a single send.
pub fn schedule_send(
    session: &Arc<Session>,
    scheduler: &TaskScheduler,
    track: Track,
    timestamp: u64,
    payload: Bytes,
) -> anyhow::Result<()> {
    let session = session.clone();
    scheduler.add_trigger_event(move || session.run_send(track, timestamp, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoop;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeConn {
        closed: AtomicBool,
        fail_handshake: bool,
        sent: Mutex<Vec<(Track, u64, Bytes)>>,
    }

    impl Connection for FakeConn {
        fn handshake(&self) -> io::Result<()> {
            if self.fail_handshake {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            } else {
                Ok(())
            }
        }
        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
        fn fd(&self) -> SocketHandle {
            0 as SocketHandle
        }
        fn send_video_data(&self, timestamp: u64, payload: Bytes) -> io::Result<()> {
            self.sent.lock().unwrap().push((Track::Video, timestamp, payload));
            Ok(())
        }
        fn send_audio_data(&self, timestamp: u64, payload: Bytes) -> io::Result<()> {
            self.sent.lock().unwrap().push((Track::Audio, timestamp, payload));
            Ok(())
        }
    }

    fn session(conn: Arc<FakeConn>) -> Arc<Session> {
        let target = RtmpUrl::parse("rtmp://127.0.0.1/live/test").unwrap();
        Arc::new(Session::new(1, target, conn, FramePacer::new()))
    }

    #[test]
    fn handshake_moves_to_open() {
        let ev = EventLoop::new().unwrap();
        let s = session(Arc::new(FakeConn::default()));
        assert_eq!(s.state(), SessionState::Created);
        schedule_handshake(&s, &ev.scheduler()).unwrap();
        ev.drain().unwrap();
        assert_eq!(s.state(), SessionState::Open);
        assert!(!s.is_closed());
    }

    #[test]
    fn failed_handshake_closes() {
        let ev = EventLoop::new().unwrap();
        let conn = Arc::new(FakeConn {
            fail_handshake: true,
            ..FakeConn::default()
        });
        let s = session(conn.clone());
        schedule_handshake(&s, &ev.scheduler()).unwrap();
        ev.drain().unwrap();
        assert_eq!(s.state(), SessionState::Closed);
        assert!(conn.is_closed());
    }

    #[test]
    fn close_runs_after_queued_sends() {
        let ev = EventLoop::new().unwrap();
        let conn = Arc::new(FakeConn::default());
        let s = session(conn.clone());
        let scheduler = ev.scheduler();
        for ts in 0..3 {
            schedule_send(&s, &scheduler, Track::Video, ts, Bytes::from_static(b"v")).unwrap();
        }
        schedule_close(s.clone(), &scheduler).unwrap();
        schedule_send(&s, &scheduler, Track::Audio, 9, Bytes::from_static(b"a")).unwrap();
        ev.drain().unwrap();

        let sent = conn.sent.lock().unwrap();
        assert_eq!(sent.len(), 3, "send queued after close must be dropped");
        assert!(sent.iter().all(|(track, _, _)| *track == Track::Video));
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[test]
    fn close_task_keeps_session_alive() {
        let ev = EventLoop::new().unwrap();
        let conn = Arc::new(FakeConn::default());
        let s = session(conn.clone());
        let blocker = Arc::new(Mutex::new(()));
        let guard = blocker.lock().unwrap();
        {
            let blocker = blocker.clone();
            ev.add_trigger_event(move || drop(blocker.lock().unwrap()))
                .unwrap();
        }
        schedule_close(s, &ev.scheduler()).unwrap();
        drop(guard);
        ev.drain().unwrap();
        assert!(conn.is_closed());
    }

    #[test]
    fn close_before_handshake_skips_handshake() {
        let ev = EventLoop::new().unwrap();
        let s = session(Arc::new(FakeConn::default()));
        let scheduler = ev.scheduler();
        schedule_close(s.clone(), &scheduler).unwrap();
        schedule_handshake(&s, &scheduler).unwrap();
        ev.drain().unwrap();
        assert_eq!(s.state(), SessionState::Closed);
    }
}
