//! # rtmp-publisher
//!
//! Prepares H.264 and AAC frames for an RTMP publish session and paces them
//! onto a single event-loop thread.
//!
//! The RTMP connection itself (handshake, chunk streams, AMF) is supplied by
//! the caller through [`Connection`] / [`ConnectionFactory`]. This crate owns
//! everything between the encoder and that connection: sequence headers, the
//! keyframe gate, FLV tag framing, the shared timestamp clock and the
//! hand-off of sessions across reconnects.
//!
//! ## Crate structure
//!
//! - [`codec`]: FLV codec ids, AAC sampling-frequency table
//! - [`nal`]: Annex-B keyframe detection and NAL splitting
//! - [`media`]: AAC / AVC sequence-header construction
//! - [`pacer`]: Shared millisecond clock per session
//! - [`dispatch`]: Keyframe gate, per-frame tag builders
//! - [`session`]: Connection traits and session lifecycle
//! - [`event_loop`]: FIFO deferred-task thread
//! - [`url`]: `rtmp://` URL parsing
//! - [`config`]: Publisher configuration
//! - [`publisher`]: The caller-facing [`Publisher`]
//!
//! ## Example
//!
//! ```no_run
//! # use rtmp_publisher::*;
//! # fn factory() -> impl ConnectionFactory { |_: std::net::TcpStream, _: &RtmpUrl, _: TaskScheduler| -> std::io::Result<std::sync::Arc<dyn Connection>> { unimplemented!() } }
//! # fn main() -> anyhow::Result<()> {
//! let event_loop = EventLoop::new()?;
//! let publisher = Publisher::new(event_loop.scheduler(), factory(), PublisherConfig::default());
//!
//! let sps = vec![0x67, 0x42, 0x00, 0x1F, 0xE9];
//! let pps = vec![0x68, 0xCE, 0x06, 0xE2];
//! publisher.set_media_info(MediaDescriptor::new().with_aac(vec![0x12, 0x10]).with_h264(sps, pps))?;
//! publisher.open_url("rtmp://127.0.0.1/live/stream")?;
//!
//! publisher.push_video_frame(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00])?;
//! publisher.push_audio_frame(&[0x21, 0x10, 0x04, 0x60])?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event_loop;
pub mod media;
pub mod nal;
pub mod pacer;
pub mod publisher;
pub mod session;
pub mod url;

pub use config::{NalFraming, PublisherConfig};
pub use error::{ConfigError, PublishError};
pub use event_loop::{EventLoop, TaskScheduler};
pub use media::{ConfiguredMedia, MediaDescriptor, TrackStatus};
pub use publisher::{DropReason, PushOutcome, Publisher};
pub use session::{Connection, ConnectionFactory, SessionState, SocketHandle, Track};
pub use url::RtmpUrl;
