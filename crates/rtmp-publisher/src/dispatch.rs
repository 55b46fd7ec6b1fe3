//! # Frame Dispatch
//!
//! The keyframe gate and the per-frame tag builders used by
//! [`Publisher::push_video_frame`](crate::Publisher::push_video_frame) and
//! [`Publisher::push_audio_frame`](crate::Publisher::push_audio_frame).
//!
//! ## Video tag (5 + NAL data bytes)
//!
//! ```text
//! +---------------+------+----------+----------------------------+
//! | 0x17 / 0x27   | 0x01 | 00 00 00 | len32 NAL [len32 NAL ...]  |
//! +---------------+------+----------+----------------------------+
//!   key / inter    NALU   cts
//! ```
//!
//! ## Audio tag (2 + frame bytes)
//!
//! ```text
//! +-----------+------+----------------+
//! | audio tag | 0x01 | raw AAC frame  |
//! +-----------+------+----------------+
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::NalFraming;
use crate::media::{VIDEO_TAG_INTER, VIDEO_TAG_KEYFRAME};
use crate::nal::split_annex_b;

/// Video frames must be strictly longer than this.
pub const MAX_REJECTED_VIDEO_LEN: usize = 5;

/// Fixed bytes before the NAL data in a video tag.
pub const VIDEO_TAG_HEADER_LEN: usize = 5;

/// `AVCPacketType` for coded NAL units.
pub const AVC_PACKET_TYPE_NALU: u8 = 1;

/// `AACPacketType` for raw frames.
pub const AAC_PACKET_TYPE_RAW: u8 = 1;

// ─── Keyframe Gate ──────────────────────────────────────────────────────────

/// Gate position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GateState {
    /// Waiting for a keyframe; nothing is forwarded.
    Closed = 0,
    /// No video to wait for, but the sequence headers are still owed.
    Pending = 1,
    /// One pusher won the gate and is scheduling the sequence headers.
    Opening = 2,
    /// Headers scheduled; media flows.
    Streaming = 3,
}

/// Whether media may flow, shared by the video and audio push paths.
///
/// One gate belongs to one media configuration on one session; a new
/// configuration or session gets a new gate.
///
/// The pusher that moves the gate into `Opening` owns the gate-open event:
/// it resets the pacer and schedules the sequence headers before publishing
/// `Streaming`, so no frame from another thread can be queued ahead of them.
#[derive(Debug)]
pub struct KeyframeGate(AtomicU8);

impl KeyframeGate {
    pub fn new(video_enabled: bool) -> Self {
        Self(AtomicU8::new(Self::initial(video_enabled) as u8))
    }

    pub fn state(&self) -> GateState {
        match self.0.load(Ordering::Acquire) {
            0 => GateState::Closed,
            1 => GateState::Pending,
            2 => GateState::Opening,
            _ => GateState::Streaming,
        }
    }

    /// `from → Opening`. Returns true for the single winner.
    pub fn begin_open(&self, from: GateState) -> bool {
        from != GateState::Opening
            && from != GateState::Streaming
            && self
                .0
                .compare_exchange(
                    from as u8,
                    GateState::Opening as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
    }

    /// `Opening → Streaming` once the headers are queued.
    pub fn finish_open(&self) {
        let _ = self.0.compare_exchange(
            GateState::Opening as u8,
            GateState::Streaming as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// `Opening → from` when the headers could not be queued.
    pub fn abort_open(&self, from: GateState) {
        let _ = self.0.compare_exchange(
            GateState::Opening as u8,
            from as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// `Closed` when there is video to wait for, otherwise `Pending`.
    fn initial(video_enabled: bool) -> GateState {
        if video_enabled {
            GateState::Closed
        } else {
            GateState::Pending
        }
    }
}

// ─── Tag builders ───────────────────────────────────────────────────────────

/// Build the video tag body for one access unit.
pub fn build_video_tag(frame: &[u8], keyframe: bool, framing: NalFraming) -> Bytes {
    let mut buf = BytesMut::with_capacity(VIDEO_TAG_HEADER_LEN + 4 + frame.len());
    buf.put_u8(if keyframe {
        VIDEO_TAG_KEYFRAME
    } else {
        VIDEO_TAG_INTER
    });
    buf.put_u8(AVC_PACKET_TYPE_NALU);
    buf.put_slice(&[0, 0, 0]); // composition time

    match framing {
        NalFraming::Verbatim => {
            buf.put_u32(frame.len() as u32);
            buf.put_slice(frame);
        }
        NalFraming::LengthPrefixed => {
            for unit in split_annex_b(frame) {
                buf.put_u32(unit.len() as u32);
                buf.put_slice(unit);
            }
        }
    }
    buf.freeze()
}

/// Build the audio tag body for one raw AAC frame.
pub fn build_audio_tag(audio_tag: u8, frame: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + frame.len());
    buf.put_u8(audio_tag);
    buf.put_u8(AAC_PACKET_TYPE_RAW);
    buf.put_slice(frame);
    buf.freeze()
}
