//! # Media Configuration
//!
//! Turns codec parameters into the sequence-header tags RTMP peers expect
//! before the first frame of each track.
//!
//! ## AAC sequence header (2 + ASC bytes)
//!
//! ```text
//! +----------+------+---------------------------+
//! | tag 0xAF | 0x00 | AudioSpecificConfig ...   |
//! +----------+------+---------------------------+
//! ```
//!
//! ## AVC sequence header (11 + SPS + PPS bytes)
//!
//! ```text
//! 17 00 00 00 00 | 01 profile compat level FF | E1 len16 SPS.. | 01 len16 PPS..
//! ^frame/codec   ^ AVCDecoderConfigurationRecord
//!    ^packet type (0 = sequence header)
//!       ^composition time (24 bit)
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::codec::{sampling_frequency, CODEC_ID_AAC, CODEC_ID_H264, CODEC_ID_NONE};
use crate::error::ConfigError;

/// FLV sound-rate code. Always 3 (44 kHz) for AAC; the real rate is in the ASC.
const SOUND_RATE_CODE: u8 = 3;
/// FLV sound-size code: 16-bit samples.
const SOUND_SIZE_CODE: u8 = 1;
/// FLV sound-type code. Always 1 (stereo) for AAC.
const SOUND_TYPE_CODE: u8 = 1;

/// `AACPacketType` / `AVCPacketType` for a sequence header.
pub const PACKET_TYPE_SEQUENCE_HEADER: u8 = 0;

/// Video tag byte 0 for a keyframe carrying AVC.
pub const VIDEO_TAG_KEYFRAME: u8 = 0x17;
/// Video tag byte 0 for an inter frame carrying AVC.
pub const VIDEO_TAG_INTER: u8 = 0x27;

/// The first byte of every AAC audio tag.
pub const fn aac_audio_tag() -> u8 {
    ((CODEC_ID_AAC & 0x0F) << 4)
        | ((SOUND_RATE_CODE & 0x03) << 2)
        | ((SOUND_SIZE_CODE & 0x01) << 1)
        | (SOUND_TYPE_CODE & 0x01)
}

// ─── Descriptor ─────────────────────────────────────────────────────────────

/// Codec parameters supplied by the caller.
///
/// Each [`Publisher::set_media_info`](crate::Publisher::set_media_info) call
/// replaces the previous descriptor entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaDescriptor {
    /// 0 for no audio, [`CODEC_ID_AAC`] for AAC.
    pub audio_codec_id: u8,
    /// 0 for no video, [`CODEC_ID_H264`] for H.264.
    pub video_codec_id: u8,
    /// Raw AudioSpecificConfig.
    pub audio_specific_config: Bytes,
    /// Raw SPS NAL unit, without start code.
    pub sps: Bytes,
    /// Raw PPS NAL unit, without start code.
    pub pps: Bytes,
}

impl MediaDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an AAC track described by `asc`.
    pub fn with_aac(mut self, asc: impl Into<Bytes>) -> Self {
        self.audio_codec_id = CODEC_ID_AAC;
        self.audio_specific_config = asc.into();
        self
    }

    /// Adds an H.264 track described by its parameter sets.
    pub fn with_h264(mut self, sps: impl Into<Bytes>, pps: impl Into<Bytes>) -> Self {
        self.video_codec_id = CODEC_ID_H264;
        self.sps = sps.into();
        self.pps = pps.into();
        self
    }
}

// ─── AudioSpecificConfig ────────────────────────────────────────────────────

/// The leading fields of an MPEG-4 AudioSpecificConfig.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub object_type: u8,
    pub sampling_frequency_index: u8,
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    /// Decode the first two bytes:
    /// `object_type(5) | sampling_frequency_index(4) | channel_configuration(4) | ...`
    pub fn parse(asc: &[u8]) -> Result<Self, ConfigError> {
        let [b0, b1, ..] = *asc else {
            return Err(ConfigError::AscTooShort(asc.len()));
        };
        Ok(Self {
            object_type: b0 >> 3,
            sampling_frequency_index: ((b0 & 0x07) << 1) | ((b1 & 0x80) >> 7),
            channel_configuration: (b1 & 0x78) >> 3,
        })
    }

    /// Sample rate in Hz, or `None` for reserved/explicit indices.
    pub fn sample_rate(&self) -> Option<u32> {
        sampling_frequency(self.sampling_frequency_index)
    }
}

// ─── Track status ───────────────────────────────────────────────────────────

/// Outcome of configuring one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackStatus {
    /// Headers built, frames will be forwarded.
    Enabled,
    /// No codec or no codec parameters supplied.
    Absent,
    /// Parameters present but not usable; the track is disabled.
    Unsupported(String),
}

impl TrackStatus {
    pub fn is_enabled(&self) -> bool {
        matches!(self, TrackStatus::Enabled)
    }
}

// ─── Configured media ───────────────────────────────────────────────────────

/// Immutable result of [`configure`]: effective descriptor plus cached headers.
#[derive(Debug, Clone)]
pub struct ConfiguredMedia {
    /// Descriptor with codec ids reset to 0 for disabled tracks.
    pub descriptor: MediaDescriptor,
    pub audio: TrackStatus,
    pub video: TrackStatus,
    /// Channel configuration decoded from the ASC (0 when audio is disabled).
    pub audio_channels: u8,
    /// Sample rate decoded from the ASC.
    pub audio_sample_rate: Option<u32>,
    audio_tag: u8,
    aac_sequence_header: Bytes,
    avc_sequence_header: Bytes,
}

impl Default for ConfiguredMedia {
    fn default() -> Self {
        Self {
            descriptor: MediaDescriptor::default(),
            audio: TrackStatus::Absent,
            video: TrackStatus::Absent,
            audio_channels: 0,
            audio_sample_rate: None,
            audio_tag: 0,
            aac_sequence_header: Bytes::new(),
            avc_sequence_header: Bytes::new(),
        }
    }
}

impl ConfiguredMedia {
    pub fn audio_enabled(&self) -> bool {
        self.audio.is_enabled()
    }

    pub fn video_enabled(&self) -> bool {
        self.video.is_enabled()
    }

    /// First byte of every audio tag for this stream.
    pub fn audio_tag(&self) -> u8 {
        self.audio_tag
    }

    /// AAC sequence header tag; empty when audio is disabled.
    pub fn aac_sequence_header(&self) -> &Bytes {
        &self.aac_sequence_header
    }

    /// AVC sequence header tag; empty when video is disabled.
    pub fn avc_sequence_header(&self) -> &Bytes {
        &self.avc_sequence_header
    }
}

/// Build the sequence headers for `descriptor`.
///
/// Unusable codecs disable their track and are reported through
/// [`TrackStatus`]. Parameter sets too malformed to describe a stream at all
/// fail the call.
pub fn configure(descriptor: MediaDescriptor) -> Result<ConfiguredMedia, ConfigError> {
    let mut media = ConfiguredMedia {
        descriptor,
        ..ConfiguredMedia::default()
    };

    match media.descriptor.video_codec_id {
        CODEC_ID_NONE => {}
        CODEC_ID_H264 => {
            let d = &media.descriptor;
            if !d.sps.is_empty() && !d.pps.is_empty() {
                media.avc_sequence_header = build_avc_sequence_header(&d.sps, &d.pps)?;
                media.video = TrackStatus::Enabled;
            }
        }
        other => {
            media.video = TrackStatus::Unsupported(format!("video codec id {other}"));
        }
    }

    match media.descriptor.audio_codec_id {
        CODEC_ID_NONE => {}
        CODEC_ID_AAC if media.descriptor.audio_specific_config.is_empty() => {}
        CODEC_ID_AAC => {
            let asc = AudioSpecificConfig::parse(&media.descriptor.audio_specific_config)?;
            match asc.sample_rate() {
                Some(rate) => {
                    media.audio_tag = aac_audio_tag();
                    media.aac_sequence_header =
                        build_aac_sequence_header(&media.descriptor.audio_specific_config);
                    media.audio_channels = asc.channel_configuration;
                    media.audio_sample_rate = Some(rate);
                    media.audio = TrackStatus::Enabled;
                }
                None => {
                    media.audio = TrackStatus::Unsupported(format!(
                        "sampling frequency index {}",
                        asc.sampling_frequency_index
                    ));
                }
            }
        }
        other => {
            media.audio = TrackStatus::Unsupported(format!("audio codec id {other}"));
        }
    }

    if let TrackStatus::Unsupported(reason) = &media.video {
        warn!(%reason, "video track disabled");
    }
    if let TrackStatus::Unsupported(reason) = &media.audio {
        warn!(%reason, "audio track disabled");
    }
    if !media.video_enabled() {
        media.descriptor.video_codec_id = CODEC_ID_NONE;
    }
    if !media.audio_enabled() {
        media.descriptor.audio_codec_id = CODEC_ID_NONE;
    }

    Ok(media)
}

/// `[audio tag, 0x00] ++ asc`.
pub fn build_aac_sequence_header(asc: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + asc.len());
    buf.put_u8(aac_audio_tag());
    buf.put_u8(PACKET_TYPE_SEQUENCE_HEADER);
    buf.put_slice(asc);
    buf.freeze()
}

/// Video tag wrapping an AVCDecoderConfigurationRecord for one SPS and one PPS.
pub fn build_avc_sequence_header(sps: &[u8], pps: &[u8]) -> Result<Bytes, ConfigError> {
    let [_, profile, compatibility, level, ..] = *sps else {
        return Err(ConfigError::SpsTooShort(sps.len()));
    };
    let sps_len = parameter_set_len("SPS", sps)?;
    let pps_len = parameter_set_len("PPS", pps)?;

    let mut buf = BytesMut::with_capacity(11 + sps.len() + pps.len());
    buf.put_u8(VIDEO_TAG_KEYFRAME);
    buf.put_u8(PACKET_TYPE_SEQUENCE_HEADER);
    buf.put_slice(&[0, 0, 0]); // composition time

    buf.put_u8(0x01); // configurationVersion
    buf.put_u8(profile);
    buf.put_u8(compatibility);
    buf.put_u8(level);
    buf.put_u8(0xFF); // reserved(6) | lengthSizeMinusOne = 3

    buf.put_u8(0xE1); // reserved(3) | numOfSequenceParameterSets = 1
    buf.put_u16(sps_len);
    buf.put_slice(sps);

    buf.put_u8(0x01); // numOfPictureParameterSets
    buf.put_u16(pps_len);
    buf.put_slice(pps);

    Ok(buf.freeze())
}

fn parameter_set_len(kind: &'static str, data: &[u8]) -> Result<u16, ConfigError> {
    u16::try_from(data.len()).map_err(|_| ConfigError::ParameterSetTooLong {
        kind,
        len: data.len(),
    })
}
