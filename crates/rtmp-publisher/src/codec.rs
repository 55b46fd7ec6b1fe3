//! # Codec Tables
//!
//! FLV codec identifiers and the AAC sampling-frequency table
//! (ISO/IEC 14496-3, Table 1.18).

/// FLV `SoundFormat` for AAC.
pub const CODEC_ID_AAC: u8 = 10;

/// FLV video `CodecID` for AVC / H.264.
pub const CODEC_ID_H264: u8 = 7;

/// Codec id meaning "no track".
pub const CODEC_ID_NONE: u8 = 0;

/// Sampling rates indexed by `samplingFrequencyIndex`.
///
/// Indices 13 and 14 are reserved and 15 means "explicit 24-bit rate follows",
/// so they have no entry here.
pub const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Look up the sample rate for an AAC `samplingFrequencyIndex`.
///
/// Returns `None` for indices without a tabulated rate (13..=15 and beyond).
#[inline]
pub fn sampling_frequency(index: u8) -> Option<u32> {
    SAMPLING_FREQUENCIES.get(index as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_indices_0_to_12() {
        assert_eq!(sampling_frequency(0), Some(96000));
        assert_eq!(sampling_frequency(3), Some(48000));
        assert_eq!(sampling_frequency(4), Some(44100));
        assert_eq!(sampling_frequency(12), Some(7350));
    }

    #[test]
    fn reserved_and_explicit_indices_are_unresolved() {
        for idx in 13..=15 {
            assert_eq!(sampling_frequency(idx), None, "index {idx}");
        }
    }
}
