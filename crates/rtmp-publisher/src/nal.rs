//! # NAL Unit Inspection
//!
//! Keyframe detection and Annex-B splitting for H.264 elementary streams.
//!
//! Frames arrive from encoders in Annex-B form: each NAL unit is preceded by
//! a `00 00 01` or `00 00 00 01` start code. All functions here bounds-check
//! before indexing, so truncated or garbage input yields `None`/`false`
//! instead of a panic.

/// Shortest buffer that can be inspected for a NAL type: a 4-byte start code
/// plus the NAL header byte.
pub const MIN_INSPECT_LEN: usize = 5;

/// H.264 `nal_unit_type` for a coded slice of an IDR picture.
pub const NAL_TYPE_IDR: u8 = 5;

/// H.264 `nal_unit_type` for a sequence parameter set.
pub const NAL_TYPE_SPS: u8 = 7;

/// Length of the start code at the beginning of `data`, if any.
#[inline]
pub fn start_code_len(data: &[u8]) -> Option<usize> {
    match data {
        [0x00, 0x00, 0x01, ..] => Some(3),
        [0x00, 0x00, 0x00, 0x01, ..] => Some(4),
        _ => None,
    }
}

/// NAL unit type of the unit following the leading start code.
///
/// Returns `None` if the buffer is shorter than [`MIN_INSPECT_LEN`] or does
/// not begin with a start code.
pub fn nal_unit_type(data: &[u8]) -> Option<u8> {
    if data.len() < MIN_INSPECT_LEN {
        return None;
    }
    let sc = start_code_len(data)?;
    data.get(sc).map(|header| header & 0x1F)
}

/// Whether the frame starts with an IDR slice or an SPS.
///
/// Encoders emit SPS/PPS immediately before every IDR, so an access unit
/// starting with an SPS is treated as a keyframe too.
pub fn is_keyframe(data: &[u8]) -> bool {
    matches!(nal_unit_type(data), Some(NAL_TYPE_IDR | NAL_TYPE_SPS))
}

/// Split an Annex-B buffer into NAL unit bodies with start codes removed.
///
/// A buffer that does not begin with a start code is returned as a single
/// unit. Zero bytes in front of a start code or at the end of the buffer
/// (`trailing_zero_8bits`) belong to no unit, so empty units are skipped.
/// Emulation-prevention bytes (`00 00 03`) stay inside their unit.
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let Some(first) = start_code_len(data) else {
        return if data.is_empty() { Vec::new() } else { vec![data] };
    };

    let mut units = Vec::new();
    let mut unit_start = first;
    let mut i = first;

    while i + 2 < data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x01 {
            let unit_end = trim_trailing_zeros(data, unit_start, i);
            if unit_end > unit_start {
                units.push(&data[unit_start..unit_end]);
            }
            i += 3;
            unit_start = i;
        } else {
            i += 1;
        }
    }

    let unit_end = trim_trailing_zeros(data, unit_start, data.len());
    if unit_end > unit_start {
        units.push(&data[unit_start..unit_end]);
    }
    units
}

fn trim_trailing_zeros(data: &[u8], start: usize, mut end: usize) -> usize {
    while end > start && data[end - 1] == 0x00 {
        end -= 1;
    }
    end
}
