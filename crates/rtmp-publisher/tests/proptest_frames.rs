//! Property-based tests for frame inspection and tag framing.
//!
//! Encoders hand over arbitrary bytes; none of these paths may panic on them,
//! and keyframe detection must agree with a direct reading of the NAL header.
//! Pacer timestamps must never run backwards between resets.

use std::time::Duration;

use bytes::Buf;
use proptest::prelude::*;
use quanta::Clock;
use rtmp_publisher::config::NalFraming;
use rtmp_publisher::dispatch::{build_audio_tag, build_video_tag};
use rtmp_publisher::nal::{is_keyframe, nal_unit_type, split_annex_b};
use rtmp_publisher::pacer::FramePacer;

/// A start code of either length.
fn start_code() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![Just(vec![0u8, 0, 1]), Just(vec![0u8, 0, 0, 1])]
}

/// One piece of a NAL body: a plain byte, a lone zero, or an
/// emulation-prevention sequence. Every piece ends in a nonzero byte, so
/// concatenations never contain a start code or end in zero.
fn body_piece() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        6 => (1u8..=0xFF).prop_map(|b| vec![b]),
        2 => (1u8..=0xFF).prop_map(|b| vec![0x00, b]),
        2 => (0u8..=3).prop_map(|b| vec![0x00, 0x00, 0x03, b + 1]),
    ]
}

/// NAL body: a nonzero header byte followed by body pieces.
fn nal_body() -> impl Strategy<Value = Vec<u8>> {
    (1u8..=0xFF, proptest::collection::vec(body_piece(), 0..24)).prop_map(|(header, pieces)| {
        let mut body = vec![header];
        body.extend(pieces.into_iter().flatten());
        body
    })
}

/// An Annex-B access unit and the NAL bodies it was built from. Units after
/// the first may carry `trailing_zero_8bits` padding, as may the whole buffer.
fn access_unit() -> impl Strategy<Value = (Vec<u8>, Vec<Vec<u8>>)> {
    (
        proptest::collection::vec((0usize..4, start_code(), nal_body()), 1..6),
        0usize..4,
    )
        .prop_map(|(parts, tail_zeros)| {
            let mut frame = Vec::new();
            let mut bodies = Vec::new();
            for (i, (zeros, sc, body)) in parts.into_iter().enumerate() {
                if i > 0 {
                    frame.extend(std::iter::repeat(0u8).take(zeros));
                }
                frame.extend_from_slice(&sc);
                frame.extend_from_slice(&body);
                bodies.push(body);
            }
            frame.extend(std::iter::repeat(0u8).take(tail_zeros));
            (frame, bodies)
        })
}

// ─── Inspection ──────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn inspection_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = nal_unit_type(&data);
        let _ = is_keyframe(&data);
        let units = split_annex_b(&data);
        let total: usize = units.iter().map(|u| u.len()).sum();
        prop_assert!(total <= data.len());
        prop_assert!(units.iter().all(|u| !u.is_empty()));
    }

    #[test]
    fn keyframe_matches_nal_header(
        sc in start_code(),
        header in any::<u8>(),
        tail in proptest::collection::vec(any::<u8>(), 0..32),
    ) {
        let mut frame = sc.clone();
        frame.push(header);
        frame.extend_from_slice(&tail);

        let expected = frame.len() >= 5 && matches!(header & 0x1F, 5 | 7);
        prop_assert_eq!(is_keyframe(&frame), expected);
    }

    #[test]
    fn no_start_code_is_never_keyframe(data in proptest::collection::vec(any::<u8>(), 0..64)) {
        prop_assume!(!data.starts_with(&[0, 0, 1]) && !data.starts_with(&[0, 0, 0, 1]));
        prop_assert!(!is_keyframe(&data));
    }

    #[test]
    fn split_recovers_nal_bodies((frame, bodies) in access_unit()) {
        let units = split_annex_b(&frame);
        let expected: Vec<&[u8]> = bodies.iter().map(|b| b.as_slice()).collect();
        prop_assert_eq!(units, expected);
    }
}

// ─── Tag framing ─────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn length_prefixed_tag_reparses((frame, bodies) in access_unit(), keyframe in any::<bool>()) {
        let tag = build_video_tag(&frame, keyframe, NalFraming::LengthPrefixed);
        prop_assert_eq!(tag[0], if keyframe { 0x17 } else { 0x27 });
        prop_assert_eq!(&tag[1..5], &[0x01, 0, 0, 0][..]);

        let mut rest = tag.slice(5..);
        let mut parsed = Vec::new();
        while rest.has_remaining() {
            prop_assert!(rest.remaining() >= 4);
            let len = rest.get_u32() as usize;
            prop_assert!(rest.remaining() >= len);
            parsed.push(rest.split_to(len).to_vec());
        }
        prop_assert_eq!(parsed, bodies);
    }

    #[test]
    fn verbatim_tag_carries_frame(
        frame in proptest::collection::vec(any::<u8>(), 6..512),
        keyframe in any::<bool>(),
    ) {
        let tag = build_video_tag(&frame, keyframe, NalFraming::Verbatim);
        prop_assert_eq!(tag.len(), 9 + frame.len());
        prop_assert_eq!(&tag[5..9], &(frame.len() as u32).to_be_bytes()[..]);
        prop_assert_eq!(&tag[9..], &frame[..]);
    }

    #[test]
    fn audio_tag_is_two_byte_header(
        audio_tag in any::<u8>(),
        frame in proptest::collection::vec(any::<u8>(), 1..512),
    ) {
        let tag = build_audio_tag(audio_tag, &frame);
        prop_assert_eq!(tag.len(), 2 + frame.len());
        prop_assert_eq!(tag[0], audio_tag);
        prop_assert_eq!(tag[1], 0x01);
        prop_assert_eq!(&tag[2..], &frame[..]);
    }
}

// ─── Pacer ───────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn pacer_is_monotonic_between_resets(
        warmup_us in 0u64..10_000_000,
        steps_us in proptest::collection::vec(0u64..100_000, 1..200),
    ) {
        let (clock, mock) = Clock::mock();
        let pacer = FramePacer::with_clock(clock);
        mock.increment(Duration::from_micros(warmup_us));
        pacer.reset();
        prop_assert_eq!(pacer.elapsed_ms(), 0);

        let mut total_us = 0u64;
        let mut last = 0u64;
        for step in steps_us {
            mock.increment(Duration::from_micros(step));
            total_us += step;
            let now = pacer.elapsed_ms();
            prop_assert!(now >= last);
            prop_assert_eq!(now, total_us / 1_000);
            last = now;
        }
    }
}
