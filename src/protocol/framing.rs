//! framing.rs
//! Decodes the producer's length-prefixed byte stream into discrete payloads.
//! - wire format: `<ascii-decimal-length>:<payload-bytes>` repeated, length counts payload bytes only
//! - prefix-safe: a partial frame stays buffered until complete, never emitted early
//! - corrupt length field: the whole accumulated buffer is discarded (no resync)
//! - declared lengths above `max_frame_len` are rejected so the caller can disconnect

use crate::error::FramingError;

/// A length field longer than this can never fit in a `usize`.
const MAX_LENGTH_DIGITS: usize = 20;

/// Accumulating byte cursor + frame extractor.
/// Owned exclusively by the receive loop; never shared across threads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_len: Option<usize>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_len: Some(max_frame_len),
        }
    }

    /// Appends freshly read bytes to the cursor.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes received but not yet consumed by a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Extracts the next complete payload, if any.
    ///
    /// `Ok(None)` means more bytes are needed. On `Err` the buffer has already
    /// been discarded; the decoder stays usable for subsequent bytes.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FramingError> {
        let colon = match self.buffer.iter().position(|&b| b == b':') {
            Some(idx) => idx,
            None => {
                // No separator yet: the partial length field must still look valid.
                if self.buffer.len() > MAX_LENGTH_DIGITS
                    || self.buffer.iter().any(|b| !b.is_ascii_digit())
                {
                    return Err(self.discard_invalid(self.buffer.len()));
                }
                return Ok(None);
            }
        };

        let declared = match parse_length(&self.buffer[..colon]) {
            Some(len) => len,
            None => return Err(self.discard_invalid(colon)),
        };

        if let Some(max) = self.max_frame_len {
            if declared > max {
                self.buffer.clear();
                return Err(FramingError::FrameTooLarge { declared, max });
            }
        }

        let end = match (colon + 1).checked_add(declared) {
            Some(end) => end,
            None => return Err(self.discard_invalid(colon)),
        };
        if self.buffer.len() < end {
            return Ok(None);
        }

        let payload = self.buffer[colon + 1..end].to_vec();
        self.buffer.drain(..end);
        Ok(Some(payload))
    }

    /// Drains every complete frame currently buffered.
    /// Restartable: call again after the next `push`.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { decoder: self }
    }

    fn discard_invalid(&mut self, field_end: usize) -> FramingError {
        let field = String::from_utf8_lossy(&self.buffer[..field_end]).into_owned();
        self.buffer.clear();
        FramingError::InvalidLength { field }
    }
}

/// Iterator over complete payloads; ends when more bytes are needed.
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Result<Vec<u8>, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_frame().transpose()
    }
}

fn parse_length(field: &[u8]) -> Option<usize> {
    if field.is_empty() || field.len() > MAX_LENGTH_DIGITS || !field.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(field).ok()?.parse().ok()
}

/// Encodes one payload in the wire format. Used by producers and test harnesses.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + MAX_LENGTH_DIGITS + 1);
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn collect(decoder: &mut FrameDecoder) -> Vec<Vec<u8>> {
        decoder
            .frames()
            .collect::<Result<Vec<_>, _>>()
            .expect("no framing errors expected")
    }

    #[test]
    fn several_frames_in_one_read() {
        let mut decoder = FrameDecoder::new();
        let mut bytes = encode_frame(b"alpha");
        bytes.extend(encode_frame(b"{}"));
        bytes.extend(encode_frame(b"gamma"));
        decoder.push(&bytes);

        assert_eq!(collect(&mut decoder), vec![b"alpha".to_vec(), b"{}".to_vec(), b"gamma".to_vec()]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn frame_spanning_reads_is_emitted_once_complete() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"11:hello");
        assert!(collect(&mut decoder).is_empty());
        decoder.push(b" world3:a");
        assert_eq!(collect(&mut decoder), vec![b"hello world".to_vec()]);
        assert_eq!(decoder.buffered(), 3);
        decoder.push(b"bc");
        assert_eq!(collect(&mut decoder), vec![b"abc".to_vec()]);
    }

    #[test]
    fn length_prefix_counts_utf8_bytes() {
        let payload = "{\"label\":\"é🙂\"}";
        assert_ne!(payload.len(), payload.chars().count());

        let wire = encode_frame(payload.as_bytes());
        let prefix = format!("{}:", payload.len());
        assert!(wire.starts_with(prefix.as_bytes()));
        assert_eq!(wire.len(), prefix.len() + payload.len());
    }

    #[test]
    fn split_inside_multibyte_sequence_is_reassembled() {
        let payload = "{\"label\":\"é🙂\"}".as_bytes();
        let wire = encode_frame(payload);
        // Cut after the first byte of the four-byte emoji.
        let emoji_start = wire.len() - "🙂\"}".len();
        let (first, rest) = wire.split_at(emoji_start + 1);

        let mut decoder = FrameDecoder::new();
        decoder.push(first);
        assert!(collect(&mut decoder).is_empty());
        decoder.push(rest);
        let frames = collect(&mut decoder);
        assert_eq!(frames, vec![payload.to_vec()]);
        assert_eq!(std::str::from_utf8(&frames[0]).unwrap(), "{\"label\":\"é🙂\"}");
    }

    #[test]
    fn byte_at_a_time_never_emits_early() {
        let payload = br#"{"head_position":{"normalized_x":0.1,"normalized_y":0.9}}"#;
        let wire = encode_frame(payload);
        let mut decoder = FrameDecoder::new();
        let mut emitted = Vec::new();

        for (i, byte) in wire.iter().enumerate() {
            decoder.push(std::slice::from_ref(byte));
            let frames = collect(&mut decoder);
            if i + 1 < wire.len() {
                assert!(frames.is_empty(), "premature frame at byte {}", i);
            }
            emitted.extend(frames);
        }

        assert_eq!(emitted, vec![payload.to_vec()]);
    }

    #[test]
    fn arbitrary_read_boundaries_reassemble_in_order() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let payloads: Vec<Vec<u8>> = (0..200)
            .map(|i| {
                let len = rng.random_range(0..300);
                (0..len).map(|j| b'a' + ((i + j) % 26) as u8).collect()
            })
            .collect();
        let wire: Vec<u8> = payloads.iter().flat_map(|p| encode_frame(p)).collect();

        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < wire.len() {
            let step = rng.random_range(1..=64).min(wire.len() - pos);
            decoder.push(&wire[pos..pos + step]);
            out.extend(collect(&mut decoder));
            pos += step;
        }

        assert_eq!(out, payloads);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn zero_length_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"0:2:ok");
        assert_eq!(collect(&mut decoder), vec![Vec::new(), b"ok".to_vec()]);
    }

    #[test]
    fn corrupt_length_discards_buffer_and_recovers_on_next_read() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"abc:xyz");
        let results: Vec<_> = decoder.frames().collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(&results[0], Err(FramingError::InvalidLength { .. })));
        assert_eq!(decoder.buffered(), 0);

        decoder.push(&encode_frame(b"valid"));
        assert_eq!(collect(&mut decoder), vec![b"valid".to_vec()]);
    }

    #[test]
    fn corrupt_length_in_same_read_loses_trailing_frame() {
        let mut decoder = FrameDecoder::new();
        let mut bytes = b"abc:xyz".to_vec();
        bytes.extend(encode_frame(b"valid"));
        decoder.push(&bytes);

        let results: Vec<_> = decoder.frames().collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn non_digit_prefix_is_rejected_before_separator() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"1x");
        match decoder.next_frame() {
            Err(FramingError::InvalidLength { field }) => assert_eq!(field, "1x"),
            other => panic!("expected invalid length, got {:?}", other),
        }
        decoder.push(b"12");
        assert_eq!(decoder.next_frame(), Ok(None));
    }

    #[test]
    fn negative_length_is_corrupt() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"-1:x");
        assert!(matches!(decoder.next_frame(), Err(FramingError::InvalidLength { .. })));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut decoder = FrameDecoder::with_max_frame_len(8);
        decoder.push(b"9:");
        assert_eq!(
            decoder.next_frame(),
            Err(FramingError::FrameTooLarge { declared: 9, max: 8 })
        );
        assert_eq!(decoder.buffered(), 0);

        decoder.push(b"8:12345678");
        assert_eq!(decoder.next_frame(), Ok(Some(b"12345678".to_vec())));
    }
}
