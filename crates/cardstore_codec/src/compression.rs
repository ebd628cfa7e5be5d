//! Dictionary-substitution text compression with self-describing tags.
//!
//! ## Algorithm
//!
//! The encoder scans the input, growing a string → code dictionary as it
//! goes (LZW style). It emits a code for the longest dictionary match and
//! adds that match extended by the next character as a new entry. A
//! character seen for the first time is emitted as a literal and becomes a
//! single-character entry. The decoder rebuilds the identical dictionary
//! from the code stream alone, so no dictionary is ever stored.
//!
//! Codes 0 and 1 are reserved for "literal follows" and "end of stream".
//! Every code is written with just enough bits to hold the largest code the
//! decoder can see at that point, so the width grows with the dictionary.
//! The bit stream is stored as unpadded standard base64.
//!
//! ## Stored format
//!
//! ```text
//! C:<base64 code stream>   compressed
//! R:<text>                 stored raw
//! <text>                   untagged legacy value, treated as raw
//! ```

use crate::error::{CodecError, CodecResult};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::warn;

/// Tag prefix of compressed values.
pub const COMPRESSED_TAG: &str = "C:";
/// Tag prefix of values stored uncompressed.
pub const RAW_TAG: &str = "R:";

const LITERAL: u32 = 0;
const END: u32 = 1;
const FIRST_CODE: u32 = 2;
/// Bits per literal: enough for any Unicode scalar value.
const LITERAL_BITS: u32 = 21;

/// When stored values are compressed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionPolicy {
    /// Whether compression is attempted at all.
    pub enabled: bool,
    /// Minimum fraction of bytes the compressed form must save to be kept.
    pub min_savings: f64,
    /// Inputs shorter than this many bytes are always stored raw.
    pub min_input_len: usize,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_savings: 0.10,
            min_input_len: 64,
        }
    }
}

impl CompressionPolicy {
    /// A policy that never compresses.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            min_savings: 0.10,
            min_input_len: 64,
        }
    }
}

/// How a stored value is encoded, as indicated by its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// `C:` prefix.
    Compressed,
    /// `R:` prefix.
    Raw,
    /// No recognized prefix; a value written before tagging existed.
    Untagged,
}

/// Returns the encoding a stored value claims.
#[must_use]
pub fn encoding_of(stored: &str) -> Encoding {
    if stored.starts_with(COMPRESSED_TAG) {
        Encoding::Compressed
    } else if stored.starts_with(RAW_TAG) {
        Encoding::Raw
    } else {
        Encoding::Untagged
    }
}

/// Encodes text for storage according to `policy`, always tagging it.
///
/// The compressed form is kept only if it is at least
/// `policy.min_savings` smaller than the input.
#[must_use]
pub fn encode_value(text: &str, policy: &CompressionPolicy) -> String {
    if policy.enabled && text.len() >= policy.min_input_len {
        let compressed = compress(text);
        let budget = text.len() as f64 * (1.0 - policy.min_savings);
        if (compressed.len() as f64) <= budget {
            return format!("{COMPRESSED_TAG}{compressed}");
        }
    }
    format!("{RAW_TAG}{text}")
}

/// Decodes a stored value, failing if a compressed payload is corrupt.
///
/// # Errors
///
/// Returns an error if the value is tagged compressed but its payload
/// cannot be decompressed.
pub fn try_decode_value(stored: &str) -> CodecResult<Cow<'_, str>> {
    if let Some(payload) = stored.strip_prefix(COMPRESSED_TAG) {
        decompress(payload).map(Cow::Owned)
    } else if let Some(raw) = stored.strip_prefix(RAW_TAG) {
        Ok(Cow::Borrowed(raw))
    } else {
        Ok(Cow::Borrowed(stored))
    }
}

/// Decodes a stored value, degrading to the stored text on failure.
///
/// A corrupt compressed payload is logged and returned as-is rather than
/// propagated; downstream parsing then reports it.
#[must_use]
pub fn decode_value(stored: &str) -> Cow<'_, str> {
    match try_decode_value(stored) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, len = stored.len(), "decompression failed, returning stored text");
            Cow::Borrowed(stored)
        }
    }
}

/// Number of bits needed to write any code in `0..=max_code`.
fn width_for(max_code: u32) -> u32 {
    (u32::BITS - max_code.leading_zeros()).max(1)
}

/// Compresses `input` into an unpadded base64 code stream.
#[must_use]
pub fn compress(input: &str) -> String {
    let mut dict: HashMap<String, u32> = HashMap::new();
    let mut next_code = FIRST_CODE;
    // An entry was added right after the last emitted code; the decoder
    // only adds it once it reads the following code.
    let mut lagging = false;
    let mut writer = BitWriter::default();
    let mut w = String::new();

    let emit = |writer: &mut BitWriter, code: u32, next_code: u32, lagging: bool| {
        let decoder_next = next_code - u32::from(lagging);
        writer.write(code, width_for(decoder_next));
    };

    for c in input.chars() {
        let mut single = [0u8; 4];
        let single: &str = c.encode_utf8(&mut single);

        if !dict.contains_key(single) {
            if !w.is_empty() {
                emit(&mut writer, dict[&w], next_code, lagging);
                w.clear();
            }
            lagging = false;
            emit(&mut writer, LITERAL, next_code, lagging);
            writer.write(u32::from(c), LITERAL_BITS);
            dict.insert(single.to_string(), next_code);
            next_code += 1;
            continue;
        }

        if w.is_empty() {
            w.push(c);
            continue;
        }

        let mut wc = String::with_capacity(w.len() + c.len_utf8());
        wc.push_str(&w);
        wc.push(c);
        if dict.contains_key(&wc) {
            w = wc;
        } else {
            emit(&mut writer, dict[&w], next_code, lagging);
            dict.insert(wc, next_code);
            next_code += 1;
            lagging = true;
            w.clear();
            w.push(c);
        }
    }

    if !w.is_empty() {
        emit(&mut writer, dict[&w], next_code, lagging);
        lagging = false;
    }
    emit(&mut writer, END, next_code, lagging);

    STANDARD_NO_PAD.encode(writer.finish())
}

/// Decompresses a code stream produced by [`compress`].
///
/// # Errors
///
/// Returns an error if the payload is not base64, ends early, or contains
/// codes the dictionary cannot account for.
pub fn decompress(payload: &str) -> CodecResult<String> {
    let bytes = STANDARD_NO_PAD
        .decode(payload)
        .map_err(|e| CodecError::invalid_payload(e.to_string()))?;
    let mut reader = BitReader::new(&bytes);

    // Slots 0 and 1 are the reserved codes.
    let mut dict: Vec<String> = vec![String::new(), String::new()];
    let mut out = String::new();
    let mut prev: Option<String> = None;

    loop {
        let next = dict.len() as u32;
        let code = reader.read(width_for(next))?;
        match code {
            END => return Ok(out),
            LITERAL => {
                let raw = reader.read(LITERAL_BITS)?;
                let c = char::from_u32(raw).ok_or(CodecError::InvalidLiteral(raw))?;
                dict.push(c.to_string());
                out.push(c);
                prev = None;
            }
            code => {
                let entry = if code < next {
                    dict[code as usize].clone()
                } else if code == next {
                    let p = prev
                        .as_deref()
                        .ok_or(CodecError::InvalidCode { code, size: next })?;
                    let first = p.chars().next().ok_or(CodecError::InvalidCode { code, size: next })?;
                    let mut entry = p.to_string();
                    entry.push(first);
                    entry
                } else {
                    return Err(CodecError::InvalidCode { code, size: next });
                };

                if let Some(mut added) = prev.take() {
                    if let Some(first) = entry.chars().next() {
                        added.push(first);
                    }
                    dict.push(added);
                }
                out.push_str(&entry);
                prev = Some(entry);
            }
        }
    }
}

/// Writes bits most-significant first.
#[derive(Default)]
struct BitWriter {
    bytes: Vec<u8>,
    current: u8,
    filled: u32,
}

impl BitWriter {
    fn write(&mut self, value: u32, width: u32) {
        for shift in (0..width).rev() {
            let bit = ((value >> shift) & 1) as u8;
            self.current = (self.current << 1) | bit;
            self.filled += 1;
            if self.filled == 8 {
                self.bytes.push(self.current);
                self.current = 0;
                self.filled = 0;
            }
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.filled > 0 {
            self.bytes.push(self.current << (8 - self.filled));
        }
        self.bytes
    }
}

struct BitReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn read(&mut self, width: u32) -> CodecResult<u32> {
        let mut value = 0u32;
        for _ in 0..width {
            let byte = self
                .bytes
                .get(self.position / 8)
                .ok_or(CodecError::UnexpectedEof)?;
            let bit = (byte >> (7 - (self.position % 8))) & 1;
            value = (value << 1) | u32::from(bit);
            self.position += 1;
        }
        Ok(value)
    }
}
