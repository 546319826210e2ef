//! Payload decoding: container parsing, base64, gzip, and big-integer protection.
//!
//! The vendor export is a small JSON container whose members are gzip blobs,
//! either base64 text or a plain array of byte values. Identifiers inside the
//! decompressed JSON are frequently integers wider than 53 bits, so the text is
//! pre-tokenised to quote those literals before `serde_json` ever sees them.

use std::borrow::Cow;
use std::io::Read;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{DecodeError, DecodeResult};

/// Integer literals with at least this many digits are kept as strings.
pub const BIG_INTEGER_DIGITS: usize = 15;

/// One compressed member of the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Blob {
    /// Base64 text, optionally with a `data:...;base64,` prefix.
    Base64(String),
    /// Raw gzip bytes given as an integer array.
    Bytes(Vec<u8>),
}

impl Blob {
    /// Gzip-compressed bytes of this blob.
    pub fn compressed_bytes(&self) -> DecodeResult<Cow<'_, [u8]>> {
        match self {
            Blob::Bytes(bytes) => Ok(Cow::Borrowed(bytes.as_slice())),
            Blob::Base64(text) => {
                let body = strip_data_url(text);
                let cleaned: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
                Ok(Cow::Owned(STANDARD.decode(cleaned.as_bytes())?))
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Blob::Bytes(bytes) => bytes.is_empty(),
            Blob::Base64(text) => text.trim().is_empty(),
        }
    }
}

fn strip_data_url(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with("data:")
        && let Some((_, body)) = trimmed.split_once(',')
    {
        return body;
    }
    trimmed
}

/// The exported container: a schema snapshot blob plus an optional workflow blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPayload {
    #[serde(rename = "gzipSnapshot", default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Blob>,

    #[serde(rename = "gzipAutomation", default, skip_serializing_if = "Option::is_none")]
    pub automation: Option<Blob>,
}

impl RawPayload {
    pub fn new(snapshot: Blob, automation: Option<Blob>) -> Self {
        Self {
            snapshot: Some(snapshot),
            automation,
        }
    }

    /// Parse the container text (the content of an exported `.base` file).
    pub fn from_json(text: &str) -> DecodeResult<Self> {
        let payload: RawPayload = serde_json::from_str(text.trim_start_matches('\u{feff}'))?;
        Ok(payload)
    }

    pub fn from_slice(bytes: &[u8]) -> DecodeResult<Self> {
        let text = String::from_utf8(bytes.to_vec())?;
        Self::from_json(&text)
    }

    /// Decode the snapshot blob into a generic tree.
    pub fn decode_snapshot(&self) -> DecodeResult<Value> {
        let blob = self
            .snapshot
            .as_ref()
            .filter(|blob| !blob.is_empty())
            .ok_or(DecodeError::MissingBlob("snapshot"))?;
        decode_blob(blob)
    }

    /// Decode the workflow blob. `Ok(None)` when the container has none.
    pub fn decode_automation(&self) -> DecodeResult<Option<Value>> {
        match self.automation.as_ref().filter(|blob| !blob.is_empty()) {
            Some(blob) => decode_blob(blob).map(Some),
            None => Ok(None),
        }
    }
}

/// Decompress a blob to text.
pub fn decompress(blob: &Blob) -> DecodeResult<String> {
    let compressed = blob.compressed_bytes()?;
    let mut decoder = GzDecoder::new(compressed.as_ref());
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw).map_err(DecodeError::Gzip)?;
    log::debug!(
        "decompressed {} bytes into {} bytes",
        compressed.len(),
        raw.len()
    );
    Ok(String::from_utf8(raw)?)
}

/// Decompress and parse a blob, protecting oversized integers.
pub fn decode_blob(blob: &Blob) -> DecodeResult<Value> {
    let text = decompress(blob)?;
    parse_protected(&text)
}

/// Parse JSON text after quoting every oversized integer literal.
pub fn parse_protected(text: &str) -> DecodeResult<Value> {
    let protected = protect_big_integers(text);
    Ok(serde_json::from_str(&protected)?)
}

/// Quote bare integer literals of [`BIG_INTEGER_DIGITS`] or more digits.
///
/// Only literals in value position (after `:`, `[` or `,`) are rewritten;
/// string contents and numbers with a fraction or exponent are left alone.
/// Returns the input unchanged (borrowed) when nothing needed quoting.
pub fn protect_big_integers(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut out: Option<String> = None;
    let mut copied_to = 0;
    let mut in_string = false;
    let mut prev = b'\0';
    let mut i = 0;

    while i < len {
        let b = bytes[i];

        if in_string {
            match b {
                b'\\' => i += 2,
                b'"' => {
                    in_string = false;
                    i += 1;
                }
                _ => i += 1,
            }
            continue;
        }

        match b {
            b'"' => {
                in_string = true;
                prev = b'"';
                i += 1;
            }
            b'-' | b'0'..=b'9' if matches!(prev, b':' | b'[' | b',') => {
                let start = i;
                let mut end = if b == b'-' { i + 1 } else { i };
                let digits_start = end;
                while end < len && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                let digits = end - digits_start;
                let is_integer = end >= len || !matches!(bytes[end], b'.' | b'e' | b'E');

                if digits >= BIG_INTEGER_DIGITS && is_integer {
                    let buf = out.get_or_insert_with(|| String::with_capacity(len + 32));
                    buf.push_str(&text[copied_to..start]);
                    buf.push('"');
                    buf.push_str(&text[start..end]);
                    buf.push('"');
                    copied_to = end;
                }

                prev = b'0';
                i = end.max(i + 1);
            }
            b' ' | b'\n' | b'\r' | b'\t' => i += 1,
            _ => {
                prev = b;
                i += 1;
            }
        }
    }

    match out {
        None => Cow::Borrowed(text),
        Some(mut buf) => {
            buf.push_str(&text[copied_to..]);
            Cow::Owned(buf)
        }
    }
}
