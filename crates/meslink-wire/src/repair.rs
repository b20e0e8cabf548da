//! Repair of invalid backslash escapes inside JSON string literals.
//!
//! Some controller firmware interpolates Windows paths into JSON strings
//! without escaping them, producing payloads like
//! `{"data_path":"D:\data\mes"}` that no JSON parser accepts. This pass
//! rewrites such payloads into valid JSON by doubling the offending
//! backslash, leaving already-valid content byte-identical.
//!
//! The scan is a single linear pass with no backtracking and is
//! idempotent. Quote tracking is deliberately simple; pathological nested
//! quoting inside already-malformed input is a known approximation, not a
//! full re-serializer.

use std::borrow::Cow;

use tracing::debug;

/// Characters that may legally follow a backslash inside a JSON string.
const VALID_ESCAPES: &[u8] = b"\"\\/bfnrtu";

/// Normalize invalid escape sequences in `data`.
///
/// Returns `Cow::Borrowed` when the payload needed no repair. Never
/// fails: repair is best-effort and silent by contract.
pub fn repair_escapes(data: &[u8]) -> Cow<'_, [u8]> {
    let mut out: Option<Vec<u8>> = None;
    let mut in_string = false;
    let mut escaped = false;
    let mut fixed = 0usize;

    for (i, &b) in data.iter().enumerate() {
        let mut double = false;
        if b == b'"' && !escaped {
            in_string = !in_string;
        } else if !in_string {
            escaped = false;
        } else if escaped {
            if !VALID_ESCAPES.contains(&b) {
                double = true;
                fixed += 1;
            }
            escaped = false;
        } else if b == b'\\' {
            escaped = true;
        }

        if double && out.is_none() {
            let mut buf = Vec::with_capacity(data.len() + 8);
            buf.extend_from_slice(&data[..i]);
            out = Some(buf);
        }
        if let Some(buf) = out.as_mut() {
            if double {
                buf.push(b'\\');
            }
            buf.push(b);
        }
    }

    match out {
        Some(buf) => {
            debug!(fixed, "repaired invalid escape sequences");
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(data),
    }
}
