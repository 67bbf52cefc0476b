//! Versioned envelope around the CRDT state.
//!
//! ```text
//! ┌───────┬────────┬──────────┬──────────────────────┐
//! │ magic │ format │ checksum │ update (yrs v1)      │
//! │ CNVS  │ u16    │ u32      │ Vec<u8>              │
//! └───────┴────────┴──────────┴──────────────────────┘
//! ```
//!
//! Encoded with bincode (standard config). The magic is checked on the raw
//! bytes before bincode touches them, so arbitrary input is rejected early.

use serde::{Deserialize, Serialize};

use super::DocumentError;

const MAGIC: [u8; 4] = *b"CNVS";

/// Blob format written by this build.
pub const FORMAT_VERSION: u16 = 1;

/// Upper bound on a decoded envelope. Guards allocation on garbage input.
const MAX_ENVELOPE_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    magic: [u8; 4],
    format: u16,
    checksum: u32,
    update: Vec<u8>,
}

fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<MAX_ENVELOPE_BYTES>()
}

/// Wrap an encoded CRDT state in the envelope.
pub(crate) fn seal(update: &[u8]) -> Result<Vec<u8>, DocumentError> {
    let envelope = Envelope {
        magic: MAGIC,
        format: FORMAT_VERSION,
        checksum: checksum(update),
        update: update.to_vec(),
    };
    bincode::serde::encode_to_vec(&envelope, config())
        .map_err(|e| DocumentError::Encode(e.to_string()))
}

/// Validate the envelope and return the CRDT state inside.
pub(crate) fn unseal(bytes: &[u8]) -> Result<Vec<u8>, DocumentError> {
    if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
        return Err(DocumentError::CorruptDocument("missing canvas magic".into()));
    }

    let (envelope, read): (Envelope, usize) = bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| DocumentError::CorruptDocument(format!("envelope: {e}")))?;

    if read != bytes.len() {
        return Err(DocumentError::CorruptDocument(format!(
            "{} trailing bytes after envelope",
            bytes.len() - read
        )));
    }
    if envelope.format != FORMAT_VERSION {
        return Err(DocumentError::CorruptDocument(format!(
            "unsupported format version {}",
            envelope.format
        )));
    }
    let expected = checksum(&envelope.update);
    if envelope.checksum != expected {
        return Err(DocumentError::CorruptDocument(format!(
            "checksum mismatch: stored {:08x}, computed {expected:08x}",
            envelope.checksum
        )));
    }

    Ok(envelope.update)
}

/// FNV-1a over the payload, folded four bytes at a time.
fn checksum(payload: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    hash ^= payload.len() as u32;
    hash = hash.wrapping_mul(0x0100_0193);
    for chunk in payload.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        hash ^= u32::from_le_bytes(word);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
