//! Snapshot envelope for backend state.
//!
//! Layout: 4 magic bytes, a little-endian format version, one backend kind
//! byte, then a bincode payload. Backend state is a flat value graph (no
//! handles, no thread references), so the payload is a plain serde
//! serialization of it.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{MatchError, Result};

/// Magic bytes for snapshot envelopes.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"KNRD";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

const HEADER_LEN: usize = 9;

/// Which backend produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SnapshotKind {
    TreeSearch = 1,
    ParallelScan = 2,
}

impl SnapshotKind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::TreeSearch),
            2 => Some(Self::ParallelScan),
            _ => None,
        }
    }
}

pub(crate) fn encode<T: Serialize>(kind: SnapshotKind, state: &T) -> Result<Vec<u8>> {
    let payload =
        bincode::serialize(state).map_err(|e| MatchError::Serialization(e.to_string()))?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&SNAPSHOT_MAGIC);
    out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    out.push(kind as u8);
    out.extend_from_slice(&payload);
    Ok(out)
}

pub(crate) fn decode<T: DeserializeOwned>(kind: SnapshotKind, bytes: &[u8]) -> Result<T> {
    if bytes.len() < HEADER_LEN {
        return Err(MatchError::Format("snapshot too short".to_string()));
    }
    if bytes[..4] != SNAPSHOT_MAGIC {
        return Err(MatchError::Format("bad snapshot magic".to_string()));
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != SNAPSHOT_VERSION {
        return Err(MatchError::Format(format!(
            "unsupported snapshot version {version} (expected {SNAPSHOT_VERSION})"
        )));
    }
    match SnapshotKind::from_byte(bytes[8]) {
        Some(found) if found == kind => {}
        Some(found) => {
            return Err(MatchError::Format(format!(
                "snapshot was written by the {found:?} backend, not {kind:?}"
            )));
        }
        None => {
            return Err(MatchError::Format(format!(
                "unknown snapshot kind {}",
                bytes[8]
            )));
        }
    }
    bincode::deserialize(&bytes[HEADER_LEN..])
        .map_err(|e| MatchError::Serialization(e.to_string()))
}
