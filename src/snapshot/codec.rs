//! Length-delimited encoding of an event log.
//!
//! ```text
//! | "EVS1" | count: u64 BE | len: u32 BE | json bytes | len: u32 BE | json bytes | ...
//! ```

use std::io;
use std::io::Read;
use std::io::Write;

use byteorder::BigEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;

use crate::snapshot::SnapshotError;
use crate::Event;

pub const MAGIC: &[u8; 4] = b"EVS1";

/// Pre-allocation cap, so that a corrupted count cannot reserve unbounded memory.
const MAX_PREALLOC: u64 = 4096;

pub fn encode<W: Write + ?Sized>(w: &mut W, events: &[Event]) -> Result<(), SnapshotError> {
    w.write_all(MAGIC)?;
    w.write_u64::<BigEndian>(events.len() as u64)?;

    for event in events {
        let buf = serde_json::to_vec(event)?;
        let len = u32::try_from(buf.len()).map_err(|_| SnapshotError::EventTooLarge(buf.len()))?;
        w.write_u32::<BigEndian>(len)?;
        w.write_all(&buf)?;
    }

    Ok(())
}

/// Decode a whole event log, rejecting anything but exactly one well-formed log.
pub fn decode<R: Read>(mut r: R) -> Result<Vec<Event>, SnapshotError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(SnapshotError::BadMagic(magic));
    }

    let count = r.read_u64::<BigEndian>()?;
    let mut events = Vec::with_capacity(count.min(MAX_PREALLOC) as usize);

    for index in 0..count {
        let len = r.read_u32::<BigEndian>()?;

        let mut buf = Vec::new();
        let n = r.by_ref().take(u64::from(len)).read_to_end(&mut buf)?;
        if n != len as usize {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("event {} is truncated: expect {} bytes, got {}", index, len, n),
            )
            .into());
        }

        let event = serde_json::from_slice(&buf).map_err(|source| SnapshotError::MalformedEvent { index, source })?;
        events.push(event);
    }

    let mut rest = [0u8; 1];
    if r.read(&mut rest)? != 0 {
        return Err(SnapshotError::TrailingBytes { count });
    }

    Ok(events)
}
