// On-disk record format for cache entries
// Author: kelexine (https://github.com/kelexine)
//
// One file per entry so a put is a single atomic rename:
//
//   magic "RGC1" | stored_at i64 | accessed_at i64 | expires_at i64 (0 = never)
//   | payload_len u64 | key_len u32 | content_type_len u16
//   | key | content_type | payload
//
// Integers are big-endian milliseconds since the epoch. accessed_at sits at a
// fixed offset so a cache hit can refresh it without rewriting the payload.

use super::models::CacheEntry;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use thiserror::Error;

pub const MAGIC: &[u8; 4] = b"RGC1";
pub const HEADER_LEN: usize = 4 + 8 + 8 + 8 + 8 + 4 + 2;
pub const ACCESSED_AT_OFFSET: u64 = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record shorter than its header")]
    Truncated,
    #[error("bad magic")]
    BadMagic,
    #[error("timestamp out of range")]
    Timestamp,
    #[error("key or content type is not UTF-8")]
    Encoding,
    #[error("field too large for the record format")]
    TooLarge,
}

/// Fixed-size prefix of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub stored_at: i64,
    pub accessed_at: i64,
    pub expires_at: i64,
    pub payload_len: u64,
    pub key_len: u32,
    pub content_type_len: u16,
}

impl RecordHeader {
    /// Bytes between the fixed header and the payload.
    pub fn meta_len(&self) -> usize {
        self.key_len as usize + self.content_type_len as usize
    }

    pub fn parse(mut buf: &[u8]) -> Result<Self, RecordError> {
        if buf.len() < HEADER_LEN {
            return Err(RecordError::Truncated);
        }
        if &buf[..4] != MAGIC {
            return Err(RecordError::BadMagic);
        }
        buf.advance(4);
        Ok(Self {
            stored_at: buf.get_i64(),
            accessed_at: buf.get_i64(),
            expires_at: buf.get_i64(),
            payload_len: buf.get_u64(),
            key_len: buf.get_u32(),
            content_type_len: buf.get_u16(),
        })
    }

    /// Build the entry metadata from the header and the key/content-type
    /// bytes that follow it.
    pub fn entry(&self, meta: &[u8]) -> Result<CacheEntry, RecordError> {
        if meta.len() < self.meta_len() {
            return Err(RecordError::Truncated);
        }
        let (key, rest) = meta.split_at(self.key_len as usize);
        let content_type = &rest[..self.content_type_len as usize];
        Ok(CacheEntry {
            key: std::str::from_utf8(key)
                .map_err(|_| RecordError::Encoding)?
                .to_string(),
            size: self.payload_len,
            content_type: std::str::from_utf8(content_type)
                .map_err(|_| RecordError::Encoding)?
                .to_string(),
            stored_at: from_millis(self.stored_at)?,
            accessed_at: from_millis(self.accessed_at)?,
            expires_at: match self.expires_at {
                0 => None,
                ms => Some(from_millis(ms)?),
            },
        })
    }
}

/// Serialize an entry and its payload into one record.
pub fn encode(entry: &CacheEntry, payload: &[u8]) -> Result<Bytes, RecordError> {
    let key_len = u32::try_from(entry.key.len()).map_err(|_| RecordError::TooLarge)?;
    let content_type_len =
        u16::try_from(entry.content_type.len()).map_err(|_| RecordError::TooLarge)?;

    let mut buf = BytesMut::with_capacity(
        HEADER_LEN + entry.key.len() + entry.content_type.len() + payload.len(),
    );
    buf.put_slice(MAGIC);
    buf.put_i64(entry.stored_at.timestamp_millis());
    buf.put_i64(entry.accessed_at.timestamp_millis());
    buf.put_i64(entry.expires_at.map(|at| at.timestamp_millis()).unwrap_or(0));
    buf.put_u64(payload.len() as u64);
    buf.put_u32(key_len);
    buf.put_u16(content_type_len);
    buf.put_slice(entry.key.as_bytes());
    buf.put_slice(entry.content_type.as_bytes());
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Parse a whole record. The returned payload shares the input buffer.
pub fn decode(record: Bytes) -> Result<(CacheEntry, Bytes), RecordError> {
    let header = RecordHeader::parse(&record)?;
    let meta_end = HEADER_LEN + header.meta_len();
    let payload_end = meta_end
        .checked_add(usize::try_from(header.payload_len).map_err(|_| RecordError::TooLarge)?)
        .ok_or(RecordError::TooLarge)?;
    if record.len() < payload_end {
        return Err(RecordError::Truncated);
    }
    let entry = header.entry(&record[HEADER_LEN..meta_end])?;
    Ok((entry, record.slice(meta_end..payload_end)))
}

pub fn encode_timestamp(at: DateTime<Utc>) -> [u8; 8] {
    at.timestamp_millis().to_be_bytes()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, RecordError> {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or(RecordError::Timestamp)
}
