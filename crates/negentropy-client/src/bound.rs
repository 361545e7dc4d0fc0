//! Bounds: the exclusive upper frontiers that delimit ranges on the wire.
//!
//! Timestamps are delta-coded against a running cursor that is independent
//! per direction (outbound vs. inbound) and reset to zero at the start of
//! every message — see the driver in `reconcile`.

use crate::error::Error;
use crate::record::Record;
use crate::varint;

/// `2⁶³ − 1`. The distinguished timestamp that sorts above every real
/// record and is wire-encoded as a timestamp delta of `0`.
pub const INFINITY_TIMESTAMP: u64 = (1u64 << 63) - 1;

/// An exclusive upper frontier in the `(timestamp, id)` total order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    pub timestamp: u64,
    pub id_prefix: Vec<u8>,
}

impl Bound {
    pub fn new(timestamp: u64, id_prefix: Vec<u8>) -> Result<Self, Error> {
        if id_prefix.len() > 32 {
            return Err(Error::Malformed("bound id prefix longer than 32 bytes"));
        }
        Ok(Self {
            timestamp,
            id_prefix,
        })
    }

    pub fn zero() -> Self {
        Self {
            timestamp: 0,
            id_prefix: Vec::new(),
        }
    }

    pub fn infinity() -> Self {
        Self {
            timestamp: INFINITY_TIMESTAMP,
            id_prefix: Vec::new(),
        }
    }

    pub fn is_infinity(&self) -> bool {
        self.timestamp == INFINITY_TIMESTAMP
    }

    /// Is `record` below this bound's frontier?
    pub fn record_is_below(&self, record: &Record) -> bool {
        if record.timestamp != self.timestamp {
            return record.timestamp < self.timestamp;
        }
        &record.id[..self.id_prefix.len()] < &self.id_prefix[..]
    }

    /// Encode against the outbound cursor, advancing it.
    pub fn encode(&self, last_ts_out: &mut u64) -> Vec<u8> {
        let mut out = encode_timestamp(self.timestamp, last_ts_out);
        out.extend(varint::encode(self.id_prefix.len() as u64));
        out.extend_from_slice(&self.id_prefix);
        out
    }

    /// Decode against the inbound cursor, advancing it. Returns the bound
    /// and the number of bytes consumed.
    pub fn decode(bytes: &[u8], offset: usize, last_ts_in: &mut u64) -> Result<(Self, usize), Error> {
        let (timestamp, ts_len) = decode_timestamp(bytes, offset, last_ts_in)?;
        let mut cursor = offset + ts_len;

        let (len, len_len) = varint::decode(bytes, cursor)?;
        cursor += len_len;

        if len > 32 {
            return Err(Error::Malformed("bound id prefix longer than 32 bytes"));
        }
        let len = len as usize;

        let id_prefix = bytes
            .get(cursor..cursor + len)
            .ok_or(Error::Malformed("bound id prefix truncated"))?
            .to_vec();
        cursor += len;

        Ok((
            Self {
                timestamp,
                id_prefix,
            },
            cursor - offset,
        ))
    }
}

fn encode_timestamp(ts: u64, last_ts_out: &mut u64) -> Vec<u8> {
    if ts == INFINITY_TIMESTAMP {
        *last_ts_out = INFINITY_TIMESTAMP;
        return varint::encode(0);
    }

    let delta = ts.saturating_sub(*last_ts_out).saturating_add(1);
    *last_ts_out = ts;
    varint::encode(delta)
}

fn decode_timestamp(bytes: &[u8], offset: usize, last_ts_in: &mut u64) -> Result<(u64, usize), Error> {
    let (delta, consumed) = varint::decode(bytes, offset)?;

    if delta == 0 {
        *last_ts_in = INFINITY_TIMESTAMP;
        return Ok((INFINITY_TIMESTAMP, consumed));
    }

    let ts = last_ts_in.saturating_add(delta - 1);
    *last_ts_in = ts;
    Ok((ts, consumed))
}

/// The shortest id prefix that separates two adjacent records, forming a
/// bound `b` such that `prev < b <= curr`.
pub fn shortest_distinguishing_bound(prev: &Record, curr: &Record) -> Bound {
    if curr.timestamp != prev.timestamp {
        return Bound::new(curr.timestamp, Vec::new()).expect("empty prefix is always valid");
    }

    let mut k = 32;
    for i in 0..32 {
        if prev.id[i] != curr.id[i] {
            k = i + 1;
            break;
        }
    }

    Bound::new(curr.timestamp, curr.id[..k].to_vec()).expect("prefix never exceeds 32 bytes")
}
