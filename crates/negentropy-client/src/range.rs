//! Range partitioning: splitting the store into SKIP/FINGERPRINT/ID_LIST
//! ranges, and consuming a peer's ranges against the local store.

use std::collections::HashSet;

use tracing::debug;

use crate::accumulator::fingerprint_ids;
use crate::bound::{shortest_distinguishing_bound, Bound};
use crate::error::Error;
use crate::record::Record;
use crate::varint;

/// Below this many records a sub-range is sent as an `ID_LIST` rather than
/// split into fingerprint buckets.
const ID_LIST_THRESHOLD: usize = 32;

/// Number of fingerprint buckets a large sub-range splits into.
const FINGERPRINT_BUCKETS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangePayload {
    Skip,
    Fingerprint([u8; 16]),
    IdList(Vec<[u8; 32]>),
}

impl RangePayload {
    fn mode(&self) -> u64 {
        match self {
            Self::Skip => 0,
            Self::Fingerprint(_) => 1,
            Self::IdList(_) => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub bound: Bound,
    pub payload: RangePayload,
}

impl Range {
    pub fn skip(bound: Bound) -> Self {
        Self {
            bound,
            payload: RangePayload::Skip,
        }
    }

    pub fn encode(&self, last_ts_out: &mut u64) -> Vec<u8> {
        let mut out = self.bound.encode(last_ts_out);
        out.extend(varint::encode(self.payload.mode()));
        match &self.payload {
            RangePayload::Skip => {}
            RangePayload::Fingerprint(fp) => out.extend_from_slice(fp),
            RangePayload::IdList(ids) => {
                out.extend(varint::encode(ids.len() as u64));
                for id in ids {
                    out.extend_from_slice(id);
                }
            }
        }
        out
    }

    pub fn decode(bytes: &[u8], offset: usize, last_ts_in: &mut u64) -> Result<(Self, usize), Error> {
        let (bound, bound_len) = Bound::decode(bytes, offset, last_ts_in)?;
        let mut cursor = offset + bound_len;

        let (mode, mode_len) = varint::decode(bytes, cursor)?;
        cursor += mode_len;

        let payload = match mode {
            0 => RangePayload::Skip,
            1 => {
                let fp = bytes
                    .get(cursor..cursor + 16)
                    .ok_or(Error::Malformed("fingerprint payload truncated"))?;
                cursor += 16;
                let mut buf = [0u8; 16];
                buf.copy_from_slice(fp);
                RangePayload::Fingerprint(buf)
            }
            2 => {
                let (n, n_len) = varint::decode(bytes, cursor)?;
                cursor += n_len;
                let mut ids = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    let id = bytes
                        .get(cursor..cursor + 32)
                        .ok_or(Error::Malformed("id_list entry truncated"))?;
                    cursor += 32;
                    let mut buf = [0u8; 32];
                    buf.copy_from_slice(id);
                    ids.push(buf);
                }
                RangePayload::IdList(ids)
            }
            other => return Err(Error::Malformed(range_mode_error(other))),
        };

        Ok((Self { bound, payload }, cursor - offset))
    }
}

fn range_mode_error(_mode: u64) -> &'static str {
    "unrecognized range mode"
}

/// Serialize a full sequence of ranges, each against a fresh outbound
/// timestamp cursor.
pub fn encode_ranges(ranges: &[Range]) -> Vec<u8> {
    let mut last_ts_out = 0u64;
    let mut out = Vec::new();
    for range in ranges {
        out.extend(range.encode(&mut last_ts_out));
    }
    out
}

/// Produce the ranges describing `records[lower..upper)`, whose upper
/// frontier is `upper_bound`.
pub fn emit_ranges(records: &[Record], lower: usize, upper: usize, upper_bound: &Bound) -> Vec<Range> {
    let n = upper - lower;
    if n < ID_LIST_THRESHOLD {
        debug!(records = n, "emitting single id_list range");
        let ids = records[lower..upper].iter().map(|r| r.id).collect();
        return vec![Range {
            bound: upper_bound.clone(),
            payload: RangePayload::IdList(ids),
        }];
    }

    debug!(records = n, buckets = FINGERPRINT_BUCKETS, "emitting fingerprint buckets");
    let base = n / FINGERPRINT_BUCKETS;
    let extra = n % FINGERPRINT_BUCKETS;

    let mut ranges = Vec::with_capacity(FINGERPRINT_BUCKETS);
    let mut l = lower;
    for i in 0..FINGERPRINT_BUCKETS {
        let size = base + usize::from(i < extra);
        let r = l + size;

        let bound = if i == FINGERPRINT_BUCKETS - 1 {
            upper_bound.clone()
        } else {
            shortest_distinguishing_bound(&records[r - 1], &records[r])
        };

        let fp = fingerprint_ids(records[l..r].iter().map(|rec| &rec.id));
        ranges.push(Range {
            bound,
            payload: RangePayload::Fingerprint(fp),
        });
        l = r;
    }
    ranges
}

/// First index at or past `prev_index` whose record is not below `bound`.
fn upper_local_index(records: &[Record], prev_index: usize, bound: &Bound) -> usize {
    prev_index + records[prev_index..].partition_point(|r| bound.record_is_below(r))
}

fn flush_pending_skip(out: &mut Vec<Range>, pending_skip: &mut bool, prev: &Bound) {
    if *pending_skip {
        out.push(Range::skip(prev.clone()));
        *pending_skip = false;
    }
}

fn reconcile_id_list(
    records: &[Record],
    prev_index: usize,
    upper_local: usize,
    relay_ids: Vec<[u8; 32]>,
    have: &mut Vec<[u8; 32]>,
    need: &mut Vec<[u8; 32]>,
) {
    let mut relay_set: HashSet<[u8; 32]> = relay_ids.into_iter().collect();
    for record in &records[prev_index..upper_local] {
        if !relay_set.remove(&record.id) {
            have.push(record.id);
        }
    }
    need.extend(relay_set);
}

/// Consume a peer's ranges against the local store, producing the ranges
/// for the reply and accumulating `have`/`need` witnesses.
pub fn consume_ranges(
    records: &[Record],
    input: &[u8],
    have: &mut Vec<[u8; 32]>,
    need: &mut Vec<[u8; 32]>,
) -> Result<Vec<Range>, Error> {
    let mut last_ts_in = 0u64;
    let mut prev = Bound::zero();
    let mut prev_index = 0usize;
    let mut pending_skip = false;
    let mut out = Vec::new();
    let mut offset = 0usize;

    while offset < input.len() {
        let (range, consumed) = Range::decode(input, offset, &mut last_ts_in)?;
        offset += consumed;

        let curr = range.bound.clone();
        let upper_local = upper_local_index(records, prev_index, &curr);

        match range.payload {
            RangePayload::Skip => {
                debug!(range = "skip", "dispatched range");
                pending_skip = true;
            }
            RangePayload::Fingerprint(their_fp) => {
                let local_fp = fingerprint_ids(records[prev_index..upper_local].iter().map(|r| &r.id));
                if local_fp == their_fp {
                    debug!(range = "fingerprint", matched = true, "dispatched range");
                    pending_skip = true;
                } else {
                    debug!(range = "fingerprint", matched = false, "dispatched range");
                    flush_pending_skip(&mut out, &mut pending_skip, &prev);
                    out.extend(emit_ranges(records, prev_index, upper_local, &curr));
                }
            }
            RangePayload::IdList(ids) => {
                debug!(range = "id_list", count = ids.len(), "dispatched range");
                reconcile_id_list(records, prev_index, upper_local, ids, have, need);
                pending_skip = true;
            }
        }

        prev = curr;
        prev_index = upper_local;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: u64, byte: u8) -> Record {
        Record::new(ts, [byte; 32])
    }

    #[test]
    fn emit_ranges_below_threshold_is_a_single_id_list() {
        let records = vec![record(1, 1), record(2, 2), record(3, 3)];
        let bound = Bound::new(4, vec![]).unwrap();
        let ranges = emit_ranges(&records, 0, 3, &bound);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].bound, bound);
        assert!(matches!(&ranges[0].payload, RangePayload::IdList(ids) if ids.len() == 3));
    }

    #[test]
    fn emit_ranges_above_threshold_splits_into_16_fingerprint_buckets() {
        let records: Vec<Record> = (0..40).map(|i| record(i as u64, i as u8)).collect();
        let bound = Bound::new(1000, vec![]).unwrap();
        let ranges = emit_ranges(&records, 0, 40, &bound);
        assert_eq!(ranges.len(), 16);
        assert!(ranges
            .iter()
            .all(|r| matches!(r.payload, RangePayload::Fingerprint(_))));
        assert_eq!(ranges.last().unwrap().bound, bound);
    }

    #[test]
    fn range_encode_decode_roundtrip_all_modes() {
        let skip = Range::skip(Bound::new(10, vec![1, 2]).unwrap());
        let fp = Range {
            bound: Bound::new(20, vec![]).unwrap(),
            payload: RangePayload::Fingerprint([0xAB; 16]),
        };
        let id_list = Range {
            bound: Bound::new(30, vec![]).unwrap(),
            payload: RangePayload::IdList(vec![[0x01; 32], [0x02; 32]]),
        };

        for range in [skip, fp, id_list] {
            let mut last_ts_out = 0;
            let bytes = range.encode(&mut last_ts_out);
            let mut last_ts_in = 0;
            let (decoded, consumed) = Range::decode(&bytes, 0, &mut last_ts_in).unwrap();
            assert_eq!(decoded, range);
            assert_eq!(consumed, bytes.len());
        }
    }

    #[test]
    fn decode_rejects_unknown_mode() {
        let bound = Bound::new(1, vec![]).unwrap();
        let mut bytes = bound.encode(&mut 0);
        bytes.extend(varint::encode(9));
        let mut cursor = 0;
        assert!(matches!(
            Range::decode(&bytes, 0, &mut cursor),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn consume_matching_fingerprint_yields_no_have_or_need() {
        let records = vec![record(1, 1), record(2, 2)];
        let local_fp = fingerprint_ids(records.iter().map(|r| &r.id));
        let range = Range {
            bound: Bound::new(3, vec![]).unwrap(),
            payload: RangePayload::Fingerprint(local_fp),
        };
        let bytes = range.encode(&mut 0);

        let mut have = Vec::new();
        let mut need = Vec::new();
        let out = consume_ranges(&records, &bytes, &mut have, &mut need).unwrap();
        assert!(have.is_empty());
        assert!(need.is_empty());
        assert!(out.is_empty(), "trailing pending skip must be dropped");
    }

    #[test]
    fn consume_mismatching_fingerprint_recurses_into_id_list() {
        let records = vec![record(1, 1), record(2, 2)];
        let range = Range {
            bound: Bound::new(3, vec![]).unwrap(),
            payload: RangePayload::Fingerprint([0u8; 16]), // deliberately wrong
        };
        let bytes = range.encode(&mut 0);

        let mut have = Vec::new();
        let mut need = Vec::new();
        let out = consume_ranges(&records, &bytes, &mut have, &mut need).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0].payload, RangePayload::IdList(ids) if ids.len() == 2));
    }

    #[test]
    fn consume_id_list_computes_have_and_need() {
        let records = vec![record(1, 1), record(2, 2), record(3, 3)];
        // peer has records[0] (shared) and one id we don't (need), and is
        // missing records[1..3] (have).
        let relay_ids = vec![[1u8; 32], [0xFFu8; 32]];
        let range = Range {
            bound: Bound::new(10, vec![]).unwrap(),
            payload: RangePayload::IdList(relay_ids),
        };
        let bytes = range.encode(&mut 0);

        let mut have = Vec::new();
        let mut need = Vec::new();
        let out = consume_ranges(&records, &bytes, &mut have, &mut need).unwrap();

        assert_eq!(have, vec![[2u8; 32], [3u8; 32]]);
        assert_eq!(need, vec![[0xFFu8; 32]]);
        assert!(out.is_empty(), "id_list contributes a pending skip, dropped at end");
    }
}
