//! 256-bit additive accumulator used to fingerprint a range of ids.
//!
//! Ids are summed as little-endian 256-bit integers modulo 2²⁵⁶. Because
//! addition mod 2²⁵⁶ is commutative and associative, the resulting
//! fingerprint does not depend on the order ids were added in — two ranges
//! holding the same multiset of ids always fingerprint equal.

use sha2::{Digest, Sha256};

use crate::varint;

/// Mutable little-endian 256-bit accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accumulator([u8; 32]);

impl Accumulator {
    pub fn new() -> Self {
        Self([0u8; 32])
    }

    pub fn reset(&mut self) {
        self.0 = [0u8; 32];
    }

    /// Add `other` into the accumulator, carrying from byte 0 to byte 31.
    /// The final carry (overflow past 2²⁵⁶) is discarded.
    pub fn add(&mut self, other: &[u8; 32]) {
        let mut carry: u16 = 0;
        for i in 0..32 {
            let sum = self.0[i] as u16 + other[i] as u16 + carry;
            self.0[i] = sum as u8;
            carry = sum >> 8;
        }
    }

    /// `SHA256(self ‖ varint(n))[0..16]`.
    pub fn fingerprint(&self, n: u64) -> [u8; 16] {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        hasher.update(varint::encode(n));
        let digest = hasher.finalize();

        let mut out = [0u8; 16];
        out.copy_from_slice(&digest[..16]);
        out
    }
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Fingerprint of a multiset of 32-byte ids, independent of their order.
pub fn fingerprint_ids<'a, I>(ids: I) -> [u8; 16]
where
    I: IntoIterator<Item = &'a [u8; 32]>,
{
    let mut acc = Accumulator::new();
    let mut n: u64 = 0;
    for id in ids {
        acc.add(id);
        n += 1;
    }
    acc.fingerprint(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_associative_and_commutative() {
        let a = [0x01u8; 32];
        let b = [0x02u8; 32];
        let c = [0xFFu8; 32];

        let mut acc1 = Accumulator::new();
        acc1.add(&a);
        acc1.add(&b);
        acc1.add(&c);

        let mut acc2 = Accumulator::new();
        acc2.add(&c);
        acc2.add(&a);
        acc2.add(&b);

        assert_eq!(acc1, acc2);
    }

    #[test]
    fn add_wraps_modulo_2_256() {
        let mut acc = Accumulator::new();
        acc.add(&[0xFF; 32]);
        acc.add(&[0x01; 32]);
        // every byte except the first wraps with no remaining carry
        assert_eq!(acc.0[0], 0x00);
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let id1 = [0xAAu8; 32];
        let id2 = [0xBBu8; 32];

        let fp_forward = fingerprint_ids([&id1, &id2]);
        let fp_reverse = fingerprint_ids([&id2, &id1]);

        assert_eq!(fp_forward, fp_reverse);
    }

    #[test]
    fn fingerprint_depends_on_count() {
        let id = [0x01u8; 32];
        let fp_once = fingerprint_ids([&id]);
        let fp_twice = fingerprint_ids([&id, &id]);
        assert_ne!(fp_once, fp_twice);
    }

    #[test]
    fn empty_fingerprint_is_deterministic() {
        let fp1 = fingerprint_ids(std::iter::empty());
        let fp2 = fingerprint_ids(std::iter::empty());
        assert_eq!(fp1, fp2);
    }
}
