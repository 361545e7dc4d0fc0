//! The reconciliation driver: `New → initiate → Awaiting-reply → reconcile*
//! → Done`.

use tracing::{debug, warn};

use crate::error::Error;
use crate::range::{self, encode_ranges};
use crate::record::RecordStore;

/// The single-byte leading tag identifying protocol v1.
pub const PROTOCOL_VERSION: u8 = 0x61;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    New,
    AwaitingReply,
    Done,
}

/// Drives one client-side reconciliation against a local [`RecordStore`].
///
/// `initiate` must be called exactly once before any call to `reconcile`.
/// Both raise [`Error::InvalidState`] when called out of turn.
#[derive(Debug)]
pub struct Driver {
    store: RecordStore,
    state: State,
    have: Vec<[u8; 32]>,
    need: Vec<[u8; 32]>,
}

impl Driver {
    pub fn new(store: RecordStore) -> Self {
        Self {
            store,
            state: State::New,
            have: Vec::new(),
            need: Vec::new(),
        }
    }

    /// Produce the first outbound message: the whole store as one top-level
    /// range bounded by `INFINITY`.
    pub fn initiate(&mut self) -> Result<Vec<u8>, Error> {
        if self.state != State::New {
            return Err(Error::InvalidState("initiate called more than once"));
        }

        let upper_bound = crate::bound::Bound::infinity();
        let ranges = range::emit_ranges(self.store.as_slice(), 0, self.store.len(), &upper_bound);

        let mut out = vec![PROTOCOL_VERSION];
        out.extend(encode_ranges(&ranges));

        self.state = State::AwaitingReply;
        debug!(ranges = ranges.len(), "initiated reconciliation");
        Ok(out)
    }

    /// Consume one relay message, returning the reply to send or `None` if
    /// reconciliation has converged.
    pub fn reconcile(&mut self, message: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        if self.state != State::AwaitingReply {
            return Err(Error::InvalidState("reconcile called before initiate, or after done"));
        }

        let (&version, body) = message
            .split_first()
            .ok_or(Error::Malformed("message missing version byte"))?;
        if version != PROTOCOL_VERSION {
            warn!(version, "relay sent an unsupported protocol version");
            return Err(Error::UnsupportedVersion(version));
        }

        let ranges = range::consume_ranges(self.store.as_slice(), body, &mut self.have, &mut self.need)?;
        debug!(
            in_ranges_bytes = body.len(),
            out_ranges = ranges.len(),
            have = self.have.len(),
            need = self.need.len(),
            "consumed reconciliation message"
        );

        if ranges.is_empty() {
            self.state = State::Done;
            return Ok(None);
        }

        let mut out = vec![PROTOCOL_VERSION];
        out.extend(encode_ranges(&ranges));
        Ok(Some(out))
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// The accumulated symmetric-difference witnesses, as lowercase hex.
    pub fn result(&self) -> (Vec<String>, Vec<String>) {
        let have = self.have.iter().map(|id| hex::encode(id)).collect();
        let need = self.need.iter().map(|id| hex::encode(id)).collect();
        (have, need)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn store_of(ids: &[(u64, u8)]) -> RecordStore {
        RecordStore::new(ids.iter().map(|&(ts, b)| Record::new(ts, [b; 32])).collect())
    }

    #[test]
    fn reconcile_before_initiate_is_invalid_state() {
        let mut driver = Driver::new(store_of(&[(1, 1)]));
        assert!(matches!(
            driver.reconcile(&[PROTOCOL_VERSION]),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn initiate_twice_is_invalid_state() {
        let mut driver = Driver::new(store_of(&[(1, 1)]));
        driver.initiate().unwrap();
        assert!(matches!(driver.initiate(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn initiate_emits_version_byte_and_a_single_id_list_for_small_store() {
        let mut driver = Driver::new(store_of(&[(1, 1), (2, 2)]));
        let msg = driver.initiate().unwrap();
        assert_eq!(msg[0], PROTOCOL_VERSION);
        assert!(msg.len() > 1);
    }

    #[test]
    fn reconcile_rejects_unsupported_version() {
        let mut driver = Driver::new(store_of(&[(1, 1)]));
        driver.initiate().unwrap();
        let err = driver.reconcile(&[0x99]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(0x99)));
    }

    #[test]
    fn reconcile_converges_when_stores_match() {
        let records = &[(1, 1), (2, 2), (3, 3)];
        let mut client = Driver::new(store_of(records));
        // A second driver stands in for the relay side here purely to
        // exercise convergence: the core is symmetric at the wire level
        // even though only the client role is exposed as public API.
        let mut relay = Driver::new(store_of(records));

        let client_msg = client.initiate().unwrap();
        relay.initiate().unwrap();
        let relay_reply = relay
            .reconcile(&client_msg)
            .unwrap()
            .unwrap_or_else(|| vec![PROTOCOL_VERSION]);

        let reply = client.reconcile(&relay_reply).unwrap();

        assert!(reply.is_none());
        assert!(client.is_done());
        let (have, need) = client.result();
        assert!(have.is_empty());
        assert!(need.is_empty());
    }
}
