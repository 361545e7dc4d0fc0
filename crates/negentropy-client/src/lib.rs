//! Client-side NIP-77 (Negentropy) set-reconciliation.
//!
//! The core — [`varint`], [`accumulator`], [`record`], [`bound`], [`range`],
//! and [`driver`] — is a synchronous, allocation-light codec and state
//! machine with no relay I/O. [`session`] composes it with a [`Transport`]
//! a host app supplies over its real relay connection.
//!
//! ```ignore
//! let store = RecordStore::new(my_events);
//! let mut client = SyncClient::new(my_transport, SyncConfig::default());
//! let outcome = client.sync(store, filter).await?;
//! ```

mod accumulator;
mod bound;
mod config;
mod driver;
mod error;
mod range;
mod record;
mod session;
mod subid;
mod varint;

pub use accumulator::{fingerprint_ids, Accumulator};
pub use bound::{shortest_distinguishing_bound, Bound, INFINITY_TIMESTAMP};
pub use config::SyncConfig;
pub use driver::{Driver, PROTOCOL_VERSION};
pub use error::Error;
pub use range::{encode_ranges, emit_ranges, consume_ranges, Range, RangePayload};
pub use record::{Record, RecordStore};
pub use session::{EventFetcher, PublishOutcome, SubscriptionTable, SyncClient, SyncOutcome, Transport};
pub use subid::SubId;

pub type Result<T> = std::result::Result<T, Error>;
