//! The session layer: the collaborator interfaces named in §6 plus a
//! working client built from them.
//!
//! None of this ships relay I/O. [`Transport`] is the seam a host app fills
//! in with its real relay connection (an `ewebsock`-style non-blocking
//! socket, in `enostr`'s case); [`EventFetcher`] is the seam for turning
//! `need` ids into actual events once reconciliation converges. Only the
//! framing, subscription bookkeeping, and timeout handling around those
//! seams live here.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::SyncConfig;
use crate::driver::Driver;
use crate::error::{self, Error};
use crate::record::RecordStore;
use crate::subid::SubId;

/// Something that can carry NEG-* envelopes to and from a relay.
///
/// Polled rather than blocking, matching the non-blocking websocket event
/// model a real relay pool is built on: `try_recv` returns immediately with
/// `None` when nothing is waiting.
pub trait Transport {
    fn send(&mut self, envelope: String) -> Result<(), Error>;
    fn try_recv(&mut self) -> Result<Option<String>, Error>;
    fn is_alive(&self) -> bool;
}

/// The event-store consumer: turns ids the reconciliation found missing
/// into full events. A real implementation issues a `REQ` over the same
/// transport and collects `EVENT`s until `EOSE`; that's nostr-message
/// plumbing and out of scope here.
pub trait EventFetcher {
    fn fetch(&mut self, ids: &[String]) -> Result<Vec<Value>, Error>;
}

/// Result of driving one reconciliation to convergence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub have_ids: Vec<String>,
    pub need_ids: Vec<String>,
}

/// Result of [`SyncClient::publish`].
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub accepted: bool,
    pub message: Option<String>,
}

/// A NEG-* envelope, one array-per-line over the duplex text channel.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Envelope {
    NegMsg { sub: String, msg_hex: String },
    NegErr { sub: String, reason: String },
    Notice { text: String },
    Other,
}

impl Envelope {
    fn parse(text: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(text)?;
        let arr = value
            .as_array()
            .ok_or_else(|| Error::Malformed("envelope is not a JSON array"))?;
        let tag = arr.first().and_then(Value::as_str).unwrap_or("");

        match tag {
            "NEG-MSG" => {
                let sub = arr.get(1).and_then(Value::as_str).unwrap_or_default().to_string();
                let msg_hex = arr.get(2).and_then(Value::as_str).unwrap_or_default().to_string();
                Ok(Self::NegMsg { sub, msg_hex })
            }
            "NEG-ERR" => {
                let sub = arr.get(1).and_then(Value::as_str).unwrap_or_default().to_string();
                let reason = arr.get(2).and_then(Value::as_str).unwrap_or_default().to_string();
                Ok(Self::NegErr { sub, reason })
            }
            "NOTICE" => {
                let text = arr.get(1).and_then(Value::as_str).unwrap_or_default().to_string();
                Ok(Self::Notice { text })
            }
            _ => Ok(Self::Other),
        }
    }
}

fn neg_open(sub: &SubId, filter: &Value, init_hex: &str) -> String {
    format!(r#"["NEG-OPEN","{}",{},"{}"]"#, sub.to_str(), filter, init_hex)
}

fn neg_msg(sub: &SubId, msg_hex: &str) -> String {
    format!(r#"["NEG-MSG","{}","{}"]"#, sub.to_str(), msg_hex)
}

fn neg_close(sub: &SubId) -> String {
    format!(r#"["NEG-CLOSE","{}"]"#, sub.to_str())
}

/// Client-side entry point: owns one transport, multiplexing sessions
/// across it by subscription id.
pub struct SyncClient<T: Transport> {
    transport: T,
    config: SyncConfig,
    poll_interval: Duration,
}

impl<T: Transport> SyncClient<T> {
    pub fn new(transport: T, config: SyncConfig) -> Self {
        Self {
            transport,
            config,
            poll_interval: Duration::from_millis(20),
        }
    }

    /// Open a session, drive reconciliation against `store` to convergence,
    /// and return the symmetric-difference id sets.
    pub async fn sync(&mut self, store: RecordStore, filter: Value) -> Result<SyncOutcome, Error> {
        let sub = SubId::new("negentropy-sync".to_string());
        let mut driver = Driver::new(store);

        let init_msg = driver.initiate()?;
        let open = neg_open(&sub, &filter, &hex::encode(&init_msg));
        self.transport.send(open)?;
        debug!(sub = %sub, "opened negentropy session");

        let outcome = tokio::time::timeout(self.config.reconcile_timeout, self.drive(&sub, &mut driver)).await;

        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(sub = %sub, "reconciliation timed out");
                let _ = self.transport.send(neg_close(&sub));
                Err(Error::Timeout)
            }
        }
    }

    async fn drive(&mut self, sub: &SubId, driver: &mut Driver) -> Result<SyncOutcome, Error> {
        loop {
            if !self.transport.is_alive() {
                error!(sub = %sub, "transport went down mid-reconciliation");
                return Err(Error::TransportDown("transport reported not alive".to_string()));
            }

            let Some(text) = self.transport.try_recv()? else {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            };

            match Envelope::parse(&text)? {
                Envelope::NegMsg { sub: msg_sub, msg_hex } if msg_sub == sub.to_str() => {
                    let bytes = match hex::decode(&msg_hex) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            let _ = self.transport.send(neg_close(sub));
                            return Err(Error::from(e));
                        }
                    };
                    match driver.reconcile(&bytes) {
                        Ok(Some(reply)) => {
                            self.transport.send(neg_msg(sub, &hex::encode(&reply)))?;
                        }
                        Ok(None) => {
                            self.transport.send(neg_close(sub))?;
                            let (have_ids, need_ids) = driver.result();
                            debug!(sub = %sub, have = have_ids.len(), need = need_ids.len(), "reconciliation converged");
                            return Ok(SyncOutcome { have_ids, need_ids });
                        }
                        Err(e) => {
                            error!(sub = %sub, error = %e, "failed to reconcile NEG-MSG");
                            let _ = self.transport.send(neg_close(sub));
                            return Err(e);
                        }
                    }
                }
                Envelope::NegErr { sub: err_sub, reason } if err_sub == sub.to_str() => {
                    warn!(sub = %sub, reason = %reason, "relay sent NEG-ERR");
                    let _ = self.transport.send(neg_close(sub));
                    return Err(error::split_peer_reason(&reason));
                }
                Envelope::Notice { text } if text.to_lowercase().contains("negentropy") => {
                    warn!(sub = %sub, text = %text, "NOTICE mentioning negentropy; treating as session-fatal");
                    let _ = self.transport.send(neg_close(sub));
                    return Err(error::split_peer_reason(&text));
                }
                _ => {
                    // not ours: a companion REQ/EVENT/EOSE/OK frame, or a
                    // message for a different subscription.
                }
            }
        }
    }

    /// As [`Self::sync`], then fetch the events the reconciliation found
    /// missing.
    pub async fn sync_and_fetch(
        &mut self,
        store: RecordStore,
        filter: Value,
        fetcher: &mut impl EventFetcher,
    ) -> Result<Vec<Value>, Error> {
        let outcome = self.sync(store, filter).await?;
        if outcome.need_ids.is_empty() {
            return Ok(Vec::new());
        }
        fetcher.fetch(&outcome.need_ids)
    }

    /// Publish one event and await the relay's `OK` acknowledgement.
    pub async fn publish(&mut self, event: Value) -> Result<PublishOutcome, Error> {
        let msg = format!(r#"["EVENT",{event}]"#);
        self.transport.send(msg)?;

        let wait = async {
            loop {
                let Some(text) = self.transport.try_recv()? else {
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                };
                if let Ok(value) = serde_json::from_str::<Value>(&text) {
                    if value.get(0).and_then(Value::as_str) == Some("OK") {
                        let accepted = value.get(2).and_then(Value::as_bool).unwrap_or(false);
                        let message = value.get(3).and_then(Value::as_str).map(str::to_string);
                        return Ok(PublishOutcome { accepted, message });
                    }
                }
            }
        };

        match tokio::time::timeout(self.config.publish_timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Tear down (no open sessions are tracked outside `sync`'s own loop,
    /// so this just drops the transport's remaining liveness).
    pub fn close(self) -> T {
        self.transport
    }
}

/// Subscription multiplexing table a host app can use to route inbound
/// frames to the right session when running several concurrent syncs over
/// one transport (§5's "shared resources" note). Routing only; no relay
/// I/O behind it.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    active: HashMap<String, SubId>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sub: SubId) {
        self.active.insert(sub.to_string(), sub);
    }

    pub fn remove(&mut self, sub_id: &str) -> Option<SubId> {
        self.active.remove(sub_id)
    }

    pub fn contains(&self, sub_id: &str) -> bool {
        self.active.contains_key(sub_id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
