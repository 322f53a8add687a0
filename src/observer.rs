use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::debug;

use crate::message::header::MessageType;
use crate::message::packet::Packet;
use crate::message::request::{CoAPRequest, Method};

const SEQUENCE_MASK: u32 = 0xFF_FFFF;

/// Half of the 24-bit sequence space, the RFC 7641 reordering window.
const SEQUENCE_HALF_RANGE: u32 = 1 << 23;

/// One registered observer of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverEntry {
    pub peer: SocketAddr,
    pub token: Vec<u8>,
}

#[derive(Default)]
struct ObservedResource {
    observers: Vec<ObserverEntry>,
    /// 24-bit lollipop sequence carried in every notification.
    sequence: u32,
}

/// Per-resource observer sets with notification sequence numbers.
/// Entries are added by a valid observe-GET and removed by an RST from
/// the peer (or registry shutdown); any notification-count cut-off is
/// the application's policy, not the registry's.
#[derive(Default)]
pub struct ObserveRegistry {
    resources: HashMap<String, ObservedResource>,
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

impl ObserveRegistry {
    pub fn new() -> ObserveRegistry {
        ObserveRegistry::default()
    }

    /// Registers a path as eligible for observation. Idempotent.
    pub fn add_observable_resource(&mut self, path: &str) {
        self.resources.entry(normalize(path)).or_default();
    }

    /// Whether the path has been registered as observable.
    pub fn is_resource_being_observed(&self, path: &str) -> bool {
        self.resources.contains_key(&normalize(path))
    }

    /// Records the requester of a valid observe-GET as an observer.
    /// Re-registration with the same (peer, token) replaces the prior
    /// entry. Returns false if the request does not qualify or the
    /// resource is not observable.
    pub fn add_resource_observer(&mut self, request: &CoAPRequest) -> bool {
        let peer = match request.source {
            Some(peer) => peer,
            None => return false,
        };
        if request.method() != Some(Method::Get) || !request.is_observe() {
            return false;
        }
        let token = request.message.token();
        if token.is_empty() {
            return false;
        }

        let resource = match self.resources.get_mut(&normalize(&request.path())) {
            Some(resource) => resource,
            None => return false,
        };

        let entry = ObserverEntry {
            peer,
            token: token.to_vec(),
        };
        resource
            .observers
            .retain(|o| !(o.peer == entry.peer && o.token == entry.token));
        debug!("observer {} registered for {}", peer, request.path());
        resource.observers.push(entry);
        true
    }

    /// Removes the observer matching an RST's (peer, token) from
    /// whichever resource holds it.
    pub fn remove_resource_observer(&mut self, packet: &Packet, peer: SocketAddr) -> bool {
        if packet.header.message_type != MessageType::Reset {
            return false;
        }
        let token = packet.token();
        let mut removed = false;
        for (path, resource) in self.resources.iter_mut() {
            let before = resource.observers.len();
            resource
                .observers
                .retain(|o| !(o.peer == peer && o.token == token));
            if resource.observers.len() < before {
                debug!("observer {} deregistered from {}", peer, path);
                removed = true;
            }
        }
        removed
    }

    /// Current observer set for fan-out.
    pub fn get_resource_observers(&self, path: &str) -> Vec<ObserverEntry> {
        self.resources
            .get(&normalize(path))
            .map(|r| r.observers.clone())
            .unwrap_or_default()
    }

    /// Advances and returns the resource's notification sequence
    /// number, wrapping within 24 bits. `None` if the path was never
    /// registered.
    pub fn next_sequence(&mut self, path: &str) -> Option<u32> {
        let resource = self.resources.get_mut(&normalize(path))?;
        resource.sequence = (resource.sequence + 1) & SEQUENCE_MASK;
        Some(resource.sequence)
    }

    /// Drops every observer. Used on channel shutdown.
    pub fn clear(&mut self) {
        for resource in self.resources.values_mut() {
            resource.observers.clear();
        }
    }
}

/// Client-side freshness check for incoming notifications, per
/// RFC 7641: a 24-bit sequence comparison with a half-range wrap
/// window, overridden by a staleness bound so a long-silent resource is
/// always accepted again.
pub struct FreshnessTracker {
    max_age: Duration,
    state: Option<(u32, Instant)>,
}

impl FreshnessTracker {
    pub fn new(max_age: Duration) -> FreshnessTracker {
        FreshnessTracker {
            max_age,
            state: None,
        }
    }

    /// Whether a notification carrying `new_seq` is fresh. On
    /// acceptance the tracked sequence and receive time are updated
    /// unconditionally, payload content notwithstanding.
    pub fn accept(&mut self, new_seq: u32, now: Instant) -> bool {
        let new_seq = new_seq & SEQUENCE_MASK;
        let fresh = match self.state {
            None => true,
            Some((last_seq, last_received_at)) => {
                (last_seq < new_seq && new_seq - last_seq < SEQUENCE_HALF_RANGE)
                    || (last_seq > new_seq && last_seq - new_seq > SEQUENCE_HALF_RANGE)
                    || now.duration_since(last_received_at) > self.max_age
            }
        };
        if fresh {
            self.state = Some((new_seq, now));
        }
        fresh
    }

    pub fn last_sequence(&self) -> Option<u32> {
        self.state.map(|(seq, _)| seq)
    }
}
