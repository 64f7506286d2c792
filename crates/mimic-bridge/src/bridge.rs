//! Entry-point registry and outbound send path.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use mimic_common::{
    Error, HostInvocation, Result, ENTRY_RECEIVE_ICE_CANDIDATE, ENTRY_RECEIVE_OFFER,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, trace};

use crate::channel::HostChannel;

/// Named functions the host may call on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    ReceiveOffer,
    ReceiveIceCandidate,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 2] = [EntryPoint::ReceiveOffer, EntryPoint::ReceiveIceCandidate];

    pub fn name(self) -> &'static str {
        match self {
            EntryPoint::ReceiveOffer => ENTRY_RECEIVE_OFFER,
            EntryPoint::ReceiveIceCandidate => ENTRY_RECEIVE_ICE_CANDIDATE,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|entry| entry.name() == name)
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

type Handler = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Default)]
struct EntryTable {
    handlers: HashMap<EntryPoint, (u64, Handler)>,
    pending: VecDeque<(EntryPoint, Value)>,
    next_token: u64,
}

struct BridgeInner {
    channel: Option<Arc<dyn HostChannel>>,
    entries: Mutex<EntryTable>,
}

impl BridgeInner {
    fn entries(&self) -> MutexGuard<'_, EntryTable> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Cheaply cloneable handle to the host connection.
#[derive(Clone)]
pub struct HostBridge {
    inner: Arc<BridgeInner>,
}

impl HostBridge {
    pub fn new(channel: Arc<dyn HostChannel>) -> Self {
        Self::build(Some(channel))
    }

    /// A bridge with no host attached: sends are dropped, entry points still work.
    pub fn detached() -> Self {
        Self::build(None)
    }

    fn build(channel: Option<Arc<dyn HostChannel>>) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                channel,
                entries: Mutex::new(EntryTable::default()),
            }),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.inner.channel.is_some()
    }

    /// Serializes `message` to JSON and posts it to the host.
    pub fn send<T: Serialize>(&self, message: &T) -> Result<()> {
        let Some(channel) = &self.inner.channel else {
            trace!("No host channel attached, dropping outbound message");
            return Ok(());
        };
        let text = serde_json::to_string(message)?;
        channel.post_message(text)
    }

    /// Installs the handler for `entry`, replacing any previous one.
    ///
    /// Invocations that arrived before registration are delivered first, in
    /// arrival order. The handler stays installed until the returned
    /// registration is dropped.
    pub fn register<F>(&self, entry: EntryPoint, handler: F) -> EntryRegistration
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let (token, backlog) = {
            let mut table = self.inner.entries();
            table.next_token += 1;
            let token = table.next_token;
            table.handlers.insert(entry, (token, handler.clone()));

            let mut backlog = Vec::new();
            let mut remaining = VecDeque::with_capacity(table.pending.len());
            for (pending_entry, data) in table.pending.drain(..) {
                if pending_entry == entry {
                    backlog.push(data);
                } else {
                    remaining.push_back((pending_entry, data));
                }
            }
            table.pending = remaining;
            (token, backlog)
        };

        if !backlog.is_empty() {
            debug!("Replaying {} buffered {} invocation(s)", backlog.len(), entry);
        }
        for data in backlog {
            call_handler(entry, &handler, data);
        }

        EntryRegistration {
            entry,
            token,
            bridge: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers a host call, buffering it if the entry point has no handler yet.
    pub fn invoke(&self, entry: EntryPoint, data: Value) {
        let handler = {
            let mut table = self.inner.entries();
            match table.handlers.get(&entry) {
                Some((_, handler)) => handler.clone(),
                None => {
                    table.pending.push_back((entry, data));
                    debug!("Buffered {} invocation until a handler registers", entry);
                    return;
                }
            }
        };
        call_handler(entry, &handler, data);
    }

    pub fn invoke_named(&self, name: &str, data: Value) -> Result<()> {
        let entry = EntryPoint::from_name(name)
            .ok_or_else(|| Error::bridge(format!("unknown entry point: {name}")))?;
        self.invoke(entry, data);
        Ok(())
    }

    /// Parses one `{"entry": ..., "data": ...}` line from the host and invokes it.
    pub fn dispatch_line(&self, line: &str) -> Result<()> {
        let invocation: HostInvocation = serde_json::from_str(line)?;
        self.invoke_named(&invocation.entry, invocation.data)
    }

    pub fn is_registered(&self, entry: EntryPoint) -> bool {
        self.inner.entries().handlers.contains_key(&entry)
    }

    pub fn pending_invocations(&self) -> usize {
        self.inner.entries().pending.len()
    }
}

impl fmt::Debug for HostBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBridge")
            .field("attached", &self.is_attached())
            .finish()
    }
}

fn call_handler(entry: EntryPoint, handler: &Handler, data: Value) {
    if catch_unwind(AssertUnwindSafe(|| (**handler)(data))).is_err() {
        error!("Handler for {} panicked", entry);
    }
}

/// Keeps an entry-point handler installed. Dropping it deregisters the handler.
#[must_use = "dropping the registration removes the handler"]
pub struct EntryRegistration {
    entry: EntryPoint,
    token: u64,
    bridge: Weak<BridgeInner>,
}

impl EntryRegistration {
    pub fn entry(&self) -> EntryPoint {
        self.entry
    }
}

impl fmt::Debug for EntryRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryRegistration")
            .field("entry", &self.entry)
            .field("token", &self.token)
            .finish()
    }
}

impl Drop for EntryRegistration {
    fn drop(&mut self) {
        let Some(inner) = self.bridge.upgrade() else {
            return;
        };
        let mut table = inner.entries();
        let current = table.handlers.get(&self.entry).map(|(token, _)| *token);
        if current == Some(self.token) {
            table.handlers.remove(&self.entry);
            debug!("Deregistered {}", self.entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::QueueChannel;
    use mimic_common::SignalMessage;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<Value>>>, impl Fn(Value) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |value: Value| sink.lock().unwrap().push(value))
    }

    #[test]
    fn test_entry_names() {
        assert_eq!(EntryPoint::ReceiveOffer.name(), "receiveOffer");
        assert_eq!(
            EntryPoint::from_name("receiveIceCandidate"),
            Some(EntryPoint::ReceiveIceCandidate)
        );
        assert_eq!(EntryPoint::from_name("receiveAnswer"), None);
    }

    #[test]
    fn test_send_serializes_to_host() {
        let (channel, mut rx) = QueueChannel::new();
        let bridge = HostBridge::new(Arc::new(channel));
        bridge.send(&SignalMessage::ReadyNotice).unwrap();
        assert_eq!(rx.try_recv().unwrap(), r#"{"type":"ready"}"#);
    }

    #[test]
    fn test_detached_send_is_a_no_op() {
        let bridge = HostBridge::detached();
        assert!(!bridge.is_attached());
        assert!(bridge.send(&SignalMessage::ReadyNotice).is_ok());
    }

    #[test]
    fn test_early_invocations_replay_in_order() {
        let bridge = HostBridge::detached();
        bridge.invoke(EntryPoint::ReceiveIceCandidate, json!(1));
        bridge.invoke(EntryPoint::ReceiveOffer, json!("offer"));
        bridge.invoke(EntryPoint::ReceiveIceCandidate, json!(2));
        assert_eq!(bridge.pending_invocations(), 3);

        let (seen, handler) = recorder();
        let _registration = bridge.register(EntryPoint::ReceiveIceCandidate, handler);
        assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(2)]);
        assert_eq!(bridge.pending_invocations(), 1);

        bridge.invoke(EntryPoint::ReceiveIceCandidate, json!(3));
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_dropping_registration_deregisters() {
        let bridge = HostBridge::detached();
        let (seen, handler) = recorder();
        let registration = bridge.register(EntryPoint::ReceiveOffer, handler);
        assert!(bridge.is_registered(EntryPoint::ReceiveOffer));
        drop(registration);
        assert!(!bridge.is_registered(EntryPoint::ReceiveOffer));

        bridge.invoke(EntryPoint::ReceiveOffer, json!("late"));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(bridge.pending_invocations(), 1);
    }

    #[test]
    fn test_stale_registration_keeps_newer_handler() {
        let bridge = HostBridge::detached();
        let (_, first) = recorder();
        let (seen, second) = recorder();
        let old = bridge.register(EntryPoint::ReceiveOffer, first);
        let _new = bridge.register(EntryPoint::ReceiveOffer, second);
        drop(old);

        bridge.invoke(EntryPoint::ReceiveOffer, json!("x"));
        assert_eq!(*seen.lock().unwrap(), vec![json!("x")]);
    }

    #[test]
    fn test_handler_panic_is_contained() {
        let bridge = HostBridge::detached();
        let _registration = bridge.register(EntryPoint::ReceiveOffer, |_| panic!("boom"));
        bridge.invoke(EntryPoint::ReceiveOffer, json!({}));
        assert!(bridge.is_registered(EntryPoint::ReceiveOffer));
    }

    #[test]
    fn test_dispatch_line() {
        let bridge = HostBridge::detached();
        let (seen, handler) = recorder();
        let _registration = bridge.register(EntryPoint::ReceiveOffer, handler);

        bridge
            .dispatch_line(r#"{"entry":"receiveOffer","data":{"sdp":"v=0"}}"#)
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![json!({"sdp": "v=0"})]);

        assert!(bridge.dispatch_line(r#"{"entry":"bogus"}"#).is_err());
        assert!(bridge.dispatch_line("not json").is_err());
    }

    #[test]
    fn test_early_offer_survives_candidate_burst() {
        let bridge = HostBridge::detached();
        bridge.invoke(EntryPoint::ReceiveOffer, json!({"sdp": "v=0"}));
        for i in 0..1000 {
            bridge.invoke(EntryPoint::ReceiveIceCandidate, json!(i));
        }
        assert_eq!(bridge.pending_invocations(), 1001);

        let (offers, on_offer) = recorder();
        let (candidates, on_candidate) = recorder();
        let _offer = bridge.register(EntryPoint::ReceiveOffer, on_offer);
        let _candidate = bridge.register(EntryPoint::ReceiveIceCandidate, on_candidate);
        assert_eq!(*offers.lock().unwrap(), vec![json!({"sdp": "v=0"})]);

        let candidates = candidates.lock().unwrap();
        assert_eq!(candidates.len(), 1000);
        assert_eq!(candidates.first(), Some(&json!(0)));
        assert_eq!(candidates.last(), Some(&json!(999)));
        drop(candidates);
        assert_eq!(bridge.pending_invocations(), 0);
    }
}
