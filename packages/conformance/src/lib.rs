//! Shared fixtures for the Conduit conformance test suite.
//!
//! Provides [`ScriptedTransporter`], a backend whose answers, failures, and
//! latencies are set per id and which records every exchange it is sent, and
//! [`dispatcher_for`], which wires one service into a ready [`Dispatcher`]
//! under the `entry` type.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conduit::{Exchange, Mapper, Options, Status};
use conduit_dispatch::{DispatchConfig, Dispatcher, MemoryRegistry, Service, Transporter};
use serde_json::Value;

/// The type every fixture registry routes to the service under test.
pub const ENTRY: &str = "entry";

// ---------------------------------------------------------------------------
// ScriptedTransporter
// ---------------------------------------------------------------------------

/// A backend with scripted behaviour.
///
/// | Request | Answer |
/// |---------|--------|
/// | touches a failing id | that id's status, with a message naming it |
/// | one id | `ok` with the record, or `notfound` |
/// | several ids | `ok` with the records that exist, in request order |
/// | no id | `ok` with every record, in id order |
///
/// A send sleeps for the longest delay scripted for any of its ids before
/// answering.
#[derive(Default)]
pub struct ScriptedTransporter {
    records: BTreeMap<String, Value>,
    failures: HashMap<String, Status>,
    delays: HashMap<String, Duration>,
    sent: Mutex<Vec<Exchange>>,
}

impl ScriptedTransporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record. Records are keyed by their string `"id"`.
    pub fn with_record(mut self, record: Value) -> Self {
        if let Some(id) = record.get("id").and_then(Value::as_str) {
            self.records.insert(id.to_string(), record);
        }
        self
    }

    /// Answer any send touching `id` with `status`.
    pub fn failing(mut self, id: &str, status: Status) -> Self {
        self.failures.insert(id.to_string(), status);
        self
    }

    /// Delay any send touching `id` by `delay`.
    pub fn delayed(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    /// Every exchange sent so far, in the order sends started.
    pub fn sent(&self) -> Vec<Exchange> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[async_trait]
impl Transporter for ScriptedTransporter {
    async fn send(&self, exchange: Exchange, _options: &Options) -> Exchange {
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(exchange.clone());

        let ids = exchange.request.ids().to_vec();
        if let Some(delay) = ids.iter().filter_map(|id| self.delays.get(id)).max() {
            tokio::time::sleep(*delay).await;
        }

        if let Some((id, status)) = ids
            .iter()
            .find_map(|id| self.failures.get(id).map(|status| (id, *status)))
        {
            let message = format!("scripted {status} for {id}");
            return exchange.fail(status, message);
        }

        match ids.as_slice() {
            [] => {
                let all = self.records.values().cloned().collect();
                exchange.respond_ok(Some(Value::Array(all)))
            }
            [id] => match self.records.get(id) {
                Some(record) => exchange.respond_ok(Some(record.clone())),
                None => {
                    let message = format!("no record {id}");
                    exchange.fail(Status::NotFound, message)
                }
            },
            ids => {
                let found = ids.iter().filter_map(|id| self.records.get(id).cloned()).collect();
                exchange.respond_ok(Some(Value::Array(found)))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CountingMapper
// ---------------------------------------------------------------------------

/// An identity mapper that counts how often it runs.
#[derive(Default)]
pub struct CountingMapper {
    calls: AtomicUsize,
}

impl CountingMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Mapper for CountingMapper {
    fn map(&self, exchange: Exchange) -> Exchange {
        self.calls.fetch_add(1, Ordering::SeqCst);
        exchange
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// A dispatcher whose registry holds only `service`, mapped to [`ENTRY`].
pub fn dispatcher_for(service: Service, config: DispatchConfig) -> Dispatcher {
    let service_id = service.id().to_string();
    let registry = MemoryRegistry::new()
        .insert(service)
        .map_type(ENTRY, service_id);
    Dispatcher::new(Arc::new(registry), config)
}

/// Three records, `ent1` to `ent3`, each with a title.
pub fn seeded_backend() -> ScriptedTransporter {
    ScriptedTransporter::new()
        .with_record(serde_json::json!({ "id": "ent1", "title": "One" }))
        .with_record(serde_json::json!({ "id": "ent2", "title": "Two" }))
        .with_record(serde_json::json!({ "id": "ent3", "title": "Three" }))
}
