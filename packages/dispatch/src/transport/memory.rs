//! In-memory transporter implementation.
//!
//! Records are held in RAM behind a [`RwLock`] and are lost when the process
//! exits. Use this for tests, the conformance suite, and for trying out
//! definition files before a real adapter exists.
//!
//! Records are JSON objects grouped by schema type and keyed by their `"id"`
//! field. Each type's records live in a [`BTreeMap`], so collection reads come
//! back in id order without a separate index.
//!
//! | Action | Scope | Result |
//! |--------|-------|--------|
//! | `GET` | collection | `ok`, array of every record of the type |
//! | `GET` | member | `ok` with the record, or `notfound` |
//! | `GET` | members | `ok`, array of the records that exist, in request order |
//! | `SET` | any | `ok` with the stored records; `badrequest` if one lacks an id |
//! | `DELETE` | member(s) | `ok` if anything was removed, else `notfound` |
//! | other | any | `noaction` |
//!
//! The option `"type"` overrides the request type as the record group, which
//! lets several schema types share one group.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use conduit::{Exchange, Options, Status};
use serde_json::Value;

use super::Transporter;

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

type Records = BTreeMap<String, Value>;

struct Inner {
    /// Type → id → record.
    groups: HashMap<String, Records>,
}

// ---------------------------------------------------------------------------
// MemoryTransporter
// ---------------------------------------------------------------------------

/// Thread-safe, in-memory implementation of [`Transporter`].
pub struct MemoryTransporter {
    inner: RwLock<Inner>,
}

impl MemoryTransporter {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                groups: HashMap::new(),
            }),
        }
    }

    /// Seed a record directly, bypassing any dispatch. The record must carry
    /// a string `"id"`; records without one are ignored.
    pub fn insert(&self, type_name: &str, record: Value) {
        let Some(id) = record_id(&record) else {
            return;
        };
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        inner
            .groups
            .entry(type_name.to_string())
            .or_default()
            .insert(id, record);
    }

    /// Read a record directly, bypassing any dispatch.
    pub fn get(&self, type_name: &str, id: &str) -> Option<Value> {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        inner.groups.get(type_name).and_then(|g| g.get(id)).cloned()
    }

    /// Number of records stored for `type_name`.
    pub fn len(&self, type_name: &str) -> usize {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        inner.groups.get(type_name).map_or(0, BTreeMap::len)
    }

    fn handle_get(&self, group: &str, exchange: Exchange) -> Exchange {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        let records = inner.groups.get(group);
        let lookup = |id: &String| records.and_then(|r| r.get(id)).cloned();

        let ids = exchange.request.ids().to_vec();
        match ids.as_slice() {
            [] => {
                let all = records
                    .map(|r| r.values().cloned().collect())
                    .unwrap_or_default();
                exchange.respond_ok(Some(Value::Array(all)))
            }
            [id] => match lookup(id) {
                Some(record) => exchange.respond_ok(Some(record)),
                None => {
                    let message = format!("no {group} with id '{id}'");
                    exchange.fail(Status::NotFound, message)
                }
            },
            ids => {
                let found: Vec<Value> = ids.iter().filter_map(lookup).collect();
                exchange.respond_ok(Some(Value::Array(found)))
            }
        }
    }

    fn handle_set(&self, group: &str, exchange: Exchange) -> Exchange {
        let Some(records) = records_to_set(exchange.request.data.as_ref()) else {
            return exchange.fail(Status::BadRequest, "no data to set");
        };
        if records.iter().any(|r| record_id(r).is_none()) {
            return exchange.fail(Status::BadRequest, "every record to set needs a string id");
        }

        {
            let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
            let group = inner.groups.entry(group.to_string()).or_default();
            for record in &records {
                if let Some(id) = record_id(record) {
                    group.insert(id, record.clone());
                }
            }
        }

        let data = if matches!(exchange.request.data, Some(Value::Array(_))) {
            Value::Array(records)
        } else {
            records.into_iter().next().unwrap_or(Value::Null)
        };
        exchange.respond_ok(Some(data))
    }

    fn handle_delete(&self, group: &str, exchange: Exchange) -> Exchange {
        let ids = exchange.request.ids().to_vec();
        if ids.is_empty() {
            return exchange.fail(Status::BadRequest, "delete needs at least one id");
        }
        let removed = {
            let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
            match inner.groups.get_mut(group) {
                Some(records) => ids.iter().filter(|id| records.remove(*id).is_some()).count(),
                None => 0,
            }
        };
        if removed == 0 {
            let message = format!("no {group} with id(s) {}", ids.join(", "));
            exchange.fail(Status::NotFound, message)
        } else {
            exchange.respond_ok(None)
        }
    }
}

impl Default for MemoryTransporter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Transporter impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Transporter for MemoryTransporter {
    async fn send(&self, exchange: Exchange, options: &Options) -> Exchange {
        let group = options
            .get("type")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| exchange.request.type_name.clone())
            .unwrap_or_default();

        let action = exchange.action_type.clone();
        match action.as_str() {
            "GET" => self.handle_get(&group, exchange),
            "SET" => self.handle_set(&group, exchange),
            "DELETE" => self.handle_delete(&group, exchange),
            other => {
                let message = format!("memory transporter has nothing to do for {other}");
                exchange.fail(Status::NoAction, message)
            }
        }
    }
}

// --- helpers -----------------------------------------------------------------

fn records_to_set(data: Option<&Value>) -> Option<Vec<Value>> {
    match data? {
        Value::Array(items) => Some(items.clone()),
        item @ Value::Object(_) => Some(vec![item.clone()]),
        _ => None,
    }
}

fn record_id(record: &Value) -> Option<String> {
    record.get("id").and_then(Value::as_str).map(String::from)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
