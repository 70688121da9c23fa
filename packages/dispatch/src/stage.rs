//! Pipeline stages and their standard compositions.
//!
//! Every stage is an exchange-to-exchange step over a [`Service`]. A
//! [`Pipeline`] runs a fixed stage list in order:
//!
//! | Pipeline | Stages |
//! |----------|--------|
//! | [`Pipeline::full`] | authorize, assign endpoint, map request, send, map response |
//! | [`Pipeline::routing`] | authorize, assign endpoint |
//! | [`Pipeline::delivery`] | map request, send, map response |
//! | [`Pipeline::branch`] | assign endpoint, map request, send, map response |
//!
//! Once an exchange is resolved the remaining stages are skipped, except that
//! the response mapper still runs right after a send in the same pass. An
//! exchange that enters a pipeline already resolved leaves it untouched.

use async_trait::async_trait;
use conduit::Exchange;

use crate::service::Service;

/// One step of the dispatch pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs on resolved exchanges when the previous stage was a send.
    fn handles_response(&self) -> bool {
        false
    }

    fn is_send(&self) -> bool {
        false
    }

    async fn run(&self, service: &Service, exchange: Exchange) -> Exchange;
}

pub struct Authorize;
pub struct AssignEndpoint;
pub struct MapRequest;
pub struct SendRequest;
pub struct MapResponse;

#[async_trait]
impl Stage for Authorize {
    fn name(&self) -> &'static str {
        "authorize"
    }

    async fn run(&self, service: &Service, exchange: Exchange) -> Exchange {
        service.authorize(exchange).await
    }
}

#[async_trait]
impl Stage for AssignEndpoint {
    fn name(&self) -> &'static str {
        "assignEndpoint"
    }

    async fn run(&self, service: &Service, exchange: Exchange) -> Exchange {
        service.assign_endpoint(exchange)
    }
}

#[async_trait]
impl Stage for MapRequest {
    fn name(&self) -> &'static str {
        "mapRequest"
    }

    async fn run(&self, service: &Service, exchange: Exchange) -> Exchange {
        service.map_request(exchange)
    }
}

#[async_trait]
impl Stage for SendRequest {
    fn name(&self) -> &'static str {
        "send"
    }

    fn is_send(&self) -> bool {
        true
    }

    async fn run(&self, service: &Service, exchange: Exchange) -> Exchange {
        service.send(exchange).await
    }
}

#[async_trait]
impl Stage for MapResponse {
    fn name(&self) -> &'static str {
        "mapResponse"
    }

    fn handles_response(&self) -> bool {
        true
    }

    async fn run(&self, service: &Service, exchange: Exchange) -> Exchange {
        service.map_response(exchange)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

const FULL: &[&dyn Stage] = &[
    &Authorize,
    &AssignEndpoint,
    &MapRequest,
    &SendRequest,
    &MapResponse,
];
const ROUTING: &[&dyn Stage] = &[&Authorize, &AssignEndpoint];
const DELIVERY: &[&dyn Stage] = &[&MapRequest, &SendRequest, &MapResponse];
const BRANCH: &[&dyn Stage] = &[&AssignEndpoint, &MapRequest, &SendRequest, &MapResponse];

/// A fixed, ordered list of stages.
#[derive(Clone, Copy)]
pub struct Pipeline {
    stages: &'static [&'static dyn Stage],
}

impl Pipeline {
    pub fn full() -> Self {
        Self { stages: FULL }
    }

    pub fn routing() -> Self {
        Self { stages: ROUTING }
    }

    pub fn delivery() -> Self {
        Self { stages: DELIVERY }
    }

    /// What each fan-out branch runs: it is already authorized, but its
    /// endpoint is resolved again for the single id it carries.
    pub fn branch() -> Self {
        Self { stages: BRANCH }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, service: &Service, mut exchange: Exchange) -> Exchange {
        let mut just_sent = false;
        for stage in self.stages {
            if exchange.is_resolved() && !(just_sent && stage.handles_response()) {
                tracing::trace!(stage = stage.name(), status = ?exchange.status(), "skipped");
                just_sent = false;
                continue;
            }
            exchange = stage.run(service, exchange).await;
            just_sent = stage.is_send();
        }
        exchange
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.stage_names()).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::RequireIdent;
    use crate::transport::memory::MemoryTransporter;
    use conduit::{Endpoint, Ident, MatchRule, Mapper, Request, Status};
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> Arc<MemoryTransporter> {
        let t = MemoryTransporter::new();
        t.insert("entry", json!({ "id": "ent1", "title": "One" }));
        Arc::new(t)
    }

    fn marking_mapper() -> Arc<dyn Mapper> {
        Arc::new(|mut ex: Exchange| {
            if let Some(data) = ex.response.data.as_mut().and_then(|d| d.as_object_mut()) {
                data.insert("mapped".into(), json!(true));
            }
            ex
        })
    }

    fn service() -> Service {
        Service::new(
            "entries",
            vec![Endpoint::new(MatchRule::new().action("GET"))
                .with_response_mapper(marking_mapper())],
            store(),
        )
    }

    #[test]
    fn compositions_list_their_stages() {
        assert_eq!(
            Pipeline::full().stage_names(),
            ["authorize", "assignEndpoint", "mapRequest", "send", "mapResponse"]
        );
        assert_eq!(Pipeline::routing().stage_names(), ["authorize", "assignEndpoint"]);
        assert_eq!(Pipeline::delivery().stage_names(), ["mapRequest", "send", "mapResponse"]);
    }

    #[tokio::test]
    async fn full_pipeline_maps_response_after_send() {
        let ex = Exchange::new("GET", Request::for_type("entry").with_id("ent1"));
        let ex = Pipeline::full().run(&service(), ex).await;
        assert_eq!(ex.status(), Some(Status::Ok));
        assert_eq!(ex.response.data, Some(json!({ "id": "ent1", "title": "One", "mapped": true })));
    }

    #[tokio::test]
    async fn failed_send_still_reaches_response_mapper() {
        let ex = Exchange::new("GET", Request::for_type("entry").with_id("nope"));
        let ex = Pipeline::full().run(&service(), ex).await;
        assert_eq!(ex.status(), Some(Status::NotFound));
    }

    #[tokio::test]
    async fn refusal_short_circuits_everything_after() {
        let service = service().with_authorizer(Arc::new(RequireIdent::new()));
        let ex = Exchange::new("GET", Request::for_type("entry").with_id("ent1"));
        let ex = Pipeline::full().run(&service, ex).await;
        assert_eq!(ex.status(), Some(Status::NoAccess));
        assert!(ex.endpoint.is_none());
        assert!(ex.response.data.is_none());
    }

    #[tokio::test]
    async fn resolved_exchange_passes_through_unchanged() {
        let ex = Exchange::new("GET", Request::for_type("entry").with_id("ent1"))
            .with_ident(Ident::new("johnf"))
            .fail(Status::BadRequest, "already answered");
        let out = Pipeline::full().run(&service(), ex.clone()).await;
        assert_eq!(out, ex);
    }

    #[tokio::test]
    async fn unmatched_action_stops_before_send() {
        let t = store();
        let service = Service::new(
            "entries",
            vec![Endpoint::new(MatchRule::new().action("GET"))],
            t.clone(),
        );
        let ex = Exchange::new(
            "SET",
            Request::for_type("entry").with_data(json!({ "id": "ent2" })),
        );
        let ex = Pipeline::full().run(&service, ex).await;
        assert_eq!(ex.status(), Some(Status::Error));
        assert_eq!(t.get("entry", "ent2"), None);
    }
}
