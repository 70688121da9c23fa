//! A configured backend and the pipeline stages it provides.
//!
//! A [`Service`] owns a specificity-sorted endpoint list, an
//! [`Authorizer`], and a [`Transporter`]. Each of its stage methods takes an
//! exchange and returns it, so they compose into the pipelines in
//! [`crate::stage`]. A service holds no per-request state and is shared
//! behind an `Arc` by every concurrent dispatch.

use std::sync::Arc;
use std::time::Duration;

use conduit::{match_endpoint, sort_endpoints, Endpoint, Exchange, Options};
use tracing::{debug, warn};

use crate::auth::{AllowAll, Authorizer};
use crate::error::DispatchError;
use crate::transport::Transporter;

pub struct Service {
    id: String,
    endpoints: Vec<Arc<Endpoint>>,
    authorizer: Arc<dyn Authorizer>,
    transporter: Arc<dyn Transporter>,
    options: Options,
    send_timeout: Option<Duration>,
}

impl Service {
    /// Create a service. `endpoints` are sorted by specificity here, keeping
    /// definition order among equally specific ones. The service authorizes
    /// everything until [`with_authorizer`](Self::with_authorizer) says
    /// otherwise.
    pub fn new(
        id: impl Into<String>,
        endpoints: Vec<Endpoint>,
        transporter: Arc<dyn Transporter>,
    ) -> Self {
        let mut endpoints: Vec<Arc<Endpoint>> = endpoints.into_iter().map(Arc::new).collect();
        sort_endpoints(&mut endpoints);
        Self {
            id: id.into(),
            endpoints,
            authorizer: Arc::new(AllowAll),
            transporter,
            options: Options::new(),
            send_timeout: None,
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Service-wide transporter options. Endpoint options override them key
    /// by key.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_send_timeout(mut self, limit: Option<Duration>) -> Self {
        self.send_timeout = limit;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Endpoints in resolution order.
    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout
    }

    // --- stages --------------------------------------------------------------

    /// Run the authorizer. An exchange the authorizer resolves (refuses) is
    /// never marked authorized.
    pub async fn authorize(&self, exchange: Exchange) -> Exchange {
        let mut exchange = self.authorizer.authorize(exchange).await;
        if exchange.is_resolved() {
            exchange.authorized = false;
        }
        exchange
    }

    /// Attach the first matching endpoint, or resolve the exchange with a
    /// routing error naming the action.
    pub fn assign_endpoint(&self, mut exchange: Exchange) -> Exchange {
        match match_endpoint(&self.endpoints, &exchange) {
            Some(endpoint) => {
                debug!(
                    service = %self.id,
                    action = %exchange.action_type,
                    endpoint = endpoint.id.as_deref().unwrap_or("<unnamed>"),
                    scope = %exchange.scope(),
                    "endpoint assigned"
                );
                exchange.endpoint = Some(Arc::clone(endpoint));
                exchange
            }
            None => {
                let err = DispatchError::no_endpoint(&self.id, &exchange);
                warn!(service = %self.id, cid = ?exchange.meta.cid, "routing failed: {err}");
                err.respond(exchange)
            }
        }
    }

    /// Translate the canonical request into the backend's shape with the
    /// endpoint's request mapper.
    pub fn map_request(&self, exchange: Exchange) -> Exchange {
        match exchange.endpoint.clone() {
            Some(endpoint) => endpoint.request_mapper.map(exchange),
            None => DispatchError::no_endpoint(&self.id, &exchange).respond(exchange),
        }
    }

    /// Hand the exchange to the transporter with the merged options.
    ///
    /// A configured send timeout resolves the exchange with `timeout` when it
    /// elapses; an answer without a status becomes `badresponse`.
    pub async fn send(&self, exchange: Exchange) -> Exchange {
        let options = self.options_for(exchange.endpoint.as_deref());

        let answered = match self.send_timeout {
            Some(limit) => {
                let fallback = exchange.clone();
                let call = self.transporter.send(exchange, &options);
                match tokio::time::timeout(limit, call).await {
                    Ok(answered) => answered,
                    Err(_) => {
                        warn!(service = %self.id, "send timed out after {} ms", limit.as_millis());
                        return DispatchError::Timeout {
                            what: "send",
                            limit,
                        }
                        .respond(fallback);
                    }
                }
            }
            None => self.transporter.send(exchange, &options).await,
        };

        if answered.is_resolved() {
            answered
        } else {
            DispatchError::MissingStatus {
                service: self.id.clone(),
            }
            .respond(answered)
        }
    }

    /// Translate the backend's answer back into canonical shape with the
    /// endpoint's response mapper. Exchanges without an endpoint pass through.
    pub fn map_response(&self, exchange: Exchange) -> Exchange {
        match exchange.endpoint.clone() {
            Some(endpoint) => endpoint.response_mapper.map(exchange),
            None => exchange,
        }
    }

    // --- helpers -------------------------------------------------------------

    fn options_for(&self, endpoint: Option<&Endpoint>) -> Options {
        let mut options = self.options.clone();
        if let Some(endpoint) = endpoint {
            for (key, value) in &endpoint.options {
                options.insert(key.clone(), value.clone());
            }
        }
        options
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.id)
            .field("endpoints", &self.endpoints.len())
            .field("options", &self.options)
            .field("send_timeout", &self.send_timeout)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
