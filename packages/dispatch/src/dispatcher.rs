//! The entry point: one inbound action in, one answered exchange out.
//!
//! | Step | What happens |
//! |------|--------------|
//! | 1 | Normalize the id (`["x"]` becomes `"x"`, `[]` becomes no id) |
//! | 2 | Look up the service by service id or type; none is an `error` |
//! | 3 | Run [`Pipeline::routing`] on the whole exchange |
//! | 4 | Fan out per id, or run [`Pipeline::delivery`] once |
//! | 5 | Combine branch answers in request order |
//!
//! With a dispatch timeout configured, steps 2 to 5 race the timer; losing
//! drops every outstanding branch and answers `timeout`.

use std::sync::Arc;

use conduit::Exchange;
use tracing::{debug, warn};

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::fanout::{combine, fan_out, should_fan_out};
use crate::registry::ServiceRegistry;
use crate::service::Service;
use crate::stage::Pipeline;

pub struct Dispatcher {
    registry: Arc<dyn ServiceRegistry>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(registry: Arc<dyn ServiceRegistry>, config: DispatchConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Dispatch one action. Never fails: every problem is reported on the
    /// returned exchange's response.
    pub async fn dispatch_one(&self, mut exchange: Exchange) -> Exchange {
        exchange.normalize_id();

        let Some(limit) = self.config.dispatch_timeout else {
            return self.dispatch_inner(exchange).await;
        };

        let fallback = exchange.clone();
        match tokio::time::timeout(limit, self.dispatch_inner(exchange)).await {
            Ok(answered) => answered,
            Err(_) => {
                let err = DispatchError::Timeout {
                    what: "dispatch",
                    limit,
                };
                warn!(action = %fallback.action_type, cid = %fallback.meta.id, "{err}");
                err.respond(fallback)
            }
        }
    }

    async fn dispatch_inner(&self, exchange: Exchange) -> Exchange {
        let type_name = exchange.request.type_name.as_deref();
        let service_id = exchange.request.service_id.as_deref();
        let Some(service) = self.registry.get_service(type_name, service_id) else {
            let err = DispatchError::no_service(type_name, service_id);
            warn!(action = %exchange.action_type, "routing failed: {err}");
            return err.respond(exchange);
        };
        run_on_service(&service, exchange, &self.config).await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Route and deliver `exchange` on a known service, fanning out when the
/// exchange calls for it. The id must already be normalized.
pub async fn run_on_service(service: &Service, exchange: Exchange, config: &DispatchConfig) -> Exchange {
    let routed = Pipeline::routing().run(service, exchange).await;
    if routed.is_resolved() {
        return routed;
    }

    if should_fan_out(&routed) {
        let limit = config.fanout_limit(routed.request.ids().len());
        let branches = fan_out(service, &routed, limit).await;
        return combine(routed, branches);
    }

    debug!(
        service = %service.id(),
        action = %routed.action_type,
        cid = %routed.meta.id,
        "delivering"
    );
    Pipeline::delivery().run(service, routed).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
