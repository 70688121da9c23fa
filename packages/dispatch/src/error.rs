//! Dispatch-level failures and their rendering into response envelopes.
//!
//! Nothing in the pipeline returns `Err` to its caller: every failure becomes
//! an [`Exchange`] resolved with a status from the closed taxonomy. A
//! [`DispatchError`] names the failure, [`DispatchError::status`] picks the
//! status, and [`DispatchError::respond`] writes both onto the exchange.

use std::time::Duration;

use conduit::{Exchange, Scope, Status};

/// A reason the dispatcher resolved an exchange without a backend answer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    /// The registry knows no service for the requested id or type.
    #[error("{}", describe_missing_service(.type_name.as_deref(), .service_id.as_deref()))]
    NoService {
        type_name: Option<String>,
        service_id: Option<String>,
    },

    /// No endpoint on the service matches the action.
    #[error(
        "no endpoint on service '{service}' matches action {action} \
         (type: {}, scope: {scope}{})",
        .type_name.as_deref().unwrap_or("none"),
        .endpoint_id.as_deref().map(|id| format!(", endpoint id: {id}")).unwrap_or_default()
    )]
    NoEndpoint {
        service: String,
        action: String,
        type_name: Option<String>,
        scope: Scope,
        endpoint_id: Option<String>,
    },

    /// One or more fan-out branches failed. `failed` holds `(id, status)`
    /// pairs in request order.
    #[error(
        "{} of {} requests for ids [{}] failed: {}",
        .failed.len(),
        .requested.len(),
        .requested.join(", "),
        describe_failures(.failed)
    )]
    FanOut {
        requested: Vec<String>,
        failed: Vec<(String, Status, Option<String>)>,
    },

    /// The transporter left the exchange without a status.
    #[error("service '{service}' answered without a status")]
    MissingStatus { service: String },

    /// The send stage or the whole dispatch took too long.
    #[error("{what} timed out after {} ms", .limit.as_millis())]
    Timeout { what: &'static str, limit: Duration },
}

impl DispatchError {
    /// The response status this failure resolves an exchange with.
    pub fn status(&self) -> Status {
        match self {
            DispatchError::Timeout { .. } => Status::Timeout,
            DispatchError::MissingStatus { .. } => Status::BadResponse,
            DispatchError::NoService { .. }
            | DispatchError::NoEndpoint { .. }
            | DispatchError::FanOut { .. } => Status::Error,
        }
    }

    /// Resolve `exchange` with this failure's status and message.
    pub fn respond(self, exchange: Exchange) -> Exchange {
        let status = self.status();
        exchange.fail(status, self.to_string())
    }

    pub fn no_service(type_name: Option<&str>, service_id: Option<&str>) -> Self {
        DispatchError::NoService {
            type_name: type_name.map(String::from),
            service_id: service_id.map(String::from),
        }
    }

    pub fn no_endpoint(service: &str, exchange: &Exchange) -> Self {
        DispatchError::NoEndpoint {
            service: service.to_string(),
            action: exchange.action_type.clone(),
            type_name: exchange.request.type_name.clone(),
            scope: exchange.scope(),
            endpoint_id: exchange.request.endpoint_id.clone(),
        }
    }
}

// --- helpers -----------------------------------------------------------------

fn describe_missing_service(type_name: Option<&str>, service_id: Option<&str>) -> String {
    match (service_id, type_name) {
        (Some(id), _) => format!("no service with id '{id}'"),
        (None, Some(t)) => format!("no service for type '{t}'"),
        (None, None) => "no service id or type given; cannot pick a service".to_string(),
    }
}

fn describe_failures(failed: &[(String, Status, Option<String>)]) -> String {
    failed
        .iter()
        .map(|(id, status, message)| match message {
            Some(message) => format!("{id} ({status}: {message})"),
            None => format!("{id} ({status})"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
