//! Fan-out of multi-id actions and recombination of their results.
//!
//! An authorized action addressed to several ids, whose endpoint does not take
//! the whole list at once, is split into one branch per id. Each branch gets
//! its endpoint resolved again (it may land on a more specific `member`
//! endpoint) and is delivered on its own. [`combine`] then merges the answers
//! back into one response, in request order and all-or-nothing on failure.

use conduit::{Exchange, Status};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::DispatchError;
use crate::service::Service;
use crate::stage::Pipeline;

/// `true` when `exchange` should be split into one branch per id.
///
/// Requires a routed, authorized exchange whose id is a list and whose
/// endpoint does not accept the `members` scope.
pub fn should_fan_out(exchange: &Exchange) -> bool {
    let many_ids = exchange
        .request
        .id
        .as_ref()
        .is_some_and(|id| !id.is_single());
    let members_endpoint = exchange
        .endpoint
        .as_ref()
        .is_some_and(|endpoint| endpoint.accepts_members());
    many_ids && exchange.authorized && !members_endpoint
}

/// Run one branch per id of `parent` through [`Pipeline::branch`], at most
/// `limit` at a time. The returned branches are in request order, whatever
/// order they completed in.
pub async fn fan_out(service: &Service, parent: &Exchange, limit: usize) -> Vec<Exchange> {
    let ids = parent.request.ids();
    info!(
        service = %service.id(),
        action = %parent.action_type,
        cid = %parent.meta.id,
        branches = ids.len(),
        "fanning out"
    );

    let pipeline = Pipeline::branch();
    stream::iter(ids.iter().map(|id| parent.branch(id.as_str())))
        .map(|branch| pipeline.run(service, branch))
        .buffered(limit.max(1))
        .collect()
        .await
}

/// Merge branch results into `parent`.
///
/// Any branch that ended in a status other than `ok` or `notfound` fails the
/// whole exchange with an error listing the failed ids. Otherwise the answer
/// is `ok` with one data slot per requested id: the first element when the
/// branch returned a list, the data itself otherwise, `null` when the branch
/// found nothing.
pub fn combine(parent: Exchange, branches: Vec<Exchange>) -> Exchange {
    let requested = parent.request.ids().to_vec();

    let failed: Vec<(String, Status, Option<String>)> = requested
        .iter()
        .zip(&branches)
        .filter_map(|(id, branch)| {
            let status = branch.status().unwrap_or(Status::BadResponse);
            status
                .is_failure()
                .then(|| (id.clone(), status, branch.response.error.clone()))
        })
        .collect();

    if !failed.is_empty() {
        let err = DispatchError::FanOut { requested, failed };
        warn!(action = %parent.action_type, cid = %parent.meta.id, "fan-out failed: {err}");
        return err.respond(parent);
    }

    let slots: Vec<Value> = branches.into_iter().map(slot).collect();
    parent.respond_ok(Some(Value::Array(slots)))
}

// --- helpers -----------------------------------------------------------------

fn slot(branch: Exchange) -> Value {
    if branch.status() == Some(Status::NotFound) {
        return Value::Null;
    }
    match branch.response.data {
        Some(Value::Array(items)) => items.into_iter().next().unwrap_or(Value::Null),
        Some(data) => data,
        None => Value::Null,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
