//! Human-readable text rendering of endpoints and resolution order.
//!
//! The output is stable plain text for terminals and logs. It is not a
//! canonical format; only the JSON definitions are normative.

use crate::endpoint::{Endpoint, MatchRule};
use crate::types::{OneOrMany, Scope};

/// Render one endpoint's match rule on a single line.
///
/// ```text
/// getEntry  type=entry scope=member action=GET|SET params=[id*, since?] filters=[data.draft == false]
/// ```
///
/// Required params are marked `*`, optional ones `?`. An endpoint without an
/// id is labelled by its position.
pub fn render_endpoint(endpoint: &Endpoint, index: usize) -> String {
    let label = endpoint.label(index);
    let rule = render_rule(&endpoint.rule);
    if rule.is_empty() {
        format!("{label}  (matches anything)")
    } else {
        format!("{label}  {rule}")
    }
}

/// Render a service's endpoints, numbered in resolution order.
///
/// ```text
/// entries  3 endpoints
/// ────────────────────
///   1. getOne  scope=member
///   2. #1  action=GET
///   3. #2  (matches anything)
/// ```
pub fn render_order<E: AsRef<Endpoint>>(service_id: &str, endpoints: &[E]) -> String {
    let count = endpoints.len();
    let header = format!(
        "{}  {} endpoint{}",
        service_id,
        count,
        if count == 1 { "" } else { "s" }
    );
    let rule = "─".repeat(header.chars().count());
    let mut out = format!("{}\n{}\n", header, rule);
    for (index, endpoint) in endpoints.iter().enumerate() {
        out.push_str(&format!(
            "  {}. {}\n",
            index + 1,
            render_endpoint(endpoint.as_ref(), index)
        ));
    }
    out
}

// --- helpers -----------------------------------------------------------------

fn render_rule(rule: &MatchRule) -> String {
    let mut parts = Vec::new();

    if let Some(types) = &rule.type_name {
        parts.push(format!("type={}", join(types, String::as_str)));
    }
    if let Some(scopes) = &rule.scope {
        parts.push(format!("scope={}", join_display(scopes)));
    }
    if let Some(actions) = &rule.action {
        parts.push(format!("action={}", join(actions, String::as_str)));
    }
    if !rule.params.is_empty() {
        let params: Vec<String> = rule
            .params
            .iter()
            .map(|(name, required)| format!("{}{}", name, if *required { "*" } else { "?" }))
            .collect();
        parts.push(format!("params=[{}]", params.join(", ")));
    }
    if !rule.filters.is_empty() {
        let filters: Vec<&str> = rule.filters.iter().map(|f| f.label()).collect();
        parts.push(format!("filters=[{}]", filters.join(", ")));
    }

    parts.join(" ")
}

fn join<T>(values: &OneOrMany<T>, as_str: impl Fn(&T) -> &str) -> String {
    values
        .as_slice()
        .iter()
        .map(as_str)
        .collect::<Vec<_>>()
        .join("|")
}

fn join_display(scopes: &OneOrMany<Scope>) -> String {
    scopes
        .as_slice()
        .iter()
        .map(Scope::to_string)
        .collect::<Vec<_>>()
        .join("|")
}

// --- tests -------------------------------------------------------------------
