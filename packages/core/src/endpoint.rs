//! Endpoint definitions, the specificity order, and the endpoint matcher.
//!
//! A service talks to its backend through several [`Endpoint`]s, each guarded
//! by a [`MatchRule`]. Several rules can apply to the same exchange, so the
//! endpoints of a service are kept sorted by [`compare_specificity`] and
//! [`match_endpoint`] picks the first one whose rule holds.
//!
//! # Specificity
//!
//! Rules are compared lexicographically; a rule only decides when the two
//! endpoints differ on it:
//!
//! | # | Earlier | Later |
//! |---|---------|-------|
//! | 1 | has `id` | no `id` |
//! | 2 | has `type` | no `type` |
//! | 3 | single `type` | list of types |
//! | 4 | more required params | fewer |
//! | 5 | more optional params | fewer |
//! | 6 | has filters | no filters |
//! | 7 | has `scope`, single before list | no `scope` |
//! | 8 | has `action`, single before list | no `action` |
//!
//! Ties keep definition order.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::types::{Exchange, Ident, OneOrMany, Params, Scope};

/// Adapter-specific endpoint options, passed to the transporter untouched.
pub type Options = Map<String, Value>;

// ---------------------------------------------------------------------------
// Mapper
// ---------------------------------------------------------------------------

/// A pure translation between the canonical exchange shape and a backend's
/// shape. Produced by an external mapping engine; Conduit only calls it.
pub trait Mapper: Send + Sync {
    fn map(&self, exchange: Exchange) -> Exchange;
}

impl<F> Mapper for F
where
    F: Fn(Exchange) -> Exchange + Send + Sync,
{
    fn map(&self, exchange: Exchange) -> Exchange {
        self(exchange)
    }
}

/// The mapper that leaves every exchange as it is.
pub fn identity() -> Arc<dyn Mapper> {
    Arc::new(|exchange: Exchange| exchange)
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// What a filter predicate gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct FilterInput<'a> {
    pub data: Option<&'a Value>,
    pub params: &'a Params,
    pub meta: FilterMeta<'a>,
}

#[derive(Debug, Clone, Copy)]
pub struct FilterMeta<'a> {
    pub action_type: &'a str,
    pub scope: Scope,
    pub ident: Option<&'a Ident>,
}

impl<'a> FilterInput<'a> {
    pub fn from_exchange(exchange: &'a Exchange) -> Self {
        Self {
            data: exchange.request.data.as_ref(),
            params: &exchange.request.params,
            meta: FilterMeta {
                action_type: &exchange.action_type,
                scope: exchange.scope(),
                ident: exchange.ident.as_ref(),
            },
        }
    }

    /// The input as one JSON document: `{ data, params, meta }`.
    pub fn to_value(&self) -> Value {
        json!({
            "data": self.data.cloned().unwrap_or(Value::Null),
            "params": self.params,
            "meta": {
                "type": self.meta.action_type,
                "scope": self.meta.scope,
                "ident": self.meta.ident,
            },
        })
    }
}

/// A predicate an exchange must satisfy for an endpoint to match.
#[derive(Clone)]
pub struct Filter {
    label: String,
    predicate: Arc<dyn Fn(&FilterInput<'_>) -> bool + Send + Sync>,
}

impl Filter {
    pub fn new<F>(label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&FilterInput<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Holds when the value at the dotted `path` (e.g. `"data.draft"` or
    /// `"meta.ident.id"`) equals `expected`. A missing path compares as
    /// `null`. Segments may contain `/` and `~`; only `.` separates.
    pub fn equals(path: impl Into<String>, expected: Value) -> Self {
        let path = path.into();
        let pointer: String = path
            .split('.')
            .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
            .collect();
        let label = format!("{path} == {expected}");
        Self::new(label, move |input| {
            input
                .to_value()
                .pointer(&pointer)
                .unwrap_or(&Value::Null)
                == &expected
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn test(&self, input: &FilterInput<'_>) -> bool {
        (self.predicate)(input)
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Filter").field(&self.label).finish()
    }
}

// ---------------------------------------------------------------------------
// MatchRule
// ---------------------------------------------------------------------------

/// The conditions under which an endpoint applies. Every field is optional;
/// an empty rule matches everything.
#[derive(Debug, Clone, Default)]
pub struct MatchRule {
    pub type_name: Option<OneOrMany<String>>,
    pub scope: Option<OneOrMany<Scope>>,
    pub action: Option<OneOrMany<String>>,
    /// `true` marks a required param, `false` an optional one. Optional
    /// params never affect matching, only ordering.
    pub params: BTreeMap<String, bool>,
    pub filters: Vec<Filter>,
}

impl MatchRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_name(mut self, type_name: impl Into<OneOrMany<String>>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn scope(mut self, scope: impl Into<OneOrMany<Scope>>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn action(mut self, action: impl Into<OneOrMany<String>>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, required: bool) -> Self {
        self.params.insert(name.into(), required);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn required_params(&self) -> usize {
        self.params.values().filter(|required| **required).count()
    }

    pub fn optional_params(&self) -> usize {
        self.params.values().filter(|required| !**required).count()
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// One way of talking to a service: a match rule, the mappers translating to
/// and from the backend's shape, and options for the transporter.
#[derive(Clone)]
pub struct Endpoint {
    pub id: Option<String>,
    pub rule: MatchRule,
    pub options: Options,
    pub request_mapper: Arc<dyn Mapper>,
    pub response_mapper: Arc<dyn Mapper>,
}

impl Endpoint {
    /// An endpoint with identity mappers and no options.
    pub fn new(rule: MatchRule) -> Self {
        Self {
            id: None,
            rule,
            options: Options::new(),
            request_mapper: identity(),
            response_mapper: identity(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_request_mapper(mut self, mapper: Arc<dyn Mapper>) -> Self {
        self.request_mapper = mapper;
        self
    }

    pub fn with_response_mapper(mut self, mapper: Arc<dyn Mapper>) -> Self {
        self.response_mapper = mapper;
        self
    }

    /// The id if there is one, otherwise the position in the endpoint list.
    pub fn label(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| format!("#{index}"))
    }

    /// `true` when the rule explicitly admits the `members` scope, meaning
    /// the backend takes a whole id list in one call.
    pub fn accepts_members(&self) -> bool {
        self.rule
            .scope
            .as_ref()
            .is_some_and(|scope| scope.contains(&Scope::Members))
    }

    /// Check every match criterion against `exchange`.
    ///
    /// A request pinned to an endpoint id matches that endpoint and nothing
    /// else, regardless of the other criteria.
    pub fn matches(&self, exchange: &Exchange) -> bool {
        if let Some(wanted) = &exchange.request.endpoint_id {
            return self.id.as_deref() == Some(wanted.as_str());
        }

        let rule = &self.rule;
        let request = &exchange.request;

        if let Some(types) = &rule.type_name {
            match &request.type_name {
                Some(type_name) if types.contains(type_name) => {}
                _ => return false,
            }
        }

        if let Some(scopes) = &rule.scope {
            if !scopes.contains(&request.scope()) {
                return false;
            }
        }

        if let Some(actions) = &rule.action {
            if !actions.contains(&exchange.action_type) {
                return false;
            }
        }

        // An explicit null counts as unset.
        let missing_param = rule.params.iter().any(|(name, required)| {
            *required && request.params.get(name).map_or(true, Value::is_null)
        });
        if missing_param {
            return false;
        }

        if !rule.filters.is_empty() {
            let input = FilterInput::from_exchange(exchange);
            if !rule.filters.iter().all(|filter| filter.test(&input)) {
                return false;
            }
        }

        true
    }
}

impl AsRef<Endpoint> for Endpoint {
    fn as_ref(&self) -> &Endpoint {
        self
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("rule", &self.rule)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Ordering and matching
// ---------------------------------------------------------------------------

/// Order two endpoints by specificity, most specific first.
///
/// See the module docs for the rule table. The order is antisymmetric:
/// `compare_specificity(a, b) == compare_specificity(b, a).reverse()`.
pub fn compare_specificity(a: &Endpoint, b: &Endpoint) -> Ordering {
    let (ra, rb) = (&a.rule, &b.rule);
    present_first(a.id.is_some(), b.id.is_some())
        .then_with(|| narrower_first(&ra.type_name, &rb.type_name))
        .then_with(|| rb.required_params().cmp(&ra.required_params()))
        .then_with(|| rb.optional_params().cmp(&ra.optional_params()))
        .then_with(|| present_first(!ra.filters.is_empty(), !rb.filters.is_empty()))
        .then_with(|| narrower_first(&ra.scope, &rb.scope))
        .then_with(|| narrower_first(&ra.action, &rb.action))
}

/// Stable-sort endpoints by [`compare_specificity`]. Equally specific
/// endpoints keep their relative order.
pub fn sort_endpoints<E: AsRef<Endpoint>>(endpoints: &mut [E]) {
    endpoints.sort_by(|a, b| compare_specificity(a.as_ref(), b.as_ref()));
}

/// Return the first endpoint in `sorted` that matches `exchange`.
///
/// `sorted` must already be in specificity order; the function does not sort.
pub fn match_endpoint<'a, E: AsRef<Endpoint>>(
    sorted: &'a [E],
    exchange: &Exchange,
) -> Option<&'a E> {
    sorted.iter().find(|endpoint| endpoint.as_ref().matches(exchange))
}

fn present_first(a: bool, b: bool) -> Ordering {
    b.cmp(&a)
}

/// Declared before undeclared; when both are declared, a single value before
/// a list.
fn narrower_first<T>(a: &Option<OneOrMany<T>>, b: &Option<OneOrMany<T>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => present_first(a.is_single(), b.is_single()),
        _ => present_first(a.is_some(), b.is_some()),
    }
}

// --- tests -------------------------------------------------------------------
