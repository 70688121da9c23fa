//! Core data types for the Conduit dispatch pipeline.
//!
//! This module defines the canonical envelope that flows through every
//! pipeline stage: [`Exchange`], with its [`Request`], [`Response`],
//! [`Ident`] and [`Meta`] parts, plus the closed [`Status`] taxonomy, the
//! id-derived [`Scope`], and the scalar-or-list [`OneOrMany`] value used by
//! both requests and endpoint match rules.
//!
//! All types serialise to and from JSON with camelCase field names, so an
//! exchange can be read from a file or handed across a process boundary
//! unchanged. The resolved endpoint is the one exception: it holds mapping
//! functions and is never serialised.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::endpoint::Endpoint;

/// Request parameters, keyed by name. Ordered so that rendering and
/// serialisation are deterministic.
pub type Params = BTreeMap<String, Value>;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// The outcome of an exchange. This is a closed set: callers branch on it and
/// nothing else.
///
/// Serialises as a lowercase string (e.g. `"notfound"`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The action completed.
    Ok,
    /// The addressed item does not exist.
    NotFound,
    /// There was nothing to do. Not an error.
    NoAction,
    /// Authorization refused the action.
    NoAccess,
    /// The service could not authenticate against its backend.
    AuthError,
    /// The backend rejected the request as malformed.
    BadRequest,
    /// The backend answered with something that could not be understood.
    BadResponse,
    /// The backend, or the dispatch as a whole, did not answer in time.
    Timeout,
    /// Any other failure.
    Error,
}

impl Status {
    /// Returns `true` for every status except `ok` and `notfound`.
    ///
    /// These are the two statuses a fan-out merge tolerates; everything else
    /// fails the combined result.
    pub fn is_failure(self) -> bool {
        !matches!(self, Status::Ok | Status::NotFound)
    }

    /// The lowercase wire-format string.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::NotFound => "notfound",
            Status::NoAction => "noaction",
            Status::NoAccess => "noaccess",
            Status::AuthError => "autherror",
            Status::BadRequest => "badrequest",
            Status::BadResponse => "badresponse",
            Status::Timeout => "timeout",
            Status::Error => "error",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a [`Status`] from its lowercase wire-format string.
impl std::str::FromStr for Status {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Status::Ok),
            "notfound" => Ok(Status::NotFound),
            "noaction" => Ok(Status::NoAction),
            "noaccess" => Ok(Status::NoAccess),
            "autherror" => Ok(Status::AuthError),
            "badrequest" => Ok(Status::BadRequest),
            "badresponse" => Ok(Status::BadResponse),
            "timeout" => Ok(Status::Timeout),
            "error" => Ok(Status::Error),
            _ => Err(format!("unknown status {:?}", s)),
        }
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// What a request addresses, derived from the shape of its `id`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// No id: the request addresses the whole collection.
    Collection,
    /// One id.
    Member,
    /// Several ids.
    Members,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Collection => write!(f, "collection"),
            Scope::Member => write!(f, "member"),
            Scope::Members => write!(f, "members"),
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collection" => Ok(Scope::Collection),
            "member" => Ok(Scope::Member),
            "members" => Ok(Scope::Members),
            _ => Err(format!(
                "unknown scope {:?}; expected one of: collection, member, members",
                s
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// OneOrMany
// ---------------------------------------------------------------------------

/// A value that is either a single item or a list of items.
///
/// Deserialises untagged, so both `"entry"` and `["entry", "user"]` are
/// accepted wherever a `OneOrMany<String>` is expected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// `true` when written as a single value rather than a list.
    pub fn is_single(&self) -> bool {
        matches!(self, OneOrMany::One(_))
    }

    /// All values as a slice; a single value is a slice of one.
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::One(value) => std::slice::from_ref(value),
            OneOrMany::Many(values) => values,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Collapse the degenerate list shapes: an empty list becomes `None` and
    /// a list of one becomes `One`. Everything else is returned unchanged.
    pub fn normalize(self) -> Option<Self> {
        match self {
            OneOrMany::Many(values) if values.len() <= 1 => {
                values.into_iter().next().map(OneOrMany::One)
            }
            other => Some(other),
        }
    }
}

impl<T: PartialEq> OneOrMany<T> {
    /// `true` when `value` equals the single value or is one of the list.
    pub fn contains(&self, value: &T) -> bool {
        self.as_slice().contains(value)
    }
}

impl From<&str> for OneOrMany<String> {
    fn from(value: &str) -> Self {
        OneOrMany::One(value.to_string())
    }
}

impl From<String> for OneOrMany<String> {
    fn from(value: String) -> Self {
        OneOrMany::One(value)
    }
}

impl From<Vec<String>> for OneOrMany<String> {
    fn from(values: Vec<String>) -> Self {
        OneOrMany::Many(values)
    }
}

impl From<Vec<&str>> for OneOrMany<String> {
    fn from(values: Vec<&str>) -> Self {
        OneOrMany::Many(values.into_iter().map(String::from).collect())
    }
}

impl From<Scope> for OneOrMany<Scope> {
    fn from(scope: Scope) -> Self {
        OneOrMany::One(scope)
    }
}

impl From<Vec<Scope>> for OneOrMany<Scope> {
    fn from(scopes: Vec<Scope>) -> Self {
        OneOrMany::Many(scopes)
    }
}

// ---------------------------------------------------------------------------
// Request / Response
// ---------------------------------------------------------------------------

/// The canonical request half of an [`Exchange`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Schema type the action concerns (e.g. `"entry"`).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,

    /// Zero, one, or several identifiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<OneOrMany<String>>,

    /// Explicit service to route to, overriding the type's default service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,

    /// Payload for SET-style actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: Params,

    /// Pin the request to the endpoint with this id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<String>,
}

impl Request {
    /// A request for the given schema type.
    pub fn for_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<OneOrMany<String>>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_service(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint_id: impl Into<String>) -> Self {
        self.endpoint_id = Some(endpoint_id.into());
        self
    }

    /// The requested identifiers, in request order. Empty for collection
    /// requests.
    pub fn ids(&self) -> &[String] {
        self.id.as_ref().map(OneOrMany::as_slice).unwrap_or(&[])
    }

    /// The scope implied by `id`: a list of two or more is `members`, a single
    /// id (or a list of one) is `member`, and no id (or an empty list) is
    /// `collection`.
    pub fn scope(&self) -> Scope {
        match self.ids().len() {
            0 => Scope::Collection,
            1 => Scope::Member,
            _ => Scope::Members,
        }
    }
}

/// The canonical response half of an [`Exchange`].
///
/// `status` stays `None` until some stage resolves the exchange.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Human-readable failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Non-fatal remark from a stage or backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,

    /// Backend paging hints, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging: Option<Value>,
}

impl Response {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            status: Some(Status::Ok),
            data,
            ..Self::default()
        }
    }

    pub fn with_status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Ident / Meta
// ---------------------------------------------------------------------------

/// Identity of whoever issued the action. Only the authorization stage looks
/// inside it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ident {
    pub id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<String>,

    /// Root idents bypass role checks.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub root: bool,
}

impl Ident {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(id: impl Into<String>) -> Self {
        Self {
            root: true,
            ..Self::new(id)
        }
    }
}

/// Correlation identifiers for logging.
///
/// `id` is a fresh UUIDv7 per exchange. A fan-out branch carries its parent's
/// `id` as `cid`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Meta {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
}

impl Meta {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            cid: None,
        }
    }

    /// Fresh metadata for a branch of the exchange owning `self`.
    pub fn child(&self) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            cid: Some(self.cid.clone().unwrap_or_else(|| self.id.clone())),
        }
    }
}

impl Default for Meta {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Exchange
// ---------------------------------------------------------------------------

/// The canonical envelope flowing through the dispatch pipeline.
///
/// One exchange is created per inbound action. Fan-out clones it once per
/// identifier via [`Exchange::branch`]; the clones are discarded after their
/// results are combined.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    /// Action tag: `GET`, `SET`, `DELETE`, `SYNC`, …
    #[serde(rename = "type")]
    pub action_type: String,

    #[serde(default)]
    pub request: Request,

    #[serde(default)]
    pub response: Response,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ident: Option<Ident>,

    #[serde(default)]
    pub meta: Meta,

    /// The endpoint chosen for this exchange. `None` until the
    /// endpoint-assignment stage has run.
    #[serde(skip)]
    pub endpoint: Option<Arc<Endpoint>>,

    /// Set by the authorization stage.
    #[serde(default)]
    pub authorized: bool,
}

impl Exchange {
    pub fn new(action_type: impl Into<String>, request: Request) -> Self {
        Self {
            action_type: action_type.into(),
            request,
            response: Response::default(),
            ident: None,
            meta: Meta::new(),
            endpoint: None,
            authorized: false,
        }
    }

    pub fn with_ident(mut self, ident: Ident) -> Self {
        self.ident = Some(ident);
        self
    }

    /// `true` once any stage has set a response status.
    pub fn is_resolved(&self) -> bool {
        self.response.status.is_some()
    }

    pub fn status(&self) -> Option<Status> {
        self.response.status
    }

    pub fn scope(&self) -> Scope {
        self.request.scope()
    }

    /// Resolve the exchange with a failing (or otherwise data-less) status and
    /// a message. Any data already on the response is dropped.
    pub fn fail(mut self, status: Status, message: impl Into<String>) -> Self {
        self.response = Response {
            status: Some(status),
            error: Some(message.into()),
            ..Response::default()
        };
        self
    }

    /// Resolve the exchange with `ok` and the given data.
    pub fn respond_ok(mut self, data: Option<Value>) -> Self {
        self.response = Response::ok(data);
        self
    }

    /// Collapse a single-element id list to a scalar and an empty list to no
    /// id, so that `["x"]` and `"x"` address exactly the same thing.
    pub fn normalize_id(&mut self) {
        self.request.id = self.request.id.take().and_then(OneOrMany::normalize);
    }

    /// A copy of this exchange addressing only `id`, with fresh correlation
    /// metadata and no endpoint, ready for re-resolution.
    pub fn branch(&self, id: impl Into<String>) -> Self {
        let mut branch = self.clone();
        branch.request.id = Some(OneOrMany::One(id.into()));
        branch.meta = self.meta.child();
        branch.endpoint = None;
        branch
    }
}

/// Exchanges compare by value; the attached endpoints compare by identity.
impl PartialEq for Exchange {
    fn eq(&self, other: &Self) -> bool {
        let same_endpoint = match (&self.endpoint, &other.endpoint) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_endpoint
            && self.action_type == other.action_type
            && self.request == other.request
            && self.response == other.response
            && self.ident == other.ident
            && self.meta == other.meta
            && self.authorized == other.authorized
    }
}

// --- tests -------------------------------------------------------------------
