//! Service definitions loaded from JSON and turned into live [`Service`]s.
//!
//! A definitions file names its transporters, authorizers, and mappers as
//! strings. [`Resources`] holds the implementations those names refer to;
//! [`build_registry`] resolves every name, validates every definition, and
//! returns a ready [`MemoryRegistry`].
//!
//! ```json
//! {
//!   "schemas": { "entry": "entries" },
//!   "services": [{
//!     "id": "entries",
//!     "transporter": "memory",
//!     "auth": "ident",
//!     "options": { "baseUri": "https://api.test" },
//!     "endpoints": [
//!       { "id": "getOne", "match": { "action": "GET", "scope": "member", "params": { "id": true } } },
//!       { "match": { "action": ["SET", "DELETE"], "filters": [{ "path": "data.draft", "equals": false }] },
//!         "requestMapping": "entries-out", "responseMapping": "entries-in" }
//!     ]
//!   }]
//! }
//! ```
//!
//! Built-in authorizers: `allow` ([`AllowAll`]) and `ident` ([`RequireIdent`]
//! without roles). A service without `auth` authorizes everything.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use conduit::{
    identity, validate_endpoints, validate_service_id, Endpoint, Filter, Mapper, MatchRule,
    OneOrMany, Options, Scope, ValidationError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{AllowAll, Authorizer, RequireIdent};
use crate::config::DispatchConfig;
use crate::registry::MemoryRegistry;
use crate::service::Service;
use crate::transport::Transporter;

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionsFile {
    /// Type → id of the service handling it.
    #[serde(default)]
    pub schemas: BTreeMap<String, String>,

    #[serde(default)]
    pub services: Vec<ServiceDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDef {
    pub id: String,
    pub transporter: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,

    #[serde(default)]
    pub options: Options,

    #[serde(default)]
    pub endpoints: Vec<EndpointDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "match", default)]
    pub rule: MatchDef,

    #[serde(default)]
    pub options: Options,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_mapping: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mapping: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchDef {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<OneOrMany<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<OneOrMany<Scope>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<OneOrMany<String>>,

    /// Param name → required.
    #[serde(default)]
    pub params: BTreeMap<String, bool>,

    #[serde(default)]
    pub filters: Vec<FilterDef>,
}

/// Holds when the value at the dotted `path` in `{data, params, meta}`
/// equals `equals`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterDef {
    pub path: String,
    pub equals: Value,
}

impl DefinitionsFile {
    /// Every transporter name the services refer to.
    pub fn transporter_names(&self) -> BTreeSet<&str> {
        self.services.iter().map(|s| s.transporter.as_str()).collect()
    }

    /// Every authorizer name the services refer to.
    pub fn authorizer_names(&self) -> BTreeSet<&str> {
        self.services.iter().filter_map(|s| s.auth.as_deref()).collect()
    }

    /// Every mapper name the endpoints refer to.
    pub fn mapper_names(&self) -> BTreeSet<&str> {
        self.services
            .iter()
            .flat_map(|s| &s.endpoints)
            .flat_map(|e| [e.request_mapping.as_deref(), e.response_mapping.as_deref()])
            .flatten()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// Named implementations a definitions file may refer to.
#[derive(Clone)]
pub struct Resources {
    transporters: HashMap<String, Arc<dyn Transporter>>,
    authorizers: HashMap<String, Arc<dyn Authorizer>>,
    mappers: HashMap<String, Arc<dyn Mapper>>,
}

impl Resources {
    /// Resources holding only the built-in authorizers.
    pub fn new() -> Self {
        let mut authorizers: HashMap<String, Arc<dyn Authorizer>> = HashMap::new();
        authorizers.insert("allow".into(), Arc::new(AllowAll));
        authorizers.insert("ident".into(), Arc::new(RequireIdent::new()));
        Self {
            transporters: HashMap::new(),
            authorizers,
            mappers: HashMap::new(),
        }
    }

    pub fn with_transporter(mut self, name: impl Into<String>, transporter: Arc<dyn Transporter>) -> Self {
        self.transporters.insert(name.into(), transporter);
        self
    }

    pub fn with_authorizer(mut self, name: impl Into<String>, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizers.insert(name.into(), authorizer);
        self
    }

    pub fn with_mapper(mut self, name: impl Into<String>, mapper: Arc<dyn Mapper>) -> Self {
        self.mappers.insert(name.into(), mapper);
        self
    }
}

impl Default for Resources {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("cannot parse definitions: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("service '{service}': {source}")]
    Invalid {
        service: String,
        #[source]
        source: ValidationError,
    },

    #[error("service '{service}' uses unknown transporter '{name}'")]
    UnknownTransporter { service: String, name: String },

    #[error("service '{service}' uses unknown authorizer '{name}'")]
    UnknownAuthorizer { service: String, name: String },

    #[error("service '{service}', endpoint {endpoint}: unknown mapper '{name}'")]
    UnknownMapper {
        service: String,
        endpoint: String,
        name: String,
    },

    #[error("schema '{type_name}' points at unknown service '{service}'")]
    UnknownService { type_name: String, service: String },

    #[error("service '{0}' is defined more than once")]
    DuplicateService(String),
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

pub fn parse_definitions(json: &str) -> Result<DefinitionsFile, DefinitionError> {
    Ok(serde_json::from_str(json)?)
}

/// Turn one endpoint definition into an [`Endpoint`], resolving its mapper
/// names. Absent mappings use the identity mapper.
pub fn prepare_endpoint(
    def: &EndpointDef,
    service: &str,
    index: usize,
    resources: &Resources,
) -> Result<Endpoint, DefinitionError> {
    let m = &def.rule;
    let mut rule = MatchRule {
        type_name: m.type_name.clone(),
        scope: m.scope.clone(),
        action: m.action.clone(),
        params: m.params.clone(),
        filters: Vec::new(),
    };
    for filter in &m.filters {
        rule = rule.filter(Filter::equals(filter.path.as_str(), filter.equals.clone()));
    }

    let mapper = |name: Option<&str>| -> Result<Arc<dyn Mapper>, DefinitionError> {
        match name {
            None => Ok(identity()),
            Some(name) => resources.mappers.get(name).cloned().ok_or_else(|| {
                DefinitionError::UnknownMapper {
                    service: service.to_string(),
                    endpoint: def.id.clone().unwrap_or_else(|| format!("#{index}")),
                    name: name.to_string(),
                }
            }),
        }
    };

    let mut endpoint = Endpoint::new(rule)
        .with_options(def.options.clone())
        .with_request_mapper(mapper(def.request_mapping.as_deref())?)
        .with_response_mapper(mapper(def.response_mapping.as_deref())?);
    if let Some(id) = &def.id {
        endpoint = endpoint.with_id(id.as_str());
    }
    Ok(endpoint)
}

/// Build a [`Service`] from its definition. The send timeout comes from
/// `config`; this is the only place [`DispatchConfig::send_timeout`] is read.
pub fn build_service(
    def: &ServiceDef,
    resources: &Resources,
    config: &DispatchConfig,
) -> Result<Service, DefinitionError> {
    let invalid = |source| DefinitionError::Invalid {
        service: def.id.clone(),
        source,
    };
    validate_service_id(&def.id).map_err(invalid)?;

    let endpoints = def
        .endpoints
        .iter()
        .enumerate()
        .map(|(index, e)| prepare_endpoint(e, &def.id, index, resources))
        .collect::<Result<Vec<_>, _>>()?;
    validate_endpoints(&endpoints).map_err(invalid)?;

    let transporter = resources
        .transporters
        .get(&def.transporter)
        .cloned()
        .ok_or_else(|| DefinitionError::UnknownTransporter {
            service: def.id.clone(),
            name: def.transporter.clone(),
        })?;

    let authorizer: Arc<dyn Authorizer> = match &def.auth {
        None => Arc::new(AllowAll),
        Some(name) => resources.authorizers.get(name).cloned().ok_or_else(|| {
            DefinitionError::UnknownAuthorizer {
                service: def.id.clone(),
                name: name.clone(),
            }
        })?,
    };

    Ok(Service::new(def.id.as_str(), endpoints, transporter)
        .with_authorizer(authorizer)
        .with_options(def.options.clone())
        .with_send_timeout(config.send_timeout))
}

/// Build every service in `file` and register the schema table.
pub fn build_registry(
    file: &DefinitionsFile,
    resources: &Resources,
    config: &DispatchConfig,
) -> Result<MemoryRegistry, DefinitionError> {
    let mut seen = HashSet::new();
    let mut registry = MemoryRegistry::new();

    for def in &file.services {
        if !seen.insert(def.id.as_str()) {
            return Err(DefinitionError::DuplicateService(def.id.clone()));
        }
        registry = registry.insert(build_service(def, resources, config)?);
    }

    for (type_name, service) in &file.schemas {
        if !seen.contains(service.as_str()) {
            return Err(DefinitionError::UnknownService {
                type_name: type_name.clone(),
                service: service.clone(),
            });
        }
        registry = registry.map_type(type_name.as_str(), service.as_str());
    }

    tracing::debug!(services = file.services.len(), schemas = file.schemas.len(), "registry built");
    Ok(registry)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
