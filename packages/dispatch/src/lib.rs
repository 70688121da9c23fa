//! The async dispatch pipeline for Conduit.
//!
//! Builds on the pure types in the `conduit` crate: services with their
//! stages, the stage pipeline, multi-id fan-out, and the [`Dispatcher`] that
//! ties them together behind a [`ServiceRegistry`].
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`dispatcher`] | [`Dispatcher::dispatch_one`], the single entry point |
//! | [`service`] | [`Service`] and its five stage methods |
//! | [`stage`] | The [`Stage`] trait and [`Pipeline`] compositions |
//! | [`fanout`] | [`should_fan_out`], [`fan_out`], [`combine`] |
//! | [`registry`] | [`ServiceRegistry`] and [`MemoryRegistry`] |
//! | [`transport`] | The [`Transporter`] seam and [`MemoryTransporter`] |
//! | [`auth`] | The [`Authorizer`] seam, [`AllowAll`], [`RequireIdent`] |
//! | [`definitions`] | JSON service definitions and [`build_registry`] |
//! | [`config`] | [`DispatchConfig`], read from `CONDUIT_*` env vars |
//! | [`error`] | [`DispatchError`] and its mapping to response statuses |
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use conduit::{Endpoint, Exchange, MatchRule, Request};
//! use conduit_dispatch::{DispatchConfig, Dispatcher, MemoryRegistry, MemoryTransporter, Service};
//!
//! let service = Service::new(
//!     "entries",
//!     vec![Endpoint::new(MatchRule::new().action("GET"))],
//!     Arc::new(MemoryTransporter::new()),
//! );
//! let registry = MemoryRegistry::new().insert(service).map_type("entry", "entries");
//! let dispatcher = Dispatcher::new(Arc::new(registry), DispatchConfig::from_env());
//!
//! let answer = dispatcher
//!     .dispatch_one(Exchange::new("GET", Request::for_type("entry").with_id(vec!["ent1", "ent2"])))
//!     .await;
//! ```

pub mod auth;
pub mod config;
pub mod definitions;
pub mod dispatcher;
pub mod error;
pub mod fanout;
pub mod registry;
pub mod service;
pub mod stage;
pub mod transport;

pub use auth::{AllowAll, Authorizer, RequireIdent};
pub use config::DispatchConfig;
pub use definitions::{
    build_registry, build_service, parse_definitions, prepare_endpoint, DefinitionError,
    DefinitionsFile, EndpointDef, FilterDef, MatchDef, Resources, ServiceDef,
};
pub use dispatcher::{run_on_service, Dispatcher};
pub use error::DispatchError;
pub use fanout::{combine, fan_out, should_fan_out};
pub use registry::{MemoryRegistry, ServiceRegistry};
pub use service::Service;
pub use stage::{Pipeline, Stage};
pub use transport::memory::MemoryTransporter;
pub use transport::Transporter;
