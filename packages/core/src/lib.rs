//! Core types for the Conduit dispatch pipeline.
//!
//! Conduit routes canonical actions (`GET`, `SET`, `DELETE`, …) to the right
//! service and the right endpoint on that service. This crate holds the parts
//! of that job that never perform I/O: the [`Exchange`] envelope, the closed
//! [`Status`] taxonomy, endpoint match rules, the specificity order, and the
//! endpoint matcher. The async pipeline built on top of them lives in
//! `conduit-dispatch`.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`types`] | Envelope types: [`Exchange`], [`Request`], [`Response`], [`Status`], [`Scope`], [`OneOrMany`] |
//! | [`endpoint`] | [`Endpoint`], [`MatchRule`], [`Filter`], [`Mapper`], [`compare_specificity`], [`match_endpoint`] |
//! | [`validation`] | Definition checks via [`validate_service_id`] and [`validate_endpoints`] |
//! | [`render`] | Human-readable text rendering of endpoints in resolution order |
//!
//! # Quick start
//!
//! ```rust,ignore
//! use conduit::{match_endpoint, sort_endpoints, Endpoint, Exchange, MatchRule, Request, Scope};
//!
//! let mut endpoints = vec![
//!     Endpoint::new(MatchRule::new().action("GET")),
//!     Endpoint::new(MatchRule::new().scope(Scope::Member)).with_id("getOne"),
//! ];
//! sort_endpoints(&mut endpoints);
//!
//! let exchange = Exchange::new("GET", Request::for_type("entry").with_id("ent1"));
//! let chosen = match_endpoint(&endpoints, &exchange).expect("routable");
//! assert_eq!(chosen.id.as_deref(), Some("getOne"));
//! ```

pub mod endpoint;
pub mod render;
pub mod types;
pub mod validation;

pub use endpoint::{
    compare_specificity, identity, match_endpoint, sort_endpoints, Endpoint, Filter, FilterInput,
    FilterMeta, Mapper, MatchRule, Options,
};
pub use types::{Exchange, Ident, Meta, OneOrMany, Params, Request, Response, Scope, Status};
pub use validation::{validate_endpoints, validate_service_id, ValidationError};
