//! Authorization gate for the first pipeline stage.
//!
//! Provides two [`Authorizer`]s:
//! - [`AllowAll`]: authorizes every exchange, identified or not.
//! - [`RequireIdent`]: requires an identity, and optionally one of a set of
//!   roles; `root` identities always pass.
//!
//! Real deployments plug in their own strategy behind the same trait. The
//! contract is small: set `authorized`, or resolve the exchange with
//! `noaccess`.

use async_trait::async_trait;
use conduit::{Exchange, Status};

/// Decides whether an exchange may proceed.
///
/// An implementation either returns the exchange with `authorized = true`, or
/// resolves it with [`Status::NoAccess`] and a reason. It may suspend (for
/// instance to look up an identity), so the trait is async.
#[async_trait]
pub trait Authorizer: Send + Sync + 'static {
    async fn authorize(&self, exchange: Exchange) -> Exchange;
}

// ---------------------------------------------------------------------------
// AllowAll
// ---------------------------------------------------------------------------

/// Authorizes everything. The default for services that declare no `auth`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, mut exchange: Exchange) -> Exchange {
        exchange.authorized = true;
        exchange
    }
}

// ---------------------------------------------------------------------------
// RequireIdent
// ---------------------------------------------------------------------------

/// Requires an identity on the exchange.
///
/// When `roles` is non-empty the identity must also hold at least one of
/// them. Root identities skip the role check.
#[derive(Debug, Clone, Default)]
pub struct RequireIdent {
    roles: Vec<String>,
}

impl RequireIdent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Authorizer for RequireIdent {
    async fn authorize(&self, mut exchange: Exchange) -> Exchange {
        let refusal = match &exchange.ident {
            None => Some(format!(
                "anonymous {} action refused; an identity is required",
                exchange.action_type
            )),
            Some(ident) if ident.root || self.roles.is_empty() => None,
            Some(ident) if ident.roles.iter().any(|r| self.roles.contains(r)) => None,
            Some(ident) => Some(format!(
                "ident '{}' lacks any of the roles [{}]",
                ident.id,
                self.roles.join(", ")
            )),
        };

        match refusal {
            Some(reason) => {
                tracing::debug!(action = %exchange.action_type, "authorization refused: {reason}");
                exchange.authorized = false;
                exchange.fail(Status::NoAccess, reason)
            }
            None => {
                exchange.authorized = true;
                exchange
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
