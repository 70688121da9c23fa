use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::endpoint::Endpoint;

/// Errors returned when a service or endpoint definition is not usable.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error(
        "service id {0:?} is invalid; ids start with a letter or digit and contain only \
         letters, digits, '_', '.', ':' or '-'"
    )]
    InvalidServiceId(String),

    #[error("endpoint id {0:?} is invalid; ids follow the same rules as service ids")]
    InvalidEndpointId(String),

    #[error("endpoint id {0:?} is used more than once")]
    DuplicateEndpointId(String),

    #[error("endpoint {endpoint} has an empty {field} list; omit the field to match anything")]
    EmptyMatchList {
        endpoint: String,
        field: &'static str,
    },

    #[error("endpoint {0} declares a param with an empty name")]
    EmptyParamName(String),
}

/// Validate a service id.
pub fn validate_service_id(id: &str) -> Result<(), ValidationError> {
    if ID_RE.is_match(id) {
        Ok(())
    } else {
        Err(ValidationError::InvalidServiceId(id.to_string()))
    }
}

/// Validate the endpoints of one service.
///
/// Returns the first [`ValidationError`] found, checking endpoints in
/// definition order. Endpoints without an id are named by position
/// (`#0`, `#1`, …) in error messages.
pub fn validate_endpoints<E: AsRef<Endpoint>>(endpoints: &[E]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();

    for (index, endpoint) in endpoints.iter().enumerate() {
        let endpoint = endpoint.as_ref();
        let label = endpoint.label(index);

        if let Some(id) = &endpoint.id {
            if !ID_RE.is_match(id) {
                return Err(ValidationError::InvalidEndpointId(id.clone()));
            }
            if !seen.insert(id.as_str()) {
                return Err(ValidationError::DuplicateEndpointId(id.clone()));
            }
        }

        let rule = &endpoint.rule;
        let empty_field = [
            ("type", rule.type_name.as_ref().is_some_and(|v| v.is_empty())),
            ("scope", rule.scope.as_ref().is_some_and(|v| v.is_empty())),
            ("action", rule.action.as_ref().is_some_and(|v| v.is_empty())),
        ]
        .into_iter()
        .find_map(|(field, empty)| empty.then_some(field));
        if let Some(field) = empty_field {
            return Err(ValidationError::EmptyMatchList {
                endpoint: label,
                field,
            });
        }

        if rule.params.keys().any(|name| name.trim().is_empty()) {
            return Err(ValidationError::EmptyParamName(label));
        }
    }

    Ok(())
}

// --- helpers -----------------------------------------------------------------

/// `^[A-Za-z0-9][A-Za-z0-9_.:-]*$`
static ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:-]*$").expect("invalid id regex")
});

// --- tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::MatchRule;
    use crate::types::{OneOrMany, Scope};

    #[test]
    fn valid_service_ids() {
        for id in ["entries", "store-1", "api.example:v2", "A_b"] {
            assert_eq!(validate_service_id(id), Ok(()), "{id}");
        }
    }

    #[test]
    fn invalid_service_ids() {
        for id in ["", "-leading", "has space", "slash/y"] {
            assert!(
                matches!(validate_service_id(id), Err(ValidationError::InvalidServiceId(_))),
                "{id:?}"
            );
        }
    }

    #[test]
    fn valid_endpoint_list() {
        let endpoints = vec![
            Endpoint::new(MatchRule::new().scope(Scope::Member)).with_id("getOne"),
            Endpoint::new(MatchRule::new().type_name("entry")),
            Endpoint::new(MatchRule::new()),
        ];
        assert_eq!(validate_endpoints(&endpoints), Ok(()));
    }

    #[test]
    fn duplicate_endpoint_id() {
        let endpoints = vec![
            Endpoint::new(MatchRule::new()).with_id("getAll"),
            Endpoint::new(MatchRule::new().action("GET")).with_id("getAll"),
        ];
        assert_eq!(
            validate_endpoints(&endpoints),
            Err(ValidationError::DuplicateEndpointId("getAll".into()))
        );
    }

    #[test]
    fn invalid_endpoint_id() {
        let endpoints = vec![Endpoint::new(MatchRule::new()).with_id("get all")];
        assert!(matches!(
            validate_endpoints(&endpoints),
            Err(ValidationError::InvalidEndpointId(_))
        ));
    }

    #[test]
    fn empty_match_list_is_rejected() {
        let mut rule = MatchRule::new();
        rule.action = Some(OneOrMany::Many(vec![]));
        let endpoints = vec![Endpoint::new(MatchRule::new()), Endpoint::new(rule)];
        assert_eq!(
            validate_endpoints(&endpoints),
            Err(ValidationError::EmptyMatchList {
                endpoint: "#1".into(),
                field: "action"
            })
        );
    }

    #[test]
    fn empty_param_name_is_rejected() {
        let endpoints = vec![Endpoint::new(MatchRule::new().param(" ", true)).with_id("x")];
        assert_eq!(
            validate_endpoints(&endpoints),
            Err(ValidationError::EmptyParamName("x".into()))
        );
    }
}
