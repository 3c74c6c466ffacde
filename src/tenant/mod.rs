//! Per-request tenant resolution.
//!
//! Every request is scoped to an optional tenant, resolved in strict
//! priority order: `X-Subdomain` header, then an explicit `subdomain`
//! field (query string, or request body for the create endpoints), then
//! the first label of the Host name when it carries one. A missing
//! tenant is not an error; queries then run against the unscoped rows.

use axum::extract::FromRequestParts;
use axum::http::header::HOST;
use axum::http::request::Parts;
use std::convert::Infallible;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tenant {
    explicit: Option<String>,
    host: Option<String>,
}

impl Tenant {
    /// Tenant for endpoints without a JSON body.
    pub fn resolved(&self) -> Option<String> {
        self.explicit.clone().or_else(|| self.host.clone())
    }

    /// Tenant for endpoints whose body may carry a `subdomain` field.
    /// The body value ranks above the Host name but below the header
    /// and query string.
    pub fn resolved_with(&self, body: Option<&str>) -> Option<String> {
        self.explicit
            .clone()
            .or_else(|| body.filter(|v| !v.is_empty()).map(str::to_string))
            .or_else(|| self.host.clone())
    }
}

impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(resolve(parts))
    }
}

fn resolve(parts: &Parts) -> Tenant {
    let explicit = header_value(parts, "x-subdomain")
        .or_else(|| query_param(parts.uri.query().unwrap_or(""), "subdomain"));
    Tenant {
        explicit,
        host: host_label(parts),
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k == key {
            urlencoding::decode(v)
                .ok()
                .map(|decoded| decoded.into_owned())
                .filter(|decoded| !decoded.is_empty())
        } else {
            None
        }
    })
}

/// First Host label when the name has more than two dot-separated
/// labels (`acme.example.com` -> `acme`); otherwise none.
fn host_label(parts: &Parts) -> Option<String> {
    let host = parts.headers.get(HOST)?.to_str().ok()?;
    let host = host.split(':').next().unwrap_or(host);
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() > 2 {
        Some(labels[0].to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn make_parts(uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn header_wins_over_query_and_host() {
        let parts = make_parts(
            "/api/support?subdomain=fromquery",
            &[("x-subdomain", "fromheader"), ("host", "other.example.com")],
        );
        assert_eq!(resolve(&parts).resolved(), Some("fromheader".to_string()));
    }

    #[test]
    fn query_wins_over_host() {
        let parts = make_parts(
            "/api/support?subdomain=acme",
            &[("host", "other.example.com")],
        );
        assert_eq!(resolve(&parts).resolved(), Some("acme".to_string()));
    }

    #[test]
    fn host_label_used_when_nothing_explicit() {
        let parts = make_parts("/api/support", &[("host", "acme.example.com")]);
        assert_eq!(resolve(&parts).resolved(), Some("acme".to_string()));
    }

    #[test]
    fn bare_domain_resolves_to_none() {
        let parts = make_parts("/api/support", &[("host", "example.com")]);
        assert_eq!(resolve(&parts).resolved(), None);
        let parts = make_parts("/api/support", &[("host", "localhost:8080")]);
        assert_eq!(resolve(&parts).resolved(), None);
    }

    #[test]
    fn host_port_is_stripped() {
        let parts = make_parts("/api/support", &[("host", "acme.example.com:8080")]);
        assert_eq!(resolve(&parts).resolved(), Some("acme".to_string()));
    }

    #[test]
    fn body_field_ranks_between_query_and_host() {
        let parts = make_parts("/api/support", &[("host", "acme.example.com")]);
        let tenant = resolve(&parts);
        assert_eq!(
            tenant.resolved_with(Some("frombody")),
            Some("frombody".to_string())
        );

        let parts = make_parts("/api/support?subdomain=fromquery", &[]);
        let tenant = resolve(&parts);
        assert_eq!(
            tenant.resolved_with(Some("frombody")),
            Some("fromquery".to_string())
        );
    }

    #[test]
    fn empty_values_are_ignored() {
        let parts = make_parts("/api/support?subdomain=", &[("x-subdomain", "")]);
        assert_eq!(resolve(&parts).resolved(), None);
    }

    #[test]
    fn query_values_are_percent_decoded() {
        let parts = make_parts("/api/support?subdomain=my%2Dapp", &[]);
        assert_eq!(resolve(&parts).resolved(), Some("my-app".to_string()));
    }
}
