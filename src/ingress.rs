use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::{header, Method};

/// How long browsers may cache a preflight answer, in seconds
const PREFLIGHT_MAX_AGE: usize = 12 * 60 * 60;

/// Allowed origin pattern
#[derive(Debug, Clone, PartialEq, Eq)]
enum OriginRule {
    Any,
    Exact(String),
    /// `scheme://*.domain`, stored as (`scheme://`, `.domain`)
    Subdomain(String, String),
}

impl OriginRule {
    fn parse(entry: &str) -> Self {
        let entry = entry.trim_end_matches('/');
        if entry == "*" {
            return Self::Any;
        }
        match entry.split_once("://*.") {
            Some((scheme, domain)) if !domain.is_empty() => {
                Self::Subdomain(format!("{scheme}://"), format!(".{domain}"))
            }
            _ => Self::Exact(entry.to_owned()),
        }
    }

    fn matches(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(allowed) => allowed.eq_ignore_ascii_case(origin),
            Self::Subdomain(scheme, domain) => origin
                .strip_prefix(scheme.as_str())
                .and_then(|host| host.strip_suffix(domain.as_str()))
                .is_some_and(|label| {
                    !label.is_empty()
                        && label
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
                }),
        }
    }
}

/// Cross-origin allow-list for the submission endpoint
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    rules: Vec<OriginRule>,
}

impl OriginPolicy {
    /// Build the policy from configured entries such as `*`,
    /// `https://example.com` or `https://*.github.io`
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Self {
        let rules = entries
            .iter()
            .map(|entry| entry.as_ref().trim())
            .filter(|entry| !entry.is_empty())
            .map(OriginRule::parse)
            .collect();
        Self { rules }
    }

    /// Check whether a browser origin may call the API
    pub fn allows(&self, origin: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(origin))
    }

    /// Build the CORS middleware enforcing this policy
    pub fn cors(&self) -> Cors {
        let policy = Arc::new(self.clone());
        Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                origin.to_str().is_ok_and(|origin| policy.allows(origin))
            })
            .allowed_methods([Method::POST, Method::OPTIONS])
            .allowed_headers([header::ORIGIN, header::CONTENT_TYPE])
            .expose_headers([header::CONTENT_LENGTH])
            .supports_credentials()
            .max_age(PREFLIGHT_MAX_AGE)
    }
}
