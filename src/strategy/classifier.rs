// Request classification
// Author: kelexine (https://github.com/kelexine)

use crate::network::ResourceRequest;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    /// Install-time preload fetches. Never produced for intercepted traffic.
    StaticPreload,
    /// The configured API endpoint.
    Api,
    /// Everything else, preloaded resources included.
    Generic,
}

impl RequestClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::StaticPreload => "static_preload",
            RequestClass::Api => "api",
            RequestClass::Generic => "generic",
        }
    }
}

/// Maps intercepted requests to a strategy.
///
/// A request is API traffic only when its URL equals the configured
/// endpoint; no prefix or pattern matching. Both sides are expected in
/// `Url` serialized form, so the comparison is between normalized URLs.
/// A query string or extra path segment makes a request generic.
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    api_endpoint: String,
}

impl RequestClassifier {
    pub fn new(api_endpoint: impl Into<String>) -> Self {
        Self {
            api_endpoint: api_endpoint.into(),
        }
    }

    pub fn classify(&self, request: &ResourceRequest) -> RequestClass {
        if request.url == self.api_endpoint {
            RequestClass::Api
        } else {
            RequestClass::Generic
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const API: &str = "https://jsonplaceholder.typicode.com/todos";

    #[test]
    fn test_exact_match_is_api() {
        let classifier = RequestClassifier::new(API);
        assert_eq!(classifier.classify(&ResourceRequest::get(API)), RequestClass::Api);
    }

    #[test]
    fn test_near_misses_are_generic() {
        let classifier = RequestClassifier::new(API);
        for url in [
            "https://jsonplaceholder.typicode.com/todos/1",
            "https://jsonplaceholder.typicode.com/todos?page=2",
            "https://jsonplaceholder.typicode.com/todos/",
            "http://jsonplaceholder.typicode.com/todos",
            "https://jsonplaceholder.typicode.com/TODOS",
        ] {
            assert_eq!(
                classifier.classify(&ResourceRequest::get(url)),
                RequestClass::Generic,
                "{} should be generic",
                url
            );
        }
    }

    #[test]
    fn test_preloaded_resources_are_generic() {
        let classifier = RequestClassifier::new(API);
        let request = ResourceRequest::get("http://127.0.0.1:3000/offline");
        assert_eq!(classifier.classify(&request), RequestClass::Generic);
    }
}
