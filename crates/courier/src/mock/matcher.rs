//! Request predicates for mock responders.

use crate::http::{HttpMethod, WireRequest};

/// How a stubbed path is compared with a request path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PathMatchMode {
    /// The paths are identical.
    #[default]
    EqualTo,
    /// The request path starts with the stubbed path.
    Prefix,
    /// The request path ends with the stubbed path.
    Suffix,
    /// The request path contains the stubbed path.
    Contains,
}

impl PathMatchMode {
    /// Compare `request_path` against `path` in this mode.
    pub fn matches(self, request_path: &str, path: &str) -> bool {
        match self {
            Self::EqualTo => request_path == path,
            Self::Prefix => request_path.starts_with(path),
            Self::Suffix => request_path.ends_with(path),
            Self::Contains => request_path.contains(path),
        }
    }
}

/// A view of a request for writing match predicates.
///
/// Paths are reported relative to the mock transport's base path, so a stub
/// for `/users` matches `https://api.example.com/v1/users` when the base
/// path is `/v1`.
#[derive(Clone, Copy, Debug)]
pub struct RequestMatcher<'a> {
    request: &'a WireRequest,
    base_path: &'a str,
}

impl<'a> RequestMatcher<'a> {
    /// Create a matcher for `request` under `base_path`.
    pub fn new(request: &'a WireRequest, base_path: &'a str) -> Self {
        Self { request, base_path }
    }

    /// The request being matched.
    pub fn request(&self) -> &'a WireRequest {
        self.request
    }

    /// The request path with the base path removed.
    pub fn request_path(&self) -> &'a str {
        let path = self.request.url.path();
        let base = self.base_path.trim_end_matches('/');
        if base.is_empty() {
            return path;
        }
        match path.strip_prefix(base) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        }
    }

    pub fn method_eq(&self, method: HttpMethod) -> bool {
        self.request.method == method
    }

    pub fn path_eq(&self, path: &str) -> bool {
        PathMatchMode::EqualTo.matches(self.request_path(), path)
    }

    pub fn path_has_prefix(&self, path: &str) -> bool {
        PathMatchMode::Prefix.matches(self.request_path(), path)
    }

    pub fn path_has_suffix(&self, path: &str) -> bool {
        PathMatchMode::Suffix.matches(self.request_path(), path)
    }

    pub fn path_contains(&self, path: &str) -> bool {
        PathMatchMode::Contains.matches(self.request_path(), path)
    }
}
