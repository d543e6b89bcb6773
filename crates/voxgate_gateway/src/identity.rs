//! Caller identity resolution.

use crate::GatewayRequest;
use http::HeaderName;

/// Identity used when none can be resolved and identity is optional.
pub const ANONYMOUS_IDENTITY: &str = "anonymous";

/// Policy that names the caller of a request.
///
/// Return `None` when the request carries nothing identifying; the gateway
/// then either refuses it or files it under [`ANONYMOUS_IDENTITY`].
pub trait IdentityResolver: Send + Sync + std::fmt::Debug {
    /// Resolve the caller of `request`.
    fn resolve(&self, request: &GatewayRequest) -> Option<String>;
}

/// Resolves identity from an authenticated-user header, falling back to
/// proxy-supplied client address headers.
#[derive(Debug, Clone)]
pub struct HeaderIdentityResolver {
    user_header: HeaderName,
    trust_forwarded: bool,
}

impl Default for HeaderIdentityResolver {
    fn default() -> Self {
        Self {
            user_header: HeaderName::from_static("x-user-id"),
            trust_forwarded: true,
        }
    }
}

impl HeaderIdentityResolver {
    /// Use `user_header` for authenticated users.
    pub fn with_user_header(mut self, user_header: HeaderName) -> Self {
        self.user_header = user_header;
        self
    }

    /// Whether `X-Forwarded-For` and `X-Real-IP` may identify anonymous callers.
    pub fn with_trust_forwarded(mut self, trust_forwarded: bool) -> Self {
        self.trust_forwarded = trust_forwarded;
        self
    }

    fn header<'a>(request: &'a GatewayRequest, name: &str) -> Option<&'a str> {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

impl IdentityResolver for HeaderIdentityResolver {
    fn resolve(&self, request: &GatewayRequest) -> Option<String> {
        if let Some(user) = Self::header(request, self.user_header.as_str()) {
            return Some(format!("user:{}", user));
        }
        if !self.trust_forwarded {
            return None;
        }

        // First hop is the original client.
        let forwarded = Self::header(request, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        forwarded
            .or_else(|| Self::header(request, "x-real-ip"))
            .map(|ip| format!("ip:{}", ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn request(headers: &[(&str, &str)]) -> GatewayRequest {
        let mut builder = http::Request::builder().uri("/api/synthesize");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Bytes::new()).unwrap()
    }

    #[test]
    fn test_user_header_wins() {
        let resolver = HeaderIdentityResolver::default();
        let id = resolver.resolve(&request(&[("x-user-id", "42"), ("x-real-ip", "10.0.0.1")]));
        assert_eq!(id.as_deref(), Some("user:42"));
    }

    #[test]
    fn test_forwarded_for_uses_first_hop() {
        let resolver = HeaderIdentityResolver::default();
        let id = resolver.resolve(&request(&[("x-forwarded-for", "203.0.113.7, 10.0.0.2")]));
        assert_eq!(id.as_deref(), Some("ip:203.0.113.7"));
    }

    #[test]
    fn test_real_ip_fallback() {
        let resolver = HeaderIdentityResolver::default();
        let id = resolver.resolve(&request(&[("x-real-ip", "198.51.100.4")]));
        assert_eq!(id.as_deref(), Some("ip:198.51.100.4"));
    }

    #[test]
    fn test_untrusted_forwarding_ignored() {
        let resolver = HeaderIdentityResolver::default().with_trust_forwarded(false);
        assert_eq!(resolver.resolve(&request(&[("x-real-ip", "198.51.100.4")])), None);
    }

    #[test]
    fn test_blank_headers_resolve_nothing() {
        let resolver = HeaderIdentityResolver::default();
        assert_eq!(resolver.resolve(&request(&[("x-user-id", "  ")])), None);
        assert_eq!(resolver.resolve(&request(&[])), None);
    }
}
