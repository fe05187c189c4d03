//! Tenant context resolution.
//!
//! Every storage key the assistant touches is derived from a [`TenantContext`].
//! Resolution is total: a missing or malformed session id still yields a
//! usable context, so handlers never have to deal with "no tenant".

use serde::{Deserialize, Serialize};

pub const DEFAULT_TENANT: &str = "demo-tenant";
pub const DEFAULT_USER: &str = "demo-user";
pub const DEFAULT_WEBSOCKET_PREFIX: &str = "ws-";

const MAX_SEGMENT_LEN: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: String,
    pub user_id: String,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self { tenant_id: tenant_id.into(), user_id: user_id.into() }
    }

    /// Object-store prefix owned by this tenant/user pair, always `/`-terminated.
    pub fn key_prefix(&self) -> String {
        format!("{}/{}/", self.tenant_id, self.user_id)
    }

    /// Prefix under which generated document artifacts live.
    pub fn documents_prefix(&self) -> String {
        format!("{}documents/", self.key_prefix())
    }

    /// Builds a key under [`Self::key_prefix`] from a caller-supplied suffix.
    ///
    /// Empty, `.` and `..` segments are dropped, so the result can never climb
    /// out of the tenant/user namespace.
    pub fn scoped_key(&self, suffix: &str) -> String {
        let mut key = self.key_prefix();
        key.push_str(&normalize_suffix(suffix));
        key
    }

    /// Prefix used for log groups, which are shared by all users of a tenant.
    pub fn log_group_prefix(&self) -> String {
        format!("{}/", self.tenant_id)
    }

    pub fn owns_key(&self, key: &str) -> bool {
        key.starts_with(&self.key_prefix())
    }
}

pub fn normalize_suffix(suffix: &str) -> String {
    let trailing_slash = suffix.ends_with('/');
    let segments = suffix
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect::<Vec<_>>();

    let mut normalized = segments.join("/");
    if trailing_slash && !normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantResolver {
    default_tenant: String,
    default_user: String,
    websocket_prefix: String,
}

impl Default for TenantResolver {
    fn default() -> Self {
        Self::new(DEFAULT_TENANT, DEFAULT_USER, DEFAULT_WEBSOCKET_PREFIX)
    }
}

impl TenantResolver {
    pub fn new(
        default_tenant: impl Into<String>,
        default_user: impl Into<String>,
        websocket_prefix: impl Into<String>,
    ) -> Self {
        Self {
            default_tenant: default_tenant.into(),
            default_user: default_user.into(),
            websocket_prefix: websocket_prefix.into(),
        }
    }

    /// Resolves a session id to its tenant context. Never fails.
    ///
    /// All sessions share the default tenant. Websocket sessions (ids carrying
    /// the websocket prefix) get their own user namespace so anonymous
    /// connections do not collide in the object store.
    pub fn resolve(&self, session_id: Option<&str>) -> TenantContext {
        let user_id = session_id
            .map(str::trim)
            .and_then(|session| self.websocket_user(session))
            .unwrap_or_else(|| self.default_user.clone());

        TenantContext { tenant_id: self.default_tenant.clone(), user_id }
    }

    fn websocket_user(&self, session_id: &str) -> Option<String> {
        if self.websocket_prefix.is_empty() {
            return None;
        }
        let connection = session_id.strip_prefix(self.websocket_prefix.as_str())?;
        let sanitized = sanitize_segment(connection);
        (!sanitized.is_empty()).then(|| format!("ws-{sanitized}"))
    }
}

fn sanitize_segment(raw: &str) -> String {
    raw.chars()
        .filter(|character| character.is_ascii_alphanumeric() || matches!(character, '-' | '_'))
        .take(MAX_SEGMENT_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{TenantContext, TenantResolver, DEFAULT_TENANT, DEFAULT_USER};

    #[test]
    fn absent_or_blank_session_resolves_to_defaults() {
        let resolver = TenantResolver::default();

        for session in [None, Some(""), Some("   "), Some("http-session-17")] {
            let context = resolver.resolve(session);
            assert_eq!(context.tenant_id, DEFAULT_TENANT);
            assert_eq!(context.user_id, DEFAULT_USER);
        }
    }

    #[test]
    fn websocket_sessions_get_per_connection_users() {
        let resolver = TenantResolver::default();

        let first = resolver.resolve(Some("ws-conn-a1"));
        let second = resolver.resolve(Some("ws-conn-b2"));

        assert_eq!(first.user_id, "ws-conn-a1");
        assert_eq!(second.user_id, "ws-conn-b2");
        assert_eq!(first.tenant_id, second.tenant_id);
        assert_ne!(first.key_prefix(), second.key_prefix());
    }

    #[test]
    fn malformed_websocket_session_falls_back_to_default_user() {
        let resolver = TenantResolver::default();
        assert_eq!(resolver.resolve(Some("ws-")).user_id, DEFAULT_USER);
        assert_eq!(resolver.resolve(Some("ws-../../")).user_id, DEFAULT_USER);
        assert_eq!(resolver.resolve(Some("ws-a/b")).user_id, "ws-ab");
    }

    #[test]
    fn resolution_is_deterministic() {
        let resolver = TenantResolver::new("agency-1", "officer", "sock:");
        assert_eq!(resolver.resolve(Some("sock:42")), resolver.resolve(Some("sock:42")));
        assert_eq!(resolver.resolve(Some("sock:42")).user_id, "ws-42");
    }

    #[test]
    fn scoped_keys_cannot_escape_the_namespace() {
        let context = TenantContext::new("tenant-a", "user-1");

        assert_eq!(context.scoped_key("notes/a.txt"), "tenant-a/user-1/notes/a.txt");
        assert_eq!(
            context.scoped_key("/../../tenant-b/user-1/x"),
            "tenant-a/user-1/tenant-b/user-1/x"
        );
        assert_eq!(context.scoped_key("./documents/"), "tenant-a/user-1/documents/");
        assert_eq!(context.scoped_key(""), "tenant-a/user-1/");
        assert!(context.owns_key(&context.scoped_key("../../..")));
    }

    #[test]
    fn documents_prefix_sits_under_key_prefix() {
        let context = TenantContext::new("t", "u");
        assert_eq!(context.documents_prefix(), "t/u/documents/");
        assert_eq!(context.log_group_prefix(), "t/");
    }
}
