use crate::config::RouteConfig;

/// Access rule attached to a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Login/registration pages, unreachable once a session exists.
    AuthOnly,
    /// Pages requiring a session.
    Private,
    Public,
}

/// Static partition of URL paths into route classes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    auth_only: Vec<String>,
    private: Vec<String>,
}

impl RouteTable {
    #[must_use]
    pub fn new<A, P>(auth_only: A, private: P) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            auth_only: auth_only.into_iter().map(|p| normalize(p.into())).collect(),
            private: private.into_iter().map(|p| normalize(p.into())).collect(),
        }
    }

    #[must_use]
    pub fn from_config(config: &RouteConfig) -> Self {
        Self::new(config.auth_only_paths.iter().cloned(), config.private_paths.iter().cloned())
    }

    /// Auth-only entries take precedence over private ones.
    #[must_use]
    pub fn classify(&self, path: &str) -> RouteClass {
        if self.auth_only.iter().any(|prefix| matches_prefix(path, prefix)) {
            RouteClass::AuthOnly
        } else if self.private.iter().any(|prefix| matches_prefix(path, prefix)) {
            RouteClass::Private
        } else {
            RouteClass::Public
        }
    }
}

fn normalize(path: String) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.starts_with('/') { trimmed.to_string() } else { format!("/{trimmed}") }
}

/// Segment-aware prefix match: `/dashboard` covers `/dashboard/posts` but not `/dashboards`.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path.strip_prefix(prefix).is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::new(["/login", "/register"], ["/dashboard", "/profile/", "settings"])
    }

    #[test]
    fn test_classify_exact_and_nested_paths() {
        let table = table();
        assert_eq!(table.classify("/login"), RouteClass::AuthOnly);
        assert_eq!(table.classify("/register/confirm"), RouteClass::AuthOnly);
        assert_eq!(table.classify("/dashboard"), RouteClass::Private);
        assert_eq!(table.classify("/dashboard/posts/42"), RouteClass::Private);
        assert_eq!(table.classify("/profile"), RouteClass::Private);
        assert_eq!(table.classify("/settings/security"), RouteClass::Private);
    }

    #[test]
    fn test_classify_does_not_match_partial_segments() {
        let table = table();
        assert_eq!(table.classify("/dashboards"), RouteClass::Public);
        assert_eq!(table.classify("/login-help"), RouteClass::Public);
        assert_eq!(table.classify("/"), RouteClass::Public);
        assert_eq!(table.classify("/about"), RouteClass::Public);
    }

    #[test]
    fn test_auth_only_wins_over_private() {
        let table = RouteTable::new(["/account/login"], ["/account"]);
        assert_eq!(table.classify("/account/login"), RouteClass::AuthOnly);
        assert_eq!(table.classify("/account/billing"), RouteClass::Private);
    }
}
