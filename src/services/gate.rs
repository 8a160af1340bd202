//! Per-request routing decision of the edge gate.
//!
//! The decision is a pure function over a handful of signals computed from the request
//! cookies and path. Rules are kept as an ordered table so precedence stays explicit:
//! the first rule whose guard matches decides the request.

use crate::adapters::cookies::TokenStore;
use crate::domain::route::RouteClass;
use crate::domain::token::token_expiry;
use std::time::Duration;
use time::OffsetDateTime;

/// State of the access token as read from the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessState {
    Missing,
    /// Present but undecodable or without an `exp` claim.
    Malformed,
    Valid { expires_at: OffsetDateTime },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSignals {
    pub route_class: RouteClass,
    pub has_refresh: bool,
    pub access: AccessState,
    pub is_expiring_soon: bool,
}

impl GateSignals {
    /// Computes the signals for a request. Expired tokens count as expiring soon.
    #[must_use]
    pub fn evaluate(
        route_class: RouteClass,
        store: &dyn TokenStore,
        now: OffsetDateTime,
        lookahead: Duration,
    ) -> Self {
        let access = match store.access_token() {
            None => AccessState::Missing,
            Some(token) => token_expiry(&token)
                .map_or(AccessState::Malformed, |expires_at| AccessState::Valid { expires_at }),
        };

        let is_expiring_soon = match access {
            AccessState::Valid { expires_at } => expires_at <= now + lookahead,
            AccessState::Missing | AccessState::Malformed => false,
        };

        Self { route_class, has_refresh: store.refresh_token().is_some(), access, is_expiring_soon }
    }

    #[must_use]
    pub const fn has_access(&self) -> bool {
        !matches!(self.access, AccessState::Missing)
    }

    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self.access, AccessState::Malformed)
    }
}

/// Which session cookies a login redirect removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearCookies {
    Access,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    PassThrough,
    /// Refresh the session before handling the request; a failure ends in a login redirect.
    Refresh,
    RedirectLanding,
    RedirectLogin { clear: ClearCookies, with_notice: bool },
}

struct Rule {
    name: &'static str,
    guard: fn(&GateSignals) -> bool,
    decision: GateDecision,
}

const RULES: &[Rule] = &[
    Rule {
        name: "authenticated_on_auth_page",
        guard: |s| s.route_class == RouteClass::AuthOnly && s.has_refresh,
        decision: GateDecision::RedirectLanding,
    },
    Rule {
        name: "private_without_session",
        guard: |s| s.route_class == RouteClass::Private && !s.has_refresh,
        decision: GateDecision::RedirectLogin { clear: ClearCookies::Access, with_notice: true },
    },
    Rule {
        name: "private_missing_access",
        guard: |s| s.route_class == RouteClass::Private && s.has_refresh && !s.has_access(),
        decision: GateDecision::Refresh,
    },
    Rule {
        name: "private_malformed_access",
        guard: |s| s.route_class == RouteClass::Private && s.has_access() && s.is_malformed(),
        decision: GateDecision::RedirectLogin { clear: ClearCookies::Both, with_notice: false },
    },
    Rule {
        name: "private_access_expiring",
        guard: |s| s.route_class == RouteClass::Private && s.has_access() && s.is_expiring_soon,
        decision: GateDecision::Refresh,
    },
    Rule {
        name: "restore_missing_access",
        guard: |s| s.has_refresh && !s.has_access(),
        decision: GateDecision::Refresh,
    },
];

/// First matching rule wins; requests matching none pass through unchanged.
#[must_use]
pub fn decide(signals: &GateSignals) -> GateDecision {
    RULES.iter().find(|rule| (rule.guard)(signals)).map_or(GateDecision::PassThrough, |rule| {
        tracing::debug!(rule = rule.name, decision = ?rule.decision, "Gate rule matched");
        rule.decision
    })
}
