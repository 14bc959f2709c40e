//! Navigation boundary between the session layer and the application router
//!
//! The session layer only triggers a hard redirect when the session cannot be
//! recovered. Everything else is the router's decision, made from
//! `is_authenticated` through [`guard_route`].

/// Query flag added to the landing location when a protected route was refused
pub const AUTH_REQUIRED_FLAG: &str = "authRequired=1";

/// Full-page navigation, discarding in-memory application state
pub trait Navigator: Send + Sync {
    fn hard_redirect(&self, location: &str);
}

impl<F> Navigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn hard_redirect(&self, location: &str) {
        self(location)
    }
}

/// Navigator for headless use: logs the redirect and does nothing else
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn hard_redirect(&self, location: &str) {
        tracing::info!(location = %location, "Hard redirect requested");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    Redirect { location: String },
}

/// Decide whether navigation to `path` may proceed.
///
/// The landing route is always reachable. Every other route needs an
/// authenticated session; otherwise the router is sent to the landing route
/// with the `authRequired` prompt flag.
pub fn guard_route(path: &str, is_authenticated: bool, landing: &str) -> RouteDecision {
    let route = strip_query(path);
    if route == landing || is_authenticated {
        return RouteDecision::Allow;
    }

    RouteDecision::Redirect {
        location: format!("{}?{}", landing, AUTH_REQUIRED_FLAG),
    }
}

/// Whether the landing page should show the "authentication required" prompt
pub fn auth_prompt_requested(location: &str) -> bool {
    query_pairs(location).any(|pair| pair == AUTH_REQUIRED_FLAG)
}

/// Drop the prompt flag from `location` once the prompt has been shown
pub fn acknowledge_auth_prompt(location: &str) -> String {
    let route = strip_query(location);
    let rest: Vec<&str> = query_pairs(location)
        .filter(|pair| *pair != AUTH_REQUIRED_FLAG)
        .collect();

    if rest.is_empty() {
        route.to_string()
    } else {
        format!("{}?{}", route, rest.join("&"))
    }
}

fn strip_query(location: &str) -> &str {
    location.split(['?', '#']).next().unwrap_or(location)
}

fn query_pairs(location: &str) -> impl Iterator<Item = &str> {
    let query = location
        .split_once('?')
        .map(|(_, query)| query.split('#').next().unwrap_or(query))
        .unwrap_or("");
    query.split('&').filter(|pair| !pair.is_empty())
}
