//! Reaction to authentication failures.
//!
//! Transport code only produces typed errors. [`AuthBoundary`] is the one
//! place that turns an `UNAUTHORIZED` into side effects: the session store
//! is cleared and the active view is routed to the login entry point.

use std::sync::Arc;

use tracing::{info, warn};

use crate::session::SessionStore;

/// Location of the login entry point
pub const LOGIN_PATH: &str = "/auth/login";

/// Routing capability of whatever surface drives the client.
pub trait Navigator: Send + Sync {
    /// Current location, e.g. `/requests/42`
    fn current_location(&self) -> String;

    fn navigate_to_login(&self);
}

/// Navigator for the command line: there is no view to move, so the user is
/// told how to log in again.
#[derive(Debug, Default)]
pub struct CliNavigator;

impl Navigator for CliNavigator {
    fn current_location(&self) -> String {
        String::new()
    }

    fn navigate_to_login(&self) {
        warn!("Session expired or invalid; run `kintai login` to sign in again");
    }
}

#[derive(Clone)]
pub struct AuthBoundary {
    store: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
}

impl AuthBoundary {
    pub fn new(store: Arc<dyn SessionStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self { store, navigator }
    }

    /// Clear the session and route to login unless already there.
    ///
    /// Runs before the `UNAUTHORIZED` error is handed back to the caller.
    pub fn on_unauthorized(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear session after authentication failure");
        }

        let location = self.navigator.current_location();
        if location.starts_with(LOGIN_PATH) {
            return;
        }

        info!(from = %location, "Redirecting to login");
        self.navigator.navigate_to_login();
    }
}
