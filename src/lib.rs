//! # PipeCD Auth (Control-Plane Authentication)
//!
//! `pipecd-auth` is the authentication entry point of the PipeCD control
//! plane: an OAuth/OIDC redirect-based login flow that issues signed session
//! tokens for a multi-tenant deployment system.
//!
//! ## Tenant model (projects)
//!
//! Projects are the tenant boundary. Each project owns its SSO
//! configuration (or references a process-wide shared one), an ordered list
//! of RBAC roles, user-group bindings from identity-provider groups to role
//! names, and an optional static-admin credential as an escape hatch.
//!
//! - **Built-in roles:** `Admin`, `Editor`, and `Viewer` are hard-coded and
//!   immutable; their names are reserved.
//! - **Legacy slots:** The deprecated three-slot RBAC configuration keeps
//!   authenticating existing deployments through a one-time migration into
//!   user-group bindings.
//!
//! ## Sessions
//!
//! Sessions are JWTs signed under a configurable HS*/RS* method with the
//! issuer pinned to `PipeCD`, carried in an `HttpOnly` cookie. Login
//! attempts are bound to a short-lived CSRF state token keyed by a
//! process-wide state key.
//!
//! ## Secrets
//!
//! Project SSO client ids and secrets are encrypted at rest through an
//! injected crypter (Vault transit in production) and exist in plaintext
//! only inside a request-scoped handler. Serialized entities always carry
//! the literal `redacted` in place of secret material.

pub mod api;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod jwt;
pub mod model;
pub mod oauth;
pub mod store;
pub mod vault;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
