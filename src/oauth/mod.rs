//! Identity-provider clients used to complete SSO logins.
//!
//! GitHub logins map team membership onto project user-group bindings; OIDC
//! logins map token claims onto the built-in role names. The two flows do
//! not share mapping code because a GitHub identity and an OIDC identity
//! mean different things.

pub mod github;
pub mod oidc;

use axum::http::StatusCode;
use thiserror::Error;

use crate::model::{Project, ProjectSSOConfig, ProjectSSOProvider, Role};

/// Identity returned by a provider after a successful code exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderUser {
    pub username: String,
    pub avatar_url: String,
    pub role: Role,
}

#[derive(Debug, Error)]
pub enum AuthProviderError {
    #[error("missing {provider} configuration in SSO settings")]
    MissingProviderConfig { provider: &'static str },
    #[error("invalid proxy url: {0}")]
    InvalidProxyUrl(String),
    #[error("invalid provider url: {0}")]
    InvalidProviderUrl(String),
    #[error("code has not been exchanged yet")]
    NotExchanged,
    #[error("token endpoint returned {0}")]
    TokenEndpoint(StatusCode),
    #[error("token endpoint rejected the code: {0}")]
    TokenRejected(String),
    #[error("no access token in token response")]
    MissingAccessToken,
    #[error("no id_token in token response")]
    MissingIdToken,
    #[error("id token verification failed: {0}")]
    IdToken(String),
    #[error("user ({login}) not found in any of the {teams} project teams")]
    NotInProjectTeams { login: String, teams: usize },
    #[error("no role found in claims")]
    NoRoleInClaims,
    #[error("no username found in claims")]
    NoUsernameInClaims,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Tagged provider client exposing the narrow exchange/get-user surface the
/// auth handler needs.
pub enum ProviderClient {
    Github(github::OAuthClient),
    Oidc(oidc::OAuthClient),
}

impl ProviderClient {
    /// Build the client matching the configured provider. The SSO
    /// configuration must already be decrypted.
    ///
    /// # Errors
    /// Fails when the provider payload is missing or the proxy URL is
    /// malformed.
    pub fn new(sso: &ProjectSSOConfig, project: &Project) -> Result<Self, AuthProviderError> {
        match sso.provider {
            ProjectSSOProvider::Github => {
                let config =
                    sso.github
                        .as_ref()
                        .ok_or(AuthProviderError::MissingProviderConfig {
                            provider: "github",
                        })?;
                Ok(Self::Github(github::OAuthClient::new(config, project)?))
            }
            ProjectSSOProvider::Oidc => {
                let config = sso
                    .oidc
                    .as_ref()
                    .ok_or(AuthProviderError::MissingProviderConfig { provider: "oidc" })?;
                Ok(Self::Oidc(oidc::OAuthClient::new(config, project)?))
            }
        }
    }

    /// Exchange the authorization code for provider tokens.
    ///
    /// # Errors
    /// Propagates provider/transport failures.
    pub async fn exchange_code(&mut self, code: &str) -> Result<(), AuthProviderError> {
        match self {
            Self::Github(client) => client.exchange_code(code).await,
            Self::Oidc(client) => client.exchange_code(code).await,
        }
    }

    /// Fetch the authenticated user and compute their project role.
    ///
    /// # Errors
    /// Propagates provider/transport failures and role-mapping failures.
    pub async fn get_user(&self) -> Result<ProviderUser, AuthProviderError> {
        match self {
            Self::Github(client) => client.get_user().await,
            Self::Oidc(client) => client.get_user().await,
        }
    }
}
