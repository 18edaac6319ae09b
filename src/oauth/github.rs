//! GitHub OAuth client: code exchange, user retrieval, and team-based role
//! mapping.

use std::time::Duration;

use reqwest::{header, Client};
use serde::Deserialize;
use url::Url;

use super::{AuthProviderError, ProviderUser};
use crate::model::{Project, ProjectSSOConfigGitHub, Role, BUILTIN_ROLE_VIEWER};

const DEFAULT_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const DEFAULT_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const DEFAULT_API_BASE: &str = "https://api.github.com";

const TEAMS_PER_PAGE: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    // GitHub returns 200 with an error field on a rejected code.
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
    #[serde(default)]
    avatar_url: String,
}

#[derive(Debug, Deserialize)]
struct GitHubTeam {
    slug: String,
    organization: GitHubOrg,
}

#[derive(Debug, Deserialize)]
struct GitHubOrg {
    login: String,
}

/// Build the provider authorization URL for the login redirect.
///
/// # Errors
/// Fails when the configured base URL cannot be parsed.
pub fn auth_code_url(
    sso: &ProjectSSOConfigGitHub,
    state: &str,
    redirect_uri: &str,
) -> Result<String, AuthProviderError> {
    let authorize = if sso.base_url.is_empty() {
        DEFAULT_AUTHORIZE_URL.to_string()
    } else {
        oauth_endpoint(&sso.base_url, "/login/oauth/authorize")?
    };
    let mut url = Url::parse(&authorize)
        .map_err(|_| AuthProviderError::InvalidProviderUrl(authorize.clone()))?;
    url.query_pairs_mut()
        .append_pair("access_type", "online")
        .append_pair("approval_prompt", "force")
        .append_pair("client_id", &sso.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("state", state);
    Ok(url.to_string())
}

// GitHub Enterprise serves the OAuth endpoints at the host root even when
// the API base points at /api/v3.
fn oauth_endpoint(base_url: &str, path: &str) -> Result<String, AuthProviderError> {
    let parsed =
        Url::parse(base_url).map_err(|_| AuthProviderError::InvalidProviderUrl(base_url.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| AuthProviderError::InvalidProviderUrl(base_url.to_string()))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    Ok(format!("{}://{host}{port}{path}", parsed.scheme()))
}

/// GitHub client bound to one project and one decrypted SSO configuration.
pub struct OAuthClient {
    client: Client,
    sso: ProjectSSOConfigGitHub,
    project: Project,
    access_token: Option<String>,
}

impl OAuthClient {
    /// # Errors
    /// Fails when the HTTP client cannot be built or the proxy URL is
    /// malformed.
    pub fn new(
        sso: &ProjectSSOConfigGitHub,
        project: &Project,
    ) -> Result<Self, AuthProviderError> {
        let mut builder = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT);
        if !sso.proxy_url.is_empty() {
            let proxy = reqwest::Proxy::all(&sso.proxy_url)
                .map_err(|_| AuthProviderError::InvalidProxyUrl(sso.proxy_url.clone()))?;
            builder = builder.proxy(proxy);
        }
        Ok(Self {
            client: builder.build()?,
            sso: sso.clone(),
            project: project.clone(),
            access_token: None,
        })
    }

    /// Exchange the authorization code at the provider token endpoint.
    ///
    /// # Errors
    /// Fails on transport errors or when the provider rejects the code.
    pub async fn exchange_code(&mut self, code: &str) -> Result<(), AuthProviderError> {
        let token_url = if self.sso.base_url.is_empty() {
            DEFAULT_TOKEN_URL.to_string()
        } else {
            oauth_endpoint(&self.sso.base_url, "/login/oauth/access_token")?
        };

        let response = self
            .client
            .post(&token_url)
            .header(header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.sso.client_id.as_str()),
                ("client_secret", self.sso.client_secret.as_str()),
                ("code", code),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthProviderError::TokenEndpoint(response.status()));
        }
        let body: TokenResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(AuthProviderError::TokenRejected(error));
        }
        self.access_token = Some(body.access_token.ok_or(AuthProviderError::MissingAccessToken)?);
        Ok(())
    }

    /// Fetch the authenticated user and their teams, then derive the project
    /// role from the user-group bindings.
    ///
    /// # Errors
    /// Fails on transport errors or when no binding matches and the project
    /// does not allow stray users.
    pub async fn get_user(&self) -> Result<ProviderUser, AuthProviderError> {
        let token = self
            .access_token
            .as_deref()
            .ok_or(AuthProviderError::NotExchanged)?;
        let api_base = if self.sso.base_url.is_empty() {
            DEFAULT_API_BASE.to_string()
        } else {
            self.sso.base_url.trim_end_matches('/').to_string()
        };

        let user: GitHubUser = self
            .client
            .get(format!("{api_base}/user"))
            .bearer_auth(token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let teams = self.fetch_teams(token, &api_base).await?;
        let role = self.decide_role(&user.login, &teams)?;

        Ok(ProviderUser {
            username: user.login,
            avatar_url: user.avatar_url,
            role,
        })
    }

    async fn fetch_teams(
        &self,
        token: &str,
        api_base: &str,
    ) -> Result<Vec<GitHubTeam>, AuthProviderError> {
        let mut teams = Vec::new();
        let mut page = 1usize;
        loop {
            let batch: Vec<GitHubTeam> = self
                .client
                .get(format!(
                    "{api_base}/user/teams?per_page={TEAMS_PER_PAGE}&page={page}"
                ))
                .bearer_auth(token)
                .header(header::ACCEPT, "application/vnd.github+json")
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            let len = batch.len();
            teams.extend(batch);
            if len < TEAMS_PER_PAGE {
                return Ok(teams);
            }
            page += 1;
        }
    }

    /// Each team `org/slug` matching a user-group binding contributes the
    /// bound role name verbatim.
    fn decide_role(&self, login: &str, teams: &[GitHubTeam]) -> Result<Role, AuthProviderError> {
        let mut names: Vec<String> = Vec::new();
        for team in teams {
            let key = format!("{}/{}", team.organization.login, team.slug);
            let Some(group) = self
                .project
                .user_groups
                .iter()
                .find(|group| group.sso_group == key)
            else {
                continue;
            };
            if !names.contains(&group.role) {
                names.push(group.role.clone());
            }
        }

        if names.is_empty() {
            if self.project.allow_stray_as_viewer {
                names = vec![BUILTIN_ROLE_VIEWER.to_string()];
            } else {
                return Err(AuthProviderError::NotInProjectTeams {
                    login: login.to_string(),
                    teams: self.project.user_groups.len(),
                });
            }
        }

        Ok(Role {
            project_id: self.project.id.clone(),
            project_rbac_roles: names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProjectUserGroup;

    fn team(org: &str, slug: &str) -> GitHubTeam {
        GitHubTeam {
            slug: slug.to_string(),
            organization: GitHubOrg {
                login: org.to_string(),
            },
        }
    }

    fn project(groups: Vec<(&str, &str)>, allow_stray: bool) -> Project {
        Project {
            id: "p1".to_string(),
            allow_stray_as_viewer: allow_stray,
            user_groups: groups
                .into_iter()
                .map(|(sso_group, role)| ProjectUserGroup {
                    sso_group: sso_group.to_string(),
                    role: role.to_string(),
                })
                .collect(),
            ..Project::default()
        }
    }

    fn client(project: Project) -> OAuthClient {
        OAuthClient::new(&ProjectSSOConfigGitHub::default(), &project).expect("client")
    }

    #[test]
    fn matching_team_returns_the_bound_role_name() {
        let client = client(project(vec![("org/team-editor", "Editor")], false));
        let role = client
            .decide_role("alice", &[team("org", "team-editor")])
            .expect("role");
        assert_eq!(role.project_id, "p1");
        assert_eq!(role.project_rbac_roles, vec!["Editor".to_string()]);
    }

    #[test]
    fn custom_role_names_are_returned_verbatim() {
        let client = client(project(vec![("acme/ops", "Operator")], false));
        let role = client
            .decide_role("alice", &[team("acme", "ops")])
            .expect("role");
        assert_eq!(role.project_rbac_roles, vec!["Operator".to_string()]);
    }

    #[test]
    fn duplicate_roles_from_multiple_teams_collapse() {
        let client = client(project(
            vec![("acme/a", "Editor"), ("acme/b", "Editor")],
            false,
        ));
        let role = client
            .decide_role("alice", &[team("acme", "a"), team("acme", "b")])
            .expect("role");
        assert_eq!(role.project_rbac_roles, vec!["Editor".to_string()]);
    }

    #[test]
    fn stray_user_becomes_viewer_when_allowed() {
        let client = client(project(vec![("acme/admins", "Admin")], true));
        let role = client
            .decide_role("alice", &[team("other", "team")])
            .expect("role");
        assert_eq!(role.project_rbac_roles, vec!["Viewer".to_string()]);
    }

    #[test]
    fn stray_user_fails_when_not_allowed() {
        let client = client(project(
            vec![("acme/admins", "Admin"), ("acme/devs", "Editor")],
            false,
        ));
        let err = client
            .decide_role("alice", &[team("other", "team")])
            .expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "user (alice) not found in any of the 2 project teams"
        );
    }

    #[test]
    fn auth_code_url_contains_oauth_parameters() {
        let sso = ProjectSSOConfigGitHub {
            client_id: "client-id".to_string(),
            ..ProjectSSOConfigGitHub::default()
        };
        let url = auth_code_url(&sso, "state-value", "https://pipecd.example.com/auth/callback")
            .expect("url");
        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("state=state-value"));
        assert!(url.contains("access_type=online"));
        assert!(url.contains("approval_prompt=force"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fpipecd.example.com%2Fauth%2Fcallback"));
    }

    #[test]
    fn auth_code_url_honors_enterprise_base_url() {
        let sso = ProjectSSOConfigGitHub {
            client_id: "client-id".to_string(),
            base_url: "https://ghe.example.com:8443/api/v3".to_string(),
            ..ProjectSSOConfigGitHub::default()
        };
        let url = auth_code_url(&sso, "state", "https://pipecd.example.com/auth/callback")
            .expect("url");
        assert!(url.starts_with("https://ghe.example.com:8443/login/oauth/authorize?"));
    }

    #[test]
    fn invalid_proxy_url_is_rejected() {
        let sso = ProjectSSOConfigGitHub {
            proxy_url: "not a url".to_string(),
            ..ProjectSSOConfigGitHub::default()
        };
        assert!(OAuthClient::new(&sso, &Project::default()).is_err());
    }
}
