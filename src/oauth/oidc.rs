//! OIDC client: provider discovery, code exchange, ID-token verification,
//! and claim-based role mapping.

use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use super::{AuthProviderError, ProviderUser};
use crate::model::{
    is_builtin_role_name, Project, ProjectSSOConfigOidc, Role, BUILTIN_ROLE_VIEWER,
};

const USERNAME_CLAIM_KEYS: [&str; 4] = ["username", "preferred_username", "name", "cognito:username"];
const AVATAR_URL_CLAIM_KEYS: [&str; 2] = ["picture", "avatar_url"];
const ROLE_CLAIM_KEYS: [&str; 5] = [
    "groups",
    "roles",
    "cognito:groups",
    "custom:roles",
    "custom:groups",
];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, Deserialize)]
struct ProviderMetadata {
    issuer: String,
    authorization_endpoint: String,
    token_endpoint: String,
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    id_token: Option<String>,
}

/// OIDC client bound to one project and one decrypted SSO configuration.
pub struct OAuthClient {
    client: Client,
    sso: ProjectSSOConfigOidc,
    project: Project,
    metadata: Option<ProviderMetadata>,
    id_token: Option<String>,
}

impl OAuthClient {
    /// # Errors
    /// Fails when the HTTP client cannot be built or the proxy URL is
    /// malformed.
    pub fn new(sso: &ProjectSSOConfigOidc, project: &Project) -> Result<Self, AuthProviderError> {
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
            metadata: None,
            id_token: None,
        })
    }

    /// Build the provider authorization URL for the login redirect. Runs
    /// discovery against the configured issuer.
    ///
    /// # Errors
    /// Fails on discovery or URL errors.
    pub async fn auth_code_url(&mut self, state: &str) -> Result<String, AuthProviderError> {
        let metadata = self.discover().await?;
        let mut url = Url::parse(&metadata.authorization_endpoint).map_err(|_| {
            AuthProviderError::InvalidProviderUrl(metadata.authorization_endpoint.clone())
        })?;

        let mut scopes = self.sso.scopes.clone();
        if !scopes.iter().any(|scope| scope == "openid") {
            scopes.push("openid".to_string());
        }

        url.query_pairs_mut()
            .append_pair("access_type", "online")
            .append_pair("approval_prompt", "force")
            .append_pair("client_id", &self.sso.client_id)
            .append_pair("redirect_uri", &self.sso.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", state);
        Ok(url.to_string())
    }

    /// Exchange the authorization code for tokens at the discovered token
    /// endpoint.
    ///
    /// # Errors
    /// Fails on discovery, transport, or provider rejection.
    pub async fn exchange_code(&mut self, code: &str) -> Result<(), AuthProviderError> {
        let metadata = self.discover().await?;
        let response = self
            .client
            .post(&metadata.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.sso.redirect_uri.as_str()),
                ("client_id", self.sso.client_id.as_str()),
                ("client_secret", self.sso.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthProviderError::TokenEndpoint(response.status()));
        }
        let body: TokenResponse = response.json().await?;
        self.id_token = Some(body.id_token.ok_or(AuthProviderError::MissingIdToken)?);
        Ok(())
    }

    /// Verify the ID token against the provider keys and derive the user.
    ///
    /// # Errors
    /// Fails on verification errors or when no usable claim is present.
    pub async fn get_user(&self) -> Result<ProviderUser, AuthProviderError> {
        let raw = self.id_token.as_deref().ok_or(AuthProviderError::NotExchanged)?;
        let metadata = self
            .metadata
            .as_ref()
            .ok_or(AuthProviderError::NotExchanged)?;
        let claims = self.verify_id_token(raw, metadata).await?;

        let role = decide_role(&claims, &self.project)?;
        let (username, avatar_url) = decide_user_infos(&claims)?;

        Ok(ProviderUser {
            username,
            avatar_url,
            role,
        })
    }

    async fn discover(&mut self) -> Result<ProviderMetadata, AuthProviderError> {
        if let Some(metadata) = &self.metadata {
            return Ok(metadata.clone());
        }
        let well_known = format!(
            "{}/.well-known/openid-configuration",
            self.sso.issuer.trim_end_matches('/')
        );
        let metadata: ProviderMetadata = self
            .client
            .get(&well_known)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.metadata = Some(metadata.clone());
        Ok(metadata)
    }

    async fn verify_id_token(
        &self,
        raw: &str,
        metadata: &ProviderMetadata,
    ) -> Result<Map<String, Value>, AuthProviderError> {
        let header =
            decode_header(raw).map_err(|err| AuthProviderError::IdToken(err.to_string()))?;

        let jwks: JwkSet = self
            .client
            .get(&metadata.jwks_uri)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let jwk = match header.kid.as_deref() {
            Some(kid) => jwks
                .keys
                .iter()
                .find(|key| key.common.key_id.as_deref() == Some(kid)),
            None => jwks.keys.first(),
        }
        .ok_or_else(|| AuthProviderError::IdToken("no matching key in provider jwks".to_string()))?;

        let key = DecodingKey::from_jwk(jwk)
            .map_err(|err| AuthProviderError::IdToken(err.to_string()))?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[metadata.issuer.as_str()]);
        validation.set_audience(&[self.sso.client_id.as_str()]);

        let data = decode::<Value>(raw, &key, &validation)
            .map_err(|err| AuthProviderError::IdToken(err.to_string()))?;
        data.claims
            .as_object()
            .cloned()
            .ok_or_else(|| AuthProviderError::IdToken("claims are not an object".to_string()))
    }
}

/// Collect role values from the known claim keys, keep the built-in role
/// names, and fall back to Viewer for lenient projects.
fn decide_role(claims: &Map<String, Value>, project: &Project) -> Result<Role, AuthProviderError> {
    let mut names: Vec<String> = Vec::new();
    for key in ROLE_CLAIM_KEYS {
        let Some(value) = claims.get(key) else {
            continue;
        };
        match value {
            Value::Array(items) => {
                for item in items {
                    if let Value::String(s) = item {
                        if !s.is_empty() {
                            names.push(s.clone());
                        }
                    }
                }
            }
            Value::String(s) if !s.is_empty() => names.push(s.clone()),
            _ => {}
        }
    }

    let mut roles: Vec<String> = Vec::new();
    for name in names {
        if is_builtin_role_name(&name) && !roles.contains(&name) {
            roles.push(name);
        }
    }

    if roles.is_empty() {
        if project.allow_stray_as_viewer {
            roles = vec![BUILTIN_ROLE_VIEWER.to_string()];
        } else {
            return Err(AuthProviderError::NoRoleInClaims);
        }
    }

    Ok(Role {
        project_id: project.id.clone(),
        project_rbac_roles: roles,
    })
}

/// Username is required; the avatar URL defaults to empty.
fn decide_user_infos(claims: &Map<String, Value>) -> Result<(String, String), AuthProviderError> {
    let username = first_string_claim(claims, &USERNAME_CLAIM_KEYS)
        .ok_or(AuthProviderError::NoUsernameInClaims)?;
    let avatar_url = first_string_claim(claims, &AVATAR_URL_CLAIM_KEYS).unwrap_or_default();
    Ok((username, avatar_url))
}

fn first_string_claim(claims: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(Value::String(s)) = claims.get(*key) {
            if !s.is_empty() {
                return Some(s.clone());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Map<String, Value> {
        value.as_object().expect("object").clone()
    }

    fn project(allow_stray: bool) -> Project {
        Project {
            id: "p1".to_string(),
            allow_stray_as_viewer: allow_stray,
            ..Project::default()
        }
    }

    #[test]
    fn groups_claim_maps_to_builtin_roles() {
        let role = decide_role(
            &claims(json!({"groups": ["Admin", "Editor"]})),
            &project(false),
        )
        .expect("role");
        assert_eq!(
            role.project_rbac_roles,
            vec!["Admin".to_string(), "Editor".to_string()]
        );
        assert_eq!(role.project_id, "p1");
    }

    #[test]
    fn role_values_may_be_plain_strings() {
        let role = decide_role(&claims(json!({"roles": "Viewer"})), &project(false)).expect("role");
        assert_eq!(role.project_rbac_roles, vec!["Viewer".to_string()]);
    }

    #[test]
    fn roles_union_across_claim_keys() {
        let role = decide_role(
            &claims(json!({
                "groups": ["Admin"],
                "cognito:groups": ["Editor"],
                "custom:roles": "Viewer",
            })),
            &project(false),
        )
        .expect("role");
        assert_eq!(
            role.project_rbac_roles,
            vec![
                "Admin".to_string(),
                "Editor".to_string(),
                "Viewer".to_string()
            ]
        );
    }

    #[test]
    fn non_builtin_values_are_filtered_out() {
        let role = decide_role(
            &claims(json!({"groups": ["ops-team", "Editor"]})),
            &project(false),
        )
        .expect("role");
        assert_eq!(role.project_rbac_roles, vec!["Editor".to_string()]);
    }

    #[test]
    fn empty_claims_fall_back_to_viewer_for_lenient_projects() {
        let role = decide_role(&claims(json!({})), &project(true)).expect("role");
        assert_eq!(role.project_rbac_roles, vec!["Viewer".to_string()]);
    }

    #[test]
    fn only_non_builtin_values_fall_back_to_viewer_for_lenient_projects() {
        let role =
            decide_role(&claims(json!({"groups": ["ops-team"]})), &project(true)).expect("role");
        assert_eq!(role.project_rbac_roles, vec!["Viewer".to_string()]);
    }

    #[test]
    fn empty_claims_fail_for_strict_projects() {
        let err = decide_role(&claims(json!({})), &project(false)).expect_err("must fail");
        assert_eq!(err.to_string(), "no role found in claims");
    }

    #[test]
    fn username_uses_first_matching_claim_key() {
        let (username, avatar) = decide_user_infos(&claims(json!({
            "preferred_username": "bob",
            "name": "Robert",
            "picture": "https://example.com/b.png",
        })))
        .expect("user infos");
        assert_eq!(username, "bob");
        assert_eq!(avatar, "https://example.com/b.png");
    }

    #[test]
    fn missing_username_fails() {
        let err = decide_user_infos(&claims(json!({"picture": "https://example.com/b.png"})))
            .expect_err("must fail");
        assert_eq!(err.to_string(), "no username found in claims");
    }

    #[test]
    fn missing_avatar_defaults_to_empty() {
        let (username, avatar) =
            decide_user_infos(&claims(json!({"username": "bob"}))).expect("user infos");
        assert_eq!(username, "bob");
        assert_eq!(avatar, "");
    }

    #[test]
    fn empty_strings_are_skipped_when_picking_claims() {
        let (username, _) = decide_user_infos(&claims(json!({
            "username": "",
            "preferred_username": "bob",
        })))
        .expect("user infos");
        assert_eq!(username, "bob");
    }
}
