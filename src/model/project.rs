//! Project tenant entity: static admin, SSO configuration, user groups,
//! and the RBAC role list.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::rbac::{builtin_rbac_roles, is_builtin_role_name, ProjectRBACPolicy, ProjectRBACRole};
use super::rbac::{BUILTIN_ROLE_ADMIN, BUILTIN_ROLE_EDITOR, BUILTIN_ROLE_VIEWER};
use crate::crypto;

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Encrypts SSO secrets before they are persisted.
#[async_trait]
pub trait Encrypter: Send + Sync {
    async fn encrypt(&self, plaintext: &str) -> Result<String>;
}

/// Decrypts stored SSO secrets inside a request-scoped frame.
#[async_trait]
pub trait Decrypter: Send + Sync {
    async fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("username is empty")]
    EmptyUsername,
    #[error("password is empty")]
    EmptyPassword,
    #[error("wrong username {0}")]
    WrongUsername(String),
    #[error("wrong password for username {0}")]
    WrongPassword(String),
    #[error("failed to hash password: {0}")]
    HashPassword(#[from] bcrypt::BcryptError),
    #[error("user group {0} already exists")]
    UserGroupAlreadyExists(String),
    #[error("user group {0} does not exist")]
    UserGroupNotFound(String),
    #[error("rbac role {0} does not exist")]
    RoleNotFound(String),
    #[error("rbac role {0} already exists")]
    RoleAlreadyExists(String),
    #[error("built-in rbac role {0} cannot be updated")]
    BuiltinRoleUpdate(String),
    #[error("built-in rbac role {0} cannot be deleted")]
    BuiltinRoleDelete(String),
}

/// Escape-hatch credential used when SSO is misconfigured or disabled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStaticAdmin {
    pub username: String,
    pub password_hash: String,
}

impl ProjectStaticAdmin {
    /// Replace username and/or password. Empty fields preserve the current
    /// value.
    pub fn update(&mut self, username: &str, password: &str) -> Result<(), ProjectError> {
        if !username.is_empty() {
            self.username = username.to_string();
        }
        if !password.is_empty() {
            self.password_hash = crypto::hash_password(password)?;
        }
        Ok(())
    }

    /// Authenticate a username/password pair against this credential.
    /// The username comparison is constant-time; the password comparison
    /// happens inside bcrypt.
    pub fn auth(&self, username: &str, password: &str) -> Result<(), ProjectError> {
        if username.is_empty() {
            return Err(ProjectError::EmptyUsername);
        }
        if password.is_empty() {
            return Err(ProjectError::EmptyPassword);
        }
        if !crypto::constant_time_equal(self.username.as_bytes(), username.as_bytes()) {
            return Err(ProjectError::WrongUsername(username.to_string()));
        }
        crypto::compare_hash_password(&self.password_hash, password)
            .map_err(|_| ProjectError::WrongPassword(username.to_string()))
    }

    /// Blank out the password hash for serialization.
    pub fn redact_sensitive_data(&mut self) {
        self.password_hash = crypto::REDACTED_MESSAGE.to_string();
    }
}

/// Identity-provider kind backing a project's SSO.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectSSOProvider {
    #[default]
    Github,
    Oidc,
}

/// GitHub (or GitHub Enterprise) OAuth application settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSSOConfigGitHub {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub upload_url: String,
    #[serde(default)]
    pub proxy_url: String,
}

impl ProjectSSOConfigGitHub {
    fn update(&mut self, other: &ProjectSSOConfigGitHub) {
        if !other.client_id.is_empty() {
            self.client_id = other.client_id.clone();
        }
        if !other.client_secret.is_empty() {
            self.client_secret = other.client_secret.clone();
        }
        if !other.base_url.is_empty() {
            self.base_url = other.base_url.clone();
        }
        if !other.upload_url.is_empty() {
            self.upload_url = other.upload_url.clone();
        }
        if !other.proxy_url.is_empty() {
            self.proxy_url = other.proxy_url.clone();
        }
    }
}

/// OIDC relying-party settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSSOConfigOidc {
    pub client_id: String,
    pub client_secret: String,
    pub issuer: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub proxy_url: String,
}

impl ProjectSSOConfigOidc {
    fn update(&mut self, other: &ProjectSSOConfigOidc) {
        if !other.client_id.is_empty() {
            self.client_id = other.client_id.clone();
        }
        if !other.client_secret.is_empty() {
            self.client_secret = other.client_secret.clone();
        }
        if !other.issuer.is_empty() {
            self.issuer = other.issuer.clone();
        }
        if !other.redirect_uri.is_empty() {
            self.redirect_uri = other.redirect_uri.clone();
        }
        if !other.scopes.is_empty() {
            self.scopes = other.scopes.clone();
        }
        if !other.proxy_url.is_empty() {
            self.proxy_url = other.proxy_url.clone();
        }
    }
}

/// Per-project SSO configuration. Client ids and secrets are stored
/// encrypted and only decrypted inside a request-scoped handler.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSSOConfig {
    #[serde(default)]
    pub provider: ProjectSSOProvider,
    /// Session lifetime in hours. Zero selects the 7-day default.
    #[serde(default)]
    pub session_ttl: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<ProjectSSOConfigGitHub>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc: Option<ProjectSSOConfigOidc>,
}

impl ProjectSSOConfig {
    /// Merge the present sub-fields of `other` into this configuration,
    /// preserving anything `other` leaves unset.
    pub fn update(&mut self, other: &ProjectSSOConfig) {
        self.provider = other.provider;
        if other.session_ttl != 0 {
            self.session_ttl = other.session_ttl;
        }
        if let Some(github) = &other.github {
            self.github
                .get_or_insert_with(ProjectSSOConfigGitHub::default)
                .update(github);
        }
        if let Some(oidc) = &other.oidc {
            self.oidc
                .get_or_insert_with(ProjectSSOConfigOidc::default)
                .update(oidc);
        }
    }

    /// Session lifetime for tokens issued through this configuration.
    #[must_use]
    pub fn session_ttl_duration(&self) -> Duration {
        if self.session_ttl == 0 {
            DEFAULT_SESSION_TTL
        } else {
            Duration::from_secs(self.session_ttl.unsigned_abs() * 60 * 60)
        }
    }

    /// Encrypt client id and client secret in place. Empty strings are left
    /// untouched so the operation is idempotent on absent values.
    ///
    /// # Errors
    /// Returns the encrypter error unchanged.
    pub async fn encrypt(&mut self, encrypter: &dyn Encrypter) -> Result<()> {
        if let Some(github) = &mut self.github {
            github.client_id = encrypt_field(encrypter, &github.client_id).await?;
            github.client_secret = encrypt_field(encrypter, &github.client_secret).await?;
        }
        if let Some(oidc) = &mut self.oidc {
            oidc.client_id = encrypt_field(encrypter, &oidc.client_id).await?;
            oidc.client_secret = encrypt_field(encrypter, &oidc.client_secret).await?;
        }
        Ok(())
    }

    /// Decrypt client id and client secret in place.
    ///
    /// # Errors
    /// Returns the decrypter error unchanged.
    pub async fn decrypt(&mut self, decrypter: &dyn Decrypter) -> Result<()> {
        if let Some(github) = &mut self.github {
            github.client_id = decrypt_field(decrypter, &github.client_id).await?;
            github.client_secret = decrypt_field(decrypter, &github.client_secret).await?;
        }
        if let Some(oidc) = &mut self.oidc {
            oidc.client_id = decrypt_field(decrypter, &oidc.client_id).await?;
            oidc.client_secret = decrypt_field(decrypter, &oidc.client_secret).await?;
        }
        Ok(())
    }

    /// Blank out client id and client secret for serialization.
    pub fn redact_sensitive_data(&mut self) {
        if let Some(github) = &mut self.github {
            github.client_id = crypto::REDACTED_MESSAGE.to_string();
            github.client_secret = crypto::REDACTED_MESSAGE.to_string();
        }
        if let Some(oidc) = &mut self.oidc {
            oidc.client_id = crypto::REDACTED_MESSAGE.to_string();
            oidc.client_secret = crypto::REDACTED_MESSAGE.to_string();
        }
    }
}

async fn encrypt_field(encrypter: &dyn Encrypter, value: &str) -> Result<String> {
    if value.is_empty() {
        return Ok(String::new());
    }
    encrypter.encrypt(value).await
}

async fn decrypt_field(decrypter: &dyn Decrypter, value: &str) -> Result<String> {
    if value.is_empty() {
        return Ok(String::new());
    }
    decrypter.decrypt(value).await
}

/// Deprecated three-slot RBAC configuration kept for existing deployments.
/// Each slot holds an SSO group identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRBACConfig {
    #[serde(default)]
    pub admin: String,
    #[serde(default)]
    pub editor: String,
    #[serde(default)]
    pub viewer: String,
}

/// Binds an identity-provider group to a project role by name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUserGroup {
    /// Opaque SSO group identifier, e.g. `org/team-admins` or a claim value.
    pub sso_group: String,
    /// Name of a built-in or custom role within the same project.
    pub role: String,
}

/// A tenant of the control plane.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_admin: Option<ProjectStaticAdmin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sso: Option<ProjectSSOConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rbac: Option<ProjectRBACConfig>,
    #[serde(default)]
    pub shared_sso_name: String,
    #[serde(default)]
    pub allow_stray_as_viewer: bool,
    #[serde(default)]
    pub static_admin_disabled: bool,
    #[serde(default)]
    pub rbac_roles: Vec<ProjectRBACRole>,
    #[serde(default)]
    pub user_groups: Vec<ProjectUserGroup>,
}

impl Project {
    /// Install a static admin credential, hashing the given password.
    pub fn set_static_admin(&mut self, username: &str, password: &str) -> Result<(), ProjectError> {
        self.static_admin = Some(ProjectStaticAdmin {
            username: username.to_string(),
            password_hash: crypto::hash_password(password)?,
        });
        Ok(())
    }

    /// Whether `sso_group` is bound, either as a custom binding or through
    /// one of the legacy slots.
    #[must_use]
    pub fn has_user_group(&self, sso_group: &str) -> bool {
        if self.user_groups.iter().any(|g| g.sso_group == sso_group) {
            return true;
        }
        self.rbac.as_ref().is_some_and(|rbac| {
            rbac.admin == sso_group || rbac.editor == sso_group || rbac.viewer == sso_group
        })
    }

    /// All effective user-group bindings: legacy slots converted to built-in
    /// roles followed by the custom bindings, without duplicate SSO keys.
    #[must_use]
    pub fn get_all_user_groups(&self) -> Vec<ProjectUserGroup> {
        let mut groups = self.legacy_user_groups();
        for group in &self.user_groups {
            if !groups.iter().any(|g| g.sso_group == group.sso_group) {
                groups.push(group.clone());
            }
        }
        groups
    }

    fn legacy_user_groups(&self) -> Vec<ProjectUserGroup> {
        let Some(rbac) = &self.rbac else {
            return Vec::new();
        };
        let mut groups: Vec<ProjectUserGroup> = Vec::new();
        // Admin > Editor > Viewer: when two slots carry the same SSO group,
        // the more privileged mapping wins.
        for (slot, role) in [
            (&rbac.admin, BUILTIN_ROLE_ADMIN),
            (&rbac.editor, BUILTIN_ROLE_EDITOR),
            (&rbac.viewer, BUILTIN_ROLE_VIEWER),
        ] {
            if slot.is_empty() {
                continue;
            }
            if groups.iter().any(|g| &g.sso_group == slot) {
                continue;
            }
            groups.push(ProjectUserGroup {
                sso_group: slot.clone(),
                role: role.to_string(),
            });
        }
        groups
    }

    /// One-time compatibility migration: prepend bindings for the legacy
    /// slots while preserving any pre-existing custom bindings.
    pub fn set_legacy_user_groups(&mut self) {
        let mut groups = self.legacy_user_groups();
        for group in self.user_groups.drain(..) {
            if !groups.iter().any(|g| g.sso_group == group.sso_group) {
                groups.push(group);
            }
        }
        self.user_groups = groups;
    }

    /// Bind an SSO group to a role.
    pub fn add_user_group(&mut self, sso_group: &str, role: &str) -> Result<(), ProjectError> {
        if self.has_user_group(sso_group) {
            return Err(ProjectError::UserGroupAlreadyExists(sso_group.to_string()));
        }
        if !self.has_rbac_role(role) {
            return Err(ProjectError::RoleNotFound(role.to_string()));
        }
        self.user_groups.push(ProjectUserGroup {
            sso_group: sso_group.to_string(),
            role: role.to_string(),
        });
        Ok(())
    }

    /// Remove an SSO group binding. A binding living in a legacy slot is
    /// cleared in place.
    pub fn delete_user_group(&mut self, sso_group: &str) -> Result<(), ProjectError> {
        if let Some(index) = self
            .user_groups
            .iter()
            .position(|g| g.sso_group == sso_group)
        {
            self.user_groups.remove(index);
            return Ok(());
        }
        if let Some(rbac) = &mut self.rbac {
            if rbac.admin == sso_group {
                rbac.admin.clear();
                return Ok(());
            }
            if rbac.editor == sso_group {
                rbac.editor.clear();
                return Ok(());
            }
            if rbac.viewer == sso_group {
                rbac.viewer.clear();
                return Ok(());
            }
        }
        Err(ProjectError::UserGroupNotFound(sso_group.to_string()))
    }

    /// Whether `name` resolves to a built-in role or a defined custom role.
    #[must_use]
    pub fn has_rbac_role(&self, name: &str) -> bool {
        is_builtin_role_name(name) || self.rbac_roles.iter().any(|r| r.name == name)
    }

    /// Resolve a role name against the built-ins and the custom role list.
    #[must_use]
    pub fn rbac_role(&self, name: &str) -> Option<ProjectRBACRole> {
        if is_builtin_role_name(name) {
            return builtin_rbac_roles().into_iter().find(|r| r.name == name);
        }
        self.rbac_roles.iter().find(|r| r.name == name).cloned()
    }

    /// Prepend the built-in roles so they can be iterated alongside the
    /// custom roles.
    pub fn set_builtin_rbac_roles(&mut self) {
        let mut roles = builtin_rbac_roles();
        roles.extend(self.rbac_roles.drain(..).filter(|r| !r.is_builtin));
        self.rbac_roles = roles;
    }

    /// Define a custom role. Built-in names are reserved.
    pub fn add_rbac_role(
        &mut self,
        name: &str,
        policies: Vec<ProjectRBACPolicy>,
    ) -> Result<(), ProjectError> {
        if self.has_rbac_role(name) {
            return Err(ProjectError::RoleAlreadyExists(name.to_string()));
        }
        self.rbac_roles.push(ProjectRBACRole {
            name: name.to_string(),
            policies,
            is_builtin: false,
        });
        Ok(())
    }

    /// Replace the policies of a custom role.
    pub fn update_rbac_role(
        &mut self,
        name: &str,
        policies: Vec<ProjectRBACPolicy>,
    ) -> Result<(), ProjectError> {
        if is_builtin_role_name(name) {
            return Err(ProjectError::BuiltinRoleUpdate(name.to_string()));
        }
        let role = self
            .rbac_roles
            .iter_mut()
            .find(|r| r.name == name && !r.is_builtin)
            .ok_or_else(|| ProjectError::RoleNotFound(name.to_string()))?;
        role.policies = policies;
        Ok(())
    }

    /// Remove a custom role.
    pub fn delete_rbac_role(&mut self, name: &str) -> Result<(), ProjectError> {
        if is_builtin_role_name(name) {
            return Err(ProjectError::BuiltinRoleDelete(name.to_string()));
        }
        let index = self
            .rbac_roles
            .iter()
            .position(|r| r.name == name && !r.is_builtin)
            .ok_or_else(|| ProjectError::RoleNotFound(name.to_string()))?;
        self.rbac_roles.remove(index);
        Ok(())
    }

    /// Replace every secret with the redaction literal before serialization.
    pub fn redact_sensitive_data(&mut self) {
        if let Some(admin) = &mut self.static_admin {
            admin.redact_sensitive_data();
        }
        if let Some(sso) = &mut self.sso {
            sso.redact_sensitive_data();
        }
    }
}
