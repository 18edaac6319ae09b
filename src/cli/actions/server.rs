use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use tokio::sync::mpsc;
use tracing::warn;

use crate::api::{self, AuthHandler};
use crate::cli::{actions::Action, globals::GlobalArgs};
use crate::config::ControlPlaneConfig;
use crate::crypto::NoopCrypter;
use crate::jwt::{Signer, SigningMethod};
use crate::model::Decrypter;
use crate::store::FileProjectStore;
use crate::vault::{self, transit::TransitCrypter};

/// Handle the server action.
///
/// Fatal misconfiguration (unreadable signing key, bad PEM, invalid config
/// file) surfaces here and prevents the process from serving requests.
///
/// # Errors
/// Returns an error when startup wiring fails or the server exits abnormally.
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server {
        port,
        address,
        signing_key,
        signing_method,
        state_key,
        projects_file,
        config,
        insecure_cookie,
        vault_url,
        vault_role_id,
        vault_secret_id,
        vault_wrapped_token,
    } = action;

    let method = signing_method.parse::<SigningMethod>()?;
    let signer =
        Signer::from_key_file(method, &signing_key).context("Failed to load the signing key")?;

    let config = match config {
        Some(path) => ControlPlaneConfig::from_file(path)?,
        None => ControlPlaneConfig::default(),
    };

    // The renewal loop signals this channel when Vault credentials cannot be
    // refreshed, driving graceful shutdown.
    let (tx, rx) = mpsc::unbounded_channel();

    let decrypter: Arc<dyn Decrypter> = if let Some(vault_url) = vault_url {
        let role_id = vault_role_id.ok_or_else(|| anyhow!("Vault role-id is required"))?;

        // If vault wrapped token try to unwrap, otherwise use secret-id.
        let vault_token: String = if let Some(wrapped) = &vault_wrapped_token {
            let secret_id = vault::unwrap(&vault_url, wrapped).await?;
            let (token, _) = vault::approle_login(&vault_url, &secret_id, &role_id).await?;
            token
        } else {
            let secret_id = vault_secret_id
                .as_deref()
                .ok_or_else(|| anyhow!("Vault secret-id is required"))?;
            let (token, _) = vault::approle_login(&vault_url, secret_id, &role_id).await?;
            token
        };

        let mut globals = GlobalArgs::new(vault_url);
        globals.set_token(SecretString::from(vault_token));

        vault::renew::try_renew(&globals.vault_url, &globals.vault_token, tx.clone());

        Arc::new(TransitCrypter::new(globals))
    } else {
        warn!("No Vault configured; project SSO secrets are treated as plaintext");
        Arc::new(NoopCrypter)
    };

    let handler = Arc::new(AuthHandler::new(
        signer,
        decrypter,
        &address,
        state_key,
        config.project_map(),
        config.shared_sso_map(),
        Arc::new(FileProjectStore::new(projects_file)),
        !insecure_cookie,
    ));

    api::new(port, handler, rx).await?;

    drop(tx);

    Ok(())
}
