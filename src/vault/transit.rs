//! Encrypt/decrypt project SSO secrets through the Vault transit engine.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::Value;
use std::collections::HashMap;
use tracing::error;

use crate::cli::globals::GlobalArgs;
use crate::model::{Decrypter, Encrypter};
use crate::{vault, APP_USER_AGENT};

const ENCRYPT_ENDPOINT: &str = "/v1/transit/pipecd/encrypt/sso";
const DECRYPT_ENDPOINT: &str = "/v1/transit/pipecd/decrypt/sso";

fn vault_error_message(json_response: &Value) -> &str {
    json_response
        .get("errors")
        .and_then(|v| v.get(0))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn get_required_str<'a>(json_response: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = json_response;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str()
}

/// Crypter backed by a Vault transit key. Safe for concurrent use; each
/// call builds its own request.
#[derive(Debug, Clone)]
pub struct TransitCrypter {
    globals: GlobalArgs,
}

impl TransitCrypter {
    #[must_use]
    pub fn new(globals: GlobalArgs) -> Self {
        Self { globals }
    }

    async fn post(&self, endpoint: &str, payload: &HashMap<&str, String>) -> Result<Value> {
        let client = Client::builder().user_agent(APP_USER_AGENT).build()?;

        let url = vault::endpoint_url(&self.globals.vault_url, endpoint)?;

        let response = client
            .post(url.as_str())
            .header("X-Vault-Token", self.globals.vault_token.expose_secret())
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let json_response: Value = response.json().await?;

            let error_message = vault_error_message(&json_response);

            error!("Vault transit request failed: {}", error_message);

            return Err(anyhow!("{status}, {error_message}"));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Encrypter for TransitCrypter {
    async fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut payload = HashMap::new();
        payload.insert("plaintext", Base64::encode_string(plaintext.as_bytes()));

        let json_response = self.post(ENCRYPT_ENDPOINT, &payload).await?;

        get_required_str(&json_response, &["data", "ciphertext"]).map_or_else(
            || {
                error!("Failed to encrypt, no ciphertext in response");
                Err(anyhow!("Failed to encrypt"))
            },
            |ciphertext| Ok(ciphertext.to_string()),
        )
    }
}

#[async_trait]
impl Decrypter for TransitCrypter {
    async fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let mut payload = HashMap::new();
        payload.insert("ciphertext", ciphertext.to_string());

        let json_response = self.post(DECRYPT_ENDPOINT, &payload).await?;

        let plaintext_b64 =
            get_required_str(&json_response, &["data", "plaintext"]).ok_or_else(|| {
                error!("Failed to decrypt, no plaintext in response");
                anyhow!("Failed to decrypt")
            })?;

        let decoded = Base64::decode_vec(plaintext_b64).map_err(|e| {
            error!("Failed to decode plaintext: {}", e);
            anyhow!("Failed to decode plaintext")
        })?;

        String::from_utf8(decoded).map_err(|e| {
            error!("Failed to convert plaintext to string: {}", e);
            anyhow!("Failed to convert plaintext to string")
        })
    }
}
