//! Vault plumbing: AppRole login, token lifecycle, and the transit-backed
//! crypter for SSO secrets.

pub mod renew;
pub mod transit;

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::APP_USER_AGENT;

/// Build an absolute endpoint URL from the configured Vault base URL.
///
/// # Errors
/// Returns an error when the base URL cannot be parsed or uses an
/// unsupported scheme.
pub fn endpoint_url(vault_url: &str, endpoint: &str) -> Result<String> {
    let url = Url::parse(vault_url)?;

    let scheme = url.scheme();

    let host = url
        .host()
        .ok_or_else(|| anyhow!("Error parsing URL: no host specified"))?
        .to_owned();

    let port = match url.port() {
        Some(p) => p,
        None => match scheme {
            "http" => 80,
            "https" => 443,
            _ => return Err(anyhow!("Error parsing URL: unsupported scheme {}", scheme)),
        },
    };

    let endpoint_url = format!("{scheme}://{host}:{port}{endpoint}");

    debug!("endpoint URL: {}", endpoint);

    Ok(endpoint_url)
}

/// Unwrap a wrapped Vault secret id.
///
/// # Errors
/// Returns an error when Vault rejects the wrapped token or the response is
/// missing the secret id.
pub async fn unwrap(vault_url: &str, token: &str) -> Result<String> {
    let client = Client::builder().user_agent(APP_USER_AGENT).build()?;

    let unwrap_url = endpoint_url(vault_url, "/v1/sys/wrapping/unwrap")?;

    let response = client
        .post(&unwrap_url)
        .header("X-Vault-Token", token)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let json_response: Value = response.json().await?;

        return Err(anyhow!(
            "{} - {}, {}",
            unwrap_url,
            status,
            json_response["errors"][0].as_str().unwrap_or("")
        ));
    }

    let json_response: Value = response.json().await?;
    let sid = json_response["data"]["secret_id"]
        .as_str()
        .ok_or_else(|| anyhow!("Error parsing JSON response: no secret_id found"))?;

    Ok(sid.to_string())
}

/// Login to Vault using AppRole. Returns the client token and its lease
/// duration.
///
/// # Errors
/// Returns an error when Vault rejects the role/secret pair.
pub async fn approle_login(vault_url: &str, sid: &str, rid: &str) -> Result<(String, u64)> {
    let client = Client::builder().user_agent(APP_USER_AGENT).build()?;

    let login_payload = json!({
        "role_id": rid,
        "secret_id": sid
    });

    debug!("login URL: {}, role ID: {}", vault_url, rid);

    let response = client.post(vault_url).json(&login_payload).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let json_response: Value = response.json().await?;

        return Err(anyhow!(
            "{} - {}, {}",
            vault_url,
            status,
            json_response["errors"][0].as_str().unwrap_or("")
        ));
    }

    let json_response: Value = response.json().await?;
    let token = json_response["auth"]["client_token"]
        .as_str()
        .ok_or_else(|| anyhow!("Error parsing JSON response: no client_token found"))?;
    let lease_duration = json_response["auth"]["lease_duration"]
        .as_u64()
        .unwrap_or(1800);

    Ok((token.to_string(), lease_duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_appends_default_ports() {
        let url = endpoint_url("https://vault.tld", "/v1/sys/health").expect("url");
        assert_eq!(url, "https://vault.tld:443/v1/sys/health");

        let url = endpoint_url("http://vault.tld", "/v1/sys/health").expect("url");
        assert_eq!(url, "http://vault.tld:80/v1/sys/health");
    }

    #[test]
    fn endpoint_url_keeps_explicit_ports() {
        let url = endpoint_url("https://vault.tld:8200", "/v1/x").expect("url");
        assert_eq!(url, "https://vault.tld:8200/v1/x");
    }

    #[test]
    fn endpoint_url_rejects_unsupported_schemes() {
        assert!(endpoint_url("ftp://vault.tld", "/v1/x").is_err());
        assert!(endpoint_url("not a url", "/v1/x").is_err());
    }
}
