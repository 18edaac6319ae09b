//! Background renewal of the Vault client token. Repeated failure drives
//! graceful shutdown so the process never serves with dead credentials.

use anyhow::{anyhow, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tokio::{
    sync::mpsc,
    time::{sleep, Duration},
};
use tracing::{debug, error, warn};

use crate::{vault, APP_USER_AGENT};

async fn renew_token(url: &str, token: &SecretString, increment: Option<u64>) -> Result<u64> {
    let client = Client::builder().user_agent(APP_USER_AGENT).build()?;

    let renew_url = vault::endpoint_url(url, "/v1/auth/token/renew-self")?;

    let payload = json!({
        "increment": increment.unwrap_or(0)
    });

    let response = client
        .post(&renew_url)
        .json(&payload)
        .header("X-Vault-Token", token.expose_secret())
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let json_response: Value = response.json().await?;

        return Err(anyhow!(
            "{} - {}, {}",
            renew_url,
            status,
            json_response["errors"][0].as_str().unwrap_or("")
        ));
    }

    let json_response: Value = response.json().await?;

    json_response["auth"]["lease_duration"]
        .as_u64()
        .ok_or_else(|| anyhow!("Error parsing JSON response: no lease_duration found"))
}

/// Spawn the renewal loop. Three consecutive failures signal `tx` so the
/// server can shut down gracefully.
pub fn try_renew(vault_url: &str, vault_token: &SecretString, tx: mpsc::UnboundedSender<()>) {
    tokio::spawn({
        let mut rng = StdRng::from_entropy();
        let mut jittered_lease_duration = Duration::default();

        let url = vault_url.to_string();
        let token = vault_token.clone();

        async move {
            loop {
                for attempt in 1..=3 {
                    let backoff_time = 2u64.pow(attempt - 1);

                    if attempt > 1 {
                        warn!("Backing off for {} seconds", backoff_time);
                        sleep(Duration::from_secs(backoff_time)).await;
                    }

                    match renew_token(&url, &token, None).await {
                        Ok(lease_duration) => {
                            let factor = rng.gen_range(70..90);

                            jittered_lease_duration =
                                Duration::from_secs(lease_duration * factor / 100);

                            break;
                        }

                        Err(e) => {
                            error!("Failed to renew token: {}", e);

                            if attempt == 3 {
                                error!("Failed to renew token after 3 attempts: {}", e);
                                let _ = tx.send(());
                                return;
                            }
                        }
                    }
                }

                debug!(
                    "Will renew token in {} seconds",
                    jittered_lease_duration.as_secs()
                );

                sleep(jittered_lease_duration).await;
            }
        }
    });
}
