use crate::cli::actions::Action;
use anyhow::Result;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let required = |name: &str| -> Result<String> {
        matches
            .get_one::<String>(name)
            .map(String::to_string)
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{name}"))
    };
    let optional =
        |name: &str| -> Option<String> { matches.get_one::<String>(name).map(String::to_string) };

    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        address: required("address")?,
        signing_key: required("signing-key")?,
        signing_method: required("signing-method")?,
        state_key: required("state-key")?,
        projects_file: required("projects-file")?,
        config: optional("config"),
        insecure_cookie: matches.get_flag("insecure-cookie"),
        vault_url: optional("vault-url"),
        vault_role_id: optional("vault-role-id"),
        vault_secret_id: optional("vault-secret-id"),
        vault_wrapped_token: optional("vault-wrapped-token"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn dispatch_builds_a_server_action() {
        let matches = commands::new().get_matches_from(vec![
            "pipecd-auth",
            "--address",
            "https://pipecd.example.com",
            "--signing-key",
            "/etc/pipecd/signing.key",
            "--state-key",
            "state-key",
            "--projects-file",
            "/etc/pipecd/projects.json",
            "--insecure-cookie",
        ]);
        let action = handler(&matches).expect("action");
        let Action::Server {
            port,
            address,
            signing_method,
            insecure_cookie,
            vault_url,
            ..
        } = action;
        assert_eq!(port, 8080);
        assert_eq!(address, "https://pipecd.example.com");
        assert_eq!(signing_method, "HS256");
        assert!(insecure_cookie);
        assert!(vault_url.is_none());
    }
}
