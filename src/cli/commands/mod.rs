use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("pipecd-auth")
        .about("Authentication for the PipeCD control plane")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("PIPECD_AUTH_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("address")
                .long("address")
                .help("Public URL of this control plane, used to build the SSO callback URL")
                .env("PIPECD_AUTH_ADDRESS")
                .required(true),
        )
        .arg(
            Arg::new("signing-key")
                .long("signing-key")
                .help("Path to the session token signing key (shared secret for HS*, PEM private key for RS*)")
                .env("PIPECD_AUTH_SIGNING_KEY")
                .required(true),
        )
        .arg(
            Arg::new("signing-method")
                .long("signing-method")
                .help("Session token signing method: HS256, HS384, HS512, RS256, RS384, RS512")
                .default_value("HS256")
                .env("PIPECD_AUTH_SIGNING_METHOD"),
        )
        .arg(
            Arg::new("state-key")
                .long("state-key")
                .help("Process-wide key for generating and validating login state tokens")
                .env("PIPECD_AUTH_STATE_KEY")
                .required(true),
        )
        .arg(
            Arg::new("projects-file")
                .long("projects-file")
                .help("Path to the JSON document mapping project ids to project entities")
                .env("PIPECD_AUTH_PROJECTS_FILE")
                .required(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("Path to the process configuration (static admins, shared SSO)")
                .env("PIPECD_AUTH_CONFIG"),
        )
        .arg(
            Arg::new("insecure-cookie")
                .long("insecure-cookie")
                .help("Drop the Secure attribute from cookies (development only)")
                .env("PIPECD_AUTH_INSECURE_COOKIE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("vault-url")
                .long("vault-url")
                .help("Vault approle login URL, example: https://vault.tld:8200/v1/auth/<approle>/login")
                .env("PIPECD_AUTH_VAULT_URL")
                .requires("vault-role-id"),
        )
        .arg(
            Arg::new("vault-role-id")
                .long("vault-role-id")
                .help("Vault role id")
                .env("PIPECD_AUTH_VAULT_ROLE_ID"),
        )
        .arg(
            Arg::new("vault-secret-id")
                .long("vault-secret-id")
                .help("Vault secret id")
                .env("PIPECD_AUTH_VAULT_SECRET_ID"),
        )
        .arg(
            Arg::new("vault-wrapped-token")
                .long("vault-wrapped-token")
                .help("Vault wrapped token")
                .env("PIPECD_AUTH_VAULT_WRAPPED_TOKEN"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("PIPECD_AUTH_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "pipecd-auth",
            "--address",
            "https://pipecd.example.com",
            "--signing-key",
            "/etc/pipecd/signing.key",
            "--state-key",
            "state-key",
            "--projects-file",
            "/etc/pipecd/projects.json",
        ]
    }

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "pipecd-auth");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            "Authentication for the PipeCD control plane"
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_required_args_and_defaults() {
        let command = new();
        let matches = command.get_matches_from(base_args());

        assert_eq!(matches.get_one::<u16>("port").copied(), Some(8080));
        assert_eq!(
            matches.get_one::<String>("signing-method").map(String::as_str),
            Some("HS256")
        );
        assert!(!matches.get_flag("insecure-cookie"));
        assert_eq!(
            matches.get_one::<String>("address").map(String::as_str),
            Some("https://pipecd.example.com")
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("PIPECD_AUTH_ADDRESS", Some("https://pipecd.example.com")),
                ("PIPECD_AUTH_SIGNING_KEY", Some("/etc/pipecd/signing.key")),
                ("PIPECD_AUTH_SIGNING_METHOD", Some("RS256")),
                ("PIPECD_AUTH_STATE_KEY", Some("state-key")),
                (
                    "PIPECD_AUTH_PROJECTS_FILE",
                    Some("/etc/pipecd/projects.json"),
                ),
                ("PIPECD_AUTH_PORT", Some("443")),
                ("PIPECD_AUTH_LOG_LEVEL", Some("info")),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["pipecd-auth"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(443));
                assert_eq!(
                    matches
                        .get_one::<String>("signing-method")
                        .map(String::as_str),
                    Some("RS256")
                );
                assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(2));
            },
        );
    }

    #[test]
    fn test_check_log_level_verbosity() {
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("PIPECD_AUTH_LOG_LEVEL", None::<String>)], || {
                let mut args: Vec<String> =
                    base_args().into_iter().map(ToString::to_string).collect();

                // Add the appropriate number of "-v" flags based on the index
                if index > 0 {
                    let v = format!("-{}", "v".repeat(index));
                    args.push(v);
                }

                let command = new();

                let matches = command.get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>("verbosity").copied(),
                    Some(index as u8)
                );
            });
        }
    }
}
