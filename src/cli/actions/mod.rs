pub mod server;

/// Action dispatched from the parsed command line.
#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        address: String,
        signing_key: String,
        signing_method: String,
        state_key: String,
        projects_file: String,
        config: Option<String>,
        insecure_cookie: bool,
        vault_url: Option<String>,
        vault_role_id: Option<String>,
        vault_secret_id: Option<String>,
        vault_wrapped_token: Option<String>,
    },
}
