use crate::{api, auth::AuthConfig, cli::globals::GlobalArgs};
use anyhow::Result;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub insecure_cookies: bool,
    pub globals: GlobalArgs,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the KV client cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!("Server args: {:?}", args);

    let config = AuthConfig::new()
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_cookie_secure(!args.insecure_cookies);

    api::new(
        args.port,
        &args.globals.kv_url,
        &args.globals.kv_token,
        &args.globals.csrf_secret,
        &args.frontend_base_url,
        config,
    )
    .await
}
