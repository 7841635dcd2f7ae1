//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::globals::GlobalArgs;
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let kv_url = matches
        .get_one::<String>("kv-url")
        .cloned()
        .context("missing required argument: --kv-url")?;
    let kv_token = matches
        .get_one::<String>("kv-token")
        .cloned()
        .context("missing required argument: --kv-token")?;
    let csrf_secret = matches
        .get_one::<String>("csrf-secret")
        .cloned()
        .context("missing required argument: --csrf-secret")?;
    let frontend_base_url = matches
        .get_one::<String>("frontend-url")
        .cloned()
        .unwrap_or_else(|| "http://localhost:3000".to_string());
    let session_ttl_seconds = matches
        .get_one::<i64>("session-ttl")
        .copied()
        .unwrap_or(24 * 60 * 60);

    let globals = GlobalArgs::new(
        kv_url,
        SecretString::from(kv_token),
        SecretString::from(csrf_secret),
    );

    Ok(Action::Server(Args {
        port,
        frontend_base_url,
        session_ttl_seconds,
        insecure_cookies: matches.get_flag("insecure-cookies"),
        globals,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn server_action_from_matches() {
        temp_env::with_vars(
            [
                ("WIKIGATE_KV_URL", Some("https://kv.example.com")),
                ("WIKIGATE_KV_TOKEN", Some("store-token")),
                ("WIKIGATE_CSRF_SECRET", Some("forty-two")),
                ("WIKIGATE_PORT", None::<&str>),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["wikigate"]);
                let action = handler(&matches);
                let Ok(Action::Server(args)) = action else {
                    panic!("expected a server action");
                };
                assert_eq!(args.port, 8080);
                assert_eq!(args.globals.kv_url, "https://kv.example.com");
                assert_eq!(args.globals.kv_token.expose_secret(), "store-token");
                assert_eq!(args.session_ttl_seconds, 24 * 60 * 60);
                assert!(!args.insecure_cookies);
            },
        );
    }
}
