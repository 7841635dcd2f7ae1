use secrecy::SecretString;

/// Shared secrets and store coordinates, threaded from the CLI into the
/// server. Secrets stay wrapped until the moment they are used.
#[derive(Clone)]
pub struct GlobalArgs {
    pub kv_url: String,
    pub kv_token: SecretString,
    pub csrf_secret: SecretString,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(kv_url: String, kv_token: SecretString, csrf_secret: SecretString) -> Self {
        Self {
            kv_url,
            kv_token,
            csrf_secret,
        }
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("kv_url", &self.kv_url)
            .field("kv_token", &"***")
            .field("csrf_secret", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new(
            "https://kv.example.com".to_string(),
            SecretString::from("kv-bearer".to_string()),
            SecretString::from("csrf-key".to_string()),
        );
        assert_eq!(args.kv_url, "https://kv.example.com");
        assert_eq!(args.kv_token.expose_secret(), "kv-bearer");

        // Secrets never end up in debug output.
        let debug = format!("{args:?}");
        assert!(!debug.contains("kv-bearer"));
        assert!(!debug.contains("csrf-key"));
    }
}
