use anyhow::{bail, Context, Result};
use ed25519_dalek::SigningKey;
use rand_core::OsRng;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub users: Vec<(String, String)>,
    pub require_auth: bool,
    pub signing_key: SigningKey,
    /// False when the key was generated for this run only
    pub signing_key_from_env: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr =
            std::env::var("LEDGERD_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3322".to_string());

        let users = parse_users(
            &std::env::var("LEDGERD_USERS").unwrap_or_else(|_| "immudb:immudb".to_string()),
        )?;

        let require_auth = std::env::var("LEDGERD_REQUIRE_AUTH")
            .ok()
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
            .unwrap_or(true);

        let (signing_key, signing_key_from_env) = match std::env::var("LEDGERD_SIGNING_KEY") {
            Ok(seed) => (parse_signing_key(&seed)?, true),
            Err(_) => (SigningKey::generate(&mut OsRng), false),
        };

        if require_auth && users.is_empty() {
            bail!("LEDGERD_USERS must name at least one user when auth is required");
        }

        Ok(Self {
            bind_addr,
            users,
            require_auth,
            signing_key,
            signing_key_from_env,
        })
    }
}

/// `user:pass,user2:pass2`
fn parse_users(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (user, password) = entry
                .split_once(':')
                .with_context(|| format!("LEDGERD_USERS entry {entry:?} is not user:password"))?;
            if user.is_empty() {
                bail!("LEDGERD_USERS entry {entry:?} has an empty user name");
            }
            Ok((user.to_string(), password.to_string()))
        })
        .collect()
}

fn parse_signing_key(seed: &str) -> Result<SigningKey> {
    let bytes = hex::decode(seed.trim()).context("LEDGERD_SIGNING_KEY must be hex")?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("LEDGERD_SIGNING_KEY must be 32 bytes"))?;
    Ok(SigningKey::from_bytes(&seed))
}
