use std::env;
use std::str::FromStr;
use std::time::Duration;

/// AppConfig
///
/// Holds the application's entire configuration state. Immutable once loaded and
/// pulled into handlers via FromRef as part of the Unified State Pattern.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls log format and reset-token disclosure.
    pub env: Env,
    // Postgres connection string. `None` selects the in-memory store (local only).
    pub db_url: Option<String>,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
    // Bearer token lifetime. `None` means tokens live until revoked.
    pub token_ttl: Option<Duration>,
    // Failed logins per email+origin before the key is locked.
    pub throttle_max_attempts: u32,
    // How long a locked key stays locked.
    pub throttle_lockout: Duration,
    // Take the client origin from `x-forwarded-for`. Only safe behind a proxy
    // that overwrites the header; otherwise the socket peer address is used.
    pub trust_forwarded_for: bool,
    // Lifetime of a password reset token.
    pub reset_token_ttl: Duration,
    // Roles attached to every newly registered user.
    pub default_roles: Vec<String>,
    // Seed default roles/permissions at startup.
    pub seed_defaults: bool,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

/// Env
///
/// Runtime context: `Local` for development (pretty logs, in-memory store allowed),
/// `Production` for hardened deployments (JSON logs, Postgres required).
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// default
    ///
    /// Non-panicking configuration for tests: in-memory store, revoke-only tokens,
    /// 5 attempts / 60 s throttle, one-hour reset tokens, `Reader` as default role.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            bind_addr: "127.0.0.1:0".to_string(),
            token_ttl: None,
            throttle_max_attempts: 5,
            throttle_lockout: Duration::from_secs(60),
            trust_forwarded_for: false,
            reset_token_ttl: Duration::from_secs(3600),
            default_roles: vec!["Reader".to_string()],
            seed_defaults: true,
            admin_email: None,
            admin_password: None,
        }
    }
}

/// Reads and parses `key`, falling back to `default` when unset or unparseable.
fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparseable config value");
            default
        }),
        Err(_) => default,
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from environment variables at startup.
    ///
    /// # Panics
    /// Panics in `Env::Production` when `DATABASE_URL` is missing: production never
    /// falls back to the in-memory store.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let db_url = match env {
            Env::Production => Some(
                non_empty("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod"),
            ),
            Env::Local => non_empty("DATABASE_URL"),
        };

        // 0 and absent both mean "no expiry".
        let token_ttl = match parsed_or::<u64>("TOKEN_TTL_SECS", 0) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let default_roles = env::var("DEFAULT_ROLES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|_| vec!["Reader".to_string()]);

        Self {
            env,
            db_url,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            token_ttl,
            throttle_max_attempts: parsed_or("LOGIN_MAX_ATTEMPTS", 5),
            throttle_lockout: Duration::from_secs(parsed_or("LOGIN_LOCKOUT_SECS", 60)),
            trust_forwarded_for: parsed_or("TRUST_FORWARDED_FOR", false),
            reset_token_ttl: Duration::from_secs(parsed_or("PASSWORD_RESET_TTL_SECS", 3600)),
            default_roles,
            seed_defaults: parsed_or("SEED_DEFAULTS", true),
            admin_email: non_empty("ADMIN_EMAIL"),
            admin_password: non_empty("ADMIN_PASSWORD"),
        }
    }
}
