use log::warn;
use rand::RngCore;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub database_min_connections: u32,
    pub redis_url: Option<String>,
    pub feed_cache_ttl_secs: u64,
    pub secret_key: String,
    pub workers: usize,
}

impl AppConfig {
    /// Reads settings from the environment (after `.env` has been loaded).
    pub fn from_env() -> Self {
        let secret_key = match non_empty_var("SECRET_KEY") {
            Some(key) => key,
            None => {
                warn!("SECRET_KEY not set, generating a per-process key; issued tokens will not survive a restart");
                random_secret()
            }
        };

        Self {
            port: parse_var("PORT", 8080),
            database_url: non_empty_var("DATABASE_URL"),
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 50),
            database_min_connections: parse_var("DATABASE_MIN_CONNECTIONS", 5),
            redis_url: non_empty_var("REDIS_URL"),
            feed_cache_ttl_secs: parse_var("FEED_CACHE_TTL_SECS", 300),
            secret_key,
            workers: parse_var("WORKERS", num_cpus::get().max(4)),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("Invalid value for {}: {:?}, using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

pub fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_falls_back_on_garbage() {
        env::set_var("POST_SERVICE_TEST_PORT", "not-a-port");
        assert_eq!(parse_var::<u16>("POST_SERVICE_TEST_PORT", 8080), 8080);
        env::set_var("POST_SERVICE_TEST_PORT", " 9090 ");
        assert_eq!(parse_var::<u16>("POST_SERVICE_TEST_PORT", 8080), 9090);
        env::remove_var("POST_SERVICE_TEST_PORT");
        assert_eq!(parse_var::<u16>("POST_SERVICE_TEST_PORT", 8080), 8080);
    }

    #[test]
    fn blank_vars_count_as_unset() {
        env::set_var("POST_SERVICE_TEST_URL", "  ");
        assert_eq!(non_empty_var("POST_SERVICE_TEST_URL"), None);
        env::remove_var("POST_SERVICE_TEST_URL");
    }

    #[test]
    fn random_secrets_are_hex_and_distinct() {
        let a = random_secret();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, random_secret());
    }
}
