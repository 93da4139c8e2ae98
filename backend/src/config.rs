//! Environment-driven configuration, read once at startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub rsa_key_path: PathBuf,
    pub rsa_key_bits: usize,
    pub elo_k_factor: f64,
    /// How often the timeout sweep walks started games. Zero disables the
    /// sweep and relies on client timeout reports.
    pub timer_check_interval: Duration,
    pub session_max_age_days: i64,
    pub hibp_enabled: bool,
    pub email_from: String,
}

impl Config {
    pub fn from_env() -> Config {
        Config {
            database_url: var_or("DATABASE_URL", "sqlite:kasupel.db"),
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:3000")
                .parse()
                .expect("BIND_ADDR must be a socket address"),
            rsa_key_path: PathBuf::from(var_or("RSA_KEY_PATH", "private_key.pem")),
            rsa_key_bits: var_or("RSA_KEY_BITS", "2048")
                .parse()
                .expect("RSA_KEY_BITS must be an integer"),
            elo_k_factor: var_or("ELO_K_FACTOR", "32")
                .parse()
                .expect("ELO_K_FACTOR must be a number"),
            timer_check_interval: Duration::from_secs(
                var_or("TIMER_CHECK_INTERVAL", "1")
                    .parse()
                    .expect("TIMER_CHECK_INTERVAL must be an integer"),
            ),
            session_max_age_days: var_or("SESSION_MAX_AGE_DAYS", "30")
                .parse()
                .expect("SESSION_MAX_AGE_DAYS must be an integer"),
            hibp_enabled: var_or("HIBP_ENABLED", "true") == "true",
            email_from: var_or("EMAIL_ADDRESS", "kasupel@localhost"),
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
