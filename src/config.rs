use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub db_path: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("POS_PORT", "3000"),
            db_path: try_load("POS_DB_PATH", "comanda.db"),
        }
    }
}

/// Malformed values warn and fall back to the default; only a default
/// that itself fails to parse is a programmer error.
pub(crate) fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
        default
            .parse()
            .map_err(|e| {
                warn!("Invalid default for {key}: {e}");
            })
            .expect("Default misconfigured!")
    })
}
