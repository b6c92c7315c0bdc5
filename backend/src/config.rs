use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DATABASE_URL: &str = "sqlite:palpites.db";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub database_url: String,
    /// Directory with the site's static pages, served for non-API paths
    pub static_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: try_load("PORT", DEFAULT_PORT),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| {
                info!("DATABASE_URL not set, using default: {DEFAULT_DATABASE_URL}");
                DEFAULT_DATABASE_URL.to_string()
            }),
            static_dir: env::var("STATIC_DIR").ok().map(PathBuf::from),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            static_dir: None,
        }
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}
