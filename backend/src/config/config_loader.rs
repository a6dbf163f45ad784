use std::{fmt::Display, str::FromStr};

use anyhow::{Context, Result, anyhow};

use super::config_model::{BackendServer, Cors, Database, DotEnvyConfig, Listing, RequestLogging};

pub const MAX_LOGGED_BODY_BYTES: usize = 1024;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    from_lookup(|key| std::env::var(key).ok())
}

pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<DotEnvyConfig> {
    let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    let backend_server = BackendServer {
        port: parse_or(&var, "SERVER_PORT", 8080)?,
        body_limit: parse_or(&var, "SERVER_BODY_LIMIT", 1)?,
        timeout: parse_or(&var, "SERVER_TIMEOUT", 10)?,
    };

    let url = match var("DATABASE_URL") {
        Some(url) => url,
        None => database_url_from_parts(&var)?,
    };

    let database = Database {
        url,
        max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10)?,
        connect_timeout: parse_or(&var, "DATABASE_CONNECT_TIMEOUT", 10)?,
    };

    let default_limit: i64 = parse_or(&var, "LIST_DEFAULT_LIMIT", 10)?;
    if default_limit < 0 {
        return Err(anyhow!("LIST_DEFAULT_LIMIT must not be negative"));
    }

    let request_logging = RequestLogging {
        log_body: match var("LOG_REQUEST_BODY") {
            Some(raw) => parse_bool(&raw).context("LOG_REQUEST_BODY is invalid")?,
            None => false,
        },
        max_body_bytes: MAX_LOGGED_BODY_BYTES,
    };

    let cors = Cors {
        allowed_origins: var("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty() && *origin != "*")
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    };

    Ok(DotEnvyConfig {
        backend_server,
        database,
        listing: Listing { default_limit },
        request_logging,
        cors,
    })
}

fn database_url_from_parts(var: &impl Fn(&str) -> Option<String>) -> Result<String> {
    let host = var("DB_HOST").unwrap_or_else(|| "localhost".to_string());
    let port: u16 = parse_or(var, "DB_PORT", 5432)?;
    let user = var("DB_USER").context("DATABASE_URL or DB_USER must be set")?;
    let password = var("DB_PASSWORD").unwrap_or_default();
    let name = var("DB_NAME").context("DATABASE_URL or DB_NAME must be set")?;
    let ssl_mode = var("DB_SSL_MODE").unwrap_or_else(|| "disable".to_string());

    let credentials = if password.is_empty() {
        user
    } else {
        format!("{user}:{password}")
    };

    Ok(format!(
        "postgres://{credentials}@{host}:{port}/{name}?sslmode={ssl_mode}"
    ))
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| anyhow!("{key} is invalid: {err}")),
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(anyhow!("expected a boolean, got {other:?}")),
    }
}
