use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{key}: invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AuthSubrequest {
    pub url: String,
    pub method: String,
    pub endpoint: String,
}

/// Runtime configuration, read once at startup from the environment.
/// A bad value here is exit code 1.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub file_storage_dir: PathBuf,
    /// Back-plane URI for cross-process fan-out. Recognised but the
    /// in-process bus is the only backend shipped.
    pub event_bus_queue: Option<String>,
    /// `None` means any origin is allowed.
    pub cors_allowed_origins: Option<Vec<String>>,
    pub identity_header: String,
    pub auth_subrequest: Option<AuthSubrequest>,
    pub jwt_public_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub jwt_algorithm: String,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    pub debug_level: u8,
    pub bind_addr: SocketAddr,
    /// Deadline for one inbound event handler; also the socket write budget.
    pub write_timeout: Duration,
    /// `None` disables the assignment watchdog.
    pub watchdog_interval: Option<Duration>,
    /// When set, file downloads answer with an X-Accel-Redirect header
    /// instead of streaming the bytes.
    pub accel_redirect: bool,
}

fn env_opt(key: &'static str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(key: &'static str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn parse_u64(key: &'static str, raw: String) -> Result<u64, ConfigError> {
    raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
        key,
        value: raw,
        reason: e.to_string(),
    })
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Comma-separated origin list; `*` or empty means any.
fn parse_origins(raw: Option<String>) -> Option<Vec<String>> {
    let raw = raw?;
    if raw.trim() == "*" {
        return None;
    }
    let list: Vec<String> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    if list.is_empty() { None } else { Some(list) }
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let database_url = env_opt("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let debug_level_raw = env_or("PLATEN_DEBUG_LEVEL", "0");
        let debug_level = parse_u64("PLATEN_DEBUG_LEVEL", debug_level_raw.clone())? as u8;
        if debug_level > 2 {
            return Err(ConfigError::Invalid {
                key: "PLATEN_DEBUG_LEVEL",
                value: debug_level_raw,
                reason: "must be 0, 1 or 2".to_string(),
            });
        }

        let bind_raw = env_or("PLATEN_BIND_ADDR", "0.0.0.0:8080");
        let bind_addr: SocketAddr = bind_raw.parse().map_err(|e| ConfigError::Invalid {
            key: "PLATEN_BIND_ADDR",
            value: bind_raw,
            reason: format!("{e}"),
        })?;

        let auth_subrequest = env_opt("PLATEN_AUTH_SUBREQUEST_URL").map(|url| AuthSubrequest {
            url,
            method: env_or("PLATEN_AUTH_SUBREQUEST_METHOD", "POST"),
            endpoint: env_or("PLATEN_AUTH_SUBREQUEST_ENDPOINT", "/validate"),
        });

        let write_timeout = Duration::from_secs(
            parse_u64(
                "PLATEN_WRITE_TIMEOUT_SECS",
                env_or("PLATEN_WRITE_TIMEOUT_SECS", "30"),
            )?
            .clamp(1, 600),
        );

        // 0 disables the watchdog; anything else is clamped up to the
        // 60 second floor so it cannot starve the event-driven path.
        let watchdog_secs = parse_u64(
            "PLATEN_WATCHDOG_SECS",
            env_or("PLATEN_WATCHDOG_SECS", "0"),
        )?;
        let watchdog_interval = if watchdog_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(watchdog_secs.max(60)))
        };

        Ok(Config {
            database_url,
            file_storage_dir: PathBuf::from(env_or("PLATEN_FILE_STORAGE_DIR", "./data/gcode")),
            event_bus_queue: env_opt("PLATEN_EVENT_BUS_QUEUE"),
            cors_allowed_origins: parse_origins(env_opt("PLATEN_CORS_ALLOWED_ORIGINS")),
            identity_header: env_or("PLATEN_IDENTITY_HEADER", "X-Identity"),
            auth_subrequest,
            jwt_public_key: env_opt("PLATEN_JWT_PUBLIC_KEY"),
            jwt_secret: env_opt("PLATEN_JWT_SECRET"),
            jwt_algorithm: env_or("PLATEN_JWT_ALGORITHM", "HS256"),
            access_token_lifetime: Duration::from_secs(parse_u64(
                "PLATEN_ACCESS_TOKEN_LIFETIME",
                env_or("PLATEN_ACCESS_TOKEN_LIFETIME", "900"),
            )?),
            refresh_token_lifetime: Duration::from_secs(parse_u64(
                "PLATEN_REFRESH_TOKEN_LIFETIME",
                env_or("PLATEN_REFRESH_TOKEN_LIFETIME", "2592000"),
            )?),
            debug_level,
            bind_addr,
            write_timeout,
            watchdog_interval,
            accel_redirect: env_opt("PLATEN_ACCEL_REDIRECT")
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
        })
    }

    /// Default tracing filter when `RUST_LOG` is not set.
    pub fn env_filter_directive(&self) -> &'static str {
        match self.debug_level {
            0 => "info",
            1 => "info,platen_server::ws=debug,platen_server::routes=debug,platen_server::bus=debug",
            _ => "debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_star_means_any() {
        assert_eq!(parse_origins(Some("*".to_string())), None);
        assert_eq!(parse_origins(None), None);
    }

    #[test]
    fn origins_list_is_trimmed() {
        let got = parse_origins(Some(" https://a.example , https://b.example ".to_string()));
        assert_eq!(
            got,
            Some(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ])
        );
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        for v in ["1", "true", "YES", "on"] {
            assert!(parse_bool(v));
        }
        for v in ["0", "false", "off", ""] {
            assert!(!parse_bool(v));
        }
    }

    #[test]
    fn debug_levels_map_to_filters() {
        let mut cfg = Config {
            database_url: "sqlite::memory:".to_string(),
            file_storage_dir: PathBuf::from("/tmp"),
            event_bus_queue: None,
            cors_allowed_origins: None,
            identity_header: "X-Identity".to_string(),
            auth_subrequest: None,
            jwt_public_key: None,
            jwt_secret: None,
            jwt_algorithm: "HS256".to_string(),
            access_token_lifetime: Duration::from_secs(900),
            refresh_token_lifetime: Duration::from_secs(2_592_000),
            debug_level: 0,
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
            write_timeout: Duration::from_secs(30),
            watchdog_interval: None,
            accel_redirect: false,
        };
        assert_eq!(cfg.env_filter_directive(), "info");
        cfg.debug_level = 2;
        assert_eq!(cfg.env_filter_directive(), "debug");
    }
}
