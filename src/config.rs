//! Gateway configuration loaded from environment variables.
//!
//! `Config::from_env` honours a `.env` file in the working directory and then
//! reads every option through `Config::from_lookup`, which takes the variable
//! source as a closure so tests can supply values without touching the process
//! environment.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
const DEFAULT_GRAPHQL_PATH: &str = "/graphql";
const DEFAULT_TYPEDEFS_DIR: &str = "typeDefs";
const DEFAULT_CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com";
const DEFAULT_DB_CONNECT_TIMEOUT_MS: u64 = 30_000;
/// 5 MiB JSON body limit.
const DEFAULT_BODY_LIMIT_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("invalid {key} value '{value}': {reason}")]
    Invalid { key: &'static str, value: String, reason: String },
    #[error("media endpoints are enabled but {0} is not set")]
    MediaCredentials(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_base: String,
    pub signature_algorithm: SignatureAlgorithm,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    /// HS256 shared secret.
    pub jwt_secret: Option<String>,
    /// RS256 public key in PEM form.
    pub jwt_public_key_path: Option<PathBuf>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl AuthConfig {
    pub fn has_key(&self) -> bool {
        self.jwt_secret.is_some() || self.jwt_public_key_path.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub database_url: String,
    pub db_connect_timeout_ms: u64,
    /// Keep serving when the startup database connection fails.
    pub fail_open_on_db_error: bool,
    pub enable_media_endpoints: bool,
    /// Hand the request context to resolvers.
    pub enable_request_context: bool,
    pub graphql_path: String,
    pub type_defs_dir: PathBuf,
    pub body_limit_bytes: usize,
    pub cloudinary: Option<CloudinaryConfig>,
    pub auth: AuthConfig,
    pub log_level: String,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from a fixed set of variables.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE").ok_or(ConfigError::Missing("DATABASE"))?;
        let port_raw = get("PORT").ok_or(ConfigError::Missing("PORT"))?;
        let port = parse_port(&port_raw)?;

        let enable_media_endpoints = parse_bool("ENABLE_MEDIA_ENDPOINTS", get("ENABLE_MEDIA_ENDPOINTS"), true)?;
        let cloudinary = cloudinary_from(&get)?;
        if enable_media_endpoints && cloudinary.is_none() {
            // report the first missing credential
            for key in ["CLOUDINARY_CLOUD_NAME", "CLOUDINARY_API_KEY", "CLOUDINARY_API_SECRET"] {
                if get(key).is_none() {
                    return Err(ConfigError::MediaCredentials(key));
                }
            }
        }

        let graphql_path = get("GRAPHQL_PATH").unwrap_or_else(|| DEFAULT_GRAPHQL_PATH.to_string());
        if !graphql_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                key: "GRAPHQL_PATH",
                value: graphql_path,
                reason: "must start with '/'".into(),
            });
        }

        Ok(Self {
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            port,
            database_url,
            db_connect_timeout_ms: parse_positive("DB_CONNECT_TIMEOUT_MS", get("DB_CONNECT_TIMEOUT_MS"), DEFAULT_DB_CONNECT_TIMEOUT_MS)?,
            fail_open_on_db_error: parse_bool("FAIL_OPEN_ON_DB_ERROR", get("FAIL_OPEN_ON_DB_ERROR"), true)?,
            enable_media_endpoints,
            enable_request_context: parse_bool("ENABLE_REQUEST_CONTEXT", get("ENABLE_REQUEST_CONTEXT"), true)?,
            graphql_path,
            type_defs_dir: PathBuf::from(get("TYPEDEFS_DIR").unwrap_or_else(|| DEFAULT_TYPEDEFS_DIR.to_string())),
            body_limit_bytes: parse_positive("BODY_LIMIT_BYTES", get("BODY_LIMIT_BYTES"), DEFAULT_BODY_LIMIT_BYTES as u64)? as usize,
            cloudinary,
            auth: AuthConfig {
                jwt_secret: get("AUTH_JWT_SECRET"),
                jwt_public_key_path: get("AUTH_JWT_PUBLIC_KEY_PATH").map(PathBuf::from),
                issuer: get("AUTH_JWT_ISSUER"),
                audience: get("AUTH_JWT_AUDIENCE"),
            },
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Listen address as `host:port`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn cloudinary_from<G>(get: &G) -> Result<Option<CloudinaryConfig>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let (Some(cloud_name), Some(api_key), Some(api_secret)) = (
        get("CLOUDINARY_CLOUD_NAME"),
        get("CLOUDINARY_API_KEY"),
        get("CLOUDINARY_API_SECRET"),
    ) else {
        return Ok(None);
    };
    let signature_algorithm = match get("CLOUDINARY_SIGNATURE_ALGORITHM").as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("sha1") => SignatureAlgorithm::Sha1,
        Some("sha256") => SignatureAlgorithm::Sha256,
        Some(other) => {
            return Err(ConfigError::Invalid {
                key: "CLOUDINARY_SIGNATURE_ALGORITHM",
                value: other.to_string(),
                reason: "expected sha1 or sha256".into(),
            })
        }
    };
    let api_base = get("CLOUDINARY_API_BASE")
        .unwrap_or_else(|| DEFAULT_CLOUDINARY_API_BASE.to_string())
        .trim_end_matches('/')
        .to_string();
    Ok(Some(CloudinaryConfig { cloud_name, api_key, api_secret, api_base, signature_algorithm }))
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    let port = raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
        key: "PORT",
        value: raw.to_string(),
        reason: e.to_string(),
    })?;
    if port == 0 {
        return Err(ConfigError::Invalid { key: "PORT", value: raw.to_string(), reason: "must be between 1 and 65535".into() });
    }
    Ok(port)
}

fn parse_bool(key: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else { return Ok(default) };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value: raw, reason: "expected a boolean".into() }),
    }
}

fn parse_positive(key: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = raw else { return Ok(default) };
    let parsed = raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
        key,
        value: raw.clone(),
        reason: e.to_string(),
    })?;
    if parsed == 0 {
        return Err(ConfigError::Invalid { key, value: raw, reason: "must be greater than 0".into() });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DATABASE", "mongodb://localhost:27017/app"),
            ("PORT", "8000"),
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_API_KEY", "key"),
            ("CLOUDINARY_API_SECRET", "secret"),
        ]
    }

    #[test]
    fn loads_defaults() {
        let cfg = Config::from_map(&vars(&base())).unwrap();
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.bind_address, "0.0.0.0");
        assert_eq!(cfg.graphql_path, "/graphql");
        assert!(cfg.fail_open_on_db_error);
        assert!(cfg.enable_media_endpoints);
        assert!(cfg.enable_request_context);
        assert_eq!(cfg.body_limit_bytes, 5 * 1024 * 1024);
        let cl = cfg.cloudinary.unwrap();
        assert_eq!(cl.api_base, "https://api.cloudinary.com");
        assert_eq!(cl.signature_algorithm, SignatureAlgorithm::Sha1);
        assert!(!cfg.auth.has_key());
    }

    #[test]
    fn database_and_port_are_required() {
        let mut v = base();
        v.retain(|(k, _)| *k != "DATABASE");
        assert_eq!(Config::from_map(&vars(&v)), Err(ConfigError::Missing("DATABASE")));

        let mut v = base();
        v.retain(|(k, _)| *k != "PORT");
        assert_eq!(Config::from_map(&vars(&v)), Err(ConfigError::Missing("PORT")));
    }

    #[test]
    fn rejects_bad_port() {
        let mut m = vars(&base());
        m.insert("PORT".into(), "not-a-port".into());
        assert!(matches!(Config::from_map(&m), Err(ConfigError::Invalid { key: "PORT", .. })));
        m.insert("PORT".into(), "0".into());
        assert!(matches!(Config::from_map(&m), Err(ConfigError::Invalid { key: "PORT", .. })));
    }

    #[test]
    fn media_credentials_required_only_when_enabled() {
        let mut v = base();
        v.retain(|(k, _)| *k != "CLOUDINARY_API_SECRET");
        assert_eq!(
            Config::from_map(&vars(&v)),
            Err(ConfigError::MediaCredentials("CLOUDINARY_API_SECRET"))
        );

        v.push(("ENABLE_MEDIA_ENDPOINTS", "false"));
        let cfg = Config::from_map(&vars(&v)).unwrap();
        assert!(!cfg.enable_media_endpoints);
        assert!(cfg.cloudinary.is_none());
    }

    #[test]
    fn parses_flags_and_signature_algorithm() {
        let mut v = base();
        v.push(("FAIL_OPEN_ON_DB_ERROR", "no"));
        v.push(("ENABLE_REQUEST_CONTEXT", "0"));
        v.push(("CLOUDINARY_SIGNATURE_ALGORITHM", "SHA256"));
        v.push(("CLOUDINARY_API_BASE", "http://127.0.0.1:9999/"));
        let cfg = Config::from_map(&vars(&v)).unwrap();
        assert!(!cfg.fail_open_on_db_error);
        assert!(!cfg.enable_request_context);
        let cl = cfg.cloudinary.unwrap();
        assert_eq!(cl.signature_algorithm, SignatureAlgorithm::Sha256);
        assert_eq!(cl.api_base, "http://127.0.0.1:9999");

        let mut m = vars(&base());
        m.insert("FAIL_OPEN_ON_DB_ERROR".into(), "maybe".into());
        assert!(matches!(Config::from_map(&m), Err(ConfigError::Invalid { key: "FAIL_OPEN_ON_DB_ERROR", .. })));
    }

    #[test]
    fn graphql_path_must_be_absolute() {
        let mut m = vars(&base());
        m.insert("GRAPHQL_PATH".into(), "graphql".into());
        assert!(matches!(Config::from_map(&m), Err(ConfigError::Invalid { key: "GRAPHQL_PATH", .. })));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let mut m = vars(&base());
        m.insert("AUTH_JWT_SECRET".into(), "   ".into());
        let cfg = Config::from_map(&m).unwrap();
        assert_eq!(cfg.auth.jwt_secret, None);
    }
}
