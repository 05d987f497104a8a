/*
 * Responsibility
 * - 環境変数や設定の読み込み (DATABASE_URL, password hash cost, RBAC policy files など)
 * - 設定値のバリデーション (不足なら起動失敗)
 * - 読み込み元は lookup 関数で差し替え可能 (tests では process env を触らない)
 */
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::services::auth::password::HashParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw
            .unwrap_or("development")
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Bootstrap administrator created at startup when absent.
#[derive(Clone)]
pub struct AdminSeed {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSeed")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub app_env: AppEnv,

    pub session_name: String,
    pub request_timeout: Duration,
    pub request_body_limit_bytes: usize,

    pub hash: HashParams,
    pub teacher_password_length: usize,

    pub rbac_model_path: PathBuf,
    pub rbac_policy_path: PathBuf,

    pub admin_seed: Option<AdminSeed>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = optional(&lookup, "PORT", 3000)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let app_env = AppEnv::parse(lookup("APP_ENV").as_deref());

        let session_name =
            lookup("SESSION_NAME").unwrap_or_else(|| "_elternabend_session".to_string());

        let request_timeout =
            Duration::from_secs(optional(&lookup, "REQUEST_TIMEOUT_SECONDS", 30u64)?);
        let request_body_limit_bytes: usize =
            optional(&lookup, "REQUEST_BODY_LIMIT_BYTES", 1024 * 1024)?;

        // Cost parameters have no defaults: a missing value must stop the process.
        let hash = HashParams {
            memory_kib: required(&lookup, "PASSWORD_HASH_MEMORY")?,
            iterations: required(&lookup, "PASSWORD_HASH_ITERATIONS")?,
            parallelism: required(&lookup, "PASSWORD_HASH_THREADS")?,
            salt_len: required(&lookup, "PASSWORD_HASH_SALT_LEN")?,
            key_len: required(&lookup, "PASSWORD_HASH_KEY_LEN")?,
        };
        hash.validate()
            .map_err(|_| ConfigError::Invalid("PASSWORD_HASH_*"))?;

        let teacher_password_length: usize = optional(&lookup, "TEACHER_PASSWORD_LENGTH", 6)?;
        if teacher_password_length == 0 {
            return Err(ConfigError::Invalid("TEACHER_PASSWORD_LENGTH"));
        }

        let rbac_model_path = lookup("RBAC_AUTH_MODEL_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("RBAC_AUTH_MODEL_PATH"))?;
        let rbac_policy_path = lookup("RBAC_POLICY_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("RBAC_POLICY_PATH"))?;

        let admin_seed = match (lookup("ADMIN_USERNAME"), lookup("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminSeed { username, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("ADMIN_USERNAME")),
        };

        Ok(Self {
            addr,
            database_url,
            app_env,
            session_name,
            request_timeout,
            request_body_limit_bytes,
            hash,
            teacher_password_length,
            rbac_model_path,
            rbac_policy_path,
            admin_seed,
        })
    }
}

fn required<T, F>(lookup: &F, key: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .ok_or(ConfigError::Missing(key))?
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(key))
}

fn optional<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}
