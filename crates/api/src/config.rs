//! Application configuration

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use axum::http::StatusCode;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Login routes
    pub login_path: String,
    pub sms_login_path: String,
    pub sms_code_path: String,
    pub username_parameter: String,
    pub password_parameter: String,
    pub mobile_parameter: String,
    pub sms_code_parameter: String,
    pub post_only: bool,

    // Outcome routes
    pub success_redirect: String,
    pub login_page: String,
    pub login_form_page: String,
    pub invalid_session_url: String,
    pub failure_status: StatusCode,

    // Sessions
    pub max_sessions: usize,
    pub prevent_login_when_full: bool,
    pub session_idle_timeout_secs: i64,
    pub session_cookie_name: String,
    pub session_cookie_secure: bool,

    // Verification codes
    pub sms_code_ttl_secs: i64,
    pub sms_code_length: usize,

    // Housekeeping
    pub sweep_interval_secs: u64,

    // Credentials
    pub credentials_file: Option<PathBuf>,

    // Logging
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            login_path: "/login".to_string(),
            sms_login_path: "/login/mobile".to_string(),
            sms_code_path: "/code/sms".to_string(),
            username_parameter: "username".to_string(),
            password_parameter: "password".to_string(),
            mobile_parameter: "mobile".to_string(),
            sms_code_parameter: "smsCode".to_string(),
            post_only: true,
            success_redirect: "/index".to_string(),
            login_page: "/authentication/require".to_string(),
            login_form_page: "/login.html".to_string(),
            invalid_session_url: "/session/invalid".to_string(),
            failure_status: StatusCode::UNAUTHORIZED,
            max_sessions: 1,
            prevent_login_when_full: false,
            session_idle_timeout_secs: 1800,
            session_cookie_name: "AUTHGATE_SESSION".to_string(),
            session_cookie_secure: false,
            sms_code_ttl_secs: 60,
            sms_code_length: 6,
            sweep_interval_secs: 60,
            credentials_file: None,
            log_format: LogFormat::Pretty,
        }
    }
}

fn string_var(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => Ok(value),
            Err(_) => Err(ConfigError::Invalid(key, raw)),
        },
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let failure_status = {
            let code: u16 = parse_var("FAILURE_STATUS", defaults.failure_status.as_u16())?;
            match StatusCode::from_u16(code) {
                Ok(status) if status.is_client_error() || status.is_server_error() => status,
                _ => return Err(ConfigError::Invalid("FAILURE_STATUS", code.to_string())),
            }
        };

        let max_sessions: usize = parse_var("MAX_SESSIONS", defaults.max_sessions)?;
        if max_sessions == 0 {
            return Err(ConfigError::OutOfRange("MAX_SESSIONS must be at least 1"));
        }

        let sms_code_length: usize = parse_var("SMS_CODE_LENGTH", defaults.sms_code_length)?;
        if !(4..=10).contains(&sms_code_length) {
            return Err(ConfigError::OutOfRange("SMS_CODE_LENGTH must be between 4 and 10"));
        }

        let sms_code_ttl_secs: i64 = parse_var("SMS_CODE_TTL_SECS", defaults.sms_code_ttl_secs)?;
        if sms_code_ttl_secs <= 0 {
            return Err(ConfigError::OutOfRange("SMS_CODE_TTL_SECS must be positive"));
        }

        let session_idle_timeout_secs: i64 =
            parse_var("SESSION_IDLE_TIMEOUT_SECS", defaults.session_idle_timeout_secs)?;
        if session_idle_timeout_secs <= 0 {
            return Err(ConfigError::OutOfRange("SESSION_IDLE_TIMEOUT_SECS must be positive"));
        }

        let sweep_interval_secs: u64 = parse_var("SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs)?;
        if sweep_interval_secs == 0 {
            return Err(ConfigError::OutOfRange("SWEEP_INTERVAL_SECS must be positive"));
        }

        let log_format = match env::var("LOG_FORMAT") {
            Ok(raw) if raw.eq_ignore_ascii_case("json") => LogFormat::Json,
            Ok(raw) if raw.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            Ok(raw) => return Err(ConfigError::Invalid("LOG_FORMAT", raw)),
            Err(_) => defaults.log_format,
        };

        Ok(Self {
            // Server
            bind_address: string_var("BIND_ADDRESS", defaults.bind_address),

            // Login routes
            login_path: string_var("LOGIN_PATH", defaults.login_path),
            sms_login_path: string_var("SMS_LOGIN_PATH", defaults.sms_login_path),
            sms_code_path: string_var("SMS_CODE_PATH", defaults.sms_code_path),
            username_parameter: string_var("USERNAME_PARAMETER", defaults.username_parameter),
            password_parameter: string_var("PASSWORD_PARAMETER", defaults.password_parameter),
            mobile_parameter: string_var("MOBILE_PARAMETER", defaults.mobile_parameter),
            sms_code_parameter: string_var("SMS_CODE_PARAMETER", defaults.sms_code_parameter),
            post_only: parse_var("POST_ONLY", defaults.post_only)?,

            // Outcome routes
            success_redirect: string_var("SUCCESS_REDIRECT", defaults.success_redirect),
            login_page: string_var("LOGIN_PAGE", defaults.login_page),
            login_form_page: string_var("LOGIN_FORM_PAGE", defaults.login_form_page),
            invalid_session_url: string_var("INVALID_SESSION_URL", defaults.invalid_session_url),
            failure_status,

            // Sessions
            max_sessions,
            prevent_login_when_full: parse_var(
                "PREVENT_LOGIN_WHEN_FULL",
                defaults.prevent_login_when_full,
            )?,
            session_idle_timeout_secs,
            session_cookie_name: string_var("SESSION_COOKIE_NAME", defaults.session_cookie_name),
            session_cookie_secure: parse_var(
                "SESSION_COOKIE_SECURE",
                defaults.session_cookie_secure,
            )?,

            // Verification codes
            sms_code_ttl_secs,
            sms_code_length,

            // Housekeeping
            sweep_interval_secs,

            // Credentials
            credentials_file: env::var("CREDENTIALS_FILE")
                .ok()
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),

            // Logging
            log_format,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1:?}")]
    Invalid(&'static str, String),
    #[error("Configuration value out of range: {0}")]
    OutOfRange(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure config tests run serially (they modify shared env vars)
    static CONFIG_TEST_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "FAILURE_STATUS",
        "MAX_SESSIONS",
        "PREVENT_LOGIN_WHEN_FULL",
        "SMS_CODE_LENGTH",
        "SMS_CODE_TTL_SECS",
        "LOG_FORMAT",
        "LOGIN_PATH",
        "POST_ONLY",
        "CREDENTIALS_FILE",
    ];

    /// Helper to clear env vars after tests
    fn cleanup_config() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();
        cleanup_config();

        let config = Config::from_env().unwrap();
        assert_eq!(config.login_path, "/login");
        assert_eq!(config.sms_code_parameter, "smsCode");
        assert_eq!(config.failure_status, StatusCode::UNAUTHORIZED);
        assert_eq!(config.max_sessions, 1);
        assert!(!config.prevent_login_when_full);
        assert!(config.post_only);
        assert!(config.credentials_file.is_none());
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_overrides() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();
        cleanup_config();

        env::set_var("FAILURE_STATUS", "500");
        env::set_var("MAX_SESSIONS", "3");
        env::set_var("PREVENT_LOGIN_WHEN_FULL", "true");
        env::set_var("LOG_FORMAT", "JSON");
        env::set_var("LOGIN_PATH", "/signin");
        env::set_var("POST_ONLY", "false");
        env::set_var("CREDENTIALS_FILE", "/etc/authgate/users.json");

        let config = Config::from_env().unwrap();
        assert_eq!(config.failure_status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(config.max_sessions, 3);
        assert!(config.prevent_login_when_full);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.login_path, "/signin");
        assert!(!config.post_only);
        assert_eq!(
            config.credentials_file,
            Some(PathBuf::from("/etc/authgate/users.json"))
        );

        cleanup_config();
    }

    /// Combined validation tests - runs serially to avoid env var race conditions
    #[test]
    fn test_validation() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();
        cleanup_config();

        // === Failure status must be an error class ===
        env::set_var("FAILURE_STATUS", "200");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("FAILURE_STATUS", _))
        ));
        env::set_var("FAILURE_STATUS", "teapot");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("FAILURE_STATUS", _))
        ));
        env::remove_var("FAILURE_STATUS");

        // === At least one session ===
        env::set_var("MAX_SESSIONS", "0");
        assert!(matches!(Config::from_env(), Err(ConfigError::OutOfRange(_))));
        env::remove_var("MAX_SESSIONS");

        // === Code length bounds ===
        env::set_var("SMS_CODE_LENGTH", "3");
        assert!(matches!(Config::from_env(), Err(ConfigError::OutOfRange(_))));
        env::set_var("SMS_CODE_LENGTH", "10");
        assert!(Config::from_env().is_ok());
        env::remove_var("SMS_CODE_LENGTH");

        // === Booleans and formats ===
        env::set_var("PREVENT_LOGIN_WHEN_FULL", "maybe");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("PREVENT_LOGIN_WHEN_FULL", _))
        ));
        env::remove_var("PREVENT_LOGIN_WHEN_FULL");

        env::set_var("LOG_FORMAT", "xml");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("LOG_FORMAT", _))
        ));

        cleanup_config();
    }
}
