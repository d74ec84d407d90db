use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::{
    deletion::DeletionPolicy,
    errors::Error,
    fault::{
        handler::ErrorPolicy,
        tracker::{DEFAULT_ERROR_THRESHOLD, DEFAULT_ERROR_WINDOW},
    },
    Result,
};

/// Typed configuration, read from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,

    // Disappearing messages
    pub message_ttl: Duration,
    pub command_delete_delay: Duration,
    pub notice_ttl: Duration,
    pub poll_command_delete_delay: Duration,

    // Deletion retries
    pub delete_max_retries: u32,
    pub delete_retry_delay: Duration,

    // Error rate tracking
    pub error_window: Duration,
    pub error_threshold: usize,
    pub error_sweep_interval: Duration,

    pub catalog_path: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let telegram_bot_token = var("TOKEN")
            .or_else(|| var("TELEGRAM_BOT_TOKEN"))
            .unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TOKEN (or TELEGRAM_BOT_TOKEN) environment variable is required".to_string(),
            ));
        }

        let millis = |key: &str, default: u64| -> Result<Duration> {
            Ok(Duration::from_millis(parse_or(&var, key, default)?))
        };

        let deletion = DeletionPolicy::default();
        let message_ttl = millis("DISAPPEARING_MESSAGE_MS", ms(deletion.delay))?;
        let command_delete_delay = millis("COMMAND_DELETE_DELAY_MS", 500)?;
        let notice_ttl = millis("NOTICE_DELETE_DELAY_MS", 5_000)?;
        let poll_command_delete_delay = millis("POLL_COMMAND_DELETE_DELAY_MS", 1_000)?;

        let delete_max_retries = parse_or(&var, "DELETE_MAX_RETRIES", deletion.max_retries)?;
        let delete_retry_delay = millis("DELETE_RETRY_DELAY_MS", ms(deletion.retry_delay))?;

        let error_window = millis("ERROR_WINDOW_MS", ms(DEFAULT_ERROR_WINDOW))?;
        if error_window.is_zero() {
            return Err(Error::Config("ERROR_WINDOW_MS must be > 0".to_string()));
        }
        let error_threshold = parse_or(&var, "ERROR_THRESHOLD", DEFAULT_ERROR_THRESHOLD)?;
        if error_threshold == 0 {
            return Err(Error::Config("ERROR_THRESHOLD must be > 0".to_string()));
        }
        let error_sweep_interval = millis("ERROR_SWEEP_INTERVAL_MS", ms(error_window))?;

        let catalog_path = var("CATALOG_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            telegram_bot_token,
            message_ttl,
            command_delete_delay,
            notice_ttl,
            poll_command_delete_delay,
            delete_max_retries,
            delete_retry_delay,
            error_window,
            error_threshold,
            error_sweep_interval,
            catalog_path,
        })
    }

    pub fn deletion_policy(&self) -> DeletionPolicy {
        DeletionPolicy {
            delay: self.message_ttl,
            max_retries: self.delete_max_retries,
            retry_delay: self.delete_retry_delay,
            command_delay: self.command_delete_delay,
        }
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy {
            threshold: self.error_threshold,
            window: self.error_window,
        }
    }
}

fn ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn parse_or<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    let Some(raw) = var(key).filter(|s| !s.trim().is_empty()) else {
        return Ok(default);
    };
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw}")))
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}
