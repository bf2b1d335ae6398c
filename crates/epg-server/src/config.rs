use std::net::SocketAddr;
use std::path::PathBuf;

use chrono_tz::Tz;

use crate::error::AppError;
use crate::schedule::RefreshSchedule;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8090";
const DEFAULT_URL: &str = "http://epg.51zmt.top:8000/e.xml.gz";
const DEFAULT_DOWNLOAD_DIR: &str = "./epg_download";
const DEFAULT_CACHE_FILE: &str = "./epg_cache.json";
const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";
const DEFAULT_CRON_SCHEDULE: &str = "0 0 * * *";

/// Service configuration loaded from environment variables.
///
/// Transport tuning (timeouts, retries) is read separately by
/// [`epg_common::fetch::FeedClientConfig::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address.
    pub listen_addr: SocketAddr,
    /// Remote feed URL, gzip-compressed guide document.
    pub url: String,
    /// Scratch directory for the download and the working document.
    pub download_dir: PathBuf,
    /// Snapshot path.
    pub cache_file: PathBuf,
    /// Zone used to interpret feed timestamps and schedule refreshes.
    pub timezone: Tz,
    /// When to refresh, evaluated in `timezone`.
    pub refresh_schedule: RefreshSchedule,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `EPG_LISTEN_ADDR` (default: 0.0.0.0:8090)
    /// - `EPG_URL` (default: http://epg.51zmt.top:8000/e.xml.gz)
    /// - `EPG_DOWNLOAD_DIR` (default: ./epg_download)
    /// - `EPG_CACHE_FILE` (default: ./epg_cache.json)
    /// - `EPG_TIMEZONE` (default: Asia/Shanghai)
    /// - `EPG_CRON_SCHEDULE` (default: 0 0 * * *)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let var = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let listen_addr = var("EPG_LISTEN_ADDR", DEFAULT_LISTEN_ADDR);
        let listen_addr = listen_addr.parse::<SocketAddr>().map_err(|e| {
            AppError::Config(format!("EPG_LISTEN_ADDR {listen_addr:?} is not a socket address: {e}"))
        })?;

        let url = var("EPG_URL", DEFAULT_URL);
        let parsed = reqwest::Url::parse(&url)
            .map_err(|e| AppError::Config(format!("EPG_URL {url:?} is not a valid URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "EPG_URL {url:?} must use http or https"
            )));
        }

        let timezone = var("EPG_TIMEZONE", DEFAULT_TIMEZONE);
        let timezone = timezone.parse::<Tz>().map_err(|e| {
            AppError::Config(format!("EPG_TIMEZONE {timezone:?} is not a known zone: {e}"))
        })?;

        let cron = var("EPG_CRON_SCHEDULE", DEFAULT_CRON_SCHEDULE);
        let refresh_schedule = RefreshSchedule::parse(&cron).map_err(|e| {
            AppError::Config(format!("EPG_CRON_SCHEDULE {cron:?} is not a cron expression: {e}"))
        })?;

        Ok(Self {
            listen_addr,
            url,
            download_dir: PathBuf::from(var("EPG_DOWNLOAD_DIR", DEFAULT_DOWNLOAD_DIR)),
            cache_file: PathBuf::from(var("EPG_CACHE_FILE", DEFAULT_CACHE_FILE)),
            timezone,
            refresh_schedule,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.listen_addr.port(), 8090);
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.download_dir, PathBuf::from("./epg_download"));
        assert_eq!(config.cache_file, PathBuf::from("./epg_cache.json"));
        assert_eq!(config.timezone, chrono_tz::Asia::Shanghai);
        assert_eq!(config.refresh_schedule.to_string(), "0 0 * * *");
    }

    #[test]
    fn overrides_are_honoured() {
        let config = load(&[
            ("EPG_LISTEN_ADDR", "127.0.0.1:9000"),
            ("EPG_URL", "https://example.com/guide.xml.gz"),
            ("EPG_TIMEZONE", "Europe/London"),
            ("EPG_CRON_SCHEDULE", "0 */6 * * *"),
            ("EPG_CACHE_FILE", "/var/lib/epg/cache.json"),
        ])
        .unwrap();
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.url, "https://example.com/guide.xml.gz");
        assert_eq!(config.timezone, chrono_tz::Europe::London);
        assert_eq!(config.refresh_schedule.to_string(), "0 */6 * * *");
        assert_eq!(config.cache_file, PathBuf::from("/var/lib/epg/cache.json"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = load(&[("EPG_TIMEZONE", "  ")]).unwrap();
        assert_eq!(config.timezone, chrono_tz::Asia::Shanghai);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for vars in [
            [("EPG_TIMEZONE", "Mars/Olympus")],
            [("EPG_CRON_SCHEDULE", "0 25 * * *")],
            [("EPG_CRON_SCHEDULE", "nightly")],
            [("EPG_URL", "ftp://example.com/e.xml.gz")],
            [("EPG_URL", "not a url")],
            [("EPG_LISTEN_ADDR", "localhost")],
        ] {
            let err = load(&vars).unwrap_err();
            assert!(matches!(err, AppError::Config(_)), "{vars:?}: {err}");
        }
    }
}
