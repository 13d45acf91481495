use crate::{fetch::RetryPolicy, Error};
use std::time::Duration;

/// Which resources hydrate the session.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SessionSource {
    /// `GET /session`, one combined document
    #[default]
    Session,
    /// `GET /me` followed by `GET /dashboard`
    Dashboard,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub base_url: String,
    pub session_source: SessionSource,
    pub poll_interval: Duration,
    /// How long the "track changed" flag stays raised
    pub track_changed_hold: Duration,
    /// How long the refreshing indicator outlives a tick
    pub refreshing_hold: Duration,
    pub retry: RetryPolicy,
}

impl Config {
    pub const POLL_INTERVAL: Duration = Duration::from_secs(20);
    pub const TRACK_CHANGED_HOLD: Duration = Duration::from_millis(500);
    pub const REFRESHING_HOLD: Duration = Duration::from_millis(600);

    pub fn new(base_url: impl Into<String>) -> Result<Config, Error> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(Error::Config("missing API base URL".to_owned()));
        }
        Ok(Config {
            base_url,
            session_source: SessionSource::default(),
            poll_interval: Config::POLL_INTERVAL,
            track_changed_hold: Config::TRACK_CHANGED_HOLD,
            refreshing_hold: Config::REFRESHING_HOLD,
            retry: RetryPolicy::none(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[cfg(test)]
mod test {
    use super::{Config, SessionSource};
    use crate::fetch::RetryPolicy;
    use std::time::Duration;

    #[test]
    fn test_new() {
        let config = Config::new(" https://api.sinatra.live/ ").unwrap();
        assert_eq!(config.base_url, "https://api.sinatra.live");
        assert_eq!(config.url("/session"), "https://api.sinatra.live/session");
        assert_eq!(config.session_source, SessionSource::Session);
        assert_eq!(config.poll_interval, Duration::from_secs(20));
        assert_eq!(config.track_changed_hold, Duration::from_millis(500));
        assert_eq!(config.refreshing_hold, Duration::from_millis(600));
        assert_eq!(config.retry, RetryPolicy::none());
    }

    #[test]
    fn test_new_requires_base_url() {
        assert!(Config::new("  ").is_err());
    }
}
