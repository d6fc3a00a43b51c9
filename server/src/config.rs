use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERVER_PORT: u16 = 3000;
pub const DEFAULT_FEED_PATH: &str = "data/attackers.json";
/// Written next to the feed file when no database is configured.
pub const SAVED_ATTACKERS_FILE: &str = "saved_attackers.json";
pub const STATIC_DIR: &str = "client/dist";
pub const DEFAULT_FEED_REFRESH_SECS: u64 = 1;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_UPSTREAM_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 3;
pub const DEFAULT_MAX_SAVE_RECORDS: usize = 10_000;

fn positive_env<T>(name: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .filter(|value| *value > T::default())
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn server_port() -> u16 {
    positive_env("ATTACK_MAP_PORT").unwrap_or(DEFAULT_SERVER_PORT)
}

pub fn feed_path() -> PathBuf {
    non_empty_env("ATTACKERS_FEED_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FEED_PATH))
}

/// Optional upstream the feed is mirrored from instead of the local file.
pub fn feed_url() -> Option<String> {
    non_empty_env("ATTACKERS_FEED_URL")
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
}

pub fn saved_attackers_path(feed_path: &std::path::Path) -> PathBuf {
    feed_path
        .parent()
        .map(|dir| dir.join(SAVED_ATTACKERS_FILE))
        .unwrap_or_else(|| PathBuf::from(SAVED_ATTACKERS_FILE))
}

pub fn feed_refresh_interval() -> Duration {
    Duration::from_secs(positive_env("FEED_REFRESH_SECS").unwrap_or(DEFAULT_FEED_REFRESH_SECS))
}

pub fn database_url() -> Option<String> {
    non_empty_env("DATABASE_URL")
}

pub fn db_max_connections() -> u32 {
    positive_env("DB_MAX_CONNECTIONS").unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
}

pub fn upstream_http_timeout() -> Duration {
    Duration::from_secs(
        positive_env("UPSTREAM_HTTP_TIMEOUT_SECS").unwrap_or(DEFAULT_UPSTREAM_HTTP_TIMEOUT_SECS),
    )
}

pub fn upstream_connect_timeout() -> Duration {
    Duration::from_secs(
        positive_env("UPSTREAM_CONNECT_TIMEOUT_SECS")
            .unwrap_or(DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS),
    )
}

pub fn max_save_records() -> usize {
    positive_env("MAX_SAVE_RECORDS").unwrap_or(DEFAULT_MAX_SAVE_RECORDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        temp_env::with_vars_unset(
            [
                "ATTACK_MAP_PORT",
                "ATTACKERS_FEED_PATH",
                "ATTACKERS_FEED_URL",
                "FEED_REFRESH_SECS",
                "MAX_SAVE_RECORDS",
            ],
            || {
                assert_eq!(server_port(), 3000);
                assert_eq!(feed_path(), PathBuf::from("data/attackers.json"));
                assert_eq!(feed_url(), None);
                assert_eq!(feed_refresh_interval(), Duration::from_secs(1));
                assert_eq!(max_save_records(), 10_000);
            },
        );
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        temp_env::with_vars(
            [
                ("ATTACK_MAP_PORT", Some("not-a-port")),
                ("FEED_REFRESH_SECS", Some("0")),
                ("DB_MAX_CONNECTIONS", Some("-4")),
                ("UPSTREAM_HTTP_TIMEOUT_SECS", Some("")),
                ("ATTACKERS_FEED_URL", Some("ftp://example.com/feed")),
            ],
            || {
                assert_eq!(server_port(), DEFAULT_SERVER_PORT);
                assert_eq!(feed_refresh_interval(), Duration::from_secs(1));
                assert_eq!(db_max_connections(), DEFAULT_DB_MAX_CONNECTIONS);
                assert_eq!(upstream_http_timeout(), Duration::from_secs(10));
                assert_eq!(feed_url(), None);
            },
        );
    }

    #[test]
    fn valid_overrides_are_used() {
        temp_env::with_vars(
            [
                ("ATTACK_MAP_PORT", Some("8080")),
                ("ATTACKERS_FEED_PATH", Some(" /srv/feed/attackers.json ")),
                ("ATTACKERS_FEED_URL", Some("https://feeds.example.com/attackers")),
                ("FEED_REFRESH_SECS", Some("5")),
                ("MAX_SAVE_RECORDS", Some("50")),
            ],
            || {
                assert_eq!(server_port(), 8080);
                assert_eq!(feed_path(), PathBuf::from("/srv/feed/attackers.json"));
                assert_eq!(
                    feed_url().as_deref(),
                    Some("https://feeds.example.com/attackers")
                );
                assert_eq!(feed_refresh_interval(), Duration::from_secs(5));
                assert_eq!(max_save_records(), 50);
            },
        );
    }

    #[test]
    fn saved_file_sits_next_to_the_feed() {
        assert_eq!(
            saved_attackers_path(std::path::Path::new("data/attackers.json")),
            PathBuf::from("data/saved_attackers.json")
        );
        assert_eq!(
            saved_attackers_path(std::path::Path::new("attackers.json")),
            PathBuf::from("saved_attackers.json")
        );
    }
}
