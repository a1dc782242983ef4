use anyhow::{bail, Result};
use std::env;

pub struct AppConfig {
    pub storage: StorageConfig,
    pub review: ReviewConfig,
    pub settings: SettingsConfig,
}

impl AppConfig {
    pub fn new() -> Result<Self> {
        let storage = match env::var("STORAGE_BACKEND").as_deref() {
            Err(_) | Ok("postgres") => StorageConfig::Postgres(DatabaseConfig {
                host: env::var("DATABASE_HOST")?,
                port: env::var("DATABASE_PORT")?.parse()?,
                username: env::var("DATABASE_USERNAME")?,
                password: env::var("DATABASE_PASSWORD")?,
                database: env::var("DATABASE_NAME")?,
            }),
            Ok("memory") => StorageConfig::InMemory {
                seed_admin: env::var("MEMORY_SEED_ADMIN").ok(),
            },
            Ok(other) => bail!("unknown STORAGE_BACKEND: {other}"),
        };
        let review = ReviewConfig {
            hold_minutes: env_or("REVIEW_HOLD_MINUTES", ReviewConfig::DEFAULT_HOLD_MINUTES)?,
        }
        .validate()?;
        let settings = SettingsConfig {
            cache_ttl_secs: env_or(
                "SETTINGS_CACHE_TTL_SECONDS",
                SettingsConfig::DEFAULT_CACHE_TTL_SECS,
            )?,
        }
        .validate()?;
        Ok(Self {
            storage,
            review,
            settings,
        })
    }
}

// 未設定ならデフォルト値、設定されていればパースした値を返す
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(v) => Ok(v.parse()?),
        Err(_) => Ok(default),
    }
}

pub enum StorageConfig {
    Postgres(DatabaseConfig),
    // 起動時に管理者として登録するユーザーのメールアドレス
    InMemory { seed_admin: Option<String> },
}

pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

#[derive(Clone, Copy)]
pub struct ReviewConfig {
    pub hold_minutes: i64,
}

impl ReviewConfig {
    pub const DEFAULT_HOLD_MINUTES: i64 = 15;
    pub const MAX_HOLD_MINUTES: i64 = 24 * 60;

    pub fn validate(self) -> Result<Self> {
        if !(1..=Self::MAX_HOLD_MINUTES).contains(&self.hold_minutes) {
            bail!(
                "REVIEW_HOLD_MINUTES must be between 1 and {}: {}",
                Self::MAX_HOLD_MINUTES,
                self.hold_minutes
            );
        }
        Ok(self)
    }

    /// 検証を経ていない値でも 1 分から上限の範囲に丸めて返す
    pub fn bounded_hold_minutes(&self) -> i64 {
        self.hold_minutes.clamp(1, Self::MAX_HOLD_MINUTES)
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            hold_minutes: Self::DEFAULT_HOLD_MINUTES,
        }
    }
}

#[derive(Clone, Copy)]
pub struct SettingsConfig {
    pub cache_ttl_secs: u64,
}

impl SettingsConfig {
    pub const DEFAULT_CACHE_TTL_SECS: u64 = 30;
    pub const MAX_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

    pub fn validate(self) -> Result<Self> {
        if !(1..=Self::MAX_CACHE_TTL_SECS).contains(&self.cache_ttl_secs) {
            bail!(
                "SETTINGS_CACHE_TTL_SECONDS must be between 1 and {}: {}",
                Self::MAX_CACHE_TTL_SECS,
                self.cache_ttl_secs
            );
        }
        Ok(self)
    }

    pub fn bounded_ttl_secs(&self) -> i64 {
        let secs = self.cache_ttl_secs.clamp(1, Self::MAX_CACHE_TTL_SECS);
        // 上限は i64 に収まる
        i64::try_from(secs).unwrap_or(i64::MAX)
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: Self::DEFAULT_CACHE_TTL_SECS,
        }
    }
}
