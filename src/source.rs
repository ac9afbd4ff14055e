//! Snapshot sources and the store credential capability
//!
//! A source yields raw snapshot bytes for a `(date, time)` key. Store access
//! may need a short-lived token; that lives in a [`Session`] handed to the
//! source, never in global state.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Bearer token with its expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues fresh access tokens (refresh-token exchange, environment, ...).
pub trait TokenIssuer {
    fn issue(&self) -> Result<AccessToken>;
}

/// Credential lifecycle used by snapshot sources.
pub trait Session {
    /// Current token, refreshed first when missing or expired.
    fn acquire(&mut self) -> Result<&AccessToken>;
    fn is_expired(&self) -> bool;
    fn refresh(&mut self) -> Result<()>;
}

/// Keeps the last issued token until it is about to expire.
pub struct CachedSession<I: TokenIssuer> {
    issuer: I,
    token: Option<AccessToken>,
    /// Tokens this close to expiry count as expired
    margin: Duration,
}

impl<I: TokenIssuer> CachedSession<I> {
    pub fn new(issuer: I) -> Self {
        Self {
            issuer,
            token: None,
            margin: Duration::seconds(60),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match &self.token {
            Some(token) => now + self.margin >= token.expires_at,
            None => true,
        }
    }
}

impl<I: TokenIssuer> Session for CachedSession<I> {
    fn acquire(&mut self) -> Result<&AccessToken> {
        if self.is_expired() {
            self.refresh()?;
        }
        self.token
            .as_ref()
            .ok_or_else(|| anyhow!("Session holds no token after refresh"))
    }

    fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    fn refresh(&mut self) -> Result<()> {
        let token = self.issuer.issue().context("Access token refresh failed")?;
        info!("Access token refreshed, valid until {}", token.expires_at);
        self.token = Some(token);
        Ok(())
    }
}

/// Reads a token from an environment variable and treats it as valid for a
/// fixed lifetime from the moment it was read.
#[derive(Debug, Clone)]
pub struct EnvTokenIssuer {
    pub variable: String,
    pub lifetime: Duration,
}

impl TokenIssuer for EnvTokenIssuer {
    fn issue(&self) -> Result<AccessToken> {
        let value = env::var(&self.variable)
            .with_context(|| format!("Environment variable {} not set", self.variable))?;
        if value.trim().is_empty() {
            return Err(anyhow!("Environment variable {} is empty", self.variable));
        }
        Ok(AccessToken {
            value: value.trim().to_string(),
            expires_at: Utc::now() + self.lifetime,
        })
    }
}

/// Provider of raw snapshot bytes.
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotSource {
    /// Bytes of the snapshot taken at `time` (`HHMM`) on `date`
    /// (`YYYYMMDD`), `None` when it does not exist.
    fn fetch(&mut self, date: &str, time: &str) -> Result<Option<Vec<u8>>>;

    /// Available snapshot times for `date`, ascending.
    fn list(&mut self, date: &str) -> Result<Vec<String>>;
}

/// Snapshot files `{prefix}{date}_{time}.csv` in one directory.
pub struct DirectorySource {
    directory: PathBuf,
    prefix: String,
    session: Option<Box<dyn Session + Send>>,
}

impl DirectorySource {
    pub fn new(directory: impl AsRef<Path>, prefix: &str) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            prefix: prefix.to_string(),
            session: None,
        }
    }

    pub fn with_session(mut self, session: Box<dyn Session + Send>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn file_name(&self, date: &str, time: &str) -> String {
        format!("{}{}_{}.csv", self.prefix, date, time)
    }

    fn authorize(&mut self) -> Result<()> {
        if let Some(session) = self.session.as_mut() {
            let token = session.acquire()?;
            debug!("Store access authorized until {}", token.expires_at);
        }
        Ok(())
    }
}

impl SnapshotSource for DirectorySource {
    fn fetch(&mut self, date: &str, time: &str) -> Result<Option<Vec<u8>>> {
        self.authorize()?;
        let path = self.directory.join(self.file_name(date, time));
        match fs::read(&path) {
            Ok(bytes) => {
                debug!("Read {} bytes from {}", bytes.len(), path.display());
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn list(&mut self, date: &str) -> Result<Vec<String>> {
        self.authorize()?;
        let stem = format!("{}{}_", self.prefix, date);
        let entries = fs::read_dir(&self.directory)
            .with_context(|| format!("Failed to list {}", self.directory.display()))?;

        let mut times = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(time) = name
                .strip_prefix(stem.as_str())
                .and_then(|rest| rest.strip_suffix(".csv"))
            {
                if !time.is_empty() && time.chars().all(|c| c.is_ascii_digit()) {
                    times.push(time.to_string());
                }
            }
        }
        times.sort();
        Ok(times)
    }
}
