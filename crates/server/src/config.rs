use std::{
    net::{SocketAddr, ToSocketAddrs},
    path::{Path, PathBuf},
};

use anyhow::Context;
use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "server.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// `host:port`; a bare `:port` listens on every interface.
    pub bind_addr: String,
    pub debug: bool,
    /// Every session runs as `default_user`, ignoring `?user=`.
    pub single_user: bool,
    pub enable_ssl: bool,
    /// Shell started with `-l` for each session.
    pub fork_cmd: String,
    pub default_user: String,
    /// Where the self-signed certificate is written when SSL is enabled.
    pub cert_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: ":8080".into(),
            debug: false,
            single_user: true,
            enable_ssl: false,
            fork_cmd: "/bin/bash".into(),
            default_user: default_user(),
            cert_dir: PathBuf::from("."),
        }
    }
}

impl Settings {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        resolve_bind_addr(&self.bind_addr)
    }
}

fn default_user() -> String {
    std::env::var("USER")
        .ok()
        .filter(|user| !user.trim().is_empty())
        .unwrap_or_else(|| "root".to_string())
}

pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let defaults = Settings::default();
    let mut settings: Settings = Config::builder()
        .set_default("bind_addr", defaults.bind_addr)?
        .set_default("debug", defaults.debug)?
        .set_default("single_user", defaults.single_user)?
        .set_default("enable_ssl", defaults.enable_ssl)?
        .set_default("fork_cmd", defaults.fork_cmd)?
        .set_default("default_user", defaults.default_user)?
        .set_default(
            "cert_dir",
            defaults.cert_dir.to_string_lossy().into_owned(),
        )?
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("failed to read settings from '{}'", path.display()))?
        .try_deserialize()
        .context("invalid server settings")?;

    if let Ok(v) = std::env::var("SERVER_BIND") {
        settings.bind_addr = v;
    }
    if std::env::var("ENABLE_SSL").is_ok_and(|v| v == "true") {
        settings.enable_ssl = true;
    }

    Ok(settings)
}

pub fn resolve_bind_addr(raw: &str) -> anyhow::Result<SocketAddr> {
    let raw = raw.trim();
    let normalized = match raw.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => raw.to_string(),
    };

    normalized
        .to_socket_addrs()
        .with_context(|| format!("invalid bind address '{raw}'"))?
        .next()
        .with_context(|| format!("bind address '{raw}' resolved to nothing"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
