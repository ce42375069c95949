//! Environment-driven configuration, constructed once at startup and
//! passed by value/`Arc` to every component — see `models::Config` in
//! the surrounding codebase for the pattern this follows.

use crate::error::IngestError;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub sftp_hosts: Vec<String>,
    pub sftp_port: u16,
    pub sftp_user: String,
    pub sftp_pass: Option<String>,
    pub key_path: Option<String>,
    pub sftp_remote_path: String,
    pub poll_interval: Duration,
    pub sqlite_path: String,
    pub network_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, IngestError> {
        dotenv::dotenv().ok();

        let sftp_hosts: Vec<String> = std::env::var("SFTP_HOSTS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if sftp_hosts.is_empty() {
            return Err(IngestError::configuration(anyhow::anyhow!(
                "SFTP_HOSTS must name at least one host"
            )));
        }

        let sftp_user = std::env::var("SFTP_USER").unwrap_or_else(|_| "PTCPL_15MINCM".into());
        let sftp_pass = std::env::var("SFTP_PASS").ok().filter(|s| !s.is_empty());
        let key_path = std::env::var("KEY_PATH").ok().filter(|s| !s.is_empty());
        if sftp_pass.is_none() && key_path.is_none() {
            return Err(IngestError::configuration(anyhow::anyhow!(
                "either KEY_PATH or SFTP_PASS must be set"
            )));
        }

        let sftp_remote_path = std::env::var("SFTP_REMOTE_PATH")
            .map_err(|_| IngestError::configuration(anyhow::anyhow!("SFTP_REMOTE_PATH not set")))?;

        let sftp_port = std::env::var("SFTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(6010);

        let poll_interval_secs: u64 = std::env::var("POLL_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let sqlite_path =
            std::env::var("SQLITE_PATH").unwrap_or_else(|_| "./nse_cm_ingest.db".into());

        let network_timeout_secs: u64 = std::env::var("NETWORK_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Ok(Config {
            sftp_hosts,
            sftp_port,
            sftp_user,
            sftp_pass,
            key_path,
            sftp_remote_path,
            poll_interval: Duration::from_secs(poll_interval_secs),
            sqlite_path,
            network_timeout: Duration::from_secs(network_timeout_secs),
        })
    }
}
