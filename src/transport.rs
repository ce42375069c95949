//! Remote transport (C1): authenticated SFTP access to one of several
//! exchange hosts, with host-shuffle failover and key-then-password
//! auth fallback. Grounded on `services/sftp_client.py`'s
//! `SFTPClient.connect()`/`list_files()`/`download_file()`.
//!
//! `ssh2::Session` is a blocking API; every call here is expected to be
//! invoked from inside `tokio::task::spawn_blocking` by the caller (the
//! watcher and the daily jobs), never directly from an async context.

use crate::config::Config;
use crate::error::{IngestError, Result};
use rand::seq::SliceRandom;
use ssh2::Session;
use std::io::Read;
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The remote-file operations the watcher and daily jobs depend on,
/// abstracted so tests can drive a fake in-memory remote (SPEC_FULL.md
/// §10.4) instead of a live exchange host. [`SftpTransport`] is the
/// only production implementation.
pub trait RemoteTransport: Send + Sync {
    fn list(&mut self, dir: &str) -> Result<Vec<String>>;
    fn fetch(&mut self, remote_path: &str) -> Result<Vec<u8>>;
}

pub struct SftpTransport {
    config: Config,
    session: Option<Session>,
    current_host: Option<String>,
}

impl SftpTransport {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session: None,
            current_host: None,
        }
    }

    /// Establish a session against one of the configured hosts, in a
    /// randomly shuffled order, reusing an already-live session if one
    /// exists.
    pub fn connect(&mut self) -> Result<()> {
        if self.session_is_alive() {
            return Ok(());
        }

        let mut hosts = self.config.sftp_hosts.clone();
        hosts.shuffle(&mut rand::thread_rng());

        let mut last_err = None;
        for host in &hosts {
            match self.try_connect(host) {
                Ok(session) => {
                    info!(host = %host, "sftp_connected");
                    self.session = Some(session);
                    self.current_host = Some(host.clone());
                    return Ok(());
                }
                Err(e) => {
                    warn!(host = %host, error = %e, "sftp_connect_failed");
                    last_err = Some(e);
                }
            }
        }

        Err(IngestError::transient(anyhow::anyhow!(
            "all {} configured hosts failed: {}",
            hosts.len(),
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    fn session_is_alive(&self) -> bool {
        matches!(&self.session, Some(s) if s.authenticated())
    }

    fn try_connect(&self, host: &str) -> anyhow::Result<Session> {
        let addr = format!("{host}:{}", self.config.sftp_port);
        let tcp = TcpStream::connect(&addr)?;
        tcp.set_read_timeout(Some(self.config.network_timeout))?;
        tcp.set_write_timeout(Some(self.config.network_timeout))?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;

        if let Some(key_path) = &self.config.key_path {
            session.userauth_pubkey_file(&self.config.sftp_user, None, Path::new(key_path), None)?;
        } else if let Some(pass) = &self.config.sftp_pass {
            session.userauth_password(&self.config.sftp_user, pass)?;
        } else {
            anyhow::bail!("no authentication method configured");
        }

        if !session.authenticated() {
            anyhow::bail!("authentication failed against {host}");
        }
        Ok(session)
    }

    pub fn current_host(&self) -> Option<&str> {
        self.current_host.as_deref()
    }

    pub fn close(&mut self) {
        self.session = None;
        self.current_host = None;
    }
}

impl RemoteTransport for SftpTransport {
    /// List every entry under `dir` (non-recursive).
    fn list(&mut self, dir: &str) -> Result<Vec<String>> {
        self.connect()?;
        let session = self.session.as_ref().expect("connect() guarantees a session");
        let sftp = session
            .sftp()
            .map_err(|e| IngestError::transient(anyhow::anyhow!("sftp channel failed: {e}")))?;
        let entries = sftp
            .readdir(Path::new(dir))
            .map_err(|e| IngestError::transient(anyhow::anyhow!("listing {dir} failed: {e}")))?;

        let names = entries
            .into_iter()
            .filter_map(|(path, _stat)| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect::<Vec<_>>();
        debug!(dir = %dir, count = names.len(), "sftp_listed");
        Ok(names)
    }

    /// Fetch a remote file's full contents.
    fn fetch(&mut self, remote_path: &str) -> Result<Vec<u8>> {
        self.connect()?;
        let session = self.session.as_ref().expect("connect() guarantees a session");
        let sftp = session
            .sftp()
            .map_err(|e| IngestError::transient(anyhow::anyhow!("sftp channel failed: {e}")))?;
        let mut file = sftp
            .open(Path::new(remote_path))
            .map_err(|e| IngestError::transient(anyhow::anyhow!("opening {remote_path} failed: {e}")))?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| IngestError::transient(anyhow::anyhow!("reading {remote_path} failed: {e}")))?;
        debug!(remote_path = %remote_path, bytes = buf.len(), "sftp_fetched");
        Ok(buf)
    }
}

pub(crate) const DEFAULT_PORT: u16 = 6010;
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            sftp_hosts: vec!["h1".into(), "h2".into()],
            sftp_port: DEFAULT_PORT,
            sftp_user: "user".into(),
            sftp_pass: Some("pass".into()),
            key_path: None,
            sftp_remote_path: "/CM30".into(),
            poll_interval: Duration::from_secs(60),
            sqlite_path: ":memory:".into(),
            network_timeout: DEFAULT_TIMEOUT,
        }
    }

    #[test]
    fn fresh_transport_has_no_session() {
        let t = SftpTransport::new(test_config());
        assert!(!t.session_is_alive());
        assert_eq!(t.current_host(), None);
    }

    #[test]
    fn close_clears_session_state() {
        let mut t = SftpTransport::new(test_config());
        t.close();
        assert_eq!(t.current_host(), None);
    }
}
