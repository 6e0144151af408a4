//! SFTP upload over ssh2

use std::fs::File;
use std::io;
use std::net::TcpStream;
use std::path::{Path, PathBuf};

use ssh2::Session;
use tracing::debug;

use crate::error::DeliveryError;
use crate::method::{file_name, Delivery};

const SESSION_TIMEOUT_MS: u32 = 30_000;

#[derive(Clone)]
pub struct SftpDelivery {
    host: String,
    port: u16,
    user: String,
    pass: String,
    remote_dir: String,
}

// keeps the password out of logs
impl std::fmt::Debug for SftpDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpDelivery")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("remote_dir", &self.remote_dir)
            .finish_non_exhaustive()
    }
}

impl SftpDelivery {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        pass: impl Into<String>,
        remote_dir: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            pass: pass.into(),
            remote_dir: remote_dir.into(),
        }
    }

    /// Remote path `file` is written to
    pub fn remote_path(&self, file: &Path) -> Result<PathBuf, DeliveryError> {
        Ok(Path::new(&self.remote_dir).join(file_name(file)?))
    }
}

impl Delivery for SftpDelivery {
    fn deliver(&self, file: &Path) -> Result<(), DeliveryError> {
        let remote = self.remote_path(file)?;
        let mut local = File::open(file)?;

        let tcp = TcpStream::connect((self.host.as_str(), self.port))?;
        let mut session = Session::new()?;
        session.set_timeout(SESSION_TIMEOUT_MS);
        session.set_tcp_stream(tcp);
        session.handshake()?;
        session.userauth_password(&self.user, &self.pass)?;

        let sftp = session.sftp()?;
        let mut handle = sftp.create(&remote)?;
        let bytes = io::copy(&mut local, &mut handle)?;
        drop(handle);

        debug!("wrote {} bytes to {}:{}", bytes, self.host, remote.display());
        let _ = session.disconnect(None, "done", None);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sftp://{}@{}:{}{}", self.user, self.host, self.port, self.remote_dir)
    }
}
