//! Background (daemon) operation

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::Config;

#[cfg(unix)]
const DAEMON_UMASK: u32 = 0o027;

#[cfg(unix)]
const FD_DIR: &str = "/proc/self/fd";

/// Removes the pidfile when the daemon exits cleanly
#[derive(Debug)]
pub struct PidFileGuard {
    path: PathBuf,
}

impl PidFileGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed pidfile {}", self.path.display()),
            Err(e) => warn!("failed to remove pidfile {}: {}", self.path.display(), e),
        }
    }
}

/// Detach from the terminal
///
/// Must run before any thread is spawned or source opened. Paths in `config`
/// must already be absolute because the working directory changes to the
/// output directory.
#[cfg(unix)]
pub fn detach(config: &Config) -> Result<PidFileGuard> {
    use anyhow::Context;
    use daemonize::Daemonize;

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("failed to create output directory {:?}", config.output_dir))?;

    Daemonize::new()
        .pid_file(&config.pid_file)
        .chown_pid_file(false)
        .working_directory(&config.output_dir)
        .umask(DAEMON_UMASK)
        .start()
        .context("failed to daemonize")?;

    // daemonize only redirects stdio, the pidfile descriptor holds its lock
    close_fds(&inherited_fds(&config.pid_file));

    Ok(PidFileGuard {
        path: config.pid_file.clone(),
    })
}

/// Descriptors above stderr that are still open, except the one on `keep`
///
/// Empty where `/proc/self/fd` is not available.
#[cfg(unix)]
fn inherited_fds(keep: &Path) -> Vec<std::os::fd::RawFd> {
    let entries = match std::fs::read_dir(FD_DIR) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("cannot list open descriptors: {}", e);
            return Vec::new();
        }
    };
    let listed: Vec<std::os::fd::RawFd> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .filter(|&fd| fd > 2)
        .collect();

    let keep = keep.canonicalize().unwrap_or_else(|_| keep.to_path_buf());
    // the directory handle used for listing is closed by now and fails read_link
    listed
        .into_iter()
        .filter(|fd| match std::fs::read_link(Path::new(FD_DIR).join(fd.to_string())) {
            Ok(target) => target != keep,
            Err(_) => false,
        })
        .collect()
}

#[cfg(unix)]
fn close_fds(fds: &[std::os::fd::RawFd]) {
    use std::os::fd::{FromRawFd, OwnedFd};

    for &fd in fds {
        // SAFETY: the descriptor was just listed as open and nothing else in
        // this process holds it as an owned handle
        drop(unsafe { OwnedFd::from_raw_fd(fd) });
    }
}

#[cfg(not(unix))]
pub fn detach(_config: &Config) -> Result<PidFileGuard> {
    anyhow::bail!("daemon mode is only supported on unix")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_removes_pidfile() {
        let path = std::env::temp_dir().join(format!("sentinel-daemon-{}.pid", std::process::id()));
        std::fs::write(&path, format!("{}\n", std::process::id())).unwrap();

        let guard = PidFileGuard { path: path.clone() };
        assert_eq!(guard.path(), path.as_path());
        drop(guard);
        assert!(!path.exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_leaked_descriptor_is_found_and_closed() {
        use std::os::fd::IntoRawFd;

        let path = std::env::temp_dir().join(format!("sentinel-fd-{}", std::process::id()));
        let fd = std::fs::File::create(&path).unwrap().into_raw_fd();
        let canonical = path.canonicalize().unwrap();
        let link = Path::new(FD_DIR).join(fd.to_string());

        assert!(inherited_fds(Path::new("/nonexistent")).contains(&fd));
        assert!(!inherited_fds(&canonical).contains(&fd));

        close_fds(&[fd]);
        // the number may be reused by a parallel test, but not for our file
        assert!(std::fs::read_link(&link).map_or(true, |target| target != canonical));
        let _ = std::fs::remove_file(&path);
    }
}
