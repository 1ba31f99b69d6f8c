//! Network namespace utilities.
//!
//! Sockets are bound to the namespace they were created in, so a control
//! socket for another namespace is created by briefly switching the calling
//! thread into it.
//!
//! # Example
//!
//! ```ignore
//! use xfrmlink::netlink::namespace;
//! use xfrmlink::{Connection, Xfrm};
//!
//! let conn = Connection::<Xfrm>::new_in_namespace_path(namespace::netns_path("east"))?;
//! let sas = conn.dump_sa_all().await?;
//! ```

use std::fs::File;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use super::error::{Error, Result};

/// The runtime directory where named network namespaces are stored.
pub const NETNS_RUN_DIR: &str = "/var/run/netns";

/// Path of a namespace created via `ip netns add <name>`.
pub fn netns_path(name: &str) -> PathBuf {
    PathBuf::from(NETNS_RUN_DIR).join(name)
}

/// Open a namespace file by path.
pub fn open_path<P: AsRef<Path>>(path: P) -> Result<NamespaceFd> {
    let file = File::open(path.as_ref()).map_err(|e| {
        Error::InvalidMessage(format!(
            "cannot open namespace '{}': {}",
            path.as_ref().display(),
            e
        ))
    })?;
    Ok(NamespaceFd { file })
}

/// A handle to an open namespace file.
#[derive(Debug)]
pub struct NamespaceFd {
    file: File,
}

impl AsRawFd for NamespaceFd {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// Run `f` with the calling thread inside the namespace referred to by `ns_fd`.
///
/// The original namespace is restored afterwards. A failed restore is logged
/// and the result of `f` is still returned.
pub fn run_in_namespace_fd<T>(ns_fd: RawFd, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let current_ns = File::open("/proc/self/ns/net")
        .map_err(|e| Error::InvalidMessage(format!("cannot open current namespace: {}", e)))?;
    let current_ns_fd = current_ns.as_raw_fd();

    // SAFETY: setns only changes the calling thread's namespace. ns_fd is an
    // open namespace file descriptor owned by the caller.
    let ret = unsafe { libc::setns(ns_fd, libc::CLONE_NEWNET) };
    if ret < 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }

    let result = f();

    // SAFETY: current_ns_fd was opened from /proc/self/ns/net above and is
    // still open.
    let restore_ret = unsafe { libc::setns(current_ns_fd, libc::CLONE_NEWNET) };
    if restore_ret < 0 {
        tracing::warn!(
            error = %std::io::Error::last_os_error(),
            "failed to restore original network namespace"
        );
    }

    result
}

/// Run `f` inside the namespace at `path`.
pub fn run_in_namespace_path<P, T>(path: P, f: impl FnOnce() -> Result<T>) -> Result<T>
where
    P: AsRef<Path>,
{
    let ns = open_path(path)?;
    run_in_namespace_fd(ns.as_raw_fd(), f)
}
