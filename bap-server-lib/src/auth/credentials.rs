//! Peer-credential check. Grounded on `original_source/Programs/auth.c`,
//! which queries `SO_PEERCRED` on Linux and falls back to `getpeereid` on
//! BSD-family systems; here we take the `SO_PEERCRED` branch since the
//! target is Linux.

use std::os::unix::io::RawFd;

use crate::error::{BapError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub uid: u32,
    pub gid: u32,
}

/// Queries the kernel for the credentials of the peer connected to `fd`,
/// the unix-socket analogue of `original_source`'s `getPeerCredentials`.
/// Only meaningful for `AF_UNIX` sockets; callers on TCP transports must
/// not call this (there is no peer identity to recover).
pub fn peer_credentials(fd: RawFd) -> Result<PeerCredentials> {
    let mut creds: libc::ucred = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            &mut creds as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 {
        return Err(BapError::OsError(
            std::io::Error::last_os_error().to_string(),
        ));
    }
    Ok(PeerCredentials { uid: creds.uid, gid: creds.gid })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_credentials_on_a_real_unix_pair() {
        use std::os::unix::io::AsRawFd;
        use std::os::unix::net::UnixStream;

        let (a, _b) = UnixStream::pair().unwrap();
        let creds = peer_credentials(a.as_raw_fd()).unwrap();
        assert_eq!(creds.uid, unsafe { libc::getuid() });
        assert_eq!(creds.gid, unsafe { libc::getgid() });
    }
}
