//! Native-protocol transport
//!
//! An entry goes out as a single datagram. When it does not fit, the entry
//! is written to a sealed memfd and the descriptor is passed to journald
//! over `SCM_RIGHTS` instead, which is how journald accepts large entries.

use std::fs::File;
use std::io::{self, Write};
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::UnixDatagram;
use std::path::Path;

/// Send one encoded entry to the journal socket at `path`
pub(crate) fn send(socket: &UnixDatagram, path: &Path, entry: &[u8]) -> io::Result<()> {
    match socket.send_to(entry, path) {
        Ok(_) => Ok(()),
        Err(e) if is_too_large(&e) => {
            let memfd = sealed_memfd(entry)?;
            send_fd(socket.as_raw_fd(), path, memfd.as_raw_fd())
        }
        Err(e) => Err(e),
    }
}

/// Errors meaning the journal itself is gone or refuses us
pub(crate) fn is_unavailable(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(
            libc::ENOENT
                | libc::ENOTDIR
                | libc::ENOTCONN
                | libc::ECONNREFUSED
                | libc::EPERM
                | libc::EACCES
        )
    )
}

fn is_too_large(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(libc::EMSGSIZE | libc::ENOBUFS))
}

fn sealed_memfd(entry: &[u8]) -> io::Result<File> {
    // SAFETY: the name is a NUL-terminated literal.
    let raw = unsafe {
        libc::memfd_create(
            c"knocker-journal".as_ptr(),
            libc::MFD_ALLOW_SEALING | libc::MFD_CLOEXEC,
        )
    };
    if raw < 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: `raw` was just returned by memfd_create and nothing else owns it.
    let mut file = File::from(unsafe { OwnedFd::from_raw_fd(raw) });
    file.write_all(entry)?;

    let seals = libc::F_SEAL_SHRINK | libc::F_SEAL_GROW | libc::F_SEAL_WRITE | libc::F_SEAL_SEAL;
    // SAFETY: fcntl on a descriptor owned by `file` for the whole call.
    if unsafe { libc::fcntl(file.as_raw_fd(), libc::F_ADD_SEALS, seals) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(file)
}

/// `sendmsg` an empty datagram carrying `fd` to the socket at `path`
fn send_fd(socket: RawFd, path: &Path, fd: RawFd) -> io::Result<()> {
    let path = path.as_os_str().as_bytes();

    // SAFETY: sockaddr_un is plain old data; all zeroes is a valid value.
    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    if path.len() >= addr.sun_path.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "journal socket path too long",
        ));
    }
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, src) in addr.sun_path.iter_mut().zip(path) {
        *dst = *src as libc::c_char;
    }
    let addr_len = (mem::size_of::<libc::sa_family_t>() + path.len() + 1) as libc::socklen_t;

    let fd_len = mem::size_of::<RawFd>() as libc::c_uint;
    // SAFETY: pure size computation.
    let space = unsafe { libc::CMSG_SPACE(fd_len) } as usize;
    // u64 words keep the control buffer aligned for cmsghdr.
    let mut control = vec![0u64; space.div_ceil(mem::size_of::<u64>())];

    // SAFETY: msghdr is plain old data; all zeroes is a valid value.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_name = (&mut addr as *mut libc::sockaddr_un).cast();
    msg.msg_namelen = addr_len;
    msg.msg_control = control.as_mut_ptr().cast();
    msg.msg_controllen = space as _;

    // SAFETY: msg_control points at `space` zeroed, aligned bytes, which is
    // exactly one cmsghdr carrying one descriptor.
    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        if cmsg.is_null() {
            return Err(io::Error::other("no room for control message"));
        }
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type = libc::SCM_RIGHTS;
        (*cmsg).cmsg_len = libc::CMSG_LEN(fd_len) as _;
        std::ptr::write_unaligned(libc::CMSG_DATA(cmsg).cast::<RawFd>(), fd);
    }

    // SAFETY: every pointer in `msg` refers to locals that outlive the call.
    if unsafe { libc::sendmsg(socket, &msg, libc::MSG_NOSIGNAL) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}
