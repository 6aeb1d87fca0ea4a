// CLASSIFICATION: COMMUNITY
// Filename: netlink.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Kernel uevent socket.

use std::collections::VecDeque;
use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use log::{debug, info, warn};

use crate::error::{DevmgrError, Result};

/// Receive buffer requested when the configuration does not say otherwise.
pub const DEFAULT_RCVBUF: usize = 256 * 1024;

/// Anything that hands out raw uevent datagrams.
pub trait UeventSource {
    /// Copy the next accepted datagram into `buf`. `Ok(None)` means nothing
    /// is pending right now.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

/// Datagrams queued in memory, delivered front first. Longer datagrams are
/// truncated to the buffer the way `recvmsg` truncates them.
impl UeventSource for VecDeque<Vec<u8>> {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        Ok(self.pop_front().map(|msg| {
            let n = msg.len().min(buf.len());
            buf[..n].copy_from_slice(&msg[..n]);
            n
        }))
    }
}

enum Datagram {
    Accepted(usize),
    Rejected(&'static str),
}

/// Sender identity attached to one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sender {
    /// Netlink port id; zero for the kernel.
    pub pid: u32,
    /// Multicast groups the datagram went to; zero for unicast.
    pub groups: u32,
    /// Credentials from `SCM_CREDENTIALS`, if present.
    pub uid: Option<u32>,
}

/// Only kernel multicasts from uid 0 are trusted.
pub fn check_sender(sender: &Sender) -> std::result::Result<(), &'static str> {
    match sender.uid {
        None => Err("no sender credentials"),
        Some(uid) if uid != 0 => Err("sender is not root"),
        Some(_) if sender.groups == 0 => Err("unicast message"),
        Some(_) if sender.pid != 0 => Err("message not from the kernel"),
        Some(_) => Ok(()),
    }
}

/// `NETLINK_KOBJECT_UEVENT` socket bound to every multicast group.
#[derive(Debug)]
pub struct UeventSocket {
    fd: OwnedFd,
}

fn setsockopt_int(fd: RawFd, opt: libc::c_int, value: libc::c_int) -> io::Result<()> {
    // SAFETY: value outlives the call and the length matches its type.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            opt,
            &value as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

impl UeventSocket {
    /// Open the socket with a receive buffer of `rcvbuf` bytes.
    pub fn open(rcvbuf: usize) -> Result<Self> {
        // SAFETY: plain socket(2) call; the result is checked below.
        let raw = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_DGRAM | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
                libc::NETLINK_KOBJECT_UEVENT,
            )
        };
        if raw < 0 {
            return Err(DevmgrError::Netlink(io::Error::last_os_error()));
        }
        // SAFETY: raw is a freshly opened descriptor nobody else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let size = libc::c_int::try_from(rcvbuf).unwrap_or(libc::c_int::MAX);
        // SO_RCVBUFFORCE needs CAP_NET_ADMIN.
        if let Err(e) = setsockopt_int(raw, libc::SO_RCVBUFFORCE, size) {
            debug!("SO_RCVBUFFORCE: {}, falling back to SO_RCVBUF", e);
            if let Err(e) = setsockopt_int(raw, libc::SO_RCVBUF, size) {
                warn!("SO_RCVBUF {}: {}", size, e);
            }
        }
        setsockopt_int(raw, libc::SO_PASSCRED, 1).map_err(DevmgrError::Netlink)?;

        // SAFETY: sockaddr_nl is plain data; all-zero is a valid value.
        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        addr.nl_pid = 0;
        addr.nl_groups = 0xffff_ffff;
        // SAFETY: addr is a valid sockaddr_nl and the length matches.
        let rc = unsafe {
            libc::bind(
                raw,
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(DevmgrError::Netlink(io::Error::last_os_error()));
        }

        info!("uevent socket open, rcvbuf {}", rcvbuf);
        Ok(Self { fd })
    }

    fn recv_datagram(&self, buf: &mut [u8]) -> io::Result<Datagram> {
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr() as *mut libc::c_void,
            iov_len: buf.len(),
        };
        // SAFETY: plain data, zero is valid.
        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        // u64 storage keeps the control buffer aligned for cmsghdr.
        let mut control = [0u64; 8];
        // SAFETY: plain data, zero is valid.
        let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
        hdr.msg_name = &mut addr as *mut libc::sockaddr_nl as *mut libc::c_void;
        hdr.msg_namelen = mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t;
        hdr.msg_iov = &mut iov;
        hdr.msg_iovlen = 1;
        hdr.msg_control = control.as_mut_ptr() as *mut libc::c_void;
        hdr.msg_controllen = mem::size_of_val(&control) as _;

        // SAFETY: every pointer in hdr refers to live locals or to buf.
        let n = unsafe { libc::recvmsg(self.fd.as_raw_fd(), &mut hdr, 0) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut uid = None;
        // SAFETY: hdr was filled in by recvmsg; the CMSG helpers stay within
        // msg_controllen and the ucred payload is only read when the header
        // says it is one.
        unsafe {
            let mut cmsg = libc::CMSG_FIRSTHDR(&hdr);
            while !cmsg.is_null() {
                if (*cmsg).cmsg_level == libc::SOL_SOCKET
                    && (*cmsg).cmsg_type == libc::SCM_CREDENTIALS
                {
                    let data = libc::CMSG_DATA(cmsg) as *const libc::ucred;
                    let cred = std::ptr::read_unaligned(data);
                    uid = Some(cred.uid);
                    break;
                }
                cmsg = libc::CMSG_NXTHDR(&hdr, cmsg);
            }
        }

        let sender = Sender {
            pid: addr.nl_pid,
            groups: addr.nl_groups,
            uid,
        };
        Ok(match check_sender(&sender) {
            Ok(()) => Datagram::Accepted(n as usize),
            Err(why) => Datagram::Rejected(why),
        })
    }
}

impl UeventSource for UeventSocket {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        loop {
            match self.recv_datagram(buf) {
                Ok(Datagram::Accepted(n)) => return Ok(Some(n)),
                Ok(Datagram::Rejected(why)) => debug!("dropping uevent: {}", why),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

impl AsRawFd for UeventSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
