//! Bluetooth RFCOMM socket plumbing
//!
//! Thin wrappers over the AF_BLUETOOTH socket calls. The kernel address
//! struct is defined locally (matching `<bluetooth/rfcomm.h>`) so no
//! bluetooth userland headers or libraries are needed.

use std::fmt;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::str::FromStr;

use crate::{Result, TetherError};

const BTPROTO_RFCOMM: libc::c_int = 3;

/// Valid RFCOMM channel range
pub const CHANNEL_RANGE: std::ops::RangeInclusive<u8> = 1..=30;

/// Bluetooth device address.
///
/// Stored in kernel byte order (least significant byte first); parsed
/// from and displayed in the usual `XX:XX:XX:XX:XX:XX` notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BtAddr(pub [u8; 6]);

impl FromStr for BtAddr {
    type Err = TetherError;

    fn from_str(s: &str) -> Result<Self> {
        let parse_err = || TetherError::AddrParse { input: s.into() };

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(parse_err());
        }
        let mut out = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(parse_err());
            }
            // Kernel order is reversed relative to the printed form.
            out[5 - i] = u8::from_str_radix(part, 16).map_err(|_| parse_err())?;
        }
        Ok(BtAddr(out))
    }
}

impl fmt::Display for BtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

/// `struct sockaddr_rc` from `<bluetooth/rfcomm.h>`
#[repr(C)]
struct SockaddrRc {
    rc_family: libc::sa_family_t,
    rc_bdaddr: [u8; 6],
    rc_channel: u8,
}

impl SockaddrRc {
    fn new(addr: BtAddr, channel: u8) -> Self {
        Self {
            rc_family: libc::AF_BLUETOOTH as libc::sa_family_t,
            rc_bdaddr: addr.0,
            rc_channel: channel,
        }
    }
}

fn rfcomm_socket() -> io::Result<OwnedFd> {
    // SAFETY: plain socket(2) call; ownership of the returned fd is
    // taken immediately.
    let fd = unsafe {
        libc::socket(
            libc::AF_BLUETOOTH,
            libc::SOCK_STREAM | libc::SOCK_CLOEXEC,
            BTPROTO_RFCOMM,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn bind_rfcomm(fd: RawFd, sa: &SockaddrRc) -> io::Result<()> {
    // SAFETY: sa is a valid sockaddr_rc for the length passed.
    let rc = unsafe {
        libc::bind(
            fd,
            sa as *const SockaddrRc as *const libc::sockaddr,
            mem::size_of::<SockaddrRc>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Connect to `addr` on the given RFCOMM channel.
pub fn connect(addr: BtAddr, channel: u8) -> Result<OwnedFd> {
    let sock = rfcomm_socket()?;

    // Bind the local end to the any-address first, as bluez tools do.
    bind_rfcomm(sock.as_raw_fd(), &SockaddrRc::new(BtAddr::default(), 0))?;

    let sa = SockaddrRc::new(addr, channel);
    // SAFETY: sa is a valid sockaddr_rc for the length passed.
    let rc = unsafe {
        libc::connect(
            sock.as_raw_fd(),
            &sa as *const SockaddrRc as *const libc::sockaddr,
            mem::size_of::<SockaddrRc>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        let err = io::Error::last_os_error();
        return Err(TetherError::connection(format!(
            "{} channel {}: {}",
            addr, channel, err
        )));
    }
    Ok(sock)
}

/// Listening RFCOMM socket.
pub struct Listener {
    sock: OwnedFd,
    channel: u8,
}

impl Listener {
    /// Bind and listen on the given channel (local any-address).
    pub fn bind(channel: u8) -> Result<Self> {
        let sock = rfcomm_socket()?;
        bind_rfcomm(sock.as_raw_fd(), &SockaddrRc::new(BtAddr::default(), channel))?;

        // SAFETY: listen(2) on our own bound socket.
        if unsafe { libc::listen(sock.as_raw_fd(), 10) } != 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(Self { sock, channel })
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Accept one connection, returning the stream and the peer address.
    pub fn accept(&self) -> Result<(OwnedFd, BtAddr)> {
        let mut sa = SockaddrRc::new(BtAddr::default(), 0);
        let mut len = mem::size_of::<SockaddrRc>() as libc::socklen_t;
        // SAFETY: sa/len describe a valid, writable sockaddr_rc.
        // SOCK_CLOEXEC keeps the connection out of spawned children.
        let fd = unsafe {
            libc::accept4(
                self.sock.as_raw_fd(),
                &mut sa as *mut SockaddrRc as *mut libc::sockaddr,
                &mut len,
                libc::SOCK_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok((unsafe { OwnedFd::from_raw_fd(fd) }, BtAddr(sa.rc_bdaddr)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addr() {
        let addr: BtAddr = "11:22:33:44:55:66".parse().unwrap();
        // Kernel order: least significant byte first.
        assert_eq!(addr.0, [0x66, 0x55, 0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn test_parse_addr_lowercase_and_short() {
        let addr: BtAddr = "aa:b:cc:0:ee:ff".parse().unwrap();
        assert_eq!(addr.0, [0xFF, 0xEE, 0x00, 0xCC, 0x0B, 0xAA]);
    }

    #[test]
    fn test_parse_addr_rejects_garbage() {
        for input in [
            "",
            "11:22:33:44:55",
            "11:22:33:44:55:66:77",
            "11:22:33:44:55:6g",
            "11:22:33:44:55:666",
            "hello",
            "11-22-33-44-55-66",
            "11:22:33:44:55:",
        ] {
            assert!(
                input.parse::<BtAddr>().is_err(),
                "expected parse failure for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_display_roundtrip() {
        let addr: BtAddr = "AB:CD:EF:01:23:45".parse().unwrap();
        assert_eq!(addr.to_string(), "AB:CD:EF:01:23:45");
        assert_eq!(addr.to_string().parse::<BtAddr>().unwrap(), addr);
    }

    #[test]
    fn test_sockaddr_layout() {
        // Kernel struct is 2 + 6 + 1 bytes, padded to 10.
        assert_eq!(mem::size_of::<SockaddrRc>(), 10);
    }

    #[test]
    fn test_channel_range() {
        assert!(CHANNEL_RANGE.contains(&1));
        assert!(CHANNEL_RANGE.contains(&30));
        assert!(!CHANNEL_RANGE.contains(&0));
        assert!(!CHANNEL_RANGE.contains(&31));
    }
}
