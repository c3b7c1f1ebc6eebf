//! SIGWINCH-to-descriptor bridging
//!
//! The relay blocks in poll(2) with no timeout, so an asynchronous
//! signal has to become descriptor readiness before the loop can see
//! it. Classic self-pipe: the handler writes one byte into a
//! nonblocking pipe whose read end is registered as a relay watcher.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::sync::atomic::{AtomicI32, Ordering};

use nix::fcntl::OFlag;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd;

use crate::{Result, TetherError};

static PIPE_WR: AtomicI32 = AtomicI32::new(-1);

extern "C" fn on_sigwinch(_: libc::c_int) {
    let fd = PIPE_WR.load(Ordering::Relaxed);
    if fd >= 0 {
        // write(2) is async-signal-safe. A full pipe drops the wakeup,
        // which coalesces a burst of resizes into one.
        // SAFETY: fd is the live write end stored by install().
        unsafe { libc::write(fd, b"w".as_ptr().cast(), 1) };
    }
}

/// Self-pipe carrying SIGWINCH wakeups.
pub struct SignalPipe {
    read: OwnedFd,
    // Kept open for the handler; never written from Rust code.
    _write: OwnedFd,
}

impl SignalPipe {
    /// Install the SIGWINCH handler and return the pollable pipe.
    ///
    /// One installation per process; a second call fails.
    pub fn install() -> Result<Self> {
        let (read, write) = unistd::pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC)
            .map_err(|e| TetherError::Io(e.into()))?;

        if PIPE_WR
            .compare_exchange(-1, write.as_raw_fd(), Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TetherError::internal("SIGWINCH pipe already installed"));
        }

        let action = SigAction::new(
            SigHandler::Handler(on_sigwinch),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        // SAFETY: the handler only calls async-signal-safe write(2).
        unsafe { signal::sigaction(Signal::SIGWINCH, &action) }
            .map_err(|e| TetherError::Io(e.into()))?;

        Ok(Self {
            read,
            _write: write,
        })
    }

    /// The readable end, for registering as a relay watcher.
    pub fn as_fd(&self) -> BorrowedFd<'_> {
        self.read.as_fd()
    }

    /// Consume queued wakeups. Call once per watcher invocation.
    pub fn drain(&self) {
        let mut buf = [0u8; 16];
        while matches!(unistd::read(&self.read, &mut buf), Ok(n) if n > 0) {}
    }
}
