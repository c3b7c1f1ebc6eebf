//! The shuffler: directional stream copying over one poll loop
//!
//! Each copy task is (source, destination, buffer discipline): bytes
//! read from the source pass through the buffer (encoding or decoding
//! on the way) and drain to the destination as it accepts them. A task
//! never reads again while staged bytes remain, so at most one read
//! chunk per task is in flight regardless of how mismatched the two
//! ends are.
//!
//! Descriptors are borrowed; opening, closing and lifetime stay with
//! the session driver.

use std::cell::RefCell;
use std::os::fd::BorrowedFd;
use std::rc::Rc;

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd;
use tracing::{debug, info};

use tether_protocol::StreamBuffer;
use tether_utils::{Result, TetherError};

/// Bytes pulled from a source per read. A tuning constant, not part of
/// the protocol: it bounds the per-task staging footprint because a
/// source is only read again once the previous chunk has drained.
const READ_CHUNK: usize = 128;

/// Buffer handle shared between the shuffler and the session driver.
///
/// The driver (typically from a watcher callback) may stage control
/// frames into a direction the shuffler is draining; everything runs on
/// one thread inside the poll loop, so `Rc<RefCell>` is the whole
/// synchronization story.
pub type SharedBuffer = Rc<RefCell<StreamBuffer>>;

/// Wrap a buffer discipline for registration.
pub fn shared(buffer: StreamBuffer) -> SharedBuffer {
    Rc::new(RefCell::new(buffer))
}

/// What a watcher callback wants done after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchControl {
    /// Keep running.
    Continue,
    /// End the run successfully.
    Stop,
}

type WatchCallback<'fd> = Box<dyn FnMut() -> Result<WatchControl> + 'fd>;

struct StreamTask<'fd> {
    src: BorrowedFd<'fd>,
    dst: BorrowedFd<'fd>,
    buffer: SharedBuffer,
    abort_byte: Option<u8>,
}

struct Watcher<'fd> {
    fd: BorrowedFd<'fd>,
    callback: WatchCallback<'fd>,
}

/// Readiness-driven relay over a set of copy tasks and watchers.
#[derive(Default)]
pub struct Shuffler<'fd> {
    streams: Vec<StreamTask<'fd>>,
    watchers: Vec<Watcher<'fd>>,
}

impl<'fd> Shuffler<'fd> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a copy task. If `abort_byte` is set and a read chunk
    /// from `src` contains that byte anywhere, the whole run ends
    /// immediately and successfully; staged bytes are not flushed
    /// first.
    pub fn register_copy(
        &mut self,
        src: BorrowedFd<'fd>,
        dst: BorrowedFd<'fd>,
        buffer: SharedBuffer,
        abort_byte: Option<u8>,
    ) {
        self.streams.push(StreamTask {
            src,
            dst,
            buffer,
            abort_byte,
        });
    }

    /// Register a passthrough copy task with no abort byte.
    pub fn register_raw_copy(&mut self, src: BorrowedFd<'fd>, dst: BorrowedFd<'fd>) {
        self.register_copy(src, dst, shared(StreamBuffer::raw()), None);
    }

    /// Register a watcher: `callback` runs whenever `fd` is readable.
    /// Watchers carry no payload; they exist to bridge outside events
    /// (signals, timers) into the poll loop. Callbacks must not block.
    pub fn register_watcher(
        &mut self,
        fd: BorrowedFd<'fd>,
        callback: impl FnMut() -> Result<WatchControl> + 'fd,
    ) {
        self.watchers.push(Watcher {
            fd,
            callback: Box::new(callback),
        });
    }

    /// Drive all tasks until none remain, an abort byte is seen, or a
    /// watcher stops the run. The remote resetting the connection is a
    /// normal way for a session to end and reports success; other I/O
    /// errors and framing violations propagate.
    pub fn run(&mut self) -> Result<()> {
        for task in &self.streams {
            set_nonblocking(task.src)?;
            set_nonblocking(task.dst)?;
        }

        loop {
            if self.streams.is_empty() {
                return Ok(());
            }

            // Interest sets. Exactly one of read-source / write-
            // destination per task; the idle end is registered with no
            // events so error conditions still surface.
            let mut fds: Vec<PollFd> =
                Vec::with_capacity(self.streams.len() * 2 + self.watchers.len());
            for task in &self.streams {
                let (src_events, dst_events) = if task.buffer.borrow().is_empty() {
                    (PollFlags::POLLIN, PollFlags::empty())
                } else {
                    (PollFlags::empty(), PollFlags::POLLOUT)
                };
                fds.push(PollFd::new(task.src, src_events));
                fds.push(PollFd::new(task.dst, dst_events));
            }
            let watcher_base = fds.len();
            for watcher in &self.watchers {
                fds.push(PollFd::new(watcher.fd, PollFlags::POLLIN));
            }

            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(io_error(e)),
            }

            let revents: Vec<PollFlags> = fds
                .iter()
                .map(|fd| fd.revents().unwrap_or_else(PollFlags::empty))
                .collect();
            drop(fds);

            // Watchers first: they may stage control frames that the
            // write pass below already flushes.
            for (i, watcher) in self.watchers.iter_mut().enumerate() {
                if revents[watcher_base + i].intersects(PollFlags::POLLIN | PollFlags::POLLHUP) {
                    match (watcher.callback)()? {
                        WatchControl::Continue => {}
                        WatchControl::Stop => return Ok(()),
                    }
                }
            }

            // Tasks whose descriptors report exceptional state get no
            // further I/O. A hung-up destination can only yield EPIPE;
            // a hung-up source still goes through the read pass so
            // pending bytes and the final EOF are observed in order.
            let err_flags = PollFlags::POLLERR | PollFlags::POLLNVAL;
            let mut dead = vec![false; self.streams.len()];
            for i in 0..self.streams.len() {
                if revents[2 * i].intersects(err_flags)
                    || revents[2 * i + 1].intersects(err_flags | PollFlags::POLLHUP)
                {
                    debug!("stream task {i}: exceptional condition, dropping");
                    dead[i] = true;
                }
            }

            // Write pass: flush staged bytes to writable destinations.
            // Short writes are normal; only what went out is acked.
            for (i, task) in self.streams.iter().enumerate() {
                if dead[i] || !revents[2 * i + 1].contains(PollFlags::POLLOUT) {
                    continue;
                }
                let written = {
                    let buffer = task.buffer.borrow();
                    match unistd::write(task.dst, buffer.peek()) {
                        Ok(n) => n,
                        Err(Errno::EAGAIN) => continue,
                        Err(Errno::ECONNRESET) => {
                            info!("connection reset by peer");
                            return Ok(());
                        }
                        Err(e) => return Err(io_error(e)),
                    }
                };
                task.buffer.borrow_mut().ack(written)?;
            }

            // Read pass: one bounded chunk per readable source.
            let mut chunk = [0u8; READ_CHUNK];
            for (i, task) in self.streams.iter().enumerate() {
                if dead[i] || !revents[2 * i].intersects(PollFlags::POLLIN | PollFlags::POLLHUP) {
                    continue;
                }
                // POLLHUP is reported even when we only polled for
                // errors; never read while a chunk is still staged.
                if !task.buffer.borrow().is_empty() {
                    continue;
                }
                match unistd::read(task.src, &mut chunk) {
                    Ok(0) => {
                        debug!("stream task {i}: end of stream");
                        dead[i] = true;
                    }
                    Ok(n) => {
                        let data = &chunk[..n];
                        task.buffer.borrow_mut().write(data)?;
                        if let Some(abort) = task.abort_byte {
                            if data.contains(&abort) {
                                info!("abort byte seen, ending session");
                                return Ok(());
                            }
                        }
                    }
                    Err(Errno::EAGAIN) => {}
                    Err(Errno::ECONNRESET) => {
                        info!("connection reset by peer");
                        return Ok(());
                    }
                    Err(e) => return Err(io_error(e)),
                }
            }

            // Deferred removal keeps the passes above free of index
            // juggling.
            if dead.iter().any(|&d| d) {
                let mut keep = dead.iter().map(|&d| !d);
                self.streams.retain(|_| keep.next().unwrap());
            }
        }
    }
}

fn io_error(errno: Errno) -> TetherError {
    TetherError::Io(errno.into())
}

fn set_nonblocking(fd: BorrowedFd<'_>) -> Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(io_error)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(io_error)?;
    Ok(())
}
