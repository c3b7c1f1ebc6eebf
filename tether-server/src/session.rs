//! Per-connection session drivers
//!
//! Three ways to serve an accepted connection: bridge it to our own
//! stdin/stdout, proxy it to a TCP target, or run a command on a
//! freshly allocated pty. Only the pty mode speaks the control
//! protocol: the peer's window-size frames are applied to the pty and
//! everything else passes through.

use std::io;
use std::net::TcpStream;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::rc::Rc;

use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use tracing::{debug, warn};

use tether_protocol::{ControlHandler, StreamBuffer};
use tether_relay::{shared, Shuffler};
use tether_utils::{BtAddr, Result, TetherError};

/// Bridge the connection to this process's stdin/stdout.
pub fn run_stdio(conn: &OwnedFd) -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();

    let mut shuffler = Shuffler::new();
    shuffler.register_raw_copy(stdin.as_fd(), conn.as_fd());
    shuffler.register_raw_copy(conn.as_fd(), stdout.as_fd());
    shuffler.run()
}

/// Bridge the connection to a TCP target.
pub fn run_proxy(conn: &OwnedFd, target: &str) -> Result<()> {
    let stream = TcpStream::connect(target)
        .map_err(|e| TetherError::connection(format!("{}: {}", target, e)))?;
    debug!("proxying to {}", target);

    let mut shuffler = Shuffler::new();
    shuffler.register_raw_copy(conn.as_fd(), stream.as_fd());
    shuffler.register_raw_copy(stream.as_fd(), conn.as_fd());
    shuffler.run()
}

/// Control frames from the peer, applied to the local pty.
struct PtyControl {
    master: Rc<Box<dyn MasterPty>>,
}

impl ControlHandler for PtyControl {
    fn window_size(&mut self, rows: u16, cols: u16) {
        debug!("peer window size {}x{}", cols, rows);
        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        if let Err(e) = self.master.resize(size) {
            warn!("pty resize failed: {}", e);
        }
    }

    fn ping(&mut self, cookie: u32) {
        debug!("ping {:#010x}", cookie);
    }

    fn pong(&mut self, cookie: u32) {
        debug!("pong {:#010x}", cookie);
    }
}

/// Substitute the peer address for "{addr}" in exec arguments.
fn substitute_args(command: &[String], addr: &str) -> Vec<String> {
    command
        .iter()
        .map(|arg| arg.replace("{addr}", addr))
        .collect()
}

/// Run `command` on a pty and bridge it to the connection.
///
/// Returns the child's exit code once both the session and the child
/// are done.
pub fn run_exec(conn: &OwnedFd, peer: BtAddr, command: &[String]) -> Result<i32> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| TetherError::pty(format!("Failed to open PTY: {}", e)))?;

    let argv = substitute_args(command, &peer.to_string());
    let mut cmd = CommandBuilder::new(&argv[0]);
    cmd.args(&argv[1..]);

    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| TetherError::ProcessSpawn(format!("{}: {}", argv[0], e)))?;
    drop(pair.slave);

    let master: Rc<Box<dyn MasterPty>> = Rc::new(pair.master);
    let master_raw = master
        .as_raw_fd()
        .ok_or_else(|| TetherError::pty("PTY master has no file descriptor"))?;
    // SAFETY: `master` stays alive past the shuffler below, which is
    // the only user of this descriptor.
    let master_fd = unsafe { BorrowedFd::borrow_raw(master_raw) };

    let rx = shared(StreamBuffer::decoder(Box::new(PtyControl {
        master: master.clone(),
    })));

    let mut shuffler = Shuffler::new();
    shuffler.register_raw_copy(master_fd, conn.as_fd());
    shuffler.register_copy(conn.as_fd(), master_fd, rx, None);
    let session = shuffler.run();

    // Closing the master hangs up the child's terminal, so the wait
    // below terminates even if the peer vanished mid-session.
    drop(shuffler);
    drop(master);
    let status = child
        .wait()
        .map_err(|e| TetherError::pty(format!("wait for child: {}", e)))?;
    let code = status.exit_code() as i32;
    if !status.success() {
        warn!("{} child exited with code {}", peer, code);
    }

    session.map(|()| code)
}
