//! Session wiring for the interactive client
//!
//! Terminal→socket carries the control channel (escaped payload plus
//! window-size frames); socket→terminal is plain payload.

use std::io;
use std::os::fd::AsFd;
use std::rc::Rc;

use tracing::{debug, info};

use tether_protocol::StreamBuffer;
use tether_relay::{shared, SharedBuffer, Shuffler, WatchControl};
use tether_utils::{rfcomm, Result, SignalPipe};

use crate::cli::Args;
use crate::terminal::RawModeGuard;

pub fn run(args: &Args) -> Result<()> {
    let sock = rfcomm::connect(args.destination, args.channel)?;
    info!(
        "connected to {} channel {}",
        args.destination, args.channel
    );

    let winch = Rc::new(SignalPipe::install()?);
    let _raw_mode = RawModeGuard::new()?;

    let stdin = io::stdin();
    let stdout = io::stdout();

    let tx = shared(StreamBuffer::encoder());
    // Tell the remote our size right away instead of waiting for the
    // first resize.
    stage_window_size(&tx);

    let mut shuffler = Shuffler::new();
    shuffler.register_copy(stdin.as_fd(), sock.as_fd(), tx.clone(), args.escape_char.0);
    shuffler.register_raw_copy(sock.as_fd(), stdout.as_fd());

    let winch_watch = winch.clone();
    let tx_watch = tx.clone();
    shuffler.register_watcher(winch.as_fd(), move || {
        winch_watch.drain();
        stage_window_size(&tx_watch);
        Ok(WatchControl::Continue)
    });

    shuffler.run()
}

fn stage_window_size(tx: &SharedBuffer) {
    match crossterm::terminal::size() {
        Ok((cols, rows)) => {
            debug!("window size {}x{}", cols, rows);
            if let Some(encoder) = tx.borrow_mut().as_encoder_mut() {
                encoder.window_size(rows, cols);
            }
        }
        Err(e) => debug!("terminal size unavailable: {}", e),
    }
}
