use mmpbsa::engine::control::{ChannelControl, ControlMessage};
use std::io::{self, BufRead};
use std::sync::mpsc;
use std::thread;
use tracing::{debug, warn};

/// Reads one control message per line on a background thread. Blank lines are
/// ignored; unrecognised lines are logged and skipped.
pub fn spawn_reader_control<R>(reader: R) -> ChannelControl
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Stopped reading control messages: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<ControlMessage>() {
                Ok(message) => {
                    debug!(%message, "Control message received.");
                    if tx.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Ignoring control input: {}", e),
            }
        }
    });
    ChannelControl::new(rx)
}

pub fn spawn_stdin_control() -> ChannelControl {
    spawn_reader_control(io::BufReader::new(io::stdin()))
}
