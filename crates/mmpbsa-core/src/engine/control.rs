use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::mpsc::{Receiver, TryRecvError};
use tracing::debug;

/// An inbound message from the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    None,
    Suspend,
    Resume,
    Quit,
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlMessage::None => "none",
            ControlMessage::Suspend => "suspend",
            ControlMessage::Resume => "resume",
            ControlMessage::Quit => "quit",
        };
        f.write_str(name)
    }
}

impl FromStr for ControlMessage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "suspend" => Ok(ControlMessage::Suspend),
            "resume" => Ok(ControlMessage::Resume),
            "quit" => Ok(ControlMessage::Quit),
            other => Err(format!("unknown control message '{other}'")),
        }
    }
}

/// Source of host control messages, checked once per polling tick.
///
/// `poll` must return immediately; `ControlMessage::None` means nothing arrived.
pub trait ControlChannel {
    fn poll(&mut self) -> ControlMessage;

    /// True once the host can no longer send messages.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Standalone runs: the host never sends anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoControl;

impl ControlChannel for NoControl {
    fn poll(&mut self) -> ControlMessage {
        ControlMessage::None
    }
}

/// Messages delivered through a channel by another thread.
pub struct ChannelControl {
    rx: Receiver<ControlMessage>,
    disconnected: bool,
}

impl ChannelControl {
    pub fn new(rx: Receiver<ControlMessage>) -> Self {
        Self {
            rx,
            disconnected: false,
        }
    }
}

impl ControlChannel for ChannelControl {
    fn poll(&mut self) -> ControlMessage {
        if self.disconnected {
            return ControlMessage::None;
        }
        match self.rx.try_recv() {
            Ok(message) => message,
            Err(TryRecvError::Empty) => ControlMessage::None,
            Err(TryRecvError::Disconnected) => {
                debug!("Control channel closed; no further host messages.");
                self.disconnected = true;
                ControlMessage::None
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.disconnected
    }
}

/// A fixed sequence of messages, one per poll, then `None` forever.
#[derive(Debug, Default, Clone)]
pub struct ScriptedControl {
    script: VecDeque<ControlMessage>,
}

impl ScriptedControl {
    pub fn new(script: impl IntoIterator<Item = ControlMessage>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    /// Delivers `message` on the `tick`-th poll (zero-based).
    pub fn at_tick(tick: usize, message: ControlMessage) -> Self {
        let mut script = vec![ControlMessage::None; tick];
        script.push(message);
        Self::new(script)
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl ControlChannel for ScriptedControl {
    fn poll(&mut self) -> ControlMessage {
        self.script.pop_front().unwrap_or(ControlMessage::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn control_message_parses_case_insensitively() {
        assert_eq!("Suspend".parse::<ControlMessage>(), Ok(ControlMessage::Suspend));
        assert_eq!(" quit\n".parse::<ControlMessage>(), Ok(ControlMessage::Quit));
        assert_eq!("RESUME".parse::<ControlMessage>(), Ok(ControlMessage::Resume));
        assert!("pause".parse::<ControlMessage>().is_err());
    }

    #[test]
    fn channel_control_returns_none_when_empty_or_closed() {
        let (tx, rx) = mpsc::channel();
        let mut control = ChannelControl::new(rx);
        assert_eq!(control.poll(), ControlMessage::None);

        tx.send(ControlMessage::Suspend).unwrap();
        tx.send(ControlMessage::Quit).unwrap();
        assert_eq!(control.poll(), ControlMessage::Suspend);
        assert_eq!(control.poll(), ControlMessage::Quit);

        assert!(!control.is_closed());
        drop(tx);
        assert_eq!(control.poll(), ControlMessage::None);
        assert_eq!(control.poll(), ControlMessage::None);
        assert!(control.is_closed());
    }

    #[test]
    fn scripted_control_delivers_at_requested_tick() {
        let mut control = ScriptedControl::at_tick(2, ControlMessage::Quit);
        assert_eq!(control.poll(), ControlMessage::None);
        assert_eq!(control.poll(), ControlMessage::None);
        assert_eq!(control.poll(), ControlMessage::Quit);
        assert_eq!(control.remaining(), 0);
        assert_eq!(control.poll(), ControlMessage::None);
    }
}
