use facet::Facet;

use crate::{Color, Payload, ProcessId};

/// Application-level message travelling on a channel.
#[derive(Facet, Clone, Debug, PartialEq, Eq)]
pub struct AppMessage {
    pub from: ProcessId,
    pub payload: Payload,
    /// Sender's colour at send time. Always present under the colour
    /// strategy, always absent under the marker strategy.
    pub color: Option<Color>,
}

impl AppMessage {
    pub fn plain(from: ProcessId, payload: impl Into<Payload>) -> Self {
        Self {
            from,
            payload: payload.into(),
            color: None,
        }
    }

    pub fn colored(from: ProcessId, payload: impl Into<Payload>, color: Color) -> Self {
        Self {
            from,
            payload: payload.into(),
            color: Some(color),
        }
    }
}

/// Protocol traffic that is not part of the application.
#[derive(Facet, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum ControlSignal {
    /// Chandy-Lamport marker delimiting pre-cut from post-cut traffic.
    Marker { initiator: ProcessId },
}

/// Everything a channel can carry.
#[derive(Facet, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum Envelope {
    Application(AppMessage),
    Control(ControlSignal),
}

impl From<AppMessage> for Envelope {
    fn from(value: AppMessage) -> Self {
        Self::Application(value)
    }
}

impl From<ControlSignal> for Envelope {
    fn from(value: ControlSignal) -> Self {
        Self::Control(value)
    }
}
