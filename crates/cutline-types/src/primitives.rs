use facet::Facet;
use std::fmt;
use std::str::FromStr;

/// Identity of one logical process in a cluster.
#[derive(Facet, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[facet(transparent)]
pub struct ProcessId(pub u32);

impl ProcessId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl From<u32> for ProcessId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Opaque application payload carried by a message.
#[derive(Facet, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[facet(transparent)]
pub struct Payload(pub String);

impl Payload {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lai-Yang colour piggybacked on application messages.
///
/// A process is `White` until it records its local state, `Red` afterwards.
#[derive(Facet, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum Color {
    #[default]
    White,
    Red,
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::White => f.write_str("white"),
            Self::Red => f.write_str("red"),
        }
    }
}

/// Recording status of one incoming channel within a session.
///
/// Moves `Open -> Closed` once per session and never back.
#[derive(Facet, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum ChannelStatus {
    Open,
    Closed,
}

/// Which capture algorithm every process in a cluster runs.
#[derive(Facet, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Chandy-Lamport: explicit markers flushed through every channel.
    #[default]
    Marker,
    /// Lai-Yang: colour tags piggybacked on application messages.
    Color,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Marker => f.write_str("marker"),
            Self::Color => f.write_str("color"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStrategyKind(pub String);

impl fmt::Display for UnknownStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown snapshot strategy '{}' (expected 'marker' or 'color')",
            self.0
        )
    }
}

impl std::error::Error for UnknownStrategyKind {}

impl FromStr for StrategyKind {
    type Err = UnknownStrategyKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "marker" | "chandy-lamport" | "chandy_lamport" => Ok(Self::Marker),
            "color" | "colour" | "lai-yang" | "lai_yang" => Ok(Self::Color),
            _ => Err(UnknownStrategyKind(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_kind_accepts_algorithm_names() {
        assert_eq!("marker".parse::<StrategyKind>(), Ok(StrategyKind::Marker));
        assert_eq!(
            "Chandy-Lamport".parse::<StrategyKind>(),
            Ok(StrategyKind::Marker)
        );
        assert_eq!("lai-yang".parse::<StrategyKind>(), Ok(StrategyKind::Color));
        assert_eq!(" colour ".parse::<StrategyKind>(), Ok(StrategyKind::Color));
        assert!("paxos".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn process_id_displays_with_prefix() {
        assert_eq!(ProcessId(3).to_string(), "P3");
    }
}
