use serde::{Deserialize, Serialize};

/// Transport-assigned stable identifier for a destination.
pub type DestinationId = i64;

/// What kind of group-like entity a destination is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// Ordinary multi-user group.
    Group,
    /// Broadcast-capable group (supergroup / megagroup).
    Broadcast,
}

impl std::fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DestinationKind::Group => "group",
            DestinationKind::Broadcast => "broadcast",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DestinationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "group" => Ok(DestinationKind::Group),
            "broadcast" => Ok(DestinationKind::Broadcast),
            other => Err(format!("unknown destination kind: {other}")),
        }
    }
}

/// A group-like chat entity messages can be sent to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub id: DestinationId,
    /// Display name.
    pub title: String,
    pub kind: DestinationKind,
    /// Transport-declared slow-mode floor in seconds (0 = none).
    pub declared_cooldown_secs: u32,
    /// Seconds until this destination accepts another send. Re-armed by the
    /// engine on success, set to the signalled wait on a rate-limit error,
    /// decremented once per second by the control-side ticker.
    pub cooldown_remaining_secs: u32,
    /// Computed at refresh time from restriction/membership flags.
    pub eligible: bool,
    /// Operator denylist flag, merged from the store at refresh time.
    pub excluded: bool,
}

impl Destination {
    /// Whether this destination may ever be targeted by a send.
    pub fn sendable(&self) -> bool {
        self.eligible && !self.excluded
    }
}
