//! Fixed command names answered by the manager itself.

use strum::{Display, EnumString};

/// Commands handled without a registry lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SystemCommand {
    /// Liveness probe; always succeeds.
    Alive,
    /// Succeeds while the module reports itself busy.
    Busy,
    /// Succeeds once the module reports itself ready.
    Ready,
    /// A peer asks this module to terminate.
    Bye,
}

impl SystemCommand {
    /// Recognises a case-folded command name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        name.parse().ok()
    }
}
