/// Proxy session states for the downloader
use std::fmt;

/// Represents the downloader's outbound proxy session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProxyState {
    /// No working proxy pinned; the next request must probe first
    #[default]
    Disconnected,

    /// Candidates are being tried against a reference link
    Probing,

    /// A proxy answered the reference link and is pinned on the session
    Connected,
}

impl ProxyState {
    /// Returns true if moving from `self` to `next` is a legal step
    ///
    /// Any state may drop back to `Disconnected`: a blocked response
    /// invalidates a connected session and an exhausted probe gives up.
    pub fn can_transition_to(&self, next: ProxyState) -> bool {
        use ProxyState::*;
        matches!(
            (self, next),
            (Disconnected, Probing) | (Probing, Connected) | (_, Disconnected)
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Probing => "probing",
            Self::Connected => "connected",
        };
        write!(f, "{}", name)
    }
}
