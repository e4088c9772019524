//! Frame kind enumeration and direction gating.
//!
//! The set of kinds a parser accepts depends on which endpoint produced
//! the frame, so token resolution is always paired with an [`Origin`].

use std::fmt;

/// Which endpoint produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A frame sent by a chat client to the broker.
    Client,
    /// A frame sent by the broker to a chat client.
    Server,
}

/// The enumerated tag of a frame.
///
/// `ChatMssg` is the only kind valid in both directions; every other kind
/// belongs to exactly one. [`FrameKind::from_token`] enforces the split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Client request to register a display name.
    SetUsr,
    /// A chat message: client to broker, and broker fan-out to clients.
    ChatMssg,
    /// Client request for an orderly disconnect.
    ExitChat,
    /// Server: connection admitted, a display name may now be registered.
    StateUpg1,
    /// Server: name accepted, the client may chat.
    StateUpg2,
    /// Server: the requested name is already in use.
    SetUsrConflict,
    /// Server: the connection is being terminated.
    Disconnect,
}

impl FrameKind {
    /// The token as it appears in the 32-byte KIND field.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::SetUsr => "SET_USR",
            Self::ChatMssg => "CHAT_MSSG",
            Self::ExitChat => "EXIT_CHAT",
            Self::StateUpg1 => "STATE_UPG_1",
            Self::StateUpg2 => "STATE_UPG_2",
            Self::SetUsrConflict => "SET_USR_CONFLICT",
            Self::Disconnect => "DISCONNECT",
        }
    }

    /// Resolves a trimmed KIND token against the table for `origin`.
    ///
    /// A token that belongs only to the opposite direction resolves to
    /// `None`, exactly like an unknown token.
    #[must_use]
    pub fn from_token(token: &str, origin: Origin) -> Option<Self> {
        match (origin, token) {
            (Origin::Client, "SET_USR") => Some(Self::SetUsr),
            (Origin::Client, "EXIT_CHAT") => Some(Self::ExitChat),
            (Origin::Server, "STATE_UPG_1") => Some(Self::StateUpg1),
            (Origin::Server, "STATE_UPG_2") => Some(Self::StateUpg2),
            (Origin::Server, "SET_USR_CONFLICT") => Some(Self::SetUsrConflict),
            (Origin::Server, "DISCONNECT") => Some(Self::Disconnect),
            (Origin::Client | Origin::Server, "CHAT_MSSG") => Some(Self::ChatMssg),
            _ => None,
        }
    }

    /// Kinds that must carry a NAME field.
    ///
    /// No kind takes an optional name: a kind either requires one or
    /// rejects one.
    #[must_use]
    pub const fn requires_name(self) -> bool {
        matches!(
            self,
            Self::SetUsr | Self::ChatMssg | Self::StateUpg2 | Self::SetUsrConflict
        )
    }

    /// Kinds that must carry a non-empty BODY.
    #[must_use]
    pub const fn requires_body(self) -> bool {
        matches!(self, Self::ChatMssg)
    }

    /// Kinds that tolerate a BODY without requiring one.
    ///
    /// `SET_USR` carries the name in the NAME field; a body on it is
    /// ignored by the broker but is not a protocol violation.
    #[must_use]
    pub const fn allows_body(self) -> bool {
        matches!(self, Self::ChatMssg | Self::SetUsr)
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
