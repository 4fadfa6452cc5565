use std::{fmt, str::FromStr};

use crate::error::DomainError;

/// Joins the two participants of a private room key on the wire.
pub const ROOM_KEY_SEPARATOR: char = '-';
/// Wire form of the public room.
pub const GLOBAL_ROOM: &str = "Global";
/// Older servers name the public room `All`; accepted on input only.
pub const LEGACY_GLOBAL_ROOM: &str = "All";
/// Sender name the server uses for its own announcements.
pub const SYSTEM_SENDER: &str = "System";

/// A user-chosen display name, trimmed and validated.
///
/// Names are unique only by convention. A name may not contain
/// [`ROOM_KEY_SEPARATOR`], otherwise private room keys could not be split
/// back into their participants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::EmptyIdentity);
        }
        if trimmed.contains(ROOM_KEY_SEPARATOR) {
            return Err(DomainError::SeparatorInIdentity(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The server's announcement sender, matched case-insensitively. Users
    /// cannot join under this name.
    pub fn is_system(&self) -> bool {
        self.0.eq_ignore_ascii_case(SYSTEM_SENDER)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The two participants of a private room, always stored in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    low: Identity,
    high: Identity,
}

impl PairKey {
    pub fn low(&self) -> &Identity {
        &self.low
    }

    pub fn high(&self) -> &Identity {
        &self.high
    }

    pub fn includes(&self, identity: &Identity) -> bool {
        &self.low == identity || &self.high == identity
    }

    /// The participant that is not `identity`, if `identity` takes part at all.
    pub fn peer_of(&self, identity: &Identity) -> Option<&Identity> {
        if &self.low == identity {
            Some(&self.high)
        } else if &self.high == identity {
            Some(&self.low)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum RoomKey {
    #[default]
    Global,
    Private(PairKey),
}

impl RoomKey {
    /// Order-independent key for the private room of `a` and `b`.
    pub fn canonical_pair(a: &Identity, b: &Identity) -> Result<Self, DomainError> {
        if a == b {
            return Err(DomainError::SelfPairing(a.to_string()));
        }
        let (low, high) = if a < b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };
        Ok(Self::Private(PairKey { low, high }))
    }

    /// Same as [`RoomKey::canonical_pair`] for raw names, trimming both first.
    pub fn canonical_pair_raw(a: &str, b: &str) -> Result<Self, DomainError> {
        Self::canonical_pair(&Identity::parse(a)?, &Identity::parse(b)?)
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private(_))
    }

    pub fn participants(&self) -> Option<(&Identity, &Identity)> {
        match self {
            Self::Global => None,
            Self::Private(pair) => Some((&pair.low, &pair.high)),
        }
    }

    pub fn pair(&self) -> Option<&PairKey> {
        match self {
            Self::Global => None,
            Self::Private(pair) => Some(pair),
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str(GLOBAL_ROOM),
            Self::Private(pair) => write!(f, "{}{ROOM_KEY_SEPARATOR}{}", pair.low, pair.high),
        }
    }
}

impl FromStr for RoomKey {
    type Err = DomainError;

    /// Parses the wire form, re-canonicalizing private keys so `bob-alice`
    /// and `alice-bob` yield the same key.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw == GLOBAL_ROOM || raw == LEGACY_GLOBAL_ROOM {
            return Ok(Self::Global);
        }

        let mut parts = raw.split(ROOM_KEY_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), None) if !a.trim().is_empty() && !b.trim().is_empty() => {
                Self::canonical_pair_raw(a, b)
                    .map_err(|_| DomainError::MalformedRoomKey(raw.to_string()))
            }
            _ => Err(DomainError::MalformedRoomKey(raw.to_string())),
        }
    }
}
