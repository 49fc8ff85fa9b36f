//! Deterministic room identifiers for one-to-one chat channels.

use std::fmt;

/// Identifier of a real-time chat room shared by exactly two users.
///
/// Derived from the two usernames: sorted lexicographically and joined
/// with `_`, so both participants compute the same id regardless of who
/// opens the conversation.
///
/// Usernames must not contain `_`, the separator — registration enforces
/// this. A username with an underscore would make [`RoomId::involves`]
/// ambiguous: the id `a_b_c` could encode `a` + `b_c` or `a_b` + `c`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(String);

impl RoomId {
    /// Derive the room id for a pair of usernames.
    #[must_use]
    pub fn for_pair(a: &str, b: &str) -> Self {
        let mut names = [a, b];
        names.sort_unstable();
        Self(format!("{}_{}", names[0], names[1]))
    }

    /// Wrap a raw room id received over the wire, e.g. from a socket path.
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        Self(raw.to_string())
    }

    /// Whether a username is one of the pair encoded in this id.
    #[must_use]
    pub fn involves(&self, username: &str) -> bool {
        self.0.strip_prefix(username).is_some_and(|r| r.starts_with('_'))
            || self.0.strip_suffix(username).is_some_and(|r| r.ends_with('_'))
    }

    /// Return the string representation of this room id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
