// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity references and the token codec.
//!
//! A taggable location inside the store is identified by an [`EntityRef`]:
//! the container key, the kind of member ([`MemberKind`]) and, for everything
//! except plain string keys, the member payload (hash field name, set member,
//! sorted-set member).
//!
//! Tag sets hold these references as flat string *tokens* so that the index
//! lives in ordinary store sets. The codec is a pure string transform:
//!
//! - `StringKey` → the container key itself, unchanged. Plain keys stay
//!   directly usable as lookup keys, which keeps existing callers working.
//! - Everything else → `container ++ ":$_<k>_$:" ++ payload`, where `<k>` is
//!   a one-character kind marker (`h`, `s`, `z`, `g`).
//!
//! The marker sequence is chosen to be vanishingly unlikely in real key
//! names. It is still a fixed delimiter, not an escape-proof encoding: a
//! container key that happens to contain a marker sequence will mis-split on
//! decode, and a token written into a tag set by hand is indistinguishable
//! from one produced here. Cleanup-mode reads converge on the truth either
//! way, because every decoded reference is existence-checked against the
//! store before it is trusted.

use std::fmt;

use thiserror::Error;

/// Opening fragment of the kind marker, `":$_"`.
const MARKER_OPEN: &str = ":$_";
/// Closing fragment of the kind marker, `"_$:"`.
const MARKER_CLOSE: &str = "_$:";

/// The category of taggable location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// A top-level string key. The token is the key itself.
    StringKey,
    /// A field inside a hash.
    HashField,
    /// A member of a set.
    SetMember,
    /// A member of a sorted set.
    SortedSetMember,
    /// A member of a geo set (a sorted set under the hood).
    GeoMember,
}

impl MemberKind {
    /// One-character marker embedded in composite tokens.
    /// `StringKey` has none: its token carries no separator at all.
    fn marker(self) -> Option<char> {
        match self {
            Self::StringKey => None,
            Self::HashField => Some('h'),
            Self::SetMember => Some('s'),
            Self::SortedSetMember => Some('z'),
            Self::GeoMember => Some('g'),
        }
    }

    fn from_marker(c: char) -> Option<Self> {
        match c {
            'h' => Some(Self::HashField),
            's' => Some(Self::SetMember),
            'z' => Some(Self::SortedSetMember),
            'g' => Some(Self::GeoMember),
            _ => None,
        }
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StringKey => write!(f, "string-key"),
            Self::HashField => write!(f, "hash-field"),
            Self::SetMember => write!(f, "set-member"),
            Self::SortedSetMember => write!(f, "sorted-set-member"),
            Self::GeoMember => write!(f, "geo-member"),
        }
    }
}

/// A token that could not be decoded into an [`EntityRef`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed entity token {token:?}: {reason}")]
pub struct InvalidToken {
    /// The offending token, verbatim.
    pub token: String,
    /// What made it undecodable.
    pub reason: &'static str,
}

/// Identifies one taggable location: `(container key, member kind, payload)`.
///
/// The triple uniquely identifies a location, and [`encode`](Self::encode) /
/// [`decode`](Self::decode) map it to and from a single token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    /// Top-level key name in the store.
    pub container_key: String,
    /// What kind of location inside the container.
    pub kind: MemberKind,
    /// Field name or member value; `None` only for [`MemberKind::StringKey`].
    pub member: Option<String>,
}

impl EntityRef {
    /// Reference a plain string key.
    pub fn string_key(key: impl Into<String>) -> Self {
        Self {
            container_key: key.into(),
            kind: MemberKind::StringKey,
            member: None,
        }
    }

    /// Reference a field inside a hash.
    pub fn hash_field(key: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            container_key: key.into(),
            kind: MemberKind::HashField,
            member: Some(field.into()),
        }
    }

    /// Reference a set member.
    pub fn set_member(key: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            container_key: key.into(),
            kind: MemberKind::SetMember,
            member: Some(member.into()),
        }
    }

    /// Reference a sorted-set member.
    pub fn sorted_set_member(key: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            container_key: key.into(),
            kind: MemberKind::SortedSetMember,
            member: Some(member.into()),
        }
    }

    /// Reference a geo-set member.
    pub fn geo_member(key: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            container_key: key.into(),
            kind: MemberKind::GeoMember,
            member: Some(member.into()),
        }
    }

    /// Encode this reference into its index token.
    ///
    /// Pure and deterministic; no store access. The inverse of
    /// [`decode`](Self::decode) for every reference whose container key does
    /// not itself contain a marker sequence.
    #[must_use]
    pub fn encode(&self) -> String {
        match self.kind.marker() {
            None => self.container_key.clone(),
            Some(m) => {
                let member = self.member.as_deref().unwrap_or("");
                format!(
                    "{}{}{}{}{}",
                    self.container_key, MARKER_OPEN, m, MARKER_CLOSE, member
                )
            }
        }
    }

    /// Decode a token back into a reference.
    ///
    /// Splits at the *first* well-formed marker sequence. A token without any
    /// marker is a `StringKey` reference to the whole token. Fails only when
    /// a marker is present but the container part before it is empty.
    pub fn decode(token: &str) -> Result<Self, InvalidToken> {
        for (idx, _) in token.match_indices(MARKER_OPEN) {
            let rest = &token[idx + MARKER_OPEN.len()..];
            let mut chars = rest.chars();
            let Some(marker) = chars.next() else { continue };
            let Some(kind) = MemberKind::from_marker(marker) else {
                continue;
            };
            if !chars.as_str().starts_with(MARKER_CLOSE) {
                continue;
            }
            if idx == 0 {
                return Err(InvalidToken {
                    token: token.to_string(),
                    reason: "empty container key before kind marker",
                });
            }
            let payload = &rest[marker.len_utf8() + MARKER_CLOSE.len()..];
            return Ok(Self {
                container_key: token[..idx].to_string(),
                kind,
                member: Some(payload.to_string()),
            });
        }
        Ok(Self::string_key(token))
    }
}

// Display is for logs and error messages; the wire form is encode().
impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.member {
            None => write!(f, "{} {}", self.kind, self.container_key),
            Some(m) => write!(f, "{} {}[{}]", self.kind, self.container_key, m),
        }
    }
}

/// One primary-store write plus the reference it creates.
///
/// [`set_with_tags`](crate::TagCache::set_with_tags) takes this instead of a
/// bare [`EntityRef`] because the written datum differs per kind: string keys
/// and hash fields carry a value, set members *are* the value, sorted-set
/// members carry a score. Geo members have no variant here - geo writes
/// belong to the geospatial layer; tag an existing geo member with
/// [`add_tags_to_entity`](crate::TagCache::add_tags_to_entity).
#[derive(Debug, Clone, Copy)]
pub enum EntityWrite<'a> {
    /// `SET key value`
    String { key: &'a str, value: &'a str },
    /// `HSET key field value`
    HashField {
        key: &'a str,
        field: &'a str,
        value: &'a str,
    },
    /// `SADD key member`
    SetMember { key: &'a str, member: &'a str },
    /// `ZADD key score member`
    SortedSetMember {
        key: &'a str,
        member: &'a str,
        score: f64,
    },
}

impl EntityWrite<'_> {
    /// The reference this write creates or overwrites.
    #[must_use]
    pub fn entity_ref(&self) -> EntityRef {
        match *self {
            Self::String { key, .. } => EntityRef::string_key(key),
            Self::HashField { key, field, .. } => EntityRef::hash_field(key, field),
            Self::SetMember { key, member } => EntityRef::set_member(key, member),
            Self::SortedSetMember { key, member, .. } => {
                EntityRef::sorted_set_member(key, member)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_key_token_is_the_key() {
        let r = EntityRef::string_key("user:42");
        assert_eq!(r.encode(), "user:42");
        assert_eq!(EntityRef::decode("user:42").unwrap(), r);
    }

    #[test]
    fn test_hash_field_round_trip() {
        let r = EntityRef::hash_field("session:9", "last_seen");
        let token = r.encode();
        assert_eq!(token, "session:9:$_h_$:last_seen");
        assert_eq!(EntityRef::decode(&token).unwrap(), r);
    }

    #[test]
    fn test_all_member_kinds_round_trip() {
        let refs = [
            EntityRef::set_member("online", "alice"),
            EntityRef::sorted_set_member("leaderboard", "bob"),
            EntityRef::geo_member("stores", "London"),
        ];
        for r in refs {
            assert_eq!(EntityRef::decode(&r.encode()).unwrap(), r);
        }
    }

    #[test]
    fn test_no_collision_between_key_and_member_tokens() {
        // A string-key token for K never equals a member token rooted at K.
        let plain = EntityRef::string_key("K").encode();
        let field = EntityRef::hash_field("K", "f").encode();
        let member = EntityRef::set_member("K", "f").encode();
        assert_ne!(plain, field);
        assert_ne!(plain, member);
        assert_ne!(field, member);
    }

    #[test]
    fn test_empty_payload_is_valid() {
        // Redis allows an empty hash field name; so does the codec.
        let r = EntityRef::hash_field("h", "");
        assert_eq!(EntityRef::decode(&r.encode()).unwrap(), r);
    }

    #[test]
    fn test_unknown_marker_falls_back_to_string_key() {
        // ":$_q_$:" is not a kind marker, so the whole token is a plain key.
        let decoded = EntityRef::decode("k:$_q_$:x").unwrap();
        assert_eq!(decoded.kind, MemberKind::StringKey);
        assert_eq!(decoded.container_key, "k:$_q_$:x");
    }

    #[test]
    fn test_marker_at_start_is_malformed() {
        let err = EntityRef::decode(":$_h_$:field").unwrap_err();
        assert_eq!(err.token, ":$_h_$:field");
    }

    #[test]
    fn test_first_marker_wins() {
        // Payload may itself contain a marker sequence; decode splits at the
        // first one and leaves the remainder in the payload.
        let decoded = EntityRef::decode("k:$_s_$:a:$_s_$:b").unwrap();
        assert_eq!(decoded.container_key, "k");
        assert_eq!(decoded.kind, MemberKind::SetMember);
        assert_eq!(decoded.member.as_deref(), Some("a:$_s_$:b"));
    }

    #[test]
    fn test_container_with_marker_missplits() {
        // Documented delimiter collision: a container key containing the
        // marker sequence does not survive a round trip.
        let r = EntityRef::hash_field("weird:$_s_$:key", "f");
        let decoded = EntityRef::decode(&r.encode()).unwrap();
        assert_ne!(decoded, r);
        assert_eq!(decoded.container_key, "weird");
    }

    #[test]
    fn test_write_entity_refs() {
        let w = EntityWrite::HashField {
            key: "h",
            field: "f",
            value: "v",
        };
        assert_eq!(w.entity_ref(), EntityRef::hash_field("h", "f"));

        let w = EntityWrite::SortedSetMember {
            key: "z",
            member: "m",
            score: 1.5,
        };
        assert_eq!(w.entity_ref(), EntityRef::sorted_set_member("z", "m"));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            format!("{}", EntityRef::string_key("k")),
            "string-key k"
        );
        assert_eq!(
            format!("{}", EntityRef::hash_field("h", "f")),
            "hash-field h[f]"
        );
    }
}
