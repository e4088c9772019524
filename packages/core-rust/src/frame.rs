//! Build and parse for the fixed-width text envelope.
//!
//! One frame is one transport message:
//!
//! ```text
//! tmp://<KIND:32>::/<NAME:20>::/<BODY:*>
//! ```
//!
//! The first 64 bytes are structural: the `tmp://` prefix, the 32-byte
//! space-padded KIND field, a `::/` marker, the 20-byte space-padded NAME
//! field, and a second `::/` marker. Everything from byte 64 on is the
//! body. Field widths are byte widths, not display widths, so a multi-byte
//! UTF-8 name still keeps the body anchored at byte 64.

use crate::kind::{FrameKind, Origin};

/// Byte length of the structural header.
pub const HEADER_LEN: usize = 64;
/// Maximum NAME length in bytes, after trimming.
pub const MAX_NAME_LEN: usize = 20;

const PREFIX: &str = "tmp://";
const MARKER: &str = "::/";
const KIND_WIDTH: usize = 32;
const KIND_FIELD: std::ops::Range<usize> = 6..38;
const FIRST_MARKER: std::ops::Range<usize> = 38..41;
const NAME_FIELD: std::ops::Range<usize> = 41..61;
const SECOND_MARKER: std::ops::Range<usize> = 61..64;

/// Why a message failed to build or parse as a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The message is shorter than the 64-byte structural header.
    #[error("message is {len} bytes, shorter than the {HEADER_LEN}-byte header")]
    Truncated { len: usize },
    /// A structural literal is missing or malformed at the given offset.
    #[error("missing structural marker at byte {offset}")]
    BadMarker { offset: usize },
    /// The trimmed KIND token is not in the table for the stated origin.
    #[error("unknown kind token {token:?}")]
    UnknownKind { token: String },
    /// A field slice did not fall on a UTF-8 boundary.
    #[error("field at byte {offset} is not valid UTF-8")]
    InvalidFieldEncoding { offset: usize },
    /// The kind requires a name and none was supplied.
    #[error("{kind} requires a name")]
    MissingName { kind: FrameKind },
    /// The kind takes no name but one was supplied.
    #[error("{kind} does not take a name")]
    UnexpectedName { kind: FrameKind },
    /// The kind requires a body and none was supplied.
    #[error("{kind} requires a body")]
    MissingBody { kind: FrameKind },
    /// The kind takes no body but one was supplied.
    #[error("{kind} does not take a body")]
    UnexpectedBody { kind: FrameKind },
    /// The trimmed name exceeds the 20-byte field.
    #[error("name is {len} bytes, above the {MAX_NAME_LEN}-byte limit")]
    NameTooLong { len: usize },
}

/// An immutable, validity-checked protocol frame.
///
/// Constructed only through [`Frame::new`] or [`Frame::parse`], so a
/// `Frame` value always satisfies the per-kind field rules: a `SET_USR`
/// always has a name, a `DISCONNECT` never does, and so on.
///
/// Absent fields are normalized: an all-space NAME parses to `None`, and
/// an empty BODY parses to `None`. Encoding maps them back, so
/// `parse(raw).encode() == raw` for every frame the broker accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
    name: Option<String>,
    body: Option<String>,
}

impl Frame {
    /// Builds a frame from parts, applying trim, absence normalization,
    /// and the per-kind field rules.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::NameTooLong`] when the trimmed name exceeds
    /// 20 bytes, and a missing/unexpected field error when the parts do
    /// not match what `kind` requires.
    pub fn new(
        kind: FrameKind,
        name: Option<&str>,
        body: Option<&str>,
    ) -> Result<Self, FrameError> {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned);
        if let Some(n) = &name {
            if n.len() > MAX_NAME_LEN {
                return Err(FrameError::NameTooLong { len: n.len() });
            }
        }
        let body = body.filter(|b| !b.is_empty()).map(str::to_owned);
        Self::validated(kind, name, body)
    }

    /// Parses one transport message with the kind table for `origin`.
    ///
    /// # Errors
    ///
    /// Fails on a short message, a malformed structural literal, a kind
    /// token unknown for `origin`, a field that is not valid UTF-8, or a
    /// per-kind field rule violation.
    pub fn parse(raw: &str, origin: Origin) -> Result<Self, FrameError> {
        let bytes = raw.as_bytes();
        if bytes.len() < HEADER_LEN {
            return Err(FrameError::Truncated { len: bytes.len() });
        }
        if &bytes[..PREFIX.len()] != PREFIX.as_bytes() {
            return Err(FrameError::BadMarker { offset: 0 });
        }
        if &bytes[FIRST_MARKER] != MARKER.as_bytes() {
            return Err(FrameError::BadMarker {
                offset: FIRST_MARKER.start,
            });
        }
        if &bytes[SECOND_MARKER] != MARKER.as_bytes() {
            return Err(FrameError::BadMarker {
                offset: SECOND_MARKER.start,
            });
        }

        let token = field_str(bytes, KIND_FIELD)?.trim();
        let kind = FrameKind::from_token(token, origin).ok_or_else(|| {
            FrameError::UnknownKind {
                token: token.to_owned(),
            }
        })?;

        let name = match field_str(bytes, NAME_FIELD)?.trim() {
            "" => None,
            trimmed => Some(trimmed.to_owned()),
        };
        let body = match field_str(bytes, HEADER_LEN..bytes.len())? {
            "" => None,
            text => Some(text.to_owned()),
        };

        Self::validated(kind, name, body)
    }

    /// Checks the per-kind field rules on already-normalized parts.
    fn validated(
        kind: FrameKind,
        name: Option<String>,
        body: Option<String>,
    ) -> Result<Self, FrameError> {
        if name.is_some() && !kind.requires_name() {
            return Err(FrameError::UnexpectedName { kind });
        }
        if name.is_none() && kind.requires_name() {
            return Err(FrameError::MissingName { kind });
        }
        if body.is_some() && !kind.allows_body() {
            return Err(FrameError::UnexpectedBody { kind });
        }
        if body.is_none() && kind.requires_body() {
            return Err(FrameError::MissingBody { kind });
        }
        Ok(Self { kind, name, body })
    }

    /// Encodes the frame as one transport message.
    ///
    /// Padding is computed in bytes so the markers always land at their
    /// structural offsets.
    #[must_use]
    pub fn encode(&self) -> String {
        let token = self.kind.token();
        let name = self.name.as_deref().unwrap_or("");
        let body = self.body.as_deref().unwrap_or("");

        let mut out = String::with_capacity(HEADER_LEN + body.len());
        out.push_str(PREFIX);
        out.push_str(token);
        out.push_str(&" ".repeat(KIND_WIDTH - token.len()));
        out.push_str(MARKER);
        out.push_str(name);
        out.push_str(&" ".repeat(MAX_NAME_LEN - name.len()));
        out.push_str(MARKER);
        out.push_str(body);
        out
    }

    /// The frame's kind tag.
    #[must_use]
    pub const fn kind(&self) -> FrameKind {
        self.kind
    }

    /// The NAME field, absent when the wire field was all spaces.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The BODY, absent when nothing followed the header.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// The admission greeting. Carries no fields, so it cannot fail.
    #[must_use]
    pub const fn state_upg_1() -> Self {
        Self {
            kind: FrameKind::StateUpg1,
            name: None,
            body: None,
        }
    }

    /// The termination notice. Carries no fields, so it cannot fail.
    #[must_use]
    pub const fn disconnect() -> Self {
        Self {
            kind: FrameKind::Disconnect,
            name: None,
            body: None,
        }
    }
}

/// Borrows a byte range of the message as `&str`.
///
/// The message arrived as valid UTF-8, but a fixed byte offset can still
/// split a multi-byte character; that is a framing error, not a panic.
fn field_str(bytes: &[u8], range: std::ops::Range<usize>) -> Result<&str, FrameError> {
    let offset = range.start;
    std::str::from_utf8(&bytes[range])
        .map_err(|_| FrameError::InvalidFieldEncoding { offset })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Builds a wire string by hand, independent of `encode`.
    fn wire(token: &str, name: &str, body: &str) -> String {
        format!("tmp://{token:<32}::/{name:<20}::/{body}")
    }

    // ---- Build ----

    #[test]
    fn encode_pads_kind_and_name_fields() {
        let frame = Frame::new(FrameKind::SetUsr, Some("alice"), None).unwrap();
        assert_eq!(frame.encode(), wire("SET_USR", "alice", ""));
    }

    #[test]
    fn encode_without_name_emits_twenty_spaces() {
        let raw = Frame::state_upg_1().encode();
        assert_eq!(raw, wire("STATE_UPG_1", "", ""));
        assert_eq!(raw.len(), HEADER_LEN);
        assert_eq!(&raw[41..61], " ".repeat(20));
    }

    #[test]
    fn encode_places_markers_at_structural_offsets() {
        let frame = Frame::new(FrameKind::ChatMssg, Some("alice"), Some("hi")).unwrap();
        let raw = frame.encode();
        assert_eq!(&raw[..6], "tmp://");
        assert_eq!(&raw[38..41], "::/");
        assert_eq!(&raw[61..64], "::/");
        assert_eq!(&raw[64..], "hi");
    }

    #[test]
    fn build_trims_name() {
        let frame = Frame::new(FrameKind::SetUsr, Some("  alice  "), None).unwrap();
        assert_eq!(frame.name(), Some("alice"));
    }

    #[test]
    fn build_rejects_twenty_one_byte_name() {
        let name = "a".repeat(21);
        let err = Frame::new(FrameKind::SetUsr, Some(&name), None).unwrap_err();
        assert_eq!(err, FrameError::NameTooLong { len: 21 });
    }

    #[test]
    fn build_accepts_twenty_byte_name() {
        let name = "a".repeat(20);
        let frame = Frame::new(FrameKind::SetUsr, Some(&name), None).unwrap();
        assert_eq!(frame.name(), Some(name.as_str()));
        assert_eq!(frame.encode().len(), HEADER_LEN);
    }

    #[test]
    fn name_limit_is_bytes_not_chars() {
        // Eleven two-byte characters: 11 chars but 22 bytes.
        let name = "é".repeat(11);
        let err = Frame::new(FrameKind::SetUsr, Some(&name), None).unwrap_err();
        assert_eq!(err, FrameError::NameTooLong { len: 22 });
    }

    #[test]
    fn build_enforces_required_name() {
        let err = Frame::new(FrameKind::SetUsr, None, None).unwrap_err();
        assert_eq!(
            err,
            FrameError::MissingName {
                kind: FrameKind::SetUsr
            }
        );

        // All-space input trims to absent.
        let err = Frame::new(FrameKind::StateUpg2, Some("   "), None).unwrap_err();
        assert_eq!(
            err,
            FrameError::MissingName {
                kind: FrameKind::StateUpg2
            }
        );
    }

    #[test]
    fn build_enforces_required_body() {
        let err = Frame::new(FrameKind::ChatMssg, Some("alice"), None).unwrap_err();
        assert_eq!(
            err,
            FrameError::MissingBody {
                kind: FrameKind::ChatMssg
            }
        );

        // An empty body normalizes to absent, so it fails the same way.
        let err = Frame::new(FrameKind::ChatMssg, Some("alice"), Some("")).unwrap_err();
        assert_eq!(
            err,
            FrameError::MissingBody {
                kind: FrameKind::ChatMssg
            }
        );
    }

    #[test]
    fn build_rejects_fields_the_kind_does_not_take() {
        let err = Frame::new(FrameKind::ExitChat, Some("alice"), None).unwrap_err();
        assert_eq!(
            err,
            FrameError::UnexpectedName {
                kind: FrameKind::ExitChat
            }
        );

        let err = Frame::new(FrameKind::Disconnect, None, Some("bye")).unwrap_err();
        assert_eq!(
            err,
            FrameError::UnexpectedBody {
                kind: FrameKind::Disconnect
            }
        );
    }

    #[test]
    fn set_usr_tolerates_a_body() {
        let frame = Frame::new(FrameKind::SetUsr, Some("alice"), Some("ignored")).unwrap();
        assert_eq!(frame.body(), Some("ignored"));
    }

    // ---- Parse ----

    #[test]
    fn parse_admission_greeting() {
        let frame = Frame::parse(&wire("STATE_UPG_1", "", ""), Origin::Server).unwrap();
        assert_eq!(frame.kind(), FrameKind::StateUpg1);
        assert_eq!(frame.name(), None);
        assert_eq!(frame.body(), None);
    }

    #[test]
    fn parse_chat_message() {
        let frame = Frame::parse(&wire("CHAT_MSSG", "alice", "hi"), Origin::Client).unwrap();
        assert_eq!(frame.kind(), FrameKind::ChatMssg);
        assert_eq!(frame.name(), Some("alice"));
        assert_eq!(frame.body(), Some("hi"));
    }

    #[test]
    fn parse_rejects_short_message() {
        let err = Frame::parse("tmp://SET_USR", Origin::Client).unwrap_err();
        assert_eq!(err, FrameError::Truncated { len: 13 });
    }

    #[test]
    fn parse_rejects_bad_prefix() {
        let raw = wire("SET_USR", "alice", "").replacen("tmp://", "tcp://", 1);
        let err = Frame::parse(&raw, Origin::Client).unwrap_err();
        assert_eq!(err, FrameError::BadMarker { offset: 0 });
    }

    #[test]
    fn parse_rejects_displaced_markers() {
        let mut raw = wire("SET_USR", "alice", "").into_bytes();
        raw[39] = b'x';
        let err = Frame::parse(std::str::from_utf8(&raw).unwrap(), Origin::Client).unwrap_err();
        assert_eq!(err, FrameError::BadMarker { offset: 38 });

        let mut raw = wire("SET_USR", "alice", "").into_bytes();
        raw[63] = b' ';
        let err = Frame::parse(std::str::from_utf8(&raw).unwrap(), Origin::Client).unwrap_err();
        assert_eq!(err, FrameError::BadMarker { offset: 61 });
    }

    #[test]
    fn parse_rejects_unknown_kind() {
        let err = Frame::parse(&wire("PING", "", ""), Origin::Client).unwrap_err();
        assert_eq!(
            err,
            FrameError::UnknownKind {
                token: "PING".to_owned()
            }
        );
    }

    #[test]
    fn parse_is_origin_gated() {
        // A server kind arriving from a client is as unknown as garbage.
        let err = Frame::parse(&wire("DISCONNECT", "", ""), Origin::Client).unwrap_err();
        assert_eq!(
            err,
            FrameError::UnknownKind {
                token: "DISCONNECT".to_owned()
            }
        );

        let err = Frame::parse(&wire("SET_USR", "alice", ""), Origin::Server).unwrap_err();
        assert_eq!(
            err,
            FrameError::UnknownKind {
                token: "SET_USR".to_owned()
            }
        );
    }

    #[test]
    fn parse_enforces_field_rules() {
        // SET_USR with an all-space name field.
        let err = Frame::parse(&wire("SET_USR", "", ""), Origin::Client).unwrap_err();
        assert_eq!(
            err,
            FrameError::MissingName {
                kind: FrameKind::SetUsr
            }
        );

        // EXIT_CHAT must not carry a name.
        let err = Frame::parse(&wire("EXIT_CHAT", "alice", ""), Origin::Client).unwrap_err();
        assert_eq!(
            err,
            FrameError::UnexpectedName {
                kind: FrameKind::ExitChat
            }
        );

        // CHAT_MSSG with nothing after the header.
        let err = Frame::parse(&wire("CHAT_MSSG", "alice", ""), Origin::Client).unwrap_err();
        assert_eq!(
            err,
            FrameError::MissingBody {
                kind: FrameKind::ChatMssg
            }
        );
    }

    #[test]
    fn parse_accepts_full_width_name() {
        // A 20-byte name fills its field exactly; the parser cannot tell
        // whether the sender truncated and must accept it.
        let name = "b".repeat(20);
        let frame = Frame::parse(&wire("SET_USR", &name, ""), Origin::Client).unwrap();
        assert_eq!(frame.name(), Some(name.as_str()));
    }

    #[test]
    fn parse_rejects_char_split_across_field_boundary() {
        // A two-byte character straddling the end of the NAME field means
        // byte 61 is not a UTF-8 boundary.
        let mut raw = String::from("tmp://");
        raw.push_str(&format!("{:<32}", "SET_USR"));
        raw.push_str("::/");
        raw.push_str(&"a".repeat(19));
        raw.push('é'); // bytes 60..62
        raw.push_str("::/");
        let err = Frame::parse(&raw, Origin::Client).unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidFieldEncoding { .. } | FrameError::BadMarker { .. }
        ));
    }

    #[test]
    fn parse_preserves_body_verbatim() {
        let body = "  spaces kept  ::/ and markers too";
        let frame = Frame::parse(&wire("CHAT_MSSG", "alice", body), Origin::Client).unwrap();
        assert_eq!(frame.body(), Some(body));
    }

    // ---- Round trips ----

    #[test]
    fn encode_parse_round_trip() {
        let frames = [
            Frame::state_upg_1(),
            Frame::disconnect(),
            Frame::new(FrameKind::StateUpg2, Some("alice"), None).unwrap(),
            Frame::new(FrameKind::SetUsrConflict, Some("alice"), None).unwrap(),
        ];
        for frame in frames {
            let parsed = Frame::parse(&frame.encode(), Origin::Server).unwrap();
            assert_eq!(parsed, frame);
        }

        let frames = [
            Frame::new(FrameKind::SetUsr, Some("bob"), None).unwrap(),
            Frame::new(FrameKind::ExitChat, None, None).unwrap(),
            Frame::new(FrameKind::ChatMssg, Some("bob"), Some("hello there")).unwrap(),
        ];
        for frame in frames {
            let parsed = Frame::parse(&frame.encode(), Origin::Client).unwrap();
            assert_eq!(parsed, frame);
        }
    }

    #[test]
    fn parse_encode_round_trip_is_byte_exact() {
        let raws = [
            wire("STATE_UPG_1", "", ""),
            wire("SET_USR", "alice", ""),
            wire("STATE_UPG_2", "alice", ""),
            wire("CHAT_MSSG", "alice", "hi"),
        ];
        let origins = [
            Origin::Server,
            Origin::Client,
            Origin::Server,
            Origin::Client,
        ];
        for (raw, origin) in raws.iter().zip(origins) {
            let frame = Frame::parse(raw, origin).unwrap();
            assert_eq!(&frame.encode(), raw);
        }
    }

    #[test]
    fn multibyte_name_round_trip() {
        let frame = Frame::new(FrameKind::ChatMssg, Some("søren"), Some("hej")).unwrap();
        let raw = frame.encode();
        // 6 bytes of name, 14 bytes of padding: body still starts at 64.
        assert_eq!(&raw.as_bytes()[61..64], b"::/");
        let parsed = Frame::parse(&raw, Origin::Client).unwrap();
        assert_eq!(parsed, frame);
    }

    proptest! {
        #[test]
        fn round_trip_holds_for_arbitrary_names_and_bodies(
            name in "[A-Za-z0-9_]{1,20}",
            body in "[^ ][ -~]{0,120}",
        ) {
            let frame = Frame::new(FrameKind::ChatMssg, Some(&name), Some(&body)).unwrap();
            let parsed = Frame::parse(&frame.encode(), Origin::Client).unwrap();
            prop_assert_eq!(parsed, frame);
        }
    }
}
