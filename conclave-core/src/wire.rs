use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use uuid::Uuid;

use crate::address::Address;
use crate::digest::{Digest, Seqnos};
use crate::event::{GroupMessage, MergeId};
use crate::join::JoinRsp;
use crate::view::{View, ViewId, ViewKind};

// Identity bytes are the basis of every membership comparison, so the
// encodings below are pinned: big-endian integers, count-prefixed
// sequences, one presence byte per optional field.

const MAX_PAYLOAD_LEN: usize = 1 << 20;
const MAX_MEMBERS: usize = 1 << 16;
const MAX_REASON_LEN: usize = 1 << 16;
const MAX_SUBVIEWS: usize = 1 << 12;

const TAG_JOIN_REQ: u8 = 1;
const TAG_JOIN_RSP: u8 = 2;
const TAG_LEAVE_REQ: u8 = 3;
const TAG_LEAVE_ACK: u8 = 4;
const TAG_VIEW_ANNOUNCE: u8 = 5;
const TAG_MERGE_TRIGGER: u8 = 6;
const TAG_MERGE_STATE_REQ: u8 = 7;
const TAG_MERGE_STATE_RSP: u8 = 8;

const KIND_PLAIN: u8 = 0;
const KIND_MERGE: u8 = 1;

/// Decode failure for any boundary wire form. Nothing is ever partially
/// applied: the caller drops the frame and keeps its state.
#[derive(Debug, Error)]
pub enum WireError {
    /// Input ended before the announced structure was complete.
    #[error("truncated wire data while reading {0}")]
    Truncated(&'static str),
    /// Unknown discriminant byte.
    #[error("unknown {context} tag {tag}")]
    UnknownTag {
        /// Structure whose discriminant was unreadable.
        context: &'static str,
        /// Offending byte.
        tag: u8,
    },
    /// A length prefix exceeded the sanity bound for its structure.
    #[error("{context} length {len} exceeds limit {limit}")]
    LengthOverflow {
        /// Structure whose length was announced.
        context: &'static str,
        /// Announced length.
        len: usize,
        /// Maximum accepted.
        limit: usize,
    },
    /// A view arrived without its id.
    #[error("view wire form is missing its id")]
    MissingViewId,
    /// A join response carried neither a view/digest pair nor a failure
    /// reason.
    #[error("join response carries no outcome")]
    EmptyJoinRsp,
    /// Failure reason was not valid UTF-8.
    #[error("failure reason is not valid utf-8")]
    InvalidUtf8,
    /// Bytes were left over after a complete structure.
    #[error("unexpected trailing bytes after {0}")]
    Trailing(&'static str),
}

fn need(buf: &impl Buf, bytes: usize, context: &'static str) -> Result<(), WireError> {
    if buf.remaining() < bytes {
        Err(WireError::Truncated(context))
    } else {
        Ok(())
    }
}

fn get_count(
    buf: &mut impl Buf,
    context: &'static str,
    limit: usize,
) -> Result<usize, WireError> {
    need(buf, 4, context)?;
    let len = buf.get_u32() as usize;
    if len > limit {
        return Err(WireError::LengthOverflow {
            context,
            len,
            limit,
        });
    }
    Ok(len)
}

fn put_presence(buf: &mut impl BufMut, present: bool) {
    buf.put_u8(u8::from(present));
}

fn get_presence(buf: &mut impl Buf, context: &'static str) -> Result<bool, WireError> {
    need(buf, 1, context)?;
    match buf.get_u8() {
        0 => Ok(false),
        1 => Ok(true),
        tag => Err(WireError::UnknownTag { context, tag }),
    }
}

/// Encodes an address: 16 identity bytes, then the presence-flagged,
/// length-prefixed payload.
pub fn put_address(buf: &mut impl BufMut, addr: &Address) {
    buf.put_slice(addr.identity().as_bytes());
    match addr.payload() {
        Some(payload) => {
            put_presence(buf, true);
            buf.put_u32(payload.len() as u32);
            buf.put_slice(payload);
        }
        None => put_presence(buf, false),
    }
}

/// Decodes an address.
pub fn get_address(buf: &mut impl Buf) -> Result<Address, WireError> {
    need(buf, 16, "address identity")?;
    let mut identity = [0u8; 16];
    buf.copy_to_slice(&mut identity);
    let payload = if get_presence(buf, "address payload presence")? {
        let len = get_count(buf, "address payload", MAX_PAYLOAD_LEN)?;
        need(buf, len, "address payload")?;
        Some(buf.copy_to_bytes(len))
    } else {
        None
    };
    Ok(Address::from_parts(Uuid::from_bytes(identity), payload))
}

fn put_view_id(buf: &mut impl BufMut, id: &ViewId) {
    put_address(buf, id.creator());
    buf.put_i64(id.lamport());
}

fn get_view_id(buf: &mut impl Buf) -> Result<ViewId, WireError> {
    let creator = get_address(buf)?;
    need(buf, 8, "view id lamport")?;
    let lamport = buf.get_i64();
    Ok(ViewId::new(creator, lamport))
}

/// Encodes a view: presence-flagged id, count-prefixed members in view
/// order, then the kind discriminant with any merged sub-view ids.
pub fn put_view(buf: &mut impl BufMut, view: &View) {
    put_presence(buf, true);
    put_view_id(buf, view.id());
    buf.put_u32(view.len() as u32);
    for member in view.members() {
        put_address(buf, member);
    }
    match view.kind() {
        ViewKind::Plain => buf.put_u8(KIND_PLAIN),
        ViewKind::Merge { subviews } => {
            buf.put_u8(KIND_MERGE);
            buf.put_u32(subviews.len() as u32);
            for sub in subviews {
                put_view_id(buf, sub);
            }
        }
    }
}

/// Decodes a view.
pub fn get_view(buf: &mut impl Buf) -> Result<View, WireError> {
    if !get_presence(buf, "view id presence")? {
        return Err(WireError::MissingViewId);
    }
    let id = get_view_id(buf)?;
    let count = get_count(buf, "view members", MAX_MEMBERS)?;
    let mut members = Vec::with_capacity(count);
    for _ in 0..count {
        members.push(get_address(buf)?);
    }
    need(buf, 1, "view kind")?;
    match buf.get_u8() {
        KIND_PLAIN => Ok(View::new(id, members)),
        KIND_MERGE => {
            let count = get_count(buf, "merged subviews", MAX_SUBVIEWS)?;
            let mut subviews = Vec::with_capacity(count);
            for _ in 0..count {
                subviews.push(get_view_id(buf)?);
            }
            Ok(View::merged(id, members, subviews))
        }
        tag => Err(WireError::UnknownTag {
            context: "view kind",
            tag,
        }),
    }
}

/// Encodes a digest: count-prefixed entries of address plus three signed
/// 64-bit watermarks.
pub fn put_digest(buf: &mut impl BufMut, digest: &Digest) {
    buf.put_u32(digest.len() as u32);
    for (member, seqnos) in digest.entries() {
        put_address(buf, member);
        buf.put_i64(seqnos.lowest_unseen);
        buf.put_i64(seqnos.highest_delivered);
        buf.put_i64(seqnos.highest_seen);
    }
}

/// Decodes a digest.
pub fn get_digest(buf: &mut impl Buf) -> Result<Digest, WireError> {
    let count = get_count(buf, "digest entries", MAX_MEMBERS)?;
    let mut digest = Digest::new();
    for _ in 0..count {
        let member = get_address(buf)?;
        need(buf, 24, "digest seqnos")?;
        let seqnos = Seqnos::new(buf.get_i64(), buf.get_i64(), buf.get_i64());
        digest.set(member, seqnos);
    }
    Ok(digest)
}

/// Encodes a join response: presence-flagged view, digest, and failure
/// reason.
pub fn put_join_rsp(buf: &mut impl BufMut, rsp: &JoinRsp) {
    match rsp {
        JoinRsp::Success { view, digest } => {
            put_presence(buf, true);
            put_view(buf, view);
            put_presence(buf, true);
            put_digest(buf, digest);
            put_presence(buf, false);
        }
        JoinRsp::Rejected { reason } => {
            put_presence(buf, false);
            put_presence(buf, false);
            put_presence(buf, true);
            buf.put_u32(reason.len() as u32);
            buf.put_slice(reason.as_bytes());
        }
    }
}

/// Decodes a join response, enforcing the exactly-one-outcome invariant: a
/// present failure reason wins and any view/digest is ignored; otherwise
/// both view and digest must be present.
pub fn get_join_rsp(buf: &mut impl Buf) -> Result<JoinRsp, WireError> {
    let view = if get_presence(buf, "join response view presence")? {
        Some(get_view(buf)?)
    } else {
        None
    };
    let digest = if get_presence(buf, "join response digest presence")? {
        Some(get_digest(buf)?)
    } else {
        None
    };
    let reason = if get_presence(buf, "join response reason presence")? {
        let len = get_count(buf, "join response reason", MAX_REASON_LEN)?;
        need(buf, len, "join response reason")?;
        let raw = buf.copy_to_bytes(len);
        Some(
            std::str::from_utf8(&raw)
                .map_err(|_| WireError::InvalidUtf8)?
                .to_owned(),
        )
    } else {
        None
    };
    match (view, digest, reason) {
        (_, _, Some(reason)) => Ok(JoinRsp::Rejected { reason }),
        (Some(view), Some(digest), None) => Ok(JoinRsp::Success { view, digest }),
        _ => Err(WireError::EmptyJoinRsp),
    }
}

fn put_merge_id(buf: &mut impl BufMut, id: &MergeId) {
    put_address(buf, &id.leader);
    buf.put_u64(id.seq);
}

fn get_merge_id(buf: &mut impl Buf) -> Result<MergeId, WireError> {
    let leader = get_address(buf)?;
    need(buf, 8, "merge round counter")?;
    let seq = buf.get_u64();
    Ok(MergeId { leader, seq })
}

/// Encodes a protocol message with its sender into one frame.
#[must_use]
pub fn encode_envelope(from: &Address, message: &GroupMessage) -> Bytes {
    let mut buf = BytesMut::with_capacity(64);
    put_address(&mut buf, from);
    match message {
        GroupMessage::JoinReq { candidate } => {
            buf.put_u8(TAG_JOIN_REQ);
            put_address(&mut buf, candidate);
        }
        GroupMessage::JoinRsp(rsp) => {
            buf.put_u8(TAG_JOIN_RSP);
            put_join_rsp(&mut buf, rsp);
        }
        GroupMessage::LeaveReq { member } => {
            buf.put_u8(TAG_LEAVE_REQ);
            put_address(&mut buf, member);
        }
        GroupMessage::LeaveAck => buf.put_u8(TAG_LEAVE_ACK),
        GroupMessage::ViewAnnounce { view, digest } => {
            buf.put_u8(TAG_VIEW_ANNOUNCE);
            put_view(&mut buf, view);
            put_digest(&mut buf, digest);
        }
        GroupMessage::MergeTrigger { coords } => {
            buf.put_u8(TAG_MERGE_TRIGGER);
            buf.put_u32(coords.len() as u32);
            for coord in coords {
                put_address(&mut buf, coord);
            }
        }
        GroupMessage::MergeStateReq { merge_id } => {
            buf.put_u8(TAG_MERGE_STATE_REQ);
            put_merge_id(&mut buf, merge_id);
        }
        GroupMessage::MergeStateRsp {
            merge_id,
            view,
            digest,
        } => {
            buf.put_u8(TAG_MERGE_STATE_RSP);
            put_merge_id(&mut buf, merge_id);
            put_view(&mut buf, view);
            put_digest(&mut buf, digest);
        }
    }
    buf.freeze()
}

/// Decodes one frame into its sender and message, rejecting trailing
/// bytes.
pub fn decode_envelope(mut frame: Bytes) -> Result<(Address, GroupMessage), WireError> {
    let from = get_address(&mut frame)?;
    need(&frame, 1, "message tag")?;
    let tag = frame.get_u8();
    let message = match tag {
        TAG_JOIN_REQ => GroupMessage::JoinReq {
            candidate: get_address(&mut frame)?,
        },
        TAG_JOIN_RSP => GroupMessage::JoinRsp(get_join_rsp(&mut frame)?),
        TAG_LEAVE_REQ => GroupMessage::LeaveReq {
            member: get_address(&mut frame)?,
        },
        TAG_LEAVE_ACK => GroupMessage::LeaveAck,
        TAG_VIEW_ANNOUNCE => GroupMessage::ViewAnnounce {
            view: get_view(&mut frame)?,
            digest: get_digest(&mut frame)?,
        },
        TAG_MERGE_TRIGGER => {
            let count = get_count(&mut frame, "merge coordinators", MAX_MEMBERS)?;
            let mut coords = Vec::with_capacity(count);
            for _ in 0..count {
                coords.push(get_address(&mut frame)?);
            }
            GroupMessage::MergeTrigger { coords }
        }
        TAG_MERGE_STATE_REQ => GroupMessage::MergeStateReq {
            merge_id: get_merge_id(&mut frame)?,
        },
        TAG_MERGE_STATE_RSP => GroupMessage::MergeStateRsp {
            merge_id: get_merge_id(&mut frame)?,
            view: get_view(&mut frame)?,
            digest: get_digest(&mut frame)?,
        },
        tag => {
            return Err(WireError::UnknownTag {
                context: "message",
                tag,
            });
        }
    };
    if frame.has_remaining() {
        return Err(WireError::Trailing("message"));
    }
    Ok((from, message))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from_parts(Uuid::from_bytes([byte; 16]), None)
    }

    fn roundtrip_view(view: &View) -> View {
        let mut buf = BytesMut::new();
        put_view(&mut buf, view);
        let mut frame = buf.freeze();
        let decoded = get_view(&mut frame).unwrap();
        assert!(!frame.has_remaining());
        decoded
    }

    #[test]
    fn view_roundtrips_for_zero_one_and_many_members() {
        for member_count in [0usize, 1, 5] {
            let members: Vec<_> = (0..member_count).map(|idx| addr(idx as u8 + 1)).collect();
            let view = View::new(ViewId::new(addr(9), 42), members.clone());
            let decoded = roundtrip_view(&view);
            assert_eq!(decoded.id(), view.id());
            assert_eq!(decoded.members(), members.as_slice());
            assert!(!decoded.is_merge());
        }
    }

    #[test]
    fn merge_view_keeps_its_subviews() {
        let subviews = vec![ViewId::new(addr(1), 0), ViewId::new(addr(2), 10)];
        let view = View::merged(
            ViewId::new(addr(1), 11),
            vec![addr(1), addr(2), addr(3)],
            subviews.clone(),
        );
        let decoded = roundtrip_view(&view);
        assert_eq!(decoded.subviews(), subviews.as_slice());
    }

    #[test]
    fn address_payload_survives_the_trip() {
        let original = Address::from_parts(
            Uuid::from_bytes([7; 16]),
            Some(Bytes::from_static(b"auth-token")),
        );
        let mut buf = BytesMut::new();
        put_address(&mut buf, &original);
        let decoded = get_address(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.payload(), original.payload());
    }

    #[test]
    fn join_rsp_roundtrips_both_outcomes() {
        let member = addr(1);
        let view = View::new(ViewId::new(member.clone(), 3), vec![member.clone()]);
        let mut digest = Digest::new();
        digest.set(member, Seqnos::new(0, 4, 6));

        for rsp in [
            JoinRsp::success(view, digest),
            JoinRsp::rejected("not coordinator"),
        ] {
            let mut buf = BytesMut::new();
            put_join_rsp(&mut buf, &rsp);
            let decoded = get_join_rsp(&mut buf.freeze()).unwrap();
            assert_eq!(decoded, rsp);
        }
    }

    #[test]
    fn join_rsp_reason_wins_over_a_smuggled_view() {
        let member = addr(1);
        let view = View::new(ViewId::new(member.clone(), 0), vec![member]);
        let mut buf = BytesMut::new();
        put_presence(&mut buf, true);
        put_view(&mut buf, &view);
        put_presence(&mut buf, false);
        put_presence(&mut buf, true);
        buf.put_u32(2);
        buf.put_slice(b"no");
        let decoded = get_join_rsp(&mut buf.freeze()).unwrap();
        assert_eq!(decoded.fail_reason(), Some("no"));
    }

    #[test]
    fn join_rsp_without_any_outcome_is_rejected() {
        let mut buf = BytesMut::new();
        put_presence(&mut buf, false);
        put_presence(&mut buf, false);
        put_presence(&mut buf, false);
        assert!(matches!(
            get_join_rsp(&mut buf.freeze()),
            Err(WireError::EmptyJoinRsp)
        ));
    }

    #[test]
    fn envelope_roundtrips_nested_structures() {
        let leader = addr(1);
        let view = View::new(ViewId::new(leader.clone(), 7), vec![leader.clone(), addr(2)]);
        let mut digest = Digest::new();
        digest.set(leader.clone(), Seqnos::new(0, 1, 2));
        digest.set(addr(2), Seqnos::new(0, 0, 0));
        let message = GroupMessage::MergeStateRsp {
            merge_id: MergeId {
                leader: leader.clone(),
                seq: 3,
            },
            view,
            digest,
        };
        let frame = encode_envelope(&leader, &message);
        let (from, decoded) = decode_envelope(frame).unwrap();
        assert_eq!(from, leader);
        assert_eq!(decoded, message);
    }

    #[test]
    fn truncated_and_trailing_frames_are_refused() {
        let from = addr(1);
        let frame = encode_envelope(&from, &GroupMessage::LeaveAck);

        let truncated = frame.slice(0..frame.len() - 2);
        assert!(matches!(
            decode_envelope(truncated),
            Err(WireError::Truncated(_))
        ));

        let mut padded = BytesMut::from(frame.as_ref());
        padded.put_u8(0xff);
        assert!(matches!(
            decode_envelope(padded.freeze()),
            Err(WireError::Trailing(_))
        ));
    }

    #[test]
    fn unknown_message_tag_is_refused() {
        let mut buf = BytesMut::new();
        put_address(&mut buf, &addr(1));
        buf.put_u8(200);
        assert!(matches!(
            decode_envelope(buf.freeze()),
            Err(WireError::UnknownTag {
                context: "message",
                ..
            })
        ));
    }
}
