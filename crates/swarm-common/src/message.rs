use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::time::Instant;

use crate::{NodeId, Term};

/// Every message carries exactly this many payload bytes.
pub const PAYLOAD_LEN: usize = 8;

/// Code (2 bytes, big-endian) followed by the payload.
pub const FRAME_LEN: usize = 2 + PAYLOAD_LEN;

// Payload positions
const SENDER: usize = 0;
const TERM_LOW: usize = 1;
const FLAG: usize = 2;
const TARGET: usize = 3;
const TERM_HIGH: usize = 4; // 3 bytes, 4..=6

/// The message-type namespace shared by every node on the bus.
///
/// Codes `0x100..=0x1FF` are coordination traffic. The power-control and
/// telemetry ranges are reserved for payloads the election ignores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Heartbeat,
    VoteRequest,
    VoteResponse,
    LeaderAnnounce,
    PowerStatus,
    Telemetry,
}

impl MessageKind {
    pub const fn code(self) -> u16 {
        match self {
            MessageKind::Heartbeat => 0x100,
            MessageKind::VoteRequest => 0x110,
            MessageKind::VoteResponse => 0x111,
            MessageKind::LeaderAnnounce => 0x120,
            MessageKind::PowerStatus => 0x200,
            MessageKind::Telemetry => 0x300,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x100 => Some(MessageKind::Heartbeat),
            0x110 => Some(MessageKind::VoteRequest),
            0x111 => Some(MessageKind::VoteResponse),
            0x120 => Some(MessageKind::LeaderAnnounce),
            0x200..=0x2FF => Some(MessageKind::PowerStatus),
            0x300..=0x3FF => Some(MessageKind::Telemetry),
            _ => None,
        }
    }
}

/// A raw bus message: type code, fixed payload and the time it was sent.
///
/// Messages are immutable once built. Interpretation happens through
/// [`Message::decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u16,
    pub payload: [u8; PAYLOAD_LEN],
    pub sent_at: Instant,
}

impl Message {
    pub fn new(id: u16, payload: [u8; PAYLOAD_LEN], sent_at: Instant) -> Self {
        Self {
            id,
            payload,
            sent_at,
        }
    }

    /// Builds a message from an arbitrary byte slice.
    /// Short input is zero-padded and long input truncated, so a missing
    /// field always reads back as zero / false.
    pub fn from_raw(id: u16, data: &[u8], sent_at: Instant) -> Self {
        let mut payload = [0u8; PAYLOAD_LEN];
        let n = data.len().min(PAYLOAD_LEN);
        payload[..n].copy_from_slice(&data[..n]);
        Self::new(id, payload, sent_at)
    }

    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::from_code(self.id)
    }

    /// Interprets the payload according to the type code.
    pub fn decode(&self) -> Signal {
        let p = &self.payload;
        let term = read_term(p);
        match self.kind() {
            Some(MessageKind::Heartbeat) => Signal::Heartbeat {
                sender: p[SENDER],
                term,
                leader: p[FLAG] != 0,
            },
            Some(MessageKind::VoteRequest) => Signal::VoteRequest {
                candidate: p[SENDER],
                term,
            },
            Some(MessageKind::VoteResponse) => Signal::VoteResponse {
                voter: p[SENDER],
                candidate: p[TARGET],
                term,
                granted: p[FLAG] != 0,
            },
            Some(MessageKind::LeaderAnnounce) => Signal::LeaderAnnounce {
                leader: p[SENDER],
                term,
            },
            _ => Signal::Other { code: self.id },
        }
    }

    /// Serializes into the frame used by real transports.
    pub fn to_frame(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_LEN);
        buf.put_u16(self.id);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parses a received frame. Only the 2-byte code is mandatory; the
    /// payload is padded like [`Message::from_raw`].
    pub fn from_frame(mut frame: &[u8], received_at: Instant) -> Option<Self> {
        if frame.remaining() < 2 {
            return None;
        }
        let id = frame.get_u16();
        Some(Self::from_raw(id, frame, received_at))
    }
}

/// Decoded form of a [`Message`]; the node's state machine dispatches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Heartbeat {
        sender: NodeId,
        term: Term,
        leader: bool,
    },
    VoteRequest {
        candidate: NodeId,
        term: Term,
    },
    VoteResponse {
        voter: NodeId,
        candidate: NodeId,
        term: Term,
        granted: bool,
    },
    LeaderAnnounce {
        leader: NodeId,
        term: Term,
    },
    /// Reserved or unknown code. Carries no election meaning.
    Other { code: u16 },
}

impl Signal {
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            Signal::Heartbeat { .. } => Some(MessageKind::Heartbeat),
            Signal::VoteRequest { .. } => Some(MessageKind::VoteRequest),
            Signal::VoteResponse { .. } => Some(MessageKind::VoteResponse),
            Signal::LeaderAnnounce { .. } => Some(MessageKind::LeaderAnnounce),
            Signal::Other { code } => MessageKind::from_code(*code),
        }
    }

    pub fn term(&self) -> Option<Term> {
        match *self {
            Signal::Heartbeat { term, .. }
            | Signal::VoteRequest { term, .. }
            | Signal::VoteResponse { term, .. }
            | Signal::LeaderAnnounce { term, .. } => Some(term),
            Signal::Other { .. } => None,
        }
    }

    pub fn encode(&self, sent_at: Instant) -> Message {
        let mut p = [0u8; PAYLOAD_LEN];
        let id = match *self {
            Signal::Heartbeat {
                sender,
                term,
                leader,
            } => {
                p[SENDER] = sender;
                p[FLAG] = leader as u8;
                write_term(&mut p, term);
                MessageKind::Heartbeat.code()
            }
            Signal::VoteRequest { candidate, term } => {
                p[SENDER] = candidate;
                write_term(&mut p, term);
                MessageKind::VoteRequest.code()
            }
            Signal::VoteResponse {
                voter,
                candidate,
                term,
                granted,
            } => {
                p[SENDER] = voter;
                p[FLAG] = granted as u8;
                p[TARGET] = candidate;
                write_term(&mut p, term);
                MessageKind::VoteResponse.code()
            }
            Signal::LeaderAnnounce { leader, term } => {
                p[SENDER] = leader;
                write_term(&mut p, term);
                MessageKind::LeaderAnnounce.code()
            }
            Signal::Other { code } => code,
        };
        Message::new(id, p, sent_at)
    }
}

fn write_term(p: &mut [u8; PAYLOAD_LEN], term: Term) {
    let [b0, b1, b2, b3] = term.to_le_bytes();
    p[TERM_LOW] = b0;
    p[TERM_HIGH..TERM_HIGH + 3].copy_from_slice(&[b1, b2, b3]);
}

fn read_term(p: &[u8; PAYLOAD_LEN]) -> Term {
    Term::from_le_bytes([p[TERM_LOW], p[TERM_HIGH], p[TERM_HIGH + 1], p[TERM_HIGH + 2]])
}
