//! Fixed-size wire records.
//!
//! Every message occupies seven big-endian `u32` fields regardless of kind:
//!
//! ```text
//! purpose | orderSize | numFactories | facID | capacity | partsMade | duration
//! ```
//!
//! Fields a kind does not use are written as zero and ignored on decode, so the
//! receiver needs no framing beyond the datagram itself.

use crate::abstractions::{Message, Purpose};
use crate::error::CodecError;

const FIELDS: usize = 7;
pub const RECORD_LEN: usize = FIELDS * 4;

const PURPOSE: usize = 0;
const ORDER_SIZE: usize = 1;
const NUM_FACTORIES: usize = 2;
const FAC_ID: usize = 3;
const CAPACITY: usize = 4;
const PARTS_MADE: usize = 5;
const DURATION: usize = 6;

impl TryFrom<u32> for Purpose {
    type Error = CodecError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Purpose::Request,
            2 => Purpose::OrderConfirm,
            3 => Purpose::Production,
            4 => Purpose::Completion,
            5 => Purpose::ProtocolError,
            other => return Err(CodecError::UnknownPurpose(other)),
        })
    }
}

pub fn encode(message: &Message) -> [u8; RECORD_LEN] {
    let mut fields = [0u32; FIELDS];
    fields[PURPOSE] = message.purpose() as u32;

    match *message {
        Message::Request { order_size } => {
            fields[ORDER_SIZE] = order_size;
        }
        Message::Confirmation {
            order_size,
            worker_count,
        } => {
            fields[ORDER_SIZE] = order_size;
            fields[NUM_FACTORIES] = worker_count;
        }
        Message::Production {
            worker_id,
            capacity,
            units_produced,
            duration_ms,
        } => {
            fields[FAC_ID] = worker_id;
            fields[CAPACITY] = capacity;
            fields[PARTS_MADE] = units_produced;
            fields[DURATION] = duration_ms;
        }
        Message::Completion {
            worker_id,
            units_produced,
        } => {
            fields[FAC_ID] = worker_id;
            fields[PARTS_MADE] = units_produced;
        }
        Message::ProtocolError => {}
    }

    let mut buf = [0u8; RECORD_LEN];
    for (chunk, field) in buf.chunks_exact_mut(4).zip(fields) {
        chunk.copy_from_slice(&field.to_be_bytes());
    }
    buf
}

/// Decodes one record. Bytes past [`RECORD_LEN`] are ignored.
pub fn decode(buf: &[u8]) -> Result<Message, CodecError> {
    if buf.len() < RECORD_LEN {
        return Err(CodecError::Malformed {
            needed: RECORD_LEN,
            available: buf.len(),
        });
    }

    let field = |index: usize| {
        let start = index * 4;
        u32::from_be_bytes([buf[start], buf[start + 1], buf[start + 2], buf[start + 3]])
    };

    Ok(match Purpose::try_from(field(PURPOSE))? {
        Purpose::Request => Message::Request {
            order_size: field(ORDER_SIZE),
        },
        Purpose::OrderConfirm => Message::Confirmation {
            order_size: field(ORDER_SIZE),
            worker_count: field(NUM_FACTORIES),
        },
        Purpose::Production => Message::Production {
            worker_id: field(FAC_ID),
            capacity: field(CAPACITY),
            units_produced: field(PARTS_MADE),
            duration_ms: field(DURATION),
        },
        Purpose::Completion => Message::Completion {
            worker_id: field(FAC_ID),
            units_produced: field(PARTS_MADE),
        },
        Purpose::ProtocolError => Message::ProtocolError,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_kind() -> Vec<Message> {
        vec![
            Message::Request { order_size: 100 },
            Message::Confirmation {
                order_size: u32::MAX,
                worker_count: 20,
            },
            Message::Production {
                worker_id: 3,
                capacity: 50,
                units_produced: 17,
                duration_ms: 1200,
            },
            Message::Completion {
                worker_id: 1,
                units_produced: 0,
            },
            Message::ProtocolError,
        ]
    }

    #[test]
    fn decode_reverses_encode() {
        for message in every_kind() {
            assert_eq!(decode(&encode(&message)), Ok(message));
        }
    }

    #[test]
    fn fields_are_big_endian_in_table_order() {
        let buf = encode(&Message::Production {
            worker_id: 2,
            capacity: 0x0102_0304,
            units_produced: 9,
            duration_ms: 500,
        });

        assert_eq!(&buf[0..4], &[0, 0, 0, 3]);
        assert_eq!(&buf[4..12], &[0; 8]);
        assert_eq!(&buf[12..16], &[0, 0, 0, 2]);
        assert_eq!(&buf[16..20], &[1, 2, 3, 4]);
        assert_eq!(&buf[20..24], &[0, 0, 0, 9]);
        assert_eq!(&buf[24..28], &500u32.to_be_bytes());
    }

    #[test]
    fn unused_fields_are_zero() {
        let buf = encode(&Message::ProtocolError);
        assert_eq!(&buf[..4], &5u32.to_be_bytes());
        assert!(buf[4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn short_buffer_is_malformed() {
        let buf = encode(&Message::Request { order_size: 1 });
        assert_eq!(
            decode(&buf[..RECORD_LEN - 1]),
            Err(CodecError::Malformed {
                needed: RECORD_LEN,
                available: RECORD_LEN - 1
            })
        );
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut buf = encode(&Message::Request { order_size: 42 }).to_vec();
        buf.extend_from_slice(&[0xff; 8]);
        assert_eq!(decode(&buf), Ok(Message::Request { order_size: 42 }));
    }

    #[test]
    fn unknown_purpose_is_rejected() {
        let mut buf = [0u8; RECORD_LEN];
        buf[..4].copy_from_slice(&99u32.to_be_bytes());
        assert_eq!(decode(&buf), Err(CodecError::UnknownPurpose(99)));
    }
}
