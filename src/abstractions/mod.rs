pub mod codec;
pub mod communication;
pub mod logging;
pub mod process;

/// A single datagram exchanged between procurement and the factory.
///
/// Every variant encodes to the same fixed-size record; see [`codec`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Message {
    Request {
        order_size: u32,
    },
    Confirmation {
        order_size: u32,
        worker_count: u32,
    },
    Production {
        worker_id: u32,
        capacity: u32,
        units_produced: u32,
        duration_ms: u32,
    },
    Completion {
        worker_id: u32,
        units_produced: u32,
    },
    ProtocolError,
}

impl Message {
    pub fn purpose(&self) -> Purpose {
        match self {
            Message::Request { .. } => Purpose::Request,
            Message::Confirmation { .. } => Purpose::OrderConfirm,
            Message::Production { .. } => Purpose::Production,
            Message::Completion { .. } => Purpose::Completion,
            Message::ProtocolError => Purpose::ProtocolError,
        }
    }
}

/// Wire tag carried in the first field of every record.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Purpose {
    Request = 1,
    OrderConfirm = 2,
    Production = 3,
    Completion = 4,
    ProtocolError = 5,
}
