//! LineWarden call-screening core.
//! Host-driven: no I/O here; the daemon feeds events in and performs the
//! actions the core hands back.

pub mod callerid;
pub mod core;
pub mod envelope;
pub mod identity;
pub mod protocol;

pub use callerid::parse_caller_id;
pub use envelope::{CodecError, EncryptedEnvelope, PayloadCodec};
pub use identity::{derive_payload_key, DeviceIdentity};
pub use protocol::{
    HeartbeatPayload, ScreenRequest, ScreenResponse, ScreeningDecision, ACTION_ALLOW,
};
pub use self::core::{Action, CallStats, WardenCore};
