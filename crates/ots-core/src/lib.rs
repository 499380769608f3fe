pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{OtsError, OtsResult};
pub use types::{CipherKind, OpaqueId, RecipientState, SenderState};
