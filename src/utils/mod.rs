pub mod clock;
pub mod serde;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
