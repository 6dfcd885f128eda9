//! Live device and subscriber plumbing.
//!
//! [`ConnectionBroadcaster`] fans device frames and status transitions out
//! to subscribers; [`MovementDeriver`] turns settled device frames into
//! stock movements for whatever [`MovementSink`] it is wired to.

pub mod broadcaster;
pub mod derive;

pub use broadcaster::{
    BroadcastOutcome, ConnectionBroadcaster, DeviceToken, FrameSink, SinkError, SubscriberId,
    status_frame,
};
pub use derive::{DEVICE_SOURCE, MovementDeriver, MovementSink};
