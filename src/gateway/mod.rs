//! Admission control and generation session machinery

pub mod admission;
pub mod monitor;
pub mod session;
pub mod stream;

pub use admission::{AdmissionController, AdmissionSlot};
pub use monitor::spawn_queue_depth_monitor;
pub use session::{GenerationSession, OutputChunk, SessionState};
pub use stream::DeltaTracker;
