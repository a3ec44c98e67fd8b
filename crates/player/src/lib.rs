//! Animation orchestration for stepcast timelines.
//!
//! [`TimelineController`] turns each visit of a [`stepcast_core::Timeline`]
//! into a task on a cooperative [`TaskScheduler`], animates the visit's steps
//! onto a [`Surface`], and supports pause, resume and scrubbing without
//! replaying already drawn visits.

pub mod cancel;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod observer;
pub mod primitives;
pub mod scheduler;
pub mod session;
pub mod surface;

pub use cancel::{CancellationToken, CancellationTrigger};
pub use clock::FrameClock;
pub use config::load_config;
pub use controller::TimelineController;
pub use error::{PlayerError, Result};
pub use observer::TimelineObserver;
pub use primitives::{Completion, StepContext, animate, delay, run_sequence};
pub use scheduler::{ScheduledTask, SchedulerState, TaskScheduler, task};
pub use session::{TimelineSession, TimelineState};
pub use surface::{RecordingSurface, Surface, SurfaceError, SurfaceHandle};
