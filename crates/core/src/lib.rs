pub mod bubbles;
pub mod error;
pub mod geometry;
pub mod steps;
pub mod timeline;

pub use bubbles::{BubbleDatum, BubbleLayoutEngine, BubbleNode, CanvasSize, Circle};
pub use error::{StepError, TimelineError};
pub use geometry::{Direction, Point, Rect};
pub use steps::{
    Arrow, Branch, DrawCommand, SequencePlan, Step, StepKind, StepLayout, StepSequence,
    build_steps,
};
pub use timeline::{ActorType, Timeline, VisitEvent, VisitMetadata};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
