//! Animated draw actions.
//!
//! Each primitive previews intermediate frames on the surface, suspends on the
//! frame clock between them, and commits the finished command at the end. The
//! cancellation token is polled at every suspension point; a cancelled action
//! resolves `Completion::Cancelled` and commits nothing.

use std::time::Duration;

use stepcast_core::{Branch, DrawCommand, StepError, StepSequence};
use stepcast_runtime_config::PlaybackSettings;
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::clock::FrameClock;
use crate::surface::SurfaceHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Finished,
    Cancelled,
}

impl Completion {
    pub fn is_cancelled(self) -> bool {
        self == Self::Cancelled
    }
}

/// Everything an animated step needs while it runs.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub surface: SurfaceHandle,
    pub clock: FrameClock,
    pub token: CancellationToken,
    pub playback: PlaybackSettings,
}

impl StepContext {
    /// Suspend until the next frame, or until cancellation.
    pub async fn next_frame(&self) -> Completion {
        if self.token.is_cancelled() {
            return Completion::Cancelled;
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Completion::Cancelled,
            _ = self.clock.next_frame() => self.settled(),
        }
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.playback.step_delay_ms)
    }

    fn settled(&self) -> Completion {
        if self.token.is_cancelled() {
            Completion::Cancelled
        } else {
            Completion::Finished
        }
    }
}

/// Cancellation-aware timed pause.
pub async fn delay(duration: Duration, ctx: &StepContext) -> Completion {
    if ctx.token.is_cancelled() {
        return Completion::Cancelled;
    }
    if duration.is_zero() {
        return Completion::Finished;
    }
    tokio::select! {
        biased;
        _ = ctx.token.cancelled() => Completion::Cancelled,
        _ = tokio::time::sleep(duration) => ctx.settled(),
    }
}

/// Number of frames `command` takes to animate.
pub fn frame_count(command: &DrawCommand, playback: &PlaybackSettings) -> u32 {
    let travel = |distance: f64| -> u32 {
        let frames = (distance / playback.line_speed.max(f64::EPSILON)).ceil();
        if frames.is_finite() && frames >= 1.0 {
            frames.min(f64::from(u32::MAX)) as u32
        } else {
            1
        }
    };
    match command {
        DrawCommand::Box { .. } => playback.box_grow_frames.max(1),
        DrawCommand::Line { from, to, .. } => travel(from.distance(*to)),
        DrawCommand::Branches { branches, .. } => travel(
            branches
                .iter()
                .map(|branch| branch.from.distance(branch.to))
                .fold(0.0, f64::max),
        ),
    }
}

/// The partial command shown `progress` (0..=1) of the way through.
fn partial(command: &DrawCommand, progress: f64) -> DrawCommand {
    match command {
        DrawCommand::Box { title, rect } => DrawCommand::Box {
            title: title.clone(),
            rect: rect.scaled_about_center(progress),
        },
        DrawCommand::Line { from, to, .. } => DrawCommand::Line {
            from: *from,
            to: from.lerp(*to, progress),
            arrow: None,
        },
        DrawCommand::Branches { origin, branches } => DrawCommand::Branches {
            origin: *origin,
            branches: branches
                .iter()
                .map(|branch| Branch {
                    label: branch.label.clone(),
                    from: branch.from,
                    to: branch.from.lerp(branch.to, progress),
                })
                .collect(),
        },
    }
}

/// Grow `command` frame by frame, then commit it.
pub async fn animate(command: &DrawCommand, ctx: &StepContext) -> Result<Completion, StepError> {
    let frames = frame_count(command, &ctx.playback);
    for frame in 1..=frames {
        if ctx.next_frame().await.is_cancelled() {
            return Ok(Completion::Cancelled);
        }
        if frame < frames {
            let progress = f64::from(frame) / f64::from(frames);
            ctx.surface.preview(&partial(command, progress), &ctx.token)?;
        }
    }

    if ctx.surface.commit(command, &ctx.token)? {
        Ok(Completion::Finished)
    } else {
        Ok(Completion::Cancelled)
    }
}

/// Run every step of `sequence` in order.
///
/// Each step is computed from its predecessor's cursor right before it
/// animates. The first failing step ends the sequence.
pub async fn run_sequence(
    sequence: &StepSequence,
    ctx: &StepContext,
) -> Result<Completion, StepError> {
    let mut cursor = sequence.origin;
    for (position, step) in sequence.steps.iter().enumerate() {
        if position > 0 && delay(ctx.step_delay(), ctx).await.is_cancelled() {
            return Ok(Completion::Cancelled);
        }
        let (command, next) = step.compute(cursor)?;
        debug!(
            "Visit {} step '{}' ({}/{})",
            sequence.visit_index,
            step.label,
            position + 1,
            sequence.len()
        );
        if animate(&command, ctx).await?.is_cancelled() {
            return Ok(Completion::Cancelled);
        }
        cursor = next;
    }
    Ok(Completion::Finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::RecordingSurface;
    use std::sync::{Arc, Mutex};
    use stepcast_core::{Point, Step, StepLayout, build_steps, testing};

    fn context(
        playback: PlaybackSettings,
    ) -> (
        StepContext,
        Arc<Mutex<RecordingSurface>>,
        crate::cancel::CancellationTrigger,
    ) {
        let shared = Arc::new(Mutex::new(RecordingSurface::new()));
        let (token, trigger) = CancellationToken::new();
        let ctx = StepContext {
            surface: SurfaceHandle::from_shared(Arc::clone(&shared)),
            clock: FrameClock::from_settings(&playback),
            token,
            playback,
        };
        (ctx, shared, trigger)
    }

    fn line(length: f64) -> DrawCommand {
        DrawCommand::Line {
            from: Point::new(0.0, 0.0),
            to: Point::new(0.0, length),
            arrow: None,
        }
    }

    #[test]
    fn frame_count_follows_distance_and_grow_frames() {
        let playback = PlaybackSettings::default();
        assert_eq!(frame_count(&line(30.0), &playback), 5);
        assert_eq!(frame_count(&line(31.0), &playback), 6);
        assert_eq!(frame_count(&line(0.0), &playback), 1);

        let (boxed, _) = Step::boxed("b", "Box", 10.0, 10.0)
            .compute(Point::default())
            .expect("box");
        assert_eq!(frame_count(&boxed, &playback), playback.box_grow_frames);
    }

    #[tokio::test(start_paused = true)]
    async fn animate_previews_then_commits() {
        let (ctx, shared, _trigger) = context(PlaybackSettings::default());
        let started = tokio::time::Instant::now();

        let outcome = animate(&line(30.0), &ctx).await.expect("animate");

        assert_eq!(outcome, Completion::Finished);
        assert!(started.elapsed() >= ctx.clock.frame_interval() * 5);
        let surface = shared.lock().expect("lock");
        assert_eq!(surface.committed(), &[line(30.0)]);
        assert_eq!(surface.preview_count(), 4);
        assert!(surface.last_preview().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_animation_commits_nothing() {
        let (ctx, shared, trigger) = context(PlaybackSettings::default());
        let command = line(600.0);
        let task_ctx = ctx.clone();
        let handle = tokio::spawn(async move { animate(&command, &task_ctx).await });

        tokio::time::sleep(ctx.clock.frame_interval() * 3).await;
        trigger.cancel();
        let outcome = handle.await.expect("join").expect("animate");

        assert_eq!(outcome, Completion::Cancelled);
        assert!(shared.lock().expect("lock").committed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_sequence_commits_the_plan() {
        let (ctx, shared, _trigger) = context(PlaybackSettings::default());
        let sequence = build_steps(
            &testing::advertiser(0, "shoes.example", &["running"]),
            &StepLayout::default(),
        )
        .expect("steps");

        let outcome = run_sequence(&sequence, &ctx).await.expect("run");

        assert_eq!(outcome, Completion::Finished);
        assert_eq!(
            shared.lock().expect("lock").committed(),
            sequence.plan().commands.as_slice()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_sequence_stops_at_invalid_step() {
        let (ctx, shared, _trigger) = context(PlaybackSettings::default());
        let sequence = StepSequence {
            visit_index: 4,
            origin: Point::new(10.0, 10.0),
            steps: vec![
                Step::line("first", 0.0, 12.0, None),
                Step::boxed("broken", "Broken", -1.0, 5.0),
                Step::line("never", 0.0, 12.0, None),
            ],
        };

        let err = run_sequence(&sequence, &ctx).await.expect_err("invalid box");

        assert!(matches!(err, StepError::InvalidGeometry { ref step, .. } if step == "broken"));
        assert_eq!(shared.lock().expect("lock").committed().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_resolves_early_on_cancel() {
        let (ctx, _shared, trigger) = context(PlaybackSettings::default());
        trigger.cancel();
        let started = tokio::time::Instant::now();
        assert_eq!(
            delay(Duration::from_secs(60), &ctx).await,
            Completion::Cancelled
        );
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
