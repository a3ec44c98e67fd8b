use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stepcast_core::{BubbleNode, Timeline};
use stepcast_runtime_config::{PlaybackSettings, StepcastConfig};
use tracing::{debug, info};

use crate::cancel::{CancellationToken, CancellationTrigger};
use crate::clock::FrameClock;
use crate::error::{PlayerError, Result};
use crate::observer::TimelineObserver;
use crate::primitives::{Completion, StepContext, run_sequence};
use crate::scheduler::{ScheduledTask, SchedulerState, TaskScheduler, task};
use crate::session::{TimelineSession, TimelineState, bubble_engine, step_layout};
use crate::surface::SurfaceHandle;

/// Token shared by every task queued since the last scrub, reset or mode
/// change. Replacing it cancels whatever is still in flight.
struct Epoch {
    token: CancellationToken,
    trigger: CancellationTrigger,
}

impl Epoch {
    fn new() -> Self {
        let (token, trigger) = CancellationToken::new();
        Self { token, trigger }
    }
}

/// Drives playback of one timeline.
///
/// In autoplay mode every visit is queued on the [`TaskScheduler`] and played
/// in order; `next`/`prev` scrub by skipping queued visits and redrawing the
/// visited prefix without animation. In interactive mode visits only play
/// when requested through [`TimelineController::visit`].
pub struct TimelineController {
    session: Arc<TimelineSession>,
    scheduler: TaskScheduler,
    surface: SurfaceHandle,
    clock: FrameClock,
    playback: PlaybackSettings,
    epoch: Mutex<Epoch>,
}

impl std::fmt::Debug for TimelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineController")
            .field("session", &self.session)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl TimelineController {
    pub fn new(
        timeline: Timeline,
        surface: SurfaceHandle,
        config: &StepcastConfig,
        observers: Vec<Arc<dyn TimelineObserver>>,
    ) -> Self {
        let session = TimelineSession::new(
            timeline,
            &step_layout(&config.layout),
            bubble_engine(&config.bubbles),
            observers,
            !config.playback.autoplay,
        );
        info!(
            "Timeline session ready: {} visits, {}",
            session.len(),
            if config.playback.autoplay {
                "autoplay"
            } else {
                "interactive"
            }
        );

        Self {
            session: Arc::new(session),
            scheduler: TaskScheduler::new(),
            surface,
            clock: FrameClock::from_settings(&config.playback),
            playback: config.playback.clone(),
            epoch: Mutex::new(Epoch::new()),
        }
    }

    /// Build a controller from a JSON array of visits.
    pub fn from_json(
        json: &str,
        surface: SurfaceHandle,
        config: &StepcastConfig,
        observers: Vec<Arc<dyn TimelineObserver>>,
    ) -> Result<Self> {
        let timeline = Timeline::from_json(json)?;
        Ok(Self::new(timeline, surface, config, observers))
    }

    pub fn session(&self) -> &TimelineSession {
        &self.session
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn state(&self) -> TimelineState {
        self.session.state()
    }

    pub fn current_index(&self) -> usize {
        self.session.state().current_index
    }

    pub fn visited(&self) -> Vec<bool> {
        self.session.state().visited
    }

    pub fn bubbles(&self) -> Vec<BubbleNode> {
        self.session.bubbles()
    }

    /// Resolves once no visit task is running.
    pub async fn wait_idle(&self) {
        self.scheduler.wait_idle().await;
    }

    /// Start or resume autoplay.
    pub fn play(&self) {
        if self.session.state().is_interactive {
            debug!("play() ignored in interactive mode");
            return;
        }
        match self.scheduler.state() {
            SchedulerState::Paused => self.scheduler.resume(),
            SchedulerState::Running => {}
            SchedulerState::Idle | SchedulerState::Stopped => {
                if self.scheduler.is_empty() {
                    let from = self.session.state().first_unvisited();
                    self.enqueue_all(&self.current_token());
                    self.scheduler
                        .skip_to(from.map_or(usize::MAX, |index| self.offset(index)));
                }
                self.scheduler.start();
            }
        }
        self.session.update(|state| state.is_paused = false);
    }

    /// Pause after the in-flight step finishes.
    pub fn pause(&self) {
        self.scheduler.pause();
        self.session.update(|state| state.is_paused = true);
    }

    /// Advance to the next visit. Returns false at the end of the timeline.
    pub fn next(&self) -> bool {
        let state = self.session.state();
        let target = match state.visited.get(state.current_index).copied() {
            Some(false) => state.current_index,
            Some(true) if state.current_index + 1 < state.visited.len() => {
                state.current_index + 1
            }
            _ => return false,
        };
        self.seek(Some(target));
        true
    }

    /// Step back one visit. From the first visit this rewinds to the empty
    /// state. Returns false when nothing is visited.
    pub fn prev(&self) -> bool {
        let state = self.session.state();
        if state.visited_count() == 0 {
            return false;
        }
        self.seek(state.current_index.checked_sub(1));
        true
    }

    /// Show the timeline as a linear playback stopped after `index`.
    pub fn jump_to(&self, index: usize) -> Result<()> {
        let len = self.session.len();
        if index >= len {
            return Err(PlayerError::VisitOutOfRange { index, len });
        }
        self.seek(Some(index));
        Ok(())
    }

    /// Cancel everything and return to the empty state.
    pub fn reset(&self) {
        self.renew_epoch();
        self.scheduler.stop();
        self.scheduler.clear();
        let bubble_count = self.session.reset();
        self.surface.clear();
        info!("Timeline reset");
        if let Some(count) = bubble_count {
            self.session.notify_bubble_count(count);
        }
    }

    /// Switch between autoplay and interactive mode. Returns true when the
    /// controller is now interactive.
    ///
    /// Interactive visits can leave gaps in the visited set. Leaving the mode
    /// keeps only the contiguous visited run from visit 0, so autoplay picks
    /// up where a linear playback of that run would.
    pub fn toggle_interactive_mode(&self) -> bool {
        self.renew_epoch();
        self.scheduler.stop();
        self.scheduler.clear();
        let (interactive, last) = self.session.update(|state| {
            state.is_interactive = !state.is_interactive;
            state.is_paused = true;
            (state.is_interactive, state.visited_prefix_end())
        });
        if interactive {
            self.surface.clear();
        } else {
            self.seek(last);
        }
        info!(
            "Switched to {} mode",
            if interactive { "interactive" } else { "autoplay" }
        );
        interactive
    }

    /// Play a single visit on demand. Interactive mode only.
    pub fn visit(&self, index: usize) -> Result<()> {
        let state = self.session.state();
        if !state.is_interactive {
            return Err(PlayerError::NotInteractive);
        }
        if index >= state.visited.len() {
            return Err(PlayerError::VisitOutOfRange {
                index,
                len: state.visited.len(),
            });
        }

        let token = self.renew_epoch();
        self.scheduler.stop();
        self.scheduler.clear();
        self.surface.clear();
        self.scheduler
            .add_visit(index, [self.visit_task(index, &token)]);
        self.scheduler.start();
        self.session.update(|state| state.is_paused = false);
        Ok(())
    }

    /// Rebuild the queue and redraw so the screen matches a linear playback
    /// stopped after `last` (`None` is the empty state).
    fn seek(&self, last: Option<usize>) {
        let resume = {
            let state = self.session.state();
            !state.is_paused && !state.is_interactive
        };

        let token = self.renew_epoch();
        self.scheduler.stop();
        self.scheduler.clear();
        self.enqueue_all(&token);
        let skip = last.map_or(0, |index| self.offset(index) + 1);
        self.scheduler.skip_to(skip);

        let bubble_count = self.session.seek(last);
        self.session.render(&self.surface);
        debug!("Seeked to {last:?}, {} visits left", self.scheduler.len());

        if resume {
            self.scheduler.start();
        }
        if let Some(count) = bubble_count {
            self.session.notify_bubble_count(count);
        }
    }

    fn enqueue_all(&self, token: &CancellationToken) {
        for index in 0..self.session.len() {
            self.scheduler
                .add_visit(index, [self.visit_task(index, token)]);
        }
    }

    fn offset(&self, index: usize) -> usize {
        self.scheduler.bookmark(index).unwrap_or(index)
    }

    fn visit_task(&self, index: usize, token: &CancellationToken) -> ScheduledTask {
        let session = Arc::clone(&self.session);
        let ctx = StepContext {
            surface: self.surface.clone(),
            clock: self.clock.clone(),
            token: token.clone(),
            playback: self.playback.clone(),
        };
        task(move || play_visit(session, index, ctx))
    }

    fn epoch(&self) -> MutexGuard<'_, Epoch> {
        self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_token(&self) -> CancellationToken {
        self.epoch().token.clone()
    }

    /// Cancel the current epoch and hand out the token of a fresh one.
    fn renew_epoch(&self) -> CancellationToken {
        let mut epoch = self.epoch();
        epoch.trigger.cancel();
        *epoch = Epoch::new();
        epoch.token.clone()
    }
}

impl Drop for TimelineController {
    fn drop(&mut self) {
        self.epoch().trigger.cancel();
        self.scheduler.clear();
    }
}

async fn play_visit(session: Arc<TimelineSession>, index: usize, ctx: StepContext) -> Result<()> {
    if ctx.token.is_cancelled() {
        return Ok(());
    }
    let outcome = match session.sequence(index) {
        Some(sequence) => run_sequence(sequence, &ctx).await,
        None => Ok(Completion::Finished),
    };
    match outcome {
        Ok(Completion::Cancelled) => {
            debug!("Visit {index} cancelled");
            Ok(())
        }
        Ok(Completion::Finished) => {
            session.finish_visit(index, &ctx.token, true);
            Ok(())
        }
        Err(source) => {
            session.finish_visit(index, &ctx.token, false);
            Err(PlayerError::Step { index, source })
        }
    }
}
