//! Per-controller session state.
//!
//! A [`TimelineSession`] owns the visits, their step sequences and re-render
//! plans, the playback state and the current bubble layout. It is created once
//! per controller and zeroed on reset.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use stepcast_core::{
    BubbleLayoutEngine, BubbleNode, CanvasSize, DrawCommand, Point, StepLayout, StepSequence,
    Timeline, build_steps,
};
use stepcast_runtime_config::{BubbleSettings, LayoutSettings};
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::observer::TimelineObserver;
use crate::surface::SurfaceHandle;

/// Snapshot of where playback stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineState {
    pub current_index: usize,
    pub visited: Vec<bool>,
    pub is_paused: bool,
    pub is_interactive: bool,
}

impl TimelineState {
    pub fn new(len: usize, is_interactive: bool) -> Self {
        Self {
            current_index: 0,
            visited: vec![false; len],
            is_paused: true,
            is_interactive,
        }
    }

    pub fn first_unvisited(&self) -> Option<usize> {
        self.visited.iter().position(|visited| !visited)
    }

    pub fn visited_count(&self) -> usize {
        self.visited.iter().filter(|visited| **visited).count()
    }

    /// Last index of the contiguous visited run starting at visit 0.
    pub fn visited_prefix_end(&self) -> Option<usize> {
        match self.first_unvisited() {
            Some(first) => first.checked_sub(1),
            None => self.visited.len().checked_sub(1),
        }
    }

    /// Mark `0..=last` visited and everything after it unvisited.
    fn set_prefix(&mut self, last: Option<usize>) {
        for (index, visited) in self.visited.iter_mut().enumerate() {
            *visited = last.is_some_and(|last| index <= last);
        }
        self.current_index = last.unwrap_or(0);
    }
}

pub fn step_layout(settings: &LayoutSettings) -> StepLayout {
    StepLayout {
        origin: Point::new(settings.origin_x, settings.origin_y),
        visit_spacing: settings.visit_spacing,
        box_width: settings.box_width,
        box_height: settings.box_height,
        line_length: settings.line_length,
        branch_spacing: settings.branch_spacing,
        branch_length: settings.branch_length,
        arrow_size: settings.arrow_size,
    }
}

pub fn bubble_engine(settings: &BubbleSettings) -> BubbleLayoutEngine {
    BubbleLayoutEngine::new(
        CanvasSize::new(settings.compact.width, settings.compact.height),
        CanvasSize::new(settings.expanded.width, settings.expanded.height),
        settings.min_gap,
    )
}

struct Live {
    state: TimelineState,
    bubbles: Vec<BubbleNode>,
}

pub struct TimelineSession {
    timeline: Timeline,
    sequences: Vec<Option<StepSequence>>,
    /// Commands a finished linear playback of each visit leaves on screen.
    plans: Vec<Vec<DrawCommand>>,
    engine: BubbleLayoutEngine,
    observers: Vec<Arc<dyn TimelineObserver>>,
    live: Mutex<Live>,
}

impl std::fmt::Debug for TimelineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineSession")
            .field("visits", &self.timeline.len())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl TimelineSession {
    pub fn new(
        timeline: Timeline,
        layout: &StepLayout,
        engine: BubbleLayoutEngine,
        observers: Vec<Arc<dyn TimelineObserver>>,
        is_interactive: bool,
    ) -> Self {
        let sequences: Vec<Option<StepSequence>> = timeline
            .visits()
            .iter()
            .map(|visit| {
                let sequence = build_steps(visit, layout);
                if sequence.is_none() {
                    debug!(
                        "Visit {} by '{}' has no steps",
                        visit.index,
                        visit.actor.as_str()
                    );
                }
                sequence
            })
            .collect();

        let plans = sequences
            .iter()
            .map(|sequence| match sequence {
                Some(sequence) => {
                    let plan = sequence.plan();
                    if let Some(failure) = &plan.failure {
                        warn!("Visit {} cannot complete: {failure}", sequence.visit_index);
                    }
                    plan.commands
                }
                None => Vec::new(),
            })
            .collect();

        let live = Live {
            state: TimelineState::new(timeline.len(), is_interactive),
            bubbles: Vec::new(),
        };

        Self {
            timeline,
            sequences,
            plans,
            engine,
            observers,
            live: Mutex::new(live),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Live> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    pub fn sequence(&self, index: usize) -> Option<&StepSequence> {
        self.sequences.get(index).and_then(Option::as_ref)
    }

    pub fn plan(&self, index: usize) -> &[DrawCommand] {
        self.plans.get(index).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn state(&self) -> TimelineState {
        self.lock().state.clone()
    }

    pub fn bubbles(&self) -> Vec<BubbleNode> {
        self.lock().bubbles.clone()
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut TimelineState) -> R) -> R {
        f(&mut self.lock().state)
    }

    /// Redraw every visited visit from its plan, without animation.
    pub fn render(&self, surface: &SurfaceHandle) {
        let visited = self.lock().state.visited.clone();
        surface.redraw(
            visited
                .iter()
                .enumerate()
                .filter(|(_, visited)| **visited)
                .map(|(index, _)| (index, self.plan(index))),
        );
    }

    /// Put the state where a linear playback stopped after `last` would be.
    /// Returns the new bubble count if it changed.
    pub fn seek(&self, last: Option<usize>) -> Option<usize> {
        let mut live = self.lock();
        live.state.set_prefix(last);
        self.refresh_bubbles(&mut live)
    }

    /// Record the end of a played visit unless its run was cancelled.
    ///
    /// Failed visits still count as visited so the visited set matches what
    /// a re-render shows; only successful ones reach `visit_completed`.
    pub fn finish_visit(&self, index: usize, token: &CancellationToken, succeeded: bool) {
        let bubble_count = {
            let mut live = self.lock();
            if token.is_cancelled() {
                return;
            }
            if let Some(visited) = live.state.visited.get_mut(index) {
                *visited = true;
            }
            live.state.current_index = index;
            self.refresh_bubbles(&mut live)
        };

        if succeeded {
            for observer in &self.observers {
                observer.visit_completed(index);
            }
        }
        if let Some(count) = bubble_count {
            self.notify_bubble_count(count);
        }
    }

    /// Zero the state. Returns the new bubble count if it changed.
    pub fn reset(&self) -> Option<usize> {
        let mut live = self.lock();
        let is_interactive = live.state.is_interactive;
        live.state = TimelineState::new(self.timeline.len(), is_interactive);
        self.refresh_bubbles(&mut live)
    }

    pub fn notify_bubble_count(&self, count: usize) {
        for observer in &self.observers {
            observer.bubble_count_changed(count);
        }
    }

    fn refresh_bubbles(&self, live: &mut Live) -> Option<usize> {
        let data = self.timeline.bubble_data(&live.state.visited);
        let before = live.bubbles.len();
        live.bubbles = self.engine.layout(&data);
        (live.bubbles.len() != before).then_some(live.bubbles.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::RecordingSurface;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use stepcast_core::testing;
    use stepcast_runtime_config::StepcastConfig;

    #[derive(Default)]
    struct Counter {
        completed: AtomicUsize,
        bubbles: AtomicUsize,
    }

    impl TimelineObserver for Counter {
        fn visit_completed(&self, _index: usize) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }

        fn bubble_count_changed(&self, count: usize) {
            self.bubbles.store(count, Ordering::SeqCst);
        }
    }

    fn session(observers: Vec<Arc<dyn TimelineObserver>>) -> TimelineSession {
        let config = StepcastConfig::default();
        TimelineSession::new(
            testing::sample_timeline(),
            &step_layout(&config.layout),
            bubble_engine(&config.bubbles),
            observers,
            false,
        )
    }

    #[test]
    fn sequences_exist_only_for_participating_visits() {
        let session = session(Vec::new());
        assert!(session.sequence(0).is_some());
        assert!(session.sequence(1).is_some());
        assert!(session.sequence(2).is_none());
        assert!(session.plan(2).is_empty());
        assert!(session.plan(99).is_empty());
    }

    #[test]
    fn seek_sets_a_visited_prefix_and_bubbles() {
        let session = session(Vec::new());
        assert_eq!(session.seek(Some(1)), Some(2));
        let state = session.state();
        assert_eq!(state.visited, vec![true, true, false, false]);
        assert_eq!(state.current_index, 1);
        assert_eq!(state.first_unvisited(), Some(2));

        assert_eq!(session.seek(Some(1)), None);
        assert_eq!(session.seek(None), Some(0));
        assert_eq!(session.state().visited_count(), 0);
    }

    #[test]
    fn visited_prefix_end_stops_at_the_first_gap() {
        let mut state = TimelineState::new(4, true);
        assert_eq!(state.visited_prefix_end(), None);

        state.visited = vec![true, true, false, true];
        assert_eq!(state.visited_prefix_end(), Some(1));

        state.visited = vec![false, true, true, true];
        assert_eq!(state.visited_prefix_end(), None);

        state.visited = vec![true; 4];
        assert_eq!(state.visited_prefix_end(), Some(3));
        assert_eq!(TimelineState::new(0, false).visited_prefix_end(), None);
    }

    #[test]
    fn cancelled_finish_is_ignored() {
        let counter = Arc::new(Counter::default());
        let session = session(vec![counter.clone() as Arc<dyn TimelineObserver>]);
        let (token, trigger) = CancellationToken::new();

        session.finish_visit(0, &token, true);
        assert_eq!(counter.completed.load(Ordering::SeqCst), 1);
        assert_eq!(counter.bubbles.load(Ordering::SeqCst), 2);

        trigger.cancel();
        session.finish_visit(3, &token, true);
        assert_eq!(session.state().visited, vec![true, false, false, false]);
        assert_eq!(counter.completed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_visit_is_marked_but_not_reported() {
        let counter = Arc::new(Counter::default());
        let session = session(vec![counter.clone() as Arc<dyn TimelineObserver>]);
        let (token, _trigger) = CancellationToken::new();

        session.finish_visit(1, &token, false);

        assert!(session.state().visited[1]);
        assert_eq!(counter.completed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn render_draws_visited_plans_in_order() {
        let session = session(Vec::new());
        let shared = Arc::new(Mutex::new(RecordingSurface::new()));
        let surface = SurfaceHandle::from_shared(Arc::clone(&shared));

        session.seek(Some(1));
        session.render(&surface);

        let expected: Vec<DrawCommand> = [session.plan(0), session.plan(1)].concat();
        assert_eq!(shared.lock().expect("lock").committed(), expected.as_slice());
        assert_eq!(shared.lock().expect("lock").preview_count(), 0);
    }
}
