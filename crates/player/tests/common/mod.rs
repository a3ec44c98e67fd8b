#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use stepcast_core::{DrawCommand, Timeline, testing};
use stepcast_player::{
    RecordingSurface, Surface, SurfaceError, SurfaceHandle, TimelineController, TimelineObserver,
};
use stepcast_runtime_config::StepcastConfig;

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Records callbacks, and optionally what the surface showed at each
/// `visit_completed`.
#[derive(Default)]
pub struct RecordingObserver {
    completed: Mutex<Vec<usize>>,
    bubble_counts: Mutex<Vec<usize>>,
    frames: Mutex<BTreeMap<usize, Vec<DrawCommand>>>,
    surface: Option<Arc<Mutex<RecordingSurface>>>,
}

impl RecordingObserver {
    pub fn watching(surface: &Arc<Mutex<RecordingSurface>>) -> Self {
        Self {
            surface: Some(Arc::clone(surface)),
            ..Self::default()
        }
    }

    pub fn completed(&self) -> Vec<usize> {
        self.completed.lock().expect("completed").clone()
    }

    pub fn bubble_counts(&self) -> Vec<usize> {
        self.bubble_counts.lock().expect("bubble counts").clone()
    }

    /// Committed picture right after visit `index` completed.
    pub fn frame_after(&self, index: usize) -> Option<Vec<DrawCommand>> {
        self.frames.lock().expect("frames").get(&index).cloned()
    }
}

impl TimelineObserver for RecordingObserver {
    fn visit_completed(&self, index: usize) {
        self.completed.lock().expect("completed").push(index);
        if let Some(surface) = &self.surface {
            let committed = surface.lock().expect("surface").committed().to_vec();
            self.frames.lock().expect("frames").insert(index, committed);
        }
    }

    fn bubble_count_changed(&self, count: usize) {
        self.bubble_counts.lock().expect("bubble counts").push(count);
    }
}

/// Surface that refuses to commit one box title.
pub struct FailingSurface {
    pub inner: RecordingSurface,
    pub reject_title: String,
}

impl FailingSurface {
    pub fn rejecting(title: &str) -> Self {
        Self {
            inner: RecordingSurface::new(),
            reject_title: title.to_string(),
        }
    }
}

impl Surface for FailingSurface {
    fn draw(&mut self, command: &DrawCommand) -> Result<(), SurfaceError> {
        if let DrawCommand::Box { title, .. } = command
            && *title == self.reject_title
        {
            return Err(SurfaceError(format!("cannot draw '{title}'")));
        }
        self.inner.draw(command)
    }

    fn preview(&mut self, command: &DrawCommand) -> Result<(), SurfaceError> {
        self.inner.preview(command)
    }

    fn clear(&mut self) {
        self.inner.clear();
    }
}

pub struct Harness {
    pub controller: TimelineController,
    pub surface: Arc<Mutex<RecordingSurface>>,
    pub observer: Arc<RecordingObserver>,
}

impl Harness {
    pub fn new(timeline: Timeline, config: &StepcastConfig) -> Self {
        init_test_tracing();
        let surface = Arc::new(Mutex::new(RecordingSurface::new()));
        let observer = Arc::new(RecordingObserver::watching(&surface));
        let controller = TimelineController::new(
            timeline,
            SurfaceHandle::from_shared(Arc::clone(&surface)),
            config,
            vec![observer.clone() as Arc<dyn TimelineObserver>],
        );
        Self {
            controller,
            surface,
            observer,
        }
    }

    pub fn sample() -> Self {
        Self::new(testing::sample_timeline(), &StepcastConfig::default())
    }

    pub fn committed(&self) -> Vec<DrawCommand> {
        self.surface.lock().expect("surface").committed().to_vec()
    }

    pub fn preview_count(&self) -> usize {
        self.surface.lock().expect("surface").preview_count()
    }

    /// What a linear playback leaves on screen after visit `last`.
    pub fn expected_through(&self, last: Option<usize>) -> Vec<DrawCommand> {
        let session = self.controller.session();
        match last {
            Some(last) => (0..=last).flat_map(|i| session.plan(i).to_vec()).collect(),
            None => Vec::new(),
        }
    }
}
