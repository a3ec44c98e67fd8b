use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stepcast_core::{DrawCommand, StepError};

use crate::cancel::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SurfaceError(pub String);

impl From<SurfaceError> for StepError {
    fn from(err: SurfaceError) -> Self {
        StepError::Surface(err.0)
    }
}

/// Rendering target driven by the player.
///
/// `draw` commits a finished command to the persistent picture; `preview`
/// shows an in-progress animation frame that the next frame replaces.
pub trait Surface: Send {
    fn draw(&mut self, command: &DrawCommand) -> Result<(), SurfaceError>;

    fn preview(&mut self, _command: &DrawCommand) -> Result<(), SurfaceError> {
        Ok(())
    }

    /// Wipe both committed and previewed content.
    fn clear(&mut self);
}

/// Shared, lockable handle to the surface used by every visit task.
#[derive(Clone)]
pub struct SurfaceHandle {
    inner: Arc<Mutex<dyn Surface>>,
}

impl std::fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceHandle").finish_non_exhaustive()
    }
}

impl SurfaceHandle {
    pub fn new<S: Surface + 'static>(surface: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(surface)),
        }
    }

    /// Wrap a surface the host keeps its own handle to.
    pub fn from_shared<S: Surface + 'static>(surface: Arc<Mutex<S>>) -> Self {
        Self { inner: surface }
    }

    fn lock(&self) -> MutexGuard<'_, dyn Surface + 'static> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Show an animation frame unless `token` has been cancelled.
    pub fn preview(
        &self,
        command: &DrawCommand,
        token: &CancellationToken,
    ) -> Result<(), SurfaceError> {
        let mut surface = self.lock();
        if token.is_cancelled() {
            return Ok(());
        }
        surface.preview(command)
    }

    /// Commit `command` unless `token` has been cancelled.
    ///
    /// The check happens under the surface lock, so a caller that cancels and
    /// then redraws never sees a stale commit land after its redraw.
    pub fn commit(
        &self,
        command: &DrawCommand,
        token: &CancellationToken,
    ) -> Result<bool, SurfaceError> {
        let mut surface = self.lock();
        if token.is_cancelled() {
            return Ok(false);
        }
        surface.draw(command)?;
        Ok(true)
    }

    /// Clear and synchronously draw `commands`, without animation.
    ///
    /// Each inner list belongs to one visit; a surface error stops drawing
    /// that visit but not the following ones.
    pub fn redraw<'a, I>(&self, visits: I)
    where
        I: IntoIterator<Item = (usize, &'a [DrawCommand])>,
    {
        let mut surface = self.lock();
        surface.clear();
        for (index, commands) in visits {
            for command in commands {
                if let Err(e) = surface.draw(command) {
                    tracing::warn!("Redraw of visit {index} stopped: {e}");
                    break;
                }
            }
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// In-memory surface that keeps every committed command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingSurface {
    committed: Vec<DrawCommand>,
    last_preview: Option<DrawCommand>,
    previews: usize,
    clears: usize,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands currently making up the picture, oldest first.
    pub fn committed(&self) -> &[DrawCommand] {
        &self.committed
    }

    pub fn last_preview(&self) -> Option<&DrawCommand> {
        self.last_preview.as_ref()
    }

    /// Animation frames shown since creation.
    pub fn preview_count(&self) -> usize {
        self.previews
    }

    pub fn clear_count(&self) -> usize {
        self.clears
    }

    /// Box titles in commit order, handy for asserting on the picture.
    pub fn box_titles(&self) -> Vec<&str> {
        self.committed
            .iter()
            .filter_map(|command| match command {
                DrawCommand::Box { title, .. } => Some(title.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Surface for RecordingSurface {
    fn draw(&mut self, command: &DrawCommand) -> Result<(), SurfaceError> {
        self.last_preview = None;
        self.committed.push(command.clone());
        Ok(())
    }

    fn preview(&mut self, command: &DrawCommand) -> Result<(), SurfaceError> {
        self.last_preview = Some(command.clone());
        self.previews += 1;
        Ok(())
    }

    fn clear(&mut self) {
        self.committed.clear();
        self.last_preview = None;
        self.clears += 1;
    }
}
