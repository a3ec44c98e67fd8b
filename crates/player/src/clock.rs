use std::time::Duration;
use stepcast_runtime_config::PlaybackSettings;
use tokio::time::Instant;

/// Frame pacing for animated steps.
#[derive(Debug, Clone)]
pub struct FrameClock {
    frame_interval: Duration,
    epoch: Instant,
}

impl FrameClock {
    pub fn new(frame_interval: Duration) -> Self {
        Self {
            frame_interval,
            epoch: Instant::now(),
        }
    }

    pub fn from_settings(settings: &PlaybackSettings) -> Self {
        Self::new(Duration::from_millis(settings.frame_interval_ms))
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Suspend until the next render frame.
    pub async fn next_frame(&self) {
        tokio::time::sleep(self.frame_interval).await;
    }

    /// Time since the clock was created.
    pub fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}
