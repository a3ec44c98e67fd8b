//! Shared stepcast configuration types.
//!
//! The player reads `stepcast.toml` (or an embedded string) into
//! [`StepcastConfig`]. Every field has a serde default so partial files are
//! accepted; [`apply_compat_fallbacks`] repairs values the player cannot use.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "stepcast.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("toml encode error: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Top-level configuration (persisted as `stepcast.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StepcastConfig {
    #[serde(default)]
    pub playback: PlaybackSettings,
    #[serde(default)]
    pub layout: LayoutSettings,
    #[serde(default)]
    pub bubbles: BubbleSettings,
}

impl StepcastConfig {
    /// Parse TOML and apply compatibility fallbacks.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(raw)?;
        apply_compat_fallbacks(&mut config);
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackSettings {
    /// Delay between animation frames.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// Pause inserted between two steps of the same visit.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// Pixels a line grows per frame.
    #[serde(default = "default_line_speed")]
    pub line_speed: f64,
    /// Frames a box takes to grow to full size.
    #[serde(default = "default_box_grow_frames")]
    pub box_grow_frames: u32,
    /// Start in autoplay rather than interactive mode.
    #[serde(default = "default_true")]
    pub autoplay: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval_ms(),
            step_delay_ms: default_step_delay_ms(),
            line_speed: default_line_speed(),
            box_grow_frames: default_box_grow_frames(),
            autoplay: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutSettings {
    #[serde(default = "default_origin_x")]
    pub origin_x: f64,
    #[serde(default = "default_origin_y")]
    pub origin_y: f64,
    #[serde(default = "default_visit_spacing")]
    pub visit_spacing: f64,
    #[serde(default = "default_box_width")]
    pub box_width: f64,
    #[serde(default = "default_box_height")]
    pub box_height: f64,
    #[serde(default = "default_line_length")]
    pub line_length: f64,
    #[serde(default = "default_branch_spacing")]
    pub branch_spacing: f64,
    #[serde(default = "default_branch_length")]
    pub branch_length: f64,
    #[serde(default = "default_arrow_size")]
    pub arrow_size: f64,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            origin_x: default_origin_x(),
            origin_y: default_origin_y(),
            visit_spacing: default_visit_spacing(),
            box_width: default_box_width(),
            box_height: default_box_height(),
            line_length: default_line_length(),
            branch_spacing: default_branch_spacing(),
            branch_length: default_branch_length(),
            arrow_size: default_arrow_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CanvasSettings {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BubbleSettings {
    #[serde(default = "default_min_gap")]
    pub min_gap: f64,
    /// Badge shown next to the timeline.
    #[serde(default = "default_compact_canvas")]
    pub compact: CanvasSettings,
    /// Full-size bubble view.
    #[serde(default = "default_expanded_canvas")]
    pub expanded: CanvasSettings,
}

impl Default for BubbleSettings {
    fn default() -> Self {
        Self {
            min_gap: default_min_gap(),
            compact: default_compact_canvas(),
            expanded: default_expanded_canvas(),
        }
    }
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_frame_interval_ms() -> u64 {
    16
}
fn default_step_delay_ms() -> u64 {
    250
}
fn default_line_speed() -> f64 {
    6.0
}
fn default_box_grow_frames() -> u32 {
    12
}
fn default_origin_x() -> f64 {
    60.0
}
fn default_origin_y() -> f64 {
    40.0
}
fn default_visit_spacing() -> f64 {
    160.0
}
fn default_box_width() -> f64 {
    140.0
}
fn default_box_height() -> f64 {
    36.0
}
fn default_line_length() -> f64 {
    30.0
}
fn default_branch_spacing() -> f64 {
    48.0
}
fn default_branch_length() -> f64 {
    40.0
}
fn default_arrow_size() -> f64 {
    6.0
}
fn default_compact_canvas() -> CanvasSettings {
    CanvasSettings {
        width: 48.0,
        height: 48.0,
    }
}
fn default_expanded_canvas() -> CanvasSettings {
    CanvasSettings {
        width: 480.0,
        height: 480.0,
    }
}
fn default_min_gap() -> f64 {
    2.0
}

fn usable(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Replace values the player cannot work with by their defaults.
/// Returns true when any field was updated.
pub fn apply_compat_fallbacks(config: &mut StepcastConfig) -> bool {
    let mut changed = false;

    let playback = &mut config.playback;
    if playback.frame_interval_ms == 0 {
        playback.frame_interval_ms = default_frame_interval_ms();
        changed = true;
    }
    if !usable(playback.line_speed) {
        playback.line_speed = default_line_speed();
        changed = true;
    }
    if playback.box_grow_frames == 0 {
        playback.box_grow_frames = default_box_grow_frames();
        changed = true;
    }

    let layout = &mut config.layout;
    let defaults = LayoutSettings::default();
    for (value, fallback) in [
        (&mut layout.box_width, defaults.box_width),
        (&mut layout.box_height, defaults.box_height),
        (&mut layout.line_length, defaults.line_length),
        (&mut layout.branch_length, defaults.branch_length),
    ] {
        if !usable(*value) {
            *value = fallback;
            changed = true;
        }
    }
    for (value, fallback) in [
        (&mut layout.origin_x, defaults.origin_x),
        (&mut layout.origin_y, defaults.origin_y),
        (&mut layout.visit_spacing, defaults.visit_spacing),
        (&mut layout.branch_spacing, defaults.branch_spacing),
    ] {
        if !value.is_finite() {
            *value = fallback;
            changed = true;
        }
    }
    if !layout.arrow_size.is_finite() || layout.arrow_size < 0.0 {
        layout.arrow_size = defaults.arrow_size;
        changed = true;
    }

    let bubbles = &mut config.bubbles;
    if !usable(bubbles.compact.width) || !usable(bubbles.compact.height) {
        bubbles.compact = default_compact_canvas();
        changed = true;
    }
    if !usable(bubbles.expanded.width) || !usable(bubbles.expanded.height) {
        bubbles.expanded = default_expanded_canvas();
        changed = true;
    }
    if !bubbles.min_gap.is_finite() || bubbles.min_gap < 0.0 {
        bubbles.min_gap = default_min_gap();
        changed = true;
    }

    changed
}
