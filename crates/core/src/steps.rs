//! Step graph for one visit.
//!
//! A [`Step`] is a pure function from the cursor left by its predecessor to
//! the draw command it animates plus the cursor it hands forward. Folding the
//! steps of a [`StepSequence`] from its origin reproduces exactly what a
//! linear playback of that visit commits, which is what scrubbing relies on.

use serde::{Deserialize, Serialize};

use crate::error::StepError;
use crate::geometry::{Direction, Point, Rect};
use crate::timeline::{ActorType, VisitEvent};

/// Bidders shown for a publisher visit that does not name any.
pub const DEFAULT_BIDDERS: &[&str] = &["DSP 1", "DSP 2"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arrow {
    pub size: f64,
    pub at: Point,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub label: String,
    pub from: Point,
    pub to: Point,
}

/// A committed draw action, as handed to the rendering surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrawCommand {
    Box {
        title: String,
        rect: Rect,
    },
    Line {
        from: Point,
        to: Point,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arrow: Option<Arrow>,
    },
    Branches {
        origin: Point,
        branches: Vec<Branch>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Box hanging from the cursor. Hands forward its bottom centre.
    Box {
        title: String,
        width: f64,
        height: f64,
    },
    /// Line from the cursor by `(dx, dy)`, optionally capped with an arrow head.
    Line {
        dx: f64,
        dy: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arrow: Option<f64>,
    },
    /// Fan of lines below the cursor. Hands forward the end of the centre line.
    Branches {
        labels: Vec<String>,
        spacing: f64,
        length: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub label: String,
    pub kind: StepKind,
}

impl Step {
    pub fn boxed(label: &str, title: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            label: label.to_string(),
            kind: StepKind::Box {
                title: title.into(),
                width,
                height,
            },
        }
    }

    pub fn line(label: &str, dx: f64, dy: f64, arrow: Option<f64>) -> Self {
        Self {
            label: label.to_string(),
            kind: StepKind::Line { dx, dy, arrow },
        }
    }

    pub fn branches(label: &str, labels: Vec<String>, spacing: f64, length: f64) -> Self {
        Self {
            label: label.to_string(),
            kind: StepKind::Branches {
                labels,
                spacing,
                length,
            },
        }
    }

    /// Resolve this step against the cursor left by its predecessor.
    pub fn compute(&self, input: Point) -> Result<(DrawCommand, Point), StepError> {
        if !input.is_finite() {
            return Err(self.invalid(format!("cursor is not finite: {input:?}")));
        }

        match &self.kind {
            StepKind::Box {
                title,
                width,
                height,
            } => {
                if !(*width > 0.0 && *height > 0.0) {
                    return Err(self.invalid(format!("box size {width}x{height}")));
                }
                let rect = Rect::hanging_from(input, *width, *height);
                let next = rect.bottom_center();
                Ok((
                    DrawCommand::Box {
                        title: title.clone(),
                        rect,
                    },
                    next,
                ))
            }
            StepKind::Line { dx, dy, arrow } => {
                let to = input.offset(*dx, *dy);
                if !to.is_finite() || input.distance(to) == 0.0 {
                    return Err(self.invalid(format!("line offset ({dx}, {dy})")));
                }
                let arrow = arrow.map(|size| Arrow {
                    size,
                    at: to,
                    direction: Direction::between(input, to),
                });
                Ok((
                    DrawCommand::Line {
                        from: input,
                        to,
                        arrow,
                    },
                    to,
                ))
            }
            StepKind::Branches {
                labels,
                spacing,
                length,
            } => {
                if labels.is_empty() {
                    return Err(StepError::EmptyBranchSet(self.label.clone()));
                }
                if !(*length > 0.0) || !spacing.is_finite() {
                    return Err(self.invalid(format!("branch length {length}, spacing {spacing}")));
                }
                let middle = (labels.len() as f64 - 1.0) / 2.0;
                let branches = labels
                    .iter()
                    .enumerate()
                    .map(|(i, label)| Branch {
                        label: label.clone(),
                        from: input,
                        to: Point::new(input.x + (i as f64 - middle) * spacing, input.y + length),
                    })
                    .collect();
                Ok((
                    DrawCommand::Branches {
                        origin: input,
                        branches,
                    },
                    input.offset(0.0, *length),
                ))
            }
        }
    }

    fn invalid(&self, reason: String) -> StepError {
        StepError::InvalidGeometry {
            step: self.label.clone(),
            reason,
        }
    }
}

/// The ordered steps of one visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSequence {
    pub visit_index: usize,
    pub origin: Point,
    pub steps: Vec<Step>,
}

/// Result of folding a sequence without animating it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SequencePlan {
    /// Commands of every step that resolved, in order.
    pub commands: Vec<DrawCommand>,
    /// First step that failed to resolve; later steps are not computed.
    pub failure: Option<StepError>,
}

impl StepSequence {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn plan(&self) -> SequencePlan {
        let mut plan = SequencePlan::default();
        let mut cursor = self.origin;
        for step in &self.steps {
            match step.compute(cursor) {
                Ok((command, next)) => {
                    plan.commands.push(command);
                    cursor = next;
                }
                Err(e) => {
                    plan.failure = Some(e);
                    break;
                }
            }
        }
        plan
    }
}

/// Geometry used when turning visits into step sequences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLayout {
    /// Where visit 0 hangs its first step
    pub origin: Point,
    /// Horizontal distance between consecutive visits
    pub visit_spacing: f64,
    pub box_width: f64,
    pub box_height: f64,
    pub line_length: f64,
    pub branch_spacing: f64,
    pub branch_length: f64,
    pub arrow_size: f64,
}

impl Default for StepLayout {
    fn default() -> Self {
        Self {
            origin: Point::new(60.0, 40.0),
            visit_spacing: 160.0,
            box_width: 140.0,
            box_height: 36.0,
            line_length: 30.0,
            branch_spacing: 48.0,
            branch_length: 40.0,
            arrow_size: 6.0,
        }
    }
}

impl StepLayout {
    pub fn origin_for(&self, index: usize) -> Point {
        self.origin.offset(index as f64 * self.visit_spacing, 0.0)
    }

    fn connector(&self, label: &str) -> Step {
        Step::line(label, 0.0, self.line_length, Some(self.arrow_size))
    }

    fn boxed(&self, label: &str, title: impl Into<String>) -> Step {
        Step::boxed(label, title, self.box_width, self.box_height)
    }
}

/// Assemble the step sequence of one visit.
///
/// Returns `None` for actors that do not take part in the walkthrough.
pub fn build_steps(visit: &VisitEvent, layout: &StepLayout) -> Option<StepSequence> {
    let steps = match &visit.actor {
        ActorType::Advertiser => advertiser_steps(visit, layout),
        ActorType::Publisher => publisher_steps(visit, layout),
        ActorType::Other(_) => return None,
    };
    Some(StepSequence {
        visit_index: visit.index,
        origin: layout.origin_for(visit.index),
        steps,
    })
}

fn advertiser_steps(visit: &VisitEvent, layout: &StepLayout) -> Vec<Step> {
    let site = &visit.metadata.website;
    let groups = &visit.metadata.interest_groups;

    let mut steps = vec![
        layout.connector("enter"),
        layout.boxed("advertiser", format!("Advertiser: {site}")),
        layout.connector("to-join"),
        layout.boxed("join", "Join interest groups"),
    ];
    if groups.is_empty() {
        steps.push(layout.connector("to-empty"));
        steps.push(layout.boxed("no-groups", "No interest groups"));
    } else {
        steps.push(Step::branches(
            "interest-groups",
            groups.clone(),
            layout.branch_spacing,
            layout.branch_length,
        ));
    }
    steps
}

fn publisher_steps(visit: &VisitEvent, layout: &StepLayout) -> Vec<Step> {
    let site = &visit.metadata.website;
    let bidders = if visit.metadata.bidders.is_empty() {
        DEFAULT_BIDDERS.iter().map(|b| (*b).to_string()).collect()
    } else {
        visit.metadata.bidders.clone()
    };

    vec![
        layout.connector("enter"),
        layout.boxed("publisher", format!("Publisher: {site}")),
        layout.connector("to-ssp"),
        layout.boxed("ssp", "SSP: runAdAuction"),
        Step::branches(
            "bidders",
            bidders,
            layout.branch_spacing,
            layout.branch_length,
        ),
        layout.connector("to-winner"),
        layout.boxed("winner", "Winning ad"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn build_steps_covers_participating_actors_only() {
        let layout = StepLayout::default();
        let advertiser = testing::advertiser(0, "shoes.example", &["running"]);
        let publisher = testing::publisher(1, "news.example");
        let other = testing::other(2, "crawler");

        let adv = build_steps(&advertiser, &layout).expect("advertiser steps");
        let publ = build_steps(&publisher, &layout).expect("publisher steps");
        assert!(!adv.is_empty());
        assert!(!publ.is_empty());
        assert_eq!(adv.visit_index, 0);
        assert_eq!(publ.origin, layout.origin_for(1));
        assert!(build_steps(&other, &layout).is_none());
    }

    #[test]
    fn each_step_starts_where_the_previous_one_ended() {
        let layout = StepLayout::default();
        let visit = testing::publisher(2, "news.example");
        let sequence = build_steps(&visit, &layout).expect("steps");

        let mut cursor = sequence.origin;
        for step in &sequence.steps {
            let (command, next) = step.compute(cursor).expect("compute");
            match command {
                DrawCommand::Box { rect, .. } => {
                    assert_eq!(rect.y, cursor.y);
                    assert_eq!(rect.center().x, cursor.x);
                }
                DrawCommand::Line { from, .. } => assert_eq!(from, cursor),
                DrawCommand::Branches { origin, .. } => assert_eq!(origin, cursor),
            }
            cursor = next;
        }
        assert!(cursor.y > sequence.origin.y);
    }

    #[test]
    fn plan_matches_manual_fold() {
        let layout = StepLayout::default();
        let sequence =
            build_steps(&testing::advertiser(0, "a.example", &["x", "y", "z"]), &layout)
                .expect("steps");
        let plan = sequence.plan();
        assert!(plan.failure.is_none());
        assert_eq!(plan.commands.len(), sequence.len());

        let DrawCommand::Branches { branches, origin } = plan.commands.last().expect("last")
        else {
            panic!("expected branch set last");
        };
        assert_eq!(branches.len(), 3);
        assert_eq!(branches[1].to.x, origin.x);
        assert!(branches[0].to.x < origin.x);
    }

    #[test]
    fn advertiser_without_groups_ends_with_a_box() {
        let sequence = build_steps(
            &testing::advertiser(0, "a.example", &[]),
            &StepLayout::default(),
        )
        .expect("steps");
        assert!(matches!(
            sequence.steps.last().map(|s| &s.kind),
            Some(StepKind::Box { title, .. }) if title == "No interest groups"
        ));
    }

    #[test]
    fn publisher_falls_back_to_default_bidders() {
        let sequence = build_steps(&testing::publisher(0, "n.example"), &StepLayout::default())
            .expect("steps");
        let labels = sequence
            .steps
            .iter()
            .find_map(|step| match &step.kind {
                StepKind::Branches { labels, .. } => Some(labels.clone()),
                _ => None,
            })
            .expect("branch step");
        assert_eq!(labels, vec!["DSP 1".to_string(), "DSP 2".to_string()]);
    }

    #[test]
    fn plan_stops_at_first_invalid_step() {
        let sequence = StepSequence {
            visit_index: 0,
            origin: Point::new(0.0, 0.0),
            steps: vec![
                Step::line("ok", 0.0, 10.0, None),
                Step::boxed("broken", "Broken", 0.0, 10.0),
                Step::line("never", 0.0, 10.0, None),
            ],
        };
        let plan = sequence.plan();
        assert_eq!(plan.commands.len(), 1);
        assert!(matches!(
            plan.failure,
            Some(StepError::InvalidGeometry { ref step, .. }) if step == "broken"
        ));
    }

    #[test]
    fn empty_branch_set_is_rejected() {
        let step = Step::branches("fan", Vec::new(), 10.0, 10.0);
        assert_eq!(
            step.compute(Point::default()),
            Err(StepError::EmptyBranchSet("fan".to_string()))
        );
    }

    #[test]
    fn line_arrow_points_along_travel() {
        let (command, next) = Step::line("l", 25.0, 0.0, Some(4.0))
            .compute(Point::new(1.0, 1.0))
            .expect("line");
        assert_eq!(next, Point::new(26.0, 1.0));
        let DrawCommand::Line {
            arrow: Some(arrow), ..
        } = command
        else {
            panic!("expected arrow");
        };
        assert_eq!(arrow.direction, Direction::Right);
        assert_eq!(arrow.at, next);
    }
}
