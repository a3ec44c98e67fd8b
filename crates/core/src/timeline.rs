use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bubbles::BubbleDatum;
use crate::error::TimelineError;

/// Who made a visit. Only advertisers and publishers produce animated steps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActorType {
    Advertiser,
    Publisher,
    Other(String),
}

impl ActorType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Advertiser => "advertiser",
            Self::Publisher => "publisher",
            Self::Other(name) => name,
        }
    }

    pub fn participates(&self) -> bool {
        matches!(self, Self::Advertiser | Self::Publisher)
    }
}

impl From<String> for ActorType {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("advertiser") {
            Self::Advertiser
        } else if value.eq_ignore_ascii_case("publisher") {
            Self::Publisher
        } else {
            Self::Other(value)
        }
    }
}

impl From<ActorType> for String {
    fn from(value: ActorType) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisitMetadata {
    /// Site the simulated user landed on, e.g. "shoes.example"
    pub website: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<DateTime<Utc>>,
    /// Interest groups joined during an advertiser visit
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interest_groups: Vec<String>,
    /// Buyers invited to bid during a publisher visit
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bidders: Vec<String>,
}

/// One discrete entry of the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitEvent {
    pub index: usize,
    pub actor: ActorType,
    #[serde(default)]
    pub metadata: VisitMetadata,
}

/// Ordered visits of one session. `visits[i].index == i` always holds.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Timeline {
    visits: Vec<VisitEvent>,
}

impl Timeline {
    /// Build a timeline, renumbering visits by position.
    pub fn new(mut visits: Vec<VisitEvent>) -> Self {
        for (position, visit) in visits.iter_mut().enumerate() {
            visit.index = position;
        }
        Self { visits }
    }

    /// Parse a JSON array of visits. Declared indices must match positions.
    pub fn from_json(json: &str) -> Result<Self, TimelineError> {
        let visits: Vec<VisitEvent> = serde_json::from_str(json)?;
        if let Some((position, visit)) = visits
            .iter()
            .enumerate()
            .find(|(position, visit)| visit.index != *position)
        {
            return Err(TimelineError::IndexMismatch {
                position,
                index: visit.index,
            });
        }
        Ok(Self { visits })
    }

    pub fn visits(&self) -> &[VisitEvent] {
        &self.visits
    }

    pub fn get(&self, index: usize) -> Option<&VisitEvent> {
        self.visits.get(index)
    }

    pub fn len(&self) -> usize {
        self.visits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }

    /// Interest-group bubbles accumulated by the visited advertiser visits.
    ///
    /// One datum per `(website, interest group)` pair, valued by how many
    /// visited advertiser visits joined it, in order of first join.
    pub fn bubble_data(&self, visited: &[bool]) -> Vec<BubbleDatum> {
        let mut data: Vec<BubbleDatum> = Vec::new();
        for visit in &self.visits {
            if visit.actor != ActorType::Advertiser {
                continue;
            }
            if !visited.get(visit.index).copied().unwrap_or(false) {
                continue;
            }
            for group in &visit.metadata.interest_groups {
                let id = format!("{}/{}", visit.metadata.website, group);
                match data.iter_mut().find(|datum| datum.id == id) {
                    Some(existing) => existing.value += 1.0,
                    None => data.push(BubbleDatum {
                        id,
                        value: 1.0,
                        group: visit.metadata.website.clone(),
                    }),
                }
            }
        }
        data
    }
}
