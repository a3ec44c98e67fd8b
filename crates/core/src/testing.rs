use crate::{ActorType, Timeline, VisitEvent, VisitMetadata};

/// Advertiser visit joining the given interest groups.
pub fn advertiser(index: usize, website: &str, interest_groups: &[&str]) -> VisitEvent {
    VisitEvent {
        index,
        actor: ActorType::Advertiser,
        metadata: VisitMetadata {
            website: website.to_string(),
            datetime: None,
            interest_groups: interest_groups.iter().map(|g| (*g).to_string()).collect(),
            bidders: Vec::new(),
        },
    }
}

/// Publisher visit using the default bidders.
pub fn publisher(index: usize, website: &str) -> VisitEvent {
    VisitEvent {
        index,
        actor: ActorType::Publisher,
        metadata: VisitMetadata {
            website: website.to_string(),
            ..VisitMetadata::default()
        },
    }
}

/// Visit by an actor that produces no steps.
pub fn other(index: usize, actor: &str) -> VisitEvent {
    VisitEvent {
        index,
        actor: ActorType::Other(actor.to_string()),
        metadata: VisitMetadata {
            website: format!("{actor}.example"),
            ..VisitMetadata::default()
        },
    }
}

/// Four visits: two advertisers, one publisher, one non-participating actor.
pub fn sample_timeline() -> Timeline {
    Timeline::new(vec![
        advertiser(0, "shoes.example", &["running", "hiking"]),
        publisher(1, "news.example"),
        other(2, "crawler"),
        advertiser(3, "cars.example", &["suv"]),
    ])
}
