/// Callbacks fired by the timeline as playback progresses.
///
/// Both hooks run on the task that caused them, after every internal lock
/// has been released, so an observer may query the controller.
pub trait TimelineObserver: Send + Sync {
    fn visit_completed(&self, _index: usize) {}

    fn bubble_count_changed(&self, _count: usize) {}
}
