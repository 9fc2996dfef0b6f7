pub mod clock;
pub mod dataset_source;
pub mod events;
pub mod live_feed;
pub mod visualizer;
