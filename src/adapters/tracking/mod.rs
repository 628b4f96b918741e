mod tracker;

pub use tracker::ConnectionTracker;
