// ABOUTME: Clock synchronization primitives
// ABOUTME: Median-filtered latency tracking feeding the server clock estimator

pub mod clock;
pub mod median;

pub use clock::ClockEstimator;
pub use median::MedianFilter;
