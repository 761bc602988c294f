pub mod client;
pub mod protocol;
pub mod retry;
pub mod tracker;

pub use client::{CallError, CallOptions, ResilientClient};
pub use protocol::{ClientMeta, MarketingProcessResponse, TrackingResponse};
pub use retry::RetryPolicy;
pub use tracker::{TrackOptions, TrackerClient, TrackerError};
