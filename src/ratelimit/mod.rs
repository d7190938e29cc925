//! Rate limiting logic and state management.

mod clock;
mod limiter;
mod store;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use limiter::{Decision, LimitConfig, RateLimiter, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};
pub use store::{RateLimitEntry, RateLimitStore};
