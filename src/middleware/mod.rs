mod error_handler;
mod origin;
mod rate_limit;

pub use error_handler::log_errors;
pub use origin::{is_same_origin, same_origin};
pub use rate_limit::{RateDecision, RateLimitPolicy, RateLimiter, rate_limit};
