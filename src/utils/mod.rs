pub mod errors;
pub mod ratelimit;
pub mod validation;

pub use errors::{AppError, ErrorCategory, ErrorDetail, TargetingError};
pub use ratelimit::{check_cooldown, record_action, InboundLimiter};
pub use validation::parse_uuid;
