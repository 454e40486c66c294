mod rate_limit;

pub use rate_limit::{
    RateLimitConfig, RateLimitDecision, RateLimitKey, RateLimiter, default_rate_limit_middleware,
    rate_limit_middleware,
};
