pub mod account_service;
pub mod analytics_service;
pub mod gateway_service;
pub mod rate_limiter;
pub mod response_cache;
pub mod trail_stop_service;
