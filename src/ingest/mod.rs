pub mod handler;
pub mod ratelimit;
pub mod validate;
