//! 工具模块

pub mod rate_limiter;
pub mod request_logger;
