//! Oyda 数据网关公共模块
//!
//! 各服务共享的配置、错误类型、响应格式、中间件、数据模型与工具函数。

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;
