// Infrastructure implementations for Callscope.

pub mod compilation_catalog;
pub mod concurrency;
pub mod config;
pub mod cpp_provider;
pub mod logging;
