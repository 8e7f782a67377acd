pub mod config;
pub mod context;
pub mod error;
pub mod feed;
pub mod service;
pub mod session;
pub mod upload;
