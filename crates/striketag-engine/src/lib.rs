pub mod collab;
pub mod config;
pub mod enforcer;
pub mod error;
pub mod service;
pub mod store;
