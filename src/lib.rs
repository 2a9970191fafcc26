pub mod config;
pub mod coordinator;
pub mod humanize;
pub mod job;
pub mod observability;
pub mod service;
pub mod task;
pub mod validator;
