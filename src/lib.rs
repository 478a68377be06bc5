// src/lib.rs

//! miharu Monitoring Library

pub mod engine;
pub mod error;
pub mod lark;
pub mod models;
pub mod notify;
pub mod store;
pub mod utils;
