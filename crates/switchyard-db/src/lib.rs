//! Persistence layer for switchyard: connection pool, embedded migrations,
//! row models, and query functions for the goal graph tables.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
