pub mod access;
pub mod config;
pub mod db;
pub mod engine;
pub mod ids;
pub mod limits;
pub mod model;
pub mod observability;
pub mod wal;
