pub mod areas;
pub mod auth;
pub mod club;
pub mod config;
pub mod engine;
pub mod feed;
pub mod limits;
pub mod model;
pub mod observability;
pub mod probe;
pub mod sql;
pub mod sweeper;
pub mod tls;
pub mod wire;
