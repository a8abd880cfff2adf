pub mod config;
pub mod engine;
pub mod flow;
pub mod limits;
pub mod model;
pub mod observability;
pub mod sql;
pub mod tls;
pub mod wire;
