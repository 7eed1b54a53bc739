pub mod arm;
pub mod config;
pub mod drive;
pub mod hardware;
pub mod health;
pub mod loop_timer;
pub mod messages;
pub mod runtime;
pub mod stall;
pub mod store;
pub mod tuning;
