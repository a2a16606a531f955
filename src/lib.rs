pub mod api;
pub mod config;
pub mod entities;
pub mod error;
pub mod external;
pub mod location;
pub mod navigator;
pub mod session;

pub mod simulation;
