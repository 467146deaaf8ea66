pub mod engine;
pub mod error;
pub mod ids;
pub mod lock;
pub mod resources;
pub mod service;
pub mod state;
pub mod upgrade;
pub mod validate;
