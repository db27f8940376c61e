pub mod api;
pub mod bus;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod mail;
pub mod metrics;
pub mod template;

pub use config::Config;
pub use context::SharedContext;
pub use error::{AppError, HandlerError, Result};
