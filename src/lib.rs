pub mod config;
pub mod database;
pub mod error;
pub mod identity;
pub mod media;
pub mod schema;
pub mod server;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{BoundGateway, Gateway};
