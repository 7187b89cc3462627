pub mod config;
mod http_layers;
mod image_routes;
pub mod image_upload;
pub mod metrics;
pub mod server;
pub(self) mod session;
pub mod state;

pub use config::ServerConfig;
pub use http_layers::*;
pub use image_upload::ImageUploadStorage;
pub use server::{make_app, run_server};
