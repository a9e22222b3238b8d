mod handler;
mod model;

pub use handler::{get_credentials, save_credentials};
