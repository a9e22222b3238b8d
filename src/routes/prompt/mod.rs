mod handler;
mod model;

pub use handler::{generate, improve_text, test_prompt};
pub use model::OutputResponse;
