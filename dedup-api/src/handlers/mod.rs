mod app;
mod upload;

pub use app::{router, AppState};
