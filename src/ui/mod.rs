mod app;
mod input;
pub mod pages;
pub mod render;

pub use app::App;
pub use input::{SearchEdit, SearchInput};
