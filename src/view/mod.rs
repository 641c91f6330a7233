//! Terminal presentation.

pub mod palette;
pub mod render;

pub use palette::Palette;
pub use render::Renderer;
