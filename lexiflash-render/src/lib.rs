pub mod layout;
pub mod render;
pub use layout::{Bounds, choice_at, choice_rects};
pub use render::{FrameStats, SkiaRenderer, load_font, render_text_pixmap};
