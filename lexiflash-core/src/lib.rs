pub mod block;
pub mod color;
pub mod screen;
pub mod stimulus;
pub mod trial;

pub use block::{BLOCK_COUNT, BlockType};
pub use color::HexColor;
pub use screen::Screen;
pub use stimulus::{CHOICE_COUNT, TrialStimulusSpec};
pub use trial::{Session, TrialResult};
