use serde::{Deserialize, Serialize};
use std::fmt;

pub const BLOCK_COUNT: usize = 3;

const BLOCK_DESCRIPTION: &str = "A cross will appear, then a word will flash very briefly. \
Pick it out from the choices that follow.";

/// Experimental condition of a block, in presentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    /// Black text on white.
    Bw,
    /// Coloured text on white.
    Color,
    /// Coloured text flashed on a coloured background.
    ColoredBg,
}

impl BlockType {
    pub const ALL: [BlockType; BLOCK_COUNT] =
        [BlockType::Bw, BlockType::Color, BlockType::ColoredBg];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            BlockType::Bw => 0,
            BlockType::Color => 1,
            BlockType::ColoredBg => 2,
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    /// Wire name used by the trial service.
    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Bw => "bw",
            BlockType::Color => "color",
            BlockType::ColoredBg => "colored_bg",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            BlockType::Bw => "Block 1: Black stimuli",
            BlockType::Color => "Block 2: Coloured stimuli",
            BlockType::ColoredBg => "Block 3: Coloured stimuli on coloured backgrounds",
        }
    }

    pub fn description(self) -> &'static str {
        BLOCK_DESCRIPTION
    }

    /// Title and message of the pause that follows this block.
    /// The last block is followed by the results, not a pause.
    pub fn pause_copy(self) -> Option<(&'static str, &'static str)> {
        match self {
            BlockType::Bw => Some((
                "End of Block 1",
                "Take a short break if you need one.\n\
                 The next block uses coloured stimuli on a white background.\n\n\
                 Ready for Block 2?",
            )),
            BlockType::Color => Some((
                "End of Block 2",
                "Take a short break if you need one.\n\
                 The last block is harder:\n\
                 coloured stimuli on coloured backgrounds!\n\n\
                 Ready for Block 3?",
            )),
            BlockType::ColoredBg => None,
        }
    }

    /// Answer buttons get misleading text colours.
    pub fn colors_choices(self) -> bool {
        !matches!(self, BlockType::Bw)
    }

    /// Answer buttons also get a coloured border and a translucent fill.
    pub fn borders_choices(self) -> bool {
        matches!(self, BlockType::ColoredBg)
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
