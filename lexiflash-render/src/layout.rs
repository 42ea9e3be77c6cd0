//! Screen geometry shared by the renderer and mouse hit testing.

use lexiflash_core::CHOICE_COUNT;

const PANEL_MAX_WIDTH: f32 = 900.0;
const PANEL_MAX_HEIGHT: f32 = 640.0;
const BUTTON_HEIGHT: f32 = 80.0;
const BUTTON_GAP: f32 = 24.0;

/// Axis-aligned box in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    pub fn to_rect(self) -> Option<tiny_skia::Rect> {
        tiny_skia::Rect::from_xywh(self.x, self.y, self.width, self.height)
    }
}

/// The central container, centred in the window.
pub fn panel(width: u32, height: u32) -> Bounds {
    let (w, h) = (width as f32, height as f32);
    let pw = (w * 0.8).min(PANEL_MAX_WIDTH);
    let ph = (h * 0.75).min(PANEL_MAX_HEIGHT);
    Bounds {
        x: (w - pw) * 0.5,
        y: (h - ph) * 0.5,
        width: pw,
        height: ph,
    }
}

/// Answer buttons in a 2x2 grid, numbered left to right, top to bottom.
pub fn choice_rects(width: u32, height: u32) -> [Bounds; CHOICE_COUNT] {
    let panel = panel(width, height);
    let button_width = ((panel.width - 3.0 * BUTTON_GAP) * 0.5).max(1.0);
    let top = height as f32 * 0.5 - BUTTON_HEIGHT * 0.5;
    std::array::from_fn(|i| {
        let (row, col) = ((i / 2) as f32, (i % 2) as f32);
        Bounds {
            x: panel.x + BUTTON_GAP + col * (button_width + BUTTON_GAP),
            y: top + row * (BUTTON_HEIGHT + BUTTON_GAP),
            width: button_width,
            height: BUTTON_HEIGHT,
        }
    })
}

/// Index of the answer button under the cursor.
pub fn choice_at(width: u32, height: u32, x: f32, y: f32) -> Option<usize> {
    choice_rects(width, height)
        .iter()
        .position(|b| b.contains(x, y))
}
