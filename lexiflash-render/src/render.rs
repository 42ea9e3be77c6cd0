use crate::layout::{self, Bounds};
use ab_glyph::{Font, FontVec, PxScale, ScaleFont, point};
use anyhow::{Context, Result, bail};
use lexiflash_core::HexColor;
use lexiflash_experiment::{
    ChoiceButton, ContainerStyle, DisplayBody, DisplayState, SubmissionState,
};
use lexiflash_timing::{CalibrationStats, HighPrecisionTimer, Timer};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tiny_skia::{
    Color, Paint, PathBuilder, Pixmap, PixmapPaint, PremultipliedColorU8, Rect, Stroke, Transform,
};

const WHITE: [u8; 4] = [255, 255, 255, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];
const MUTED: [u8; 4] = [90, 90, 90, 255];
const ALERT: [u8; 4] = [192, 57, 43, 255];
const OUTLINE: [u8; 4] = [210, 210, 210, 255];
const BUTTON_FACE: [u8; 4] = [242, 242, 242, 255];
const TRANSLUCENT_FACE: [u8; 4] = [255, 255, 255, 204];
const PROGRESS: [u8; 4] = [39, 174, 96, 255];

const TITLE_PX: f32 = 40.0;
const BODY_PX: f32 = 24.0;
const SMALL_PX: f32 = 20.0;
const STIMULUS_PX: f32 = 72.0;
const CHOICE_PX: f32 = 30.0;
const FIXATION_SIZE: u32 = 40;
const FIXATION_THICKNESS: f32 = 4.0;
const TEXT_CACHE_LIMIT: usize = 512;

pub fn load_font(path: &Path) -> Result<FontVec> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
    FontVec::try_from_vec(bytes).with_context(|| format!("parsing font {}", path.display()))
}

fn color(rgba: [u8; 4]) -> Color {
    Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3])
}

fn hex_or(hex: &HexColor, fallback: [u8; 4]) -> [u8; 4] {
    hex.rgba().unwrap_or(fallback)
}

fn paint(rgba: [u8; 4]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color(rgba));
    paint.anti_alias = false;
    paint
}

/// Rasterises one line of text into a tight, transparent pixmap.
/// Returns `None` for text with no visible glyphs.
pub fn render_text_pixmap<F: Font>(
    text: &str,
    font_size: f32,
    font: &F,
    rgba: [u8; 4],
) -> Option<Pixmap> {
    let scale = PxScale::from(font_size);
    let scaled = font.as_scaled(scale);

    let mut caret = 0.0f32;
    let mut previous = None;
    let mut outlines = Vec::new();
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        let glyph = id.with_scale_and_position(scale, point(caret, scaled.ascent()));
        caret += scaled.h_advance(id);
        previous = Some(id);
        if let Some(outline) = font.outline_glyph(glyph) {
            outlines.push(outline);
        }
    }

    let (min_x, min_y, max_x, max_y) = outlines.iter().map(|o| o.px_bounds()).fold(
        (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        |(x0, y0, x1, y1), b| (x0.min(b.min.x), y0.min(b.min.y), x1.max(b.max.x), y1.max(b.max.y)),
    );
    if outlines.is_empty() {
        return None;
    }

    let origin = (min_x.floor(), min_y.floor());
    let width = (max_x.ceil() - origin.0).max(1.0) as u32;
    let height = (max_y.ceil() - origin.1).max(1.0) as u32;
    let mut pixmap = Pixmap::new(width, height)?;
    let stride = width as usize;
    let pixels = pixmap.pixels_mut();

    for outline in &outlines {
        let bounds = outline.px_bounds();
        let (dx, dy) = (bounds.min.x - origin.0, bounds.min.y - origin.1);
        outline.draw(|x, y, coverage| {
            let px = (x as f32 + dx) as usize;
            let py = (y as f32 + dy) as usize;
            if px >= stride {
                return;
            }
            let Some(dst) = pixels.get_mut(py * stride + px) else {
                return;
            };
            let alpha = (coverage.clamp(0.0, 1.0) * rgba[3] as f32).round() as u8;
            // Overlapping glyph edges keep the stronger coverage.
            if alpha <= dst.alpha() {
                return;
            }
            let premultiply = |c: u8| (c as u16 * alpha as u16 / 255) as u8;
            if let Some(src) = PremultipliedColorU8::from_rgba(
                premultiply(rgba[0]),
                premultiply(rgba[1]),
                premultiply(rgba[2]),
                alpha,
            ) {
                *dst = src;
            }
        });
    }

    Some(pixmap)
}

/// Splits text into lines of at most `max_chars`, breaking on spaces and
/// honouring explicit newlines.
pub fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > max_chars {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        lines.push(line);
    }
    lines
}

#[derive(Hash, PartialEq, Eq)]
struct TextKey {
    text: String,
    rgba: [u8; 4],
    size_bits: u32,
}

struct TextCache {
    font: Option<FontVec>,
    map: HashMap<TextKey, Arc<Pixmap>>,
}

impl TextCache {
    fn get_or_render(&mut self, text: &str, size_px: f32, rgba: [u8; 4]) -> Option<Arc<Pixmap>> {
        let font = self.font.as_ref()?;
        let key = TextKey {
            text: text.to_owned(),
            rgba,
            size_bits: size_px.to_bits(),
        };
        if let Some(pixmap) = self.map.get(&key) {
            return Some(Arc::clone(pixmap));
        }
        let pixmap = Arc::new(render_text_pixmap(text, size_px, font, rgba)?);
        if self.map.len() >= TEXT_CACHE_LIMIT {
            self.map.clear();
        }
        self.map.insert(key, Arc::clone(&pixmap));
        Some(pixmap)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameStats {
    pub draw: Duration,
    pub copy: Duration,
    pub total: Duration,
    /// False when the display state was unchanged and the previous frame was kept.
    pub redrawn: bool,
}

/// Software renderer drawing a [`DisplayState`] into an RGBA frame buffer.
pub struct SkiaRenderer {
    width: u32,
    height: u32,
    center: (f32, f32),
    text: TextCache,
    fixation: Pixmap,
    canvas: Pixmap,
    last: Option<DisplayState>,
    first_frame: bool,
    component_timers: HashMap<&'static str, HighPrecisionTimer>,
}

impl SkiaRenderer {
    /// Without a font every non-text element is still drawn.
    pub fn new(width: u32, height: u32, font: Option<FontVec>) -> Result<Self> {
        let canvas = Pixmap::new(width, height)
            .with_context(|| format!("creating a {width}x{height} canvas"))?;
        Ok(Self {
            width,
            height,
            center: (width as f32 / 2.0, height as f32 / 2.0),
            text: TextCache {
                font,
                map: HashMap::new(),
            },
            fixation: fixation_cross().context("creating the fixation cross")?,
            canvas,
            last: None,
            first_frame: true,
            component_timers: ["draw", "copy", "total"]
                .into_iter()
                .map(|k| (k, HighPrecisionTimer::new()))
                .collect(),
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn has_font(&self) -> bool {
        self.text.font.is_some()
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.canvas = Pixmap::new(width, height)
            .with_context(|| format!("resizing canvas to {width}x{height}"))?;
        self.width = width;
        self.height = height;
        self.center = (width as f32 / 2.0, height as f32 / 2.0);
        self.first_frame = true;
        Ok(())
    }

    pub fn component_stats(&self, component: &str) -> Option<CalibrationStats> {
        self.component_timers
            .get(component)
            .map(|t| t.calibration_stats())
    }

    /// Draws `display` and copies it into `frame` (tightly packed RGBA8).
    /// An unchanged display leaves both canvas and frame untouched.
    pub fn render<T: Timer>(
        &mut self,
        display: &DisplayState,
        frame: &mut [u8],
        timer: &T,
    ) -> Result<FrameStats> {
        let expected = self.canvas.data().len();
        if frame.len() != expected {
            bail!("frame buffer is {} bytes, expected {expected}", frame.len());
        }

        let start = timer.now();
        if !self.first_frame && self.last.as_ref() == Some(display) {
            return Ok(FrameStats {
                draw: Duration::ZERO,
                copy: Duration::ZERO,
                total: timer.elapsed(start),
                redrawn: false,
            });
        }

        let t = timer.now();
        self.draw(display);
        let draw = timer.elapsed(t);

        let t = timer.now();
        frame.copy_from_slice(self.canvas.data());
        let copy = timer.elapsed(t);

        self.first_frame = false;
        self.last = Some(display.clone());
        let total = timer.elapsed(start);
        for (name, sample) in [("draw", draw), ("copy", copy), ("total", total)] {
            if let Some(component) = self.component_timers.get_mut(name) {
                component.record_frame(sample);
            }
        }

        Ok(FrameStats {
            draw,
            copy,
            total,
            redrawn: true,
        })
    }

    fn draw(&mut self, display: &DisplayState) {
        self.canvas.fill(color(hex_or(&display.background, WHITE)));
        let panel = layout::panel(self.width, self.height);
        match &display.container {
            ContainerStyle::Opaque => {
                self.fill(panel, WHITE);
                self.outline(panel, OUTLINE, 2.0);
            }
            ContainerStyle::Tinted(tint) => self.fill(panel, hex_or(tint, WHITE)),
            ContainerStyle::Transparent => {}
        }

        let (cx, cy) = self.center;
        let top = panel.y + 60.0;
        match &display.body {
            DisplayBody::Welcome { alert } => {
                self.text("Word recognition", TITLE_PX, BLACK, (cx, top));
                let intro = "A word will flash very briefly in the centre of the screen. \
                    Afterwards, pick the word you saw among four choices, using the \
                    keys 1 to 4 or the mouse. Answer as quickly and accurately as you can.";
                let below = self.paragraph(intro, BODY_PX, MUTED, top + 70.0, 56);
                if let Some(alert) = alert {
                    self.paragraph(alert, BODY_PX, ALERT, below + 30.0, 56);
                }
                self.text("Press Space to start", BODY_PX, BLACK, (cx, panel.y + panel.height - 50.0));
            }
            DisplayBody::Loading => self.text("Loading...", BODY_PX, MUTED, (cx, cy)),
            DisplayBody::Instructions {
                title,
                description,
                participant_id,
            } => {
                self.text(title, TITLE_PX, BLACK, (cx, top));
                self.paragraph(description, BODY_PX, MUTED, top + 80.0, 56);
                if let Some(id) = participant_id {
                    self.text(&format!("Participant: {id}"), SMALL_PX, MUTED, (cx, cy + 80.0));
                }
                self.text("Press Space to begin", BODY_PX, BLACK, (cx, panel.y + panel.height - 50.0));
            }
            DisplayBody::Trial {
                counter,
                fixation,
                stimulus,
            } => {
                if let Some(counter) = counter {
                    self.text(counter, BODY_PX, MUTED, (cx, cy));
                }
                if *fixation {
                    self.blit_fixation();
                }
                if let Some(stimulus) = stimulus {
                    self.text(&stimulus.text, STIMULUS_PX, hex_or(&stimulus.color, BLACK), (cx, cy));
                }
            }
            DisplayBody::Choices { buttons } => {
                self.text("Which word did you see?", BODY_PX, BLACK, (cx, top));
                let rects = layout::choice_rects(self.width, self.height);
                for (button, rect) in buttons.iter().zip(rects) {
                    self.draw_button(button, rect);
                }
            }
            DisplayBody::Unavailable { message } => {
                self.text("The next word could not be loaded", TITLE_PX, BLACK, (cx, top));
                self.paragraph(message, BODY_PX, ALERT, top + 80.0, 56);
                self.text("Press Space to try again", BODY_PX, BLACK, (cx, panel.y + panel.height - 50.0));
            }
            DisplayBody::Pause { title, message } => {
                self.text(title, TITLE_PX, BLACK, (cx, top));
                self.paragraph(message, BODY_PX, MUTED, top + 80.0, 56);
                self.text("Press Space to continue", BODY_PX, BLACK, (cx, panel.y + panel.height - 50.0));
            }
            DisplayBody::Results {
                lines,
                submission,
                status,
            } => {
                self.text("Results", TITLE_PX, BLACK, (cx, panel.y + 40.0));
                let mut y = panel.y + 90.0;
                for line in lines {
                    if !line.is_empty() {
                        self.text(line, SMALL_PX, BLACK, (cx, y));
                    }
                    y += SMALL_PX * 1.3;
                }
                let bottom = panel.y + panel.height - 40.0;
                if let SubmissionState::InProgress(progress) = submission {
                    self.progress_bar(panel, bottom - 40.0, progress.percent);
                }
                self.text(status, SMALL_PX, MUTED, (cx, bottom));
            }
        }
    }

    fn fill(&mut self, bounds: Bounds, rgba: [u8; 4]) {
        if let Some(rect) = bounds.to_rect() {
            self.canvas
                .fill_rect(rect, &paint(rgba), Transform::identity(), None);
        }
    }

    fn outline(&mut self, bounds: Bounds, rgba: [u8; 4], width: f32) {
        let inset = width * 0.5;
        let Some(rect) = Rect::from_xywh(
            bounds.x + inset,
            bounds.y + inset,
            bounds.width - width,
            bounds.height - width,
        ) else {
            return;
        };
        let path = PathBuilder::from_rect(rect);
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        self.canvas
            .stroke_path(&path, &paint(rgba), &stroke, Transform::identity(), None);
    }

    fn draw_button(&mut self, button: &ChoiceButton, rect: Bounds) {
        let face = if button.translucent {
            TRANSLUCENT_FACE
        } else {
            BUTTON_FACE
        };
        self.fill(rect, face);
        match &button.border_color {
            Some(border) => self.outline(rect, hex_or(border, BLACK), 3.0),
            None => self.outline(rect, OUTLINE, 1.0),
        }
        let fg = hex_or(&button.text_color, BLACK);
        self.text(&button.label, CHOICE_PX, fg, rect.center());
    }

    fn progress_bar(&mut self, panel: Bounds, y: f32, percent: u8) {
        let track = Bounds {
            x: panel.x + panel.width * 0.2,
            y,
            width: panel.width * 0.6,
            height: 16.0,
        };
        self.fill(track, BUTTON_FACE);
        let filled = Bounds {
            width: track.width * f32::from(percent.min(100)) / 100.0,
            ..track
        };
        if filled.width >= 1.0 {
            self.fill(filled, PROGRESS);
        }
    }

    fn blit_fixation(&mut self) {
        let half = FIXATION_SIZE as f32 * 0.5;
        let x = (self.center.0 - half).floor() as i32;
        let y = (self.center.1 - half).floor() as i32;
        self.canvas.draw_pixmap(
            x,
            y,
            self.fixation.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    /// Draws one line of text centred on `pos`. No-op without a font.
    fn text(&mut self, text: &str, size_px: f32, rgba: [u8; 4], pos: (f32, f32)) {
        let Some(pixmap) = self.text.get_or_render(text, size_px, rgba) else {
            return;
        };
        let x = (pos.0 - pixmap.width() as f32 * 0.5).round() as i32;
        let y = (pos.1 - pixmap.height() as f32 * 0.5).round() as i32;
        self.canvas.draw_pixmap(
            x,
            y,
            (*pixmap).as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    /// Draws wrapped, centred lines starting at `top`; returns the y below the last line.
    fn paragraph(&mut self, text: &str, size_px: f32, rgba: [u8; 4], top: f32, max_chars: usize) -> f32 {
        let mut y = top;
        for line in wrap(text, max_chars) {
            if !line.is_empty() {
                self.text(&line, size_px, rgba, (self.center.0, y));
            }
            y += size_px * 1.4;
        }
        y
    }
}

fn fixation_cross() -> Option<Pixmap> {
    let size = FIXATION_SIZE as f32;
    let mut pixmap = Pixmap::new(FIXATION_SIZE, FIXATION_SIZE)?;
    let bar = paint(BLACK);
    let horizontal = Rect::from_xywh(0.0, (size - FIXATION_THICKNESS) * 0.5, size, FIXATION_THICKNESS)?;
    let vertical = Rect::from_xywh((size - FIXATION_THICKNESS) * 0.5, 0.0, FIXATION_THICKNESS, size)?;
    pixmap.fill_rect(horizontal, &bar, Transform::identity(), None);
    pixmap.fill_rect(vertical, &bar, Transform::identity(), None);
    Some(pixmap)
}
