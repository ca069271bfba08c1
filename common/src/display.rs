use crate::color::Rgb565;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Small,
    Large,
}

pub trait Display {
    fn width(&self) -> i32;
    fn height(&self) -> i32;
    fn fill_screen(&mut self, color: Rgb565);
    fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Rgb565);
    fn draw_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Rgb565);
    /// Draws `text` centered on (`x`, `y`).
    fn draw_text(&mut self, text: &str, x: i32, y: i32, font: Font, color: Rgb565);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawCall {
    FillScreen(Rgb565),
    FillRect {
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        color: Rgb565,
    },
    DrawRect {
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        color: Rgb565,
    },
    Text {
        text: String,
        x: i32,
        y: i32,
        font: Font,
        color: Rgb565,
    },
}

#[derive(Debug, Clone)]
pub struct RecordingDisplay {
    width: i32,
    height: i32,
    calls: Vec<DrawCall>,
}

impl RecordingDisplay {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            calls: Vec::new(),
        }
    }

    pub fn calls(&self) -> &[DrawCall] {
        &self.calls
    }

    pub fn texts(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                DrawCall::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl Display for RecordingDisplay {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn fill_screen(&mut self, color: Rgb565) {
        self.calls.push(DrawCall::FillScreen(color));
    }

    fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Rgb565) {
        self.calls.push(DrawCall::FillRect { x, y, w, h, color });
    }

    fn draw_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Rgb565) {
        self.calls.push(DrawCall::DrawRect { x, y, w, h, color });
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32, font: Font, color: Rgb565) {
        self.calls.push(DrawCall::Text {
            text: text.to_string(),
            x,
            y,
            font,
            color,
        });
    }
}
