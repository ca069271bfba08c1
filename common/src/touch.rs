use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTouch {
    pub x: i32,
    pub y: i32,
    pub pressure: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchPoint {
    pub x: i32,
    pub y: i32,
}

pub trait TouchPanel {
    fn sample(&mut self) -> Option<RawTouch>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoTouch;

impl TouchPanel for NoTouch {
    fn sample(&mut self) -> Option<RawTouch> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchCalibration {
    pub raw_min: i32,
    pub raw_max: i32,
}

impl Default for TouchCalibration {
    fn default() -> Self {
        Self {
            raw_min: 50,
            raw_max: 3_900,
        }
    }
}

impl TouchCalibration {
    pub fn map(&self, raw: RawTouch, width: i32, height: i32) -> Option<TouchPoint> {
        if raw.pressure <= 0 {
            return None;
        }
        Some(TouchPoint {
            x: self.scale(raw.x, width),
            y: self.scale(raw.y, height),
        })
    }

    fn scale(&self, value: i32, extent: i32) -> i32 {
        let span = (self.raw_max - self.raw_min).max(1);
        let clamped = value.clamp(self.raw_min, self.raw_max.max(self.raw_min));
        let max_out = (extent - 1).max(0);
        ((i64::from(clamped - self.raw_min) * i64::from(max_out)) / i64::from(span)) as i32
    }
}
