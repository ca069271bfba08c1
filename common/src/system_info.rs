use serde_json::Value;

use crate::error::{FieldError, RequestError};

const NUMERIC_CHANGE_THRESHOLD: f32 = 0.1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemInfo {
    pub time: String,
    pub date: String,
    pub cpu: f32,
    pub ram: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemInfoPatch {
    pub time: Option<String>,
    pub date: Option<String>,
    pub cpu: Option<f32>,
    pub ram: Option<f32>,
}

impl SystemInfoPatch {
    pub fn from_json(body: &[u8]) -> Result<Self, RequestError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(RequestError::MissingBody);
        }
        let value: Value = serde_json::from_slice(body).map_err(RequestError::InvalidJson)?;
        let Value::Object(fields) = value else {
            return Err(RequestError::InvalidFields(vec![FieldError::new(
                "body",
                "expected a JSON object",
            )]));
        };

        let mut patch = Self::default();
        let mut errors = Vec::new();

        for (field, slot) in [("time", &mut patch.time), ("date", &mut patch.date)] {
            match fields.get(field) {
                None => {}
                Some(Value::String(text)) => *slot = Some(text.clone()),
                Some(_) => errors.push(FieldError::new(field, "expected a string")),
            }
        }
        for (field, slot) in [("cpu", &mut patch.cpu), ("ram", &mut patch.ram)] {
            match fields.get(field) {
                None => {}
                Some(value) => match value.as_f64() {
                    Some(number) => *slot = Some(number as f32),
                    None => errors.push(FieldError::new(field, "expected a number")),
                },
            }
        }

        if errors.is_empty() {
            Ok(patch)
        } else {
            Err(RequestError::InvalidFields(errors))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InfoChanges {
    pub time: bool,
    pub date: bool,
    pub cpu: bool,
    pub ram: bool,
}

impl InfoChanges {
    pub const ALL: Self = Self {
        time: true,
        date: true,
        cpu: true,
        ram: true,
    };

    pub fn any(self) -> bool {
        self.time || self.date || self.cpu || self.ram
    }
}

#[derive(Debug, Clone, Default)]
pub struct InfoTracker {
    current: SystemInfo,
    drawn: Option<SystemInfo>,
}

impl InfoTracker {
    pub fn current(&self) -> &SystemInfo {
        &self.current
    }

    pub fn apply(&mut self, patch: SystemInfoPatch) {
        if let Some(time) = patch.time {
            self.current.time = time;
        }
        if let Some(date) = patch.date {
            self.current.date = date;
        }
        if let Some(cpu) = patch.cpu {
            self.current.cpu = cpu;
        }
        if let Some(ram) = patch.ram {
            self.current.ram = ram;
        }
    }

    pub fn invalidate(&mut self) {
        self.drawn = None;
    }

    pub fn pending_changes(&self) -> InfoChanges {
        let Some(drawn) = &self.drawn else {
            return InfoChanges::ALL;
        };
        InfoChanges {
            time: self.current.time != drawn.time,
            date: self.current.date != drawn.date,
            cpu: (self.current.cpu - drawn.cpu).abs() > NUMERIC_CHANGE_THRESHOLD,
            ram: (self.current.ram - drawn.ram).abs() > NUMERIC_CHANGE_THRESHOLD,
        }
    }

    /// Returns the regions to repaint and records the current values as painted.
    pub fn take_changes(&mut self) -> InfoChanges {
        let changes = self.pending_changes();
        self.drawn = Some(self.current.clone());
        changes
    }
}
