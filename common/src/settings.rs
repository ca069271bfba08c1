use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    color::Rgb565,
    config::{DEFAULT_INFO_TIMEOUT_MS, DEFAULT_SCREENSAVER_TIMEOUT_MS},
    error::{FieldError, RequestError, StorageError},
    storage::{load_or, KvStore, NS_SETTINGS},
};

pub const MAX_BUTTONS: usize = 6;
pub const MIN_TIMEOUT_SECS: u64 = 10;

const KEY_TIMEOUT: &str = "timeout";
const KEY_INFO_TIMEOUT: &str = "info_timeout";
const KEY_INFO_ENABLED: &str = "info_enabled";
const KEY_BACKGROUND: &str = "bg_color";
const KEY_ACTIVE: &str = "active_color";
const KEY_LAYOUT: &str = "layout";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    #[default]
    Grid2x2,
    Grid3x2,
}

impl Layout {
    pub fn button_count(self) -> usize {
        match self {
            Self::Grid2x2 => 4,
            Self::Grid3x2 => 6,
        }
    }

    pub fn columns(self) -> usize {
        match self {
            Self::Grid2x2 => 2,
            Self::Grid3x2 => 3,
        }
    }

    pub fn selector(self) -> u8 {
        match self {
            Self::Grid2x2 => 0,
            Self::Grid3x2 => 1,
        }
    }

    pub fn from_selector(selector: u64) -> Option<Self> {
        match selector {
            0 => Some(Self::Grid2x2),
            1 => Some(Self::Grid3x2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorSettings {
    pub background: Rgb565,
    pub active: Rgb565,
    pub normal: [Rgb565; MAX_BUTTONS],
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self {
            background: Rgb565::from_rgb888(10, 30, 70),
            active: Rgb565::from_rgb888(180, 220, 250),
            normal: [
                Rgb565::from_rgb888(70, 130, 180),
                Rgb565::from_rgb888(100, 149, 237),
                Rgb565::from_rgb888(72, 209, 204),
                Rgb565::from_rgb888(95, 158, 160),
                Rgb565::from_rgb888(255, 99, 71),
                Rgb565::from_rgb888(138, 43, 226),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSettings {
    pub screensaver_timeout_ms: u64,
    pub info_timeout_ms: u64,
    pub info_enabled: bool,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            screensaver_timeout_ms: DEFAULT_SCREENSAVER_TIMEOUT_MS,
            info_timeout_ms: DEFAULT_INFO_TIMEOUT_MS,
            info_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeckSettings {
    pub timing: TimingSettings,
    pub colors: ColorSettings,
    pub layout: Layout,
}

/// Decoded `POST /settings` body; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub screensaver_timeout_ms: Option<u64>,
    pub info_timeout_ms: Option<u64>,
    pub info_enabled: Option<bool>,
    pub layout: Option<Layout>,
    pub background: Option<Rgb565>,
    pub active: Option<Rgb565>,
    pub colors: Vec<Rgb565>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChange {
    pub changed: bool,
    pub layout_changed: bool,
    pub info_disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsView {
    pub timeout: u64,
    pub background: String,
    pub active: String,
    pub layout: u8,
    pub info_timeout: u64,
    pub info_enabled: bool,
    pub colors: Vec<String>,
}

impl SettingsPatch {
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
        Self::from_fields(&fields)
    }

    pub fn from_fields(fields: &Map<String, Value>) -> Result<Self, RequestError> {
        let mut patch = Self::default();
        let mut errors = Vec::new();

        if let Some(value) = fields.get("timeout") {
            patch.screensaver_timeout_ms = decode_seconds("timeout", value, &mut errors);
        }
        if let Some(value) = fields.get("info_timeout") {
            patch.info_timeout_ms = decode_seconds("info_timeout", value, &mut errors);
        }
        if let Some(value) = fields.get("info_enabled") {
            match value.as_bool() {
                Some(enabled) => patch.info_enabled = Some(enabled),
                None => errors.push(FieldError::new("info_enabled", "expected true or false")),
            }
        }
        if let Some(value) = fields.get("layout") {
            match value.as_u64().and_then(Layout::from_selector) {
                Some(layout) => patch.layout = Some(layout),
                None => errors.push(FieldError::new("layout", "expected 0 or 1")),
            }
        }
        if let Some(value) = fields.get("background") {
            patch.background = decode_color("background", value, &mut errors);
        }
        if let Some(value) = fields.get("active") {
            patch.active = decode_color("active", value, &mut errors);
        }
        if let Some(value) = fields.get("colors") {
            match value.as_array() {
                Some(entries) => {
                    for (index, entry) in entries.iter().take(MAX_BUTTONS).enumerate() {
                        if let Some(color) =
                            decode_color(&format!("colors[{index}]"), entry, &mut errors)
                        {
                            patch.colors.push(color);
                        }
                    }
                }
                None => errors.push(FieldError::new("colors", "expected an array of hex strings")),
            }
        }

        if errors.is_empty() {
            Ok(patch)
        } else {
            Err(RequestError::InvalidFields(errors))
        }
    }
}

fn decode_seconds(field: &str, value: &Value, errors: &mut Vec<FieldError>) -> Option<u64> {
    let Some(secs) = value.as_u64() else {
        errors.push(FieldError::new(field, "expected whole seconds"));
        return None;
    };
    if secs < MIN_TIMEOUT_SECS {
        errors.push(FieldError::new(
            field,
            format!("expected at least {MIN_TIMEOUT_SECS} seconds"),
        ));
        return None;
    }
    match secs.checked_mul(1_000) {
        Some(ms) => Some(ms),
        None => {
            errors.push(FieldError::new(field, "expected whole seconds"));
            None
        }
    }
}

fn load_timeout(store: &dyn KvStore, key: &str, default_ms: u64) -> u64 {
    let ms = load_or(store.get_u64(NS_SETTINGS, key), NS_SETTINGS, key, default_ms);
    if ms < MIN_TIMEOUT_SECS * 1_000 {
        warn!("stored {key} of {ms} ms is below the floor, using default");
        return default_ms;
    }
    ms
}

fn decode_color(field: &str, value: &Value, errors: &mut Vec<FieldError>) -> Option<Rgb565> {
    let Some(hex) = value.as_str() else {
        errors.push(FieldError::new(field, "expected a hex color string"));
        return None;
    };
    match Rgb565::from_hex(hex) {
        Ok(color) => Some(color),
        Err(err) => {
            errors.push(FieldError::new(field, err.to_string()));
            None
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    settings: DeckSettings,
}

impl SettingsStore {
    pub fn new(settings: DeckSettings) -> Self {
        Self { settings }
    }

    pub fn load(store: &dyn KvStore) -> Self {
        let defaults = DeckSettings::default();
        let ns = NS_SETTINGS;

        let mut normal = defaults.colors.normal;
        for (index, slot) in normal.iter_mut().enumerate() {
            let key = color_key(index);
            *slot = Rgb565(load_or(store.get_u16(ns, &key), ns, &key, slot.0));
        }

        let layout_selector = load_or(
            store.get_u8(ns, KEY_LAYOUT),
            ns,
            KEY_LAYOUT,
            defaults.layout.selector(),
        );
        let layout = Layout::from_selector(u64::from(layout_selector)).unwrap_or_else(|| {
            warn!("unknown stored layout {layout_selector}, using default");
            defaults.layout
        });

        let settings = DeckSettings {
            timing: TimingSettings {
                screensaver_timeout_ms: load_timeout(
                    store,
                    KEY_TIMEOUT,
                    defaults.timing.screensaver_timeout_ms,
                ),
                info_timeout_ms: load_timeout(
                    store,
                    KEY_INFO_TIMEOUT,
                    defaults.timing.info_timeout_ms,
                ),
                info_enabled: load_or(
                    store.get_bool(ns, KEY_INFO_ENABLED),
                    ns,
                    KEY_INFO_ENABLED,
                    defaults.timing.info_enabled,
                ),
            },
            colors: ColorSettings {
                background: Rgb565(load_or(
                    store.get_u16(ns, KEY_BACKGROUND),
                    ns,
                    KEY_BACKGROUND,
                    defaults.colors.background.0,
                )),
                active: Rgb565(load_or(
                    store.get_u16(ns, KEY_ACTIVE),
                    ns,
                    KEY_ACTIVE,
                    defaults.colors.active.0,
                )),
                normal,
            },
            layout,
        };

        Self { settings }
    }

    pub fn save(&self, store: &mut dyn KvStore) -> Result<(), StorageError> {
        let ns = NS_SETTINGS;
        let timing = &self.settings.timing;
        let colors = &self.settings.colors;

        store.set_u64(ns, KEY_TIMEOUT, timing.screensaver_timeout_ms)?;
        store.set_u16(ns, KEY_BACKGROUND, colors.background.0)?;
        store.set_u16(ns, KEY_ACTIVE, colors.active.0)?;
        store.set_u8(ns, KEY_LAYOUT, self.settings.layout.selector())?;
        store.set_u64(ns, KEY_INFO_TIMEOUT, timing.info_timeout_ms)?;
        store.set_bool(ns, KEY_INFO_ENABLED, timing.info_enabled)?;
        for (index, color) in colors.normal.iter().enumerate() {
            store.set_u16(ns, &color_key(index), color.0)?;
        }
        Ok(())
    }

    pub fn settings(&self) -> &DeckSettings {
        &self.settings
    }

    pub fn timing(&self) -> &TimingSettings {
        &self.settings.timing
    }

    pub fn colors(&self) -> &ColorSettings {
        &self.settings.colors
    }

    pub fn layout(&self) -> Layout {
        self.settings.layout
    }

    pub fn apply_patch(&mut self, patch: &SettingsPatch) -> SettingsChange {
        let mut change = SettingsChange::default();
        let current = &mut self.settings;

        if let Some(timeout) = patch.screensaver_timeout_ms {
            if timeout != current.timing.screensaver_timeout_ms {
                current.timing.screensaver_timeout_ms = timeout;
                change.changed = true;
                info!("screensaver timeout changed to {} s", timeout / 1_000);
            }
        }
        if let Some(timeout) = patch.info_timeout_ms {
            if timeout != current.timing.info_timeout_ms {
                current.timing.info_timeout_ms = timeout;
                change.changed = true;
                info!("info timeout changed to {} s", timeout / 1_000);
            }
        }
        if let Some(enabled) = patch.info_enabled {
            if enabled != current.timing.info_enabled {
                current.timing.info_enabled = enabled;
                change.changed = true;
                change.info_disabled = !enabled;
                info!("info mode enabled: {enabled}");
            }
        }
        if let Some(layout) = patch.layout {
            if layout != current.layout {
                current.layout = layout;
                change.changed = true;
                change.layout_changed = true;
                info!("layout changed to {layout:?}");
            }
        }
        if let Some(background) = patch.background {
            if background != current.colors.background {
                current.colors.background = background;
                change.changed = true;
                info!("background color changed to 0x{:04X}", background.0);
            }
        }
        if let Some(active) = patch.active {
            if active != current.colors.active {
                current.colors.active = active;
                change.changed = true;
                info!("active color changed to 0x{:04X}", active.0);
            }
        }
        for (index, color) in patch.colors.iter().take(MAX_BUTTONS).enumerate() {
            if *color != current.colors.normal[index] {
                current.colors.normal[index] = *color;
                change.changed = true;
                info!("button {} color changed to 0x{:04X}", index + 1, color.0);
            }
        }

        change
    }

    pub fn view(&self) -> SettingsView {
        let settings = &self.settings;
        SettingsView {
            timeout: settings.timing.screensaver_timeout_ms / 1_000,
            background: settings.colors.background.to_hex(),
            active: settings.colors.active.to_hex(),
            layout: settings.layout.selector(),
            info_timeout: settings.timing.info_timeout_ms / 1_000,
            info_enabled: settings.timing.info_enabled,
            colors: settings.colors.normal.iter().map(|c| c.to_hex()).collect(),
        }
    }
}

fn color_key(index: usize) -> String {
    format!("color{index}")
}
