use log::info;

use crate::{
    buttons::ButtonGrid,
    settings::{SettingsChange, TimingSettings},
    system_info::{InfoChanges, InfoTracker},
    touch::TouchPoint,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Buttons,
    InfoDisplay,
    Screensaver,
    DeepSleep,
    Provisioning,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buttons => "BUTTONS",
            Self::InfoDisplay => "INFO",
            Self::Screensaver => "SCREENSAVER",
            Self::DeepSleep => "DEEP_SLEEP",
            Self::Provisioning => "PROVISIONING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckAction {
    DrawGrid,
    DrawInfo(InfoChanges),
    DrawProvisioning,
    BlankScreen,
    EnterDeepSleep,
    PersistButtons,
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickInput {
    pub now_ms: u64,
    pub touch: Option<TouchPoint>,
}

#[derive(Debug, Clone)]
pub struct ModeController {
    mode: Mode,
    last_interaction_ms: u64,
    last_info_refresh_ms: u64,
    info_refresh_interval_ms: u64,
    deep_sleep_supported: bool,
}

impl ModeController {
    pub fn new(
        mode: Mode,
        now_ms: u64,
        info_refresh_interval_ms: u64,
        deep_sleep_supported: bool,
    ) -> Self {
        Self {
            mode,
            last_interaction_ms: now_ms,
            last_info_refresh_ms: now_ms,
            info_refresh_interval_ms,
            deep_sleep_supported,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_interaction_ms)
    }

    pub fn tick(
        &mut self,
        input: TickInput,
        grid: &mut ButtonGrid,
        timing: &TimingSettings,
        info: &mut InfoTracker,
    ) -> Vec<DeckAction> {
        let now_ms = input.now_ms;
        let mut actions = Vec::new();

        if self.mode == Mode::DeepSleep {
            return actions;
        }

        if let Some(point) = input.touch {
            self.last_interaction_ms = now_ms;
            match self.mode {
                Mode::InfoDisplay | Mode::Screensaver => {
                    actions.push(self.enter(Mode::Buttons, now_ms));
                    return actions;
                }
                Mode::Buttons => {
                    if let Some(index) = grid.hit_test(point.x, point.y) {
                        if grid.toggle(index, now_ms) {
                            actions.push(DeckAction::PersistButtons);
                            actions.push(DeckAction::DrawGrid);
                        }
                    }
                }
                Mode::Provisioning | Mode::DeepSleep => {}
            }
        }

        if self.mode == Mode::Provisioning {
            return actions;
        }

        let idle_ms = self.idle_ms(now_ms);

        if timing.info_enabled && self.mode == Mode::Buttons && idle_ms > timing.info_timeout_ms {
            info.invalidate();
            info.take_changes();
            actions.push(self.enter(Mode::InfoDisplay, now_ms));
        } else if self.mode == Mode::InfoDisplay
            && now_ms.saturating_sub(self.last_info_refresh_ms) > self.info_refresh_interval_ms
        {
            self.last_info_refresh_ms = now_ms;
            let changes = info.take_changes();
            if changes.any() {
                actions.push(DeckAction::DrawInfo(changes));
            }
        }

        if matches!(self.mode, Mode::Buttons | Mode::InfoDisplay)
            && idle_ms > timing.screensaver_timeout_ms
        {
            let target = if self.deep_sleep_supported {
                Mode::DeepSleep
            } else {
                Mode::Screensaver
            };
            actions.push(self.enter(target, now_ms));
        }

        actions
    }

    pub fn settings_applied(&mut self, change: SettingsChange, now_ms: u64) -> Vec<DeckAction> {
        if !change.changed {
            return Vec::new();
        }
        if change.info_disabled && self.mode == Mode::InfoDisplay {
            return vec![self.enter(Mode::Buttons, now_ms)];
        }
        if self.mode == Mode::Buttons {
            return vec![DeckAction::DrawGrid];
        }
        Vec::new()
    }

    pub fn labels_changed(&self) -> Vec<DeckAction> {
        if self.mode == Mode::Buttons {
            vec![DeckAction::DrawGrid]
        } else {
            Vec::new()
        }
    }

    pub fn network_ready(&mut self, now_ms: u64) -> Vec<DeckAction> {
        self.last_interaction_ms = now_ms;
        vec![self.enter(Mode::Buttons, now_ms)]
    }

    pub fn enter_provisioning(&mut self, now_ms: u64) -> Vec<DeckAction> {
        if self.mode == Mode::DeepSleep {
            return Vec::new();
        }
        self.last_interaction_ms = now_ms;
        vec![self.enter(Mode::Provisioning, now_ms)]
    }

    fn enter(&mut self, mode: Mode, now_ms: u64) -> DeckAction {
        if self.mode != mode {
            info!("mode {} -> {}", self.mode.as_str(), mode.as_str());
        }
        self.mode = mode;
        match mode {
            Mode::Buttons => DeckAction::DrawGrid,
            Mode::InfoDisplay => {
                self.last_info_refresh_ms = now_ms;
                DeckAction::DrawInfo(InfoChanges::ALL)
            }
            Mode::Screensaver => DeckAction::BlankScreen,
            Mode::DeepSleep => DeckAction::EnterDeepSleep,
            Mode::Provisioning => DeckAction::DrawProvisioning,
        }
    }
}
