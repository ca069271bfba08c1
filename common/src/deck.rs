use log::{error, info, warn};

use crate::{
    buttons::ButtonGrid,
    config::DeckConfig,
    console::{parse_line, ConsoleCommand},
    display::Display,
    error::{ProvisioningError, StorageError},
    mode::{DeckAction, Mode, ModeController, TickInput},
    provisioning::{Clock, Credentials, NetworkStatus, Provisioner, RetryPolicy, WifiLink},
    render,
    settings::{SettingsChange, SettingsPatch, SettingsStore, SettingsView},
    storage::KvStore,
    system_info::{InfoTracker, SystemInfoPatch},
    touch::{RawTouch, TouchPoint},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerRequest {
    DeepSleep,
    Restart,
}

pub struct Deck<S, D, W, C> {
    config: DeckConfig,
    store: S,
    display: D,
    wifi: W,
    clock: C,
    settings: SettingsStore,
    grid: ButtonGrid,
    info: InfoTracker,
    modes: ModeController,
    provisioner: Provisioner,
    pending_tap: Option<TouchPoint>,
    power: Option<PowerRequest>,
}

impl<S, D, W, C> Deck<S, D, W, C>
where
    S: KvStore,
    D: Display,
    W: WifiLink,
    C: Clock,
{
    /// Loads persisted settings and buttons and lays out the grid. Nothing is
    /// drawn and the radio is untouched until [`Deck::start`].
    pub fn new(
        mut config: DeckConfig,
        store: S,
        display: D,
        wifi: W,
        clock: C,
        default_credentials: Option<Credentials>,
    ) -> Self {
        config.sanitize();

        let settings = SettingsStore::load(&store);
        let mut grid = ButtonGrid::new(config.toggle_debounce_ms, config.max_label_chars);
        grid.load(&store);
        grid.compute_layout(settings.layout(), display.width(), display.height());

        let modes = ModeController::new(
            Mode::Buttons,
            clock.now_ms(),
            config.info_update_interval_ms,
            config.deep_sleep_supported,
        );
        let provisioner = Provisioner::new(
            RetryPolicy {
                attempts: config.join_attempts,
                delay_ms: config.join_retry_delay_ms,
            },
            config.access_point_ssid.clone(),
            default_credentials,
        );

        Self {
            config,
            store,
            display,
            wifi,
            clock,
            settings,
            grid,
            info: InfoTracker::default(),
            modes,
            provisioner,
            pending_tap: None,
            power: None,
        }
    }

    pub fn start(&mut self) -> NetworkStatus {
        render::draw_startup(&mut self.display);
        self.clock.sleep_ms(self.config.startup_splash_ms);

        let status = self
            .provisioner
            .boot(&mut self.wifi, &mut self.clock, &self.store)
            .clone();

        let url = self.api_url();
        render::draw_api_url(&mut self.display, &url);
        self.clock.sleep_ms(self.config.api_url_screen_ms);

        let now_ms = self.clock.now_ms();
        let actions = if status.is_fallback() {
            self.modes.enter_provisioning(now_ms)
        } else {
            self.modes.network_ready(now_ms)
        };
        self.apply(actions);
        status
    }

    pub fn tick(&mut self, raw_touch: Option<RawTouch>) -> Option<PowerRequest> {
        let now_ms = self.clock.now_ms();
        let touch = raw_touch
            .and_then(|raw| {
                self.config
                    .touch
                    .map(raw, self.display.width(), self.display.height())
            })
            .or_else(|| self.pending_tap.take());

        let actions = self.modes.tick(
            TickInput { now_ms, touch },
            &mut self.grid,
            self.settings.timing(),
            &mut self.info,
        );
        self.apply(actions);
        self.power.take()
    }

    pub fn console(&mut self, line: &str) -> Option<String> {
        match parse_line(line) {
            ConsoleCommand::Empty => None,
            ConsoleCommand::ForgetWifi => {
                info!("console: clearing wifi credentials");
                let reply = match self.provisioner.forget(&mut self.wifi, &mut self.store) {
                    Ok(()) => format!(
                        "WiFi credentials cleared. AP mode started ({}).",
                        self.config.access_point_ssid
                    ),
                    Err(err) => {
                        error!("failed to clear wifi credentials: {err}");
                        format!("AP mode started, but credentials could not be cleared: {err}")
                    }
                };
                let now_ms = self.clock.now_ms();
                let actions = self.modes.enter_provisioning(now_ms);
                self.apply(actions);
                Some(reply)
            }
            ConsoleCommand::Tap { x, y } => {
                self.pending_tap = Some(TouchPoint { x, y });
                Some(format!("Tap queued at {x},{y}"))
            }
            ConsoleCommand::Unknown(command) => Some(format!("Unknown command: {command}")),
        }
    }

    pub fn mode(&self) -> Mode {
        self.modes.mode()
    }

    pub fn grid(&self) -> &ButtonGrid {
        &self.grid
    }

    pub fn settings_view(&self) -> SettingsView {
        self.settings.view()
    }

    pub fn network_status(&self) -> &NetworkStatus {
        self.provisioner.status()
    }

    pub fn config(&self) -> &DeckConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn wifi(&self) -> &W {
        &self.wifi
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn api_url(&self) -> String {
        match self.provisioner.status() {
            NetworkStatus::Joined { address } => format!(
                "http://{}/state",
                address.as_deref().unwrap_or(&self.config.hostname)
            ),
            NetworkStatus::Fallback { address } => format!(
                "http://{}/",
                address
                    .as_deref()
                    .unwrap_or(&self.config.access_point_address)
            ),
            NetworkStatus::Offline => "offline".to_string(),
        }
    }

    pub fn apply_labels(&mut self, labels: &[(usize, String)]) -> Result<bool, StorageError> {
        let mut changed = false;
        for (index, label) in labels {
            changed |= self.grid.set_label(*index, label);
        }
        if !changed {
            return Ok(false);
        }
        let saved = self.grid.save(&mut self.store);
        let actions = self.modes.labels_changed();
        self.apply(actions);
        saved.map(|()| true)
    }

    pub fn apply_settings(&mut self, patch: &SettingsPatch) -> Result<SettingsChange, StorageError> {
        let change = self.settings.apply_patch(patch);
        if !change.changed {
            info!("settings patch changed nothing");
            return Ok(change);
        }
        if change.layout_changed {
            self.grid.compute_layout(
                self.settings.layout(),
                self.display.width(),
                self.display.height(),
            );
        }
        let saved = self.settings.save(&mut self.store);
        let now_ms = self.clock.now_ms();
        let actions = self.modes.settings_applied(change, now_ms);
        self.apply(actions);
        saved.map(|()| change)
    }

    pub fn push_system_info(&mut self, patch: SystemInfoPatch) {
        self.info.apply(patch);
    }

    /// Blocks for the whole retry budget. On success a restart is queued.
    pub fn submit_credentials(
        &mut self,
        credentials: Credentials,
    ) -> Result<(), ProvisioningError> {
        let result = self.provisioner.submit(
            credentials,
            &mut self.wifi,
            &mut self.clock,
            &mut self.store,
        );
        match &result {
            Ok(()) => self.apply(vec![DeckAction::Restart]),
            Err(_) => {
                let now_ms = self.clock.now_ms();
                let actions = self.modes.enter_provisioning(now_ms);
                self.apply(actions);
            }
        }
        result
    }

    pub fn take_power_request(&mut self) -> Option<PowerRequest> {
        self.power.take()
    }

    fn apply(&mut self, actions: Vec<DeckAction>) {
        for action in actions {
            match action {
                DeckAction::DrawGrid => {
                    render::draw_grid(&mut self.display, &self.grid, self.settings.colors());
                }
                DeckAction::DrawInfo(changes) => render::draw_info(
                    &mut self.display,
                    self.info.current(),
                    changes,
                    self.settings.colors().background,
                ),
                DeckAction::DrawProvisioning => render::draw_provisioning(
                    &mut self.display,
                    &self.config.access_point_ssid,
                    &self.config.access_point_address,
                    self.settings.colors().background,
                ),
                DeckAction::BlankScreen => render::draw_blank(&mut self.display),
                DeckAction::EnterDeepSleep => {
                    render::draw_sleep(&mut self.display);
                    self.power = Some(PowerRequest::DeepSleep);
                }
                DeckAction::PersistButtons => {
                    if let Err(err) = self.grid.save(&mut self.store) {
                        warn!("failed to persist button states: {err}");
                    }
                }
                DeckAction::Restart => self.power = Some(PowerRequest::Restart),
            }
        }
    }
}
