use std::{collections::BTreeMap, fmt};

use log::{error, info, warn};

use crate::{
    error::{NetworkError, ProvisioningError, StorageError},
    storage::{load_or, KvStore, NS_SETTINGS},
};

pub const KEY_WIFI_SSID: &str = "wifi_ssid";
pub const KEY_WIFI_PASS: &str = "wifi_pass";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

impl Credentials {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }

    pub fn load(store: &dyn KvStore) -> Option<Self> {
        let ssid = load_or(
            store.get_str(NS_SETTINGS, KEY_WIFI_SSID),
            NS_SETTINGS,
            KEY_WIFI_SSID,
            String::new(),
        );
        if ssid.is_empty() {
            return None;
        }
        let password = load_or(
            store.get_str(NS_SETTINGS, KEY_WIFI_PASS),
            NS_SETTINGS,
            KEY_WIFI_PASS,
            String::new(),
        );
        Some(Self { ssid, password })
    }

    pub fn save(&self, store: &mut dyn KvStore) -> Result<(), StorageError> {
        store.set_str(NS_SETTINGS, KEY_WIFI_SSID, &self.ssid)?;
        store.set_str(NS_SETTINGS, KEY_WIFI_PASS, &self.password)
    }

    pub fn clear(store: &mut dyn KvStore) -> Result<(), StorageError> {
        store.remove(NS_SETTINGS, KEY_WIFI_SSID)?;
        store.remove(NS_SETTINGS, KEY_WIFI_PASS)?;
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"***")
            .finish()
    }
}

pub trait WifiLink {
    fn join(&mut self, credentials: &Credentials) -> Result<(), NetworkError>;
    fn disconnect(&mut self);
    fn start_access_point(&mut self, ssid: &str) -> Result<(), NetworkError>;
    fn stop_access_point(&mut self);
    fn local_address(&self) -> Option<String>;
}

pub trait Clock {
    fn now_ms(&self) -> u64;
    fn sleep_ms(&mut self, ms: u64);
}

#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: u64,
    slept_ms: u64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self { now_ms, slept_ms: 0 }
    }

    pub fn advance(&mut self, ms: u64) {
        self.now_ms += ms;
    }

    pub fn slept_ms(&self) -> u64 {
        self.slept_ms
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn sleep_ms(&mut self, ms: u64) {
        self.now_ms += ms;
        self.slept_ms += ms;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 40,
            delay_ms: 500,
        }
    }
}

/// Tries up to `policy.attempts` joins, sleeping `policy.delay_ms` between
/// them. Returns the 1-based attempt that succeeded, or the last error.
pub fn join_with_retry(
    wifi: &mut dyn WifiLink,
    clock: &mut dyn Clock,
    credentials: &Credentials,
    policy: RetryPolicy,
) -> Result<u32, NetworkError> {
    if credentials.ssid.is_empty() {
        return Err(NetworkError::JoinFailed {
            ssid: String::new(),
            reason: "empty ssid".to_string(),
        });
    }

    let attempts = policy.attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        info!("wifi join attempt {attempt}/{attempts} to `{}`", credentials.ssid);
        match wifi.join(credentials) {
            Ok(()) => {
                info!("joined `{}` on attempt {attempt}", credentials.ssid);
                return Ok(attempt);
            }
            Err(err) => {
                warn!("wifi join attempt {attempt} failed: {err}");
                last_err = Some(err);
            }
        }
        if attempt < attempts {
            wifi.disconnect();
            clock.sleep_ms(policy.delay_ms);
        }
    }

    Err(last_err.unwrap_or_else(|| NetworkError::JoinFailed {
        ssid: credentials.ssid.clone(),
        reason: "no attempts made".to_string(),
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinOutcome {
    #[default]
    Pending,
    Connected,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningState {
    pub candidate: Option<Credentials>,
    pub attempts: u32,
    pub last_outcome: JoinOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkStatus {
    Offline,
    Joined { address: Option<String> },
    Fallback { address: Option<String> },
}

impl NetworkStatus {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

#[derive(Debug)]
pub struct Provisioner {
    policy: RetryPolicy,
    access_point_ssid: String,
    default_credentials: Option<Credentials>,
    status: NetworkStatus,
    state: Option<ProvisioningState>,
}

impl Provisioner {
    pub fn new(
        policy: RetryPolicy,
        access_point_ssid: impl Into<String>,
        default_credentials: Option<Credentials>,
    ) -> Self {
        Self {
            policy,
            access_point_ssid: access_point_ssid.into(),
            default_credentials: default_credentials.filter(|c| !c.ssid.is_empty()),
            status: NetworkStatus::Offline,
            state: None,
        }
    }

    pub fn status(&self) -> &NetworkStatus {
        &self.status
    }

    pub fn state(&self) -> Option<&ProvisioningState> {
        self.state.as_ref()
    }

    /// Joins with stored credentials, else the built-in defaults, else goes
    /// straight to the fallback access point.
    pub fn boot(
        &mut self,
        wifi: &mut dyn WifiLink,
        clock: &mut dyn Clock,
        store: &dyn KvStore,
    ) -> &NetworkStatus {
        let credentials = Credentials::load(store).or_else(|| self.default_credentials.clone());
        let Some(credentials) = credentials else {
            warn!("no wifi credentials configured; starting fallback access point");
            self.enter_fallback(wifi);
            return &self.status;
        };

        match join_with_retry(wifi, clock, &credentials, self.policy) {
            Ok(_) => {
                self.status = NetworkStatus::Joined {
                    address: wifi.local_address(),
                };
                self.state = None;
            }
            Err(err) => {
                warn!("station join failed after {} attempts: {err}", self.policy.attempts);
                wifi.disconnect();
                self.enter_fallback(wifi);
            }
        }
        &self.status
    }

    /// Tries `credentials` and stores them only once a join succeeds. On
    /// failure the access point is broadcasting again when this returns.
    pub fn submit(
        &mut self,
        credentials: Credentials,
        wifi: &mut dyn WifiLink,
        clock: &mut dyn Clock,
        store: &mut dyn KvStore,
    ) -> Result<(), ProvisioningError> {
        info!("trying submitted credentials for `{}`", credentials.ssid);
        let mut state = self.state.take().unwrap_or_default();
        state.candidate = Some(credentials.clone());
        state.last_outcome = JoinOutcome::Pending;

        wifi.stop_access_point();
        let joined = join_with_retry(wifi, clock, &credentials, self.policy);
        state.attempts += match &joined {
            Ok(attempt) => *attempt,
            Err(_) => self.policy.attempts.max(1),
        };

        let result = joined
            .map_err(ProvisioningError::from)
            .and_then(|_| credentials.save(store).map_err(ProvisioningError::from));

        match result {
            Ok(()) => {
                info!("stored credentials for `{}`", credentials.ssid);
                self.status = NetworkStatus::Joined {
                    address: wifi.local_address(),
                };
                state.last_outcome = JoinOutcome::Connected;
                self.state = Some(state);
                Ok(())
            }
            Err(err) => {
                warn!("submitted credentials rejected: {err}");
                state.last_outcome = JoinOutcome::Failed;
                self.state = Some(state);
                wifi.disconnect();
                self.enter_fallback(wifi);
                Err(err)
            }
        }
    }

    pub fn forget(
        &mut self,
        wifi: &mut dyn WifiLink,
        store: &mut dyn KvStore,
    ) -> Result<(), StorageError> {
        let cleared = Credentials::clear(store);
        wifi.disconnect();
        self.state = None;
        self.enter_fallback(wifi);
        cleared
    }

    fn enter_fallback(&mut self, wifi: &mut dyn WifiLink) {
        if let Err(err) = wifi.start_access_point(&self.access_point_ssid) {
            error!("failed to start access point `{}`: {err}", self.access_point_ssid);
        } else {
            info!("access point `{}` broadcasting", self.access_point_ssid);
        }
        self.status = NetworkStatus::Fallback {
            address: wifi.local_address(),
        };
        if self.state.is_none() {
            self.state = Some(ProvisioningState::default());
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedWifi {
    networks: BTreeMap<String, String>,
    accept_any: bool,
    station_address: String,
    access_point_address: String,
    joined: Option<String>,
    access_point: Option<String>,
    join_calls: u32,
}

impl SimulatedWifi {
    pub fn accept_any(access_point_address: impl Into<String>) -> Self {
        Self::build(BTreeMap::new(), true, access_point_address.into())
    }

    pub fn with_networks<I, S, P>(networks: I, access_point_address: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (S, P)>,
        S: Into<String>,
        P: Into<String>,
    {
        let networks = networks
            .into_iter()
            .map(|(ssid, pass)| (ssid.into(), pass.into()))
            .collect();
        Self::build(networks, false, access_point_address.into())
    }

    pub fn parse_networks(list: &str) -> Vec<(String, String)> {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.split_once(':') {
                Some((ssid, pass)) => (ssid.trim().to_string(), pass.to_string()),
                None => (entry.to_string(), String::new()),
            })
            .collect()
    }

    fn build(
        networks: BTreeMap<String, String>,
        accept_any: bool,
        access_point_address: String,
    ) -> Self {
        Self {
            networks,
            accept_any,
            station_address: "192.168.1.50".to_string(),
            access_point_address,
            joined: None,
            access_point: None,
            join_calls: 0,
        }
    }

    pub fn joined(&self) -> Option<&str> {
        self.joined.as_deref()
    }

    pub fn access_point(&self) -> Option<&str> {
        self.access_point.as_deref()
    }

    pub fn join_calls(&self) -> u32 {
        self.join_calls
    }
}

impl WifiLink for SimulatedWifi {
    fn join(&mut self, credentials: &Credentials) -> Result<(), NetworkError> {
        self.join_calls += 1;
        let reachable = if self.accept_any {
            !credentials.ssid.is_empty()
        } else {
            self.networks.get(&credentials.ssid) == Some(&credentials.password)
        };
        if reachable {
            self.joined = Some(credentials.ssid.clone());
            Ok(())
        } else {
            Err(NetworkError::JoinFailed {
                ssid: credentials.ssid.clone(),
                reason: "network unreachable".to_string(),
            })
        }
    }

    fn disconnect(&mut self) {
        self.joined = None;
    }

    fn start_access_point(&mut self, ssid: &str) -> Result<(), NetworkError> {
        self.access_point = Some(ssid.to_string());
        Ok(())
    }

    fn stop_access_point(&mut self) {
        self.access_point = None;
    }

    fn local_address(&self) -> Option<String> {
        if self.joined.is_some() {
            Some(self.station_address.clone())
        } else if self.access_point.is_some() {
            Some(self.access_point_address.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::storage::MemoryStore;

    const POLICY: RetryPolicy = RetryPolicy {
        attempts: 40,
        delay_ms: 500,
    };

    fn home_wifi() -> SimulatedWifi {
        SimulatedWifi::with_networks([("home", "secret")], "192.168.4.1")
    }

    fn provisioner(defaults: Option<Credentials>) -> Provisioner {
        Provisioner::new(POLICY, "CheapDeck-Setup", defaults)
    }

    #[test]
    fn retry_budget_is_bounded_and_uses_injected_clock() {
        let mut wifi = home_wifi();
        let mut clock = ManualClock::new(0);

        let err = join_with_retry(&mut wifi, &mut clock, &Credentials::new("cafe", ""), POLICY)
            .unwrap_err();

        assert!(matches!(err, NetworkError::JoinFailed { .. }));
        assert_eq!(wifi.join_calls(), 40);
        assert_eq!(clock.slept_ms(), 39 * 500);
    }

    #[test]
    fn retry_stops_on_first_success() {
        let mut wifi = home_wifi();
        let mut clock = ManualClock::new(0);

        let attempt =
            join_with_retry(&mut wifi, &mut clock, &Credentials::new("home", "secret"), POLICY)
                .unwrap();

        assert_eq!(attempt, 1);
        assert_eq!(clock.slept_ms(), 0);
    }

    #[test]
    fn boot_prefers_stored_credentials() {
        let mut store = MemoryStore::new();
        Credentials::new("home", "secret").save(&mut store).unwrap();
        let mut prov = provisioner(Some(Credentials::new("factory", "x")));
        let mut wifi = home_wifi();

        let status = prov.boot(&mut wifi, &mut ManualClock::new(0), &store).clone();

        assert_eq!(
            status,
            NetworkStatus::Joined {
                address: Some("192.168.1.50".to_string())
            }
        );
        assert_eq!(wifi.joined(), Some("home"));
        assert!(prov.state().is_none());
    }

    #[test]
    fn boot_without_any_credentials_skips_join() {
        let store = MemoryStore::new();
        let mut prov = provisioner(None);
        let mut wifi = home_wifi();

        assert!(prov
            .boot(&mut wifi, &mut ManualClock::new(0), &store)
            .is_fallback());
        assert_eq!(wifi.join_calls(), 0);
        assert_eq!(wifi.access_point(), Some("CheapDeck-Setup"));
        assert_eq!(prov.state(), Some(&ProvisioningState::default()));
    }

    #[test]
    fn failed_submit_keeps_previous_credentials_and_access_point() {
        let mut store = MemoryStore::new();
        Credentials::new("old", "pw").save(&mut store).unwrap();
        let mut prov = provisioner(None);
        let mut wifi = home_wifi();
        let mut clock = ManualClock::new(0);
        prov.boot(&mut wifi, &mut clock, &store);

        let err = prov
            .submit(Credentials::new("nowhere", "pw"), &mut wifi, &mut clock, &mut store)
            .unwrap_err();

        assert!(matches!(err, ProvisioningError::Join(_)));
        assert_eq!(Credentials::load(&store), Some(Credentials::new("old", "pw")));
        assert_eq!(wifi.access_point(), Some("CheapDeck-Setup"));
        assert!(prov.status().is_fallback());
        let state = prov.state().unwrap();
        assert_eq!(state.last_outcome, JoinOutcome::Failed);
        assert_eq!(state.candidate.as_ref().map(|c| c.ssid.as_str()), Some("nowhere"));
        assert_eq!(state.attempts, 40);
    }

    #[test]
    fn successful_submit_persists_and_records_connection() {
        let mut store = MemoryStore::new();
        let mut prov = provisioner(None);
        let mut wifi = home_wifi();
        let mut clock = ManualClock::new(0);
        prov.boot(&mut wifi, &mut clock, &store);

        prov.submit(Credentials::new("home", "secret"), &mut wifi, &mut clock, &mut store)
            .unwrap();

        assert_eq!(Credentials::load(&store), Some(Credentials::new("home", "secret")));
        assert_eq!(wifi.access_point(), None);
        let state = prov.state().unwrap();
        assert_eq!(state.last_outcome, JoinOutcome::Connected);
        assert_eq!(state.attempts, 1);
        assert!(matches!(prov.status(), NetworkStatus::Joined { .. }));
    }

    #[test]
    fn forget_clears_credentials_and_starts_access_point() {
        let mut store = MemoryStore::new();
        Credentials::new("home", "secret").save(&mut store).unwrap();
        let mut prov = provisioner(None);
        let mut wifi = home_wifi();
        prov.boot(&mut wifi, &mut ManualClock::new(0), &store);

        prov.forget(&mut wifi, &mut store).unwrap();

        assert_eq!(Credentials::load(&store), None);
        assert_eq!(wifi.joined(), None);
        assert_eq!(wifi.access_point(), Some("CheapDeck-Setup"));
        assert!(prov.status().is_fallback());
    }

    #[test]
    fn parses_simulated_network_list() {
        assert_eq!(
            SimulatedWifi::parse_networks(" home:secret , open ,"),
            vec![
                ("home".to_string(), "secret".to_string()),
                ("open".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn debug_output_hides_password() {
        let text = format!("{:?}", Credentials::new("home", "hunter2"));
        assert!(!text.contains("hunter2"));
    }
}
