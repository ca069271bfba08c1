use core::convert::TryInto;
use std::{
    io::BufRead,
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::{Headers, Method as HttpMethod},
    io::{Read, Write},
    wifi::{AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::prelude::Peripherals,
    http::server::{Configuration as HttpConfiguration, EspHttpConnection, EspHttpServer, Request},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault},
    wifi::{BlockingWifi, EspWifi},
};
use log::{debug, info, warn};

use cheapdeck_common::{
    api::{ApiRequest, ApiResponse, Method, ROUTES},
    error::{NetworkError, StorageError},
    provisioning::{Clock, Credentials, WifiLink},
    touch::{NoTouch, TouchPanel},
    Deck, DeckConfig, Display, Font, KvStore, PowerRequest, Rgb565,
};

const MAX_HTTP_BODY: usize = 4096;
const MAX_NVS_STR: usize = 256;
const TICK_INTERVAL_MS: u64 = 50;
const TOUCH_IRQ_PIN: esp_idf_svc::sys::gpio_num_t = 36;
const TOUCH_IRQ_ACTIVE_LEVEL: i32 = 0;

type EspDeck = Deck<NvsKvStore, SerialDisplay, EspWifiLink, EspClock>;
type SharedDeck = Arc<Mutex<EspDeck>>;

struct NvsKvStore {
    partition: EspDefaultNvsPartition,
}

struct EspWifiLink {
    wifi: BlockingWifi<EspWifi<'static>>,
}

struct SerialDisplay {
    width: i32,
    height: i32,
}

struct EspClock;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals { modem, .. } = Peripherals::take()?;

    let mut config = DeckConfig::default();
    config.sanitize();

    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition.clone()))
        .context("failed to create wifi driver")?;
    if let Err(err) = esp_wifi.sta_netif_mut().set_hostname(&config.hostname) {
        warn!("failed to set hostname `{}`: {err}", config.hostname);
    }
    let wifi = EspWifiLink {
        wifi: BlockingWifi::wrap(esp_wifi, sys_loop)?,
    };

    let display = SerialDisplay {
        width: config.display_width,
        height: config.display_height,
    };
    let store = NvsKvStore {
        partition: nvs_partition,
    };

    let deck = Deck::new(
        config,
        store,
        display,
        wifi,
        EspClock,
        compiled_credentials(),
    );
    let deck: SharedDeck = Arc::new(Mutex::new(deck));

    let status = lock(&deck).start();
    info!("network status after boot: {status:?}");

    let _server = create_http_server(&deck)?;
    spawn_console(Arc::clone(&deck))?;

    // No digitizer driver yet; touches arrive through `TAP x y` on the console.
    let mut touch = NoTouch;
    loop {
        let power = lock(&deck).tick(touch.sample());
        match power {
            None => {}
            Some(PowerRequest::DeepSleep) => enter_deep_sleep(),
            Some(PowerRequest::Restart) => {
                info!("restarting to apply new wifi credentials");
                thread::sleep(Duration::from_millis(500));
                esp_idf_hal::reset::restart();
            }
        }
        thread::sleep(Duration::from_millis(TICK_INTERVAL_MS));
    }
}

fn compiled_credentials() -> Option<Credentials> {
    let ssid = option_env!("WIFI_SSID")?;
    Some(Credentials::new(ssid, option_env!("WIFI_PASS").unwrap_or_default()))
}

fn lock(deck: &SharedDeck) -> MutexGuard<'_, EspDeck> {
    deck.lock().unwrap_or_else(PoisonError::into_inner)
}

fn create_http_server(deck: &SharedDeck) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        stack_size: 16 * 1024,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    let mut preflight_paths: Vec<&'static str> = Vec::new();
    for &(method, path) in ROUTES {
        register_route(&mut server, deck, method, path)?;
        if !preflight_paths.contains(&path) {
            preflight_paths.push(path);
        }
    }
    for path in preflight_paths {
        register_route(&mut server, deck, Method::Options, path)?;
    }

    info!("http server ready with {} routes", ROUTES.len());
    Ok(server)
}

fn register_route(
    server: &mut EspHttpServer<'static>,
    deck: &SharedDeck,
    method: Method,
    path: &'static str,
) -> anyhow::Result<()> {
    let deck = Arc::clone(deck);
    let http_method = match method {
        Method::Get => HttpMethod::Get,
        Method::Post => HttpMethod::Post,
        Method::Options => HttpMethod::Options,
    };

    server.fn_handler::<anyhow::Error, _>(path, http_method, move |mut req| {
        let body = match read_request_body(&mut req) {
            Ok(body) => body,
            Err(err) => {
                warn!("{path}: {err:#}");
                return write_response(req, &ApiResponse::text(413, "Body too large"));
            }
        };
        let content_type = req.header("Content-Type").map(str::to_string);

        let response = lock(&deck).serve(ApiRequest {
            method,
            path,
            content_type: content_type.as_deref(),
            body: &body,
        });
        write_response(req, &response)
    })?;
    Ok(())
}

fn read_request_body(req: &mut Request<&mut EspHttpConnection<'_>>) -> anyhow::Result<Vec<u8>> {
    let len = req.content_len().unwrap_or(0) as usize;
    if len > MAX_HTTP_BODY {
        return Err(anyhow!("request body too large"));
    }

    let mut body = vec![0_u8; len];
    if len > 0 {
        req.read_exact(&mut body)?;
    }
    Ok(body)
}

fn write_response(
    req: Request<&mut EspHttpConnection<'_>>,
    response: &ApiResponse,
) -> anyhow::Result<()> {
    req.into_response(response.status, None, &response.headers())?
        .write_all(response.body.as_bytes())?;
    Ok(())
}

fn spawn_console(deck: SharedDeck) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("console".into())
        .stack_size(8 * 1024)
        .spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.lock().read_line(&mut line) {
                    Ok(0) => thread::sleep(Duration::from_millis(100)),
                    Ok(_) => {
                        if let Some(reply) = lock(&deck).console(&line) {
                            println!("{reply}");
                        }
                    }
                    Err(err) => {
                        debug!("console read failed: {err}");
                        thread::sleep(Duration::from_millis(100));
                    }
                }
            }
        })
        .context("failed to spawn console thread")?;
    Ok(())
}

fn enter_deep_sleep() {
    info!("entering deep sleep; touch wakes the device");
    let rc = unsafe {
        esp_idf_svc::sys::esp_sleep_enable_ext0_wakeup(TOUCH_IRQ_PIN, TOUCH_IRQ_ACTIVE_LEVEL)
    };
    if rc != esp_idf_svc::sys::ESP_OK {
        warn!("failed to arm touch wake-up: esp_err_t={rc}");
    }
    thread::sleep(Duration::from_millis(200));
    unsafe { esp_idf_svc::sys::esp_deep_sleep_start() };
}

impl NvsKvStore {
    fn open(&self, namespace: &str) -> Result<EspNvs<NvsDefault>, StorageError> {
        EspNvs::new(self.partition.clone(), namespace, true).map_err(backend)
    }
}

fn backend(err: esp_idf_svc::sys::EspError) -> StorageError {
    StorageError::Backend(err.to_string())
}

impl KvStore for NvsKvStore {
    fn get_u8(&self, namespace: &str, key: &str) -> Result<Option<u8>, StorageError> {
        self.open(namespace)?.get_u8(key).map_err(backend)
    }

    fn set_u8(&mut self, namespace: &str, key: &str, value: u8) -> Result<(), StorageError> {
        self.open(namespace)?.set_u8(key, value).map_err(backend)
    }

    fn get_u16(&self, namespace: &str, key: &str) -> Result<Option<u16>, StorageError> {
        self.open(namespace)?.get_u16(key).map_err(backend)
    }

    fn set_u16(&mut self, namespace: &str, key: &str, value: u16) -> Result<(), StorageError> {
        self.open(namespace)?.set_u16(key, value).map_err(backend)
    }

    fn get_u64(&self, namespace: &str, key: &str) -> Result<Option<u64>, StorageError> {
        self.open(namespace)?.get_u64(key).map_err(backend)
    }

    fn set_u64(&mut self, namespace: &str, key: &str, value: u64) -> Result<(), StorageError> {
        self.open(namespace)?.set_u64(key, value).map_err(backend)
    }

    fn get_str(&self, namespace: &str, key: &str) -> Result<Option<String>, StorageError> {
        let nvs = self.open(namespace)?;
        let mut buffer = vec![0_u8; MAX_NVS_STR];
        let value = nvs.get_str(key, &mut buffer).map_err(backend)?;
        Ok(value.map(str::to_string))
    }

    fn set_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        self.open(namespace)?.set_str(key, value).map_err(backend)
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        self.open(namespace)?.remove(key).map_err(backend)
    }
}

impl EspWifiLink {
    fn join_once(&mut self, credentials: &Credentials) -> anyhow::Result<()> {
        let auth_method = if credentials.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };
        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: credentials
                    .ssid
                    .as_str()
                    .try_into()
                    .map_err(|_| anyhow!("wifi ssid too long"))?,
                password: credentials
                    .password
                    .as_str()
                    .try_into()
                    .map_err(|_| anyhow!("wifi password too long"))?,
                auth_method,
                ..Default::default()
            }))?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        self.wifi.connect()?;
        self.wifi.wait_netif_up()?;
        Ok(())
    }

    fn open_access_point(&mut self, ssid: &str) -> anyhow::Result<()> {
        if self.wifi.is_started()? {
            self.wifi.stop()?;
        }
        self.wifi
            .set_configuration(&Configuration::AccessPoint(AccessPointConfiguration {
                ssid: ssid
                    .try_into()
                    .map_err(|_| anyhow!("access point SSID too long"))?,
                auth_method: AuthMethod::None,
                channel: 1,
                ..Default::default()
            }))?;
        self.wifi.start()?;
        self.wifi.wait_netif_up()?;
        Ok(())
    }
}

impl WifiLink for EspWifiLink {
    fn join(&mut self, credentials: &Credentials) -> Result<(), NetworkError> {
        self.join_once(credentials)
            .map_err(|err| NetworkError::JoinFailed {
                ssid: credentials.ssid.clone(),
                reason: format!("{err:#}"),
            })
    }

    fn disconnect(&mut self) {
        if let Err(err) = self.wifi.disconnect() {
            debug!("wifi disconnect: {err}");
        }
    }

    fn start_access_point(&mut self, ssid: &str) -> Result<(), NetworkError> {
        self.open_access_point(ssid)
            .map_err(|err| NetworkError::AccessPoint(format!("{err:#}")))
    }

    fn stop_access_point(&mut self) {
        if let Err(err) = self.wifi.stop() {
            debug!("wifi stop: {err}");
        }
    }

    fn local_address(&self) -> Option<String> {
        let driver = self.wifi.wifi();
        let netif = if self.wifi.is_connected().unwrap_or(false) {
            driver.sta_netif()
        } else {
            driver.ap_netif()
        };
        netif
            .get_ip_info()
            .ok()
            .map(|info| info.ip.to_string())
            .filter(|ip| ip != "0.0.0.0")
    }
}

impl Display for SerialDisplay {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn fill_screen(&mut self, color: Rgb565) {
        debug!("fill screen #{}", color.to_hex());
    }

    fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Rgb565) {
        debug!("fill {w}x{h} at ({x},{y}) #{}", color.to_hex());
    }

    fn draw_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Rgb565) {
        debug!("outline {w}x{h} at ({x},{y}) #{}", color.to_hex());
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32, font: Font, color: Rgb565) {
        info!("text {text:?} at ({x},{y}) {font:?} #{}", color.to_hex());
    }
}

impl Clock for EspClock {
    fn now_ms(&self) -> u64 {
        monotonic_ms()
    }

    fn sleep_ms(&mut self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
