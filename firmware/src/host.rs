use std::{
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method as HttpMethod, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
    sync::{Mutex, Notify},
};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use cheapdeck_common::{
    api::{ApiRequest, ApiResponse, Method},
    error::StorageError,
    provisioning::{Clock, Credentials, SimulatedWifi},
    Deck, DeckConfig, Display, Font, KvStore, MemoryStore, PowerRequest, Rgb565,
};

const TICK_INTERVAL_MS: u64 = 50;

type HostDeck = Deck<FileStore, TracingDisplay, SimulatedWifi, SystemClock>;

#[derive(Clone)]
struct AppState {
    deck: Arc<Mutex<HostDeck>>,
    shutdown: Arc<Notify>,
}

struct FileStore {
    path: PathBuf,
    values: MemoryStore,
}

struct TracingDisplay {
    width: i32,
    height: i32,
}

struct SystemClock;

fn host_config(display_width: i32, display_height: i32) -> DeckConfig {
    let mut config = DeckConfig {
        display_width,
        display_height,
        deep_sleep_supported: false,
        ..DeckConfig::default()
    };
    config.sanitize();
    config
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = host_config(
        env_parse("DECK_DISPLAY_WIDTH").unwrap_or(320),
        env_parse("DECK_DISPLAY_HEIGHT").unwrap_or(240),
    );

    let data_dir = std::env::var("DECK_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.cheapdeck"));
    let store = FileStore::open(data_dir.join("nvs.json"));

    let wifi = match std::env::var("DECK_SIM_NETWORKS") {
        Ok(list) => {
            let networks = SimulatedWifi::parse_networks(&list);
            info!("simulated radio knows {} network(s)", networks.len());
            SimulatedWifi::with_networks(networks, config.access_point_address.clone())
        }
        Err(_) => SimulatedWifi::accept_any(config.access_point_address.clone()),
    };

    let default_credentials = std::env::var("WIFI_SSID")
        .ok()
        .map(|ssid| Credentials::new(ssid, std::env::var("WIFI_PASS").unwrap_or_default()));

    let display = TracingDisplay {
        width: config.display_width,
        height: config.display_height,
    };
    let deck = Deck::new(config, store, display, wifi, SystemClock, default_credentials);
    let deck = Arc::new(Mutex::new(deck));

    let boot = Arc::clone(&deck);
    let status = tokio::task::spawn_blocking(move || boot.blocking_lock().start())
        .await
        .context("deck startup task failed")?;
    info!("network status after boot: {status:?}");

    let app_state = AppState {
        deck,
        shutdown: Arc::new(Notify::new()),
    };

    spawn_tick_loop(app_state.clone());
    spawn_console(app_state.clone());

    let app = Router::new()
        .route("/", any(handle_request))
        .route("/state", any(handle_request))
        .route("/config", any(handle_request))
        .route("/settings", any(handle_request))
        .route("/system-info", any(handle_request))
        .route("/save-credentials", any(handle_request))
        .fallback(handle_request)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state.clone());

    let port = env_parse::<u16>("DECK_HTTP_PORT").unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind deck server at {addr}"))?;

    info!("deck listening on http://{addr}");
    let shutdown = Arc::clone(&app_state.shutdown);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown.notified() => {}
                result = tokio::signal::ctrl_c() => {
                    if let Err(err) = result {
                        warn!("ctrl-c handler failed: {err}");
                    }
                }
            }
        })
        .await?;
    info!("deck stopped");
    Ok(())
}

fn spawn_tick_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_INTERVAL_MS));
        loop {
            interval.tick().await;
            let power = { app_state.deck.lock().await.tick(None) };

            match power {
                None => {}
                Some(PowerRequest::DeepSleep) => {
                    info!("deep sleep requested; stopping simulator");
                    app_state.shutdown.notify_one();
                    break;
                }
                Some(PowerRequest::Restart) => {
                    info!("restart requested; stopping simulator so it can be relaunched");
                    app_state.shutdown.notify_one();
                    break;
                }
            }
        }
    });
}

fn spawn_console(app_state: AppState) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let reply = { app_state.deck.lock().await.console(&line) };
                    if let Some(reply) = reply {
                        println!("{reply}");
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("console read failed: {err}");
                    break;
                }
            }
        }
        debug!("console closed");
    });
}

async fn handle_request(
    State(state): State<AppState>,
    method: HttpMethod,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let method = match method {
        HttpMethod::GET => Method::Get,
        HttpMethod::POST => Method::Post,
        HttpMethod::OPTIONS => Method::Options,
        _ => return (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response(),
    };
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let path = uri.path().to_string();

    // Credential submission sleeps between join attempts.
    let served = tokio::task::spawn_blocking(move || {
        let mut deck = state.deck.blocking_lock();
        deck.serve(ApiRequest {
            method,
            path: &path,
            content_type: content_type.as_deref(),
            body: &body,
        })
    })
    .await;

    match served {
        Ok(response) => into_http(response),
        Err(err) => {
            error!("request task failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}

fn into_http(response: ApiResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut http = (status, response.body).into_response();
    let headers = http.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(response.content_type),
    );
    if response.cors {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
    }
    http
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

impl FileStore {
    fn open(path: PathBuf) -> Self {
        let values = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|err| {
                warn!("ignoring unreadable store {}: {err}", path.display());
                MemoryStore::new()
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => MemoryStore::new(),
            Err(err) => {
                warn!("failed to read store {}: {err}", path.display());
                MemoryStore::new()
            }
        };
        Self { path, values }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(&self.values)
            .map_err(|err| StorageError::Backend(err.to_string()))?;
        std::fs::write(&self.path, payload)?;
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get_u8(&self, namespace: &str, key: &str) -> Result<Option<u8>, StorageError> {
        self.values.get_u8(namespace, key)
    }

    fn set_u8(&mut self, namespace: &str, key: &str, value: u8) -> Result<(), StorageError> {
        self.values.set_u8(namespace, key, value)?;
        self.flush()
    }

    fn get_u16(&self, namespace: &str, key: &str) -> Result<Option<u16>, StorageError> {
        self.values.get_u16(namespace, key)
    }

    fn set_u16(&mut self, namespace: &str, key: &str, value: u16) -> Result<(), StorageError> {
        self.values.set_u16(namespace, key, value)?;
        self.flush()
    }

    fn get_u64(&self, namespace: &str, key: &str) -> Result<Option<u64>, StorageError> {
        self.values.get_u64(namespace, key)
    }

    fn set_u64(&mut self, namespace: &str, key: &str, value: u64) -> Result<(), StorageError> {
        self.values.set_u64(namespace, key, value)?;
        self.flush()
    }

    fn get_str(&self, namespace: &str, key: &str) -> Result<Option<String>, StorageError> {
        self.values.get_str(namespace, key)
    }

    fn set_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.set_str(namespace, key, value)?;
        self.flush()
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        let existed = self.values.remove(namespace, key)?;
        if existed {
            self.flush()?;
        }
        Ok(existed)
    }
}

impl Display for TracingDisplay {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn fill_screen(&mut self, color: Rgb565) {
        debug!(target: "display", "fill screen #{}", color.to_hex());
    }

    fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Rgb565) {
        debug!(target: "display", "fill {w}x{h} at ({x},{y}) #{}", color.to_hex());
    }

    fn draw_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Rgb565) {
        debug!(target: "display", "outline {w}x{h} at ({x},{y}) #{}", color.to_hex());
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32, font: Font, color: Rgb565) {
        info!(target: "display", "text {text:?} at ({x},{y}) {font:?} #{}", color.to_hex());
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        monotonic_ms()
    }

    fn sleep_ms(&mut self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
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
