use cheapdeck_common::{
    api::{ApiRequest, ApiResponse, Method},
    display::RecordingDisplay,
    provisioning::{Credentials, ManualClock, SimulatedWifi},
    ButtonGrid, Deck, DeckConfig, KvStore, MemoryStore, Mode, PowerRequest, RawTouch,
    SettingsView,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

type TestDeck = Deck<MemoryStore, RecordingDisplay, SimulatedWifi, ManualClock>;

fn config() -> DeckConfig {
    DeckConfig {
        deep_sleep_supported: false,
        ..DeckConfig::default()
    }
}

fn online_deck() -> TestDeck {
    let mut deck = Deck::new(
        config(),
        MemoryStore::new(),
        RecordingDisplay::new(320, 240),
        SimulatedWifi::with_networks([("home", "secret")], "192.168.4.1"),
        ManualClock::new(0),
        Some(Credentials::new("home", "secret")),
    );
    deck.start();
    deck
}

fn get(deck: &mut TestDeck, path: &str) -> ApiResponse {
    deck.serve(ApiRequest::get(path))
}

fn post(deck: &mut TestDeck, path: &str, body: &str) -> ApiResponse {
    deck.serve(ApiRequest::post(path, Some("application/json"), body.as_bytes()))
}

fn get_json(deck: &mut TestDeck, path: &str) -> Value {
    let response = get(deck, path);
    assert_eq!(response.status, 200, "{path}: {}", response.body);
    serde_json::from_str(&response.body).unwrap()
}

fn touch_button(deck: &mut TestDeck, index: usize) -> Option<PowerRequest> {
    let button = deck.grid().active()[index].clone();
    deck.console(&format!("TAP {} {}", button.x + 1, button.y + 1));
    deck.tick(None)
}

#[test]
fn label_update_leaves_state_and_settings_alone() {
    let mut deck = online_deck();
    touch_button(&mut deck, 1);
    let state_before = get_json(&mut deck, "/state");
    let settings_before = get_json(&mut deck, "/settings");

    let response = post(&mut deck, "/config", r#"{"1":"Lights"}"#);

    assert_eq!(response, ApiResponse::ok());
    assert_eq!(get_json(&mut deck, "/state"), state_before);
    assert_eq!(get_json(&mut deck, "/settings"), settings_before);
    assert_eq!(deck.grid().active()[0].label, "Lights");
}

#[test]
fn layout_switch_changes_reported_button_count() {
    let mut deck = online_deck();
    assert_eq!(get_json(&mut deck, "/state").as_object().unwrap().len(), 4);

    assert_eq!(post(&mut deck, "/settings", r#"{"layout":1}"#).status, 200);

    let state = get_json(&mut deck, "/state");
    assert_eq!(
        state,
        json!({"1": false, "2": false, "3": false, "4": false, "5": false, "6": false})
    );
    assert_eq!(deck.display().texts().last(), Some(&"6"));
}

#[test]
fn settings_round_trip_is_a_no_op() {
    let mut deck = online_deck();
    post(
        &mut deck,
        "/settings",
        r#"{"timeout":600,"background":"123456","colors":["ff0000","00ff00"]}"#,
    );

    let view = get(&mut deck, "/settings").body;
    deck.display_mut().clear();
    assert_eq!(post(&mut deck, "/settings", &view).status, 200);

    assert!(deck.display().calls().is_empty());
    let reread: SettingsView = serde_json::from_str(&get(&mut deck, "/settings").body).unwrap();
    assert_eq!(reread, serde_json::from_str::<SettingsView>(&view).unwrap());
}

#[test]
fn malformed_settings_change_nothing() {
    let mut deck = online_deck();
    let before = get_json(&mut deck, "/settings");

    let response = post(&mut deck, "/settings", r#"{"timeout":30,"layout":7}"#);
    assert_eq!(response.status, 400);
    assert_eq!(response.body, "Invalid fields: layout: expected 0 or 1");

    assert_eq!(post(&mut deck, "/settings", "{not json").body, "Invalid JSON");
    assert_eq!(post(&mut deck, "/settings", "").body, "Missing body");
    assert_eq!(get_json(&mut deck, "/settings"), before);
}

#[test]
fn unknown_settings_keys_are_ignored() {
    let mut deck = online_deck();

    let response = post(&mut deck, "/settings", r#"{"brightness":9,"info_timeout":30}"#);

    assert_eq!(response.status, 200);
    assert_eq!(get_json(&mut deck, "/settings")["info_timeout"], json!(30));
}

#[test]
fn idle_then_touch_cycles_through_info_mode() {
    let mut deck = online_deck();
    post(
        &mut deck,
        "/system-info",
        r#"{"time":"09:15:00","date":"Tue 02 Jan","cpu":4.2,"ram":51}"#,
    );

    deck.clock_mut().advance(120_001);
    deck.display_mut().clear();
    deck.tick(None);
    assert_eq!(deck.mode(), Mode::InfoDisplay);
    assert_eq!(
        deck.display().texts(),
        vec!["Tue 02 Jan", "09:15:00", "CPU: 4.2%", "RAM: 51.0%"]
    );

    // API traffic does not count as interaction
    post(&mut deck, "/config", r#"{"2":"Mute"}"#);
    assert_eq!(deck.mode(), Mode::InfoDisplay);

    deck.clock_mut().advance(5_000);
    let touched = deck.tick(Some(RawTouch {
        x: 2_000,
        y: 2_000,
        pressure: 100,
    }));
    assert_eq!(touched, None);
    assert_eq!(deck.mode(), Mode::Buttons);
    assert!(deck.grid().state_map().values().all(|on| !on));
    assert_eq!(deck.display().texts()[4..], ["1", "Mute", "3", "4"]);
}

#[test]
fn screensaver_blanks_and_wakes_on_touch() {
    let mut deck = online_deck();
    post(&mut deck, "/settings", r#"{"info_enabled":false,"timeout":60}"#);

    deck.clock_mut().advance(60_001);
    assert_eq!(deck.tick(None), None);
    assert_eq!(deck.mode(), Mode::Screensaver);

    deck.clock_mut().advance(1_000);
    deck.console("TAP 0 0");
    deck.tick(None);
    assert_eq!(deck.mode(), Mode::Buttons);
}

#[test]
fn toggles_are_debounced_and_persisted() {
    let mut deck = online_deck();

    touch_button(&mut deck, 0);
    deck.clock_mut().advance(200);
    touch_button(&mut deck, 0);
    assert_eq!(get_json(&mut deck, "/state")["1"], json!(true));

    deck.clock_mut().advance(301);
    touch_button(&mut deck, 0);
    assert_eq!(get_json(&mut deck, "/state")["1"], json!(false));

    deck.clock_mut().advance(400);
    touch_button(&mut deck, 2);
    let mut reloaded = ButtonGrid::new(300, 32);
    reloaded.load(deck.store());
    assert!(reloaded.button(2).is_some_and(|button| button.on));
}

#[test]
fn unreachable_credentials_keep_access_point_and_stored_credentials() {
    let mut store = MemoryStore::new();
    Credentials::new("home", "old-password").save(&mut store).unwrap();
    let mut deck = Deck::new(
        config(),
        store,
        RecordingDisplay::new(320, 240),
        SimulatedWifi::with_networks([("home", "new-password")], "192.168.4.1"),
        ManualClock::new(0),
        None,
    );
    assert!(deck.start().is_fallback());
    assert_eq!(deck.mode(), Mode::Provisioning);
    assert!(get(&mut deck, "/").body.contains("<form"));

    let response = deck.serve(ApiRequest::post(
        "/save-credentials",
        Some("application/x-www-form-urlencoded"),
        b"ssid=cafe&password=latte",
    ));

    assert_eq!(response.status, 500);
    assert_eq!(response.body, "Failed to connect with provided credentials");
    assert_eq!(deck.wifi().access_point(), Some("CheapDeck-Setup"));
    assert_eq!(
        Credentials::load(deck.store()),
        Some(Credentials::new("home", "old-password"))
    );
    assert_eq!(deck.take_power_request(), None);
    assert_eq!(
        deck.display().texts().last(),
        Some(&"Open http://192.168.4.1/")
    );
}

#[test]
fn good_credentials_are_stored_and_trigger_restart() {
    let mut deck = Deck::new(
        config(),
        MemoryStore::new(),
        RecordingDisplay::new(320, 240),
        SimulatedWifi::with_networks([("home", "secret")], "192.168.4.1"),
        ManualClock::new(0),
        None,
    );
    deck.start();

    let response = post(
        &mut deck,
        "/save-credentials",
        r#"{"ssid":"home","password":"secret"}"#,
    );

    assert_eq!(response, ApiResponse::ok());
    assert_eq!(deck.take_power_request(), Some(PowerRequest::Restart));
    assert_eq!(
        deck.store().get_str("settings", "wifi_ssid").unwrap().as_deref(),
        Some("home")
    );
}

#[test]
fn missing_ssid_is_a_bad_request() {
    let mut deck = online_deck();

    let response = post(&mut deck, "/save-credentials", r#"{"password":"x"}"#);

    assert_eq!(response.status, 400);
    assert_eq!(response.body, "Missing ssid");
    assert_eq!(deck.wifi().join_calls(), 1);
}

#[test]
fn forget_command_forces_provisioning() {
    let mut deck = online_deck();

    deck.console("CLEAR_WIFI");

    assert_eq!(deck.mode(), Mode::Provisioning);
    assert!(deck.network_status().is_fallback());
    assert!(get(&mut deck, "/").body.contains("CheapDeck-Setup"));
    let unknown = deck.console("hello");
    assert_eq!(unknown.as_deref(), Some("Unknown command: HELLO"));
}

#[test]
fn persisted_state_survives_reboot() {
    let mut deck = online_deck();
    post(&mut deck, "/settings", r#"{"layout":1,"active":"ff8800"}"#);
    post(&mut deck, "/config", r#"{"6":"Stream"}"#);
    touch_button(&mut deck, 5);
    let store = deck.store().clone();

    let mut rebooted = Deck::new(
        config(),
        store,
        RecordingDisplay::new(320, 240),
        SimulatedWifi::with_networks([("home", "secret")], "192.168.4.1"),
        ManualClock::new(0),
        Some(Credentials::new("home", "secret")),
    );
    rebooted.start();

    assert_eq!(
        get_json(&mut rebooted, "/settings"),
        get_json(&mut deck, "/settings")
    );
    assert_eq!(get_json(&mut rebooted, "/state")["6"], json!(true));
    assert_eq!(rebooted.grid().active()[5].label, "Stream");
}

#[test]
fn responses_carry_cors_and_unknown_routes_404() {
    let mut deck = online_deck();

    assert!(get(&mut deck, "/state").cors);
    assert!(get(&mut deck, "/").cors);
    assert_eq!(get(&mut deck, "/").body, "cheap deck api");
    assert_eq!(get(&mut deck, "/nope").status, 404);
    assert_eq!(post(&mut deck, "/state", "{}").status, 405);
    let preflight = deck.serve(ApiRequest {
        method: Method::Options,
        path: "/settings",
        content_type: None,
        body: &[],
    });
    assert_eq!(preflight.status, 204);
}

#[test]
fn zero_timeout_cannot_put_the_device_to_sleep_on_boot() {
    let sleeping_config = DeckConfig {
        deep_sleep_supported: true,
        ..DeckConfig::default()
    };
    let mut deck = Deck::new(
        sleeping_config.clone(),
        MemoryStore::new(),
        RecordingDisplay::new(320, 240),
        SimulatedWifi::with_networks([("home", "secret")], "192.168.4.1"),
        ManualClock::new(0),
        Some(Credentials::new("home", "secret")),
    );
    deck.start();

    let response = post(&mut deck, "/settings", r#"{"timeout":0}"#);
    assert_eq!(response.status, 400);
    assert_eq!(get_json(&mut deck, "/settings")["timeout"], json!(900));

    let mut rebooted = Deck::new(
        sleeping_config,
        deck.store().clone(),
        RecordingDisplay::new(320, 240),
        SimulatedWifi::with_networks([("home", "secret")], "192.168.4.1"),
        ManualClock::new(0),
        Some(Credentials::new("home", "secret")),
    );
    rebooted.start();
    rebooted.clock_mut().advance(50);

    assert_eq!(rebooted.tick(None), None);
    assert_eq!(rebooted.mode(), Mode::Buttons);
}
