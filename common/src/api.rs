use log::{info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::{
    deck::Deck,
    display::Display,
    error::{FieldError, ProvisioningError, RequestError},
    mode::Mode,
    provisioning::{Clock, Credentials, WifiLink},
    settings::SettingsPatch,
    storage::KvStore,
    system_info::SystemInfoPatch,
};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";
pub const CONTENT_TYPE_HTML: &str = "text/html";
pub const API_BANNER: &str = "cheap deck api";

pub const ROUTES: &[(Method, &str)] = &[
    (Method::Get, "/"),
    (Method::Get, "/state"),
    (Method::Post, "/config"),
    (Method::Get, "/settings"),
    (Method::Post, "/settings"),
    (Method::Post, "/system-info"),
    (Method::Post, "/save-credentials"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Options,
}

#[derive(Debug, Clone, Copy)]
pub struct ApiRequest<'a> {
    pub method: Method,
    pub path: &'a str,
    pub content_type: Option<&'a str>,
    pub body: &'a [u8],
}

impl<'a> ApiRequest<'a> {
    pub fn get(path: &'a str) -> Self {
        Self {
            method: Method::Get,
            path,
            content_type: None,
            body: &[],
        }
    }

    pub fn post(path: &'a str, content_type: Option<&'a str>, body: &'a [u8]) -> Self {
        Self {
            method: Method::Post,
            path,
            content_type,
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    pub cors: bool,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self::text(200, "OK")
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: CONTENT_TYPE_TEXT,
            body: body.into(),
            cors: false,
        }
    }

    pub fn json<T: Serialize>(payload: &T) -> Self {
        match serde_json::to_string(payload) {
            Ok(body) => Self {
                status: 200,
                content_type: CONTENT_TYPE_JSON,
                body,
                cors: true,
            },
            Err(err) => Self::text(500, format!("Failed to encode response: {err}")),
        }
    }

    fn with_cors(mut self) -> Self {
        self.cors = true;
        self
    }

    pub fn headers(&self) -> Vec<(&'static str, &'static str)> {
        let mut headers = vec![("Content-Type", self.content_type)];
        if self.cors {
            headers.push(("Access-Control-Allow-Origin", "*"));
        }
        headers
    }
}

impl From<RequestError> for ApiResponse {
    fn from(err: RequestError) -> Self {
        warn!("rejected request: {err}");
        Self::text(400, err.to_string())
    }
}

impl<S, D, W, C> Deck<S, D, W, C>
where
    S: KvStore,
    D: Display,
    W: WifiLink,
    C: Clock,
{
    pub fn serve(&mut self, request: ApiRequest<'_>) -> ApiResponse {
        let path = request.path.split('?').next().unwrap_or_default();
        match (request.method, path) {
            (Method::Options, _) => ApiResponse {
                status: 204,
                content_type: CONTENT_TYPE_TEXT,
                body: String::new(),
                cors: true,
            },
            (Method::Get, "/") => self.get_root(),
            (Method::Get, "/state") => self.get_state(),
            (Method::Post, "/config") => self.post_config(request.body),
            (Method::Get, "/settings") => self.get_settings(),
            (Method::Post, "/settings") => self.post_settings(request.body),
            (Method::Post, "/system-info") => self.post_system_info(request.body),
            (Method::Post, "/save-credentials") => {
                self.post_save_credentials(request.content_type, request.body)
            }
            (_, path) if ROUTES.iter().any(|(_, known)| *known == path) => {
                ApiResponse::text(405, "Method not allowed")
            }
            _ => ApiResponse::text(404, "Not found"),
        }
    }

    fn get_root(&self) -> ApiResponse {
        if self.mode() == Mode::Provisioning {
            return ApiResponse {
                status: 200,
                content_type: CONTENT_TYPE_HTML,
                body: provisioning_page(&self.config().access_point_ssid),
                cors: true,
            };
        }
        ApiResponse::text(200, API_BANNER).with_cors()
    }

    fn get_state(&self) -> ApiResponse {
        ApiResponse::json(&self.grid().state_map())
    }

    fn post_config(&mut self, body: &[u8]) -> ApiResponse {
        let labels = match parse_labels(body, self.grid().count()) {
            Ok(labels) => labels,
            Err(err) => return err.into(),
        };
        match self.apply_labels(&labels) {
            Ok(_) => ApiResponse::ok(),
            Err(err) => {
                warn!("labels applied but not saved: {err}");
                ApiResponse::text(500, "Failed to save labels")
            }
        }
    }

    fn get_settings(&self) -> ApiResponse {
        ApiResponse::json(&self.settings_view())
    }

    fn post_settings(&mut self, body: &[u8]) -> ApiResponse {
        let patch = match SettingsPatch::from_json(body) {
            Ok(patch) => patch,
            Err(err) => return err.into(),
        };
        match self.apply_settings(&patch) {
            Ok(_) => ApiResponse::ok(),
            Err(err) => {
                warn!("settings applied but not saved: {err}");
                ApiResponse::text(500, "Failed to save settings")
            }
        }
    }

    fn post_system_info(&mut self, body: &[u8]) -> ApiResponse {
        match SystemInfoPatch::from_json(body) {
            Ok(patch) => {
                self.push_system_info(patch);
                ApiResponse::ok()
            }
            Err(err) => err.into(),
        }
    }

    fn post_save_credentials(&mut self, content_type: Option<&str>, body: &[u8]) -> ApiResponse {
        let Some(credentials) = parse_credentials(content_type, body) else {
            return ApiResponse::text(400, "Missing ssid");
        };
        info!("credentials submitted for `{}`", credentials.ssid);
        match self.submit_credentials(credentials) {
            Ok(()) => ApiResponse::ok(),
            Err(ProvisioningError::Join(_)) => {
                ApiResponse::text(500, "Failed to connect with provided credentials")
            }
            Err(ProvisioningError::Persist(_)) => {
                ApiResponse::text(500, "Connected, but failed to save credentials")
            }
        }
    }
}

pub fn parse_labels(body: &[u8], button_count: usize) -> Result<Vec<(usize, String)>, RequestError> {
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

    let mut labels = Vec::new();
    let mut errors = Vec::new();
    for (key, value) in &fields {
        let Some(index) = key
            .parse::<usize>()
            .ok()
            .filter(|number| (1..=button_count).contains(number))
            .map(|number| number - 1)
        else {
            continue;
        };
        match value {
            Value::String(text) => labels.push((index, text.clone())),
            Value::Number(number) => labels.push((index, number.to_string())),
            Value::Bool(flag) => labels.push((index, flag.to_string())),
            _ => errors.push(FieldError::new(key.as_str(), "expected a string label")),
        }
    }

    if errors.is_empty() {
        Ok(labels)
    } else {
        Err(RequestError::InvalidFields(errors))
    }
}

/// JSON `{ssid, password}` first, then `ssid=..&password=..` form fields.
/// `None` when no non-empty SSID was supplied.
pub fn parse_credentials(content_type: Option<&str>, body: &[u8]) -> Option<Credentials> {
    let is_form = content_type
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

    let from_json = if is_form {
        None
    } else {
        serde_json::from_slice::<Value>(body).ok().and_then(|value| {
            let ssid = value.get("ssid")?.as_str()?.to_string();
            let password = value
                .get("password")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Some(Credentials { ssid, password })
        })
    };

    let credentials = from_json.or_else(|| {
        let text = std::str::from_utf8(body).ok()?;
        let ssid = form_param(text, "ssid")?;
        let password = form_param(text, "password").unwrap_or_default();
        Some(Credentials { ssid, password })
    })?;

    if credentials.ssid.is_empty() {
        None
    } else {
        Some(credentials)
    }
}

fn form_param(form: &str, key: &str) -> Option<String> {
    form.trim()
        .split('&')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(name) == key).then(|| percent_decode(value))
        })
        .next()
}

fn percent_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(high), Some(low)) => {
                        out.push(high << 4 | low);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            byte => out.push(byte),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    char::from(byte).to_digit(16).map(|digit| digit as u8)
}

fn provisioning_page(access_point_ssid: &str) -> String {
    format!(
        "<!doctype html><html><head><meta charset='utf-8'><title>CheapDeck Setup</title></head><body>\
         <h2>CheapDeck Wi-Fi Setup</h2>\
         <p>Connected to <strong>{access_point_ssid}</strong>. Enter the network this deck should join.</p>\
         <form method='POST' action='/save-credentials'>\
         SSID:<br><input name='ssid' /><br>\
         Password:<br><input name='password' type='password' /><br><br>\
         <input type='submit' value='Save and Connect' />\
         </form>\
         <p>JSON clients can POST {{\"ssid\":\"...\",\"password\":\"...\"}} to /save-credentials.</p>\
         </body></html>"
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn labels_skip_unknown_keys_and_stringify_scalars() {
        let labels = parse_labels(br#"{"1":"Lights","3":7,"4":true,"9":"x","name":"y"}"#, 4)
            .unwrap();

        assert_eq!(
            labels,
            vec![
                (0, "Lights".to_string()),
                (2, "7".to_string()),
                (3, "true".to_string()),
            ]
        );
    }

    #[test]
    fn labels_reject_whole_body_on_bad_value() {
        let err = parse_labels(br#"{"1":"ok","2":{"nested":1}}"#, 4).unwrap_err();
        assert_eq!(err.to_string(), "Invalid fields: 2: expected a string label");
        assert!(matches!(parse_labels(b"", 4), Err(RequestError::MissingBody)));
        assert!(matches!(parse_labels(b"{", 4), Err(RequestError::InvalidJson(_))));
    }

    #[test]
    fn credentials_from_json_or_form() {
        assert_eq!(
            parse_credentials(Some("application/json"), br#"{"ssid":"home","password":"pw"}"#),
            Some(Credentials::new("home", "pw"))
        );
        assert_eq!(
            parse_credentials(
                Some("application/x-www-form-urlencoded"),
                b"ssid=My+Home%21&password=p%26w"
            ),
            Some(Credentials::new("My Home!", "p&w"))
        );
        assert_eq!(
            parse_credentials(None, b"ssid=open"),
            Some(Credentials::new("open", ""))
        );
    }

    #[test]
    fn credentials_require_ssid() {
        assert_eq!(parse_credentials(None, br#"{"password":"pw"}"#), None);
        assert_eq!(parse_credentials(None, b"ssid=&password=pw"), None);
        assert_eq!(parse_credentials(None, b""), None);
    }

    #[test]
    fn percent_decoding_keeps_malformed_escapes() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("a%20b"), "a b");
    }

    #[test]
    fn cors_header_only_when_flagged() {
        let response = ApiResponse::json(&serde_json::json!({"1": true}));
        assert_eq!(
            response.headers(),
            vec![
                ("Content-Type", CONTENT_TYPE_JSON),
                ("Access-Control-Allow-Origin", "*"),
            ]
        );
        assert_eq!(ApiResponse::ok().headers().len(), 1);
    }
}
