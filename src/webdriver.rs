//! Minimal W3C WebDriver client for driving a headless Chrome session.
//!
//! Only the handful of commands the patent portal needs are implemented:
//! navigation, XPath element lookup, text, attributes and clicks.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::KiraError;
use crate::http;

/// Key under which W3C WebDriver returns element references.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const CHROME_ARGS: &[&str] = &[
    "--headless",
    "--window-size=1920,1080",
    "--disable-notifications",
    "--no-sandbox",
    "--disable-gpu",
    "--disable-software-rasterizer",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(String);

impl ElementRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A rendering session that can locate elements by XPath.
pub trait Browser {
    fn goto(&self, url: &str) -> Result<(), KiraError>;
    /// `Ok(None)` when nothing matches `xpath`.
    fn find(&self, xpath: &str) -> Result<Option<ElementRef>, KiraError>;
    fn text(&self, element: &ElementRef) -> Result<String, KiraError>;
    fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>, KiraError>;
    fn click(&self, element: &ElementRef) -> Result<(), KiraError>;
    /// Ends the session; later calls fail.
    fn close(&self) -> Result<(), KiraError> {
        Ok(())
    }
}

pub struct WebDriverSession {
    client: Client,
    base_url: String,
    session_id: String,
    _driver: Option<DriverProcess>,
}

impl WebDriverSession {
    /// Opens a headless Chrome session on a running WebDriver server.
    pub fn connect(base_url: &str) -> Result<Self, KiraError> {
        Self::open(base_url, None)
    }

    /// Starts `chromedriver` on `port` and opens a session on it. The driver
    /// process is stopped when the session is dropped.
    pub fn spawn(chromedriver: &Path, port: u16) -> Result<Self, KiraError> {
        let driver = DriverProcess::start(chromedriver, port)?;
        let base_url = format!("http://127.0.0.1:{port}");
        Self::open(&base_url, Some(driver))
    }

    fn open(base_url: &str, driver: Option<DriverProcess>) -> Result<Self, KiraError> {
        let client = build_client()?;
        let base_url = base_url.trim_end_matches('/').to_string();
        if driver.is_some() {
            wait_until_ready(&client, &base_url, Duration::from_secs(20))?;
        }

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": CHROME_ARGS }
                }
            }
        });
        let response = client
            .post(format!("{base_url}/session"))
            .json(&capabilities)
            .send()
            .map_err(|err| KiraError::WebDriverHttp(err.to_string()))?;
        let value = unwrap_value(response)?;
        let session_id = value
            .get("sessionId")
            .and_then(|id| id.as_str())
            .ok_or_else(|| KiraError::WebDriverHttp("new session response has no id".to_string()))?
            .to_string();
        info!(session = %session_id, "opened browser session");

        Ok(Self {
            client,
            base_url,
            session_id,
            _driver: driver,
        })
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    fn get(&self, path: &str) -> Result<Value, KiraError> {
        let response = self
            .client
            .get(self.session_url(path))
            .send()
            .map_err(|err| KiraError::WebDriverHttp(err.to_string()))?;
        unwrap_value(response)
    }

    fn post(&self, path: &str, body: Value) -> Result<Value, KiraError> {
        let response = self
            .client
            .post(self.session_url(path))
            .json(&body)
            .send()
            .map_err(|err| KiraError::WebDriverHttp(err.to_string()))?;
        unwrap_value(response)
    }
}

impl Browser for WebDriverSession {
    fn goto(&self, url: &str) -> Result<(), KiraError> {
        debug!(url, "navigating");
        self.post("/url", json!({ "url": url }))?;
        Ok(())
    }

    fn find(&self, xpath: &str) -> Result<Option<ElementRef>, KiraError> {
        match self.post("/element", json!({ "using": "xpath", "value": xpath })) {
            Ok(value) => value
                .get(ELEMENT_KEY)
                .and_then(|id| id.as_str())
                .map(|id| Some(ElementRef::new(id)))
                .ok_or_else(|| KiraError::WebDriverHttp("element response has no id".to_string())),
            Err(KiraError::WebDriver { error, .. }) if error == "no such element" => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn text(&self, element: &ElementRef) -> Result<String, KiraError> {
        let value = self.get(&format!("/element/{}/text", element.as_str()))?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>, KiraError> {
        let value = self.get(&format!("/element/{}/attribute/{name}", element.as_str()))?;
        Ok(value.as_str().map(|value| value.to_string()))
    }

    fn click(&self, element: &ElementRef) -> Result<(), KiraError> {
        self.post(&format!("/element/{}/click", element.as_str()), json!({}))?;
        Ok(())
    }

    fn close(&self) -> Result<(), KiraError> {
        let response = self
            .client
            .delete(self.session_url(""))
            .send()
            .map_err(|err| KiraError::WebDriverHttp(err.to_string()))?;
        unwrap_value(response)?;
        debug!(session = %self.session_id, "closed browser session");
        Ok(())
    }
}

/// A `chromedriver` child process, killed on drop.
struct DriverProcess {
    child: Child,
}

impl DriverProcess {
    fn start(program: &Path, port: u16) -> Result<Self, KiraError> {
        let child = Command::new(program)
            .arg(format!("--port={port}"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| KiraError::MissingTool(format!("{}: {err}", program.display())))?;
        info!(program = %program.display(), port, "started chromedriver");
        Ok(Self { child })
    }
}

impl Drop for DriverProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Looks for `chromedriver` on `PATH`.
pub fn find_chromedriver() -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join("chromedriver.exe");
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join("chromedriver");
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

fn build_client() -> Result<Client, KiraError> {
    let headers = http::default_headers(KiraError::WebDriverHttp)?;
    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|err| KiraError::WebDriverHttp(err.to_string()))
}

fn wait_until_ready(client: &Client, base_url: &str, limit: Duration) -> Result<(), KiraError> {
    let started = Instant::now();
    loop {
        let ready = client
            .get(format!("{base_url}/status"))
            .send()
            .ok()
            .and_then(|response| response.json::<Value>().ok())
            .and_then(|body| body.pointer("/value/ready").and_then(|ready| ready.as_bool()))
            .unwrap_or(false);
        if ready {
            return Ok(());
        }
        if started.elapsed() > limit {
            return Err(KiraError::WebDriverHttp(format!(
                "webdriver at {base_url} did not become ready"
            )));
        }
        thread::sleep(Duration::from_millis(250));
    }
}

fn unwrap_value(response: reqwest::blocking::Response) -> Result<Value, KiraError> {
    let status = response.status();
    let body: Value = response
        .json()
        .map_err(|err| KiraError::WebDriverHttp(err.to_string()))?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(value);
    }
    Err(webdriver_error(&value, status.as_u16()))
}

fn webdriver_error(value: &Value, status: u16) -> KiraError {
    let error = value
        .get("error")
        .and_then(|error| error.as_str())
        .map(|error| error.to_string())
        .unwrap_or_else(|| format!("status {status}"));
    let message = value
        .get("message")
        .and_then(|message| message.as_str())
        .unwrap_or_default()
        .to_string();
    KiraError::WebDriver { error, message }
}
