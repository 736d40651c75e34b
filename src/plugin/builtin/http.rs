use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::blocking::{Client, Response};

use crate::plugin::{PluginError, Vars};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads the optional `timeout` variable, in seconds.
pub fn timeout_var(vars: &Vars) -> Result<Duration, PluginError> {
    let Some(raw) = vars.get("timeout") else {
        return Ok(DEFAULT_TIMEOUT);
    };
    let seconds: f64 = raw.trim().parse().map_err(|_| PluginError::InvalidVar {
        name: "timeout".to_string(),
        reason: format!("'{raw}' is not a number of seconds"),
    })?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(PluginError::InvalidVar {
            name: "timeout".to_string(),
            reason: format!("'{raw}' must be a positive number of seconds"),
        });
    }
    Ok(Duration::from_secs_f64(seconds))
}

/// Blocking client built on first use, so that channels can be
/// constructed inside the async runtime and only used from the
/// dispatch thread.
#[derive(Debug)]
pub struct LazyClient {
    timeout: Duration,
    client: OnceCell<Client>,
}

impl LazyClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            client: OnceCell::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn get(&self) -> Result<&Client, PluginError> {
        self.client
            .get_or_try_init(|| Client::builder().timeout(self.timeout).build())
            .map_err(PluginError::from)
    }
}

/// Turns a non-2xx answer into a delivery error carrying the response body.
pub fn check_status(service: &str, response: Response) -> Result<(), PluginError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().unwrap_or_default();
    Err(PluginError::Delivery(format!("{service} answered {status}: {body}")))
}
