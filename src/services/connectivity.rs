//! Internet reachability checks.
//!
//! While the manager reports a default route, a [`ConnectivityMonitor`]
//! fetches the configured URI every interval and publishes whether the
//! Internet answered as expected. Without a URI, or with checking disabled,
//! the result stays [`Connectivity::Unknown`], which the manager treats as
//! full connectivity.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info};

use crate::{
    config::{ConfigChangeFlags, ConfigError, ConnectivitySettings},
    config_store::{ConfigStore, Subscription},
    services::common::Property,
};

/// Body prefix expected when the configuration names none.
pub const DEFAULT_RESPONSE: &str = "NetworkManager is online";

/// Header a check server may send instead of the expected body.
pub const STATUS_HEADER: &str = "X-NetworkManager-Status";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Outcome of the latest check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// No check ran, or checking is off.
    #[default]
    Unknown,
    /// The server could not be reached or returned an error.
    Limited,
    /// Something answered in place of the server, typically a login page.
    Portal,
    /// The server answered as expected.
    Full,
}

impl Connectivity {
    /// Classify an HTTP answer.
    pub fn from_response(status: u16, status_header: Option<&str>, body: &str, expected: &str) -> Self {
        if status_header == Some("online") {
            return Self::Full;
        }
        match status {
            200 if body.starts_with(expected) => Self::Full,
            200..=399 => Self::Portal,
            _ => Self::Limited,
        }
    }
}

/// Performs one reachability check.
#[async_trait]
pub trait ConnectivityCheck: Send + Sync {
    /// Fetch `settings.uri` and classify the answer.
    async fn check(&self, settings: &ConnectivitySettings) -> Connectivity;
}

/// Checks over HTTP. Redirects are not followed, so a captive portal shows
/// up as a redirect instead of the portal's login page.
pub struct HttpCheck {
    client: reqwest::Client,
}

impl HttpCheck {
    /// Build the HTTP client.
    ///
    /// # Errors
    /// Fails when the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("netcored/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ConnectivityCheck for HttpCheck {
    async fn check(&self, settings: &ConnectivitySettings) -> Connectivity {
        let Some(uri) = settings.uri.as_deref() else {
            return Connectivity::Unknown;
        };
        let expected = settings.response.as_deref().unwrap_or(DEFAULT_RESPONSE);

        let response = match self.client.get(uri).send().await {
            Ok(response) => response,
            Err(err) => {
                info!(uri, error = %err, "Connectivity check failed");
                return Connectivity::Limited;
            }
        };
        let status = response.status().as_u16();
        let header = response
            .headers()
            .get(STATUS_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();

        let result = Connectivity::from_response(status, header.as_deref(), &body, expected);
        if result == Connectivity::Full {
            debug!(uri, "Connectivity check succeeded");
        } else {
            info!(uri, status, ?result, "Connectivity check did not match");
        }
        result
    }
}

/// Runs checks in the background while told the host is online.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    state: Property<Connectivity>,
    online: watch::Sender<bool>,
    _task: Arc<JoinHandle<()>>,
}

impl ConnectivityMonitor {
    /// Start the monitor task. It follows connectivity changes in `config`.
    ///
    /// # Errors
    /// Fails when the configuration broadcast is gone.
    pub async fn spawn(
        config: &ConfigStore,
        check: Arc<dyn ConnectivityCheck>,
    ) -> Result<Self, ConfigError> {
        let changes = config.subscribe(ConfigChangeFlags::CONNECTIVITY).await?;
        let settings = config.get_current().connectivity().clone();
        let state = Property::new(Connectivity::Unknown);
        let (online, online_rx) = watch::channel(false);

        let task = tokio::spawn(run(settings, check, state.clone(), online_rx, changes));

        Ok(Self {
            state,
            online,
            _task: Arc::new(task),
        })
    }

    /// Latest check result.
    pub fn state(&self) -> Property<Connectivity> {
        self.state.clone()
    }

    /// Start checking when `online`, stop otherwise.
    pub fn set_online(&self, online: bool) {
        self.online.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }
}

fn enabled(settings: &ConnectivitySettings) -> bool {
    settings.uri.is_some() && settings.interval > 0
}

async fn run(
    mut settings: ConnectivitySettings,
    check: Arc<dyn ConnectivityCheck>,
    state: Property<Connectivity>,
    mut online: watch::Receiver<bool>,
    mut changes: Subscription,
) {
    loop {
        let running = *online.borrow_and_update() && enabled(&settings);
        if running {
            state.set(check.check(&settings).await);
        } else {
            state.set(Connectivity::Unknown);
        }

        let interval = Duration::from_secs(u64::from(settings.interval));
        let next_check = async {
            if running {
                tokio::time::sleep(interval).await;
            } else {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            () = next_check => {}
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            change = changes.recv() => match change {
                Some(change) => {
                    settings = change.new.connectivity().clone();
                    debug!(uri = ?settings.uri, interval = settings.interval, "Connectivity settings changed");
                }
                None => break,
            },
        }
    }
}
