use crate::error::*;
use serde::Deserialize;
use std::time::Duration;

/// Broker handing out Google Trust Services EAB credentials on demand.
pub const DEFAULT_EAB_BROKER_URL: &str = "https://gts.rat.dev/eab";

/// The Google Trust Services environment a session talks to.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
  #[default]
  #[serde(alias = "")]
  Live,
  Staging,
}

impl Mode {
  /// The origin all ACME resources of this environment live under.
  pub fn origin(&self) -> &'static str {
    match self {
      Mode::Live => "https://dv.acme-v02.api.pki.goog",
      Mode::Staging => "https://dv.acme-v02.test-api.pki.goog",
    }
  }

  /// The ACME directory URL of this environment.
  pub fn directory_url(&self) -> String {
    format!("{}/directory", self.origin())
  }
}

/// Where External Account Binding credentials come from.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EabMode {
  /// Fetch a fresh key pair from the EAB broker.
  Auto,
  /// Use `eab_key_id` / `eab_key` from the configuration.
  #[default]
  Manual,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PollConfig {
  /// Delay between two status polls, in seconds.
  pub interval_secs: u64,
  /// Number of polls before giving up with
  /// [`Error::MaxAttemptsExceeded`].
  pub attempts: usize,
}

impl Default for PollConfig {
  fn default() -> Self {
    PollConfig {
      interval_secs: 5,
      attempts: 12,
    }
  }
}

impl PollConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs)
  }
}

/// Configuration of one issuance session.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
  pub mode: Mode,
  /// Route HTTP traffic through a proxy.
  pub proxy_enabled: bool,
  /// The proxy to use when `proxy_enabled` is set. Falls back to the
  /// environment's proxy settings when empty.
  pub proxy_url: Option<String>,
  /// Contact address registered with the account.
  pub email: String,
  pub eab_mode: EabMode,
  pub eab_key_id: Option<String>,
  /// Base64url encoded MAC key.
  pub eab_key: Option<String>,
  /// Prepend a CAA record authorizing pki.goog to every zone's DNS
  /// instructions.
  pub emit_caa_records: bool,
  pub eab_broker_url: String,
  pub poll: PollConfig,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      mode: Mode::default(),
      proxy_enabled: false,
      proxy_url: None,
      email: String::new(),
      eab_mode: EabMode::default(),
      eab_key_id: None,
      eab_key: None,
      emit_caa_records: false,
      eab_broker_url: DEFAULT_EAB_BROKER_URL.to_string(),
      poll: PollConfig::default(),
    }
  }
}

impl Config {
  /// A [`reqwest::ClientBuilder`] with the proxy policy of this
  /// configuration applied.
  pub fn http_client_builder(&self) -> Result<reqwest::ClientBuilder, Error> {
    let builder = reqwest::Client::builder();
    if !self.proxy_enabled {
      return Ok(builder.no_proxy());
    }
    match self.proxy_url.as_deref().map(str::trim) {
      Some(url) if !url.is_empty() => {
        let proxy = reqwest::Proxy::all(url.trim_end_matches('/'))?;
        Ok(builder.proxy(proxy))
      }
      _ => Ok(builder),
    }
  }
}
