//! External Account Binding credential resolution.

use crate::config::Config;
use crate::error::*;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use tracing::instrument;
use tracing::Level;

const BROKER_TIMEOUT: Duration = Duration::from_secs(10);

/// A key id and MAC key pair the CA accepts for External Account Binding.
#[derive(Clone, PartialEq, Eq)]
pub struct EabCredential {
  pub key_id: String,
  /// Base64url encoded MAC key.
  pub mac_key: String,
}

impl std::fmt::Debug for EabCredential {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("EabCredential")
      .field("key_id", &self.key_id)
      .field("mac_key", &"<redacted>")
      .finish()
  }
}

/// Fetches EAB credentials from a broker endpoint.
#[derive(Debug, Clone)]
pub struct EabResolver {
  url: String,
  http_client: reqwest::Client,
}

impl EabResolver {
  /// A resolver for the broker configured in `config`, honouring its proxy
  /// settings.
  pub fn new(config: &Config) -> Result<Self, Error> {
    let http_client = config
      .http_client_builder()?
      .timeout(BROKER_TIMEOUT)
      .build()?;
    Ok(EabResolver {
      url: config.eab_broker_url.clone(),
      http_client,
    })
  }

  /// Request a fresh credential pair from the broker.
  #[instrument(level = Level::INFO, name = "gts_acme::EabResolver::fetch", err, skip(self), fields(url = %self.url))]
  pub async fn fetch(&self) -> Result<EabCredential, Error> {
    let resp =
      self.http_client.get(&self.url).send().await.map_err(|e| {
        Error::EabResolution(format!("broker request failed: {}", e))
      })?;
    let status = resp.status();
    let body = resp.text().await.map_err(|e| {
      Error::EabResolution(format!("failed to read broker response: {}", e))
    })?;
    debug!({ %status }, "EAB broker responded.");
    parse_envelope(&body)
  }
}

/// Parse the broker's `{"msg": .., "data": {"key_id": .., "mac_key": ..}}`
/// envelope.
pub fn parse_envelope(body: &str) -> Result<EabCredential, Error> {
  let unparseable = || {
    Error::EabResolution(format!("unable to parse broker response: {}", body))
  };

  let envelope: Value = serde_json::from_str(body).map_err(|_| unparseable())?;
  let msg = match envelope.get("msg") {
    None | Some(Value::Null) => return Err(unparseable()),
    Some(Value::String(msg)) => msg.clone(),
    Some(other) => other.to_string(),
  };
  if msg != "success" {
    return Err(Error::EabResolution(format!(
      "broker reported failure: {}",
      msg
    )));
  }

  let field = |name: &str| {
    envelope
      .get("data")
      .and_then(|data| data.get(name))
      .and_then(Value::as_str)
      .filter(|v| !v.is_empty())
      .map(str::to_string)
  };
  match (field("key_id"), field("mac_key")) {
    (Some(key_id), Some(mac_key)) => Ok(EabCredential { key_id, mac_key }),
    _ => Err(Error::EabResolution(
      "broker response is incomplete: key_id or mac_key missing".to_string(),
    )),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn message(err: Error) -> String {
    match err {
      Error::EabResolution(msg) => msg,
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[test]
  fn success_envelope() {
    let cred =
      parse_envelope(r#"{"msg":"success","data":{"key_id":"K","mac_key":"M"}}"#)
        .unwrap();
    assert_eq!(cred.key_id, "K");
    assert_eq!(cred.mac_key, "M");
  }

  #[test]
  fn reported_failure_carries_message() {
    let err = parse_envelope(r#"{"msg":"fail","data":{}}"#).unwrap_err();
    assert!(message(err).contains("fail"));
  }

  #[test]
  fn missing_msg_is_unparseable() {
    let err =
      parse_envelope(r#"{"data":{"key_id":"K","mac_key":"M"}}"#).unwrap_err();
    assert!(message(err).starts_with("unable to parse"));

    let err = parse_envelope("<html>bad gateway</html>").unwrap_err();
    assert!(message(err).contains("bad gateway"));
  }

  #[test]
  fn incomplete_data() {
    for body in [
      r#"{"msg":"success"}"#,
      r#"{"msg":"success","data":[]}"#,
      r#"{"msg":"success","data":{"key_id":"K"}}"#,
      r#"{"msg":"success","data":{"key_id":"","mac_key":"M"}}"#,
    ] {
      let err = parse_envelope(body).unwrap_err();
      assert!(message(err).contains("incomplete"), "{}", body);
    }
  }

  #[test]
  fn debug_redacts_mac_key() {
    let cred = EabCredential {
      key_id: "K".to_string(),
      mac_key: "secret".to_string(),
    };
    assert!(!format!("{:?}", cred).contains("secret"));
  }
}
