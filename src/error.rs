use serde::Deserialize;

/// Errors returned by the order lifecycle and the underlying ACME client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The caller supplied invalid input (empty email, empty domain list, ...).
  #[error("validation error: {0}")]
  Validation(String),

  /// Account registration with External Account Binding failed.
  #[error("account registration failed: {0}")]
  Registration(String),

  /// The authority rejected or failed an authorization.
  #[error("authorization failed: {0}")]
  Authorization(String),

  /// EAB credentials could not be obtained from the broker.
  #[error("failed to resolve EAB credentials: {0}")]
  EabResolution(String),

  /// The issued certificate chain could not be parsed.
  #[error("failed to parse certificate: {0}")]
  CertParse(String),

  #[error("the maximum poll attempts have been exceeded")]
  MaxAttemptsExceeded,

  #[error(transparent)]
  Server(#[from] ServerError),

  #[error(transparent)]
  Transport(Box<dyn std::error::Error + Send + Sync>),

  #[error(transparent)]
  Other(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn validation(msg: impl Into<String>) -> Self {
    Self::Validation(msg.into())
  }
}

#[derive(Debug, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(&'static str);

pub fn transport_err(msg: &'static str) -> Error {
  Error::Transport(Box::new(TransportError(msg)))
}

pub fn map_transport_err<T, E: std::error::Error + Send + Sync + 'static>(
  res: Result<T, E>,
) -> Result<T, Error> {
  res.map_err(|err| Error::Transport(Box::new(err)))
}

impl From<reqwest::Error> for Error {
  fn from(err: reqwest::Error) -> Self {
    Self::Transport(Box::new(err))
  }
}

impl From<serde_json::Error> for Error {
  fn from(err: serde_json::Error) -> Self {
    Self::Transport(Box::new(err))
  }
}

impl From<openssl::error::ErrorStack> for Error {
  fn from(err: openssl::error::ErrorStack) -> Self {
    Self::Other(Box::new(err))
  }
}

/// The result of an operation that can return a [`ServerError`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum ServerResult<T> {
  Ok(T),
  Err(ServerError),
}

impl<T> From<ServerResult<T>> for Result<T, Error> {
  fn from(res: ServerResult<T>) -> Self {
    match res {
      ServerResult::Ok(t) => Ok(t),
      ServerResult::Err(err) => Err(err.into()),
    }
  }
}

/// This is an error as returned by the ACME server.
#[derive(Deserialize, Debug, Clone, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("ServerError({}): {}: {}", r#type.clone().unwrap_or_default(), title.clone().unwrap_or_default(), detail.clone().unwrap_or_default())]
pub struct ServerError {
  /// The type of this error.
  pub r#type: Option<String>,
  /// The human readable title of this error.
  pub title: Option<String>,
  /// The status code of this error.
  pub status: Option<u16>,
  /// The human readable extra description for this error.
  pub detail: Option<String>,
}

impl ServerError {
  /// The most specific human readable message the server sent.
  pub fn message(&self) -> String {
    self
      .detail
      .clone()
      .or_else(|| self.title.clone())
      .or_else(|| self.r#type.clone())
      .unwrap_or_else(|| "unknown server error".to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Deserialize, Debug)]
  struct Resource {
    #[allow(dead_code)]
    finalize: String,
  }

  #[test]
  fn server_result_deserializes_problem_document() {
    let res: ServerResult<Resource> = serde_json::from_str(
      r#"{"type":"urn:ietf:params:acme:error:unauthorized","detail":"bad eab","status":403}"#,
    )
    .unwrap();
    let res: Result<Resource, Error> = res.into();
    match res {
      Err(Error::Server(err)) => {
        assert_eq!(err.status, Some(403));
        assert_eq!(err.message(), "bad eab");
      }
      other => panic!("unexpected result: {:?}", other),
    }
  }

  #[test]
  fn server_error_message_falls_back_to_type() {
    let err = ServerError {
      r#type: Some("urn:ietf:params:acme:error:malformed".to_string()),
      title: None,
      status: None,
      detail: None,
    };
    assert_eq!(err.message(), "urn:ietf:params:acme:error:malformed");
  }
}
