use crate::account::Account;
use crate::error::*;
use crate::helpers::*;
use crate::jws::Jwk;
use crate::order::Order;
use openssl::hash::hash;
use openssl::hash::MessageDigest;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::field;
use tracing::instrument;
use tracing::Level;
use tracing::Span;

#[derive(Deserialize, Debug, Eq, PartialEq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
/// The status of this authorization. Possible values are "pending",
/// "valid", "invalid", "deactivated", "expired", and "revoked".
pub enum AuthorizationStatus {
  Pending,
  Valid,
  Invalid,
  Deactivated,
  Expired,
  Revoked,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
/// An ACME authorization object represents a server's authorization
/// for an account to represent an identifier.
pub struct Authorization {
  #[serde(skip)]
  pub(crate) account: Option<Arc<Account>>,
  #[serde(skip)]
  pub(crate) url: String,

  /// The identifier that the account is authorized to represent.
  pub identifier: Identifier,
  /// The status of this authorization.
  pub status: AuthorizationStatus,
  /// The timestamp after which the server will consider this
  /// authorization invalid.
  pub expires: Option<String>,
  /// For pending authorizations, the challenges that the client can
  /// fulfill in order to prove possession of the identifier. For
  /// valid authorizations, the challenge that was validated. For
  /// invalid authorizations, the challenge that was attempted and
  /// failed.
  pub challenges: Vec<Challenge>,
  pub wildcard: Option<bool>,
}

#[derive(Deserialize, Debug, Eq, PartialEq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
/// The status of this challenge. Possible values are "pending",
/// "processing", "valid", and "invalid".
pub enum ChallengeStatus {
  Pending,
  Processing,
  Valid,
  Invalid,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
  #[serde(skip)]
  pub(crate) account: Option<Arc<Account>>,

  #[serde(rename = "type")]
  /// The type of challenge encoded in the object.
  pub typ: String,
  /// The URL to which a response can be posted.
  pub(crate) url: String,
  /// The status of this challenge.
  pub status: ChallengeStatus,
  /// The time at which the server validated this challenge.
  pub validated: Option<String>,

  /// Error that occurred while the server was validating the
  /// challenge, if any.
  pub error: Option<ServerError>,

  /// A random value that uniquely identifies the challenge.
  pub token: Option<String>,
}

fn bound_account(
  account: &Option<Arc<Account>>,
) -> Result<Arc<Account>, Error> {
  account
    .clone()
    .ok_or_else(|| Error::validation("resource is not bound to an account"))
}

impl Order {
  #[instrument(level = Level::INFO, name = "gts_acme::Order::authorizations", err, skip(self), fields(order = %self.url, authorization_urls = ?self.authorization_urls))]
  pub async fn authorizations(&self) -> Result<Vec<Authorization>, Error> {
    let account = bound_account(&self.account)?;
    let (directory, private_key, account_id) = account.session()?;

    let mut authorizations = vec![];

    for authorization_url in self.authorization_urls.clone() {
      let (res, _) = directory
        .authenticated_request::<_, Authorization>(
          &authorization_url,
          "",
          private_key.clone(),
          Some(account_id.clone()),
        )
        .await?;

      let res: Result<Authorization, Error> = res.into();

      let mut authorization = res?;
      authorization.account = Some(account.clone());
      authorization.url = authorization_url;
      for challenge in &mut authorization.challenges {
        challenge.account = Some(account.clone())
      }
      authorizations.push(authorization)
    }

    Ok(authorizations)
  }
}

impl Authorization {
  pub fn get_challenge(&self, typ: &str) -> Option<Challenge> {
    self.challenges.iter().find(|c| c.typ == typ).cloned()
  }

  /// The first error reported by any challenge of this authorization.
  pub fn challenge_error(&self) -> Option<&ServerError> {
    self.challenges.iter().find_map(|c| c.error.as_ref())
  }

  #[instrument(level = Level::DEBUG, name = "gts_acme::Authorization::poll", err, skip(self), fields(url = ?self.url, status = field::Empty))]
  pub async fn poll(&self) -> Result<Authorization, Error> {
    let account = bound_account(&self.account)?;
    let (directory, private_key, account_id) = account.session()?;

    let (res, _) = directory
      .authenticated_request::<_, Authorization>(
        &self.url,
        json!(""),
        private_key,
        Some(account_id),
      )
      .await?;
    let res: Result<Authorization, Error> = res.into();
    let mut authorization = res?;
    authorization.url = self.url.clone();
    authorization.account = Some(account.clone());
    for challenge in &mut authorization.challenges {
      challenge.account = Some(account.clone())
    }
    Span::current().record("status", field::debug(&authorization.status));
    Ok(authorization)
  }
}

impl Challenge {
  pub fn key_authorization(&self) -> Result<Option<String>, Error> {
    let token = match self.token.clone() {
      Some(token) => token,
      None => return Ok(None),
    };
    let account = bound_account(&self.account)?;
    let (_, private_key, _) = account.session()?;
    let thumbprint = Jwk::new(&private_key)?.thumbprint()?;
    Ok(Some(format!("{}.{}", token, thumbprint)))
  }

  /// The key authorization digest, as published in a dns-01 TXT record.
  pub fn key_authorization_encoded(&self) -> Result<Option<String>, Error> {
    match self.key_authorization()? {
      Some(key_authorization) => Ok(Some(b64(&hash(
        MessageDigest::sha256(),
        key_authorization.as_bytes(),
      )?))),
      None => Ok(None),
    }
  }

  #[instrument(level = Level::INFO, name = "gts_acme::Challenge::validate", err, skip(self), fields(url = ?self.url, status = field::Empty))]
  pub async fn validate(&self) -> Result<Challenge, Error> {
    let account = bound_account(&self.account)?;
    let (directory, private_key, account_id) = account.session()?;

    let (res, _) = directory
      .authenticated_request::<_, Challenge>(
        &self.url,
        json!({}),
        private_key,
        Some(account_id),
      )
      .await?;
    let res: Result<Challenge, Error> = res.into();
    let mut challenge = res?;
    challenge.account = Some(account.clone());
    Span::current().record("status", field::debug(&challenge.status));

    Ok(challenge)
  }
}
