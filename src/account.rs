use crate::directory::Directory;
use crate::error::*;
use crate::jws::jws;
use crate::jws::Jwk;
use crate::jws::Jws;
use openssl::pkey::PKey;
use openssl::pkey::Private;
use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;
use tracing::field;
use tracing::instrument;
use tracing::Level;
use tracing::Span;

/// The status of an [`Account`].
///
/// Possible values are "valid", "deactivated",
/// and "revoked". The value "deactivated" should be used to indicate client-
/// initiated deactivation whereas "revoked" should be used to indicate server-
/// initiated deactivation.
#[derive(Deserialize, Eq, PartialEq, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub enum AccountStatus {
  Valid,
  Deactivated,
  Revoked,
}

#[derive(Debug, Clone)]
pub(crate) struct ExternalAccountBinding {
  /// Key identifier, in string form.
  key_id: String,

  /// HMAC private key.
  private_key: PKey<Private>,
}

/// An ACME account. This is used to identify a subscriber to an ACME server.
///
/// This resource should be created through an [`AccountBuilder`], or
/// reconstructed from a known key and key id with [`Account::existing`].
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Account {
  #[serde(skip)]
  pub(crate) directory: Option<Arc<Directory>>,

  #[serde(skip)]
  pub(crate) private_key: Option<PKey<Private>>,

  #[serde(skip)]
  /// The account ID (the `kid` URL) of this account.
  pub id: String,

  /// The status of this account.
  pub status: AccountStatus,
  /// An array of URLs that the server can use to contact the client for
  /// issues related to this account.
  pub contact: Option<Vec<String>>,
  /// Including this field in a newAccount request, with a value of true,
  /// indicates the client's agreement with the terms of service.
  pub terms_of_service_agreed: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewAccountPayload {
  #[serde(skip_serializing_if = "Option::is_none")]
  contact: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  terms_of_service_agreed: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  external_account_binding: Option<Jws>,
}

/// An builder that is used to create / retrieve an [`Account`] from the
/// ACME server.
#[derive(Debug)]
pub struct AccountBuilder {
  directory: Arc<Directory>,

  private_key: Option<PKey<Private>>,
  eab_config: Option<ExternalAccountBinding>,

  contact: Option<Vec<String>>,
  terms_of_service_agreed: Option<bool>,
}

impl AccountBuilder {
  /// This creates a new [`AccountBuilder`]. This can be used to create a new
  /// account (if the server has not seen the private key before), or to
  /// retrieve an existing account (using a previously used private key).
  pub fn new(directory: Arc<Directory>) -> Self {
    AccountBuilder {
      directory,
      private_key: None,
      eab_config: None,
      contact: None,
      terms_of_service_agreed: None,
    }
  }

  /// The private key that is used to sign requests to the ACME server. This
  /// may not be the same as a certificate private key.
  pub fn private_key(&mut self, private_key: PKey<Private>) -> &mut Self {
    self.private_key = Some(private_key);
    self
  }

  /// Bind the new account to an existing CA-side identity. `private_key`
  /// is the HMAC key derived from the MAC key the CA handed out.
  pub fn external_account_binding(
    &mut self,
    key_id: String,
    private_key: PKey<Private>,
  ) -> &mut Self {
    self.eab_config = Some(ExternalAccountBinding {
      key_id,
      private_key,
    });
    self
  }

  /// The contact information for the account. For example this could be a
  /// `vec!["mailto:hello@example.com".to_string()]`.
  pub fn contact(&mut self, contact: Vec<String>) -> &mut Self {
    self.contact = Some(contact);
    self
  }

  /// If you agree to the ACME server terms of service.
  pub fn terms_of_service_agreed(
    &mut self,
    terms_of_service_agreed: bool,
  ) -> &mut Self {
    self.terms_of_service_agreed = Some(terms_of_service_agreed);
    self
  }

  /// This will create / retrieve an [`Account`] from the ACME server.
  /// A private key must have been set.
  #[instrument(level = Level::INFO, name = "gts_acme::AccountBuilder::build", err, skip(self), fields(contact = ?self.contact, terms_of_service_agreed = ?self.terms_of_service_agreed, eab = self.eab_config.is_some(), account_id = field::Empty))]
  pub async fn build(&mut self) -> Result<Arc<Account>, Error> {
    let private_key = self
      .private_key
      .clone()
      .ok_or_else(|| Error::validation("no account key set"))?;

    let url = self.directory.new_account_url.clone();

    let external_account_binding = match &self.eab_config {
      Some(eab_config) => {
        let payload = serde_json::to_string(&Jwk::new(&private_key)?)?;
        Some(jws(
          &url,
          None,
          &payload,
          &eab_config.private_key,
          Some(eab_config.key_id.clone()),
        )?)
      }
      None => None,
    };

    let payload = NewAccountPayload {
      contact: self.contact.clone(),
      terms_of_service_agreed: self.terms_of_service_agreed,
      external_account_binding,
    };

    let (res, headers) = self
      .directory
      .authenticated_request::<_, Account>(
        &url,
        payload,
        private_key.clone(),
        None,
      )
      .await?;
    let res: Result<Account, Error> = res.into();
    let mut acc = res?;

    let account_id = map_transport_err(
      headers
        .get(reqwest::header::LOCATION)
        .ok_or_else(|| {
          transport_err("mandatory location header in newAccount not present")
        })?
        .to_str(),
    )?
    .to_string();
    Span::current().record("account_id", field::display(&account_id));

    acc.directory = Some(self.directory.clone());
    acc.private_key = Some(private_key);
    acc.id = account_id;
    Ok(Arc::new(acc))
  }
}

impl Account {
  /// Reconstruct an account the server already knows from its key and
  /// key id, without a round trip.
  pub fn existing(
    directory: Arc<Directory>,
    private_key: PKey<Private>,
    id: String,
  ) -> Arc<Account> {
    Arc::new(Account {
      directory: Some(directory),
      private_key: Some(private_key),
      id,
      status: AccountStatus::Valid,
      contact: None,
      terms_of_service_agreed: None,
    })
  }

  pub(crate) fn session(
    &self,
  ) -> Result<(Arc<Directory>, PKey<Private>, String), Error> {
    let directory = self
      .directory
      .clone()
      .ok_or_else(|| Error::validation("account is not bound to a directory"))?;
    let private_key = self
      .private_key
      .clone()
      .ok_or_else(|| Error::validation("account has no private key"))?;
    Ok((directory, private_key, self.id.clone()))
  }
}
