//! The order lifecycle: account registration, order creation, authorization
//! and finalization against Google Trust Services.

use crate::cert::parse_leaf;
use crate::client::AcmeClient;
use crate::config::Config;
use crate::config::EabMode;
use crate::domain::main_domain_of;
use crate::domain::relative_name;
use crate::eab::EabCredential;
use crate::eab::EabResolver;
use crate::error::*;
use crate::protocol::*;
use openssl::pkey::PKey;
use openssl::pkey::Private;
use std::collections::BTreeMap;
use tracing::field;
use tracing::info;
use tracing::instrument;
use tracing::Level;
use tracing::Span;

const DEFAULT_RSA_BITS: u32 = 2048;
const DEFAULT_EC_CURVE_BITS: u32 = 384;
const ACCOUNT_KEY_BITS: u32 = 2048;
const CAA_ISSUER: &str = "0 issue \"pki.goog\"";

/// A CA account that already exists, e.g. one inherited from a reseller.
/// Registration reuses its key instead of generating a new one.
#[derive(Debug, Clone)]
pub struct ExternalAccount {
  pub key_id: String,
  pub account_key: PKey<Private>,
}

/// The account a successful [`OrderController::register`] produced.
#[derive(Debug, Clone)]
pub struct AccountCredential {
  /// The CA-assigned account key id (the `kid` URL).
  pub key_id: String,
  pub key: PKey<Private>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsRecordType {
  Txt,
  Caa,
}

/// One DNS record the caller has to publish before authorizing an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsInstruction {
  /// The zone apex the record lives in.
  pub zone: String,
  /// Record name relative to `zone`.
  pub name: String,
  pub record_type: DnsRecordType,
  pub value: String,
}

/// DNS instructions grouped by zone.
pub type DnsInstructions = BTreeMap<String, Vec<DnsInstruction>>;

/// The kind of key a certificate is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
  Rsa,
  Ecc,
}

impl KeyType {
  /// Exactly `"ECC"` selects an elliptic curve key, anything else RSA.
  pub fn from_name(name: &str) -> KeyType {
    if name == "ECC" {
      KeyType::Ecc
    } else {
      KeyType::Rsa
    }
  }
}

/// A certificate issued by [`OrderController::finalize_order`].
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
  pub private_key: PKey<Private>,
  pub full_chain_pem: String,
  pub issuer_cn: String,
  pub subject_cn: String,
  /// notBefore, in seconds since the Unix epoch.
  pub valid_from: i64,
  /// notAfter, in seconds since the Unix epoch.
  pub valid_to: i64,
}

impl IssuedCertificate {
  /// The certificate key as PKCS#8 PEM.
  pub fn private_key_pem(&self) -> Result<String, Error> {
    let pem = self.private_key.private_key_to_pem_pkcs8()?;
    String::from_utf8(pem).map_err(|e| Error::Other(Box::new(e)))
  }
}

fn non_empty_domains(domains: &[String]) -> Vec<String> {
  domains
    .iter()
    .map(|d| d.trim())
    .filter(|d| !d.is_empty())
    .map(str::to_string)
    .collect()
}

fn describe(err: &Error) -> String {
  match err {
    Error::Server(err) => err.message(),
    other => other.to_string(),
  }
}

fn registration_error(err: Error) -> Error {
  match err {
    Error::Validation(_) | Error::Registration(_) => err,
    other => Error::Registration(describe(&other)),
  }
}

fn authorization_error(err: Error) -> Error {
  match err {
    Error::Validation(_) | Error::Authorization(_) => err,
    other => Error::Authorization(describe(&other)),
  }
}

/// Drives one issuance workflow end to end.
///
/// The controller owns the protocol client session: `register` swaps the
/// account key used to sign every later request, so one controller must
/// only serve one workflow at a time.
pub struct OrderController<C: ProtocolClient> {
  config: Config,
  client: C,
  external_account: Option<ExternalAccount>,
}

impl OrderController<AcmeClient> {
  /// Connect to the environment selected by `config.mode`.
  pub async fn connect(
    config: Config,
    external_account: Option<ExternalAccount>,
  ) -> Result<Self, Error> {
    let client = AcmeClient::connect(&config).await?;
    Ok(Self::new(config, client, external_account))
  }
}

impl<C: ProtocolClient> OrderController<C> {
  pub fn new(
    config: Config,
    mut client: C,
    external_account: Option<ExternalAccount>,
  ) -> Self {
    if let Some(external_account) = &external_account {
      client.load_account_key(external_account.account_key.clone());
      client.set_account(external_account.key_id.clone());
    }
    OrderController {
      config,
      client,
      external_account,
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn client(&self) -> &C {
    &self.client
  }

  async fn resolve_eab(&self) -> Result<EabCredential, Error> {
    match self.config.eab_mode {
      EabMode::Auto => EabResolver::new(&self.config)?.fetch().await,
      EabMode::Manual => {
        let key_id = self.config.eab_key_id.clone().unwrap_or_default();
        let mac_key = self.config.eab_key.clone().unwrap_or_default();
        if key_id.is_empty() || mac_key.is_empty() {
          return Err(Error::validation(
            "EAB key id and MAC key are required in manual mode",
          ));
        }
        Ok(EabCredential { key_id, mac_key })
      }
    }
  }

  /// Register an account bound to EAB credentials. Reuses the external
  /// account's key when one was supplied, otherwise generates a new
  /// 2048 bit RSA account key.
  #[instrument(level = Level::INFO, name = "gts_acme::OrderController::register", err, skip(self), fields(mode = ?self.config.mode, eab_mode = ?self.config.eab_mode, external = self.external_account.is_some(), account_id = field::Empty))]
  pub async fn register(&mut self) -> Result<AccountCredential, Error> {
    let email = self.config.email.trim().to_string();
    if email.is_empty() {
      return Err(Error::validation("email address must not be empty"));
    }

    let eab = self.resolve_eab().await?;

    let key = match &self.external_account {
      Some(external_account) => external_account.account_key.clone(),
      None => {
        let key = self.client.generate_rsa_key(ACCOUNT_KEY_BITS)?;
        self.client.load_account_key(key.clone());
        key
      }
    };

    let key_id = self
      .client
      .register_with_eab(true, &eab.key_id, &eab.mac_key, &email)
      .await
      .map_err(registration_error)?;

    Span::current().record("account_id", field::display(&key_id));
    info!("Account registered.");
    Ok(AccountCredential { key_id, key })
  }

  /// Create an order validated through dns-01 and return it together with
  /// the DNS records to publish, grouped by zone.
  #[instrument(level = Level::INFO, name = "gts_acme::OrderController::create_order", err, skip(self, domains), fields(domains = ?domains))]
  pub async fn create_order(
    &self,
    domains: &[String],
    key_type: KeyType,
    key_size: Option<u32>,
  ) -> Result<(C::Order, DnsInstructions), Error> {
    let challenges: BTreeMap<String, ChallengeType> = non_empty_domains(domains)
      .into_iter()
      .map(|domain| (domain, ChallengeType::Dns01))
      .collect();
    if challenges.is_empty() {
      return Err(Error::validation("empty domain list"));
    }

    let created = self.client.create_order(&challenges).await?;

    let mut instructions = DnsInstructions::new();
    for challenge in &created.challenges {
      let zone = main_domain_of(&challenge.domain);
      let name = relative_name(&challenge.key, &zone).ok_or_else(|| {
        Error::validation(format!(
          "challenge record {} is not inside zone {}",
          challenge.key, zone
        ))
      })?;

      let records = instructions.entry(zone.clone()).or_default();
      if self.config.emit_caa_records && records.is_empty() {
        records.push(DnsInstruction {
          zone: zone.clone(),
          name: "@".to_string(),
          record_type: DnsRecordType::Caa,
          value: CAA_ISSUER.to_string(),
        });
      }
      records.push(DnsInstruction {
        zone,
        name,
        record_type: DnsRecordType::Txt,
        value: challenge.value.clone(),
      });
    }

    info!(
      { challenges = created.challenges.len(), zones = instructions.len() },
      "Order created."
    );
    Ok((created.order, instructions))
  }

  /// Ask the CA to check the published challenges of `order`.
  #[instrument(level = Level::INFO, name = "gts_acme::OrderController::auth_order", err, skip(self, _domains, order))]
  pub async fn auth_order(
    &self,
    _domains: &[String],
    order: &mut C::Order,
  ) -> Result<(), Error> {
    self
      .client
      .authorize_order(order)
      .await
      .map_err(authorization_error)
  }

  /// Whether every authorization of `order` is valid yet. `false` means
  /// the CA is still checking; a rejected authorization is an error.
  #[instrument(level = Level::INFO, name = "gts_acme::OrderController::get_auth_status", err, skip(self, _domains, order))]
  pub async fn get_auth_status(
    &self,
    _domains: &[String],
    order: &C::Order,
  ) -> Result<bool, Error> {
    self
      .client
      .authorization_status(order)
      .await
      .map_err(authorization_error)
  }

  /// Generate the certificate key, finalize `order` and parse the issued
  /// chain. EC keys default to P-384, RSA keys to 2048 bits.
  #[instrument(level = Level::INFO, name = "gts_acme::OrderController::finalize_order", err, skip(self, domains, order), fields(domains = ?domains, subject = field::Empty))]
  pub async fn finalize_order(
    &self,
    domains: &[String],
    order: &C::Order,
    key_type: KeyType,
    key_size: Option<u32>,
  ) -> Result<IssuedCertificate, Error> {
    let domains = non_empty_domains(domains);
    if domains.is_empty() {
      return Err(Error::validation("empty domain list"));
    }

    let private_key = match key_type {
      KeyType::Ecc => self
        .client
        .generate_ec_key(key_size.unwrap_or(DEFAULT_EC_CURVE_BITS))?,
      KeyType::Rsa => self
        .client
        .generate_rsa_key(key_size.unwrap_or(DEFAULT_RSA_BITS))?,
    };

    let full_chain_pem = self
      .client
      .finalize_order(&domains, order, &private_key)
      .await?;
    let info = parse_leaf(&full_chain_pem)?;

    Span::current().record("subject", field::display(&info.subject_cn));
    info!(
      { issuer = %info.issuer_cn, valid_to = info.valid_to },
      "Certificate issued."
    );
    Ok(IssuedCertificate {
      private_key,
      full_chain_pem,
      issuer_cn: info.issuer_cn,
      subject_cn: info.subject_cn,
      valid_from: info.valid_from,
      valid_to: info.valid_to,
    })
  }

  /// Revoke a certificate issued to this account.
  #[instrument(level = Level::INFO, name = "gts_acme::OrderController::revoke", err, skip(self, _order, pem))]
  pub async fn revoke(
    &self,
    _order: &C::Order,
    pem: &str,
  ) -> Result<(), Error> {
    self.client.revoke_certificate(pem).await
  }

  /// Orders cannot be cancelled at the CA; they expire on their own.
  pub fn cancel(&self, _order: &C::Order) -> Result<(), Error> {
    Ok(())
  }

  pub fn set_logger(&mut self, logger: Logger) {
    self.client.set_logger(logger);
  }
}
