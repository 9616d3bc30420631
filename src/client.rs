use crate::account::Account;
use crate::account::AccountBuilder;
use crate::authorization::Authorization;
use crate::authorization::AuthorizationStatus;
use crate::config::Config;
use crate::config::PollConfig;
use crate::directory::Directory;
use crate::directory::DirectoryBuilder;
use crate::error::*;
use crate::helpers::*;
use crate::order::gen_csr;
use crate::order::Order;
use crate::order::OrderBuilder;
use crate::order::OrderStatus;
use crate::protocol::*;
use async_trait::async_trait;
use openssl::pkey::PKey;
use openssl::pkey::Private;
use openssl::x509::X509;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use tracing::field;
use tracing::instrument;
use tracing::Level;
use tracing::Span;

/// An order created by [`AcmeClient`], together with its authorizations.
#[derive(Debug, Clone)]
pub struct PendingOrder {
  order: Order,
  authorizations: Vec<Authorization>,
  challenge_types: BTreeMap<String, ChallengeType>,
}

impl PendingOrder {
  pub fn order(&self) -> &Order {
    &self.order
  }

  pub fn authorizations(&self) -> &[Authorization] {
    &self.authorizations
  }

  fn challenge_type(&self, authorization: &Authorization) -> ChallengeType {
    self
      .challenge_types
      .get(&identifier_name(authorization))
      .copied()
      .unwrap_or(ChallengeType::Dns01)
  }
}

fn identifier_name(authorization: &Authorization) -> String {
  if authorization.wildcard == Some(true) {
    format!("*.{}", authorization.identifier.value)
  } else {
    authorization.identifier.value.clone()
  }
}

/// The [`ProtocolClient`] backed by a live ACME directory.
pub struct AcmeClient {
  directory: Arc<Directory>,
  account_key: Option<PKey<Private>>,
  account_id: Option<String>,
  poll: PollConfig,
  logger: Option<Logger>,
}

impl AcmeClient {
  /// Fetch the directory of the configured environment and build a client
  /// for it. No account is loaded yet.
  pub async fn connect(config: &Config) -> Result<Self, Error> {
    let http_client = config.http_client_builder()?.build()?;
    let directory = DirectoryBuilder::new(config.mode.directory_url())
      .http_client(http_client)
      .build()
      .await?;
    Ok(Self::new(directory, config.poll.clone()))
  }

  pub fn new(directory: Arc<Directory>, poll: PollConfig) -> Self {
    AcmeClient {
      directory,
      account_key: None,
      account_id: None,
      poll,
      logger: None,
    }
  }

  pub fn directory(&self) -> &Arc<Directory> {
    &self.directory
  }

  fn log(&self, msg: &str) {
    debug!("{}", msg);
    if let Some(logger) = &self.logger {
      logger(msg);
    }
  }

  fn account(&self) -> Result<Arc<Account>, Error> {
    let key = self
      .account_key
      .clone()
      .ok_or_else(|| Error::validation("no account key loaded"))?;
    let id = self
      .account_id
      .clone()
      .ok_or_else(|| Error::validation("no account registered or loaded"))?;
    Ok(Account::existing(self.directory.clone(), key, id))
  }
}

fn order_failure(order: &Order, what: &'static str) -> Error {
  match &order.error {
    Some(err) => err.clone().into(),
    None => transport_err(what),
  }
}

#[async_trait]
impl ProtocolClient for AcmeClient {
  type Order = PendingOrder;

  fn load_account_key(&mut self, key: PKey<Private>) {
    self.account_key = Some(key);
  }

  fn set_account(&mut self, key_id: String) {
    self.account_id = Some(key_id);
  }

  #[instrument(level = Level::INFO, name = "gts_acme::AcmeClient::register_with_eab", err, skip(self, eab_mac_key), fields(account_id = field::Empty))]
  async fn register_with_eab(
    &mut self,
    accept_terms: bool,
    eab_key_id: &str,
    eab_mac_key: &str,
    email: &str,
  ) -> Result<String, Error> {
    let private_key = self
      .account_key
      .clone()
      .ok_or_else(|| Error::validation("no account key loaded"))?;
    let hmac = eab_hmac_key(eab_mac_key)?;

    self.log(&format!("registering account for {}", email));
    let mut builder = AccountBuilder::new(self.directory.clone());
    let account = builder
      .private_key(private_key)
      .contact(vec![format!("mailto:{}", email)])
      .terms_of_service_agreed(accept_terms)
      .external_account_binding(eab_key_id.to_string(), hmac)
      .build()
      .await?;

    Span::current().record("account_id", field::display(&account.id));
    self.log(&format!("account registered: {}", account.id));
    self.account_id = Some(account.id.clone());
    Ok(account.id.clone())
  }

  #[instrument(level = Level::INFO, name = "gts_acme::AcmeClient::create_order", err, skip(self, domains), fields(domains = ?domains.keys().collect::<Vec<_>>()))]
  async fn create_order(
    &self,
    domains: &BTreeMap<String, ChallengeType>,
  ) -> Result<CreatedOrder<PendingOrder>, Error> {
    let mut builder = OrderBuilder::new(self.account()?);
    for domain in domains.keys() {
      builder.add_dns_identifier(domain.clone());
    }
    let order = builder.build().await?;
    self.log(&format!("created order {}", order.url()));

    let authorizations = order.authorizations().await?;
    let pending = PendingOrder {
      order,
      authorizations,
      challenge_types: domains.clone(),
    };

    let mut challenges = vec![];
    for authorization in &pending.authorizations {
      let domain = identifier_name(authorization);
      if authorization.status == AuthorizationStatus::Valid {
        self.log(&format!("{} is already authorized", domain));
        continue;
      }
      let typ = pending.challenge_type(authorization);
      let challenge =
        authorization.get_challenge(typ.as_str()).ok_or_else(|| {
          Error::Authorization(format!(
            "no {} challenge offered for {}",
            typ.as_str(),
            domain
          ))
        })?;
      let value = challenge
        .key_authorization_encoded()?
        .ok_or_else(|| transport_err("challenge without token"))?;
      challenges.push(ChallengeDescriptor {
        key: format!("_acme-challenge.{}", authorization.identifier.value),
        domain,
        value,
      });
    }

    Ok(CreatedOrder {
      order: pending,
      challenges,
    })
  }

  #[instrument(level = Level::INFO, name = "gts_acme::AcmeClient::authorize_order", err, skip(self, order), fields(order = %order.order.url()))]
  async fn authorize_order(
    &self,
    order: &mut PendingOrder,
  ) -> Result<(), Error> {
    for i in 0..order.authorizations.len() {
      let authorization = &order.authorizations[i];
      if authorization.status != AuthorizationStatus::Pending {
        continue;
      }
      let typ = order.challenge_type(authorization);
      let domain = identifier_name(authorization);
      let challenge =
        authorization.get_challenge(typ.as_str()).ok_or_else(|| {
          Error::Authorization(format!(
            "no {} challenge offered for {}",
            typ.as_str(),
            domain
          ))
        })?;

      let validated = challenge.validate().await?;
      self.log(&format!(
        "triggered {} validation for {}: {:?}",
        typ.as_str(),
        domain,
        validated.status
      ));

      let challenges = &mut order.authorizations[i].challenges;
      if let Some(slot) = challenges.iter_mut().find(|c| c.typ == validated.typ)
      {
        *slot = validated;
      }
    }
    Ok(())
  }

  #[instrument(level = Level::INFO, name = "gts_acme::AcmeClient::authorization_status", err, skip(self, order), fields(order = %order.order.url()))]
  async fn authorization_status(
    &self,
    order: &PendingOrder,
  ) -> Result<bool, Error> {
    let mut all_valid = true;
    for authorization in &order.authorizations {
      let current = authorization.poll().await?;
      let domain = identifier_name(&current);
      match current.status {
        AuthorizationStatus::Valid => {}
        AuthorizationStatus::Pending => {
          self.log(&format!("{} is still pending", domain));
          all_valid = false;
        }
        status => {
          let reason = current
            .challenge_error()
            .map(|e| e.message())
            .unwrap_or_else(|| "no error reported".to_string());
          return Err(Error::Authorization(format!(
            "{} is {:?}: {}",
            domain, status, reason
          )));
        }
      }
    }
    Ok(all_valid)
  }

  #[instrument(level = Level::INFO, name = "gts_acme::AcmeClient::finalize_order", err, skip(self, order, private_key), fields(order = %order.order.url()))]
  async fn finalize_order(
    &self,
    domains: &[String],
    order: &PendingOrder,
    private_key: &PKey<Private>,
  ) -> Result<String, Error> {
    let interval = self.poll.interval();
    let attempts = self.poll.attempts;

    let current = order.order.poll().await?;
    let current = current.wait_ready(interval, attempts).await?;
    if current.status != OrderStatus::Ready {
      return Err(order_failure(
        &current,
        "order is not ready for finalization",
      ));
    }

    let csr = gen_csr(private_key, domains)?;
    self.log(&format!("finalizing order {}", current.url()));
    let current = current.finalize(&csr).await?;
    let current = current.wait_done(interval, attempts).await?;
    if current.status != OrderStatus::Valid {
      return Err(order_failure(&current, "order did not become valid"));
    }

    let pem = current
      .certificate_pem()
      .await?
      .ok_or_else(|| transport_err("valid order without certificate URL"))?;
    self.log(&format!("downloaded certificate for order {}", current.url()));
    Ok(pem)
  }

  #[instrument(level = Level::INFO, name = "gts_acme::AcmeClient::revoke_certificate", err, skip(self, pem))]
  async fn revoke_certificate(&self, pem: &str) -> Result<(), Error> {
    let account = self.account()?;
    let (directory, private_key, account_id) = account.session()?;
    let cert = X509::from_pem(pem.as_bytes())
      .map_err(|e| Error::CertParse(e.to_string()))?;

    let payload = serde_json::to_string(&json!({
      "certificate": b64(&cert.to_der()?),
    }))?;
    let res = directory
      .authenticated_request_raw(
        &directory.revoke_cert_url,
        &payload,
        &private_key,
        &Some(account_id),
      )
      .await?;
    if !res.status().is_success() {
      let err: ServerError = res.json().await?;
      return Err(err.into());
    }
    self.log("certificate revoked");
    Ok(())
  }

  fn set_logger(&mut self, logger: Logger) {
    self.logger = Some(logger);
  }
}
