use crate::account::Account;
use crate::error::*;
use crate::helpers::*;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::pkey::Private;
use openssl::stack::Stack;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::X509Name;
use openssl::x509::X509Req;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing::field;
use tracing::instrument;
use tracing::Level;
use tracing::Span;

#[derive(Deserialize, Debug, Eq, PartialEq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
/// The status of this order.  Possible values are "pending", "ready",
/// processing", "valid", and "invalid".
pub enum OrderStatus {
  Pending,
  Ready,
  Processing,
  Valid,
  Invalid,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
/// An ACME order object represents a client's request for a certificate
/// and is used to track the progress of that order through to issuance.
pub struct Order {
  #[serde(skip)]
  pub(crate) account: Option<Arc<Account>>,
  #[serde(skip)]
  pub(crate) url: String,

  /// The status of this order.
  pub status: OrderStatus,
  /// The timestamp after which the server will consider this order
  /// invalid.
  pub expires: Option<String>,
  /// An array of identifier objects that the order pertains to.
  pub identifiers: Vec<Identifier>,
  /// The requested value of the notBefore field in the certificate.
  pub not_before: Option<String>,
  /// The requested value of the notAfter field in the certificate.
  pub not_after: Option<String>,

  /// The error that occurred while processing the order, if any.
  pub error: Option<ServerError>,

  #[serde(rename = "authorizations")]
  /// For pending orders, the authorizations that the client needs to
  /// complete before the requested certificate can be issued. For
  /// final orders (in the "valid" or "invalid" state), the
  /// authorizations that were completed.
  pub(crate) authorization_urls: Vec<String>,
  #[serde(rename = "finalize")]
  /// A URL that a CSR must be POSTed to once all of the order's
  /// authorizations are satisfied to finalize the order.
  pub(crate) finalize_url: String,
  #[serde(rename = "certificate")]
  /// A URL for the certificate that has been issued in response to
  /// this order.
  pub(crate) certificate_url: Option<String>,
}

#[derive(Debug)]
pub struct OrderBuilder {
  account: Arc<Account>,

  identifiers: Vec<Identifier>,
}

impl OrderBuilder {
  pub fn new(account: Arc<Account>) -> Self {
    OrderBuilder {
      account,
      identifiers: vec![],
    }
  }

  pub fn add_dns_identifier(&mut self, fqdn: String) -> &mut Self {
    self.identifiers.push(Identifier {
      typ: "dns".to_string(),
      value: fqdn,
    });
    self
  }

  #[instrument(level = Level::INFO, name = "gts_acme::OrderBuilder::build", err, skip(self), fields(identifiers = ?self.identifiers, order_url = field::Empty))]
  pub async fn build(&mut self) -> Result<Order, Error> {
    let (dir, private_key, account_id) = self.account.session()?;

    let (res, headers) = dir
      .authenticated_request::<_, Order>(
        &dir.new_order_url,
        json!({
          "identifiers": self.identifiers,
        }),
        private_key,
        Some(account_id),
      )
      .await?;

    let res: Result<Order, Error> = res.into();
    let mut order = res?;

    let order_url = map_transport_err(
      headers
        .get(reqwest::header::LOCATION)
        .ok_or_else(|| {
          transport_err("mandatory location header in newOrder not present")
        })?
        .to_str(),
    )?
    .to_string();
    Span::current().record("order_url", field::display(&order_url));

    order.account = Some(self.account.clone());
    order.url = order_url;

    Ok(order)
  }
}

pub(crate) fn gen_csr(
  pkey: &PKey<Private>,
  domains: &[String],
) -> Result<X509Req, Error> {
  let first = domains.first().ok_or_else(|| {
    Error::validation("you need to supply at least one domain name")
  })?;

  let mut builder = X509Req::builder()?;
  let name = {
    let mut name = X509Name::builder()?;
    name.append_entry_by_text("CN", first)?;
    name.build()
  };
  builder.set_subject_name(&name)?;

  // Add all domains as SANs
  let san_extension = {
    let mut san = SubjectAlternativeName::new();
    for domain in domains.iter() {
      san.dns(domain);
    }
    san.build(&builder.x509v3_context(None))?
  };
  let mut stack = Stack::new()?;
  stack.push(san_extension)?;
  builder.add_extensions(&stack)?;

  builder.set_pubkey(pkey)?;
  builder.sign(pkey, MessageDigest::sha256())?;

  Ok(builder.build())
}

impl Order {
  /// The URL of this order.
  pub fn url(&self) -> &str {
    &self.url
  }

  fn account(&self) -> Result<Arc<Account>, Error> {
    self
      .account
      .clone()
      .ok_or_else(|| Error::validation("order is not bound to an account"))
  }

  #[instrument(level = Level::INFO, name = "gts_acme::Order::finalize", err, skip(self, csr), fields(order = %self.url, status = field::Empty))]
  pub async fn finalize(&self, csr: &X509Req) -> Result<Order, Error> {
    let csr_b64 = b64(&csr.to_der()?);

    let account = self.account()?;
    let (directory, private_key, account_id) = account.session()?;

    let (res, _) = directory
      .authenticated_request::<_, Order>(
        &self.finalize_url,
        json!({ "csr": csr_b64 }),
        private_key,
        Some(account_id),
      )
      .await?;
    let res: Result<Order, Error> = res.into();
    let mut order = res?;
    order.account = Some(account.clone());
    order.url = self.url.clone();
    Span::current().record("status", field::debug(&order.status));
    Ok(order)
  }

  /// Download the issued certificate chain, leaf first, as PEM text.
  #[instrument(level = Level::INFO, name = "gts_acme::Order::certificate_pem", err, skip(self), fields(order = %self.url))]
  pub async fn certificate_pem(&self) -> Result<Option<String>, Error> {
    let certificate_url = match self.certificate_url.clone() {
      Some(certificate_url) => certificate_url,
      None => return Ok(None),
    };

    let account = self.account()?;
    let (directory, private_key, account_id) = account.session()?;

    let res = directory
      .authenticated_request_raw(
        &certificate_url,
        "",
        &private_key,
        &Some(account_id),
      )
      .await?;

    if !res.status().is_success() {
      let err: ServerError = res.json().await?;
      return Err(err.into());
    }

    Ok(Some(res.text().await?))
  }

  #[instrument(level = Level::DEBUG, name = "gts_acme::Order::poll", err, skip(self), fields(order = %self.url, status = field::Empty))]
  pub async fn poll(&self) -> Result<Order, Error> {
    let account = self.account()?;
    let (directory, private_key, account_id) = account.session()?;

    let (res, _) = directory
      .authenticated_request::<_, Order>(
        &self.url,
        json!(""),
        private_key,
        Some(account_id),
      )
      .await?;
    let res: Result<Order, Error> = res.into();
    let mut order = res?;
    order.account = Some(account.clone());
    order.url = self.url.clone();
    Span::current().record("status", field::debug(&order.status));
    Ok(order)
  }

  /// Poll the order until it leaves the "pending" state, at most
  /// `attempts` times.
  #[instrument(level = Level::INFO, name = "gts_acme::Order::wait_ready", err, skip(self), fields(order = %self.url))]
  pub async fn wait_ready(
    self,
    poll_interval: Duration,
    attempts: usize,
  ) -> Result<Order, Error> {
    let mut order = self;
    let mut i: usize = 0;

    while order.status == OrderStatus::Pending {
      if i >= attempts {
        return Err(Error::MaxAttemptsExceeded);
      }
      debug!(
        { delay = ?poll_interval },
        "Order still pending. Waiting to poll."
      );
      tokio::time::sleep(poll_interval).await;
      order = order.poll().await?;
      i += 1;
    }

    Ok(order)
  }

  /// Poll the order until it is either "valid" or "invalid", at most
  /// `attempts` times.
  #[instrument(level = Level::INFO, name = "gts_acme::Order::wait_done", err, skip(self), fields(order = %self.url))]
  pub async fn wait_done(
    self,
    poll_interval: Duration,
    attempts: usize,
  ) -> Result<Order, Error> {
    let mut order = self;
    let mut i: usize = 0;

    while order.status == OrderStatus::Pending
      || order.status == OrderStatus::Ready
      || order.status == OrderStatus::Processing
    {
      if i >= attempts {
        return Err(Error::MaxAttemptsExceeded);
      }
      debug!(
        { delay = ?poll_interval, status = ?order.status },
        "Order not done. Waiting to poll."
      );
      tokio::time::sleep(poll_interval).await;
      order = order.poll().await?;
      i += 1;
    }

    Ok(order)
  }
}
