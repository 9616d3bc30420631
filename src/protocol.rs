//! The seam between the order lifecycle and the ACME protocol engine.

use crate::error::*;
use crate::helpers::gen_ec_private_key;
use crate::helpers::gen_rsa_private_key;
use async_trait::async_trait;
use openssl::pkey::PKey;
use openssl::pkey::Private;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A diagnostic sink receiving one line per protocol step.
pub type Logger = Arc<dyn Fn(&str) + Send + Sync>;

/// The validation method requested for an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeType {
  Dns01,
}

impl ChallengeType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ChallengeType::Dns01 => "dns-01",
    }
  }
}

/// What the CA expects to find in DNS for one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeDescriptor {
  /// The identifier under validation.
  pub domain: String,
  /// Fully qualified record name, e.g. `_acme-challenge.www.example.com`.
  pub key: String,
  /// The TXT record value.
  pub value: String,
}

/// A freshly created order and the challenges still to be satisfied.
#[derive(Debug)]
pub struct CreatedOrder<O> {
  pub order: O,
  pub challenges: Vec<ChallengeDescriptor>,
}

/// The operations the order lifecycle needs from an ACME client.
///
/// Implementations keep the session's account key and key id; every
/// authenticated call signs with whatever was loaded last.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
  /// The order handle threaded through the lifecycle.
  type Order: Send + Sync;

  fn generate_rsa_key(&self, bits: u32) -> Result<PKey<Private>, Error> {
    gen_rsa_private_key(bits)
  }

  fn generate_ec_key(&self, curve_bits: u32) -> Result<PKey<Private>, Error> {
    gen_ec_private_key(curve_bits)
  }

  fn load_account_key(&mut self, key: PKey<Private>);

  fn set_account(&mut self, key_id: String);

  /// Register the loaded account key, bound to the given EAB credentials.
  /// Returns the account key id assigned by the CA and makes it the
  /// session's account.
  async fn register_with_eab(
    &mut self,
    accept_terms: bool,
    eab_key_id: &str,
    eab_mac_key: &str,
    email: &str,
  ) -> Result<String, Error>;

  async fn create_order(
    &self,
    domains: &BTreeMap<String, ChallengeType>,
  ) -> Result<CreatedOrder<Self::Order>, Error>;

  /// Ask the CA to validate every pending challenge of the order.
  async fn authorize_order(&self, order: &mut Self::Order) -> Result<(), Error>;

  /// Whether every authorization of the order is valid. Fails when any
  /// authorization reached a final state other than valid.
  async fn authorization_status(&self, order: &Self::Order)
    -> Result<bool, Error>;

  /// Finalize the order with a CSR for `domains` signed by `private_key`
  /// and return the issued chain as PEM.
  async fn finalize_order(
    &self,
    domains: &[String],
    order: &Self::Order,
    private_key: &PKey<Private>,
  ) -> Result<String, Error>;

  async fn revoke_certificate(&self, pem: &str) -> Result<(), Error>;

  fn set_logger(&mut self, logger: Logger);
}
