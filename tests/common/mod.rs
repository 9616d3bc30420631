#![allow(dead_code)]

pub mod ca;

use async_trait::async_trait;
use gts_acme::*;
use mockito::Mock;
use mockito::Server;
use mockito::ServerGuard;
use openssl::asn1::Asn1Time;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::pkey::Private;
use openssl::x509::X509Builder;
use openssl::x509::X509NameBuilder;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

pub const ISSUER_CN: &str = "Mock GTS CA 1D4";
pub const NOT_BEFORE: i64 = 1_700_000_000;
pub const NOT_AFTER: i64 = 1_707_776_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
  Rsa,
  Ec,
}

/// Everything the mock client was asked to do.
#[derive(Debug, Default)]
pub struct Calls {
  pub generated: Vec<(KeyKind, u32)>,
  pub loaded_keys: Vec<Vec<u8>>,
  pub accounts: Vec<String>,
  /// `(eab_key_id, eab_mac_key, email, account public key)`
  pub registrations: Vec<(String, String, String, Vec<u8>)>,
  pub orders: Vec<Vec<String>>,
  pub authorized: usize,
  pub finalized: Vec<Vec<String>>,
  pub revoked: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MockOrder {
  pub domains: Vec<String>,
  pub authorized: bool,
}

/// An in-memory [`ProtocolClient`] issuing certificates from a throwaway
/// CA.
pub struct MockClient {
  pub calls: Arc<Mutex<Calls>>,
  pub account_key: Option<PKey<Private>>,
  pub register_error: Option<ServerError>,
  pub auth_error: Option<String>,
  pub auth_ready: bool,
  /// Replaces the challenges derived from the requested domains.
  pub challenges: Option<Vec<ChallengeDescriptor>>,
  /// Replaces the minted certificate chain.
  pub chain: Option<String>,
  logger: Option<Logger>,
}

impl MockClient {
  pub fn new() -> (Self, Arc<Mutex<Calls>>) {
    let calls = Arc::new(Mutex::new(Calls::default()));
    let client = MockClient {
      calls: calls.clone(),
      account_key: None,
      register_error: None,
      auth_error: None,
      auth_ready: true,
      challenges: None,
      chain: None,
      logger: None,
    };
    (client, calls)
  }

  fn log(&self, msg: &str) {
    if let Some(logger) = &self.logger {
      logger(msg);
    }
  }
}

pub fn challenge_for(domain: &str) -> ChallengeDescriptor {
  ChallengeDescriptor {
    domain: domain.to_string(),
    key: format!("_acme-challenge.{}", domain.trim_start_matches("*.")),
    value: format!("txt-{}", domain),
  }
}

#[async_trait]
impl ProtocolClient for MockClient {
  type Order = MockOrder;

  fn generate_rsa_key(&self, bits: u32) -> Result<PKey<Private>, Error> {
    self.calls.lock().unwrap().generated.push((KeyKind::Rsa, bits));
    gen_rsa_private_key(bits)
  }

  fn generate_ec_key(&self, curve_bits: u32) -> Result<PKey<Private>, Error> {
    self
      .calls
      .lock()
      .unwrap()
      .generated
      .push((KeyKind::Ec, curve_bits));
    gen_ec_private_key(curve_bits)
  }

  fn load_account_key(&mut self, key: PKey<Private>) {
    let public = key.public_key_to_pem().unwrap();
    self.calls.lock().unwrap().loaded_keys.push(public);
    self.account_key = Some(key);
  }

  fn set_account(&mut self, key_id: String) {
    self.calls.lock().unwrap().accounts.push(key_id);
  }

  async fn register_with_eab(
    &mut self,
    accept_terms: bool,
    eab_key_id: &str,
    eab_mac_key: &str,
    email: &str,
  ) -> Result<String, Error> {
    assert!(accept_terms);
    if let Some(err) = &self.register_error {
      return Err(err.clone().into());
    }
    let public = self
      .account_key
      .as_ref()
      .expect("account key must be loaded before registering")
      .public_key_to_pem()
      .unwrap();
    self.calls.lock().unwrap().registrations.push((
      eab_key_id.to_string(),
      eab_mac_key.to_string(),
      email.to_string(),
      public,
    ));
    self.log("registered");
    Ok("https://acme.test/acct/1".to_string())
  }

  async fn create_order(
    &self,
    domains: &BTreeMap<String, ChallengeType>,
  ) -> Result<CreatedOrder<MockOrder>, Error> {
    let names: Vec<String> = domains.keys().cloned().collect();
    self.calls.lock().unwrap().orders.push(names.clone());
    let challenges = match &self.challenges {
      Some(challenges) => challenges.clone(),
      None => names.iter().map(|d| challenge_for(d)).collect(),
    };
    self.log("order created");
    Ok(CreatedOrder {
      order: MockOrder {
        domains: names,
        authorized: false,
      },
      challenges,
    })
  }

  async fn authorize_order(
    &self,
    order: &mut MockOrder,
  ) -> Result<(), Error> {
    if let Some(err) = &self.auth_error {
      return Err(
        ServerError {
          r#type: Some("urn:ietf:params:acme:error:unauthorized".to_string()),
          title: None,
          status: Some(403),
          detail: Some(err.clone()),
        }
        .into(),
      );
    }
    self.calls.lock().unwrap().authorized += 1;
    order.authorized = true;
    Ok(())
  }

  async fn authorization_status(
    &self,
    order: &MockOrder,
  ) -> Result<bool, Error> {
    Ok(order.authorized && self.auth_ready)
  }

  async fn finalize_order(
    &self,
    domains: &[String],
    _order: &MockOrder,
    private_key: &PKey<Private>,
  ) -> Result<String, Error> {
    self.calls.lock().unwrap().finalized.push(domains.to_vec());
    if let Some(chain) = &self.chain {
      return Ok(chain.clone());
    }
    Ok(mint_chain(&domains[0], private_key))
  }

  async fn revoke_certificate(&self, pem: &str) -> Result<(), Error> {
    self.calls.lock().unwrap().revoked.push(pem.to_string());
    Ok(())
  }

  fn set_logger(&mut self, logger: Logger) {
    self.logger = Some(logger);
  }
}

/// A leaf for `subject` over `key`, followed by the CA certificate that
/// signed it.
pub fn mint_chain(subject: &str, key: &PKey<Private>) -> String {
  let ca_key = gen_ec_private_key(256).unwrap();
  let mut ca_name = X509NameBuilder::new().unwrap();
  ca_name.append_entry_by_text("CN", ISSUER_CN).unwrap();
  let ca_name = ca_name.build();

  let mut ca = X509Builder::new().unwrap();
  ca.set_version(2).unwrap();
  ca.set_subject_name(&ca_name).unwrap();
  ca.set_issuer_name(&ca_name).unwrap();
  ca.set_pubkey(&ca_key).unwrap();
  ca.set_not_before(&Asn1Time::from_unix(NOT_BEFORE).unwrap())
    .unwrap();
  ca.set_not_after(&Asn1Time::from_unix(NOT_AFTER).unwrap())
    .unwrap();
  ca.sign(&ca_key, MessageDigest::sha256()).unwrap();
  let ca = ca.build();

  let mut name = X509NameBuilder::new().unwrap();
  name.append_entry_by_text("CN", subject).unwrap();
  let name = name.build();

  let mut leaf = X509Builder::new().unwrap();
  leaf.set_version(2).unwrap();
  leaf.set_subject_name(&name).unwrap();
  leaf.set_issuer_name(&ca_name).unwrap();
  leaf.set_pubkey(key).unwrap();
  leaf
    .set_not_before(&Asn1Time::from_unix(NOT_BEFORE).unwrap())
    .unwrap();
  leaf
    .set_not_after(&Asn1Time::from_unix(NOT_AFTER).unwrap())
    .unwrap();
  leaf.sign(&ca_key, MessageDigest::sha256()).unwrap();
  let leaf = leaf.build();

  let mut chain = String::from_utf8(leaf.to_pem().unwrap()).unwrap();
  chain.push_str(&String::from_utf8(ca.to_pem().unwrap()).unwrap());
  chain
}

/// A broker answering `GET /eab` with `body`. The server shuts down when
/// the guard is dropped.
pub async fn eab_broker(
  body: &str,
  expected_hits: usize,
) -> (ServerGuard, Mock, String) {
  let mut server = Server::new_async().await;
  let mock = server
    .mock("GET", "/eab")
    .with_status(200)
    .with_header("content-type", "application/json")
    .with_body(body)
    .expect(expected_hits)
    .create_async()
    .await;
  let url = format!("{}/eab", server.url());
  (server, mock, url)
}

pub fn config() -> Config {
  Config {
    email: "ops@example.com".to_string(),
    eab_key_id: Some("kid-1".to_string()),
    eab_key: Some("bWFjLWtleQ".to_string()),
    ..Config::default()
  }
}

pub fn domains(list: &[&str]) -> Vec<String> {
  list.iter().map(|d| d.to_string()).collect()
}
