use gts_acme::*;
use mockito::Mock;
use mockito::Server;
use mockito::ServerGuard;
use openssl::pkey::PKey;
use openssl::pkey::Private;
use serde_json::json;
use serde_json::Value;

pub const CHALLENGE_DETAIL: &str = "no TXT record found";

/// An ACME server answering from canned resources.
pub struct MockCa {
  pub server: ServerGuard,
  mocks: Vec<Mock>,
}

impl MockCa {
  /// A server with a directory and a nonce endpoint.
  pub async fn start() -> MockCa {
    let server = Server::new_async().await;
    let mut ca = MockCa {
      server,
      mocks: vec![],
    };

    let base = ca.server.url();
    let directory = json!({
      "newNonce": format!("{}/new-nonce", base),
      "newAccount": format!("{}/new-acct", base),
      "newOrder": format!("{}/new-order", base),
      "revokeCert": format!("{}/revoke-cert", base),
      "meta": { "externalAccountRequired": true }
    });
    let mock = ca
      .server
      .mock("GET", "/directory")
      .with_header("content-type", "application/json")
      .with_body(directory.to_string())
      .create_async()
      .await;
    ca.mocks.push(mock);

    let mock = ca
      .server
      .mock("HEAD", "/new-nonce")
      .with_header("replay-nonce", "bm9uY2U")
      .create_async()
      .await;
    ca.mocks.push(mock);
    ca
  }

  pub fn url(&self, path: &str) -> String {
    format!("{}{}", self.server.url(), path)
  }

  fn prepare_post(
    &mut self,
    path: &str,
    status: usize,
    location: Option<&str>,
    body: &str,
  ) -> Mock {
    let mut mock = self
      .server
      .mock("POST", path)
      .with_status(status)
      .with_header("content-type", "application/json")
      .with_body(body);
    if let Some(location) = location {
      mock = mock.with_header("location", &self.url(location));
    }
    mock
  }

  /// Answer `POST path` with `body`, expecting exactly one request.
  pub async fn post(
    &mut self,
    path: &str,
    status: usize,
    location: Option<&str>,
    body: &str,
  ) -> Mock {
    self
      .prepare_post(path, status, location, body)
      .create_async()
      .await
  }

  /// Answer `POST path` with `body`, expecting exactly `hits` requests.
  pub async fn post_times(
    &mut self,
    path: &str,
    body: &str,
    hits: usize,
  ) -> Mock {
    self
      .prepare_post(path, 200, None, body)
      .expect(hits)
      .create_async()
      .await
  }

  /// Serve a pending order at `/order/1` whose authorizations are the
  /// given resources, served at `/authz/1`, `/authz/2` and so on.
  pub async fn order(&mut self, authorizations: Vec<Value>) {
    let urls: Vec<String> = (1..=authorizations.len())
      .map(|n| self.url(&format!("/authz/{}", n)))
      .collect();
    let identifiers: Vec<Value> = authorizations
      .iter()
      .map(|a| a["identifier"].clone())
      .collect();
    let order = json!({
      "status": "pending",
      "identifiers": identifiers,
      "authorizations": urls,
      "finalize": self.url("/order/1/finalize"),
    });
    let mock = self
      .post("/new-order", 201, Some("/order/1"), &order.to_string())
      .await;
    self.mocks.push(mock);

    for (n, authorization) in authorizations.iter().enumerate() {
      let path = format!("/authz/{}", n + 1);
      let mock = self
        .post(&path, 200, None, &authorization.to_string())
        .await;
      self.mocks.push(mock);
    }
  }

  /// The order at `/order/1` in `status`.
  pub fn order_resource(&self, status: &str, certificate: bool) -> Value {
    let mut order = json!({
      "status": status,
      "identifiers": [{"type": "dns", "value": "www.example.com"}],
      "authorizations": [self.url("/authz/1")],
      "finalize": self.url("/order/1/finalize"),
    });
    if certificate {
      order["certificate"] = json!(self.url("/cert/1"));
    }
    order
  }

  /// A client signing with a fresh account key as account `/acct/1`.
  pub async fn client(&self, poll: PollConfig) -> AcmeClient {
    let mut client = self.anonymous_client(poll).await;
    client.set_account(self.url("/acct/1"));
    client
  }

  /// A client with an account key but no registered account.
  pub async fn anonymous_client(&self, poll: PollConfig) -> AcmeClient {
    let http_client = Config::default()
      .http_client_builder()
      .unwrap()
      .build()
      .unwrap();
    let directory = DirectoryBuilder::new(self.url("/directory"))
      .http_client(http_client)
      .build()
      .await
      .unwrap();
    let mut client = AcmeClient::new(directory, poll);
    client.load_account_key(account_key());
    client
  }
}

pub fn account_key() -> PKey<Private> {
  gen_ec_private_key(256).unwrap()
}

/// An authorization resource for `domain` with a single dns-01 challenge
/// at `/chall/{n}`. Invalid authorizations carry a challenge error.
pub fn authorization(
  ca: &MockCa,
  n: usize,
  domain: &str,
  status: &str,
) -> Value {
  let mut challenge = json!({
    "type": "dns-01",
    "url": ca.url(&format!("/chall/{}", n)),
    "status": status,
    "token": format!("token-{}", n),
  });
  if status == "invalid" {
    challenge["error"] = json!({
      "type": "urn:ietf:params:acme:error:dns",
      "detail": CHALLENGE_DETAIL,
      "status": 400,
    });
  }
  json!({
    "identifier": {"type": "dns", "value": domain},
    "status": status,
    "expires": "2026-10-25T00:00:00Z",
    "challenges": [challenge],
  })
}

pub fn fast_poll() -> PollConfig {
  PollConfig {
    interval_secs: 0,
    attempts: 2,
  }
}
