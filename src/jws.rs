use crate::error::*;
use crate::helpers::*;
use openssl::bn::BigNum;
use openssl::bn::BigNumContext;
use openssl::ecdsa::EcdsaSig;
use openssl::hash::hash;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::Id;
use openssl::pkey::PKey;
use openssl::pkey::Private;
use openssl::sign::Signer;
use serde::Serialize;

#[derive(Serialize, Clone, Default)]
struct JwsHeader {
  #[serde(skip_serializing_if = "Option::is_none")]
  nonce: Option<String>,
  alg: String,
  url: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  kid: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  jwk: Option<Jwk>,
}

/// The public half of an account key. Members are declared in
/// lexicographic order so the serialized form is the RFC 7638 input.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub(crate) enum Jwk {
  Ec {
    crv: String,
    kty: String,
    x: String,
    y: String,
  },
  Rsa {
    e: String,
    kty: String,
    n: String,
  },
}

/// A flattened JWS, ready to be used as a request body or embedded
/// as an External Account Binding.
#[derive(Serialize, Debug, Clone)]
pub(crate) struct Jws {
  protected: String,
  payload: String,
  signature: String,
}

struct EcParams {
  crv: &'static str,
  alg: &'static str,
  digest: MessageDigest,
  size: i32,
}

fn ec_params(pkey: &PKey<Private>) -> Result<EcParams, Error> {
  let ec = pkey.ec_key()?;
  match ec.group().curve_name() {
    Some(Nid::X9_62_PRIME256V1) => Ok(EcParams {
      crv: "P-256",
      alg: "ES256",
      digest: MessageDigest::sha256(),
      size: 32,
    }),
    Some(Nid::SECP384R1) => Ok(EcParams {
      crv: "P-384",
      alg: "ES384",
      digest: MessageDigest::sha384(),
      size: 48,
    }),
    Some(Nid::SECP521R1) => Ok(EcParams {
      crv: "P-521",
      alg: "ES512",
      digest: MessageDigest::sha512(),
      size: 66,
    }),
    _ => Err(Error::validation("unsupported EC curve for signing")),
  }
}

impl Jwk {
  pub fn new(pkey: &PKey<Private>) -> Result<Jwk, Error> {
    match pkey.id() {
      Id::RSA => {
        let rsa = pkey.rsa()?;
        Ok(Jwk::Rsa {
          e: b64(&rsa.e().to_vec()),
          kty: "RSA".to_string(),
          n: b64(&rsa.n().to_vec()),
        })
      }
      Id::EC => {
        let params = ec_params(pkey)?;
        let ec = pkey.ec_key()?;
        let mut ctx = BigNumContext::new()?;
        let mut x = BigNum::new()?;
        let mut y = BigNum::new()?;
        ec.public_key()
          .affine_coordinates(ec.group(), &mut x, &mut y, &mut ctx)?;
        Ok(Jwk::Ec {
          crv: params.crv.to_string(),
          kty: "EC".to_string(),
          x: b64(&x.to_vec_padded(params.size)?),
          y: b64(&y.to_vec_padded(params.size)?),
        })
      }
      _ => Err(Error::validation("unsupported account key type")),
    }
  }

  /// The RFC 7638 thumbprint of this key.
  pub fn thumbprint(&self) -> Result<String, Error> {
    let json = serde_json::to_string(self)?;
    Ok(b64(&hash(MessageDigest::sha256(), json.as_bytes())?))
  }
}

fn algorithm(pkey: &PKey<Private>) -> Result<&'static str, Error> {
  match pkey.id() {
    Id::RSA => Ok("RS256"),
    Id::HMAC => Ok("HS256"),
    Id::EC => Ok(ec_params(pkey)?.alg),
    _ => Err(Error::validation("unsupported signing key type")),
  }
}

fn sign(pkey: &PKey<Private>, input: &[u8]) -> Result<Vec<u8>, Error> {
  match pkey.id() {
    Id::EC => {
      let params = ec_params(pkey)?;
      let mut signer = Signer::new(params.digest, pkey)?;
      signer.update(input)?;
      // JWS wants the raw r || s form, openssl hands out DER.
      let der = signer.sign_to_vec()?;
      let sig = EcdsaSig::from_der(&der)?;
      let mut raw = sig.r().to_vec_padded(params.size)?;
      raw.extend(sig.s().to_vec_padded(params.size)?);
      Ok(raw)
    }
    _ => {
      let mut signer = Signer::new(MessageDigest::sha256(), pkey)?;
      signer.update(input)?;
      Ok(signer.sign_to_vec()?)
    }
  }
}

pub(crate) fn jws(
  url: &str,
  nonce: Option<String>,
  payload: &str,
  pkey: &PKey<Private>,
  account_id: Option<String>,
) -> Result<Jws, Error> {
  let payload_b64 = b64(payload.as_bytes());

  let mut header = JwsHeader {
    nonce,
    alg: algorithm(pkey)?.to_string(),
    url: url.to_string(),
    ..Default::default()
  };

  if let Some(kid) = account_id {
    header.kid = Some(kid);
  } else {
    header.jwk = Some(Jwk::new(pkey)?);
  }

  let protected_b64 = b64(&serde_json::to_string(&header)?.into_bytes());
  let signature =
    sign(pkey, format!("{}.{}", protected_b64, payload_b64).as_bytes())?;

  Ok(Jws {
    protected: protected_b64,
    payload: payload_b64,
    signature: b64(&signature),
  })
}
