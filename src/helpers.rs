use crate::error::*;
use data_encoding::BASE64URL_NOPAD;
use openssl::ec::EcGroup;
use openssl::ec::EcKey;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::pkey::Private;
use openssl::rsa::Rsa;
use serde::Deserialize;
use serde::Serialize;

/// This is a identifier for a resource that the ACME server
/// can provision certificates for (a domain).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
  /// The type of identifier.
  #[serde(rename = "type")]
  pub typ: String,
  /// The identifier itself.
  pub value: String,
}

pub(crate) fn b64(data: &[u8]) -> String {
  BASE64URL_NOPAD.encode(data)
}

/// Generate a new RSA private key using the specified size,
/// using the system random.
pub fn gen_rsa_private_key(bits: u32) -> Result<PKey<Private>, Error> {
  let rsa = Rsa::generate(bits)?;
  let key = PKey::from_rsa(rsa)?;
  Ok(key)
}

/// Generate a new EC private key on the NIST curve with the given size in
/// bits (256, 384 or 521).
pub fn gen_ec_private_key(curve_bits: u32) -> Result<PKey<Private>, Error> {
  let nid = match curve_bits {
    256 => Nid::X9_62_PRIME256V1,
    384 => Nid::SECP384R1,
    521 => Nid::SECP521R1,
    other => {
      return Err(Error::validation(format!(
        "unsupported EC curve size {}",
        other
      )))
    }
  };
  let group = EcGroup::from_curve_name(nid)?;
  let ec = EcKey::generate(&group)?;
  let key = PKey::from_ec_key(ec)?;
  Ok(key)
}

/// Build the HMAC key used to sign an External Account Binding from the
/// base64url encoded MAC key handed out by the CA. Trailing padding is
/// tolerated.
pub fn eab_hmac_key(mac_key: &str) -> Result<PKey<Private>, Error> {
  let trimmed = mac_key.trim().trim_end_matches('=');
  let value = BASE64URL_NOPAD.decode(trimmed.as_bytes()).map_err(|_| {
    Error::validation("EAB MAC key is not valid base64url")
  })?;
  Ok(PKey::hmac(&value)?)
}
