use crate::error::*;
use openssl::asn1::Asn1Time;
use openssl::asn1::Asn1TimeRef;
use openssl::nid::Nid;
use openssl::x509::X509NameRef;
use openssl::x509::X509;

/// Metadata of the leaf certificate of an issued chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
  pub issuer_cn: String,
  pub subject_cn: String,
  /// notBefore, in seconds since the Unix epoch.
  pub valid_from: i64,
  /// notAfter, in seconds since the Unix epoch.
  pub valid_to: i64,
}

fn common_name(name: &X509NameRef) -> Result<String, Error> {
  match name.entries_by_nid(Nid::COMMONNAME).next() {
    Some(entry) => Ok(
      entry
        .data()
        .as_utf8()
        .map_err(|e| Error::CertParse(e.to_string()))?
        .to_string(),
    ),
    None => Ok(String::new()),
  }
}

fn unix_time(time: &Asn1TimeRef) -> Result<i64, Error> {
  let epoch = Asn1Time::from_unix(0)?;
  let diff = epoch.diff(time)?;
  Ok(i64::from(diff.days) * 86_400 + i64::from(diff.secs))
}

/// Parse the first (leaf) certificate of a PEM encoded chain.
pub fn parse_leaf(full_chain_pem: &str) -> Result<CertificateInfo, Error> {
  let chain = X509::stack_from_pem(full_chain_pem.as_bytes())
    .map_err(|e| Error::CertParse(e.to_string()))?;
  let leaf = chain
    .first()
    .ok_or_else(|| Error::CertParse("no certificate in chain".to_string()))?;

  Ok(CertificateInfo {
    issuer_cn: common_name(leaf.issuer_name())?,
    subject_cn: common_name(leaf.subject_name())?,
    valid_from: unix_time(leaf.not_before())?,
    valid_to: unix_time(leaf.not_after())?,
  })
}
