//! Registrable domain ("zone apex") derivation for challenge record names.

/// Public suffixes that span two labels. Names under these register one
/// label deeper than under a plain TLD.
const MULTI_LABEL_SUFFIXES: &[&str] = &[
  "ac.cn", "com.cn", "edu.cn", "gov.cn", "net.cn", "org.cn", "com.hk",
  "net.hk", "org.hk", "com.tw", "net.tw", "org.tw", "com.mo", "ac.uk",
  "co.uk", "gov.uk", "ltd.uk", "me.uk", "net.uk", "org.uk", "plc.uk",
  "ac.jp", "co.jp", "ne.jp", "or.jp", "co.kr", "or.kr", "com.au", "net.au",
  "org.au", "edu.au", "co.nz", "net.nz", "org.nz", "com.sg", "com.my",
  "co.in", "net.in", "org.in", "co.id", "com.br", "net.br", "com.ar",
  "com.mx", "co.za", "com.tr", "com.ru", "com.ua",
];

/// Returns the registrable domain a DNS provider would manage for
/// `fqdn`, e.g. `example.com` for `_acme-challenge.www.example.com` and
/// `example.co.uk` for `_acme-challenge.example.co.uk`.
///
/// The result is lowercase, without a trailing root dot or a leading
/// wildcard label.
pub fn main_domain_of(fqdn: &str) -> String {
  let lowered = fqdn.trim().trim_end_matches('.').to_ascii_lowercase();
  let name = lowered.strip_prefix("*.").unwrap_or(lowered.as_str());

  let labels: Vec<&str> = name.split('.').filter(|l| !l.is_empty()).collect();
  if labels.len() <= 2 {
    return labels.join(".");
  }

  let last_two = labels[labels.len() - 2..].join(".");
  let keep = if MULTI_LABEL_SUFFIXES.contains(&last_two.as_str()) {
    3
  } else {
    2
  };
  labels[labels.len() - keep..].join(".")
}

/// The record name of `record_key` relative to `zone`, or `None` when the
/// key does not live under the zone. The apex itself is named `@`.
pub fn relative_name(record_key: &str, zone: &str) -> Option<String> {
  let key = record_key.trim_end_matches('.');
  if key.eq_ignore_ascii_case(zone) {
    return Some("@".to_string());
  }
  let split = key.len().checked_sub(zone.len() + 1)?;
  if !key.is_char_boundary(split) {
    return None;
  }
  let (name, suffix) = key.split_at(split);
  let suffix = suffix.strip_prefix('.')?;
  if name.is_empty() || !suffix.eq_ignore_ascii_case(zone) {
    return None;
  }
  Some(name.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plain_tld() {
    assert_eq!(
      main_domain_of("_acme-challenge.sub.example.com"),
      "example.com"
    );
    assert_eq!(main_domain_of("_acme-challenge.example.com"), "example.com");
    assert_eq!(main_domain_of("example.com"), "example.com");
    assert_eq!(main_domain_of("Example.COM."), "example.com");
  }

  #[test]
  fn multi_label_suffix() {
    assert_eq!(
      main_domain_of("_acme-challenge.www.example.co.uk"),
      "example.co.uk"
    );
    assert_eq!(
      main_domain_of("_acme-challenge.shop.example.com.cn"),
      "example.com.cn"
    );
    assert_eq!(main_domain_of("co.uk"), "co.uk");
  }

  #[test]
  fn wildcard_prefix_is_ignored() {
    assert_eq!(main_domain_of("*.a.example.org"), "example.org");
  }

  #[test]
  fn records_in_same_zone_group_together() {
    assert_eq!(
      main_domain_of("_acme-challenge.sub.example.com"),
      main_domain_of("_acme-challenge.example.com")
    );
  }

  #[test]
  fn relative_names() {
    assert_eq!(
      relative_name("_acme-challenge.sub.example.com", "example.com")
        .as_deref(),
      Some("_acme-challenge.sub")
    );
    assert_eq!(
      relative_name("_acme-challenge.example.com.", "example.com").as_deref(),
      Some("_acme-challenge")
    );
    assert_eq!(
      relative_name("example.com", "example.com").as_deref(),
      Some("@")
    );
    for outside in [
      "_acme-challenge.example.net",
      "_acme-challenge.notexample.com",
    ] {
      assert_eq!(relative_name(outside, "example.com"), None);
    }
    assert_eq!(relative_name("com", "example.com"), None);
  }
}
