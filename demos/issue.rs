use anyhow::Context;
use gts_acme::Config;
use gts_acme::DnsRecordType;
use gts_acme::KeyType;
use gts_acme::Mode;
use gts_acme::OrderController;
use std::sync::Arc;
use std::time::Duration;

fn env(name: &str) -> anyhow::Result<String> {
  std::env::var(name).with_context(|| format!("{} is not set", name))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();

  // Talk to the staging environment. EAB credentials for it can be
  // created in the Google Cloud console.
  let config = Config {
    mode: Mode::Staging,
    email: env("GTS_EMAIL")?,
    eab_key_id: Some(env("GTS_EAB_KEY_ID")?),
    eab_key: Some(env("GTS_EAB_KEY")?),
    emit_caa_records: true,
    ..Config::default()
  };
  let domains: Vec<String> = env("GTS_DOMAINS")?
    .split(',')
    .map(|d| d.trim().to_string())
    .collect();

  let mut controller = OrderController::connect(config, None).await?;
  controller.set_logger(Arc::new(|line: &str| println!("acme: {}", line)));

  // Register a fresh account. For production purposes, you should keep
  // the returned key and key id, and pass them back in as an
  // `ExternalAccount` when renewing.
  let account = controller.register().await?;
  println!("account: {}", account.key_id);

  let (mut order, dns) = controller
    .create_order(&domains, KeyType::Ecc, None)
    .await?;

  for (zone, records) in &dns {
    for record in records {
      let typ = match record.record_type {
        DnsRecordType::Txt => "TXT",
        DnsRecordType::Caa => "CAA",
      };
      println!("{}\t{}\t{}\t{}", zone, record.name, typ, record.value);
    }
  }
  println!("Publish the records above, then press enter.");
  std::io::stdin().read_line(&mut String::new())?;

  controller.auth_order(&domains, &mut order).await?;
  while !controller.get_auth_status(&domains, &order).await? {
    tokio::time::sleep(Duration::from_secs(5)).await;
  }

  let cert = controller
    .finalize_order(&domains, &order, KeyType::Ecc, None)
    .await?;
  println!(
    "issued by {} for {}, valid until {}",
    cert.issuer_cn, cert.subject_cn, cert.valid_to
  );
  print!("{}", cert.full_chain_pem);
  print!("{}", cert.private_key_pem()?);

  Ok(())
}
