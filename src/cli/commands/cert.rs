/// `cert` command: obtain a certificate end to end
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::account::{AccountKeyPair, EabCredentials, KeyAlgorithm};
use crate::challenge::ChallengeSetup;
use crate::cli::args::CertArgs;
use crate::client::{AcmeClient, AcmeConfig};
use crate::error::{AcmeError, Result};
use crate::order::CertKeyAlgorithm;
use crate::types::{ChallengeType, Contact, Identifier};

pub async fn run(args: CertArgs) -> Result<()> {
    let challenge: ChallengeType = args
        .challenge
        .parse()
        .map_err(AcmeError::invalid_input)?;
    if challenge == ChallengeType::TlsAlpn01 {
        return Err(AcmeError::invalid_input(
            "tls-alpn-01 requires installing a certificate extension; use the library API",
        ));
    }
    let cert_algo: CertKeyAlgorithm = args
        .cert_algo
        .parse()
        .map_err(AcmeError::invalid_input)?;
    let account_algo: KeyAlgorithm = args
        .account_algo
        .parse()
        .map_err(AcmeError::invalid_input)?;

    let key_output = key_output_path(&args.output);
    if !args.force {
        for path in [args.output.as_str(), key_output.as_str()] {
            if Path::new(path).exists() {
                return Err(AcmeError::invalid_input(format!(
                    "{} already exists; pass --force to overwrite",
                    path
                )));
            }
        }
    }

    let key = load_or_create_account_key(args.account_key.as_deref(), account_algo)?;

    let mut config = AcmeConfig::new(args.environment.directory_url())
        .with_contact(Contact::email(&args.email))
        .with_tos_agreed(true);
    if let (Some(kid), Some(hmac_key)) = (args.eab_kid.clone(), args.eab_hmac_key.clone()) {
        config = config.with_eab(EabCredentials { kid, hmac_key });
    }

    let client = AcmeClient::new(config, Arc::new(key)).await?;
    let identifiers: Vec<Identifier> = args
        .domains
        .iter()
        .map(|domain| Identifier::detect(domain.as_str()))
        .collect();

    let result = client
        .issue_certificate(identifiers, challenge, cert_algo, print_instructions, wait_for_operator)
        .await;
    client.shutdown().await;
    let bundle = result?;

    std::fs::write(&args.output, &bundle.certificate_pem)?;
    std::fs::write(&key_output, &bundle.private_key_pem)?;
    info!(cert = %args.output, key = %key_output, "certificate saved");
    println!("Certificate written to {}", args.output);
    println!("Private key written to {}", key_output);
    Ok(())
}

/// Private key lands next to the certificate with a `.key` extension
fn key_output_path(cert_output: &str) -> String {
    let path = Path::new(cert_output);
    path.with_extension("key").to_string_lossy().into_owned()
}

fn load_or_create_account_key(
    path: Option<&str>,
    algorithm: KeyAlgorithm,
) -> Result<AccountKeyPair> {
    match path {
        Some(path) if Path::new(path).exists() => {
            info!(path, "loading account key");
            AccountKeyPair::from_pkcs8_pem(&std::fs::read_to_string(path)?)
        }
        Some(path) => {
            let key = AccountKeyPair::generate(algorithm)?;
            std::fs::write(path, key.to_pkcs8_pem())?;
            info!(path, %algorithm, "account key created");
            Ok(key)
        }
        // No path given: one-shot ephemeral key
        None => AccountKeyPair::generate(algorithm),
    }
}

async fn print_instructions(setup: ChallengeSetup) -> Result<()> {
    match setup.challenge_type {
        ChallengeType::Http01 => {
            println!();
            println!("Serve the following file for {}:", setup.identifier);
            println!("  URL:     {}", setup.target);
            println!("  Content: {}", setup.value);
        }
        ChallengeType::Dns01 => {
            println!();
            println!("Create the following TXT record for {}:", setup.identifier);
            println!("  Name:  {}", setup.target);
            println!("  Value: {}", setup.value);
        }
        ChallengeType::TlsAlpn01 => unreachable!("rejected before issuance"),
    }
    Ok(())
}

async fn wait_for_operator(_setup: ChallengeSetup) -> Result<()> {
    println!("Press Enter once the record is published and visible...");
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| ())
    })
    .await
    .map_err(|e| AcmeError::invalid_input(format!("stdin prompt failed: {}", e)))??;
    Ok(())
}
