/// `interactive` command: prompt for whatever the flags did not provide
use crate::cli::args::{CertArgs, InteractiveArgs};
use crate::cli::commands::cert;
use crate::error::{AcmeError, Result};

pub async fn run(args: InteractiveArgs) -> Result<()> {
    println!("acmeflow interactive certificate request");
    println!();

    let domains = prompt("Domains (space separated)")?
        .split_whitespace()
        .map(str::to_string)
        .collect::<Vec<_>>();
    if domains.is_empty() {
        return Err(AcmeError::invalid_input("at least one domain is required"));
    }
    let email = prompt("Contact email")?;
    let challenge = prompt_with_default("Challenge type (http-01/dns-01)", "http-01")?;
    let output = prompt_with_default("Certificate output path", "certificate.pem")?;
    let account_key = prompt_with_default("Account key path (empty for ephemeral)", "")?;

    let cert_args = CertArgs {
        domains,
        email,
        environment: args.environment,
        output,
        account_key: if account_key.is_empty() {
            None
        } else {
            Some(account_key)
        },
        challenge,
        account_algo: "p256".to_string(),
        cert_algo: "p256".to_string(),
        eab_kid: None,
        eab_hmac_key: None,
        force: false,
    };

    cert::run(cert_args).await
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;

    print!("{}: ", label);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_with_default(label: &str, default: &str) -> Result<String> {
    let answer = if default.is_empty() {
        prompt(label)?
    } else {
        prompt(&format!("{} [{}]", label, default))?
    };
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer
    })
}
