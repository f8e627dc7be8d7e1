/// `create-account-key` command
use std::path::Path;

use tracing::info;

use crate::account::{AccountKeyPair, KeyAlgorithm};
use crate::cli::args::CreateAccountKeyArgs;
use crate::error::{AcmeError, Result};

pub fn run(args: CreateAccountKeyArgs) -> Result<()> {
    let algorithm: KeyAlgorithm = args.algo.parse().map_err(AcmeError::invalid_input)?;

    if Path::new(&args.output).exists() {
        return Err(AcmeError::invalid_input(format!(
            "{} already exists; refusing to overwrite an account key",
            args.output
        )));
    }

    let key = AccountKeyPair::generate(algorithm)?;
    std::fs::write(&args.output, key.to_pkcs8_pem())?;

    info!(path = %args.output, %algorithm, "account key created");
    println!("Account key ({}) written to {}", algorithm, args.output);
    Ok(())
}
