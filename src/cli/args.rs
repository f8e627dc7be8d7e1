/// CLI argument parsing
use clap::{Args, Parser, Subcommand};

const LETS_ENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";
const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

#[derive(Parser)]
#[command(name = "acmeflow")]
#[command(about = "ACME v2 client for obtaining TLS certificates", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(global = true, short, long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Obtain a certificate
    Cert(CertArgs),

    /// Generate an account key and write it as PKCS#8 PEM
    CreateAccountKey(CreateAccountKeyArgs),

    /// Obtain a certificate, prompting for anything not given by flags
    Interactive(InteractiveArgs),
}

/// Which ACME environment to talk to
#[derive(Args, Clone)]
pub struct EnvironmentArgs {
    /// Use the Let's Encrypt staging environment (default)
    #[arg(long, conflicts_with_all = ["production", "directory"])]
    pub staging: bool,

    /// Use the Let's Encrypt production environment
    #[arg(long, conflicts_with = "directory")]
    pub production: bool,

    /// Use a custom ACME directory URL
    #[arg(long)]
    pub directory: Option<String>,
}

impl EnvironmentArgs {
    /// Resolve the directory URL for the selected environment
    pub fn directory_url(&self) -> String {
        if let Some(directory) = &self.directory {
            directory.clone()
        } else if self.production {
            LETS_ENCRYPT_PRODUCTION.to_string()
        } else {
            LETS_ENCRYPT_STAGING.to_string()
        }
    }
}

#[derive(Parser)]
pub struct CertArgs {
    /// Domain to include in the certificate; repeatable
    #[arg(short, long = "domain", required = true)]
    pub domains: Vec<String>,

    /// Contact email for the ACME account
    #[arg(short, long)]
    pub email: String,

    #[command(flatten)]
    pub environment: EnvironmentArgs,

    /// Output path for the certificate chain PEM
    #[arg(short, long, default_value = "certificate.pem")]
    pub output: String,

    /// Account key path (PKCS#8 PEM); created when missing
    #[arg(long)]
    pub account_key: Option<String>,

    /// Challenge type (http-01, dns-01)
    #[arg(long, default_value = "http-01")]
    pub challenge: String,

    /// Account key algorithm (p256, p384)
    #[arg(long, default_value = "p256")]
    pub account_algo: String,

    /// Certificate key algorithm (p256, p384)
    #[arg(long, default_value = "p256")]
    pub cert_algo: String,

    /// External account binding key ID
    #[arg(long, requires = "eab_hmac_key")]
    pub eab_kid: Option<String>,

    /// External account binding HMAC key (base64url)
    #[arg(long, requires = "eab_kid")]
    pub eab_hmac_key: Option<String>,

    /// Overwrite existing output files
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Parser)]
pub struct CreateAccountKeyArgs {
    /// Output path for the key
    #[arg(short, long, default_value = "account_key.pem")]
    pub output: String,

    /// Key algorithm (p256, p384)
    #[arg(long, default_value = "p256")]
    pub algo: String,
}

#[derive(Parser)]
pub struct InteractiveArgs {
    #[command(flatten)]
    pub environment: EnvironmentArgs,
}
