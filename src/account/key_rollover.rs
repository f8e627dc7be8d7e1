/// Account key rollover (RFC 8555 section 7.3.5)
use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::account::credentials::AccountKeyPair;
use crate::account::manager::{AccountManager, Addressing};
use crate::error::{AcmeError, Result};
use crate::protocol::jws::JwsSigner;
use crate::transport::EndpointClass;

/// Rolls an account over to a new key pair.
///
/// The outer JWS is signed by the current account key and addressed by key
/// ID; its payload is an inner JWS signed by the new key with the new JWK
/// embedded. After a successful rollover the caller must rebuild its client
/// around the new key; this manager keeps signing with the old one.
pub struct KeyRollover<'a> {
    account: &'a AccountManager,
    new_key: Arc<AccountKeyPair>,
}

impl<'a> KeyRollover<'a> {
    /// Create a rollover for the given replacement key
    pub fn new(account: &'a AccountManager, new_key: Arc<AccountKeyPair>) -> Self {
        Self { account, new_key }
    }

    /// Execute the rollover at the CA
    pub async fn execute(&self) -> Result<()> {
        let directory = self.account.directory().get().await?;
        let key_change_url = directory.key_change.ok_or_else(|| {
            AcmeError::configuration("CA does not advertise a keyChange endpoint")
        })?;

        let kid = self.account.require_key_id().await?;
        let inner_payload = json!({
            "account": kid,
            "oldKey": self.account.signer().key().public_jwk()?.to_value()?,
        });
        let inner = JwsSigner::sign_rollover_inner(&self.new_key, &key_change_url, &inner_payload)?;

        self.account
            .signed_post(
                &key_change_url,
                Some(serde_json::to_value(&inner)?),
                Addressing::KeyId(kid),
                EndpointClass::KeyChange,
            )
            .await?;

        info!("account key rolled over");
        Ok(())
    }

    /// The replacement key pair
    pub fn new_key(&self) -> &AccountKeyPair {
        &self.new_key
    }
}
