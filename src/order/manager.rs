/// Order lifecycle management
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info};

use crate::account::manager::{AccountManager, Addressing};
use crate::challenge::{ChallengeSetup, prepare_challenge};
use crate::crypto::Base64Encoding;
use crate::error::{AcmeError, Result};
use crate::order::objects::{FinalizationRequest, NewOrderRequest, Order};
use crate::protocol::problem::{ProblemKind, ServerProblem, map_problem};
use crate::transport::EndpointClass;
use crate::types::{
    AuthorizationStatus, ChallengeStatus, ChallengeType, Identifier, OrderStatus,
    RevocationReason,
};

/// Polling cadence for order status
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Maximum polls before giving up
    pub max_attempts: u32,
    /// Delay between polls when the server sends no `Retry-After`
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(5),
        }
    }
}

/// Order engine: creates orders, walks authorizations, notifies challenges,
/// finalizes with a CSR and downloads the issued chain
pub struct OrderManager {
    account: Arc<AccountManager>,
    poll: PollPolicy,
}

impl OrderManager {
    /// Create an order manager for a registered account
    pub fn new(account: Arc<AccountManager>) -> Self {
        Self {
            account,
            poll: PollPolicy::default(),
        }
    }

    /// Override the polling cadence
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Create a new order for the given identifiers.
    ///
    /// The `Location` response header becomes `order.url`.
    pub async fn create_order(&self, identifiers: &[Identifier]) -> Result<Order> {
        let directory = self.account.directory().get().await?;
        let kid = self.account.require_key_id().await?;

        let request = NewOrderRequest::new(identifiers.to_vec());
        let response = self
            .account
            .signed_post(
                &directory.new_order,
                Some(serde_json::to_value(&request)?),
                Addressing::KeyId(kid),
                EndpointClass::NewOrder,
            )
            .await?;

        let order_url = response
            .header("location")
            .ok_or_else(|| AcmeError::protocol("Missing Location header in order response"))?
            .to_string();

        let mut order: Order = response.json()?;
        order.url = order_url;
        info!(url = %order.url, status = %order.status, "order created");
        Ok(order)
    }

    /// Walk the order's authorizations for one challenge type.
    ///
    /// For each pending authorization the publication data is computed, the
    /// caller's `prepare` callback publishes it, `wait_for` confirms
    /// readiness, and the server is notified with an empty JSON object,
    /// never the key authorization. Valid authorizations and challenges
    /// already `processing` are skipped; embedded validation errors are
    /// mapped and raised before any notification. Afterwards the order is
    /// polled until `ready` or `valid`.
    pub async fn solve_challenge<P, PF, W, WF>(
        &self,
        order: &Order,
        challenge_type: ChallengeType,
        prepare: P,
        wait_for: W,
    ) -> Result<Order>
    where
        P: Fn(ChallengeSetup) -> PF,
        PF: Future<Output = Result<()>>,
        W: Fn(ChallengeSetup) -> WF,
        WF: Future<Output = Result<()>>,
    {
        let kid = self.account.require_key_id().await?;

        for auth_url in &order.authorizations {
            let auth: crate::order::objects::Authorization =
                self.account.fetch(auth_url).await?;

            match auth.status {
                AuthorizationStatus::Valid => {
                    debug!(identifier = %auth.identifier, "authorization already valid");
                    continue;
                }
                AuthorizationStatus::Pending => {}
                status => {
                    if let Some(problem) = auth.embedded_error() {
                        return Err(map_problem(problem, None));
                    }
                    return Err(AcmeError::protocol(format!(
                        "authorization for {} is {}",
                        auth.identifier, status
                    )));
                }
            }

            // A failed validation leaves its error on the challenge; raise it
            // instead of re-notifying
            if let Some(problem) = auth.embedded_error() {
                return Err(map_problem(problem, None));
            }

            let challenge = auth.challenge(challenge_type).ok_or_else(|| {
                AcmeError::ChallengeNotFound {
                    challenge_type: challenge_type.to_string(),
                    identifier: auth.identifier.value.clone(),
                }
            })?;

            match challenge.status {
                ChallengeStatus::Valid => {
                    debug!(identifier = %auth.identifier, "challenge already valid");
                    continue;
                }
                ChallengeStatus::Processing => {
                    debug!(identifier = %auth.identifier, "challenge already processing");
                    continue;
                }
                ChallengeStatus::Invalid => {
                    if let Some(problem) = &challenge.error {
                        return Err(map_problem(problem, None));
                    }
                    return Err(AcmeError::protocol(format!(
                        "challenge for {} is invalid",
                        auth.identifier
                    )));
                }
                ChallengeStatus::Pending => {}
            }

            let key_auth = self.account.key_authorization(&challenge.token)?;
            let setup =
                prepare_challenge(challenge_type, &auth.identifier, &challenge.token, &key_auth);

            info!(publish_at = %setup.target, identifier = %auth.identifier, "publishing challenge response");
            prepare(setup.clone()).await?;
            wait_for(setup).await?;

            self.account
                .signed_post(
                    &challenge.url,
                    Some(json!({})),
                    Addressing::KeyId(kid.clone()),
                    EndpointClass::Challenge,
                )
                .await?;
            info!(identifier = %auth.identifier, "challenge validation requested");
        }

        self.wait_order(
            &order.url,
            &[OrderStatus::Ready, OrderStatus::Valid],
            self.poll.max_attempts,
            self.poll.interval,
        )
        .await
    }

    /// Poll the order URL until its status reaches one of `targets`.
    ///
    /// A server `Retry-After` overrides the configured interval. An order
    /// that turns `invalid` raises its embedded error immediately.
    pub async fn wait_order(
        &self,
        order_url: &str,
        targets: &[OrderStatus],
        max_attempts: u32,
        interval: Duration,
    ) -> Result<Order> {
        let mut last_status = None;

        for attempt in 1..=max_attempts {
            let response = self.account.fetch_response(order_url).await?;
            let mut order: Order = response.json()?;
            order.url = order_url.to_string();

            if targets.contains(&order.status) {
                debug!(status = %order.status, attempt, "order reached target status");
                return Ok(order);
            }
            if order.status == OrderStatus::Invalid {
                if let Some(problem) = &order.error {
                    return Err(map_problem(problem, None));
                }
                return Err(AcmeError::protocol(format!(
                    "order {} became invalid",
                    order_url
                )));
            }

            last_status = Some(order.status);
            if attempt < max_attempts {
                let delay = response.retry_after().unwrap_or(interval);
                debug!(status = %order.status, attempt, delay_ms = delay.as_millis() as u64, "order not ready, polling");
                tokio::time::sleep(delay).await;
            }
        }

        Err(AcmeError::OrderTimeout {
            target: targets
                .iter()
                .map(OrderStatus::as_str)
                .collect::<Vec<_>>()
                .join("|"),
            attempts: max_attempts,
            last_status: last_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Finalize a `ready` order with a DER-encoded CSR.
    ///
    /// The returned order keeps the original order URL.
    pub async fn finalize(&self, order: &Order, csr_der: &[u8]) -> Result<Order> {
        match order.status {
            OrderStatus::Ready => {}
            OrderStatus::Pending => {
                return Err(AcmeError::Server(ServerProblem::local(
                    ProblemKind::OrderNotReady,
                    "order authorizations are not complete yet",
                )));
            }
            status => {
                return Err(AcmeError::protocol(format!(
                    "cannot finalize an order in status {}",
                    status
                )));
            }
        }

        let finalize_url = order
            .finalize
            .as_deref()
            .ok_or(AcmeError::MissingFinalizeUrl)?;
        let kid = self.account.require_key_id().await?;

        let payload = FinalizationRequest {
            csr: Base64Encoding::encode(csr_der),
        };
        let response = self
            .account
            .signed_post(
                finalize_url,
                Some(serde_json::to_value(&payload)?),
                Addressing::KeyId(kid),
                EndpointClass::Finalize,
            )
            .await?;

        let mut updated: Order = response.json()?;
        updated.url = order.url.clone();
        info!(status = %updated.status, "order finalized");
        Ok(updated)
    }

    /// Download the certificate chain of a `valid` order as PEM text,
    /// returned unchanged (leaf first, then intermediates)
    pub async fn download_certificate(&self, order: &Order) -> Result<String> {
        if order.status != OrderStatus::Valid {
            return Err(AcmeError::protocol(format!(
                "cannot download a certificate for an order in status {}",
                order.status
            )));
        }
        let url = order
            .certificate
            .as_deref()
            .ok_or(AcmeError::MissingCertificateUrl)?;

        let response = self.account.fetch_response(url).await?;
        let pem = response.text()?;
        info!(bytes = pem.len(), "certificate chain downloaded");
        Ok(pem)
    }

    /// Revoke a certificate by its DER encoding
    pub async fn revoke_certificate(
        &self,
        cert_der: &[u8],
        reason: Option<RevocationReason>,
    ) -> Result<()> {
        let directory = self.account.directory().get().await?;
        let kid = self.account.require_key_id().await?;

        let mut payload = json!({ "certificate": Base64Encoding::encode(cert_der) });
        if let Some(reason) = reason {
            payload["reason"] = json!(reason.as_u8());
        }

        self.account
            .signed_post(
                &directory.revoke_cert,
                Some(payload),
                Addressing::KeyId(kid),
                EndpointClass::Revoke,
            )
            .await?;
        info!("certificate revoked");
        Ok(())
    }
}
