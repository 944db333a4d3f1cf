//! The payment context: the single writer of [`PaymentSessionState`].
//!
//! Every action takes the state lock only long enough to validate and claim
//! a ticket, releases it across wallet and network I/O, and re-takes it to
//! apply the result. Tickets carry the generation they were issued under;
//! a result arriving after a disconnect, reconnect or new fetch is discarded
//! with [`PaymentError::SessionChanged`].

use alloy_primitives::Address;
use tokio::sync::Mutex;
#[cfg(feature = "telemetry")]
use tracing::instrument;
use treasury402::PaymentError;
use treasury402::networks::{Currency, NetworkId, NetworkRegistry};
use treasury402::proto::{
    ChallengeBody, PaymentChallenge, PaymentProofHeader, TRANSFER_WITH_AUTHORIZATION, TypedData,
};
use treasury402::session::{
    ActiveChallenge, FetchTicket, PaymentPhase, PaymentSessionState, PaymentSummary, PaymentTicket,
    SessionView,
};
use treasury402::wallet::{WalletHost, WalletKind, active_account, connect, locate, sign_typed_data};
use treasury402_evm::{TransferAuthorizationParams, build_transfer_authorization, recover_signer};

use crate::client::{FetchedChallenge, NegotiationClient};

/// Imperative surface of the unlock flow.
#[derive(Debug)]
pub struct PaymentContext {
    state: Mutex<PaymentSessionState>,
    registry: NetworkRegistry,
    host: WalletHost,
    client: NegotiationClient,
}

impl PaymentContext {
    /// Creates an idle context. The initial network is the home network of
    /// the user's last sign-in method, as reported by the client's auth session.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Registry`] if that network is not in `registry`.
    pub fn new(
        registry: NetworkRegistry,
        host: WalletHost,
        client: NegotiationClient,
    ) -> Result<Self, PaymentError> {
        let last_auth_method = client.auth().last_auth_method();
        let state = PaymentSessionState::for_auth_method(&registry, last_auth_method.as_deref())?;
        Ok(Self {
            state: Mutex::new(state),
            registry,
            host,
            client,
        })
    }

    /// The network/asset registry in use.
    #[must_use]
    pub const fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    /// The negotiation client in use.
    #[must_use]
    pub const fn client(&self) -> &NegotiationClient {
        &self.client
    }

    /// Locates and connects a wallet of `kind`, replacing any current wallet.
    ///
    /// Failures are returned to the caller and leave the session as it was.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::WalletNotInstalled`] if the host has no such provider
    /// - [`PaymentError::NoAccountSelected`] if the user declines or has no account
    /// - [`PaymentError::Provider`] for other wallet failures
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(kind = %kind)))]
    pub async fn connect_wallet(&self, kind: WalletKind) -> Result<Address, PaymentError> {
        let provider = locate(&self.host, kind)?;
        let session = connect(provider, kind, &self.registry).await?;
        let address = session.address;
        self.state.lock().await.connected(session);
        Ok(address)
    }

    /// Drops the wallet, the challenge and any signature together.
    /// An operation still in flight finishes with [`PaymentError::SessionChanged`].
    pub async fn disconnect_wallet(&self) {
        self.state.lock().await.disconnect();

        #[cfg(feature = "telemetry")]
        tracing::info!("wallet disconnected");
    }

    /// Switches the selected network.
    ///
    /// # Errors
    ///
    /// See [`PaymentSessionState::select_network`].
    pub async fn select_network(&self, network: NetworkId) -> Result<(), PaymentError> {
        self.state.lock().await.select_network(&self.registry, network)
    }

    /// Switches the selected currency.
    ///
    /// # Errors
    ///
    /// See [`PaymentSessionState::select_currency`].
    pub async fn select_currency(&self, currency: Currency) -> Result<(), PaymentError> {
        self.state.lock().await.select_currency(&self.registry, currency)
    }

    /// Selects `network` and fetches the payment challenge for `resource_id`
    /// on it. Any earlier challenge is discarded first.
    ///
    /// Typed-data challenges get `message.from` set to the connected address
    /// and an `EIP712Domain` type before they are stored, so the stored
    /// bundle is exactly what will be signed. The stored challenge records
    /// the token it charges and that token becomes the selected currency.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::WalletNotConnected`] without a wallet, before any I/O
    /// - [`PaymentError::PaymentInProgress`] while a payment is outstanding
    /// - [`PaymentError::Registry`] if `network` is unknown
    /// - [`PaymentError::ChallengeFetchFailed`] if the server does not produce a usable challenge
    /// - [`PaymentError::SessionChanged`] if the session moved on meanwhile
    #[cfg_attr(
        feature = "telemetry",
        instrument(skip_all, err, fields(network = %network, resource_id = %resource_id))
    )]
    pub async fn fetch_payment_info(
        &self,
        network: &NetworkId,
        resource_id: &str,
    ) -> Result<PaymentChallenge, PaymentError> {
        let ticket = {
            let mut state = self.state.lock().await;
            if state.wallet().is_none() {
                return Err(PaymentError::WalletNotConnected);
            }
            state.select_network(&self.registry, network.clone())?;
            state.begin_fetch(resource_id)?
        };
        let generation = ticket.generation;

        let challenge = match self.negotiate(&ticket).await {
            Ok(challenge) => challenge,
            Err(err) => return Err(self.state.lock().await.fail(generation, err)),
        };
        let view = challenge.view.clone();
        self.state
            .lock()
            .await
            .challenge_received(generation, challenge)?;

        #[cfg(feature = "telemetry")]
        tracing::info!(amount = %view.amount, pay_to = %view.pay_to, "payment challenge ready");

        Ok(view)
    }

    /// Signs the active challenge with the connected wallet, resubmits the
    /// resource request with the proof, and records the unlocked location.
    ///
    /// Nothing is retried. After a failure the challenge is gone and the
    /// next attempt starts with [`fetch_payment_info`](Self::fetch_payment_info).
    ///
    /// # Errors
    ///
    /// Preconditions, checked before any I/O:
    /// - [`PaymentError::WalletNotConnected`]
    /// - [`PaymentError::MissingChallenge`]
    /// - [`PaymentError::PaymentInProgress`]
    ///
    /// Then:
    /// - [`PaymentError::WalletMismatch`] if the wallet switched accounts or
    ///   the signature recovers to another address
    /// - [`PaymentError::SignatureRejected`] if the user declines
    /// - [`PaymentError::PaymentSubmissionFailed`] if the server refuses the proof
    /// - [`PaymentError::SessionChanged`] if the session moved on meanwhile
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err))]
    pub async fn execute_payment(&self) -> Result<String, PaymentError> {
        let ticket = self.state.lock().await.begin_payment()?;
        let generation = ticket.generation;

        match self.pay(ticket).await {
            Ok(url) => {
                self.state.lock().await.unlocked(generation, url.clone())?;
                Ok(url)
            }
            Err(err) => Err(self.state.lock().await.fail(generation, err)),
        }
    }

    /// A consistent copy of the whole session.
    pub async fn snapshot(&self) -> SessionView {
        self.state.lock().await.view()
    }

    /// Current phase.
    pub async fn phase(&self) -> PaymentPhase {
        self.state.lock().await.phase()
    }

    /// Returns `true` when [`execute_payment`](Self::execute_payment) would
    /// pass its preconditions.
    pub async fn is_payment_ready(&self) -> bool {
        self.state.lock().await.is_payment_ready()
    }

    /// What the active challenge will charge.
    pub async fn payment_summary(&self) -> Option<PaymentSummary> {
        self.state.lock().await.payment_summary()
    }

    async fn negotiate(&self, ticket: &FetchTicket) -> Result<ActiveChallenge, PaymentError> {
        let fetched = self
            .client
            .fetch_challenge(&ticket.network, &ticket.resource_id)
            .await?;
        let resource_url = fetched.resource_url();
        let FetchedChallenge { body, status, .. } = fetched;

        let typed_data = match body {
            ChallengeBody::TypedData { typed_data, .. } => {
                typed_data.with_from(ticket.payer).ensure_domain_type()
            }
            ChallengeBody::Legacy(legacy) => {
                if !self.client.config().accept_legacy_challenges {
                    return Err(PaymentError::challenge_fetch(
                        Some(status),
                        "flat challenges without typed data are not accepted",
                    ));
                }

                #[cfg(feature = "telemetry")]
                tracing::warn!(network = %ticket.network, "building authorization for a legacy challenge");

                let profile = self.registry.get_network_profile(&ticket.network)?;
                let token = self.registry.get_token(&ticket.network, &ticket.currency)?;
                build_transfer_authorization(&TransferAuthorizationParams {
                    chain_id: profile.chain_id,
                    token,
                    from: ticket.payer,
                    pay_to: legacy.pay_to,
                    amount: legacy.amount,
                    validity_secs: self.client.config().authorization_validity_secs,
                })
            }
        };

        let view = self.challenge_view(ticket, &typed_data, resource_url, status)?;
        let currency = self
            .registry
            .get_network_profile(&ticket.network)?
            .currency_for_contract(view.asset)
            .cloned()
            .unwrap_or_else(|| ticket.currency.clone());
        Ok(ActiveChallenge {
            resource_id: ticket.resource_id.clone(),
            network: ticket.network.clone(),
            currency,
            typed_data,
            view,
        })
    }

    fn challenge_view(
        &self,
        ticket: &FetchTicket,
        typed_data: &TypedData,
        resource_url: String,
        status: u16,
    ) -> Result<PaymentChallenge, PaymentError> {
        let pay_to = typed_data
            .pay_to()
            .ok_or_else(|| PaymentError::challenge_fetch(Some(status), "challenge has no recipient"))?;
        let amount = typed_data
            .value()
            .ok_or_else(|| PaymentError::challenge_fetch(Some(status), "challenge has no amount"))?;
        let asset = match typed_data.domain.verifying_contract {
            Some(contract) => contract,
            None => self
                .registry
                .get_token_contract(&ticket.network, &ticket.currency)?,
        };
        Ok(PaymentChallenge {
            pay_to: pay_to.to_owned(),
            asset,
            amount,
            network: ticket.network.clone(),
            resource_url,
        })
    }

    async fn pay(&self, ticket: PaymentTicket) -> Result<String, PaymentError> {
        let PaymentTicket {
            generation,
            wallet,
            challenge,
        } = ticket;

        match active_account(wallet.provider.as_ref()).await? {
            Some(active) if active != wallet.address => {
                return Err(PaymentError::WalletMismatch {
                    expected: wallet.address,
                    actual: active,
                });
            }
            Some(_) => {}
            None => {
                return Err(PaymentError::NoAccountSelected {
                    kind: wallet.kind,
                    reason: "wallet has no active account".to_owned(),
                });
            }
        }

        let signed = sign_typed_data(&wallet, challenge.typed_data).await?;
        if signed.typed_data().primary_type == TRANSFER_WITH_AUTHORIZATION {
            let recovered = recover_signer(signed.typed_data(), signed.signature())?;
            if recovered != wallet.address {
                return Err(PaymentError::WalletMismatch {
                    expected: wallet.address,
                    actual: recovered,
                });
            }
        }
        self.state.lock().await.signed(generation, signed.clone())?;

        let proof = PaymentProofHeader::new(
            &signed,
            challenge.network,
            challenge.view.asset,
            challenge.currency,
        );
        self.client
            .submit_payment(&challenge.view.resource_url, &proof)
            .await
    }
}
