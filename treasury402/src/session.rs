//! The payment session state record and its transitions.
//!
//! [`PaymentSessionState`] is a plain value with no I/O. Whoever owns it
//! (the `PaymentContext` in `treasury402-http`) drives an async action in
//! three steps: a `begin_*` transition validates preconditions and hands out
//! a ticket stamped with the current [`Generation`]; the I/O runs without
//! holding the state; the result is applied with a transition that takes the
//! ticket's generation back. Connect, disconnect, every new fetch and a
//! network switch during a fetch bump the generation, so a result that arrives after the session moved on is
//! rejected with [`PaymentError::SessionChanged`] and changes nothing.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use serde::Serialize;

use crate::error::PaymentError;
use crate::networks::{Currency, NetworkId, NetworkRegistry, RegistryError, default_network_for};
use crate::proto::{PaymentChallenge, SignedAuthorization, TypedData};
use crate::wallet::{WalletKind, WalletSession};

/// Where the unlock flow currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PaymentPhase {
    /// Nothing in progress.
    #[default]
    Idle,
    /// Waiting for the resource server's challenge.
    FetchingChallenge,
    /// A challenge is stored and can be paid.
    ChallengeReceived,
    /// Waiting for the wallet signature.
    Signing,
    /// Waiting for the resource server to accept the proof.
    SubmittingPayment,
    /// The current resource is unlocked.
    Unlocked,
    /// The last action failed; see `last_error`.
    Error,
}

impl PaymentPhase {
    /// Returns `true` while a fetch, signature or submission is outstanding.
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(
            self,
            Self::FetchingChallenge | Self::Signing | Self::SubmittingPayment
        )
    }
}

/// Monotonic session epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Generation(u64);

impl Generation {
    const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// A challenge accepted for payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveChallenge {
    /// Resource the challenge unlocks.
    pub resource_id: String,
    /// Network the challenge was issued for.
    pub network: NetworkId,
    /// Token the bundle is signed for. Its contract is `view.asset`.
    pub currency: Currency,
    /// Bundle to sign, with `from` already set.
    pub typed_data: TypedData,
    /// Display view.
    pub view: PaymentChallenge,
}

/// Issued by [`PaymentSessionState::begin_fetch`].
#[derive(Debug, Clone)]
pub struct FetchTicket {
    /// Epoch the fetch belongs to.
    pub generation: Generation,
    /// Resource being negotiated.
    pub resource_id: String,
    /// Selected network.
    pub network: NetworkId,
    /// Selected currency.
    pub currency: Currency,
    /// Connected wallet address, to fill `message.from`.
    pub payer: Address,
}

/// Issued by [`PaymentSessionState::begin_payment`].
#[derive(Debug, Clone)]
pub struct PaymentTicket {
    /// Epoch the payment belongs to.
    pub generation: Generation,
    /// Wallet to sign with.
    pub wallet: WalletSession,
    /// Challenge being paid.
    pub challenge: ActiveChallenge,
}

/// Amount, currency, network and recipient of the active challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    /// Amount in the token's smallest unit.
    pub amount: U256,
    /// Token symbol.
    pub currency: Currency,
    /// Network.
    pub network: NetworkId,
    /// Recipient.
    pub pay_to: String,
}

/// The mutable state of one payment flow.
#[derive(Debug, Clone)]
pub struct PaymentSessionState {
    phase: PaymentPhase,
    selected_network: NetworkId,
    selected_currency: Currency,
    wallet: Option<WalletSession>,
    current_resource: Option<String>,
    challenge: Option<ActiveChallenge>,
    signed: Option<SignedAuthorization>,
    unlocked: BTreeMap<String, String>,
    last_error: Option<PaymentError>,
    generation: Generation,
    in_flight: Option<Generation>,
}

impl PaymentSessionState {
    /// Creates an idle session with the given selection.
    #[must_use]
    pub const fn new(network: NetworkId, currency: Currency) -> Self {
        Self {
            phase: PaymentPhase::Idle,
            selected_network: network,
            selected_currency: currency,
            wallet: None,
            current_resource: None,
            challenge: None,
            signed: None,
            unlocked: BTreeMap::new(),
            last_error: None,
            generation: Generation(0),
            in_flight: None,
        }
    }

    /// Creates an idle session preselecting the home network for the user's
    /// last sign-in method and that network's default currency.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownNetwork`] if the home network is not in `registry`.
    pub fn for_auth_method(
        registry: &NetworkRegistry,
        last_auth_method: Option<&str>,
    ) -> Result<Self, RegistryError> {
        let profile = registry.get_network_profile(&default_network_for(last_auth_method))?;
        Ok(Self::new(
            profile.network_id.clone(),
            profile.default_currency.clone(),
        ))
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> PaymentPhase {
        self.phase
    }

    /// Current epoch.
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Selected network.
    #[must_use]
    pub const fn selected_network(&self) -> &NetworkId {
        &self.selected_network
    }

    /// Selected currency.
    #[must_use]
    pub const fn selected_currency(&self) -> &Currency {
        &self.selected_currency
    }

    /// Connected wallet.
    #[must_use]
    pub const fn wallet(&self) -> Option<&WalletSession> {
        self.wallet.as_ref()
    }

    /// Active challenge.
    #[must_use]
    pub const fn challenge(&self) -> Option<&ActiveChallenge> {
        self.challenge.as_ref()
    }

    /// Signature produced for the active challenge, while it is being submitted.
    #[must_use]
    pub const fn signed_authorization(&self) -> Option<&SignedAuthorization> {
        self.signed.as_ref()
    }

    /// Last failure, cleared when a new action starts.
    #[must_use]
    pub const fn last_error(&self) -> Option<&PaymentError> {
        self.last_error.as_ref()
    }

    /// Content location for the resource currently being negotiated, once unlocked.
    #[must_use]
    pub fn unlocked_resource_url(&self) -> Option<&str> {
        self.current_resource
            .as_ref()
            .and_then(|id| self.unlocked.get(id))
            .map(String::as_str)
    }

    /// Returns `true` when [`begin_payment`](Self::begin_payment) would succeed.
    #[must_use]
    pub const fn is_payment_ready(&self) -> bool {
        self.wallet.is_some() && self.challenge.is_some() && self.in_flight.is_none()
    }

    /// Summary of what the active challenge will charge.
    #[must_use]
    pub fn payment_summary(&self) -> Option<PaymentSummary> {
        self.challenge.as_ref().map(|c| PaymentSummary {
            amount: c.view.amount,
            currency: c.currency.clone(),
            network: c.network.clone(),
            pay_to: c.view.pay_to.clone(),
        })
    }

    /// Read-only copy of every field.
    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            phase: self.phase,
            selected_network: self.selected_network.clone(),
            selected_currency: self.selected_currency.clone(),
            wallet_address: self.wallet.as_ref().map(|w| w.address),
            wallet_kind: self.wallet.as_ref().map(|w| w.kind),
            connected_network: self
                .wallet
                .as_ref()
                .and_then(|w| w.connected_network.clone()),
            current_resource: self.current_resource.clone(),
            challenge: self.challenge.as_ref().map(|c| c.view.clone()),
            signed_authorization: self.signed.clone(),
            unlocked_resource_url: self.unlocked_resource_url().map(str::to_owned),
            unlocked: self.unlocked.clone(),
            last_error: self.last_error.clone(),
            in_progress: self.in_flight.is_some() || self.phase.is_busy(),
        }
    }

    /// Installs a newly connected wallet, replacing any previous one.
    ///
    /// The challenge and signature belong to the old wallet and are dropped.
    pub fn connected(&mut self, wallet: WalletSession) {
        self.reset_negotiation();
        self.wallet = Some(wallet);
    }

    /// Drops the wallet together with everything obtained through it.
    pub fn disconnect(&mut self) {
        self.reset_negotiation();
        self.wallet = None;
        self.unlocked.clear();
    }

    /// Switches network.
    ///
    /// A challenge issued for another network is discarded, and so is the
    /// result of a fetch still running for the old network. If the selected
    /// currency is not available on `network`, the network's default is
    /// selected instead.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::PaymentInProgress`] while a payment is outstanding
    /// - [`PaymentError::Registry`] if `network` is unknown
    pub fn select_network(
        &mut self,
        registry: &NetworkRegistry,
        network: NetworkId,
    ) -> Result<(), PaymentError> {
        if self.in_flight.is_some() {
            return Err(PaymentError::PaymentInProgress);
        }
        let profile = registry.get_network_profile(&network)?;
        if profile.token(&self.selected_currency).is_none() {
            self.selected_currency = profile.default_currency.clone();
        }
        if network != self.selected_network && self.phase == PaymentPhase::FetchingChallenge {
            self.generation = self.generation.next();
            self.phase = PaymentPhase::Idle;
        }
        if self.challenge.as_ref().is_some_and(|c| c.network != network) {
            self.discard_challenge();
        }
        self.selected_network = network;
        Ok(())
    }

    /// Switches currency on the selected network.
    ///
    /// A challenge signed for another token is discarded.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::PaymentInProgress`] while a payment is outstanding
    /// - [`PaymentError::Registry`] if the selected network does not support `currency`
    pub fn select_currency(
        &mut self,
        registry: &NetworkRegistry,
        currency: Currency,
    ) -> Result<(), PaymentError> {
        if self.in_flight.is_some() {
            return Err(PaymentError::PaymentInProgress);
        }
        registry.get_token(&self.selected_network, &currency)?;
        if self.challenge.as_ref().is_some_and(|c| c.currency != currency) {
            self.discard_challenge();
        }
        self.selected_currency = currency;
        Ok(())
    }

    /// Starts a negotiation for `resource_id`, discarding any previous challenge.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::WalletNotConnected`] without a wallet
    /// - [`PaymentError::PaymentInProgress`] while a payment is outstanding
    pub fn begin_fetch(&mut self, resource_id: &str) -> Result<FetchTicket, PaymentError> {
        let payer = self
            .wallet
            .as_ref()
            .ok_or(PaymentError::WalletNotConnected)?
            .address;
        if self.in_flight.is_some() {
            return Err(PaymentError::PaymentInProgress);
        }
        self.generation = self.generation.next();
        self.challenge = None;
        self.signed = None;
        self.last_error = None;
        self.current_resource = Some(resource_id.to_owned());
        self.phase = PaymentPhase::FetchingChallenge;
        Ok(FetchTicket {
            generation: self.generation,
            resource_id: resource_id.to_owned(),
            network: self.selected_network.clone(),
            currency: self.selected_currency.clone(),
            payer,
        })
    }

    /// Stores the challenge produced by a fetch and selects the token it charges.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::SessionChanged`] if the fetch is stale.
    pub fn challenge_received(
        &mut self,
        generation: Generation,
        challenge: ActiveChallenge,
    ) -> Result<(), PaymentError> {
        self.ensure_current(generation)?;
        self.selected_currency = challenge.currency.clone();
        self.challenge = Some(challenge);
        self.phase = PaymentPhase::ChallengeReceived;
        Ok(())
    }

    /// Claims the active challenge for signing.
    ///
    /// # Errors
    ///
    /// Checked in this order, before any I/O:
    /// - [`PaymentError::WalletNotConnected`]
    /// - [`PaymentError::MissingChallenge`]
    /// - [`PaymentError::PaymentInProgress`]
    pub fn begin_payment(&mut self) -> Result<PaymentTicket, PaymentError> {
        let wallet = self.wallet.clone().ok_or(PaymentError::WalletNotConnected)?;
        let challenge = self.challenge.clone().ok_or(PaymentError::MissingChallenge)?;
        if self.in_flight.is_some() {
            return Err(PaymentError::PaymentInProgress);
        }
        self.in_flight = Some(self.generation);
        self.last_error = None;
        self.phase = PaymentPhase::Signing;
        Ok(PaymentTicket {
            generation: self.generation,
            wallet,
            challenge,
        })
    }

    /// Records the wallet's signature.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::SessionChanged`] if the payment is stale.
    pub fn signed(
        &mut self,
        generation: Generation,
        signed: SignedAuthorization,
    ) -> Result<(), PaymentError> {
        self.ensure_current(generation)?;
        self.signed = Some(signed);
        self.phase = PaymentPhase::SubmittingPayment;
        Ok(())
    }

    /// Records the unlocked content location and consumes the challenge.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::SessionChanged`] if the payment is stale.
    pub fn unlocked(&mut self, generation: Generation, url: String) -> Result<(), PaymentError> {
        self.ensure_current(generation)?;
        if let Some(challenge) = self.challenge.take() {
            self.unlocked.insert(challenge.resource_id, url);
        }
        self.signed = None;
        self.in_flight = None;
        self.phase = PaymentPhase::Unlocked;
        Ok(())
    }

    /// Records a failure of the action started under `generation`.
    ///
    /// The challenge and any signature are dropped: a retry must start with
    /// a fresh fetch. Content unlocked earlier is kept. Returns the error to
    /// hand to the caller, which is [`PaymentError::SessionChanged`] when the
    /// action is stale and the state was left untouched.
    pub fn fail(&mut self, generation: Generation, error: PaymentError) -> PaymentError {
        if let Err(stale) = self.ensure_current(generation) {
            return stale;
        }
        self.challenge = None;
        self.signed = None;
        self.in_flight = None;
        self.phase = PaymentPhase::Error;
        self.last_error = Some(error.clone());
        error
    }

    fn ensure_current(&self, generation: Generation) -> Result<(), PaymentError> {
        if generation == self.generation {
            Ok(())
        } else {
            Err(PaymentError::SessionChanged)
        }
    }

    fn discard_challenge(&mut self) {
        self.challenge = None;
        self.signed = None;
        if self.phase == PaymentPhase::ChallengeReceived {
            self.phase = PaymentPhase::Idle;
        }
    }

    fn reset_negotiation(&mut self) {
        self.generation = self.generation.next();
        self.challenge = None;
        self.signed = None;
        self.current_resource = None;
        self.last_error = None;
        self.in_flight = None;
        self.phase = PaymentPhase::Idle;
    }
}

/// A consistent, read-only copy of [`PaymentSessionState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Current phase.
    pub phase: PaymentPhase,
    /// Selected network.
    pub selected_network: NetworkId,
    /// Selected currency.
    pub selected_currency: Currency,
    /// Connected wallet address.
    pub wallet_address: Option<Address>,
    /// Connected wallet kind.
    pub wallet_kind: Option<WalletKind>,
    /// Network the wallet reported at connect time.
    pub connected_network: Option<NetworkId>,
    /// Resource being negotiated.
    pub current_resource: Option<String>,
    /// Active challenge.
    pub challenge: Option<PaymentChallenge>,
    /// Signature awaiting submission.
    #[serde(skip)]
    pub signed_authorization: Option<SignedAuthorization>,
    /// Content location for `current_resource`, once unlocked.
    pub unlocked_resource_url: Option<String>,
    /// Every resource unlocked in this session.
    pub unlocked: BTreeMap<String, String>,
    /// Last failure.
    #[serde(skip)]
    pub last_error: Option<PaymentError>,
    /// A fetch, signature or submission is outstanding.
    pub in_progress: bool,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy_primitives::{Bytes, address};
    use serde_json::json;

    use super::*;
    use crate::networks::{BASE_MAINNET, BASE_SEPOLIA, USDC_BASE, XLAYER};
    use crate::proto::ChallengeBody;
    use crate::wallet::mock::MockProvider;

    const PAYER: Address = address!("7447dEbdaCAe3638BdBaC2F4A443C5615d3f007D");

    fn wallet() -> WalletSession {
        WalletSession {
            provider: Arc::new(MockProvider::new(WalletKind::MetaMask)),
            address: PAYER,
            kind: WalletKind::MetaMask,
            connected_network: Some(BASE_MAINNET),
            signing: WalletKind::MetaMask.signing_method(),
        }
    }

    fn challenge(resource_id: &str, network: NetworkId, amount: u64) -> ActiveChallenge {
        let body = json!({
            "domain": {"name": "USD Coin", "version": "2", "chainId": 8453},
            "message": {"to": "0x95C2259343Bca2E1c1E6bd4F0CBe5b4C8ac2890F", "value": amount.to_string()},
        });
        let Ok(ChallengeBody::TypedData { typed_data, .. }) = ChallengeBody::parse(&body) else {
            panic!("expected typed data");
        };
        ActiveChallenge {
            resource_id: resource_id.to_owned(),
            network: network.clone(),
            currency: Currency::USDC,
            typed_data: typed_data.with_from(PAYER),
            view: PaymentChallenge {
                pay_to: "0x95C2259343Bca2E1c1E6bd4F0CBe5b4C8ac2890F".to_owned(),
                asset: USDC_BASE,
                amount: U256::from(amount),
                network,
                resource_url: format!("https://api.example.com/pay?uuid={resource_id}"),
            },
        }
    }

    fn signed_for(challenge: &ActiveChallenge) -> SignedAuthorization {
        SignedAuthorization::new(
            challenge.typed_data.clone(),
            Bytes::from(vec![0u8; 65]),
            PAYER,
        )
    }

    fn ready_state() -> PaymentSessionState {
        let mut state = PaymentSessionState::new(BASE_MAINNET, Currency::USDC);
        state.connected(wallet());
        let ticket = state.begin_fetch("abc123").unwrap();
        state
            .challenge_received(ticket.generation, challenge("abc123", BASE_MAINNET, 10_000))
            .unwrap();
        state
    }

    #[test]
    fn test_for_auth_method_picks_home_network() {
        let registry = NetworkRegistry::builtin();
        let okx = PaymentSessionState::for_auth_method(&registry, Some("okx")).unwrap();
        assert_eq!(okx.selected_network(), &XLAYER);
        assert_eq!(okx.selected_currency(), &Currency::USDT);

        let other = PaymentSessionState::for_auth_method(&registry, None).unwrap();
        assert_eq!(other.selected_network(), &BASE_MAINNET);
        assert_eq!(other.selected_currency(), &Currency::USDC);
    }

    #[test]
    fn test_fetch_requires_wallet() {
        let mut state = PaymentSessionState::new(BASE_MAINNET, Currency::USDC);
        assert_eq!(
            state.begin_fetch("abc123").unwrap_err(),
            PaymentError::WalletNotConnected
        );
        assert_eq!(state.phase(), PaymentPhase::Idle);
    }

    #[test]
    fn test_precondition_order_for_payment() {
        let mut state = PaymentSessionState::new(BASE_MAINNET, Currency::USDC);
        assert_eq!(state.begin_payment().unwrap_err(), PaymentError::WalletNotConnected);
        state.connected(wallet());
        assert_eq!(state.begin_payment().unwrap_err(), PaymentError::MissingChallenge);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut state = ready_state();
        assert!(state.is_payment_ready());
        assert_eq!(
            state.payment_summary().unwrap(),
            PaymentSummary {
                amount: U256::from(10_000),
                currency: Currency::USDC,
                network: BASE_MAINNET,
                pay_to: "0x95C2259343Bca2E1c1E6bd4F0CBe5b4C8ac2890F".to_owned(),
            }
        );

        let ticket = state.begin_payment().unwrap();
        assert_eq!(state.phase(), PaymentPhase::Signing);
        assert!(state.view().in_progress);
        assert_eq!(state.begin_payment().unwrap_err(), PaymentError::PaymentInProgress);
        assert_eq!(state.begin_fetch("other").unwrap_err(), PaymentError::PaymentInProgress);

        state
            .signed(ticket.generation, signed_for(&ticket.challenge))
            .unwrap();
        assert_eq!(state.phase(), PaymentPhase::SubmittingPayment);

        state
            .unlocked(ticket.generation, "https://cdn.example.com/abc123".to_owned())
            .unwrap();
        assert_eq!(state.phase(), PaymentPhase::Unlocked);
        assert_eq!(
            state.unlocked_resource_url(),
            Some("https://cdn.example.com/abc123")
        );
        assert!(state.challenge().is_none());
        assert!(state.signed_authorization().is_none());
        assert!(!state.view().in_progress);
    }

    #[test]
    fn test_refetch_discards_first_challenge() {
        let mut state = ready_state();
        let ticket = state.begin_fetch("abc123").unwrap();
        assert!(state.challenge().is_none());
        state
            .challenge_received(ticket.generation, challenge("abc123", BASE_MAINNET, 20_000))
            .unwrap();
        assert_eq!(
            state.begin_payment().unwrap().challenge.view.amount,
            U256::from(20_000)
        );
    }

    #[test]
    fn test_stale_fetch_result_is_discarded() {
        let mut state = PaymentSessionState::new(BASE_MAINNET, Currency::USDC);
        state.connected(wallet());
        let first = state.begin_fetch("abc123").unwrap();
        let second = state.begin_fetch("def456").unwrap();

        let err = state
            .challenge_received(first.generation, challenge("abc123", BASE_MAINNET, 1))
            .unwrap_err();
        assert_eq!(err, PaymentError::SessionChanged);
        assert!(state.challenge().is_none());

        state
            .challenge_received(second.generation, challenge("def456", BASE_MAINNET, 2))
            .unwrap();
        assert_eq!(state.challenge().unwrap().resource_id, "def456");
    }

    #[test]
    fn test_disconnect_clears_everything_together() {
        let mut state = ready_state();
        let ticket = state.begin_payment().unwrap();
        state
            .signed(ticket.generation, signed_for(&ticket.challenge))
            .unwrap();

        state.disconnect();
        let view = state.view();
        assert_eq!(view.phase, PaymentPhase::Idle);
        assert!(view.wallet_address.is_none());
        assert!(view.challenge.is_none());
        assert!(view.signed_authorization.is_none());
        assert!(view.unlocked.is_empty());
        assert!(!view.in_progress);

        // The suspended submission finishes after the disconnect.
        assert_eq!(
            state
                .unlocked(ticket.generation, "https://cdn.example.com/abc123".to_owned())
                .unwrap_err(),
            PaymentError::SessionChanged
        );
        assert!(state.view().unlocked.is_empty());
        assert_eq!(state.begin_payment().unwrap_err(), PaymentError::WalletNotConnected);
    }

    #[test]
    fn test_stale_failure_leaves_state_alone() {
        let mut state = ready_state();
        let ticket = state.begin_payment().unwrap();
        state.connected(wallet());

        let err = state.fail(ticket.generation, PaymentError::SignatureRejected("no".into()));
        assert_eq!(err, PaymentError::SessionChanged);
        assert_eq!(state.phase(), PaymentPhase::Idle);
        assert!(state.last_error().is_none());
    }

    #[test]
    fn test_failure_keeps_other_unlocked_content() {
        let mut state = ready_state();
        let ticket = state.begin_payment().unwrap();
        state
            .unlocked(ticket.generation, "https://cdn.example.com/abc123".to_owned())
            .unwrap();

        let fetch = state.begin_fetch("def456").unwrap();
        state
            .challenge_received(fetch.generation, challenge("def456", BASE_MAINNET, 5))
            .unwrap();
        let ticket = state.begin_payment().unwrap();
        let err = state.fail(ticket.generation, PaymentError::submission(Some(402), "Payment Required"));

        assert!(matches!(err, PaymentError::PaymentSubmissionFailed { .. }));
        assert_eq!(state.phase(), PaymentPhase::Error);
        assert!(state.challenge().is_none());
        assert_eq!(state.last_error(), Some(&err));
        assert!(!state.view().in_progress);
        assert_eq!(
            state.view().unlocked.get("abc123").map(String::as_str),
            Some("https://cdn.example.com/abc123")
        );
        assert_eq!(state.begin_payment().unwrap_err(), PaymentError::MissingChallenge);
    }

    #[test]
    fn test_select_network_discards_foreign_challenge() {
        let registry = NetworkRegistry::builtin();
        let mut state = ready_state();

        state.select_network(&registry, BASE_MAINNET).unwrap();
        assert!(state.challenge().is_some());

        state.select_network(&registry, XLAYER).unwrap();
        assert!(state.challenge().is_none());
        assert_eq!(state.phase(), PaymentPhase::Idle);
        assert_eq!(state.selected_currency(), &Currency::USDC);

        state.select_currency(&registry, Currency::USDT).unwrap();
        state.select_network(&registry, BASE_SEPOLIA).unwrap();
        assert_eq!(state.selected_currency(), &Currency::USDC);
    }

    #[test]
    fn test_network_switch_abandons_running_fetch() {
        let registry = NetworkRegistry::builtin();
        let mut state = PaymentSessionState::new(BASE_MAINNET, Currency::USDC);
        state.connected(wallet());
        let ticket = state.begin_fetch("abc123").unwrap();

        // Reselecting the same network keeps the fetch alive.
        state.select_network(&registry, BASE_MAINNET).unwrap();
        assert_eq!(state.phase(), PaymentPhase::FetchingChallenge);

        state.select_network(&registry, XLAYER).unwrap();
        assert_eq!(state.phase(), PaymentPhase::Idle);
        assert_eq!(
            state
                .challenge_received(ticket.generation, challenge("abc123", BASE_MAINNET, 1))
                .unwrap_err(),
            PaymentError::SessionChanged
        );
        assert!(state.challenge().is_none());
        assert_eq!(state.selected_network(), &XLAYER);
        assert_eq!(state.begin_payment().unwrap_err(), PaymentError::MissingChallenge);
    }

    #[test]
    fn test_currency_switch_discards_challenge_for_other_token() {
        let registry = NetworkRegistry::builtin();
        let mut state = PaymentSessionState::new(XLAYER, Currency::USDC);
        state.connected(wallet());
        let ticket = state.begin_fetch("abc123").unwrap();
        let usdt = ActiveChallenge {
            currency: Currency::USDT,
            ..challenge("abc123", XLAYER, 10_000)
        };
        state.challenge_received(ticket.generation, usdt).unwrap();
        assert_eq!(state.selected_currency(), &Currency::USDT);
        assert_eq!(state.payment_summary().unwrap().currency, Currency::USDT);

        state.select_currency(&registry, Currency::USDT).unwrap();
        assert!(state.challenge().is_some());

        state.select_currency(&registry, Currency::USDC).unwrap();
        assert!(state.challenge().is_none());
        assert_eq!(state.phase(), PaymentPhase::Idle);
        assert_eq!(state.begin_payment().unwrap_err(), PaymentError::MissingChallenge);
    }

    #[test]
    fn test_select_rejects_unknown_and_in_flight() {
        let registry = NetworkRegistry::builtin();
        let mut state = ready_state();
        assert!(matches!(
            state.select_network(&registry, NetworkId::new("solana")),
            Err(PaymentError::Registry(RegistryError::UnknownNetwork(_)))
        ));
        assert!(matches!(
            state.select_currency(&registry, Currency::USDT),
            Err(PaymentError::Registry(RegistryError::UnsupportedCurrency { .. }))
        ));

        state.begin_payment().unwrap();
        assert_eq!(
            state.select_network(&registry, XLAYER).unwrap_err(),
            PaymentError::PaymentInProgress
        );
    }
}
