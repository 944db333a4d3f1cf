//! HTTP side of the negotiation: fetching a challenge and resubmitting the
//! request with a payment proof.
//!
//! Nothing here retries. Challenges may be single-use on the server, so any
//! retry has to be a fresh negotiation started by the user.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use http::StatusCode;
use http::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use treasury402::PaymentError;
use treasury402::networks::NetworkId;
use treasury402::proto::{ChallengeBody, PaymentProofHeader};
#[cfg(feature = "telemetry")]
use tracing::instrument;
use url::Url;

use crate::auth::{AuthSession, bearer_header};
use crate::config::{ClientConfig, ConfigError};
use crate::constants::{HTTP_STATUS_PAYMENT_REQUIRED, RESOURCE_ID_PARAM, X_PAYMENT_HEADER};

/// A challenge as received from the resource server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedChallenge {
    /// Parsed body.
    pub body: ChallengeBody,
    /// The URL the challenge was requested from, query included.
    pub request_url: Url,
    /// HTTP status: 2xx or 402.
    pub status: u16,
}

impl FetchedChallenge {
    /// URL to resubmit with the proof: the one the server names, or else the
    /// challenge URL itself.
    #[must_use]
    pub fn resource_url(&self) -> String {
        let named = match &self.body {
            ChallengeBody::TypedData { resource, .. } => resource.as_deref(),
            ChallengeBody::Legacy(legacy) => legacy.resource.as_deref(),
        };
        named.map_or_else(|| self.request_url.to_string(), str::to_owned)
    }
}

/// Talks to the resource server.
#[derive(Clone)]
pub struct NegotiationClient {
    http: Client,
    config: Arc<ClientConfig>,
    auth: Arc<dyn AuthSession>,
}

impl Debug for NegotiationClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiationClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl NegotiationClient {
    /// Creates a client with its own connection pool and the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, auth: Arc<dyn AuthSession>) -> Result<Self, ConfigError> {
        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self::with_client(http, config, auth))
    }

    /// Creates a client on top of an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(http: Client, config: ClientConfig, auth: Arc<dyn AuthSession>) -> Self {
        Self {
            http,
            config: Arc::new(config),
            auth,
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The sign-in session collaborator.
    #[must_use]
    pub fn auth(&self) -> &dyn AuthSession {
        self.auth.as_ref()
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match bearer_header(self.auth.as_ref()) {
            Some(value) => request.header(AUTHORIZATION, value),
            None => request,
        }
    }

    /// Requests the payment challenge for `resource_id` on `network`.
    ///
    /// Sends `GET <endpoint>?uuid=<resource_id>` with `Accept: application/json`
    /// and the bearer token. A 2xx or 402 response carries the challenge.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::Config`] if no endpoint is configured for `network`
    /// - [`PaymentError::ChallengeFetchFailed`] on transport failure, any other
    ///   status, or a body that is not a challenge
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "treasury402.fetch_challenge", skip_all, err, fields(network = %network, resource_id = %resource_id))
    )]
    pub async fn fetch_challenge(
        &self,
        network: &NetworkId,
        resource_id: &str,
    ) -> Result<FetchedChallenge, PaymentError> {
        let mut url = self
            .config
            .endpoint_url(network)
            .map_err(|e| PaymentError::Config(e.to_string()))?;
        url.query_pairs_mut().append_pair(RESOURCE_ID_PARAM, resource_id);

        let request = self
            .authorized(self.http.get(url.clone()))
            .header(ACCEPT, "application/json");
        let response = request
            .send()
            .await
            .map_err(|e| PaymentError::challenge_fetch(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() && status.as_u16() != HTTP_STATUS_PAYMENT_REQUIRED {
            let message = failure_message(response).await;
            return Err(PaymentError::challenge_fetch(Some(status.as_u16()), message));
        }

        let body: Value = response.json().await.map_err(|e| {
            PaymentError::challenge_fetch(Some(status.as_u16()), format!("malformed body: {e}"))
        })?;
        let body = ChallengeBody::parse(&body).map_err(|e| {
            PaymentError::challenge_fetch(Some(status.as_u16()), format!("not a payment challenge: {e}"))
        })?;

        #[cfg(feature = "telemetry")]
        tracing::debug!(
            status = status.as_u16(),
            legacy = matches!(body, ChallengeBody::Legacy(_)),
            "challenge received"
        );

        Ok(FetchedChallenge {
            body,
            request_url: url,
            status: status.as_u16(),
        })
    }

    /// Resubmits the resource request with the payment proof.
    ///
    /// Returns the response's final URL (after redirects), which is where
    /// the unlocked content lives.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::Encoding`] if the header cannot be encoded
    /// - [`PaymentError::PaymentSubmissionFailed`] on transport failure or a non-2xx status
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "treasury402.submit_payment", skip_all, err, fields(network = %proof.network))
    )]
    pub async fn submit_payment(
        &self,
        resource_url: &str,
        proof: &PaymentProofHeader,
    ) -> Result<String, PaymentError> {
        let header = proof
            .encode()
            .map_err(|e| PaymentError::Encoding(e.to_string()))?;
        let response = self
            .authorized(self.http.get(resource_url))
            .header(X_PAYMENT_HEADER, header)
            .send()
            .await
            .map_err(|e| PaymentError::submission(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = failure_message(response).await;
            return Err(PaymentError::submission(Some(status.as_u16()), message));
        }

        #[cfg(feature = "telemetry")]
        tracing::info!(url = %response.url(), "payment accepted");

        Ok(response.url().to_string())
    }
}

/// Best-effort description of a failed response: the body text if short,
/// otherwise the status reason.
async fn failure_message(response: Response) -> String {
    let status: StatusCode = response.status();
    let reason = status.canonical_reason().unwrap_or("unexpected status").to_owned();
    match response.text().await {
        Ok(text) if !text.trim().is_empty() && text.len() <= 512 => text.trim().to_owned(),
        _ => reason,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use treasury402::networks::{BASE_MAINNET, XLAYER};
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::StaticAuth;

    fn client(server: &MockServer, auth: StaticAuth) -> NegotiationClient {
        let config = ClientConfig::with_base_url(Url::parse(&server.uri()).unwrap());
        NegotiationClient::new(config, Arc::new(auth)).unwrap()
    }

    fn typed_challenge() -> Value {
        json!({
            "domain": {"name": "USDT", "version": "1", "chainId": 196,
                       "verifyingContract": "0x779ded0c9e1022225f8e0630b35a9b54be713736"},
            "message": {"to": "0x95C2259343Bca2E1c1E6bd4F0CBe5b4C8ac2890F", "value": "10000"},
            "primaryType": "TransferWithAuthorization",
            "types": {}
        })
    }

    #[tokio::test]
    async fn test_fetch_accepts_402_with_typed_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/client/payment/okx/getTargetUrl"))
            .and(query_param("uuid", "abc123"))
            .and(header("authorization", "Bearer tok"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(402).set_body_json(typed_challenge()))
            .expect(1)
            .mount(&server)
            .await;

        let fetched = client(&server, StaticAuth::bearer("tok"))
            .fetch_challenge(&XLAYER, "abc123")
            .await
            .unwrap();
        assert_eq!(fetched.status, 402);
        assert!(matches!(fetched.body, ChallengeBody::TypedData { .. }));
        assert_eq!(
            fetched.resource_url(),
            format!("{}/client/payment/okx/getTargetUrl?uuid=abc123", server.uri())
        );
    }

    #[tokio::test]
    async fn test_fetch_accepts_200_and_named_resource() {
        let server = MockServer::start().await;
        let mut body = typed_challenge();
        body["resource"] = json!("https://cdn.example.com/gate/abc123");
        Mock::given(method("GET"))
            .and(path("/client/payment/base/getTargetUrl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let fetched = client(&server, StaticAuth::anonymous())
            .fetch_challenge(&BASE_MAINNET, "abc123")
            .await
            .unwrap();
        assert_eq!(fetched.resource_url(), "https://cdn.example.com/gate/abc123");

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_fetch_rejects_other_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("database down"))
            .mount(&server)
            .await;

        let err = client(&server, StaticAuth::bearer("tok"))
            .fetch_challenge(&BASE_MAINNET, "abc123")
            .await
            .unwrap_err();
        assert_eq!(err, PaymentError::challenge_fetch(Some(500), "database down"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(402).set_body_string("<html>pay up</html>"))
            .mount(&server)
            .await;

        let err = client(&server, StaticAuth::bearer("tok"))
            .fetch_challenge(&BASE_MAINNET, "abc123")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::ChallengeFetchFailed { status: Some(402), .. }
        ));
    }

    #[tokio::test]
    async fn test_fetch_unconfigured_network() {
        let server = MockServer::start().await;
        let err = client(&server, StaticAuth::bearer("tok"))
            .fetch_challenge(&NetworkId::new("solana"), "abc123")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Config(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    fn proof() -> PaymentProofHeader {
        PaymentProofHeader {
            x402_version: 1,
            scheme: "exact".to_owned(),
            network: BASE_MAINNET,
            asset: treasury402::networks::USDC_BASE,
            currency: treasury402::Currency::USDC,
            payload: treasury402::proto::ProofPayload {
                signature: alloy_primitives::Bytes::from(vec![1u8; 65]),
                authorization: serde_json::Map::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_submit_returns_final_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gate/abc123"))
            .and(header_exists(X_PAYMENT_HEADER))
            .and(header("authorization", "Bearer tok"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/content/abc123", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/content/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_string("the article"))
            .mount(&server)
            .await;

        let url = client(&server, StaticAuth::bearer("tok"))
            .submit_payment(&format!("{}/gate/abc123", server.uri()), &proof())
            .await
            .unwrap();
        assert_eq!(url, format!("{}/content/abc123", server.uri()));

        let requests = server.received_requests().await.unwrap();
        let sent = requests[0].headers.get(X_PAYMENT_HEADER).unwrap().to_str().unwrap();
        assert_eq!(PaymentProofHeader::decode(sent).unwrap(), proof());
    }

    #[tokio::test]
    async fn test_submit_failure_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(402))
            .mount(&server)
            .await;

        let err = client(&server, StaticAuth::bearer("tok"))
            .submit_payment(&format!("{}/gate/abc123", server.uri()), &proof())
            .await
            .unwrap_err();
        assert_eq!(err, PaymentError::submission(Some(402), "Payment Required"));
    }
}
