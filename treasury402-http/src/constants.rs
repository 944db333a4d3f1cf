//! Header names and default endpoints.

/// Header carrying the base64 payment proof on resubmission.
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// HTTP 402 Payment Required status code.
pub const HTTP_STATUS_PAYMENT_REQUIRED: u16 = 402;

/// Default resource server.
pub const DEFAULT_API_BASE_URL: &str = "https://api-test.copus.network";

/// Challenge endpoint served by the OKX facilitator (X Layer).
pub const OKX_CHALLENGE_PATH: &str = "/client/payment/okx/getTargetUrl";

/// Challenge endpoint served by the Base facilitator.
pub const BASE_CHALLENGE_PATH: &str = "/client/payment/base/getTargetUrl";

/// Query parameter naming the resource on the challenge endpoint.
pub const RESOURCE_ID_PARAM: &str = "uuid";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default lifetime of a client-built authorization, in seconds.
pub const DEFAULT_AUTHORIZATION_VALIDITY_SECS: u64 = 3600;
