//! Protocol constants: header names, schemes and default policy values

/// HTTP header names used by the payment flow
///
/// Header names are case-insensitive on the wire; these are stored lowercase.
pub mod headers {
    use http::HeaderName;

    /// Request header carrying the JSON-encoded payment payload
    pub const X_PAYMENT: HeaderName = HeaderName::from_static("x-payment");
    /// Response header set on every payment challenge
    pub const X_PAYMENT_REQUIRED: HeaderName = HeaderName::from_static("x-payment-required");
    /// Optional response header carrying the base64 settlement receipt
    pub const X_PAYMENT_RESPONSE: HeaderName = HeaderName::from_static("x-payment-response");
}

/// Common payment schemes
pub mod schemes {
    /// Exact payment scheme (EIP-3009)
    pub const EXACT: &str = "exact";

    /// Check if a scheme is implemented by this crate
    pub fn is_supported(scheme: &str) -> bool {
        scheme == EXACT
    }
}

/// Seconds an authorization stays valid after it is signed
pub const VALIDITY_WINDOW_SECS: u64 = 300;

/// Offset subtracted from `now` for `validAfter`. The lower bound is effectively disabled.
pub const VALID_AFTER_OFFSET_SECS: u64 = 600_000;

/// Maximum time a seller advertises for completing a payment
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u32 = 300;

/// Buyer spending cap used when none is configured
pub const DEFAULT_MAX_AMOUNT_PAY: &str = "1000000";

/// Buyer attempts used when none is configured
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Cap on buffered request and response bodies
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Error kind of the challenge body
pub const PAYMENT_REQUIRED_ERROR: &str = "payment_required";

/// Message of the challenge body
pub const PAYMENT_REQUIRED_MESSAGE: &str = "Payment is required to access this resource";
