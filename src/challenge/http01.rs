/// HTTP-01 challenge preparation
///
/// The caller must serve the key authorization, verbatim, at the well-known
/// path over plain HTTP on port 80.

/// Compute the publication target and value for an HTTP-01 challenge
pub fn prepare(identifier: &str, token: &str, key_authorization: &str) -> (String, String) {
    (
        format!(
            "http://{}/.well-known/acme-challenge/{}",
            identifier, token
        ),
        key_authorization.to_string(),
    )
}
