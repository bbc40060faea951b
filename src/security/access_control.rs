//! IP allow-list evaluation.

/// Check whether `client_ip` may use an identity restricted to `allowed_ips`.
///
/// An empty list means unrestricted. Otherwise an entry must equal the client
/// IP exactly after trimming; there are no subnet semantics.
pub fn is_allowed<S: AsRef<str>>(client_ip: &str, allowed_ips: &[S]) -> bool {
    if allowed_ips.is_empty() {
        return true;
    }

    let client_ip = client_ip.trim();
    allowed_ips
        .iter()
        .any(|allowed| allowed.as_ref().trim() == client_ip)
}
