//! Domain info wire format.
//!
//! The lookup service answers a resolved host with `identity|ip1,ip2,...`.
//! An empty IP list means the identity is usable from any client address.

/// Record delimiter between the identity and the allow-list.
const FIELD_SEPARATOR: char = '|';

/// Delimiter between allow-list entries.
const IP_SEPARATOR: char = ',';

/// Identity and allow-list decoded from a lookup response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainRecord {
    /// Opaque tenant identity (a UUID in practice, never validated).
    pub identity: String,
    /// Allowed client IP literals. Empty means unrestricted.
    pub allowed_ips: Vec<String>,
}

impl DomainRecord {
    /// Decode a raw `identity|ip,ip` string.
    ///
    /// Decoding is total: anything without a field separator yields an empty
    /// identity with no restriction.
    pub fn decode(raw: &str) -> Self {
        let mut parts = raw.split(FIELD_SEPARATOR);
        let (identity, ips) = match (parts.next(), parts.next()) {
            (Some(identity), Some(ips)) => (identity, ips),
            _ => return Self::default(),
        };

        let allowed_ips = if ips.is_empty() {
            Vec::new()
        } else {
            ips.split(IP_SEPARATOR)
                .map(|ip| ip.trim().to_string())
                .collect()
        };

        Self {
            identity: identity.to_string(),
            allowed_ips,
        }
    }

    /// Encode back into the wire format.
    pub fn encode(&self) -> String {
        format!(
            "{}{}{}",
            self.identity,
            FIELD_SEPARATOR,
            self.allowed_ips.join(&IP_SEPARATOR.to_string())
        )
    }

    /// Whether this record places no restriction on the client address.
    pub fn is_unrestricted(&self) -> bool {
        self.allowed_ips.is_empty()
    }
}
