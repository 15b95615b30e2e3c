//! Client identity

use serde::{Deserialize, Serialize};

/// A network client as seen by the allocation engine
///
/// The engine only ever keys on [`id`](Client::id), the normalized string
/// form of the hardware address. The remaining fields are carried for higher
/// layers and are opaque to the persistence contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Hardware (MAC) address as reported by the protocol layer
    pub hardware_address: String,

    /// Hostname announced by the client, if any
    pub hostname: Option<String>,

    /// Identity used when indexing bindings
    pub id: String,
}

impl Client {
    /// Build a client from its hardware address
    ///
    /// The id is the trimmed, lowercased hardware address so that lookups are
    /// insensitive to the formatting of the source.
    pub fn new(hardware_address: impl Into<String>, hostname: Option<String>) -> Self {
        let hardware_address = hardware_address.into();
        let id = hardware_address.trim().to_ascii_lowercase();
        Self {
            hardware_address,
            hostname,
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_normalized_hardware_address() {
        let client = Client::new(" AA:BB:CC:00:11:22 ", Some("printer".to_string()));
        assert_eq!(client.id, "aa:bb:cc:00:11:22");
        assert_eq!(client.hardware_address, " AA:BB:CC:00:11:22 ");
        assert_eq!(client.hostname.as_deref(), Some("printer"));
    }

    #[test]
    fn equal_macs_with_different_case_share_an_id() {
        let a = Client::new("aa:bb:cc:00:11:22", None);
        let b = Client::new("AA:BB:CC:00:11:22", None);
        assert_eq!(a.id, b.id);
    }
}
