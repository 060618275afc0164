//! Core types and constants for the echotree protocol.

use alloc::vec::Vec;
use core::fmt;
use core::num::NonZeroU32;

use crate::path::PathCandidate;
use crate::time::Duration;

// Deployment bounds
pub const MAX_NODES: usize = 30;
pub const MAX_TAG_LEN: usize = 8;
pub const MAX_PACKET_SIZE: usize = 128;

// Protocol defaults (reference firmware values)
pub const DEFAULT_LATENCY_BUDGET: u32 = 20;
pub const ECHO_TIMEOUT: Duration = Duration::from_secs(5);
pub const TICK_BASE: Duration = Duration::from_secs(8);
pub const TICK_JITTER: Duration = Duration::from_secs(8);

/// Node identifier, `1..=MAX_NODES`. Zero is never a valid node.
pub type NodeId = u8;

/// Returns true if `id` can name a node.
#[inline]
pub const fn is_valid_node_id(id: NodeId) -> bool {
    id != 0 && id as usize <= MAX_NODES
}

/// Short label a node attaches to the candidates it produces.
///
/// At most `MAX_TAG_LEN` bytes of UTF-8, stored inline.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tag {
    len: u8,
    bytes: [u8; MAX_TAG_LEN],
}

impl Tag {
    pub fn new(s: &str) -> Result<Self, ConfigError> {
        Self::from_bytes(s.as_bytes()).ok_or(ConfigError::TagTooLong)
    }

    /// Builds a tag from raw bytes. Returns `None` if the bytes are too long
    /// or not UTF-8.
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        if raw.len() > MAX_TAG_LEN || core::str::from_utf8(raw).is_err() {
            return None;
        }
        let mut bytes = [0u8; MAX_TAG_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Some(Self {
            len: raw.len() as u8,
            bytes,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn as_str(&self) -> &str {
        // Validated on construction.
        core::str::from_utf8(self.as_bytes()).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-device boot configuration. Immutable once handed to a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Configuration {
    tag: Tag,
    expected_node_count: u8,
    price_cost: u32,
    resource_availability: NonZeroU32,
}

impl Configuration {
    pub fn new(
        tag: &str,
        expected_node_count: u8,
        price_cost: u32,
        resource_availability: u32,
    ) -> Result<Self, ConfigError> {
        let tag = Tag::new(tag)?;
        if expected_node_count == 0 || expected_node_count as usize > MAX_NODES {
            return Err(ConfigError::NodeCountOutOfRange(expected_node_count));
        }
        let resource_availability =
            NonZeroU32::new(resource_availability).ok_or(ConfigError::ZeroResource)?;
        Ok(Self {
            tag,
            expected_node_count,
            price_cost,
            resource_availability,
        })
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn expected_node_count(&self) -> u8 {
        self.expected_node_count
    }

    pub fn price_cost(&self) -> u32 {
        self.price_cost
    }

    pub fn resource_availability(&self) -> NonZeroU32 {
        self.resource_availability
    }

    /// Composite weight this node assigns to a path reaching it with the
    /// given accumulated latency.
    pub fn weight(&self, latency: u32) -> f64 {
        crate::score::weight(latency, self.price_cost, self.resource_availability)
    }
}

/// Invalid boot configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Resource availability must be positive; the weight divides by it.
    ZeroResource,
    /// Expected node count outside `1..=MAX_NODES`.
    NodeCountOutOfRange(u8),
    /// Tag longer than `MAX_TAG_LEN` bytes.
    TagTooLong,
    /// Node id outside `1..=MAX_NODES`.
    InvalidNodeId(NodeId),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroResource => write!(f, "resource availability must be non-zero"),
            ConfigError::NodeCountOutOfRange(n) => {
                write!(f, "expected node count {} outside 1..={}", n, MAX_NODES)
            }
            ConfigError::TagTooLong => write!(f, "tag longer than {} bytes", MAX_TAG_LEN),
            ConfigError::InvalidNodeId(id) => write!(f, "node id {} outside 1..={}", id, MAX_NODES),
        }
    }
}

/// Outgoing frame priority. Lower value is sent first.
///
/// An answer always leaves before the token return that follows it, so the
/// parent merges the child's best path before it can close.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Convergecast answers.
    Answer = 0,
    /// Token grants and returns.
    TokenControl = 1,
    /// RegisterChild.
    Registration = 2,
    /// Requirement floods.
    Flood = 3,
}

/// Raw frame handed to the node by the transport.
#[derive(Clone, Debug)]
pub struct Incoming {
    pub data: Vec<u8>,
}

impl Incoming {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// Events emitted by the node for application handling.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// The node closed. `best` is its frozen best path.
    Closed { best: Option<PathCandidate> },
    /// Sink only: the network has converged on `result`.
    Converged { result: Option<PathCandidate> },
}

/// Per-node transport counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportMetrics {
    pub floods_sent: u32,
    pub directed_sent: u32,
    /// Frames the outgoing queue refused.
    pub send_dropped: u32,
    /// Frames larger than the transport MTU, never queued.
    pub oversized: u32,
    pub floods_received: u32,
    pub directed_received: u32,
    /// Directed frames addressed to another node.
    pub directed_overheard: u32,
    pub decode_failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_bounds() {
        let tag = Tag::new("temp").unwrap();
        assert_eq!(tag.as_str(), "temp");
        assert_eq!(tag.as_bytes().len(), 4);

        assert!(Tag::new("12345678").is_ok());
        assert_eq!(Tag::new("123456789"), Err(ConfigError::TagTooLong));
        assert!(Tag::from_bytes(&[0xff, 0xfe]).is_none());
        assert!(Tag::new("").unwrap().is_empty());
    }

    #[test]
    fn test_configuration_validation() {
        let config = Configuration::new("hum", 3, 20, 20).unwrap();
        assert_eq!(config.tag().as_str(), "hum");
        assert_eq!(config.expected_node_count(), 3);
        assert_eq!(config.price_cost(), 20);
        assert_eq!(config.resource_availability().get(), 20);

        assert_eq!(
            Configuration::new("hum", 3, 20, 0),
            Err(ConfigError::ZeroResource)
        );
        assert_eq!(
            Configuration::new("hum", 0, 20, 20),
            Err(ConfigError::NodeCountOutOfRange(0))
        );
        assert_eq!(
            Configuration::new("hum", 31, 20, 20),
            Err(ConfigError::NodeCountOutOfRange(31))
        );
        assert_eq!(
            Configuration::new("humidity!", 3, 20, 20),
            Err(ConfigError::TagTooLong)
        );
    }

    #[test]
    fn test_node_id_range() {
        assert!(!is_valid_node_id(0));
        assert!(is_valid_node_id(1));
        assert!(is_valid_node_id(30));
        assert!(!is_valid_node_id(31));
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::Answer < Priority::TokenControl);
        assert!(Priority::TokenControl < Priority::Registration);
        assert!(Priority::Registration < Priority::Flood);
    }
}
