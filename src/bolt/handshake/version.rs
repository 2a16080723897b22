//! Bolt protocol version identifiers and handshake proposals.

use std::fmt;

/// Bolt protocol versions implemented by this client.
///
/// Encoded as `0xMMmm` so that plain integer comparison orders
/// versions correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum BoltVersion {
    /// Bolt 1.0 - INIT, embedded transactions
    V1_0 = 0x0100,
    /// Bolt 2.0 - temporal and spatial types
    V2_0 = 0x0200,
    /// Bolt 3.0 - HELLO, explicit BEGIN/COMMIT/ROLLBACK, GOODBYE
    V3_0 = 0x0300,
    /// Bolt 4.0 - multiple databases, numbered PULL/DISCARD
    V4_0 = 0x0400,
    /// Bolt 4.1
    V4_1 = 0x0401,
    /// Bolt 4.2
    V4_2 = 0x0402,
    /// Bolt 4.3 - ROUTE message
    V4_3 = 0x0403,
}

impl BoltVersion {
    /// All implemented versions, newest first.
    pub const ALL: [BoltVersion; 7] = [
        BoltVersion::V4_3,
        BoltVersion::V4_2,
        BoltVersion::V4_1,
        BoltVersion::V4_0,
        BoltVersion::V3_0,
        BoltVersion::V2_0,
        BoltVersion::V1_0,
    ];

    pub fn from_parts(major: u8, minor: u8) -> Option<Self> {
        match (major, minor) {
            (1, 0) => Some(BoltVersion::V1_0),
            (2, 0) => Some(BoltVersion::V2_0),
            (3, 0) => Some(BoltVersion::V3_0),
            (4, 0) => Some(BoltVersion::V4_0),
            (4, 1) => Some(BoltVersion::V4_1),
            (4, 2) => Some(BoltVersion::V4_2),
            (4, 3) => Some(BoltVersion::V4_3),
            _ => None,
        }
    }

    pub fn major(self) -> u8 {
        ((self as u16) >> 8) as u8
    }

    pub fn minor(self) -> u8 {
        ((self as u16) & 0xFF) as u8
    }

    /// Server reply layout: `[0, 0, minor, major]`.
    pub fn to_bytes(self) -> [u8; 4] {
        [0x00, 0x00, self.minor(), self.major()]
    }

    /// Parse a server reply. All zeros, or an unknown pair, yields `None`.
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        Self::from_parts(bytes[3], bytes[2])
    }
}

impl fmt::Display for BoltVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

/// One proposal slot of the client handshake.
///
/// A non-zero `range` offers every minor version from `minor - range`
/// up to `minor` of the same major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionProposal {
    pub major: u8,
    pub minor: u8,
    pub range: u8,
}

impl VersionProposal {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor, range: 0 }
    }

    pub const fn with_range(major: u8, minor: u8, range: u8) -> Self {
        Self { major, minor, range }
    }

    /// Wire layout: `[0, range, minor, major]`.
    pub fn to_bytes(self) -> [u8; 4] {
        [0x00, self.range, self.minor, self.major]
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            major: bytes[3],
            minor: bytes[2],
            range: bytes[1],
        }
    }

    pub fn is_empty(self) -> bool {
        self.major == 0 && self.minor == 0 && self.range == 0
    }

    /// Offered (major, minor) pairs, highest first.
    pub fn offered(self) -> impl Iterator<Item = (u8, u8)> {
        let low = self.minor.saturating_sub(self.range);
        (low..=self.minor).rev().map(move |minor| (self.major, minor))
    }
}

impl From<BoltVersion> for VersionProposal {
    fn from(v: BoltVersion) -> Self {
        VersionProposal::new(v.major(), v.minor())
    }
}

impl fmt::Display for VersionProposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.range == 0 {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            let low = self.minor.saturating_sub(self.range);
            write!(f, "{}.{}..{}.{}", self.major, low, self.major, self.minor)
        }
    }
}

/// Default proposal list: 4.3 down to 4.0, then 4.0, 3.0 and 2.0.
pub const DEFAULT_PROPOSALS: [VersionProposal; 4] = [
    VersionProposal::with_range(4, 3, 3),
    VersionProposal::new(4, 0),
    VersionProposal::new(3, 0),
    VersionProposal::new(2, 0),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parts() {
        assert_eq!(BoltVersion::V4_3.major(), 4);
        assert_eq!(BoltVersion::V4_3.minor(), 3);
        assert_eq!(BoltVersion::from_parts(3, 0), Some(BoltVersion::V3_0));
        assert_eq!(BoltVersion::from_parts(5, 0), None);
        assert_eq!(BoltVersion::from_parts(0, 0), None);
    }

    #[test]
    fn test_version_bytes() {
        assert_eq!(BoltVersion::V4_3.to_bytes(), [0x00, 0x00, 0x03, 0x04]);
        assert_eq!(BoltVersion::from_bytes([0, 0, 0, 3]), Some(BoltVersion::V3_0));
        assert_eq!(BoltVersion::from_bytes([0, 0, 0, 0]), None);
    }

    #[test]
    fn test_version_ordering() {
        assert!(BoltVersion::V4_3 > BoltVersion::V4_2);
        assert!(BoltVersion::V4_0 > BoltVersion::V3_0);
        assert!(BoltVersion::V2_0 > BoltVersion::V1_0);
        let mut sorted = BoltVersion::ALL.to_vec();
        sorted.sort();
        sorted.reverse();
        assert_eq!(sorted, BoltVersion::ALL.to_vec());
    }

    #[test]
    fn test_version_display() {
        assert_eq!(BoltVersion::V1_0.to_string(), "1.0");
        assert_eq!(BoltVersion::V4_3.to_string(), "4.3");
    }

    #[test]
    fn test_default_proposals_layout() {
        let bytes: Vec<[u8; 4]> = DEFAULT_PROPOSALS.iter().map(|p| p.to_bytes()).collect();
        assert_eq!(
            bytes,
            vec![[0, 3, 3, 4], [0, 0, 0, 4], [0, 0, 0, 3], [0, 0, 0, 2]]
        );
    }

    #[test]
    fn test_proposal_range_expansion() {
        let offered: Vec<_> = VersionProposal::with_range(4, 3, 3).offered().collect();
        assert_eq!(offered, vec![(4, 3), (4, 2), (4, 1), (4, 0)]);
        let single: Vec<_> = VersionProposal::new(3, 0).offered().collect();
        assert_eq!(single, vec![(3, 0)]);
        assert_eq!(VersionProposal::with_range(4, 3, 3).to_string(), "4.0..4.3");
    }
}
