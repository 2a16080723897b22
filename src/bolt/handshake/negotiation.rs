//! Bolt handshake negotiation, both sides.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{
    BoltVersion, HandshakeError, VersionProposal, BOLT_MAGIC, HANDSHAKE_RESPONSE_SIZE,
    HANDSHAKE_SIZE, MAX_PROPOSALS,
};
use crate::bolt::error::BoltResult;

/// Build the 20-byte client handshake.
///
/// Unused slots are zero-filled. More than four proposals is an error.
pub fn build_client_handshake(
    proposals: &[VersionProposal],
) -> Result<[u8; HANDSHAKE_SIZE], HandshakeError> {
    if proposals.is_empty() || proposals.len() > MAX_PROPOSALS {
        return Err(HandshakeError::InvalidData(format!(
            "between 1 and {} version proposals required, got {}",
            MAX_PROPOSALS,
            proposals.len()
        )));
    }

    let mut data = [0u8; HANDSHAKE_SIZE];
    data[0..4].copy_from_slice(&BOLT_MAGIC);
    for (i, proposal) in proposals.iter().enumerate() {
        let offset = 4 + i * 4;
        data[offset..offset + 4].copy_from_slice(&proposal.to_bytes());
    }
    Ok(data)
}

/// Interpret the server's 4-byte reply.
pub fn parse_server_response(reply: [u8; HANDSHAKE_RESPONSE_SIZE]) -> Result<BoltVersion, HandshakeError> {
    if reply == [0u8; 4] {
        return Err(HandshakeError::NoCompatibleVersion);
    }
    BoltVersion::from_bytes(reply).ok_or(HandshakeError::UnsupportedVersion {
        major: reply[3],
        minor: reply[2],
    })
}

/// Run the client side of the handshake on a freshly opened stream.
pub async fn handshake<S>(stream: &mut S, proposals: &[VersionProposal]) -> BoltResult<BoltVersion>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = build_client_handshake(proposals)?;
    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut reply = [0u8; HANDSHAKE_RESPONSE_SIZE];
    stream
        .read_exact(&mut reply)
        .await
        .map_err(|_| HandshakeError::ConnectionClosed)?;
    Ok(parse_server_response(reply)?)
}

/// Server-side handshake handler.
///
/// Walks the client's proposals in order and picks the first offered
/// version that is also in `supported_versions`.
#[derive(Debug, Clone)]
pub struct Handshake {
    supported_versions: Vec<BoltVersion>,
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            supported_versions: BoltVersion::ALL.to_vec(),
        }
    }

    pub fn with_versions(versions: Vec<BoltVersion>) -> Self {
        Self {
            supported_versions: versions,
        }
    }

    /// Process a 20-byte client handshake.
    pub fn process(&self, data: &[u8]) -> Result<BoltVersion, HandshakeError> {
        if data.len() < HANDSHAKE_SIZE {
            return Err(HandshakeError::InvalidData(format!(
                "Expected {} bytes, got {}",
                HANDSHAKE_SIZE,
                data.len()
            )));
        }

        let magic = [data[0], data[1], data[2], data[3]];
        if magic != BOLT_MAGIC {
            return Err(HandshakeError::InvalidMagic {
                expected: BOLT_MAGIC,
                received: magic,
            });
        }

        data[4..HANDSHAKE_SIZE]
            .chunks_exact(4)
            .map(|c| VersionProposal::from_bytes([c[0], c[1], c[2], c[3]]))
            .filter(|p| !p.is_empty())
            .flat_map(VersionProposal::offered)
            .filter_map(|(major, minor)| BoltVersion::from_parts(major, minor))
            .find(|v| self.supported_versions.contains(v))
            .ok_or(HandshakeError::NoCompatibleVersion)
    }

    /// Reply bytes for a processed handshake: the version, or all zeros.
    pub fn generate_response(result: &Result<BoltVersion, HandshakeError>) -> [u8; 4] {
        match result {
            Ok(version) => version.to_bytes(),
            Err(_) => [0x00; 4],
        }
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the server side of the handshake.
///
/// The reply is always written, including the all-zero refusal, before
/// any error is returned.
pub async fn accept<S>(stream: &mut S, handshake: &Handshake) -> BoltResult<BoltVersion>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut request = [0u8; HANDSHAKE_SIZE];
    stream
        .read_exact(&mut request)
        .await
        .map_err(|_| HandshakeError::ConnectionClosed)?;

    let result = handshake.process(&request);
    stream.write_all(&Handshake::generate_response(&result)).await?;
    stream.flush().await?;
    Ok(result?)
}
