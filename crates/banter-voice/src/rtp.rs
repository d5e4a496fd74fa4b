//! RTP framing, IP discovery packets, and secretbox sealing.
//!
//! Media packets are 12-byte RTP headers followed by the
//! xsalsa20-poly1305 sealed Opus frame; the nonce is the RTP header padded
//! to 24 bytes with zeros.

use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Key, Nonce, XSalsa20Poly1305};

use crate::{VoiceError, VoiceResult};

/// RTP header length in bytes.
pub const RTP_HEADER_LEN: usize = 12;

/// Secretbox nonce length in bytes.
pub const NONCE_LEN: usize = 24;

/// IP discovery frame length in bytes.
pub const DISCOVERY_LEN: usize = 74;

/// Opus sample rate in Hz.
pub const SAMPLE_RATE: u32 = 48_000;

/// Samples per Opus frame (20 ms at 48 kHz).
pub const FRAME_SIZE: u32 = 960;

/// Encryption mode announced during protocol selection.
pub const ENCRYPTION_MODE: &str = "xsalsa20_poly1305";

/// A decoded inbound media packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Synchronization source of the sender.
    pub ssrc: u32,

    /// RTP sequence number.
    pub sequence: u16,

    /// RTP timestamp in samples.
    pub timestamp: u32,

    /// First two RTP header bytes (version/flags and payload type).
    pub kind: [u8; 2],

    /// Decrypted Opus frame, header extension stripped.
    pub opus: Vec<u8>,
}

/// Build a secretbox cipher from the op-4 session key.
#[must_use]
pub fn cipher(secret_key: &[u8; 32]) -> XSalsa20Poly1305 {
    XSalsa20Poly1305::new(Key::from_slice(secret_key))
}

/// Compose a 12-byte RTP header: `0x80 0x78 seq(BE) timestamp(BE) ssrc(BE)`.
#[must_use]
pub fn rtp_header(sequence: u16, timestamp: u32, ssrc: u32) -> [u8; RTP_HEADER_LEN] {
    let mut header = [0u8; RTP_HEADER_LEN];
    header[0] = 0x80;
    header[1] = 0x78;
    header[2..4].copy_from_slice(&sequence.to_be_bytes());
    header[4..8].copy_from_slice(&timestamp.to_be_bytes());
    header[8..12].copy_from_slice(&ssrc.to_be_bytes());
    header
}

/// Seal an Opus frame into a full `header || ciphertext` UDP payload.
///
/// # Errors
///
/// Returns [`VoiceError::Crypto`] when sealing fails.
pub fn seal_frame(
    cipher: &XSalsa20Poly1305,
    sequence: u16,
    timestamp: u32,
    ssrc: u32,
    opus: &[u8],
) -> VoiceResult<Vec<u8>> {
    let header = rtp_header(sequence, timestamp, ssrc);

    let mut nonce = [0u8; NONCE_LEN];
    nonce[..RTP_HEADER_LEN].copy_from_slice(&header);

    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), opus)
        .map_err(|_| VoiceError::Crypto("seal"))?;

    let mut packet = Vec::with_capacity(RTP_HEADER_LEN + sealed.len());
    packet.extend_from_slice(&header);
    packet.extend_from_slice(&sealed);
    Ok(packet)
}

/// Open an inbound UDP payload into a [`Packet`].
///
/// Returns `None` for frames that are not RTP media (too short, or an
/// unexpected leading byte); those are skipped, not errors.
///
/// # Errors
///
/// Returns [`VoiceError::Crypto`] when the ciphertext fails to open.
pub fn open_frame(cipher: &XSalsa20Poly1305, buf: &[u8]) -> VoiceResult<Option<Packet>> {
    if buf.len() < RTP_HEADER_LEN || (buf[0] != 0x80 && buf[0] != 0x90) {
        return Ok(None);
    }

    let mut nonce = [0u8; NONCE_LEN];
    nonce[..RTP_HEADER_LEN].copy_from_slice(&buf[..RTP_HEADER_LEN]);

    let mut opus = cipher
        .decrypt(Nonce::from_slice(&nonce), &buf[RTP_HEADER_LEN..])
        .map_err(|_| VoiceError::Crypto("open"))?;

    // RFC 8285 one-byte header extension: present when the X bit is set and
    // the second byte's marker is clear; skip 4 + 4 * extlen bytes.
    if buf[0] & 0x10 == 0x10 && buf[1] & 0x80 == 0 && opus.len() >= 4 {
        let extlen = u16::from_be_bytes([opus[2], opus[3]]) as usize;
        let shift = 4 + 4 * extlen;
        if opus.len() > shift {
            opus.drain(..shift);
        }
    }

    Ok(Some(Packet {
        ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        sequence: u16::from_be_bytes([buf[2], buf[3]]),
        timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        kind: [buf[0], buf[1]],
        opus,
    }))
}

/// Build the 74-byte IP discovery request.
#[must_use]
pub fn discovery_request(ssrc: u32) -> [u8; DISCOVERY_LEN] {
    let mut frame = [0u8; DISCOVERY_LEN];
    frame[..2].copy_from_slice(&1u16.to_be_bytes());
    frame[2..4].copy_from_slice(&70u16.to_be_bytes());
    frame[4..8].copy_from_slice(&ssrc.to_be_bytes());
    frame
}

/// Parse the external address out of a discovery response: a
/// null-terminated ASCII IP starting at offset 8 and a trailing big-endian
/// port.
///
/// # Errors
///
/// Returns [`VoiceError::PacketTooSmall`] for responses shorter than the
/// protocol's 74 bytes.
pub fn parse_discovery_response(buf: &[u8]) -> VoiceResult<(String, u16)> {
    if buf.len() < DISCOVERY_LEN {
        return Err(VoiceError::PacketTooSmall { len: buf.len() });
    }

    let mut ip = String::new();
    for &byte in &buf[8..buf.len() - 2] {
        if byte == 0 {
            break;
        }
        ip.push(byte as char);
    }

    let port = u16::from_be_bytes([buf[buf.len() - 2], buf[buf.len() - 1]]);
    Ok((ip, port))
}
