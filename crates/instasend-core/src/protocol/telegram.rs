//! Telegram encoding/decoding
//!
//! Telegram format (12 bytes, fixed layout):
//! - 3 bytes: header `55 16 00`
//! - 1 byte: device byte (group | channel | action)
//! - 6 bytes: fixed payload `01 00 00 00 00 00`
//! - 1 byte: checksum, chosen so bytes 0..=10 sum to zero mod 256
//! - 1 byte: terminator `AA` (not part of the checksum)

use std::fmt;

use super::{Command, TelegramError};

/// Total telegram length
pub const TELEGRAM_LEN: usize = 12;

/// Fixed telegram header
pub const HEADER: [u8; 3] = [0x55, 0x16, 0x00];

/// Fixed payload following the device byte
pub const PAYLOAD: [u8; 6] = [0x01, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Telegram terminator
pub const TERMINATOR: u8 = 0xAA;

const CHECKSUM_INDEX: usize = TELEGRAM_LEN - 2;

/// An encoded command frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Telegram {
    bytes: [u8; TELEGRAM_LEN],
}

impl Telegram {
    /// Encode a command into a telegram
    pub fn encode(command: &Command) -> Self {
        let mut bytes = [0u8; TELEGRAM_LEN];
        bytes[..3].copy_from_slice(&HEADER);
        bytes[3] = command.device_byte();
        bytes[4..CHECKSUM_INDEX].copy_from_slice(&PAYLOAD);
        bytes[CHECKSUM_INDEX] = checksum(&bytes[..CHECKSUM_INDEX]);
        bytes[TELEGRAM_LEN - 1] = TERMINATOR;
        Self { bytes }
    }

    /// Validate raw bytes and decode the command they carry
    pub fn decode(data: &[u8]) -> Result<Command, TelegramError> {
        Self::from_bytes(data)?.command()
    }

    /// Validate the frame layout and checksum of raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, TelegramError> {
        let bytes: [u8; TELEGRAM_LEN] = data
            .try_into()
            .map_err(|_| TelegramError::InvalidLength(data.len()))?;

        if bytes[..3] != HEADER {
            return Err(TelegramError::InvalidHeader([bytes[0], bytes[1], bytes[2]]));
        }

        if bytes[TELEGRAM_LEN - 1] != TERMINATOR {
            return Err(TelegramError::InvalidTerminator(bytes[TELEGRAM_LEN - 1]));
        }

        let expected = checksum(&bytes[..CHECKSUM_INDEX]);
        let actual = bytes[CHECKSUM_INDEX];
        if expected != actual {
            return Err(TelegramError::ChecksumMismatch { expected, actual });
        }

        Ok(Self { bytes })
    }

    /// The command carried by this telegram
    pub fn command(&self) -> Result<Command, TelegramError> {
        Command::from_device_byte(self.device_byte())
            .ok_or(TelegramError::InvalidDeviceByte(self.device_byte()))
    }

    /// The device byte (position 3)
    pub fn device_byte(&self) -> u8 {
        self.bytes[3]
    }

    /// The checksum byte (position 10)
    pub fn checksum(&self) -> u8 {
        self.bytes[CHECKSUM_INDEX]
    }

    /// Raw wire bytes
    pub fn as_bytes(&self) -> &[u8; TELEGRAM_LEN] {
        &self.bytes
    }
}

impl fmt::Display for Telegram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

/// Additive complement: the value that brings the byte sum to 0 mod 256
pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0u8.wrapping_sub(sum)
}

/// Reassembles telegrams from an inbound byte stream
///
/// A frame starts at a `0x55` byte and is complete after 12 bytes. Bytes
/// seen while no frame is open are dropped. When a complete frame fails
/// validation, scanning resumes at the next `0x55` inside it, so a stray
/// header byte cannot swallow the telegram that follows.
#[derive(Debug, Default)]
pub struct FrameScanner {
    buffer: Vec<u8>,
}

impl FrameScanner {
    /// Create an empty scanner
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(TELEGRAM_LEN),
        }
    }

    /// Feed one byte; returns the validation result once a frame is complete
    pub fn push(&mut self, byte: u8) -> Option<Result<Command, TelegramError>> {
        if self.buffer.is_empty() && byte != HEADER[0] {
            return None;
        }
        self.buffer.push(byte);
        if self.buffer.len() < TELEGRAM_LEN {
            return None;
        }

        match Telegram::from_bytes(&self.buffer) {
            Ok(telegram) => {
                self.reset();
                Some(telegram.command())
            }
            Err(e) => {
                self.resync();
                Some(Err(e))
            }
        }
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Keep the buffered bytes from the next header byte on
    fn resync(&mut self) {
        match self.buffer[1..].iter().position(|&b| b == HEADER[0]) {
            Some(pos) => {
                self.buffer.drain(..=pos);
            }
            None => self.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_a1on() {
        let cmd: Command = "a1on".parse().unwrap();
        let telegram = Telegram::encode(&cmd);
        assert_eq!(
            telegram.as_bytes(),
            &[0x55, 0x16, 0x00, 0x40, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x54, 0xAA]
        );
        assert_eq!(telegram.to_string(), "55 16 00 40 01 00 00 00 00 00 54 AA");
    }

    #[test]
    fn test_encode_c8off() {
        let cmd: Command = "c8off".parse().unwrap();
        let telegram = Telegram::encode(&cmd);
        assert_eq!(telegram.device_byte(), 0x97);
        // 0x55 + 0x16 + 0x97 + 0x01 = 0x103 -> 0x03, complement 0xFD
        assert_eq!(telegram.checksum(), 0xFD);
    }

    #[test]
    fn test_checksum_of_zero_sum_is_zero() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x80, 0x80]), 0);
        assert_eq!(checksum(&[0xFF]), 0x01);
    }

    #[test]
    fn test_decode_rejects_corruption() {
        let cmd: Command = "b5on".parse().unwrap();
        let good = *Telegram::encode(&cmd).as_bytes();

        assert_eq!(
            Telegram::decode(&good[..11]),
            Err(TelegramError::InvalidLength(11))
        );

        let mut bad_header = good;
        bad_header[1] = 0x32;
        assert_eq!(
            Telegram::decode(&bad_header),
            Err(TelegramError::InvalidHeader([0x55, 0x32, 0x00]))
        );

        let mut bad_terminator = good;
        bad_terminator[11] = 0xAB;
        assert_eq!(
            Telegram::decode(&bad_terminator),
            Err(TelegramError::InvalidTerminator(0xAB))
        );

        let mut bad_sum = good;
        bad_sum[3] ^= 0x01;
        assert!(matches!(
            Telegram::decode(&bad_sum),
            Err(TelegramError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_device_byte() {
        let mut bytes = [0x55, 0x16, 0x00, 0x03, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xAA];
        bytes[10] = checksum(&bytes[..10]);
        assert_eq!(
            Telegram::decode(&bytes),
            Err(TelegramError::InvalidDeviceByte(0x03))
        );
    }

    #[test]
    fn test_frame_scanner_skips_noise() {
        let cmd: Command = "a7off".parse().unwrap();
        let telegram = Telegram::encode(&cmd);
        let mut scanner = FrameScanner::new();

        for noise in [0x05, 0xFA, 0x00] {
            assert!(scanner.push(noise).is_none());
        }

        let mut decoded = None;
        for b in telegram.as_bytes() {
            if let Some(result) = scanner.push(*b) {
                decoded = Some(result);
            }
        }
        assert_eq!(decoded, Some(Ok(cmd)));
    }

    #[test]
    fn test_frame_scanner_resyncs_after_stray_header() {
        let cmd: Command = "a7off".parse().unwrap();
        let mut scanner = FrameScanner::new();

        let mut stream = vec![0x55];
        stream.extend_from_slice(Telegram::encode(&cmd).as_bytes());
        let results: Vec<_> = stream.iter().filter_map(|b| scanner.push(*b)).collect();

        assert_eq!(
            results,
            vec![
                Err(TelegramError::InvalidHeader([0x55, 0x55, 0x16])),
                Ok(cmd),
            ]
        );
    }

    #[test]
    fn test_frame_scanner_reset_drops_partial_frame() {
        let cmd: Command = "b1on".parse().unwrap();
        let telegram = Telegram::encode(&cmd);
        let mut scanner = FrameScanner::new();

        for b in &telegram.as_bytes()[..6] {
            assert!(scanner.push(*b).is_none());
        }
        scanner.reset();

        let decoded: Vec<_> = telegram
            .as_bytes()
            .iter()
            .filter_map(|b| scanner.push(*b))
            .collect();
        assert_eq!(decoded, vec![Ok(cmd)]);
    }
}
