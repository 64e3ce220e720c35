//! Minimal OSC 1.0 encoding for argument-less messages.

use crate::Result;
use crate::error::IpcError;

/// Encodes an OSC message with no arguments: the address pattern followed by
/// an empty type tag string, each NUL-terminated and padded to 4 bytes.
pub fn encode(address: &str) -> Result<Vec<u8>> {
    validate(address)?;
    let mut buf = Vec::with_capacity(address.len() + 8);
    push_padded(&mut buf, address);
    push_padded(&mut buf, ",");
    Ok(buf)
}

fn validate(address: &str) -> Result<()> {
    let reason = if !address.starts_with('/') {
        "must start with '/'"
    } else if address.contains('\0') {
        "must not contain NUL bytes"
    } else if address.contains(char::is_whitespace) {
        "must not contain whitespace"
    } else {
        return Ok(());
    };
    Err(IpcError::InvalidAddress {
        address: address.escape_debug().to_string(),
        reason: reason.to_string(),
    }
    .into())
}

fn push_padded(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_quit() {
        assert_eq!(encode("/quit").unwrap(), b"/quit\0\0\0,\0\0\0");
    }

    #[test]
    fn test_encode_address_on_padding_boundary() {
        // "/abc" + NUL is 5 bytes, so it pads all the way to 8
        let bytes = encode("/abc").unwrap();
        assert_eq!(&bytes[..8], b"/abc\0\0\0\0");
        assert_eq!(bytes.len(), 12);
    }

    #[test]
    fn test_encode_rejects_bad_addresses() {
        assert!(encode("quit").is_err());
        assert!(encode("/qu\0it").is_err());
        assert!(encode("/two words").is_err());
    }
}
