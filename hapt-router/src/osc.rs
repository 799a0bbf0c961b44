//! Minimal OSC 1.0 wire codec covering exactly what the router needs:
//! encoding one float-argument message, and decoding datagrams into
//! (address path, float) pairs. Bundles are unpacked recursively;
//! non-float arguments are skipped over so a float can be found at any
//! position in the argument list.
//!
//! All multi-byte fields are big-endian and all strings are
//! nul-terminated and zero-padded to a 4-byte boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OscDecodeError {
    #[error("datagram truncated")]
    Truncated,
    #[error("malformed OSC string")]
    BadString,
    #[error("type tag string missing leading comma")]
    MissingTypeTags,
    #[error("unsupported type tag '{0}'")]
    UnsupportedTag(char),
}

/// Encodes a single-argument float message.
pub fn encode_float(path: &str, value: f32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(path.len() + 12);
    put_str(&mut buf, path);
    put_str(&mut buf, ",f");
    buf.extend_from_slice(&value.to_be_bytes());
    buf
}

/// Decodes one datagram into zero or more (address path, float) pairs.
///
/// A plain message yields at most one pair (its first float argument);
/// a `#bundle` yields the pairs of every contained element. Messages
/// without a float argument decode to nothing.
pub fn decode(datagram: &[u8]) -> Result<Vec<(String, f32)>, OscDecodeError> {
    let mut pairs = Vec::new();
    decode_packet(datagram, &mut pairs)?;
    Ok(pairs)
}

fn decode_packet(buf: &[u8], out: &mut Vec<(String, f32)>) -> Result<(), OscDecodeError> {
    if buf.starts_with(b"#bundle\0") {
        decode_bundle(buf, out)
    } else {
        decode_message(buf, out)
    }
}

fn decode_bundle(buf: &[u8], out: &mut Vec<(String, f32)>) -> Result<(), OscDecodeError> {
    // "#bundle\0" plus an 8-byte time tag the router ignores
    let mut pos = 16;
    if buf.len() < pos {
        return Err(OscDecodeError::Truncated);
    }

    while pos < buf.len() {
        let size = read_u32(buf, &mut pos)? as usize;
        let end = pos
            .checked_add(size)
            .filter(|end| *end <= buf.len())
            .ok_or(OscDecodeError::Truncated)?;
        decode_packet(&buf[pos..end], out)?;
        pos = end;
    }
    Ok(())
}

fn decode_message(buf: &[u8], out: &mut Vec<(String, f32)>) -> Result<(), OscDecodeError> {
    let mut pos = 0;
    let path = read_str(buf, &mut pos)?;

    let tags = read_str(buf, &mut pos)?;
    let tags = tags
        .strip_prefix(',')
        .ok_or(OscDecodeError::MissingTypeTags)?;

    for tag in tags.chars() {
        match tag {
            'f' => {
                let bits = read_u32(buf, &mut pos)?;
                out.push((path.to_string(), f32::from_bits(bits)));
                return Ok(());
            }
            'i' => {
                read_u32(buf, &mut pos)?;
            }
            's' => {
                read_str(buf, &mut pos)?;
            }
            'b' => {
                let len = read_u32(buf, &mut pos)? as usize;
                let end = pos
                    .checked_add(pad4(len))
                    .filter(|end| *end <= buf.len())
                    .ok_or(OscDecodeError::Truncated)?;
                pos = end;
            }
            // zero-size tags
            'T' | 'F' | 'N' | 'I' => {}
            other => return Err(OscDecodeError::UnsupportedTag(other)),
        }
    }
    Ok(())
}

fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

fn read_str<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a str, OscDecodeError> {
    let start = *pos;
    let nul = buf
        .get(start..)
        .and_then(|rest| rest.iter().position(|&b| b == 0))
        .ok_or(OscDecodeError::BadString)?;

    let s = std::str::from_utf8(&buf[start..start + nul]).map_err(|_| OscDecodeError::BadString)?;

    let end = start + pad4(nul + 1);
    if end > buf.len() {
        return Err(OscDecodeError::Truncated);
    }
    *pos = end;
    Ok(s)
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32, OscDecodeError> {
    let bytes = buf
        .get(*pos..*pos + 4)
        .ok_or(OscDecodeError::Truncated)?
        .try_into()
        .map_err(|_| OscDecodeError::Truncated)?;
    *pos += 4;
    Ok(u32::from_be_bytes(bytes))
}
