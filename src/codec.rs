//! Wire Codec
//!
//! Encodes and decodes the `_XSETTINGS_SETTINGS` property blob. The format
//! is slightly incorrectly documented by the freedesktop xsettings spec:
//! string value lengths are CARD32 on the wire (not CARD16), and the
//! leading byte-order marker is X11's LSBFirst (0) / MSBFirst (1). Every
//! length field is validated against the buffer before it is read, so
//! truncated or adversarial input fails cleanly instead of reading past
//! the end.
//!
//! Layout, all multi-byte integers in the declared byte order, variable
//! fields padded with zeros to 4-byte alignment:
//!
//! ```text
//! CARD8       byte order (0 = LSBFirst, 1 = MSBFirst)
//! CARD8[3]    unused
//! CARD32      serial of this snapshot
//! CARD32      number of settings
//! per setting:
//!   CARD8     type (0 = int, 1 = string, 2 = color)
//!   CARD8     unused
//!   CARD16    name length, then name bytes + padding
//!   CARD32    last-change serial
//!   payload   INT32 | (CARD32 length, bytes + padding) | 4 x CARD16 rgba
//! ```

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::list::SettingList;
use crate::setting::{Color, Setting, SettingValue};

/// Why a settings blob failed to decode. All variants mean the same thing
/// to a client: no update, keep the previous snapshot.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("settings data is empty")]
    Empty,

    #[error("unknown byte-order marker 0x{0:02x}")]
    BadByteOrder(u8),

    #[error("unexpected end of settings data")]
    UnexpectedEnd,

    #[error("unknown setting type {0}")]
    UnknownType(u8),

    #[error("setting data is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

const LSB_FIRST: u8 = 0;
const MSB_FIRST: u8 = 1;

fn pad(len: usize) -> usize {
    (len + 3) & !3
}

fn get_u8(buf: &mut &[u8]) -> Result<u8, CodecError> {
    if buf.remaining() < 1 {
        return Err(CodecError::UnexpectedEnd);
    }
    Ok(buf.get_u8())
}

fn get_u16(buf: &mut &[u8], big_endian: bool) -> Result<u16, CodecError> {
    if buf.remaining() < 2 {
        return Err(CodecError::UnexpectedEnd);
    }
    Ok(if big_endian {
        buf.get_u16()
    } else {
        buf.get_u16_le()
    })
}

fn get_u32(buf: &mut &[u8], big_endian: bool) -> Result<u32, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::UnexpectedEnd);
    }
    Ok(if big_endian {
        buf.get_u32()
    } else {
        buf.get_u32_le()
    })
}

fn get_i32(buf: &mut &[u8], big_endian: bool) -> Result<i32, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::UnexpectedEnd);
    }
    Ok(if big_endian {
        buf.get_i32()
    } else {
        buf.get_i32_le()
    })
}

fn advance(buf: &mut &[u8], n: usize) -> Result<(), CodecError> {
    if buf.remaining() < n {
        return Err(CodecError::UnexpectedEnd);
    }
    buf.advance(n);
    Ok(())
}

/// Read a length-prefixed byte string whose storage is padded to 4 bytes.
/// The length has already been read; `len` may come from an untrusted
/// CARD32, so the padded size is computed in u64 to dodge overflow.
fn get_padded_bytes(buf: &mut &[u8], len: u64) -> Result<Vec<u8>, CodecError> {
    let padded = (len + 3) & !3;
    if (buf.remaining() as u64) < padded {
        return Err(CodecError::UnexpectedEnd);
    }
    let bytes = buf.chunk()[..len as usize].to_vec();
    buf.advance(padded as usize);
    Ok(bytes)
}

/// Decode a settings property blob into a list and its snapshot serial.
/// Fails without partial results: a malformed entry invalidates the whole
/// buffer.
pub fn decode(data: &[u8]) -> Result<(SettingList, u32), CodecError> {
    if data.is_empty() {
        return Err(CodecError::Empty);
    }

    let mut buf = data;
    let big_endian = match get_u8(&mut buf)? {
        LSB_FIRST => false,
        MSB_FIRST => true,
        other => return Err(CodecError::BadByteOrder(other)),
    };
    advance(&mut buf, 3)?;

    let serial = get_u32(&mut buf, big_endian)?;
    let n_settings = get_u32(&mut buf, big_endian)?;

    let mut list = SettingList::new();
    for _ in 0..n_settings {
        let setting_type = get_u8(&mut buf)?;
        advance(&mut buf, 1)?;

        let name_len = get_u16(&mut buf, big_endian)?;
        let name = String::from_utf8(get_padded_bytes(&mut buf, name_len as u64)?)?;

        let last_change_serial = get_u32(&mut buf, big_endian)?;

        let value = match setting_type {
            0 => SettingValue::Int(get_i32(&mut buf, big_endian)?),
            1 => {
                let value_len = get_u32(&mut buf, big_endian)?;
                let bytes = get_padded_bytes(&mut buf, value_len as u64)?;
                SettingValue::Text(String::from_utf8(bytes)?)
            }
            2 => {
                let red = get_u16(&mut buf, big_endian)?;
                let green = get_u16(&mut buf, big_endian)?;
                let blue = get_u16(&mut buf, big_endian)?;
                let alpha = get_u16(&mut buf, big_endian)?;
                SettingValue::Color(Color::new(red, green, blue, alpha))
            }
            other => return Err(CodecError::UnknownType(other)),
        };

        list.insert_new(Setting {
            name,
            value,
            last_change_serial,
        });
    }

    Ok((list, serial))
}

fn put_u16(buf: &mut Vec<u8>, big_endian: bool, v: u16) {
    if big_endian {
        buf.put_u16(v);
    } else {
        buf.put_u16_le(v);
    }
}

fn put_u32(buf: &mut Vec<u8>, big_endian: bool, v: u32) {
    if big_endian {
        buf.put_u32(v);
    } else {
        buf.put_u32_le(v);
    }
}

fn put_i32(buf: &mut Vec<u8>, big_endian: bool, v: i32) {
    if big_endian {
        buf.put_i32(v);
    } else {
        buf.put_i32_le(v);
    }
}

fn put_padded_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.put_slice(bytes);
    buf.put_bytes(0, pad(bytes.len()) - bytes.len());
}

/// Encode a full snapshot in the host's byte order. Managers publish the
/// result as the `_XSETTINGS_SETTINGS` property in a single write.
pub fn encode(list: &SettingList, serial: u32) -> Vec<u8> {
    encode_with_order(list, serial, cfg!(target_endian = "big"))
}

fn encode_with_order(list: &SettingList, serial: u32, big_endian: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + list.len() * 16);

    buf.put_u8(if big_endian { MSB_FIRST } else { LSB_FIRST });
    buf.put_bytes(0, 3);
    put_u32(&mut buf, big_endian, serial);
    put_u32(&mut buf, big_endian, list.len() as u32);

    for setting in list {
        buf.put_u8(setting.value.type_byte());
        buf.put_u8(0);
        put_u16(&mut buf, big_endian, setting.name.len() as u16);
        put_padded_bytes(&mut buf, setting.name.as_bytes());
        put_u32(&mut buf, big_endian, setting.last_change_serial);

        match &setting.value {
            SettingValue::Int(v) => put_i32(&mut buf, big_endian, *v),
            SettingValue::Text(v) => {
                put_u32(&mut buf, big_endian, v.len() as u32);
                put_padded_bytes(&mut buf, v.as_bytes());
            }
            SettingValue::Color(c) => {
                put_u16(&mut buf, big_endian, c.red);
                put_u16(&mut buf, big_endian, c.green);
                put_u16(&mut buf, big_endian, c.blue);
                put_u16(&mut buf, big_endian, c.alpha);
            }
        }
    }

    buf
}
