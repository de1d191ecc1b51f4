// ABOUTME: Snapcast wire frame encoding and decoding
// ABOUTME: Base header plus length-prefixed JSON/binary payloads, all little-endian

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use crate::error::Error;
use crate::protocol::messages::{
    BaseMessage, Codec, HelloPayload, MessageType, ServerSettingsPayload, Timestamp,
    BASE_MESSAGE_SIZE,
};

fn read_timestamp<R: Read>(r: &mut R) -> Result<Timestamp, Error> {
    let sec = r.read_i32::<LittleEndian>().map_err(Error::Transport)?;
    let usec = r.read_i32::<LittleEndian>().map_err(Error::Transport)?;
    Ok(Timestamp { sec, usec })
}

fn write_timestamp<W: Write>(w: &mut W, t: &Timestamp) -> Result<(), Error> {
    w.write_i32::<LittleEndian>(t.sec).map_err(Error::Transport)?;
    w.write_i32::<LittleEndian>(t.usec).map_err(Error::Transport)?;
    Ok(())
}

/// Decode a base header from exactly `BASE_MESSAGE_SIZE` bytes.
pub fn decode_base_message(buf: &[u8]) -> Result<BaseMessage, Error> {
    if buf.len() < BASE_MESSAGE_SIZE {
        return Err(Error::MalformedFrame(format!(
            "base header too short: {} < {}",
            buf.len(),
            BASE_MESSAGE_SIZE
        )));
    }
    let mut c = Cursor::new(buf);
    let msg_type = c.read_u16::<LittleEndian>().map_err(Error::Transport)?;
    let id = c.read_u16::<LittleEndian>().map_err(Error::Transport)?;
    let refers_to = c.read_u16::<LittleEndian>().map_err(Error::Transport)?;
    let sent = read_timestamp(&mut c)?;
    let received = read_timestamp(&mut c)?;
    let size = c.read_u32::<LittleEndian>().map_err(Error::Transport)?;
    Ok(BaseMessage {
        msg_type,
        id,
        refers_to,
        sent,
        received,
        size,
    })
}

pub fn encode_base_message(msg: &BaseMessage) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::with_capacity(BASE_MESSAGE_SIZE);
    buf.write_u16::<LittleEndian>(msg.msg_type).map_err(Error::Transport)?;
    buf.write_u16::<LittleEndian>(msg.id).map_err(Error::Transport)?;
    buf.write_u16::<LittleEndian>(msg.refers_to).map_err(Error::Transport)?;
    write_timestamp(&mut buf, &msg.sent)?;
    write_timestamp(&mut buf, &msg.received)?;
    buf.write_u32::<LittleEndian>(msg.size).map_err(Error::Transport)?;
    Ok(buf)
}

fn read_length_prefixed_string(c: &mut Cursor<&[u8]>) -> Result<String, Error> {
    let len = c.read_u32::<LittleEndian>().map_err(Error::Transport)? as usize;
    let remaining = c.get_ref().len().saturating_sub(c.position() as usize);
    if len > remaining {
        return Err(Error::MalformedFrame(format!(
            "length-prefixed string claims {len} bytes but only {remaining} remain"
        )));
    }
    let mut s = vec![0u8; len];
    c.read_exact(&mut s).map_err(Error::Transport)?;
    String::from_utf8(s).map_err(|e| Error::MalformedFrame(e.to_string()))
}

fn write_length_prefixed_string<W: Write>(w: &mut W, s: &str) -> Result<(), Error> {
    w.write_u32::<LittleEndian>(s.len() as u32).map_err(Error::Transport)?;
    w.write_all(s.as_bytes()).map_err(Error::Transport)?;
    Ok(())
}

/// HELLO and SERVER_SETTINGS payloads are a u32-length-prefixed UTF-8 JSON blob.
pub fn decode_json_payload<T: serde::de::DeserializeOwned>(buf: &[u8]) -> Result<T, Error> {
    let mut c = Cursor::new(buf);
    let json = read_length_prefixed_string(&mut c)?;
    serde_json::from_str(&json).map_err(|e| Error::MalformedFrame(e.to_string()))
}

pub fn encode_json_payload<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    let json = serde_json::to_string(value).map_err(|e| Error::MalformedFrame(e.to_string()))?;
    let mut buf = Vec::with_capacity(4 + json.len());
    write_length_prefixed_string(&mut buf, &json)?;
    Ok(buf)
}

pub fn decode_hello(buf: &[u8]) -> Result<HelloPayload, Error> {
    decode_json_payload(buf)
}

pub fn encode_hello(hello: &HelloPayload) -> Result<Vec<u8>, Error> {
    encode_json_payload(hello)
}

pub fn decode_server_settings(buf: &[u8]) -> Result<ServerSettingsPayload, Error> {
    decode_json_payload(buf)
}

/// Decoded CODEC_HEADER payload: `{codec: length-prefixed string; size: u32; bytes[size]}`.
pub struct CodecHeaderPayload {
    pub codec: Codec,
    pub data: Vec<u8>,
}

pub fn decode_codec_header(buf: &[u8]) -> Result<CodecHeaderPayload, Error> {
    let mut c = Cursor::new(buf);
    let codec_str = read_length_prefixed_string(&mut c)?;
    let codec = Codec::parse(&codec_str)
        .ok_or_else(|| Error::UnknownCodec(codec_str.clone()))?;
    let size = c.read_u32::<LittleEndian>().map_err(Error::Transport)? as usize;
    let remaining = c.get_ref().len().saturating_sub(c.position() as usize);
    if size > remaining {
        return Err(Error::MalformedFrame(format!(
            "codec header claims {size} bytes but only {remaining} remain"
        )));
    }
    let mut data = vec![0u8; size];
    c.read_exact(&mut data).map_err(Error::Transport)?;
    Ok(CodecHeaderPayload { codec, data })
}

/// Decoded WIRE_CHUNK payload: `{timestamp: Timestamp; size: u32; bytes[size]}`.
pub struct WireChunkPayload {
    pub timestamp: Timestamp,
    pub data: Vec<u8>,
}

pub fn decode_wire_chunk(buf: &[u8]) -> Result<WireChunkPayload, Error> {
    let mut c = Cursor::new(buf);
    let timestamp = read_timestamp(&mut c)?;
    let size = c.read_u32::<LittleEndian>().map_err(Error::Transport)? as usize;
    let remaining = c.get_ref().len().saturating_sub(c.position() as usize);
    if size > remaining {
        return Err(Error::MalformedFrame(format!(
            "wire chunk claims {size} bytes but only {remaining} remain"
        )));
    }
    let mut data = vec![0u8; size];
    c.read_exact(&mut data).map_err(Error::Transport)?;
    Ok(WireChunkPayload { timestamp, data })
}

/// TIME payload is a single latency `Timestamp`.
pub fn decode_time(buf: &[u8]) -> Result<Timestamp, Error> {
    let mut c = Cursor::new(buf);
    read_timestamp(&mut c)
}

pub fn encode_time(latency: &Timestamp) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::with_capacity(8);
    write_timestamp(&mut buf, latency)?;
    Ok(buf)
}

pub fn message_type_of(base: &BaseMessage) -> Result<MessageType, Error> {
    MessageType::from_u16(base.msg_type).ok_or(Error::UnsupportedMessageType(base.msg_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_message_roundtrips() {
        let msg = BaseMessage {
            msg_type: MessageType::Time.as_u16(),
            id: 7,
            refers_to: 0,
            sent: Timestamp { sec: 1, usec: 2 },
            received: Timestamp { sec: 3, usec: 4 },
            size: 8,
        };
        let bytes = encode_base_message(&msg).unwrap();
        assert_eq!(bytes.len(), BASE_MESSAGE_SIZE);
        let decoded = decode_base_message(&bytes).unwrap();
        assert_eq!(decoded.msg_type, msg.msg_type);
        assert_eq!(decoded.id, msg.id);
        assert_eq!(decoded.sent, msg.sent);
        assert_eq!(decoded.received, msg.received);
        assert_eq!(decoded.size, msg.size);
    }

    #[test]
    fn base_message_too_short_is_malformed() {
        let buf = vec![0u8; BASE_MESSAGE_SIZE - 1];
        assert!(matches!(
            decode_base_message(&buf),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn hello_roundtrips() {
        let hello = HelloPayload::new("aa:bb:cc".into(), "client".into(), 0);
        let bytes = encode_hello(&hello).unwrap();
        let decoded = decode_hello(&bytes).unwrap();
        assert_eq!(decoded.mac, hello.mac);
        assert_eq!(decoded.protocol_version, 2);
    }

    #[test]
    fn codec_header_roundtrips_and_rejects_unknown_codec() {
        let mut buf = Vec::new();
        write_length_prefixed_string(&mut buf, "pcm").unwrap();
        buf.write_u32::<LittleEndian>(4).unwrap();
        buf.extend_from_slice(&[1, 2, 3, 4]);
        let decoded = decode_codec_header(&buf).unwrap();
        assert_eq!(decoded.codec, Codec::Pcm);
        assert_eq!(decoded.data, vec![1, 2, 3, 4]);

        let mut bad = Vec::new();
        write_length_prefixed_string(&mut bad, "flac").unwrap();
        bad.write_u32::<LittleEndian>(0).unwrap();
        assert!(matches!(decode_codec_header(&bad), Err(Error::UnknownCodec(_))));
    }

    #[test]
    fn wire_chunk_claiming_too_many_bytes_is_malformed() {
        let mut buf = Vec::new();
        write_timestamp(&mut buf, &Timestamp { sec: 0, usec: 0 }).unwrap();
        buf.write_u32::<LittleEndian>(1000).unwrap();
        buf.extend_from_slice(&[1, 2, 3]);
        assert!(matches!(
            decode_wire_chunk(&buf),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn time_payload_roundtrips_negative_latency() {
        let latency = Timestamp { sec: -1, usec: -500 };
        let bytes = encode_time(&latency).unwrap();
        let decoded = decode_time(&bytes).unwrap();
        assert_eq!(decoded, latency);
    }
}
