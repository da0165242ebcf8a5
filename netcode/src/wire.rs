//! Command codes and read/write helpers for the wire protocol (protocol version 1). All
//! multibyte integers are little-endian.

use crate::error::{NetworkError, NetworkResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

pub const PROTOCOL_VERSION: u16 = 1;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Command {
    ConnectionRequest = 0,
    ConnectionAck = 1,
    ConnectionClose = 2,
    Message = 3,
    ReliableMessage = 4,
    ReliableLinkState = 5,
    ReliableAck = 6,
    LinkUp = 7,
    LinkDown = 8,
    LinkUpdate = 9,
}

impl Command {
    pub fn from_byte(byte: u8) -> NetworkResult<Command> {
        Ok(match byte {
            0 => Command::ConnectionRequest,
            1 => Command::ConnectionAck,
            2 => Command::ConnectionClose,
            3 => Command::Message,
            4 => Command::ReliableMessage,
            5 => Command::ReliableLinkState,
            6 => Command::ReliableAck,
            7 => Command::LinkUp,
            8 => Command::LinkDown,
            9 => Command::LinkUpdate,
            _ => return Err(NetworkError::InvalidProtocolFrame("unknown command code")),
        })
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AckCode {
    Success = 0,
    Failed = 1,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConnectionAckResult {
    Accepted = 0,
    Rejected = 1,
    NoCommonProtocol = 2,
}

pub type Reader<'a> = Cursor<&'a [u8]>;
pub type Writer<'a> = Cursor<&'a mut Vec<u8>>;

/// Reads a `u16`-length-prefixed byte run and returns an owned copy — used by both the
/// `String` and `Data` value variants, and by the `ReliableLinkState` identifying payload.
pub fn read_length_prefixed(reader: &mut impl Read) -> NetworkResult<Vec<u8>> {
    let len = reader.read_u16::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn write_length_prefixed(writer: &mut impl Write, bytes: &[u8]) -> NetworkResult<()> {
    if bytes.len() > u16::MAX as usize {
        return Err(NetworkError::InvalidArgument("payload exceeds u16 length prefix"));
    }
    writer.write_u16::<LittleEndian>(bytes.len() as u16)?;
    writer.write_all(bytes)?;
    Ok(())
}
