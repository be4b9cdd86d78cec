use serde::{Deserialize, Serialize};

use super::messages::{
    ClientMessage, ErrorMsg, ForfeitMsg, ForfeitNotificationMsg, GameInitRequestMsg, LeaveMatchMsg,
    LeaveMsg, MatchFoundMsg, MatchStartMsg, MessageType, MoveCommandMsg, QuitMsg, ServerMessage,
    TournamentMsg, WinnerMsg,
};
use crate::game::{GameInitData, GameSnapshot};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum message payload size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    UnknownMessageType(u8),
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::UnknownMessageType(b) => write!(f, "unknown message type: 0x{b:02x}"),
            Self::PayloadTooLarge(size) => {
                write!(
                    f,
                    "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})"
                )
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a serializable payload with a 1-byte type prefix.
pub fn encode_message<T: Serialize>(
    msg_type: MessageType,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let payload_bytes = rmp_serde::to_vec_named(payload)
        .map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    let total = 1 + payload_bytes.len();
    if total > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(total));
    }
    let mut buf = Vec::with_capacity(total);
    buf.push(msg_type as u8);
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

/// Encode a `ClientMessage` to wire format.
pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ClientMessage::MoveCommand(m) => encode_message(MessageType::MoveCommand, m),
        ClientMessage::GameInitRequest(m) => encode_message(MessageType::GameInitRequest, m),
        ClientMessage::Forfeit(m) => encode_message(MessageType::Forfeit, m),
        ClientMessage::Quit(m) => encode_message(MessageType::Quit, m),
        ClientMessage::Leave(m) => encode_message(MessageType::Leave, m),
    }
}

/// Encode a `ServerMessage` to wire format.
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ServerMessage::GameStateUpdate(m) => encode_message(MessageType::GameStateUpdate, m),
        ServerMessage::GameInit(m) => encode_message(MessageType::GameInit, m.as_ref()),
        ServerMessage::WinnerMessage(m) => encode_message(MessageType::WinnerMessage, m),
        ServerMessage::ForfeitNotification(m) => {
            encode_message(MessageType::ForfeitNotification, m)
        },
        ServerMessage::TournamentMessage(m) => encode_message(MessageType::TournamentMessage, m),
        ServerMessage::MatchStart(m) => encode_message(MessageType::MatchStart, m),
        ServerMessage::MatchFound(m) => encode_message(MessageType::MatchFound, m),
        ServerMessage::LeaveMatch(m) => encode_message(MessageType::LeaveMatch, m),
        ServerMessage::Error(m) => encode_message(MessageType::Error, m),
    }
}

/// Extract the message type byte from raw wire data.
pub fn decode_message_type(data: &[u8]) -> Result<MessageType, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    MessageType::from_byte(data[0]).ok_or(ProtocolError::UnknownMessageType(data[0]))
}

/// Decode a MessagePack payload (bytes after the type prefix).
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    rmp_serde::from_slice(&data[1..]).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Decode raw wire data into a `ClientMessage`.
pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::MoveCommand => Ok(ClientMessage::MoveCommand(decode_payload::<
            MoveCommandMsg,
        >(data)?)),
        MessageType::GameInitRequest => Ok(ClientMessage::GameInitRequest(decode_payload::<
            GameInitRequestMsg,
        >(data)?)),
        MessageType::Forfeit => Ok(ClientMessage::Forfeit(decode_payload::<ForfeitMsg>(data)?)),
        MessageType::Quit => Ok(ClientMessage::Quit(decode_payload::<QuitMsg>(data)?)),
        MessageType::Leave => Ok(ClientMessage::Leave(decode_payload::<LeaveMsg>(data)?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}

/// Decode raw wire data into a `ServerMessage`.
pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::GameStateUpdate => Ok(ServerMessage::GameStateUpdate(decode_payload::<
            GameSnapshot,
        >(data)?)),
        MessageType::GameInit => Ok(ServerMessage::GameInit(Box::new(decode_payload::<
            GameInitData,
        >(data)?))),
        MessageType::WinnerMessage => Ok(ServerMessage::WinnerMessage(decode_payload::<
            WinnerMsg,
        >(data)?)),
        MessageType::ForfeitNotification => Ok(ServerMessage::ForfeitNotification(
            decode_payload::<ForfeitNotificationMsg>(data)?,
        )),
        MessageType::TournamentMessage => Ok(ServerMessage::TournamentMessage(decode_payload::<
            TournamentMsg,
        >(data)?)),
        MessageType::MatchStart => Ok(ServerMessage::MatchStart(decode_payload::<
            MatchStartMsg,
        >(data)?)),
        MessageType::MatchFound => Ok(ServerMessage::MatchFound(decode_payload::<
            MatchFoundMsg,
        >(data)?)),
        MessageType::LeaveMatch => Ok(ServerMessage::LeaveMatch(decode_payload::<
            LeaveMatchMsg,
        >(data)?)),
        MessageType::Error => Ok(ServerMessage::Error(decode_payload::<ErrorMsg>(data)?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}
