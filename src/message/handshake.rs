use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u24, be_u8};
use nom::IResult;

use super::{
    ClientHello, ClientKeyExchange, Finished, HelloVerifyRequest, ServerHello, ServerKeyExchange,
};
use crate::buffer::Buf;
use crate::Error;

/// Handshake message header (RFC 6347 4.2.2).
#[derive(Debug, PartialEq, Eq, Default, Clone, Copy)]
pub struct Header {
    pub msg_type: MessageType,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl Header {
    pub const LEN: usize = 12;

    pub fn is_fragment(&self) -> bool {
        self.fragment_offset != 0 || self.fragment_length != self.length
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Handshake {
    pub header: Header,
    pub body: Body,
}

impl Handshake {
    /// A complete, unfragmented message.
    pub fn new(message_seq: u16, body: Body) -> Self {
        Handshake {
            header: Header {
                msg_type: body.message_type(),
                length: 0,
                message_seq,
                fragment_offset: 0,
                fragment_length: 0,
            },
            body,
        }
    }

    pub fn parse_header(input: &[u8]) -> IResult<&[u8], Header> {
        let (input, msg_type) = MessageType::parse(input)?;
        let (input, length) = be_u24(input)?;
        let (input, message_seq) = be_u16(input)?;
        let (input, fragment_offset) = be_u24(input)?;
        let (input, fragment_length) = be_u24(input)?;

        Ok((
            input,
            Header {
                msg_type,
                length,
                message_seq,
                fragment_offset,
                fragment_length,
            },
        ))
    }

    /// Decode one handshake message.
    ///
    /// Fragmented messages are rejected: this engine never fragments on send
    /// and keeps no reassembly state.
    pub fn decode(input: &[u8]) -> Result<(&[u8], Handshake), Error> {
        let (input, header) = Self::parse_header(input)?;

        if header.is_fragment() {
            return Err(Error::FragmentedHandshake);
        }

        let (rest, body_bytes) = take(header.length as usize)(input)?;
        let (trailing, body) = Body::parse(body_bytes, header.msg_type)?;
        if !trailing.is_empty() {
            return Err(Error::ParseError(format!(
                "{} trailing bytes in {:?}",
                trailing.len(),
                header.msg_type
            )));
        }

        Ok((rest, Handshake { header, body }))
    }

    /// Serialize header and body. The length fields are computed from the body.
    pub fn serialize(&self, output: &mut Buf) {
        let start = output.len();
        output.push(self.header.msg_type.as_u8());
        output.extend_from_slice(&[0; 3]); // length, patched below
        output.extend_from_slice(&self.header.message_seq.to_be_bytes());
        output.extend_from_slice(&[0; 3]); // fragment_offset
        output.extend_from_slice(&[0; 3]); // fragment_length, patched below

        let body_start = output.len();
        self.body.serialize(output);
        let len = (output.len() - body_start) as u32;

        let len_bytes = &len.to_be_bytes()[1..];
        output[start + 1..start + 4].copy_from_slice(len_bytes);
        output[start + 9..start + 12].copy_from_slice(len_bytes);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    HelloRequest, // empty
    ClientHello,
    ServerHello,
    HelloVerifyRequest,
    ServerKeyExchange,
    ServerHelloDone, // empty
    ClientKeyExchange,
    Finished,
    Unknown(u8),
}

impl Default for MessageType {
    fn default() -> Self {
        Self::Unknown(0xff)
    }
}

impl MessageType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => MessageType::HelloRequest,
            1 => MessageType::ClientHello,
            2 => MessageType::ServerHello,
            3 => MessageType::HelloVerifyRequest,
            12 => MessageType::ServerKeyExchange,
            14 => MessageType::ServerHelloDone,
            16 => MessageType::ClientKeyExchange,
            20 => MessageType::Finished,
            _ => MessageType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            MessageType::HelloRequest => 0,
            MessageType::ClientHello => 1,
            MessageType::ServerHello => 2,
            MessageType::HelloVerifyRequest => 3,
            MessageType::ServerKeyExchange => 12,
            MessageType::ServerHelloDone => 14,
            MessageType::ClientKeyExchange => 16,
            MessageType::Finished => 20,
            MessageType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], MessageType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }

    /// Whether a retransmitted copy of this message means the peer lost our
    /// reply. These are the last messages of each peer flight.
    pub fn dupe_triggers_resend(&self) -> bool {
        matches!(
            self,
            MessageType::ClientHello |        // flight 1 and 3
            MessageType::HelloVerifyRequest | // flight 2
            MessageType::ServerHelloDone |    // flight 4
            MessageType::Finished // flight 5 and 6
        )
    }
}

#[derive(Debug, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Body {
    HelloRequest, // empty
    ClientHello(ClientHello),
    HelloVerifyRequest(HelloVerifyRequest),
    ServerHello(ServerHello),
    ServerKeyExchange(ServerKeyExchange),
    ServerHelloDone, // empty
    ClientKeyExchange(ClientKeyExchange),
    Finished(Finished),
    Unknown(u8),
}

impl Body {
    pub fn message_type(&self) -> MessageType {
        match self {
            Body::HelloRequest => MessageType::HelloRequest,
            Body::ClientHello(_) => MessageType::ClientHello,
            Body::HelloVerifyRequest(_) => MessageType::HelloVerifyRequest,
            Body::ServerHello(_) => MessageType::ServerHello,
            Body::ServerKeyExchange(_) => MessageType::ServerKeyExchange,
            Body::ServerHelloDone => MessageType::ServerHelloDone,
            Body::ClientKeyExchange(_) => MessageType::ClientKeyExchange,
            Body::Finished(_) => MessageType::Finished,
            Body::Unknown(v) => MessageType::Unknown(*v),
        }
    }

    pub fn parse(input: &[u8], msg_type: MessageType) -> IResult<&[u8], Body> {
        match msg_type {
            MessageType::HelloRequest => Ok((input, Body::HelloRequest)),
            MessageType::ClientHello => {
                let (input, client_hello) = ClientHello::parse(input)?;
                Ok((input, Body::ClientHello(client_hello)))
            }
            MessageType::HelloVerifyRequest => {
                let (input, hello_verify_request) = HelloVerifyRequest::parse(input)?;
                Ok((input, Body::HelloVerifyRequest(hello_verify_request)))
            }
            MessageType::ServerHello => {
                let (input, server_hello) = ServerHello::parse(input)?;
                Ok((input, Body::ServerHello(server_hello)))
            }
            MessageType::ServerKeyExchange => {
                let (input, server_key_exchange) = ServerKeyExchange::parse(input)?;
                Ok((input, Body::ServerKeyExchange(server_key_exchange)))
            }
            MessageType::ServerHelloDone => Ok((input, Body::ServerHelloDone)),
            MessageType::ClientKeyExchange => {
                let (input, client_key_exchange) = ClientKeyExchange::parse(input)?;
                Ok((input, Body::ClientKeyExchange(client_key_exchange)))
            }
            MessageType::Finished => {
                let (input, finished) = Finished::parse(input)?;
                Ok((input, Body::Finished(finished)))
            }
            MessageType::Unknown(value) => Ok((&input[input.len()..], Body::Unknown(value))),
        }
    }

    pub fn serialize(&self, output: &mut Buf) {
        match self {
            Body::HelloRequest | Body::ServerHelloDone | Body::Unknown(_) => {}
            Body::ClientHello(v) => v.serialize(output),
            Body::HelloVerifyRequest(v) => v.serialize(output),
            Body::ServerHello(v) => v.serialize(output),
            Body::ServerKeyExchange(v) => v.serialize(output),
            Body::ClientKeyExchange(v) => v.serialize(output),
            Body::Finished(v) => v.serialize(output),
        }
    }
}
