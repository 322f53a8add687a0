/// Protocol version carried in every message. Fixed by RFC 7252.
pub const VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Confirmable,
    NonConfirmable,
    Acknowledgement,
    Reset,
}

impl MessageType {
    pub fn to_number(self) -> u8 {
        match self {
            MessageType::Confirmable => 0,
            MessageType::NonConfirmable => 1,
            MessageType::Acknowledgement => 2,
            MessageType::Reset => 3,
        }
    }

    pub fn from_number(n: u8) -> MessageType {
        match n & 0x3 {
            0 => MessageType::Confirmable,
            1 => MessageType::NonConfirmable,
            2 => MessageType::Acknowledgement,
            _ => MessageType::Reset,
        }
    }

    /// CON and NON originate a transaction; ACK and RST terminate one.
    pub fn originates_transaction(self) -> bool {
        matches!(self, MessageType::Confirmable | MessageType::NonConfirmable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    // 2.xx
    Created,
    Deleted,
    Valid,
    Changed,
    Content,
    Continue,

    // 4.xx
    BadRequest,
    Unauthorized,
    BadOption,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    RequestEntityTooLarge,
    UnsupportedContentFormat,

    // 5.xx
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Empty,
    Request(RequestType),
    Response(ResponseType),
    Reserved(u8),
}

impl From<u8> for MessageClass {
    fn from(code: u8) -> MessageClass {
        match code {
            0x00 => MessageClass::Empty,

            0x01 => MessageClass::Request(RequestType::Get),
            0x02 => MessageClass::Request(RequestType::Post),
            0x03 => MessageClass::Request(RequestType::Put),
            0x04 => MessageClass::Request(RequestType::Delete),

            0x41 => MessageClass::Response(ResponseType::Created),
            0x42 => MessageClass::Response(ResponseType::Deleted),
            0x43 => MessageClass::Response(ResponseType::Valid),
            0x44 => MessageClass::Response(ResponseType::Changed),
            0x45 => MessageClass::Response(ResponseType::Content),
            0x5F => MessageClass::Response(ResponseType::Continue),

            0x80 => MessageClass::Response(ResponseType::BadRequest),
            0x81 => MessageClass::Response(ResponseType::Unauthorized),
            0x82 => MessageClass::Response(ResponseType::BadOption),
            0x83 => MessageClass::Response(ResponseType::Forbidden),
            0x84 => MessageClass::Response(ResponseType::NotFound),
            0x85 => MessageClass::Response(ResponseType::MethodNotAllowed),
            0x86 => MessageClass::Response(ResponseType::NotAcceptable),
            0x8D => MessageClass::Response(ResponseType::RequestEntityTooLarge),
            0x8F => MessageClass::Response(ResponseType::UnsupportedContentFormat),

            0x90 => MessageClass::Response(ResponseType::InternalServerError),
            0x91 => MessageClass::Response(ResponseType::NotImplemented),
            0x92 => MessageClass::Response(ResponseType::BadGateway),
            0x93 => MessageClass::Response(ResponseType::ServiceUnavailable),
            0x94 => MessageClass::Response(ResponseType::GatewayTimeout),

            n => MessageClass::Reserved(n),
        }
    }
}

impl From<MessageClass> for u8 {
    fn from(class: MessageClass) -> u8 {
        match class {
            MessageClass::Empty => 0x00,

            MessageClass::Request(RequestType::Get) => 0x01,
            MessageClass::Request(RequestType::Post) => 0x02,
            MessageClass::Request(RequestType::Put) => 0x03,
            MessageClass::Request(RequestType::Delete) => 0x04,

            MessageClass::Response(ResponseType::Created) => 0x41,
            MessageClass::Response(ResponseType::Deleted) => 0x42,
            MessageClass::Response(ResponseType::Valid) => 0x43,
            MessageClass::Response(ResponseType::Changed) => 0x44,
            MessageClass::Response(ResponseType::Content) => 0x45,
            MessageClass::Response(ResponseType::Continue) => 0x5F,

            MessageClass::Response(ResponseType::BadRequest) => 0x80,
            MessageClass::Response(ResponseType::Unauthorized) => 0x81,
            MessageClass::Response(ResponseType::BadOption) => 0x82,
            MessageClass::Response(ResponseType::Forbidden) => 0x83,
            MessageClass::Response(ResponseType::NotFound) => 0x84,
            MessageClass::Response(ResponseType::MethodNotAllowed) => 0x85,
            MessageClass::Response(ResponseType::NotAcceptable) => 0x86,
            MessageClass::Response(ResponseType::RequestEntityTooLarge) => 0x8D,
            MessageClass::Response(ResponseType::UnsupportedContentFormat) => 0x8F,

            MessageClass::Response(ResponseType::InternalServerError) => 0x90,
            MessageClass::Response(ResponseType::NotImplemented) => 0x91,
            MessageClass::Response(ResponseType::BadGateway) => 0x92,
            MessageClass::Response(ResponseType::ServiceUnavailable) => 0x93,
            MessageClass::Response(ResponseType::GatewayTimeout) => 0x94,

            MessageClass::Reserved(n) => n,
        }
    }
}

impl std::fmt::Display for MessageClass {
    /// Formats as the dotted "c.dd" notation, e.g. `2.05`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = u8::from(*self);
        write!(f, "{}.{:02}", code >> 5, code & 0x1F)
    }
}

/// The fixed part of every message. Token length is derived from the
/// token itself at encode time, so it does not live here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub message_type: MessageType,
    pub code: MessageClass,
    pub message_id: u16,
}

impl Header {
    pub fn new() -> Header {
        Header {
            message_type: MessageType::Confirmable,
            code: MessageClass::Empty,
            message_id: 0,
        }
    }
}

impl Default for Header {
    fn default() -> Header {
        Header::new()
    }
}
