//! Uniform success/failure carrier and the subsystem-banded error taxonomy.
//!
//! `ErrorKind` groups error kinds into numbered bands (general 1-99,
//! connection 100-199, protocol 200-299, transport 300-399, capture 400-499,
//! codec 500-599, audio 600-699, system 700-799, config 800-899,
//! codec-library bridge 900-999), matching the reference implementation's
//! `ErrorCode` enum band-for-band.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorKind {
    // general 1-99
    InvalidParameter = 1,
    NotInitialized = 2,
    AlreadyInitialized = 3,
    AlreadyRunning = 4,
    NotRunning = 5,
    InvalidState = 6,
    InvalidOperation = 7,
    NotImplemented = 8,
    NotSupported = 9,
    Unknown = 99,

    // connection 100-199
    NetworkError = 100,
    ConnectionTimeout = 101,
    ConnectionRefused = 102,
    ConnectionFailed = 103,
    NetworkUnreachable = 104,
    SocketError = 105,
    SocketBindFailed = 106,
    SocketListenFailed = 107,
    SocketConnectFailed = 108,
    SocketSendFailed = 109,
    SocketRecvFailed = 110,
    DnsLookupFailed = 111,
    InvalidAddress = 112,
    PortUnavailable = 113,

    // protocol 200-299
    ProtocolError = 200,
    RtpError = 201,
    RtpHeaderInvalid = 202,
    RtpPayloadInvalid = 203,
    RtpSequenceError = 204,
    HandshakeFailed = 205,
    HandshakeTimeout = 206,
    ReliableTransportError = 207,
    PacketLoss = 208,
    PacketOutOfOrder = 209,
    BufferOverflow = 210,
    BufferUnderflow = 211,
    JitterBufferError = 212,

    // transport 300-399
    TransportError = 300,
    MediaTrackError = 301,
    AudioTrackError = 302,
    VideoTrackError = 303,
    DataChannelError = 304,
    PeerConnectionError = 305,
    TrackDisabled = 306,
    TrackNotConnected = 307,
    ChannelClosed = 308,
    ChannelFull = 309,

    // capture 400-499
    CaptureError = 400,
    ScreenCapturerError = 401,
    ScreenCapturerInitFailed = 402,
    DxgiError = 403,
    DesktopDuplicationError = 404,
    AudioCaptureError = 405,
    CaptureFormatInvalid = 406,
    CaptureResolutionInvalid = 407,
    CaptureTimeoutError = 408,

    // codec 500-599
    CodecError = 500,
    EncoderError = 501,
    EncoderNotFound = 502,
    EncoderInitFailed = 503,
    EncodeFailed = 504,
    DecoderError = 505,
    DecoderNotFound = 506,
    DecoderInitFailed = 507,
    DecodeFailed = 508,
    UnsupportedCodec = 509,
    UnsupportedPixelFormat = 510,
    InvalidBitrate = 511,
    InvalidFrameRate = 512,

    // audio 600-699
    AudioError = 600,
    AudioDeviceError = 601,
    AudioDeviceNotFound = 602,
    AudioDeviceNotInitialized = 603,
    AudioDeviceAlreadyInitialized = 604,
    AudioOutputError = 605,
    AudioFormatNotSupported = 606,
    AudioResampleError = 607,
    AudioBufferError = 608,

    // system 700-799
    SystemError = 700,
    OutOfMemory = 701,
    ThreadError = 702,
    ThreadCreateFailed = 703,
    Timeout = 704,
    InternalError = 705,
    ResourceExhausted = 706,
    PermissionDenied = 707,
    IoError = 708,
    FileNotFound = 709,
    FileAccessDenied = 710,

    // config 800-899
    ConfigError = 800,
    ConfigInvalid = 801,
    ConfigNotFound = 802,
    ConfigVersionMismatch = 803,

    // codec-library bridge 900-999
    EndOfFile = 900,
    InvalidFormat = 901,
    DemuxerNotFound = 902,
    StreamNotFound = 903,
    NetworkTimeout = 904,
    BufferTooSmall = 905,
    RenderError = 906,
}

impl ErrorKind {
    /// Stable PascalCase name, used in logs and `full_message()`.
    pub fn name(self) -> &'static str {
        use ErrorKind::*;
        match self {
            InvalidParameter => "InvalidParameter",
            NotInitialized => "NotInitialized",
            AlreadyInitialized => "AlreadyInitialized",
            AlreadyRunning => "AlreadyRunning",
            NotRunning => "NotRunning",
            InvalidState => "InvalidState",
            InvalidOperation => "InvalidOperation",
            NotImplemented => "NotImplemented",
            NotSupported => "NotSupported",
            Unknown => "Unknown",

            NetworkError => "NetworkError",
            ConnectionTimeout => "ConnectionTimeout",
            ConnectionRefused => "ConnectionRefused",
            ConnectionFailed => "ConnectionFailed",
            NetworkUnreachable => "NetworkUnreachable",
            SocketError => "SocketError",
            SocketBindFailed => "SocketBindFailed",
            SocketListenFailed => "SocketListenFailed",
            SocketConnectFailed => "SocketConnectFailed",
            SocketSendFailed => "SocketSendFailed",
            SocketRecvFailed => "SocketRecvFailed",
            DnsLookupFailed => "DNSLookupFailed",
            InvalidAddress => "InvalidAddress",
            PortUnavailable => "PortUnavailable",

            ProtocolError => "ProtocolError",
            RtpError => "RTPError",
            RtpHeaderInvalid => "RTPHeaderInvalid",
            RtpPayloadInvalid => "RTPPayloadInvalid",
            RtpSequenceError => "RTPSequenceError",
            HandshakeFailed => "HandshakeFailed",
            HandshakeTimeout => "HandshakeTimeout",
            ReliableTransportError => "ReliableTransportError",
            PacketLoss => "PacketLoss",
            PacketOutOfOrder => "PacketOutOfOrder",
            BufferOverflow => "BufferOverflow",
            BufferUnderflow => "BufferUnderflow",
            JitterBufferError => "JitterBufferError",

            TransportError => "TransportError",
            MediaTrackError => "MediaTrackError",
            AudioTrackError => "AudioTrackError",
            VideoTrackError => "VideoTrackError",
            DataChannelError => "DataChannelError",
            PeerConnectionError => "PeerConnectionError",
            TrackDisabled => "TrackDisabled",
            TrackNotConnected => "TrackNotConnected",
            ChannelClosed => "ChannelClosed",
            ChannelFull => "ChannelFull",

            CaptureError => "CaptureError",
            ScreenCapturerError => "ScreenCapturerError",
            ScreenCapturerInitFailed => "ScreenCapturerInitFailed",
            DxgiError => "DXGIError",
            DesktopDuplicationError => "DesktopDuplicationError",
            AudioCaptureError => "AudioCaptureError",
            CaptureFormatInvalid => "CaptureFormatInvalid",
            CaptureResolutionInvalid => "CaptureResolutionInvalid",
            CaptureTimeoutError => "CaptureTimeoutError",

            CodecError => "CodecError",
            EncoderError => "EncoderError",
            EncoderNotFound => "EncoderNotFound",
            EncoderInitFailed => "EncoderInitFailed",
            EncodeFailed => "EncodeFailed",
            DecoderError => "DecoderError",
            DecoderNotFound => "DecoderNotFound",
            DecoderInitFailed => "DecoderInitFailed",
            DecodeFailed => "DecodeFailed",
            UnsupportedCodec => "UnsupportedCodec",
            UnsupportedPixelFormat => "UnsupportedPixelFormat",
            InvalidBitrate => "InvalidBitrate",
            InvalidFrameRate => "InvalidFrameRate",

            AudioError => "AudioError",
            AudioDeviceError => "AudioDeviceError",
            AudioDeviceNotFound => "AudioDeviceNotFound",
            AudioDeviceNotInitialized => "AudioDeviceNotInitialized",
            AudioDeviceAlreadyInitialized => "AudioDeviceAlreadyInitialized",
            AudioOutputError => "AudioOutputError",
            AudioFormatNotSupported => "AudioFormatNotSupported",
            AudioResampleError => "AudioResampleError",
            AudioBufferError => "AudioBufferError",

            SystemError => "SystemError",
            OutOfMemory => "OutOfMemory",
            ThreadError => "ThreadError",
            ThreadCreateFailed => "ThreadCreateFailed",
            Timeout => "Timeout",
            InternalError => "InternalError",
            ResourceExhausted => "ResourceExhausted",
            PermissionDenied => "PermissionDenied",
            IoError => "IOError",
            FileNotFound => "FileNotFound",
            FileAccessDenied => "FileAccessDenied",

            ConfigError => "ConfigError",
            ConfigInvalid => "ConfigInvalid",
            ConfigNotFound => "ConfigNotFound",
            ConfigVersionMismatch => "ConfigVersionMismatch",

            EndOfFile => "EndOfFile",
            InvalidFormat => "InvalidFormat",
            DemuxerNotFound => "DemuxerNotFound",
            StreamNotFound => "StreamNotFound",
            NetworkTimeout => "NetworkTimeout",
            BufferTooSmall => "BufferTooSmall",
            RenderError => "RenderError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A carried error: kind plus a human-readable message.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Renders `"<KindName>: <message>"`.
    pub fn full_message(&self) -> String {
        format!("{}: {}", self.kind.name(), self.message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_message())
    }
}

impl std::error::Error for Error {}

/// `Result<T>` carries either a value of `T` or an `Error`.
#[derive(Debug, Clone)]
pub enum Result<T> {
    Ok(T),
    Err(Error),
}

impl<T> Result<T> {
    pub fn ok(value: T) -> Self {
        Result::Ok(value)
    }

    pub fn err(kind: ErrorKind, message: impl Into<String>) -> Self {
        Result::Err(Error::new(kind, message))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Result::Ok(_))
    }

    pub fn is_err(&self) -> bool {
        matches!(self, Result::Err(_))
    }

    pub fn code(&self) -> Option<ErrorKind> {
        match self {
            Result::Ok(_) => None,
            Result::Err(e) => Some(e.kind()),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Result::Ok(_) => None,
            Result::Err(e) => Some(e.message()),
        }
    }

    /// Panics if `self` is `Err`; only meaningful when the caller has
    /// already checked `is_ok`.
    pub fn value(&self) -> &T {
        match self {
            Result::Ok(v) => v,
            Result::Err(e) => panic!("value() called on Err: {}", e.full_message()),
        }
    }

    pub fn value_or(self, default: T) -> T {
        match self {
            Result::Ok(v) => v,
            Result::Err(_) => default,
        }
    }

    /// Transfers ownership of the value out when ok.
    pub fn take_value(self) -> Option<T> {
        match self {
            Result::Ok(v) => Some(v),
            Result::Err(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Result<U> {
        match self {
            Result::Ok(v) => Result::Ok(f(v)),
            Result::Err(e) => Result::Err(e),
        }
    }

    pub fn map_err(self, f: impl FnOnce(Error) -> Error) -> Result<T> {
        match self {
            Result::Ok(v) => Result::Ok(v),
            Result::Err(e) => Result::Err(f(e)),
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> Result<U>) -> Result<U> {
        match self {
            Result::Ok(v) => f(v),
            Result::Err(e) => Result::Err(e),
        }
    }

    pub fn or_else(self, f: impl FnOnce(Error) -> Result<T>) -> Result<T> {
        match self {
            Result::Ok(v) => Result::Ok(v),
            Result::Err(e) => f(e),
        }
    }
}

impl Result<()> {
    pub fn void_ok() -> Self {
        Result::Ok(())
    }
}

impl<T> From<std::result::Result<T, Error>> for Result<T> {
    fn from(r: std::result::Result<T, Error>) -> Self {
        match r {
            std::result::Result::Ok(v) => Result::Ok(v),
            std::result::Result::Err(e) => Result::Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_message_format() {
        let e = Error::new(ErrorKind::HandshakeTimeout, "no response within 3000ms");
        assert_eq!(e.full_message(), "HandshakeTimeout: no response within 3000ms");
    }

    #[test]
    fn map_transforms_ok_value() {
        let r: Result<i32> = Result::ok(2);
        let r = r.map(|v| v * 10);
        assert!(r.is_ok());
        assert_eq!(*r.value(), 20);
    }

    #[test]
    fn and_then_short_circuits_on_err() {
        let r: Result<i32> = Result::err(ErrorKind::Timeout, "recv timed out");
        let r = r.and_then(|v| Result::ok(v + 1));
        assert!(r.is_err());
        assert_eq!(r.code(), Some(ErrorKind::Timeout));
    }

    #[test]
    fn or_else_recovers() {
        let r: Result<i32> = Result::err(ErrorKind::Timeout, "recv timed out");
        let r = r.or_else(|_| Result::ok(0));
        assert!(r.is_ok());
        assert_eq!(*r.value(), 0);
    }

    #[test]
    fn value_or_default_on_err() {
        let r: Result<i32> = Result::err(ErrorKind::Unknown, "x");
        assert_eq!(r.value_or(7), 7);
    }

    #[test]
    fn band_boundaries_match_reference() {
        assert_eq!(ErrorKind::InvalidParameter as u16, 1);
        assert_eq!(ErrorKind::Unknown as u16, 99);
        assert_eq!(ErrorKind::NetworkError as u16, 100);
        assert_eq!(ErrorKind::PortUnavailable as u16, 113);
        assert_eq!(ErrorKind::ProtocolError as u16, 200);
        assert_eq!(ErrorKind::JitterBufferError as u16, 212);
        assert_eq!(ErrorKind::TransportError as u16, 300);
        assert_eq!(ErrorKind::CaptureError as u16, 400);
        assert_eq!(ErrorKind::CodecError as u16, 500);
        assert_eq!(ErrorKind::AudioError as u16, 600);
        assert_eq!(ErrorKind::SystemError as u16, 700);
        assert_eq!(ErrorKind::ConfigError as u16, 800);
        assert_eq!(ErrorKind::EndOfFile as u16, 900);
    }
}
