//! Wire codec for the calculator protocol.
//!
//! Fixed-width frames with no length prefix, checksum or version byte. All
//! integers are signed 32-bit, big-endian.
//!
//! ```text
//! request:  [u8 tag: 'A' | 'S'][i32 BE: lhs][i32 BE: rhs]
//! response: [i32 BE: result]
//! ```

use crate::service::ArithmeticService;
use crate::{PipeCalcError, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Width of the argument payload that follows the tag byte.
pub const ARGS_WIDTH: usize = 8;

/// Width of a response frame.
pub const RESULT_WIDTH: usize = 4;

/// Width of a complete request frame.
pub const REQUEST_WIDTH: usize = 1 + ARGS_WIDTH;

/// Operation tag carried in the first byte of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add,
    Subtract,
}

impl Operation {
    pub const TAG_ADD: u8 = b'A';
    pub const TAG_SUBTRACT: u8 = b'S';

    pub fn to_byte(self) -> u8 {
        match self {
            Operation::Add => Self::TAG_ADD,
            Operation::Subtract => Self::TAG_SUBTRACT,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            Self::TAG_ADD => Ok(Operation::Add),
            Self::TAG_SUBTRACT => Ok(Operation::Subtract),
            _ => Err(PipeCalcError::InvalidOperation { byte }),
        }
    }

    /// Dispatch to the arithmetic collaborator.
    pub fn apply<S: ArithmeticService + ?Sized>(self, service: &S, lhs: i32, rhs: i32) -> i32 {
        match self {
            Operation::Add => service.add(lhs, rhs),
            Operation::Subtract => service.subtract(lhs, rhs),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Subtract => "subtract",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = PipeCalcError;

    /// Accepts the operation name or its wire tag, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "add" | "a" => Ok(Operation::Add),
            "subtract" | "sub" | "s" => Ok(Operation::Subtract),
            _ => Err(PipeCalcError::Config {
                message: format!("unknown operation: {}", s),
            }),
        }
    }
}

/// One calculator request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub operation: Operation,
    pub lhs: i32,
    pub rhs: i32,
}

impl Request {
    pub fn new(operation: Operation, lhs: i32, rhs: i32) -> Self {
        Self { operation, lhs, rhs }
    }

    /// Encode the whole frame: tag byte followed by the argument payload.
    pub fn encode(&self) -> [u8; REQUEST_WIDTH] {
        let mut frame = [0u8; REQUEST_WIDTH];
        frame[0] = self.operation.to_byte();
        frame[1..].copy_from_slice(&encode_args(self.lhs, self.rhs));
        frame
    }
}

pub fn encode_args(lhs: i32, rhs: i32) -> [u8; ARGS_WIDTH] {
    let mut buf = [0u8; ARGS_WIDTH];
    buf[..4].copy_from_slice(&lhs.to_be_bytes());
    buf[4..].copy_from_slice(&rhs.to_be_bytes());
    buf
}

pub fn decode_args(bytes: &[u8]) -> Result<(i32, i32)> {
    let bytes: &[u8; ARGS_WIDTH] = bytes.try_into().map_err(|_| PipeCalcError::MalformedPayload {
        expected: ARGS_WIDTH,
        actual: bytes.len(),
    })?;
    let lhs = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let rhs = i32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    Ok((lhs, rhs))
}

pub fn encode_result(value: i32) -> [u8; RESULT_WIDTH] {
    value.to_be_bytes()
}

pub fn decode_result(bytes: &[u8]) -> Result<i32> {
    let bytes: [u8; RESULT_WIDTH] = bytes.try_into().map_err(|_| PipeCalcError::MalformedResponse {
        expected: RESULT_WIDTH,
        actual: bytes.len(),
    })?;
    Ok(i32::from_be_bytes(bytes))
}

/// Read up to `N` bytes, stopping early only at end of stream.
///
/// Returns the buffer and the number of bytes actually filled.
async fn read_fixed<R, const N: usize>(reader: &mut R) -> std::io::Result<([u8; N], usize)>
where
    R: AsyncReadExt + Unpin,
{
    let mut buf = [0u8; N];
    let mut filled = 0;
    while filled < N {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok((buf, filled))
}

/// Read and decode the tag byte that opens a request frame.
///
/// Returns `None` on clean EOF (peer closed connection).
pub async fn read_operation<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Operation>> {
    let mut tag = [0u8; 1];
    if reader.read(&mut tag).await? == 0 {
        return Ok(None);
    }
    Operation::from_byte(tag[0]).map(Some)
}

/// Read and decode the argument payload. A stream that ends early yields
/// `MalformedPayload` with the number of bytes that did arrive.
pub async fn read_args<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<(i32, i32)> {
    let (buf, filled) = read_fixed::<R, ARGS_WIDTH>(reader).await?;
    decode_args(&buf[..filled])
}

/// Read and decode a response frame.
///
/// A channel that closes before the full frame arrives is a failed request,
/// not a malformed one.
pub async fn read_result<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<i32> {
    let (buf, filled) = read_fixed::<R, RESULT_WIDTH>(reader)
        .await
        .map_err(PipeCalcError::request_failed)?;
    if filled < RESULT_WIDTH {
        return Err(PipeCalcError::RequestFailed {
            message: format!(
                "channel closed after {} of {} response bytes",
                filled, RESULT_WIDTH
            ),
        });
    }
    decode_result(&buf)
}

/// Write a complete request frame.
pub async fn write_request<W: AsyncWriteExt + Unpin>(writer: &mut W, request: &Request) -> Result<()> {
    writer.write_all(&[request.operation.to_byte()]).await?;
    writer
        .write_all(&encode_args(request.lhs, request.rhs))
        .await?;
    writer.flush().await?;
    Ok(())
}

/// Write a response frame.
pub async fn write_result<W: AsyncWriteExt + Unpin>(writer: &mut W, value: i32) -> Result<()> {
    writer.write_all(&encode_result(value)).await?;
    writer.flush().await?;
    Ok(())
}
