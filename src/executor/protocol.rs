//! Wire protocol between the coordinator and worker processes
//!
//! Frames are a big-endian `u32` length followed by that many bytes. Control
//! messages are JSON frames; a `Completed` reply is followed by one raw frame
//! holding the encoded partial result (see [`super::codec`]).

use super::TaskContext;
use crate::error::ChunkFailure;
use crate::fileset::Chunk;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Read, Write};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_FRAME_LEN: u32 = 512 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Worker pipe error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid protocol message: {0}")]
    Message(#[from] serde_json::Error),

    #[error("Frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(u64),

    #[error("Peer closed the connection mid-conversation")]
    Closed,

    #[error("Unexpected message: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Setup {
        processor: String,
        state: Value,
        context: TaskContext,
    },
    Process {
        chunk: Chunk,
    },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Ready,
    Rejected { reason: String },
    Completed { index: usize, entries: u64 },
    Failed { failure: ChunkFailure },
}

fn check_len(len: usize) -> Result<u32, ProtocolError> {
    u32::try_from(len)
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or(ProtocolError::FrameTooLarge(len as u64))
}

pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError> {
    let len = check_len(payload.len())?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}

/// Read one frame; `None` when the stream ends cleanly before a frame starts
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len as u64));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ProtocolError::Closed,
        _ => e.into(),
    })?;
    Ok(Some(payload))
}

pub fn write_message<W: Write, M: Serialize>(writer: &mut W, message: &M) -> Result<(), ProtocolError> {
    write_frame(writer, &serde_json::to_vec(message)?)
}

pub fn read_message<R: Read, M: DeserializeOwned>(reader: &mut R) -> Result<Option<M>, ProtocolError> {
    read_frame(reader)?
        .map(|payload| serde_json::from_slice(&payload).map_err(ProtocolError::from))
        .transpose()
}

pub async fn write_frame_async<W>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let len = check_len(payload.len())?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame_async<R>(reader: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(ProtocolError::Closed),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len as u64));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ProtocolError::Closed,
        _ => e.into(),
    })?;
    Ok(payload)
}

pub async fn write_message_async<W, M>(writer: &mut W, message: &M) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    M: Serialize,
{
    write_frame_async(writer, &serde_json::to_vec(message)?).await
}

pub async fn read_message_async<R, M>(reader: &mut R) -> Result<M, ProtocolError>
where
    R: AsyncRead + Unpin,
    M: DeserializeOwned,
{
    let payload = read_frame_async(reader).await?;
    Ok(serde_json::from_slice(&payload)?)
}
