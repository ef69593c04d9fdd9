use serde::Deserialize;
use serde::Serialize;

/// Header carried by a binary chunk frame: `[4-byte BE header length][header
/// JSON][raw chunk bytes]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryHeader {
    pub id: String,
    #[serde(rename = "uploadId")]
    pub upload_id: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    pub offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum BinaryFrameError {
    #[error("binary frame too short to contain a header length")]
    TooShort,
    #[error("binary frame header length {declared} exceeds frame size {actual}")]
    HeaderTooLong { declared: usize, actual: usize },
    #[error("invalid binary frame header: {0}")]
    InvalidHeader(#[from] serde_json::Error),
}

/// Encode a header + payload into the wire's length-prefixed binary frame.
pub fn encode_binary_frame(header: &BinaryHeader, payload: &[u8]) -> Vec<u8> {
    #[expect(clippy::unwrap_used, reason = "BinaryHeader always serializes")]
    let header_json = serde_json::to_vec(header).unwrap();
    let mut frame = Vec::with_capacity(4 + header_json.len() + payload.len());
    frame.extend_from_slice(&(header_json.len() as u32).to_be_bytes());
    frame.extend_from_slice(&header_json);
    frame.extend_from_slice(payload);
    frame
}

/// Decode a binary frame into its header and a slice of the remaining chunk
/// bytes. Rejects frames whose declared header length exceeds the frame.
pub fn decode_binary_frame(frame: &[u8]) -> Result<(BinaryHeader, &[u8]), BinaryFrameError> {
    if frame.len() < 4 {
        return Err(BinaryFrameError::TooShort);
    }
    let declared = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    if 4 + declared > frame.len() {
        return Err(BinaryFrameError::HeaderTooLong {
            declared,
            actual: frame.len(),
        });
    }
    let header: BinaryHeader = serde_json::from_slice(&frame[4..4 + declared])?;
    Ok((header, &frame[4 + declared..]))
}
