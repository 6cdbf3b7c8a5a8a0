// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Request decoding and response encoding.
//!
//! [`decode_request`] parses one raw device frame into a [`RequestFrame`];
//! [`ResponseBuffer`] is the reusable per-worker buffer a handler encodes
//! its response into. [`encode_request`] builds frames the way the driver
//! does, for tests and exerciser tooling.

use crate::frame::{
    dirent_reclen, AttrRecord, OpCode, ProtoError, RequestFrame, ResponseHeader, ResultCode,
    DEVICE_BUFFER_SIZE, DIRENT_HEADER_LEN, MAX_PASS_LEN, MAX_PATH_LEN, MAX_PAYLOAD,
    MAX_SERVER_LEN, MAX_USER_LEN, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
};

struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtoError> {
        let remaining = self.buf.len() - self.pos;
        if remaining < len {
            return Err(ProtoError::MalformedFrame {
                at: self.pos,
                needed: len,
                remaining,
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_i64(&mut self) -> Result<i64, ProtoError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(i64::from_ne_bytes(raw))
    }

    fn read_u64(&mut self, field: &'static str) -> Result<u64, ProtoError> {
        let value = self.read_i64()?;
        u64::try_from(value).map_err(|_| ProtoError::NegativeField { field, value })
    }

    fn read_string(&mut self, width: usize) -> Result<String, ProtoError> {
        let raw = self.take(width)?;
        Ok(trim_field(raw))
    }
}

/// Strip the fixed-width padding from a wire string field. The driver pads
/// with NUL or space bytes; anything at or below ASCII space counts as
/// padding on both ends.
fn trim_field(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_matches(|c: char| c <= ' ')
        .to_string()
}

/// Decode one request frame from raw device bytes.
///
/// Reads the five i64 header fields, the padded string fields, and, when
/// `size > 0`, the trailing payload, capped at [`MAX_PAYLOAD`] bytes.
/// The operation tag is returned raw; [`OpCode`] validation belongs to the
/// dispatcher.
pub fn decode_request(buf: &[u8]) -> Result<RequestFrame, ProtoError> {
    let mut reader = FrameReader::new(buf);

    let op = reader.read_i64()?;
    let size = reader.read_u64("size")?;
    let offset = reader.read_u64("offset")?;
    let data_size = reader.read_u64("datasize")?;
    let flags = reader.read_i64()? as u64;
    let pathname = reader.read_string(MAX_PATH_LEN)?;
    let base_path = reader.read_string(MAX_PATH_LEN)?;
    let server = reader.read_string(MAX_SERVER_LEN)?;
    let username = reader.read_string(MAX_USER_LEN)?;
    let password = reader.read_string(MAX_PASS_LEN)?;

    let payload = if size > 0 {
        let take = (size as usize).min(MAX_PAYLOAD);
        reader.take(take)?.to_vec()
    } else {
        Vec::new()
    };

    tracing::trace!(
        op,
        size,
        offset,
        data_size,
        pathname = %pathname,
        base_path = %base_path,
        "decoded request frame"
    );

    Ok(RequestFrame {
        op,
        size,
        offset,
        data_size,
        flags,
        pathname,
        base_path,
        server,
        username,
        password,
        payload,
    })
}

fn put_padded(out: &mut Vec<u8>, value: &str, width: usize) -> Result<(), ProtoError> {
    let bytes = value.as_bytes();
    if bytes.len() > width {
        return Err(ProtoError::Overflow {
            requested: bytes.len(),
            capacity: width,
        });
    }
    out.extend_from_slice(bytes);
    out.resize(out.len() + (width - bytes.len()), 0);
    Ok(())
}

/// Encode a request frame the way the driver lays it out. The inverse of
/// [`decode_request`] up to field trimming; used by tests and by exerciser
/// clients that speak to the daemon over a scripted channel.
pub fn encode_request(frame: &RequestFrame) -> Result<Vec<u8>, ProtoError> {
    let mut out = Vec::with_capacity(REQUEST_HEADER_SIZE + frame.payload.len());
    out.extend_from_slice(&frame.op.to_ne_bytes());
    out.extend_from_slice(&(frame.size as i64).to_ne_bytes());
    out.extend_from_slice(&(frame.offset as i64).to_ne_bytes());
    out.extend_from_slice(&(frame.data_size as i64).to_ne_bytes());
    out.extend_from_slice(&(frame.flags as i64).to_ne_bytes());
    put_padded(&mut out, &frame.pathname, MAX_PATH_LEN)?;
    put_padded(&mut out, &frame.base_path, MAX_PATH_LEN)?;
    put_padded(&mut out, &frame.server, MAX_SERVER_LEN)?;
    put_padded(&mut out, &frame.username, MAX_USER_LEN)?;
    put_padded(&mut out, &frame.password, MAX_PASS_LEN)?;
    if frame.payload.len() > MAX_PAYLOAD {
        return Err(ProtoError::Overflow {
            requested: frame.payload.len(),
            capacity: MAX_PAYLOAD,
        });
    }
    out.extend_from_slice(&frame.payload);
    Ok(out)
}

/// Parse a response header from raw bytes.
pub fn decode_response_header(buf: &[u8]) -> Result<ResponseHeader, ProtoError> {
    let mut reader = FrameReader::new(buf);
    Ok(ResponseHeader {
        op: reader.read_i64()?,
        result: reader.read_i64()?,
        data_len: reader.read_i64()?,
    })
}

/// Reusable response buffer owned by one worker for its whole lifetime.
///
/// A handler must encode exactly one header for every frame it consumes.
/// The usual order is [`encode_header`](Self::encode_header) first, payload
/// after; ReadDir instead calls [`begin_payload`](Self::begin_payload),
/// writes its records, then encodes the header once the accumulated length
/// is known. Re-encoding the header never disturbs payload bytes already
/// written.
pub struct ResponseBuffer {
    buf: Vec<u8>,
    limit: usize,
    pos: usize,
}

impl Default for ResponseBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; DEVICE_BUFFER_SIZE],
            limit: 0,
            pos: 0,
        }
    }

    /// Write the three-field header and bound the frame at
    /// `RESPONSE_HEADER_SIZE + data_len`. Leaves the cursor right after the
    /// header so payload writes land at the start of the data region.
    pub fn encode_header(
        &mut self,
        op: OpCode,
        result: ResultCode,
        data_len: usize,
    ) -> Result<(), ProtoError> {
        let total = RESPONSE_HEADER_SIZE + data_len;
        if total > self.buf.len() {
            return Err(ProtoError::Overflow {
                requested: data_len,
                capacity: self.buf.len() - RESPONSE_HEADER_SIZE,
            });
        }
        self.buf[0..8].copy_from_slice(&(op as i64).to_ne_bytes());
        self.buf[8..16].copy_from_slice(&result.value().to_ne_bytes());
        self.buf[16..24].copy_from_slice(&(data_len as i64).to_ne_bytes());
        self.limit = total;
        self.pos = RESPONSE_HEADER_SIZE;
        Ok(())
    }

    /// Encode a zero-payload header, for operations whose whole answer is
    /// the result code. Always fits, so failure paths can rely on it
    /// unconditionally.
    pub fn encode_status(&mut self, op: OpCode, result: ResultCode) {
        self.buf[0..8].copy_from_slice(&(op as i64).to_ne_bytes());
        self.buf[8..16].copy_from_slice(&result.value().to_ne_bytes());
        self.buf[16..24].copy_from_slice(&0i64.to_ne_bytes());
        self.limit = RESPONSE_HEADER_SIZE;
        self.pos = RESPONSE_HEADER_SIZE;
    }

    /// Park the cursor at the start of the payload region and open the whole
    /// buffer for writing, for handlers that only learn the payload length
    /// after encoding it.
    pub fn begin_payload(&mut self) {
        self.pos = RESPONSE_HEADER_SIZE;
        self.limit = self.buf.len();
    }

    /// Bytes of payload written since the cursor last passed the header.
    pub fn payload_len(&self) -> usize {
        self.pos - RESPONSE_HEADER_SIZE
    }

    fn ensure(&mut self, len: usize) -> Result<(), ProtoError> {
        if self.pos + len > self.limit {
            return Err(ProtoError::Overflow {
                requested: self.payload_len() + len,
                capacity: self.limit - RESPONSE_HEADER_SIZE,
            });
        }
        Ok(())
    }

    pub fn put_i64(&mut self, value: i64) -> Result<(), ProtoError> {
        self.ensure(8)?;
        self.buf[self.pos..self.pos + 8].copy_from_slice(&value.to_ne_bytes());
        self.pos += 8;
        Ok(())
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), ProtoError> {
        self.ensure(bytes.len())?;
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// Append one directory entry record: i64 record length, the name, a NUL
    /// terminator, then zero padding out to the 8-byte-aligned record length
    /// so a reader can hop records without parsing names.
    pub fn put_dir_entry(&mut self, name: &[u8]) -> Result<(), ProtoError> {
        let reclen = dirent_reclen(name.len());
        self.ensure(reclen)?;
        self.put_i64(reclen as i64)?;
        self.put_bytes(name)?;
        let pad = reclen - DIRENT_HEADER_LEN - name.len();
        // NUL terminator plus alignment padding
        self.buf[self.pos..self.pos + pad].fill(0);
        self.pos += pad;
        Ok(())
    }

    /// Append the 72-byte attribute record.
    pub fn put_attr(&mut self, attr: &AttrRecord) -> Result<(), ProtoError> {
        self.put_i64(attr.mode as i64)?;
        self.put_i64(attr.size as i64)?;
        self.put_i64(attr.kind)?;
        self.put_i64(attr.mtime_sec)?;
        self.put_i64(attr.mtime_nsec)?;
        self.put_i64(attr.atime_sec)?;
        self.put_i64(attr.atime_nsec)?;
        self.put_i64(attr.ctime_sec)?;
        self.put_i64(attr.ctime_nsec)?;
        Ok(())
    }

    /// Mutable view of the first `len` payload bytes, for handlers that read
    /// file data straight into the response frame.
    pub fn payload_window(&mut self, len: usize) -> Result<&mut [u8], ProtoError> {
        if RESPONSE_HEADER_SIZE + len > self.buf.len() {
            return Err(ProtoError::Overflow {
                requested: len,
                capacity: self.buf.len() - RESPONSE_HEADER_SIZE,
            });
        }
        Ok(&mut self.buf[RESPONSE_HEADER_SIZE..RESPONSE_HEADER_SIZE + len])
    }

    /// The finished frame: header plus declared payload.
    pub fn frame(&self) -> &[u8] {
        &self.buf[..self.limit]
    }
}
