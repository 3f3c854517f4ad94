//! Typed payloads for each frame tag. Encoding is
//! manual big-endian, matching the wire format exactly; no serde is
//! involved since these are fixed binary layouts, not self-describing
//! documents.

use crate::error::{BapError, Result};
use crate::frame::RAW_MAGIC;
use crate::keycode::KeyCode;
use crate::keyrange::{Disposition, KeyRange};

/// Minimal big-endian cursor over a payload slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.pos + n > self.buf.len() {
            Err(BapError::InvalidPacket("payload too short".into()))
        } else {
            Ok(())
        }
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn u16(&mut self) -> Result<u16> {
        self.need(2)?;
        let v = u16::from_be_bytes(self.buf[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        Ok(v)
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        let v = u32::from_be_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let v = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(v)
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }
}

#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Writer::default()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// `v` version frame payload.
pub struct VersionMsg {
    pub protocol_version: u32,
}

impl VersionMsg {
    pub fn encode(&self) -> Vec<u8> {
        Writer::new().u32(self.protocol_version).into_vec()
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        Ok(VersionMsg { protocol_version: r.u32()? })
    }
}

/// Auth method identifiers.
pub mod auth_method {
    pub const NONE: u32 = 0;
    pub const KEY_FILE: u32 = 1;
    pub const LOCAL_USER: u32 = 2;
    pub const LOCAL_GROUP: u32 = 3;
}

/// `a` auth-offer frame payload (server -> client): an ordered list of
/// method ids the server is willing to accept.
pub struct AuthOffer {
    pub methods: Vec<u32>,
}

impl AuthOffer {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        for m in &self.methods {
            w.u32(*m);
        }
        w.into_vec()
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let mut methods = Vec::new();
        while !r.is_empty() {
            methods.push(r.u32()?);
        }
        Ok(AuthOffer { methods })
    }
}

/// `a` auth-request frame payload (client -> server): chosen method id plus
/// method-specific data.
pub struct AuthRequest {
    pub method: u32,
    pub data: Vec<u8>,
}

impl AuthRequest {
    pub fn encode(&self) -> Vec<u8> {
        Writer::new().u32(self.method).bytes(&self.data).into_vec()
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let method = r.u32()?;
        let data = r.remaining().to_vec();
        Ok(AuthRequest { method, data })
    }
}

/// `t` enter-tty frame payload (client -> server).
pub struct EnterTtyMsg {
    pub path: Vec<u32>,
    pub driver_name: String,
}

impl EnterTtyMsg {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.u32(self.path.len() as u32);
        for p in &self.path {
            w.u32(*p);
        }
        let name_bytes = self.driver_name.as_bytes();
        w.u8(name_bytes.len() as u8);
        w.bytes(name_bytes);
        w.into_vec()
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let n_ttys = r.u32()? as usize;
        let mut path = Vec::with_capacity(n_ttys);
        for _ in 0..n_ttys {
            path.push(r.u32()?);
        }
        let name_len = r.u8()? as usize;
        let name_bytes = r.bytes(name_len)?;
        let driver_name = String::from_utf8_lossy(name_bytes).into_owned();
        Ok(EnterTtyMsg { path, driver_name })
    }
}

/// `F` set-focus frame payload.
pub struct SetFocusMsg {
    pub tty_number: u32,
}

impl SetFocusMsg {
    pub fn encode(&self) -> Vec<u8> {
        Writer::new().u32(self.tty_number).into_vec()
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        Ok(SetFocusMsg { tty_number: r.u32()? })
    }
}

/// `k` key-event frame payload (server -> client).
pub struct KeyMsg {
    pub code: KeyCode,
}

impl KeyMsg {
    pub fn encode(&self) -> Vec<u8> {
        let (hi, lo) = self.code.hi_lo();
        Writer::new().u32(hi).u32(lo).into_vec()
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let hi = r.u32()?;
        let lo = r.u32()?;
        Ok(KeyMsg { code: KeyCode::from_hi_lo(hi, lo) })
    }
}

/// The range-type selector for `ignore_keys`/`accept_keys`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeType {
    All,
    Type,
    Command,
    Key,
    Code,
}

/// `m`/`u` ignore/accept key-range frame payload: a sequence of
/// `(first_hi, first_lo, last_hi, last_lo)` quadruples.
pub struct KeyRangesMsg {
    pub ranges: Vec<KeyRange>,
}

impl KeyRangesMsg {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        for r in &self.ranges {
            let (fhi, flo) = r.first.hi_lo();
            let (lhi, llo) = r.last.hi_lo();
            w.u32(fhi).u32(flo).u32(lhi).u32(llo);
        }
        w.into_vec()
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let mut ranges = Vec::new();
        while !r.is_empty() {
            let fhi = r.u32()?;
            let flo = r.u32()?;
            let lhi = r.u32()?;
            let llo = r.u32()?;
            let first = KeyCode::from_hi_lo(fhi, flo);
            let last = KeyCode::from_hi_lo(lhi, llo);
            let range = KeyRange::new(first, last)
                .ok_or_else(|| BapError::InvalidParameter("first > last in key range".into()))?;
            ranges.push(range);
        }
        Ok(KeyRangesMsg { ranges })
    }

    pub fn disposition_ranges(&self, disposition: Disposition) -> Vec<(KeyRange, Disposition)> {
        self.ranges.iter().map(|r| (*r, disposition)).collect()
    }
}

/// `w` write-cells frame payload. Field presence is driven by the
/// leading bitfield flags, in a fixed field order.
pub mod write_flags {
    pub const DISPLAY_NUMBER: u32 = 0x01;
    pub const REGION: u32 = 0x02;
    pub const TEXT: u32 = 0x04;
    pub const ATTR_AND: u32 = 0x08;
    pub const ATTR_OR: u32 = 0x10;
    pub const CURSOR: u32 = 0x20;
    pub const CHARSET: u32 = 0x40;
}

#[derive(Debug, Clone, Default)]
pub struct WriteMsg {
    pub display_number: Option<u32>,
    pub region: Option<(u32, u32)>,
    pub text: Option<Vec<u8>>,
    pub and_mask: Option<Vec<u8>>,
    pub or_mask: Option<Vec<u8>>,
    pub cursor: Option<u32>,
    pub charset: Option<String>,
}

impl WriteMsg {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        let mut flags = 0u32;
        if self.display_number.is_some() {
            flags |= write_flags::DISPLAY_NUMBER;
        }
        if self.region.is_some() {
            flags |= write_flags::REGION;
        }
        if self.text.is_some() {
            flags |= write_flags::TEXT;
        }
        if self.and_mask.is_some() {
            flags |= write_flags::ATTR_AND;
        }
        if self.or_mask.is_some() {
            flags |= write_flags::ATTR_OR;
        }
        if self.cursor.is_some() {
            flags |= write_flags::CURSOR;
        }
        if self.charset.is_some() {
            flags |= write_flags::CHARSET;
        }
        w.u32(flags);
        if let Some(d) = self.display_number {
            w.u32(d);
        }
        if let Some((begin, size)) = self.region {
            w.u32(begin).u32(size);
        }
        if let Some(text) = &self.text {
            w.u32(text.len() as u32).bytes(text);
        }
        if let Some(mask) = &self.and_mask {
            w.bytes(mask);
        }
        if let Some(mask) = &self.or_mask {
            w.bytes(mask);
        }
        if let Some(c) = self.cursor {
            w.u32(c);
        }
        if let Some(cs) = &self.charset {
            let bytes = cs.as_bytes();
            w.u32(bytes.len() as u32).bytes(bytes);
        }
        w.into_vec()
    }

    pub fn decode(payload: &[u8], region_cell_count: usize) -> Result<Self> {
        let mut r = Reader::new(payload);
        let flags = r.u32()?;
        let mut msg = WriteMsg::default();
        if flags & write_flags::DISPLAY_NUMBER != 0 {
            msg.display_number = Some(r.u32()?);
        }
        let mut cells_in_region = region_cell_count;
        if flags & write_flags::REGION != 0 {
            let begin = r.u32()?;
            let size = r.u32()?;
            cells_in_region = size as usize;
            msg.region = Some((begin, size));
        }
        if flags & write_flags::TEXT != 0 {
            let len = r.u32()? as usize;
            msg.text = Some(r.bytes(len)?.to_vec());
        }
        if flags & write_flags::ATTR_AND != 0 {
            msg.and_mask = Some(r.bytes(cells_in_region)?.to_vec());
        }
        if flags & write_flags::ATTR_OR != 0 {
            msg.or_mask = Some(r.bytes(cells_in_region)?.to_vec());
        }
        if flags & write_flags::CURSOR != 0 {
            msg.cursor = Some(r.u32()?);
        }
        if flags & write_flags::CHARSET != 0 {
            let len = r.u32()? as usize;
            msg.charset = Some(String::from_utf8_lossy(r.bytes(len)?).into_owned());
        }
        Ok(msg)
    }
}

/// `*` enter-raw frame payload.
pub struct EnterRawMsg {
    pub driver_name: String,
}

impl EnterRawMsg {
    pub fn encode(&self) -> Vec<u8> {
        let name_bytes = self.driver_name.as_bytes();
        Writer::new()
            .u32(RAW_MAGIC)
            .u8(name_bytes.len() as u8)
            .bytes(name_bytes)
            .into_vec()
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let magic = r.u32()?;
        if magic != RAW_MAGIC {
            return Err(BapError::InvalidPacket("bad raw-mode magic number".into()));
        }
        let len = r.u8()? as usize;
        let driver_name = String::from_utf8_lossy(r.bytes(len)?).into_owned();
        Ok(EnterRawMsg { driver_name })
    }
}

/// `S` suspend-driver frame payload.
pub struct SuspendDriverMsg {
    pub driver_name: String,
}

impl SuspendDriverMsg {
    pub fn encode(&self) -> Vec<u8> {
        let name_bytes = self.driver_name.as_bytes();
        Writer::new().u8(name_bytes.len() as u8).bytes(name_bytes).into_vec()
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let len = r.u8()? as usize;
        let driver_name = String::from_utf8_lossy(r.bytes(len)?).into_owned();
        Ok(SuspendDriverMsg { driver_name })
    }
}

/// `e` error-frame payload.
pub struct ErrorMsg {
    pub code: u32,
}

impl ErrorMsg {
    pub fn encode(&self) -> Vec<u8> {
        Writer::new().u32(self.code).into_vec()
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        Ok(ErrorMsg { code: r.u32()? })
    }
}

/// `E` exception-frame payload: error code, the type of the offending
/// frame, and a capped excerpt of its payload.
pub struct ExceptionMsg {
    pub code: u32,
    pub offending_type: u32,
    pub excerpt: Vec<u8>,
}

impl ExceptionMsg {
    pub const EXCERPT_CAP: usize = 64;

    pub fn encode(&self) -> Vec<u8> {
        let cap = self.excerpt.len().min(Self::EXCERPT_CAP);
        Writer::new()
            .u32(self.code)
            .u32(self.offending_type)
            .bytes(&self.excerpt[..cap])
            .into_vec()
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let code = r.u32()?;
        let offending_type = r.u32()?;
        Ok(ExceptionMsg { code, offending_type, excerpt: r.remaining().to_vec() })
    }
}

/// `get_display_size` reply payload.
pub struct DisplaySizeMsg {
    pub width: u32,
    pub height: u32,
}

impl DisplaySizeMsg {
    pub fn encode(&self) -> Vec<u8> {
        Writer::new().u32(self.width).u32(self.height).into_vec()
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let width = r.u32()?;
        let height = r.u32()?;
        Ok(DisplaySizeMsg { width, height })
    }
}
