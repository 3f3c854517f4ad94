//! The Driver Port: the server's view of a braille
//! device. Concrete driver protocols are out of scope; this trait is the
//! opaque boundary, grounded in shape on `original_source/Programs/brl_types.h`
//! and `brl_base.h`'s driver vtable (`identify`/`open`/`close`/`writeWindow`/
//! `readCommand`/`readPacket`/`writePacket`, plus parameter get/set).

use async_trait::async_trait;

use crate::error::Result;
use crate::params::{ParamId, ParamScope, ParamValue};
use bap_protocol::keycode::KeyCode;

/// A cell's worth of dots in the canonical 8-dot encoding (bit *i* = dot
/// *i+1*).
pub type Cell = u8;

/// The dimensions of the physical display, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

impl DisplaySize {
    pub fn cell_count(self) -> usize {
        (self.width * self.height) as usize
    }
}

/// The Driver Port. All methods are async because a real driver talks to a
/// serial or USB device; `NullDriver`/`MockDriver` below resolve instantly.
#[async_trait]
pub trait DriverPort: Send + Sync {
    fn name(&self) -> &str;

    fn display_size(&self) -> DisplaySize;

    /// Whether this driver advertises raw-mode passthrough capability.
    fn supports_raw(&self) -> bool;

    /// Opens (or reopens) the underlying channel. Idempotent if already
    /// open.
    async fn open(&self) -> Result<()>;

    /// Closes the underlying channel. Used by the suspend coordinator
    /// and by the arbiter when no client is filling the display.
    async fn close(&self) -> Result<()>;

    async fn is_open(&self) -> bool;

    /// Writes the given cell range to the display. `begin` is a cell
    /// offset, `cells` the new contents of that range.
    async fn write_cells(&self, begin: u32, cells: &[Cell]) -> Result<()>;

    /// Non-blocking poll for the next raw key event, if any is queued. The
    /// dispatcher calls this from the server's main loop; it must
    /// never block.
    async fn poll_key(&self) -> Result<Option<KeyCode>>;

    /// Raw-mode passthrough: write opaque device bytes.
    async fn send_raw(&self, bytes: &[u8]) -> Result<()>;

    /// Raw-mode passthrough: drain whatever the device has produced.
    async fn recv_raw(&self) -> Result<Vec<u8>>;

    /// Resets driver state after raw mode is released. If this fails the
    /// caller is expected to restart the driver (close then open).
    async fn reset(&self) -> Result<()>;

    async fn get_parameter(&self, id: ParamId, subparam: u32, scope: ParamScope) -> Result<ParamValue>;

    async fn set_parameter(
        &self,
        id: ParamId,
        subparam: u32,
        scope: ParamScope,
        value: ParamValue,
    ) -> Result<()>;
}

/// A driver stub that claims no capabilities and always succeeds, mirroring
/// `original_source/brl_static.c`'s statically-linked no-op driver. Useful
/// for `--driver=none` or during server startup before a real driver binds.
pub struct NullDriver {
    size: DisplaySize,
}

impl NullDriver {
    pub fn new(size: DisplaySize) -> Self {
        NullDriver { size }
    }
}

#[async_trait]
impl DriverPort for NullDriver {
    fn name(&self) -> &str {
        "null"
    }

    fn display_size(&self) -> DisplaySize {
        self.size
    }

    fn supports_raw(&self) -> bool {
        false
    }

    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn is_open(&self) -> bool {
        true
    }

    async fn write_cells(&self, _begin: u32, _cells: &[Cell]) -> Result<()> {
        Ok(())
    }

    async fn poll_key(&self) -> Result<Option<KeyCode>> {
        Ok(None)
    }

    async fn send_raw(&self, _bytes: &[u8]) -> Result<()> {
        Err(crate::error::BapError::OpNotSupported)
    }

    async fn recv_raw(&self) -> Result<Vec<u8>> {
        Err(crate::error::BapError::OpNotSupported)
    }

    async fn reset(&self) -> Result<()> {
        Ok(())
    }

    async fn get_parameter(&self, _id: ParamId, _subparam: u32, _scope: ParamScope) -> Result<ParamValue> {
        Err(crate::error::BapError::InvalidParameter("null driver has no parameters".into()))
    }

    async fn set_parameter(
        &self,
        _id: ParamId,
        _subparam: u32,
        _scope: ParamScope,
        _value: ParamValue,
    ) -> Result<()> {
        Err(crate::error::BapError::InvalidParameter("null driver has no parameters".into()))
    }
}

/// A deterministic in-memory driver for tests: records every write, lets
/// the test inject key events and raw bytes, and can be told to advertise
/// raw-mode capability.
pub struct MockDriver {
    size: DisplaySize,
    raw_capable: bool,
    open: std::sync::atomic::AtomicBool,
    cells: tokio::sync::Mutex<Vec<Cell>>,
    pending_keys: tokio::sync::Mutex<std::collections::VecDeque<KeyCode>>,
    pending_raw_in: tokio::sync::Mutex<Vec<u8>>,
    pending_raw_out: tokio::sync::Mutex<std::collections::VecDeque<u8>>,
}

impl MockDriver {
    pub fn new(size: DisplaySize, raw_capable: bool) -> Self {
        MockDriver {
            cells: tokio::sync::Mutex::new(vec![0; size.cell_count()]),
            size,
            raw_capable,
            open: std::sync::atomic::AtomicBool::new(true),
            pending_keys: tokio::sync::Mutex::new(std::collections::VecDeque::new()),
            pending_raw_in: tokio::sync::Mutex::new(Vec::new()),
            pending_raw_out: tokio::sync::Mutex::new(std::collections::VecDeque::new()),
        }
    }

    pub async fn push_key(&self, code: KeyCode) {
        self.pending_keys.lock().await.push_back(code);
    }

    pub async fn push_raw_output(&self, bytes: &[u8]) {
        self.pending_raw_out.lock().await.extend(bytes.iter().copied());
    }

    pub async fn written_cells(&self) -> Vec<Cell> {
        self.cells.lock().await.clone()
    }

    pub async fn raw_input_log(&self) -> Vec<u8> {
        self.pending_raw_in.lock().await.clone()
    }
}

#[async_trait]
impl DriverPort for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn display_size(&self) -> DisplaySize {
        self.size
    }

    fn supports_raw(&self) -> bool {
        self.raw_capable
    }

    async fn open(&self) -> Result<()> {
        self.open.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn is_open(&self) -> bool {
        self.open.load(std::sync::atomic::Ordering::SeqCst)
    }

    async fn write_cells(&self, begin: u32, cells: &[Cell]) -> Result<()> {
        let mut buf = self.cells.lock().await;
        let begin = begin as usize;
        if begin + cells.len() > buf.len() {
            return Err(crate::error::BapError::InvalidParameter("write out of bounds".into()));
        }
        buf[begin..begin + cells.len()].copy_from_slice(cells);
        Ok(())
    }

    async fn poll_key(&self) -> Result<Option<KeyCode>> {
        Ok(self.pending_keys.lock().await.pop_front())
    }

    async fn send_raw(&self, bytes: &[u8]) -> Result<()> {
        if !self.raw_capable {
            return Err(crate::error::BapError::OpNotSupported);
        }
        self.pending_raw_in.lock().await.extend_from_slice(bytes);
        Ok(())
    }

    async fn recv_raw(&self) -> Result<Vec<u8>> {
        let mut q = self.pending_raw_out.lock().await;
        Ok(q.drain(..).collect())
    }

    async fn reset(&self) -> Result<()> {
        Ok(())
    }

    async fn get_parameter(&self, _id: ParamId, _subparam: u32, _scope: ParamScope) -> Result<ParamValue> {
        Ok(ParamValue::U32(0))
    }

    async fn set_parameter(
        &self,
        _id: ParamId,
        _subparam: u32,
        _scope: ParamScope,
        _value: ParamValue,
    ) -> Result<()> {
        Ok(())
    }
}
