//! A single authenticated client.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use bap_protocol::keycode::KeyCode;
use bap_protocol::keyrange::KeyFilter;
use tokio::sync::Notify;

use crate::buffer::BrailleBuffer;
use crate::connection::state::ConnState;
use crate::tty::TtyHandle;

/// Capacity of the per-client key-event buffer.
pub const KEY_EVENT_BUFFER_CAPACITY: usize = 256;

/// A bounded FIFO that drops the oldest entry on overflow, logging a
/// warning at the call site.
#[derive(Debug, Default)]
pub struct KeyEventBuffer {
    queue: VecDeque<KeyCode>,
}

impl KeyEventBuffer {
    pub fn push(&mut self, code: KeyCode) -> bool {
        let dropped = if self.queue.len() >= KEY_EVENT_BUFFER_CAPACITY {
            self.queue.pop_front();
            true
        } else {
            false
        };
        self.queue.push_back(code);
        dropped
    }

    pub fn pop(&mut self) -> Option<KeyCode> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

/// Auto-repeat bookkeeping for one connection.
#[derive(Debug, Clone)]
pub struct AutoRepeatState {
    pub enabled: bool,
    pub delay_ms: u64,
    pub interval_ms: u64,
    pub down_code: Option<KeyCode>,
    pub down_since: Option<Instant>,
    pub last_repeat: Option<Instant>,
}

impl Default for AutoRepeatState {
    fn default() -> Self {
        AutoRepeatState {
            enabled: false,
            delay_ms: 500,
            interval_ms: 100,
            down_code: None,
            down_since: None,
            last_repeat: None,
        }
    }
}

pub struct Connection {
    pub id: u64,
    pub state: ConnState,
    pub tty: Option<TtyHandle>,
    pub filter: KeyFilter,
    pub buffer: BrailleBuffer,
    pub events: KeyEventBuffer,
    pub auto_repeat: AutoRepeatState,
    pub connected_at: Instant,
    /// Woken whenever an event is pushed, so a blocked `read_key` can be
    /// notified without polling — this also cancels a blocked reader on
    /// connection close. Behind an `Arc` so the connection's key-pusher
    /// task can hold its own clone and `.notified().await` without pinning
    /// the connection registry's lock for the duration of the wait.
    pub key_ready: Arc<Notify>,
    pub peer_description: String,
}

impl Connection {
    pub fn new(id: u64, display_width: usize, display_height: usize, peer_description: String) -> Self {
        Connection {
            id,
            state: ConnState::Unauth,
            tty: None,
            filter: KeyFilter::new(),
            buffer: BrailleBuffer::new(display_width, display_height),
            events: KeyEventBuffer::default(),
            auto_repeat: AutoRepeatState::default(),
            connected_at: Instant::now(),
            key_ready: Arc::new(Notify::new()),
            peer_description,
        }
    }

    pub fn is_tty_owner(&self) -> bool {
        matches!(self.state, ConnState::TtyOwner)
    }

    pub fn is_raw(&self) -> bool {
        matches!(self.state, ConnState::Raw)
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self.state, ConnState::Suspend)
    }
}
