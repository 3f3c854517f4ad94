//! `ServerCore`: global mutable state becomes an owned value with
//! explicit fine-grained locks along a fixed lock order. Every shared
//! piece of state the server touches lives here, each behind
//! its own `tokio::sync::Mutex`, acquired in the order `connections` →
//! `raw/suspend` → `tty` → `driver` (the
//! driver trait object manages its own internal synchronization, so it is
//! never itself behind a core-level lock).

use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::info;

use bap_protocol::keycode::KeyCode;

use crate::arbiter::Arbiter;
use crate::config::Config;
use crate::connection::{Connection, ConnectionRegistry};
use crate::dispatch::{self, DispatchOutcome};
use crate::driver::DriverPort;
use crate::error::{BapError, Result};
use crate::params::ParamStore;
use crate::raw::{self, RawSuspendSingleton};
use crate::suspend;
use crate::tty::{TtyHandle, TtyTree};

pub struct ServerCore {
    pub connections: Mutex<ConnectionRegistry>,
    pub raw_suspend: Mutex<RawSuspendSingleton>,
    pub tty: Mutex<TtyTree>,
    pub arbiter: Mutex<Arbiter>,
    pub params: ParamStore,
    pub driver: Arc<dyn DriverPort>,
    pub config: Config,
}

impl ServerCore {
    pub fn new(driver: Arc<dyn DriverPort>, config: Config) -> Self {
        let display_len = driver.display_size().cell_count();
        info!(driver = driver.name(), cells = display_len, "server core initialized");
        ServerCore {
            connections: Mutex::new(ConnectionRegistry::new(config.security.max_unauthenticated)),
            raw_suspend: Mutex::new(RawSuspendSingleton::new()),
            tty: Mutex::new(TtyTree::new()),
            arbiter: Mutex::new(Arbiter::new(display_len)),
            params: ParamStore::new(),
            driver,
            config,
        }
    }

    pub fn display_cell_count(&self) -> usize {
        self.driver.display_size().cell_count()
    }

    pub async fn register_connection(&self, peer_description: String) -> u64 {
        let width = self.driver.display_size().width as usize;
        let height = self.driver.display_size().height as usize;
        let mut connections = self.connections.lock().await;
        connections.insert(|id| Connection::new(id, width, height, peer_description))
    }

    /// Clones the connection's key-ready handle so a key-pusher task can
    /// wait on it without holding the connections lock.
    pub async fn key_ready_handle(&self, conn_id: u64) -> Option<Arc<Notify>> {
        let connections = self.connections.lock().await;
        connections.get(conn_id).map(|c| c.key_ready.clone())
    }

    pub async fn pop_key_event(&self, conn_id: u64) -> Option<KeyCode> {
        let mut connections = self.connections.lock().await;
        connections.get_mut(conn_id).and_then(|c| c.events.pop())
    }

    /// Tears down a connection on close or abnormal loss: detaches it from
    /// its tty, releases raw/suspend if it was the holder, and removes it
    /// from the registry.
    pub async fn drop_connection(&self, conn_id: u64, tty_handle: Option<TtyHandle>) {
        {
            let mut raw_suspend = self.raw_suspend.lock().await;
            if raw_suspend.is_held_by(conn_id) {
                let _ = self.driver.reset().await;
                raw_suspend.release(conn_id);
            }
        }
        if let Some(handle) = tty_handle {
            let mut tty = self.tty.lock().await;
            tty.detach(handle, conn_id);
        }
        let mut connections = self.connections.lock().await;
        connections.remove(conn_id);
    }

    pub async fn enter_tty(&self, conn_id: u64, path: &[u32]) -> Result<TtyHandle> {
        let mut tty = self.tty.lock().await;
        crate::tty::enter(&mut tty, path, conn_id)
    }

    pub fn display_size(&self) -> crate::driver::DisplaySize {
        self.driver.display_size()
    }

    /// Validates and applies a connection-state transition,
    /// mutating the stored state only if the trigger is legal.
    pub async fn apply_trigger(&self, conn_id: u64, trigger: crate::connection::Trigger) -> Result<()> {
        let mut connections = self.connections.lock().await;
        let conn = connections.get_mut(conn_id).ok_or(BapError::UnknownTty)?;
        conn.state = conn.state.apply(trigger)?;
        Ok(())
    }

    /// Applies a `write` frame to a connection's buffer.
    pub async fn write_buffer(
        &self,
        conn_id: u64,
        region: (usize, usize),
        text: Option<&[u8]>,
        and_mask: Option<&[u8]>,
        or_mask: Option<&[u8]>,
        cursor: Option<u32>,
    ) -> Result<()> {
        let mut connections = self.connections.lock().await;
        let conn = connections.get_mut(conn_id).ok_or(BapError::UnknownTty)?;
        conn.buffer.write_region(region.0, region.1, text, and_mask, or_mask, cursor)
    }

    /// Applies an ignore/accept key-range update.
    pub async fn set_key_ranges(
        &self,
        conn_id: u64,
        ranges: &[bap_protocol::keyrange::KeyRange],
        disposition: bap_protocol::keyrange::Disposition,
    ) -> Result<()> {
        let mut connections = self.connections.lock().await;
        let conn = connections.get_mut(conn_id).ok_or(BapError::UnknownTty)?;
        for r in ranges {
            conn.filter.add(*r, disposition);
        }
        Ok(())
    }

    pub async fn leave_tty(&self, conn_id: u64, tty_handle: TtyHandle) {
        let mut tty = self.tty.lock().await;
        tty.detach(tty_handle, conn_id);
    }

    pub async fn set_focus(&self, tty_handle: TtyHandle, child: u32) {
        let mut tty = self.tty.lock().await;
        tty.set_focus(tty_handle, child);
    }

    /// Refreshes the display: finds the filling client along the
    /// focus path, diffs against the last frame (or writes it whole if
    /// `force`), and marks it displayed.
    pub async fn refresh_display(&self, force: bool) -> Result<Option<u64>> {
        let mut connections = self.connections.lock().await;
        let tty = self.tty.lock().await;
        let mut arbiter = self.arbiter.lock().await;
        arbiter.refresh(&tty, &mut connections, self.driver.as_ref(), force).await
    }

    /// Routes one driver-originated key event to the admitting connection,
    /// falling through to `DispatchOutcome::Unclaimed` for the
    /// server's own command processor.
    pub async fn dispatch_driver_key(&self, code: KeyCode) -> DispatchOutcome {
        let mut connections = self.connections.lock().await;
        let tty = self.tty.lock().await;
        dispatch::dispatch_key(&tty, &mut connections, code)
    }

    pub async fn enter_raw(&self, conn_id: u64) -> Result<()> {
        let mut raw_suspend = self.raw_suspend.lock().await;
        raw::enter_raw(&mut raw_suspend, self.driver.as_ref(), conn_id).await
    }

    pub async fn leave_raw(&self, conn_id: u64) -> Result<()> {
        let mut raw_suspend = self.raw_suspend.lock().await;
        raw::leave_raw(&mut raw_suspend, self.driver.as_ref(), conn_id).await
    }

    pub async fn send_raw(&self, conn_id: u64, bytes: &[u8]) -> Result<()> {
        let raw_suspend = self.raw_suspend.lock().await;
        raw::send_raw(&raw_suspend, self.driver.as_ref(), conn_id, bytes).await
    }

    pub async fn recv_raw(&self, conn_id: u64) -> Result<Vec<u8>> {
        let raw_suspend = self.raw_suspend.lock().await;
        raw::recv_raw(&raw_suspend, self.driver.as_ref(), conn_id).await
    }

    pub async fn suspend_driver(&self, conn_id: u64) -> Result<()> {
        let mut raw_suspend = self.raw_suspend.lock().await;
        suspend::suspend_driver(&mut raw_suspend, self.driver.as_ref(), conn_id).await
    }

    pub async fn resume_driver(&self, conn_id: u64) -> Result<()> {
        let mut raw_suspend = self.raw_suspend.lock().await;
        suspend::resume_driver(&mut raw_suspend, self.driver.as_ref(), conn_id).await?;
        drop(raw_suspend);
        // Resume replays the currently selected buffer with force.
        self.refresh_display(true).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::driver::{DisplaySize, MockDriver};

    fn test_core() -> ServerCore {
        let driver = Arc::new(MockDriver::new(DisplaySize { width: 4, height: 1 }, true));
        ServerCore::new(driver, Config::default())
    }

    #[tokio::test]
    async fn register_and_drop_connection() {
        let core = test_core();
        let id = core.register_connection("test".into()).await;
        let handle = core.enter_tty(id, &[1]).await.unwrap();
        assert_eq!(core.connections.lock().await.len(), 1);
        core.drop_connection(id, Some(handle)).await;
        assert_eq!(core.connections.lock().await.len(), 0);
    }

    #[tokio::test]
    async fn raw_ownership_is_released_on_drop() {
        let core = test_core();
        let id = core.register_connection("test".into()).await;
        core.enter_raw(id).await.unwrap();
        core.drop_connection(id, None).await;
        assert!(core.raw_suspend.lock().await.owner().is_none());
    }
}
