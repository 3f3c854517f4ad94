//! Raw/driver-specific passthrough and the shared
//! raw/suspend exclusivity singleton it shares with [`crate::suspend`]:
//! entry succeeds only if no one else is in raw mode or suspended.

use crate::driver::DriverPort;
use crate::error::{BapError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingletonMode {
    Raw,
    Suspend,
}

/// At most one connection in the whole server may hold raw or suspend at
/// a time. Held behind the same mutex the lock order calls `raw/suspend`.
#[derive(Debug, Default)]
pub struct RawSuspendSingleton {
    owner: Option<(u64, SingletonMode)>,
}

impl RawSuspendSingleton {
    pub fn new() -> Self {
        RawSuspendSingleton::default()
    }

    pub fn try_acquire(&mut self, conn_id: u64, mode: SingletonMode) -> Result<()> {
        match self.owner {
            None => {
                self.owner = Some((conn_id, mode));
                Ok(())
            }
            Some((holder, _)) if holder == conn_id => Ok(()),
            Some(_) => Err(BapError::DeviceBusy),
        }
    }

    pub fn release(&mut self, conn_id: u64) {
        if matches!(self.owner, Some((holder, _)) if holder == conn_id) {
            self.owner = None;
        }
    }

    pub fn is_held_by(&self, conn_id: u64) -> bool {
        matches!(self.owner, Some((holder, _)) if holder == conn_id)
    }

    pub fn owner(&self) -> Option<(u64, SingletonMode)> {
        self.owner
    }
}

/// `enter_raw(driver_name)`. Reopens the driver if the arbiter had
/// voluntarily closed it because nobody was filling the display.
pub async fn enter_raw(
    singleton: &mut RawSuspendSingleton,
    driver: &dyn DriverPort,
    conn_id: u64,
) -> Result<()> {
    if !driver.supports_raw() {
        return Err(BapError::OpNotSupported);
    }
    singleton.try_acquire(conn_id, SingletonMode::Raw)?;
    if !driver.is_open().await {
        if let Err(e) = driver.open().await {
            singleton.release(conn_id);
            return Err(e);
        }
    }
    Ok(())
}

/// `leave_raw` / abnormal connection loss while in raw: the
/// singleton is cleared and the driver is reset, restarting it (close then
/// open) if the reset hook fails.
pub async fn leave_raw(singleton: &mut RawSuspendSingleton, driver: &dyn DriverPort, conn_id: u64) -> Result<()> {
    if !singleton.is_held_by(conn_id) {
        return Err(BapError::IllegalInstruction);
    }
    if driver.reset().await.is_err() {
        let _ = driver.close().await;
        driver.open().await?;
    }
    singleton.release(conn_id);
    Ok(())
}

pub async fn send_raw(
    singleton: &RawSuspendSingleton,
    driver: &dyn DriverPort,
    conn_id: u64,
    bytes: &[u8],
) -> Result<()> {
    if !singleton.is_held_by(conn_id) {
        return Err(BapError::IllegalInstruction);
    }
    driver.send_raw(bytes).await
}

pub async fn recv_raw(singleton: &RawSuspendSingleton, driver: &dyn DriverPort, conn_id: u64) -> Result<Vec<u8>> {
    if !singleton.is_held_by(conn_id) {
        return Err(BapError::IllegalInstruction);
    }
    driver.recv_raw().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DisplaySize, MockDriver};

    #[tokio::test]
    async fn second_client_is_rejected_while_raw_is_held() {
        let driver = MockDriver::new(DisplaySize { width: 4, height: 1 }, true);
        let mut singleton = RawSuspendSingleton::new();
        enter_raw(&mut singleton, &driver, 1).await.unwrap();
        let err = enter_raw(&mut singleton, &driver, 2).await.unwrap_err();
        assert!(matches!(err, BapError::DeviceBusy));
    }

    #[tokio::test]
    async fn enter_raw_fails_when_driver_lacks_raw_capability() {
        let driver = MockDriver::new(DisplaySize { width: 4, height: 1 }, false);
        let mut singleton = RawSuspendSingleton::new();
        let err = enter_raw(&mut singleton, &driver, 1).await.unwrap_err();
        assert!(matches!(err, BapError::OpNotSupported));
    }

    #[tokio::test]
    async fn leave_raw_releases_the_singleton() {
        let driver = MockDriver::new(DisplaySize { width: 4, height: 1 }, true);
        let mut singleton = RawSuspendSingleton::new();
        enter_raw(&mut singleton, &driver, 1).await.unwrap();
        leave_raw(&mut singleton, &driver, 1).await.unwrap();
        assert!(singleton.owner().is_none());
        // Now a different client can claim it.
        enter_raw(&mut singleton, &driver, 2).await.unwrap();
    }

    #[tokio::test]
    async fn leave_raw_by_non_owner_is_illegal() {
        let driver = MockDriver::new(DisplaySize { width: 4, height: 1 }, true);
        let mut singleton = RawSuspendSingleton::new();
        enter_raw(&mut singleton, &driver, 1).await.unwrap();
        let err = leave_raw(&mut singleton, &driver, 2).await.unwrap_err();
        assert!(matches!(err, BapError::IllegalInstruction));
    }

    #[tokio::test]
    async fn raw_bytes_round_trip_through_the_driver() {
        let driver = MockDriver::new(DisplaySize { width: 4, height: 1 }, true);
        let mut singleton = RawSuspendSingleton::new();
        enter_raw(&mut singleton, &driver, 1).await.unwrap();
        send_raw(&singleton, &driver, 1, b"hello").await.unwrap();
        assert_eq!(driver.raw_input_log().await, b"hello");
        driver.push_raw_output(b"world").await;
        assert_eq!(recv_raw(&singleton, &driver, 1).await.unwrap(), b"world");
    }
}
