//! Suspend/resume coordinator: voluntary release of
//! the physical device, independent of tty focus, sharing the raw/suspend
//! exclusivity singleton defined in [`crate::raw`].

use crate::driver::DriverPort;
use crate::error::{BapError, Result};
use crate::raw::{RawSuspendSingleton, SingletonMode};

/// `suspend_driver(driver_name)`: closes the underlying channel so another
/// process on the host may use it. Other clients see `illegal_instruction`
/// for device-touching operations until resume (enforced by callers
/// checking [`RawSuspendSingleton::owner`], not by this function).
pub async fn suspend_driver(
    singleton: &mut RawSuspendSingleton,
    driver: &dyn DriverPort,
    conn_id: u64,
) -> Result<()> {
    singleton.try_acquire(conn_id, SingletonMode::Suspend)?;
    if let Err(e) = driver.close().await {
        singleton.release(conn_id);
        return Err(e);
    }
    Ok(())
}

/// `resume_driver()`: re-opens the device. The caller is responsible for
/// replaying the currently selected buffer with the force flag afterwards
/// (the arbiter's `refresh(..., force = true)`).
pub async fn resume_driver(
    singleton: &mut RawSuspendSingleton,
    driver: &dyn DriverPort,
    conn_id: u64,
) -> Result<()> {
    if !singleton.is_held_by(conn_id) {
        return Err(BapError::IllegalInstruction);
    }
    driver.open().await?;
    singleton.release(conn_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DisplaySize, MockDriver};

    #[tokio::test]
    async fn suspend_closes_the_driver_and_resume_reopens_it() {
        let driver = MockDriver::new(DisplaySize { width: 4, height: 1 }, false);
        let mut singleton = RawSuspendSingleton::new();
        suspend_driver(&mut singleton, &driver, 1).await.unwrap();
        assert!(!driver.is_open().await);
        resume_driver(&mut singleton, &driver, 1).await.unwrap();
        assert!(driver.is_open().await);
        assert!(singleton.owner().is_none());
    }

    #[tokio::test]
    async fn suspend_is_exclusive_with_raw() {
        use crate::raw::enter_raw;
        let driver = MockDriver::new(DisplaySize { width: 4, height: 1 }, true);
        let mut singleton = RawSuspendSingleton::new();
        enter_raw(&mut singleton, &driver, 1).await.unwrap();
        let err = suspend_driver(&mut singleton, &driver, 2).await.unwrap_err();
        assert!(matches!(err, BapError::DeviceBusy));
    }

    #[tokio::test]
    async fn resume_by_non_holder_is_illegal() {
        let driver = MockDriver::new(DisplaySize { width: 4, height: 1 }, false);
        let mut singleton = RawSuspendSingleton::new();
        suspend_driver(&mut singleton, &driver, 1).await.unwrap();
        let err = resume_driver(&mut singleton, &driver, 2).await.unwrap_err();
        assert!(matches!(err, BapError::IllegalInstruction));
    }
}
