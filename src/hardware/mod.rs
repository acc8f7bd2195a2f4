//! Hardware backends: the 1-Wire sysfs bus, I2C bus access and the BME680
//! driver.

pub mod bme680;
pub mod i2c;
pub mod w1;

/// Blocking delay used by drivers on the host.
#[cfg(target_os = "linux")]
pub type SystemDelay = linux_embedded_hal::Delay;

#[cfg(target_os = "linux")]
pub fn system_delay() -> SystemDelay {
    linux_embedded_hal::Delay
}

// ============================================================================
// FALLBACK IMPLEMENTATIONS FOR UNSUPPORTED PLATFORMS
// ============================================================================

#[cfg(not(target_os = "linux"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDelay;

#[cfg(not(target_os = "linux"))]
pub fn system_delay() -> SystemDelay {
    SystemDelay
}

#[cfg(not(target_os = "linux"))]
impl embedded_hal::delay::DelayNs for SystemDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(ns as u64));
    }
}
