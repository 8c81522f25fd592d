//! Millisecond clock driven by the SysTick exception
//!
//! The counter is advanced from the SysTick handler:
//!
//! ```ignore
//! static CLOCK: SysTickClock = SysTickClock::new();
//!
//! #[exception]
//! fn SysTick() {
//!     CLOCK.tick();
//! }
//!
//! #[entry]
//! fn main() -> ! {
//!     let mut cp = cortex_m::Peripherals::take().unwrap();
//!     CLOCK.start(&mut cp.SYST, 64_000_000);
//!
//!     let scheduler = pin!(Scheduler::<_, 8>::new(&CLOCK));
//!     // ...
//! }
//! ```

use core::cell::Cell;

use cortex_m::{
    interrupt::Mutex,
    peripheral::{syst::SystClkSource, SYST},
};

use crate::timer::{Clock, Duration, Instant};

/// Millisecond clock driven by the SysTick exception
pub struct SysTickClock {
    ticks: Mutex<Cell<u32>>,
}

impl SysTickClock {
    pub const fn new() -> Self {
        Self {
            ticks: Mutex::new(Cell::new(0)),
        }
    }

    /// Configure SysTick to fire every millisecond
    ///
    /// `sysclk` is the core clock frequency in Hz.
    pub fn start(&self, systick: &mut SYST, sysclk: u32) {
        let reload = sysclk / 1000 - 1;

        assert!(reload > 0 && reload <= 0xff_ffff, "unusable core clock");

        systick.set_clock_source(SystClkSource::Core);
        systick.set_reload(reload);
        systick.clear_current();
        systick.enable_counter();
        systick.enable_interrupt();
    }

    /// Advance the clock by one millisecond. Call from the SysTick
    /// exception handler.
    pub fn tick(&self) {
        cortex_m::interrupt::free(|cs| {
            let ticks = self.ticks.borrow(cs);
            ticks.set(ticks.get().wrapping_add(1));
        });
    }
}

impl Default for SysTickClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SysTickClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(cortex_m::interrupt::free(|cs| self.ticks.borrow(cs).get()))
    }

    /// Sleep until the next interrupt. SysTick fires every millisecond,
    /// so this never oversleeps.
    fn sleep(&self, _duration: Duration) {
        cortex_m::asm::wfi();
    }
}
