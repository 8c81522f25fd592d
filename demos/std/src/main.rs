//! Two tasks sharing a semaphore: one signals every second, the other
//! waits for the signal and reports it.
//!
//! Run with `RUST_LOG=debug` to see the scheduler's own logging.

use std::pin::pin;

use coloop::{delay, timer::std::StdClock, Clock, Duration, Scheduler, Semaphore, Task};
use log::info;

static SEM: Semaphore = Semaphore::new(0);

async fn signaller() {
    loop {
        delay(Duration::from_ticks(1000)).await;
        SEM.signal();
    }
}

async fn waiter(clock: &'static StdClock) {
    let mut count = 0u32;

    loop {
        match SEM.wait_timeout(Duration::from_ticks(1500)).await {
            Ok(()) => {
                count += 1;
                info!("signal {} at {} ms", count, clock.now().ticks());
            }
            Err(err) => info!("{} at {} ms", err, clock.now().ticks()),
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let clock: &'static StdClock = Box::leak(Box::new(StdClock::new()));

    let mut signaller = pin!(Task::new(signaller()));
    let mut waiter = pin!(Task::new(waiter(clock)));
    let scheduler = pin!(Scheduler::<_, 2>::new(clock));
    let handle = scheduler.as_ref().get_handle();

    handle
        .register(signaller.as_mut().get_handle())
        .expect("pool has room for the signaller");
    handle
        .register(waiter.as_mut().get_handle())
        .expect("pool has room for the waiter");

    loop {
        handle.run_once();
    }
}
