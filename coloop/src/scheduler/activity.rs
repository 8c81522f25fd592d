//! Activity counter
//!
//! Bumped by anything that can make a waiting task runnable without
//! running that task: a semaphore signal, or a wake through a cloned
//! waker. A pass only counts as quiescent if the counter did not move
//! while it ran.
//!
//! With `std` the counter is per thread, so schedulers on different
//! threads do not keep each other busy. Without `std` it is a single
//! counter, guarded by a critical section so interrupt handlers can
//! bump it.

use core::cell::Cell;

#[cfg(any(test, feature = "std"))]
::std::thread_local! {
    static COUNT: Cell<u32> = const { Cell::new(0) };
}

#[cfg(not(any(test, feature = "std")))]
static COUNT: critical_section::Mutex<Cell<u32>> = critical_section::Mutex::new(Cell::new(0));

#[cfg(any(test, feature = "std"))]
pub(crate) fn notify() {
    COUNT.with(|count| count.set(count.get().wrapping_add(1)));
}

#[cfg(any(test, feature = "std"))]
pub(crate) fn current() -> u32 {
    COUNT.with(Cell::get)
}

#[cfg(not(any(test, feature = "std")))]
pub(crate) fn notify() {
    critical_section::with(|cs| {
        let count = COUNT.borrow(cs);
        count.set(count.get().wrapping_add(1));
    });
}

#[cfg(not(any(test, feature = "std")))]
pub(crate) fn current() -> u32 {
    critical_section::with(|cs| COUNT.borrow(cs).get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_thread() {
        let before = current();

        notify();
        assert_eq!(current(), before.wrapping_add(1));

        ::std::thread::spawn(notify).join().unwrap();
        assert_eq!(current(), before.wrapping_add(1));
    }
}
