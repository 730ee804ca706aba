use std::hint;
use std::sync::atomic::{AtomicBool, Ordering};

/// A helper object for the contended case. Starts off with eager
/// spinning, and falls back to sleeping for small quantums.
struct Sleeper {
    spin_count: u32,
}

const MAX_ACTIVE_SPIN: u32 = 4000;

impl Sleeper {
    fn new() -> Sleeper {
        Sleeper { spin_count: 0 }
    }

    fn wait(&mut self) {
        if self.spin_count < MAX_ACTIVE_SPIN {
            self.spin_count += 1;
            hint::spin_loop();
        } else {
            sleep_quantum();
        }
    }
}

/// Always sleep 0.5ms, assuming this will make the kernel put us down for
/// whatever its minimum timer resolution is (in linux this varies by kernel
/// version from 1ms to 10ms).
#[cfg(unix)]
fn sleep_quantum() {
    let sleep_time = libc::timespec {
        tv_sec: 0,
        tv_nsec: 500_000,
    };
    unsafe {
        libc::nanosleep(&sleep_time, std::ptr::null_mut());
    }
}

#[cfg(not(unix))]
fn sleep_quantum() {
    std::thread::sleep(std::time::Duration::from_micros(500));
}

const FREE: bool = false;
const LOCKED: bool = true;

/// A really, *really* small spinlock for fine-grained locking of lots
/// of teeny-tiny data. Every future core carries one.
pub struct MicroSpinLock {
    lock: AtomicBool,
}

impl MicroSpinLock {
    pub const fn new() -> MicroSpinLock {
        MicroSpinLock {
            lock: AtomicBool::new(FREE),
        }
    }

    /// Tries to acquire the spinlock.
    /// Returns true if it acquires it, false otherwise
    pub fn try_lock(&self) -> bool {
        self.cas(FREE, LOCKED)
    }

    pub fn lock(&self) {
        let mut sleeper = Sleeper::new();
        loop {
            while self.lock.load(Ordering::Relaxed) != FREE {
                sleeper.wait();
            }
            if self.try_lock() {
                break;
            }
        }
        debug_assert!(self.lock.load(Ordering::Relaxed) == LOCKED);
    }

    pub fn unlock(&self) {
        debug_assert!(self.lock.load(Ordering::Relaxed) == LOCKED);
        self.lock.store(FREE, Ordering::Release);
    }

    #[inline(always)]
    fn cas(&self, compare: bool, new_val: bool) -> bool {
        self.lock
            .compare_exchange(compare, new_val, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }
}

impl Default for MicroSpinLock {
    fn default() -> MicroSpinLock {
        MicroSpinLock::new()
    }
}
