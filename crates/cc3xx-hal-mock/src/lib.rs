//! Mock platform for testing the CC3xx platform mutex layer
//!
//! This provides host implementations of the platform primitives built on
//! `std::sync`, so the mutex dispatcher can be exercised with real threads
//! and without a kernel or the hardware mutex peripheral.
//!
//! - [`MockKernelMutex`]: owner-tracked, reentrant blocking mutex
//! - [`MockSemaphore`]: counting semaphore with bounded waits
//! - [`MockHwMutex`]: hardware mutex peripheral with 16 instances
//! - [`RecordingAbort`]: abort hook that records the reason and panics
//! - [`CapturedLog`]: `log` sink that keeps formatted lines for assertions

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Instant;

use cc3xx_hal::{
    AbortHook, HalError, HwMutexId, HwMutexPeripheral, KernelMutex, KernelSemaphore, Platform,
    Timeout,
};
use log::{LevelFilter, Log, Metadata, Record};

/// Number of instances on the mocked hardware mutex peripheral
pub const MOCK_HW_MUTEX_COUNT: u8 = 16;

fn lock_state<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Block on `cond` until `ready` holds or `timeout` expires.
fn wait_until<'a, T>(
    cond: &Condvar,
    mut guard: MutexGuard<'a, T>,
    timeout: Timeout,
    mut ready: impl FnMut(&T) -> bool,
) -> Result<MutexGuard<'a, T>, HalError> {
    match timeout {
        Timeout::NoWait => {
            if ready(&guard) {
                Ok(guard)
            } else {
                Err(HalError::WouldBlock)
            }
        }
        Timeout::Forever => {
            while !ready(&guard) {
                guard = cond.wait(guard).unwrap_or_else(PoisonError::into_inner);
            }
            Ok(guard)
        }
        Timeout::After(duration) => {
            let deadline = Instant::now() + duration;
            while !ready(&guard) {
                let now = Instant::now();
                if now >= deadline {
                    return Err(HalError::TimedOut);
                }
                let (next, _) = cond
                    .wait_timeout(guard, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                guard = next;
            }
            Ok(guard)
        }
    }
}

// ============================================================================
// Kernel mutex
// ============================================================================

#[derive(Default)]
struct KernelMutexState {
    initialized: bool,
    owner: Option<ThreadId>,
    depth: u32,
}

/// Host kernel mutex
///
/// Mirrors kernel mutex semantics: the locking thread owns the mutex, may
/// lock it again recursively, and only the owner may unlock it.
#[derive(Default)]
pub struct MockKernelMutex {
    state: Mutex<KernelMutexState>,
    released: Condvar,
    acquisitions: AtomicU64,
}

impl MockKernelMutex {
    /// Whether the kernel constructor has run on this storage
    pub fn is_initialized(&self) -> bool {
        lock_state(&self.state).initialized
    }

    /// Whether any thread currently holds the mutex
    pub fn is_locked(&self) -> bool {
        lock_state(&self.state).owner.is_some()
    }

    /// Total successful acquisitions since creation
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

impl KernelMutex for MockKernelMutex {
    fn clear(&self) {
        *lock_state(&self.state) = KernelMutexState::default();
        self.released.notify_all();
    }

    fn init(&self) {
        *lock_state(&self.state) = KernelMutexState {
            initialized: true,
            owner: None,
            depth: 0,
        };
        self.released.notify_all();
    }

    fn lock(&self, timeout: Timeout) -> Result<(), HalError> {
        let me = thread::current().id();
        let guard = lock_state(&self.state);
        if !guard.initialized {
            return Err(HalError::NotInitialized);
        }

        let mut guard = wait_until(&self.released, guard, timeout, |s| {
            !s.initialized || s.owner.is_none() || s.owner == Some(me)
        })?;
        // Storage may have been cleared while we waited
        if !guard.initialized {
            return Err(HalError::NotInitialized);
        }

        guard.owner = Some(me);
        guard.depth += 1;
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unlock(&self) -> Result<(), HalError> {
        let me = thread::current().id();
        let mut guard = lock_state(&self.state);
        match guard.owner {
            None => Err(HalError::NotLocked),
            Some(owner) if owner != me => Err(HalError::NotOwner),
            Some(_) => {
                guard.depth -= 1;
                if guard.depth == 0 {
                    guard.owner = None;
                    drop(guard);
                    self.released.notify_one();
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// Counting semaphore
// ============================================================================

/// Host counting semaphore
pub struct MockSemaphore {
    permits: Mutex<usize>,
    limit: usize,
    available: Condvar,
}

impl KernelSemaphore for MockSemaphore {
    fn new(initial: usize, limit: usize) -> Self {
        Self {
            permits: Mutex::new(initial.min(limit)),
            limit,
            available: Condvar::new(),
        }
    }

    fn take(&self, timeout: Timeout) -> Result<(), HalError> {
        let guard = lock_state(&self.permits);
        let mut guard = wait_until(&self.available, guard, timeout, |permits| *permits > 0)?;
        *guard -= 1;
        Ok(())
    }

    fn give(&self) {
        let mut guard = lock_state(&self.permits);
        if *guard < self.limit {
            *guard += 1;
            drop(guard);
            self.available.notify_one();
        }
    }

    fn count(&self) -> usize {
        *lock_state(&self.permits)
    }
}

// ============================================================================
// Hardware mutex peripheral
// ============================================================================

/// Mock hardware mutex peripheral
///
/// Each instance is a single flag. Acquisition is one attempt, exactly like
/// reading the peripheral's MUTEX register.
pub struct MockHwMutex {
    locks: Vec<AtomicBool>,
    acquisitions: AtomicU64,
    failures: AtomicU64,
}

impl MockHwMutex {
    /// Peripheral with the default instance count
    pub fn new() -> Self {
        Self::with_count(MOCK_HW_MUTEX_COUNT)
    }

    /// Peripheral with `count` instances
    pub fn with_count(count: u8) -> Self {
        Self {
            locks: (0..count).map(|_| AtomicBool::new(false)).collect(),
            acquisitions: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Check if instance `id` is held
    pub fn is_locked(&self, id: HwMutexId) -> bool {
        self.locks
            .get(usize::from(id.id()))
            .map(|lock| lock.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Simulate another core taking instance `id`
    pub fn hold_from_other_core(&self, id: HwMutexId) {
        if let Some(lock) = self.locks.get(usize::from(id.id())) {
            lock.store(true, Ordering::SeqCst);
        }
    }

    /// Successful acquisitions
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Failed acquisition attempts
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }
}

impl Default for MockHwMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl HwMutexPeripheral for MockHwMutex {
    fn count(&self) -> u8 {
        // Bounded by with_count(u8)
        self.locks.len() as u8
    }

    fn try_lock(&self, id: HwMutexId) -> bool {
        let acquired = self
            .locks
            .get(usize::from(id.id()))
            .map(|lock| {
                lock.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            })
            .unwrap_or(false);

        if acquired {
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        acquired
    }

    fn unlock(&self, id: HwMutexId) {
        if let Some(lock) = self.locks.get(usize::from(id.id())) {
            lock.store(false, Ordering::Release);
        }
    }
}

// ============================================================================
// Platform
// ============================================================================

/// Mock platform for unit and integration testing
pub struct MockPlatform {
    hw_mutex: Option<MockHwMutex>,
}

impl MockPlatform {
    /// Platform with a hardware mutex peripheral
    pub fn new() -> Self {
        Self {
            hw_mutex: Some(MockHwMutex::new()),
        }
    }

    /// Platform without a hardware mutex peripheral
    pub fn without_hw_mutex() -> Self {
        Self { hw_mutex: None }
    }

    /// Direct access to the mocked peripheral
    pub fn hw(&self) -> Option<&MockHwMutex> {
        self.hw_mutex.as_ref()
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for MockPlatform {
    type Mutex = MockKernelMutex;
    type Semaphore = MockSemaphore;
    type HwMutex = MockHwMutex;

    fn hw_mutex(&self) -> Option<&Self::HwMutex> {
        self.hw_mutex.as_ref()
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ============================================================================
// Abort hook
// ============================================================================

/// Abort hook that records each reason and then panics
///
/// Clones share the same record, so a test can keep one handle while the
/// dispatcher owns another. Wrap the aborting call in
/// `std::panic::catch_unwind` to observe it.
#[derive(Clone, Default)]
pub struct RecordingAbort {
    reasons: Arc<Mutex<Vec<String>>>,
}

impl RecordingAbort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the hook fired
    pub fn count(&self) -> usize {
        lock_state(&self.reasons).len()
    }

    /// All recorded reasons, oldest first
    pub fn reasons(&self) -> Vec<String> {
        lock_state(&self.reasons).clone()
    }

    /// Most recent reason
    pub fn last_reason(&self) -> Option<String> {
        lock_state(&self.reasons).last().cloned()
    }
}

impl AbortHook for RecordingAbort {
    fn abort(&self, reason: &str) -> ! {
        lock_state(&self.reasons).push(String::from(reason));
        panic!("[mock-abort] {}", reason);
    }
}

// ============================================================================
// Captured log
// ============================================================================

/// `log` sink that keeps every formatted line
pub struct CapturedLog {
    lines: Mutex<Vec<String>>,
}

static CAPTURED_LOG: CapturedLog = CapturedLog {
    lines: Mutex::new(Vec::new()),
};

impl CapturedLog {
    /// Install the sink as the global logger.
    ///
    /// Safe to call from every test; only the first call installs.
    pub fn install() -> &'static CapturedLog {
        if log::set_logger(&CAPTURED_LOG).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
        &CAPTURED_LOG
    }

    /// All captured lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        lock_state(&self.lines).clone()
    }

    /// Check if any captured line contains `substr`
    pub fn has_line_containing(&self, substr: &str) -> bool {
        lock_state(&self.lines)
            .iter()
            .any(|line| line.contains(substr))
    }
}

impl Log for CapturedLog {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        lock_state(&self.lines).push(format!("{} {}", record.level(), record.args()));
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_kernel_mutex_requires_init() {
        let mutex = MockKernelMutex::default();
        assert!(!mutex.is_initialized());
        assert_eq!(mutex.lock(Timeout::NoWait), Err(HalError::NotInitialized));

        mutex.init();
        assert!(mutex.is_initialized());
        assert_eq!(mutex.lock(Timeout::NoWait), Ok(()));
        assert!(mutex.is_locked());
    }

    #[test]
    fn test_kernel_mutex_is_reentrant() {
        let mutex = MockKernelMutex::default();
        mutex.init();

        mutex.lock(Timeout::Forever).unwrap();
        mutex.lock(Timeout::Forever).unwrap();
        mutex.unlock().unwrap();
        assert!(mutex.is_locked());
        mutex.unlock().unwrap();
        assert!(!mutex.is_locked());
        assert_eq!(mutex.unlock(), Err(HalError::NotLocked));
        assert_eq!(mutex.acquisitions(), 2);
    }

    #[test]
    fn test_kernel_mutex_owner_only_unlock() {
        let mutex = MockKernelMutex::default();
        mutex.init();
        mutex.lock(Timeout::Forever).unwrap();

        thread::scope(|s| {
            let result = s.spawn(|| mutex.unlock()).join().unwrap();
            assert_eq!(result, Err(HalError::NotOwner));
        });

        mutex.unlock().unwrap();
    }

    #[test]
    fn test_kernel_mutex_bounded_waits() {
        let mutex = MockKernelMutex::default();
        mutex.init();
        mutex.lock(Timeout::Forever).unwrap();

        thread::scope(|s| {
            let no_wait = s.spawn(|| mutex.lock(Timeout::NoWait)).join().unwrap();
            assert_eq!(no_wait, Err(HalError::WouldBlock));

            let bounded = s
                .spawn(|| mutex.lock(Timeout::from_millis(20)))
                .join()
                .unwrap();
            assert_eq!(bounded, Err(HalError::TimedOut));
        });

        mutex.unlock().unwrap();
    }

    #[test]
    fn test_kernel_mutex_blocks_until_released() {
        let storage = MockKernelMutex::default();
        let mutex = &storage;
        mutex.init();
        mutex.lock(Timeout::Forever).unwrap();

        thread::scope(|s| {
            let (tx, rx) = mpsc::channel();
            s.spawn(move || {
                mutex.lock(Timeout::Forever).unwrap();
                tx.send(()).unwrap();
                mutex.unlock().unwrap();
            });

            assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
            mutex.unlock().unwrap();
            assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        });
    }

    #[test]
    fn test_kernel_mutex_clear_resets() {
        let mutex = MockKernelMutex::default();
        mutex.init();
        mutex.lock(Timeout::Forever).unwrap();

        mutex.clear();
        assert!(!mutex.is_initialized());
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_semaphore_take_and_give() {
        let sem = MockSemaphore::new(2, 2);
        assert_eq!(sem.count(), 2);

        sem.take(Timeout::NoWait).unwrap();
        sem.take(Timeout::NoWait).unwrap();
        assert_eq!(sem.take(Timeout::NoWait), Err(HalError::WouldBlock));
        assert_eq!(sem.take(Timeout::from_millis(10)), Err(HalError::TimedOut));

        sem.give();
        assert_eq!(sem.count(), 1);
        sem.give();
        sem.give(); // Past the limit, ignored
        assert_eq!(sem.count(), 2);
    }

    #[test]
    fn test_semaphore_wakes_waiter() {
        let sem = MockSemaphore::new(0, 1);

        thread::scope(|s| {
            let waiter = s.spawn(|| sem.take(Timeout::Forever));
            thread::sleep(Duration::from_millis(20));
            sem.give();
            assert_eq!(waiter.join().unwrap(), Ok(()));
        });
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn test_hw_mutex_single_attempt() {
        let hw = MockHwMutex::new();
        let id = HwMutexId::new(15);

        assert_eq!(hw.count(), MOCK_HW_MUTEX_COUNT);
        assert!(hw.try_lock(id));
        assert!(hw.is_locked(id));
        assert!(!hw.try_lock(id));

        hw.unlock(id);
        assert!(hw.try_lock(id));
        assert_eq!(hw.acquisitions(), 2);
        assert_eq!(hw.failures(), 1);
    }

    #[test]
    fn test_hw_mutex_out_of_range() {
        let hw = MockHwMutex::with_count(4);
        assert!(!hw.try_lock(HwMutexId::new(4)));
        assert!(!hw.is_locked(HwMutexId::new(4)));
        hw.unlock(HwMutexId::new(4));
    }

    #[test]
    fn test_hw_mutex_other_core() {
        let hw = MockHwMutex::new();
        let id = HwMutexId::new(12);

        hw.hold_from_other_core(id);
        assert!(!hw.try_lock(id));
    }

    #[test]
    fn test_platform_hw_presence() {
        assert!(MockPlatform::new().hw_mutex().is_some());
        assert!(MockPlatform::without_hw_mutex().hw_mutex().is_none());
        assert_eq!(MockPlatform::new().name(), "mock");
    }

    #[test]
    fn test_recording_abort() {
        let abort = RecordingAbort::new();
        let hook = abort.clone();

        let result = panic::catch_unwind(AssertUnwindSafe(|| hook.abort("boom")));
        assert!(result.is_err());
        assert_eq!(abort.count(), 1);
        assert_eq!(abort.last_reason().as_deref(), Some("boom"));
    }

    #[test]
    fn test_captured_log() {
        let captured = CapturedLog::install();
        log::info!("[mock-hal] captured line {}", 7);
        assert!(captured.has_line_containing("captured line 7"));
        assert!(!captured.has_line_containing("never logged"));
    }
}
