//! Process-wide selector between vendor-internal and engine-level
//! parallelism, mirroring the reference implementation's `ThreadingManager`.

use std::sync::{Mutex, OnceLock};

use crate::error::Error;
use crate::platform::LoadedLibrary;
use crate::vendor::{self, TimsSetNumThreadsFn};

/// Which side of the boundary is allowed to use more than one thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// The vendor library is pinned to one thread; the engine may
    /// parallelize extraction across frames (e.g. with `rayon`).
    EngineParallel,
    /// The vendor library may use up to `n_threads`; the engine iterates
    /// sequentially.
    VendorParallel,
}

struct VendorThreadSetter {
    #[allow(dead_code)] // kept alive so `set_num_threads` stays valid
    library: LoadedLibrary,
    set_num_threads: TimsSetNumThreadsFn,
}

pub struct ThreadingToggle {
    mode: Mode,
    n_threads: usize,
    vendor: Option<VendorThreadSetter>,
}

impl ThreadingToggle {
    fn new() -> Self {
        Self {
            mode: Mode::EngineParallel,
            n_threads: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            vendor: None,
        }
    }

    fn effective_vendor_threads(&self) -> u32 {
        match self.mode {
            Mode::EngineParallel => 1,
            Mode::VendorParallel => self.n_threads as u32,
        }
    }

    fn apply(&self) {
        if let Some(vendor) = &self.vendor {
            unsafe { (vendor.set_num_threads)(self.effective_vendor_threads()) };
        }
    }

    pub fn set_thread_count(&mut self, n: usize) {
        self.n_threads = if n == 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        } else {
            n
        };
        self.apply();
    }

    pub fn use_engine_threading(&mut self) {
        self.mode = Mode::EngineParallel;
        log::info!("threading toggle: engine-parallel");
        self.apply();
    }

    pub fn use_vendor_threading(&mut self) {
        self.mode = Mode::VendorParallel;
        log::info!("threading toggle: vendor-parallel ({} threads)", self.n_threads);
        self.apply();
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn thread_count(&self) -> usize {
        self.n_threads
    }

    /// Attach a vendor library so future mode/count changes are forwarded
    /// to `tims_set_num_threads`. The current mode is applied immediately.
    pub fn attach_vendor_library(&mut self, library_path: &str) -> Result<(), Error> {
        let library = LoadedLibrary::load(library_path)?;
        let set_num_threads = vendor::resolve_set_num_threads(&library)?;
        self.vendor = Some(VendorThreadSetter { library, set_num_threads });
        self.apply();
        Ok(())
    }
}

static TOGGLE: OnceLock<Mutex<ThreadingToggle>> = OnceLock::new();

fn toggle() -> &'static Mutex<ThreadingToggle> {
    TOGGLE.get_or_init(|| Mutex::new(ThreadingToggle::new()))
}

pub fn set_thread_count(n: usize) {
    toggle().lock().expect("threading toggle lock poisoned").set_thread_count(n);
}

pub fn use_engine_threading() {
    toggle().lock().expect("threading toggle lock poisoned").use_engine_threading();
}

pub fn use_vendor_threading() {
    toggle().lock().expect("threading toggle lock poisoned").use_vendor_threading();
}

pub fn mode() -> Mode {
    toggle().lock().expect("threading toggle lock poisoned").mode()
}

pub fn thread_count() -> usize {
    toggle().lock().expect("threading toggle lock poisoned").thread_count()
}

pub fn attach_vendor_library(library_path: &str) -> Result<(), Error> {
    toggle().lock().expect("threading toggle lock poisoned").attach_vendor_library(library_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_engine_parallel() {
        let toggle = ThreadingToggle::new();
        assert_eq!(toggle.mode(), Mode::EngineParallel);
        assert!(toggle.thread_count() >= 1);
    }

    #[test]
    fn zero_thread_count_means_hardware_concurrency() {
        let mut toggle = ThreadingToggle::new();
        toggle.set_thread_count(4);
        assert_eq!(toggle.thread_count(), 4);
        toggle.set_thread_count(0);
        assert!(toggle.thread_count() >= 1);
    }

    #[test]
    fn tracks_count_without_an_attached_vendor_library() {
        let mut toggle = ThreadingToggle::new();
        toggle.use_vendor_threading();
        toggle.set_thread_count(8);
        assert_eq!(toggle.mode(), Mode::VendorParallel);
        assert_eq!(toggle.thread_count(), 8);
    }
}
