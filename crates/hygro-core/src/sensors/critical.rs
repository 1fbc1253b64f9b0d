//! Scoped interrupt masking for the bit sampling loop.

use core::marker::PhantomData;

/// Holds a global critical section for as long as it lives.
///
/// Interrupt delivery (and with it preemption) is suppressed from
/// [`SamplingGuard::acquire`] until the guard is dropped, so every exit path
/// of the enclosing scope, early `?` returns included, re-enables it.
///
/// The guard is `!Send`: a critical section must be released on the core
/// that took it.
pub struct SamplingGuard {
    state: critical_section::RestoreState,
    _not_send: PhantomData<*const ()>,
}

impl SamplingGuard {
    pub fn acquire() -> Self {
        // Safety: the matching `release` happens exactly once, in `Drop`, and
        // guards cannot be leaked across cores because the type is `!Send`.
        let state = unsafe { critical_section::acquire() };
        Self {
            state,
            _not_send: PhantomData,
        }
    }
}

impl Drop for SamplingGuard {
    fn drop(&mut self) {
        // Safety: `state` was returned by the `acquire` that created this guard.
        unsafe { critical_section::release(self.state) };
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    fn timed_out() -> Result<(), ()> {
        Err(())
    }

    fn bail_out_early() -> Result<(), ()> {
        let _guard = SamplingGuard::acquire();
        timed_out()?;
        Ok(())
    }

    #[test]
    fn test_guard_released_on_early_return() {
        assert!(bail_out_early().is_err());
        // Another thread blocks forever if the section leaked.
        std::thread::spawn(|| critical_section::with(|_| {}))
            .join()
            .unwrap();
    }

    #[test]
    fn test_guard_nests_with_closure_sections() {
        let guard = SamplingGuard::acquire();
        critical_section::with(|_| {});
        drop(guard);
        critical_section::with(|_| {});
    }
}
