// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0

//! Platform shims.
//!
//! `std::time::Instant` panics on wasm32, so the tick timer reads `web_time` there.

pub mod time {
    #[cfg(not(target_arch = "wasm32"))]
    use std::time::Instant;

    #[cfg(target_arch = "wasm32")]
    use web_time::Instant;

    /// Measures one render-thread tick.
    #[derive(Debug, Clone, Copy)]
    pub(crate) struct TickTimer {
        started: Instant,
    }

    impl TickTimer {
        pub(crate) fn start() -> Self {
            TickTimer {
                started: Instant::now(),
            }
        }

        /// Microseconds since [`TickTimer::start`], saturating at `u64::MAX`.
        pub(crate) fn elapsed_micros(&self) -> u64 {
            u64::try_from(self.started.elapsed().as_micros()).unwrap_or(u64::MAX)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn elapsed_is_monotonic() {
            let timer = TickTimer::start();
            let first = timer.elapsed_micros();
            std::thread::sleep(std::time::Duration::from_millis(2));
            assert!(timer.elapsed_micros() >= first.max(1000));
        }
    }
}
