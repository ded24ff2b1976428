//! Tempo control and the auto-acceleration ramp
//!
//! Two states: manual, where the effective tempo tracks the user target
//! instantly, and accelerating, where a background task steps the effective
//! tempo toward a hard ceiling. The scheduler only ever reads the effective
//! value; it never waits on this module.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

pub const BPM_MIN: u32 = 30;
pub const BPM_CEILING: u32 = 1000;

/// Acceleration step and period: +20 bpm every 5 seconds.
pub const RAMP_STEP: u32 = 20;
pub const RAMP_PERIOD: Duration = Duration::from_secs(5);

/// Hard floor on the inter-word interval, whatever the bpm.
pub const MIN_INTERVAL: Duration = Duration::from_millis(50);

/// Beats-per-minute to inter-word spacing, floored at 50 ms.
pub fn interval_for(bpm: u32) -> Duration {
    let ms = 60_000 / u64::from(bpm.max(1));
    Duration::from_millis(ms).max(MIN_INTERVAL)
}

struct Shared {
    target: AtomicU32,
    effective: AtomicU32,
}

/// Owner of the target/effective tempo pair.
///
/// Invariant outside acceleration: `effective == target`. All methods take
/// `&self`; the controller is shared behind an `Arc`.
pub struct TempoController {
    shared: Arc<Shared>,
    ramp: Mutex<Option<JoinHandle<()>>>,
}

impl TempoController {
    pub fn new(target: u32) -> Self {
        let target = target.clamp(BPM_MIN, BPM_CEILING);
        Self {
            shared: Arc::new(Shared {
                target: AtomicU32::new(target),
                effective: AtomicU32::new(target),
            }),
            ramp: Mutex::new(None),
        }
    }

    pub fn target(&self) -> u32 {
        self.shared.target.load(Ordering::Relaxed)
    }

    pub fn effective(&self) -> u32 {
        self.shared.effective.load(Ordering::Relaxed)
    }

    pub fn is_accelerating(&self) -> bool {
        self.ramp
            .lock()
            .expect("tempo ramp lock")
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Update the user target. In manual mode the effective tempo snaps to
    /// it immediately; during acceleration the ramp restarts from the new
    /// target.
    pub fn set_target(&self, bpm: u32) {
        let bpm = bpm.clamp(BPM_MIN, BPM_CEILING);
        self.shared.target.store(bpm, Ordering::Relaxed);
        let mut ramp = self.ramp.lock().expect("tempo ramp lock");
        if ramp.is_some() {
            Self::stop_ramp(&mut ramp);
            self.shared.effective.store(bpm, Ordering::Relaxed);
            *ramp = Some(Self::spawn_ramp(self.shared.clone()));
        } else {
            self.shared.effective.store(bpm, Ordering::Relaxed);
        }
    }

    /// Enter the accelerating state: effective resets to the target, then
    /// climbs by [`RAMP_STEP`] every [`RAMP_PERIOD`] up to [`BPM_CEILING`].
    pub fn start_acceleration(&self) {
        let mut ramp = self.ramp.lock().expect("tempo ramp lock");
        Self::stop_ramp(&mut ramp);
        self.shared
            .effective
            .store(self.shared.target.load(Ordering::Relaxed), Ordering::Relaxed);
        *ramp = Some(Self::spawn_ramp(self.shared.clone()));
    }

    /// Back to manual: cancel the ramp and snap effective to the target.
    pub fn stop_acceleration(&self) {
        let mut ramp = self.ramp.lock().expect("tempo ramp lock");
        Self::stop_ramp(&mut ramp);
        self.shared
            .effective
            .store(self.shared.target.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    fn stop_ramp(ramp: &mut Option<JoinHandle<()>>) {
        if let Some(handle) = ramp.take() {
            handle.abort();
        }
    }

    fn spawn_ramp(shared: Arc<Shared>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(RAMP_PERIOD).await;
                let current = shared.effective.load(Ordering::Relaxed);
                let next = (current + RAMP_STEP).min(BPM_CEILING);
                shared.effective.store(next, Ordering::Relaxed);
                info!(bpm = next, "tempo ramp step");
            }
        })
    }
}

impl Drop for TempoController {
    fn drop(&mut self) {
        let mut ramp = self.ramp.lock().expect("tempo ramp lock");
        Self::stop_ramp(&mut ramp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_floor_is_50ms() {
        assert_eq!(interval_for(1_000_000), Duration::from_millis(50));
        assert_eq!(interval_for(1200), Duration::from_millis(50));
        assert_eq!(interval_for(1201), Duration::from_millis(50));
    }

    #[test]
    fn interval_for_common_tempos() {
        assert_eq!(interval_for(60), Duration::from_millis(1000));
        assert_eq!(interval_for(120), Duration::from_millis(500));
        assert_eq!(interval_for(30), Duration::from_millis(2000));
    }

    #[test]
    fn interval_is_non_increasing_in_bpm() {
        let mut prev = interval_for(1);
        for bpm in 2..=2000 {
            let next = interval_for(bpm);
            assert!(next <= prev, "interval grew at {bpm} bpm");
            prev = next;
        }
    }

    #[tokio::test]
    async fn manual_mode_tracks_target() {
        let tempo = TempoController::new(120);
        assert_eq!(tempo.effective(), 120);
        tempo.set_target(240);
        assert_eq!(tempo.target(), 240);
        assert_eq!(tempo.effective(), 240);
    }

    #[tokio::test]
    async fn targets_are_clamped_to_bounds() {
        let tempo = TempoController::new(5);
        assert_eq!(tempo.target(), BPM_MIN);
        tempo.set_target(100_000);
        assert_eq!(tempo.target(), BPM_CEILING);
    }
}
