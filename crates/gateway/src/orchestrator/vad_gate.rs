//! Per-session wiring of the energy-threshold VAD hysteresis gate for
//! `auto` listening mode. `manual` mode bypasses this and drives buffering
//! directly off `listen:start`/`listen:stop` frames; `realtime` mode runs
//! ASR on every frame instead (see the listening-mode table).

use std::time::Instant;

use aitoys_modules::vad::{rms_level, HysteresisGate};

pub struct VadGate {
    gate: HysteresisGate,
}

impl VadGate {
    pub fn new(high: f32, low: f32, silence_timeout: std::time::Duration) -> Self {
        Self {
            gate: HysteresisGate::new(high, low, silence_timeout),
        }
    }

    /// Feed one frame of PCM samples (after Opus decode). Returns `true`
    /// exactly once, on the frame that crosses from speech into sustained
    /// silence — the signal to trigger ASR finalisation.
    pub fn push_frame(&mut self, samples: &[i16], now: Instant) -> bool {
        let rms = rms_level(samples);
        self.gate.push(rms, now)
    }

    pub fn in_speech(&self) -> bool {
        self.gate.in_speech()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud_frame() -> Vec<i16> {
        vec![20_000; 160]
    }

    fn silent_frame() -> Vec<i16> {
        vec![0; 160]
    }

    #[test]
    fn loud_then_sustained_silence_triggers_speech_end() {
        let mut gate = VadGate::new(0.5, 0.1, std::time::Duration::from_millis(200));
        let start = Instant::now();
        assert!(!gate.push_frame(&loud_frame(), start));
        assert!(gate.in_speech());
        assert!(!gate.push_frame(&silent_frame(), start + std::time::Duration::from_millis(50)));
        assert!(gate.push_frame(&silent_frame(), start + std::time::Duration::from_millis(260)));
        assert!(!gate.in_speech());
    }
}
