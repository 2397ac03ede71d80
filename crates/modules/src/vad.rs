//! Default in-process VAD module: a short-window RMS detector with
//! `[high, low]` hysteresis, not model inference. Other VAD codes are
//! pluggable modules behind the same trait and may call out to a provider
//! endpoint; this is the one the registry can always construct with no
//! `base_url`.

use aitoys_domain::config::ModuleRegistrationConfig;
use aitoys_domain::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::module::{Module, ModuleFactory};

pub struct EnergyThresholdVad {
    code: String,
    high: f32,
    low: f32,
}

pub struct EnergyThresholdVadFactory;

#[async_trait]
impl ModuleFactory for EnergyThresholdVadFactory {
    async fn create(&self, config: &ModuleRegistrationConfig) -> Result<Box<dyn Module>> {
        let high = config
            .extra
            .get("confidence_threshold")
            .and_then(|v| v.get(0))
            .and_then(|v| v.as_f64())
            .unwrap_or(0.6) as f32;
        let low = config
            .extra
            .get("confidence_threshold")
            .and_then(|v| v.get(1))
            .and_then(|v| v.as_f64())
            .unwrap_or(0.3) as f32;
        Ok(Box::new(EnergyThresholdVad {
            code: config.code.clone(),
            high,
            low,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct DetectArgs {
    /// PCM16 little-endian samples for the frame under evaluation.
    samples: Vec<i16>,
}

impl EnergyThresholdVad {
    /// Root-mean-square of a PCM16 frame, normalized to `[0, 1]`.
    fn rms(samples: &[i16]) -> f32 {
        rms_level(samples)
    }
}

/// Root-mean-square of a PCM16 frame, normalized to `[0, 1]`. Exposed so
/// callers driving a [`HysteresisGate`] directly (outside a module `call`)
/// can compute the same level the module itself would report.
pub fn rms_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|s| (*s as f64).powi(2)).sum();
    let mean_sq = sum_sq / samples.len() as f64;
    (mean_sq.sqrt() / i16::MAX as f64) as f32
}

#[async_trait]
impl Module for EnergyThresholdVad {
    fn name(&self) -> &str {
        &self.code
    }

    fn description(&self) -> &str {
        "energy/RMS-threshold voice activity detector"
    }

    async fn call(&self, tool_name: &str, arguments: Value) -> Result<Value> {
        if tool_name != "detect" {
            return Err(Error::Protocol(format!("unsupported tool {tool_name}")));
        }
        let args: DetectArgs = serde_json::from_value(arguments)?;
        let level = Self::rms(&args.samples);
        Ok(serde_json::json!({
            "rms": level,
            "above_high": level >= self.high,
            "below_low": level <= self.low,
        }))
    }
}

/// Sustained hysteresis across successive frames: speech starts once RMS
/// crosses `high`, ends once RMS has stayed at or under `low` for
/// `silence_timeout`. Kept separate from the module so the orchestrator
/// can drive it per-session without a module call per frame.
pub struct HysteresisGate {
    high: f32,
    low: f32,
    in_speech: bool,
    below_low_since: Option<std::time::Instant>,
    silence_timeout: std::time::Duration,
}

impl HysteresisGate {
    pub fn new(high: f32, low: f32, silence_timeout: std::time::Duration) -> Self {
        Self {
            high,
            low,
            in_speech: false,
            below_low_since: None,
            silence_timeout,
        }
    }

    /// Feed one frame's RMS level; returns `true` on a speech-end
    /// transition (the signal the orchestrator needs to finalize ASR).
    pub fn push(&mut self, rms: f32, now: std::time::Instant) -> bool {
        if !self.in_speech {
            if rms >= self.high {
                self.in_speech = true;
                self.below_low_since = None;
            }
            return false;
        }

        if rms <= self.low {
            let since = self.below_low_since.get_or_insert(now);
            if now.duration_since(*since) >= self.silence_timeout {
                self.in_speech = false;
                self.below_low_since = None;
                return true;
            }
        } else {
            self.below_low_since = None;
        }
        false
    }

    pub fn in_speech(&self) -> bool {
        self.in_speech
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(EnergyThresholdVad::rms(&[0, 0, 0]), 0.0);
    }

    #[test]
    fn rms_of_full_scale_is_one() {
        let samples = vec![i16::MAX; 100];
        assert!((EnergyThresholdVad::rms(&samples) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn gate_enters_speech_at_high_threshold() {
        let mut gate = HysteresisGate::new(0.6, 0.3, Duration::from_millis(500));
        let t0 = std::time::Instant::now();
        assert!(!gate.in_speech());
        gate.push(0.7, t0);
        assert!(gate.in_speech());
    }

    #[test]
    fn gate_requires_sustained_silence_before_exiting() {
        let mut gate = HysteresisGate::new(0.6, 0.3, Duration::from_millis(500));
        let t0 = std::time::Instant::now();
        gate.push(0.7, t0);
        assert!(gate.in_speech());

        // Drop below low but not yet for the full timeout.
        let ended = gate.push(0.1, t0 + Duration::from_millis(100));
        assert!(!ended);
        assert!(gate.in_speech());

        // Sustained past the timeout relative to when it first dropped.
        let ended = gate.push(0.1, t0 + Duration::from_millis(650));
        assert!(ended);
        assert!(!gate.in_speech());
    }

    #[test]
    fn gate_resets_silence_timer_on_transient_loud_frame() {
        let mut gate = HysteresisGate::new(0.6, 0.3, Duration::from_millis(500));
        let t0 = std::time::Instant::now();
        gate.push(0.7, t0);
        gate.push(0.1, t0 + Duration::from_millis(100));
        // A frame back above low (but below high) resets the silence timer.
        gate.push(0.4, t0 + Duration::from_millis(200));
        let ended = gate.push(0.1, t0 + Duration::from_millis(600));
        assert!(!ended, "silence timer should have reset at t=200ms");
    }
}
