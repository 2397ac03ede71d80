//! Per-provider-call metrics recorder. Wraps every module `call`/
//! `call_stream` invocation in a "monitor scope", buffers the resulting
//! rows in memory, and flushes them in batches without blocking the
//! caller. Also maintains the in-memory daily token/cost quota cache used
//! as a fast pre-flight reject before a turn pays for a provider call.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use aitoys_domain::model::AiMetric;
use aitoys_domain::trace::TraceEvent;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

const MAX_BATCH_SIZE: usize = 100;
const MAX_BUFFER_ROWS: usize = 5_000;

/// An in-progress call measurement, created on monitor-scope entry and
/// completed on exit.
pub struct MonitorScope {
    pub monitor_id: String,
    pub provider: String,
    pub model: String,
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    start_instant: Instant,
    pub input_chars: u32,
    first_byte_at: Option<Instant>,
    first_token_at: Option<Instant>,
}

impl MonitorScope {
    pub fn open(provider: impl Into<String>, model: impl Into<String>, session_id: Uuid, input_chars: u32) -> Self {
        Self {
            monitor_id: Uuid::new_v4().to_string(),
            provider: provider.into(),
            model: model.into(),
            session_id,
            started_at: Utc::now(),
            start_instant: Instant::now(),
            input_chars,
            first_byte_at: None,
            first_token_at: None,
        }
    }

    pub fn record_first_byte(&mut self) {
        self.first_byte_at.get_or_insert_with(Instant::now);
    }

    pub fn record_first_token(&mut self) {
        self.first_token_at.get_or_insert_with(Instant::now);
    }

    pub fn close(
        self,
        output_chars: u32,
        input_tokens: u32,
        output_tokens: u32,
        tool_call_count: u32,
        cost: aitoys_domain::model::CostBreakdown,
    ) -> AiMetric {
        let ended_at = Utc::now();
        AiMetric {
            id: 0,
            monitor_id: self.monitor_id,
            provider: self.provider,
            model: self.model,
            session_id: self.session_id,
            started_at: self.started_at,
            ended_at,
            input_tokens,
            output_tokens,
            input_chars: self.input_chars,
            output_chars,
            tool_call_count,
            cost,
            first_byte_latency_ms: self
                .first_byte_at
                .map(|t| t.duration_since(self.start_instant).as_millis() as u32),
            first_token_latency_ms: self
                .first_token_at
                .map(|t| t.duration_since(self.start_instant).as_millis() as u32),
            total_time_ms: self.start_instant.elapsed().as_millis() as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DailyUsage {
    day: Option<chrono::NaiveDate>,
    calls: u32,
    cost_usd: f64,
}

/// Buffers `AiMetric` rows and exposes the daily quota fast-reject cache.
/// Actual persistence is driven by the store crate calling `drain_batch`
/// on a timer; this type has no knowledge of SQL.
pub struct MetricsRecorder {
    buffer: Mutex<VecDeque<AiMetric>>,
    daily: Mutex<HashMap<i64, DailyUsage>>,
    max_daily_calls: u32,
    max_daily_cost_usd: f64,
}

impl MetricsRecorder {
    pub fn new(max_daily_calls: u32, max_daily_cost_usd: f64) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::new()),
            daily: Mutex::new(HashMap::new()),
            max_daily_calls,
            max_daily_cost_usd,
        }
    }

    /// Record a completed call. Never blocks on persistence; drops the
    /// oldest buffered row (with a warning) if the bound is exceeded.
    pub fn record(&self, agent_id: i64, metric: AiMetric) {
        {
            let mut buffer = self.buffer.lock();
            if buffer.len() >= MAX_BUFFER_ROWS {
                buffer.pop_front();
                tracing::warn!(
                    agent_id,
                    capacity = MAX_BUFFER_ROWS,
                    "metrics buffer full, dropping oldest row"
                );
            }
            buffer.push_back(metric.clone());
        }

        let mut daily = self.daily.lock();
        let today = Utc::now().date_naive();
        let entry = daily.entry(agent_id).or_default();
        if entry.day != Some(today) {
            *entry = DailyUsage {
                day: Some(today),
                calls: 0,
                cost_usd: 0.0,
            };
        }
        entry.calls += 1;
        entry.cost_usd += metric.cost.total_cost;
    }

    /// Pop up to `MAX_BATCH_SIZE` rows for the store's flush worker.
    /// Re-queues nothing itself — on a failed flush the caller is expected
    /// to call `requeue`.
    pub fn drain_batch(&self) -> Vec<AiMetric> {
        let mut buffer = self.buffer.lock();
        let n = buffer.len().min(MAX_BATCH_SIZE);
        buffer.drain(..n).collect()
    }

    /// Put rows back after a failed flush, respecting the buffer bound.
    pub fn requeue(&self, rows: Vec<AiMetric>) {
        let mut buffer = self.buffer.lock();
        for row in rows {
            if buffer.len() >= MAX_BUFFER_ROWS {
                tracing::warn!("metrics buffer full on requeue, dropping row");
                break;
            }
            buffer.push_front(row);
        }
    }

    /// Cheap pre-flight check: would this agent's next call exceed its
    /// configured daily ceiling? Advisory only — the authoritative ledger
    /// is the persisted `ai_metrics` table.
    pub fn would_exceed_quota(&self, agent_id: i64) -> bool {
        let daily = self.daily.lock();
        match daily.get(&agent_id) {
            Some(usage) if usage.day == Some(Utc::now().date_naive()) => {
                usage.calls >= self.max_daily_calls || usage.cost_usd >= self.max_daily_cost_usd
            }
            _ => false,
        }
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().len()
    }
}

pub fn emit_module_call_trace(
    module_type: &str,
    module_code: &str,
    tool_name: &str,
    duration: Duration,
    is_error: bool,
) {
    TraceEvent::ModuleCall {
        module_type: module_type.to_string(),
        module_code: module_code.to_string(),
        tool_name: tool_name.to_string(),
        duration_ms: duration.as_millis() as u64,
        is_error,
    }
    .emit();
}

#[cfg(test)]
mod tests {
    use super::*;
    use aitoys_domain::model::CostBreakdown;

    fn sample_metric(cost: f64) -> AiMetric {
        MonitorScope::open("openai-compat", "gpt-4o", Uuid::new_v4(), 42).close(
            10,
            100,
            50,
            0,
            CostBreakdown {
                input_cost: cost,
                output_cost: 0.0,
                total_cost: cost,
            },
        )
    }

    #[test]
    fn drain_batch_caps_at_max_batch_size() {
        let recorder = MetricsRecorder::new(1_000, 100.0);
        for _ in 0..150 {
            recorder.record(1, sample_metric(0.01));
        }
        let batch = recorder.drain_batch();
        assert_eq!(batch.len(), MAX_BATCH_SIZE);
        assert_eq!(recorder.buffered_len(), 50);
    }

    #[test]
    fn requeue_respects_buffer_bound() {
        let recorder = MetricsRecorder::new(1_000, 100.0);
        let rows: Vec<_> = (0..3).map(|_| sample_metric(0.01)).collect();
        recorder.requeue(rows);
        assert_eq!(recorder.buffered_len(), 3);
    }

    #[test]
    fn quota_trips_after_configured_call_count() {
        let recorder = MetricsRecorder::new(2, 100.0);
        assert!(!recorder.would_exceed_quota(7));
        recorder.record(7, sample_metric(0.01));
        recorder.record(7, sample_metric(0.01));
        assert!(recorder.would_exceed_quota(7));
    }

    #[test]
    fn quota_trips_on_cost_ceiling() {
        let recorder = MetricsRecorder::new(1_000, 1.0);
        recorder.record(9, sample_metric(1.5));
        assert!(recorder.would_exceed_quota(9));
    }

    #[test]
    fn different_agents_have_independent_quota_counters() {
        let recorder = MetricsRecorder::new(1, 100.0);
        recorder.record(1, sample_metric(0.01));
        assert!(recorder.would_exceed_quota(1));
        assert!(!recorder.would_exceed_quota(2));
    }
}
