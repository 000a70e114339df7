use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::pipeline::{FrameStats, FrameTrace, Phase, PhaseStatus};

/// Timing of one phase in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetric {
    pub phase: Phase,
    pub duration: Duration,
    pub object_count: usize,
    pub failed: bool,
}

/// Cumulative pipeline counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub frames: u64,
    pub dropped_frames: u64,
    /// Frames aborted by a critical phase.
    pub failed_frames: u64,
    pub last_frame: Duration,
    pub average_frame: Duration,
    pub objects_rendered: u64,
    pub objects_culled: u64,
    pub batches: u64,
    pub lod_objects: u64,
    pub cache: CacheStats,
}

/// Averages for one phase over the rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseBreakdown {
    pub phase: Phase,
    pub average: Duration,
    pub max: Duration,
    pub failures: usize,
    pub samples: usize,
    /// Share of the summed phase time, 0..=1.
    pub share: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct MetricsRecorder {
    window: usize,
    history: VecDeque<Vec<PhaseMetric>>,
    totals: FrameMetrics,
    total_time: Duration,
}

impl MetricsRecorder {
    pub(crate) fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            history: VecDeque::with_capacity(window),
            totals: FrameMetrics::default(),
            total_time: Duration::ZERO,
        }
    }

    pub(crate) fn record_frame(&mut self, trace: &FrameTrace, stats: &FrameStats) {
        self.push_trace(trace);
        let totals = &mut self.totals;
        totals.frames += 1;
        if stats.over_budget {
            totals.dropped_frames += 1;
        }
        totals.last_frame = stats.duration;
        self.total_time += stats.duration;
        totals.average_frame = self.total_time / u32::try_from(totals.frames).unwrap_or(u32::MAX);
        totals.objects_rendered += stats.rendered as u64;
        totals.objects_culled += stats.culled as u64;
        totals.batches += stats.batches as u64;
        totals.lod_objects += stats.lod_objects as u64;
    }

    pub(crate) fn record_failure(&mut self, trace: &FrameTrace) {
        self.push_trace(trace);
        self.totals.failed_frames += 1;
    }

    fn push_trace(&mut self, trace: &FrameTrace) {
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(
            trace
                .records()
                .iter()
                .map(|r| PhaseMetric {
                    phase: r.phase,
                    duration: r.duration,
                    object_count: r.object_count,
                    failed: matches!(r.status, PhaseStatus::Failed(_)),
                })
                .collect(),
        );
    }

    pub(crate) fn snapshot(&self, cache: CacheStats) -> FrameMetrics {
        FrameMetrics {
            cache,
            ..self.totals.clone()
        }
    }

    pub(crate) fn breakdown(&self) -> Vec<PhaseBreakdown> {
        let mut rows: Vec<PhaseBreakdown> = Phase::ORDER
            .iter()
            .map(|&phase| {
                let samples: Vec<&PhaseMetric> = self
                    .history
                    .iter()
                    .flat_map(|frame| frame.iter())
                    .filter(|m| m.phase == phase)
                    .collect();
                let total: Duration = samples.iter().map(|m| m.duration).sum();
                PhaseBreakdown {
                    phase,
                    average: if samples.is_empty() {
                        Duration::ZERO
                    } else {
                        total / u32::try_from(samples.len()).unwrap_or(u32::MAX)
                    },
                    max: samples.iter().map(|m| m.duration).max().unwrap_or_default(),
                    failures: samples.iter().filter(|m| m.failed).count(),
                    samples: samples.len(),
                    share: 0.0,
                }
            })
            .collect();

        let sum: f64 = rows.iter().map(|r| r.average.as_secs_f64()).sum();
        if sum > 0.0 {
            for row in &mut rows {
                row.share = row.average.as_secs_f64() / sum;
            }
        }
        rows
    }

    pub(crate) fn window_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PhaseRecord;

    fn trace(ms: u64) -> FrameTrace {
        let mut trace = FrameTrace::new(1);
        for phase in Phase::ORDER {
            trace.push(PhaseRecord {
                phase,
                status: PhaseStatus::Completed,
                duration: Duration::from_millis(ms),
                object_count: 0,
            });
        }
        trace
    }

    fn stats(ms: u64, over_budget: bool) -> FrameStats {
        FrameStats {
            duration: Duration::from_millis(ms),
            rendered: 3,
            culled: 2,
            over_budget,
            ..FrameStats::default()
        }
    }

    #[test]
    fn test_totals_accumulate() {
        let mut rec = MetricsRecorder::new(10);
        rec.record_frame(&trace(1), &stats(10, false));
        rec.record_frame(&trace(1), &stats(30, true));
        let m = rec.snapshot(CacheStats::default());
        assert_eq!(m.frames, 2);
        assert_eq!(m.dropped_frames, 1);
        assert_eq!(m.last_frame, Duration::from_millis(30));
        assert_eq!(m.average_frame, Duration::from_millis(20));
        assert_eq!(m.objects_rendered, 6);
        assert_eq!(m.objects_culled, 4);
    }

    #[test]
    fn test_window_is_rolling() {
        let mut rec = MetricsRecorder::new(2);
        rec.record_frame(&trace(100), &stats(1, false));
        rec.record_frame(&trace(2), &stats(1, false));
        rec.record_frame(&trace(4), &stats(1, false));
        assert_eq!(rec.window_len(), 2);

        let rows = rec.breakdown();
        assert_eq!(rows.len(), Phase::ORDER.len());
        let prepare = rows[0];
        assert_eq!(prepare.phase, Phase::Prepare);
        assert_eq!(prepare.samples, 2);
        assert_eq!(prepare.average, Duration::from_millis(3));
        assert_eq!(prepare.max, Duration::from_millis(4));
        assert!((rows.iter().map(|r| r.share).sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_failures_counted() {
        let mut rec = MetricsRecorder::new(4);
        let mut failed = FrameTrace::new(2);
        failed.push(PhaseRecord {
            phase: Phase::Render,
            status: PhaseStatus::Failed("boom".to_string()),
            duration: Duration::ZERO,
            object_count: 0,
        });
        rec.record_failure(&failed);
        let render = rec
            .breakdown()
            .into_iter()
            .find(|r| r.phase == Phase::Render)
            .unwrap();
        assert_eq!(render.failures, 1);
        assert_eq!(rec.snapshot(CacheStats::default()).failed_frames, 1);
        assert_eq!(rec.snapshot(CacheStats::default()).frames, 0);
    }
}
