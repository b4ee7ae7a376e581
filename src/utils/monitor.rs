use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Stages of one evaluation run, in the order the engine goes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalPhase {
    Config,
    Environment,
    Policy,
    Rollout,
    Record,
}

impl EvalPhase {
    pub fn label(&self) -> &'static str {
        match self {
            EvalPhase::Config => "Config merged",
            EvalPhase::Environment => "Environment ready",
            EvalPhase::Policy => "Policy restored",
            EvalPhase::Rollout => "Rollout finished",
            EvalPhase::Record => "Record written",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseStats {
    pub phase: EvalPhase,
    pub elapsed: Duration,
    /// Resident memory after the phase; `None` without the `monitor` feature.
    pub memory_mb: Option<u64>,
    pub cpu_usage: Option<f32>,
}

struct MonitorState {
    phase_start: Instant,
    phases: Vec<PhaseStats>,
    sampler: Option<ProcessSampler>,
}

/// Per-phase timing and process usage for `--monitor`.
pub struct EvalMonitor {
    enabled: bool,
    started: Instant,
    state: Mutex<MonitorState>,
}

impl EvalMonitor {
    pub fn new(enabled: bool) -> Self {
        let now = Instant::now();
        let sampler = if enabled { ProcessSampler::current() } else { None };
        Self {
            enabled,
            started: now,
            state: Mutex::new(MonitorState {
                phase_start: now,
                phases: Vec::new(),
                sampler,
            }),
        }
    }

    /// Closes `phase`; the next phase is timed from here.
    pub fn finish(&self, phase: EvalPhase) {
        if !self.enabled {
            return;
        }
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        let now = Instant::now();
        let elapsed = now.duration_since(state.phase_start);
        state.phase_start = now;
        let sample = state.sampler.as_mut().and_then(ProcessSampler::sample);

        let stats = PhaseStats {
            phase,
            elapsed,
            memory_mb: sample.map(|(memory_mb, _)| memory_mb),
            cpu_usage: sample.map(|(_, cpu)| cpu),
        };
        match (stats.memory_mb, stats.cpu_usage) {
            (Some(memory_mb), Some(cpu)) => tracing::info!(
                "📊 {} in {:?} - CPU: {:.1}%, Memory: {}MB",
                phase.label(),
                elapsed,
                cpu,
                memory_mb
            ),
            _ => tracing::info!("📊 {} in {:?}", phase.label(), elapsed),
        }
        state.phases.push(stats);
    }

    /// Logs the run total, the slowest phase and peak memory, and returns
    /// the recorded phases.
    pub fn report(&self) -> Vec<PhaseStats> {
        if !self.enabled {
            return Vec::new();
        }
        let phases = match self.state.lock() {
            Ok(state) => state.phases.clone(),
            Err(_) => return Vec::new(),
        };

        let slowest = phases.iter().max_by_key(|p| p.elapsed);
        let peak = phases.iter().filter_map(|p| p.memory_mb).max();
        tracing::info!(
            "📊 Final Stats - Total Time: {:?}, Slowest: {}, Peak Memory: {}",
            self.started.elapsed(),
            slowest.map_or("-", |p| p.phase.label()),
            peak.map_or_else(|| "n/a".to_string(), |mb| format!("{}MB", mb))
        );
        phases
    }
}

impl Default for EvalMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(feature = "monitor")]
struct ProcessSampler {
    system: sysinfo::System,
    pid: sysinfo::Pid,
}

#[cfg(feature = "monitor")]
impl ProcessSampler {
    fn current() -> Option<Self> {
        match sysinfo::get_current_pid() {
            Ok(pid) => Some(Self {
                system: sysinfo::System::new(),
                pid,
            }),
            Err(e) => {
                tracing::warn!("System monitoring unavailable: {}", e);
                None
            }
        }
    }

    /// (resident MB, CPU %) of this process.
    fn sample(&mut self) -> Option<(u64, f32)> {
        self.system
            .refresh_processes(sysinfo::ProcessesToUpdate::Some(&[self.pid]), true);
        let process = self.system.process(self.pid)?;
        Some((process.memory() / 1024 / 1024, process.cpu_usage()))
    }
}

// 未啟用 monitor feature 時只計時
#[cfg(not(feature = "monitor"))]
struct ProcessSampler;

#[cfg(not(feature = "monitor"))]
impl ProcessSampler {
    fn current() -> Option<Self> {
        Some(Self)
    }

    fn sample(&mut self) -> Option<(u64, f32)> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_monitor_records_nothing() {
        let monitor = EvalMonitor::new(false);
        monitor.finish(EvalPhase::Config);
        monitor.finish(EvalPhase::Rollout);
        assert!(monitor.report().is_empty());
    }

    #[test]
    fn test_phases_recorded_in_order() {
        let monitor = EvalMonitor::new(true);
        monitor.finish(EvalPhase::Config);
        std::thread::sleep(Duration::from_millis(5));
        monitor.finish(EvalPhase::Environment);

        let phases = monitor.report();
        let order: Vec<EvalPhase> = phases.iter().map(|p| p.phase).collect();
        assert_eq!(order, vec![EvalPhase::Config, EvalPhase::Environment]);
        assert!(phases[1].elapsed >= Duration::from_millis(5));
    }

    #[cfg(feature = "monitor")]
    #[test]
    fn test_process_memory_sampled() {
        let monitor = EvalMonitor::new(true);
        monitor.finish(EvalPhase::Policy);
        let phases = monitor.report();
        assert!(phases[0].memory_mb.is_some());
        assert!(phases[0].cpu_usage.is_some());
    }
}
