//! Build diagnostics: structured log events and per-stage timers.
//!
//! The pipeline never writes to stdout; callers hand a [`BuildContext`] down
//! the stack and drain events from it afterwards.

use std::collections::HashMap;
use std::time::Duration;
use web_time::Instant;

/// Severity of a build event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Progress = 0,
    Warning = 1,
    Error = 2,
}

/// Pipeline stage identifiers for timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Total,
    Rasterization,
    Filtering,
    CompactHeightfield,
    Erosion,
    Regions,
    Contours,
    PolyMesh,
    DetailMesh,
    TileData,
    TraverseLinks,
    TraverseTables,
}

/// A structured diagnostic event: severity, machine-readable code, free text.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: LogLevel,
    pub code: &'static str,
    pub message: String,
}

/// Caller-provided diagnostics sink for a build.
#[derive(Debug, Default)]
pub struct BuildContext {
    events: Vec<LogEvent>,
    active: HashMap<TimerKind, Instant>,
    accumulated: HashMap<TimerKind, Duration>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event.
    pub fn log(&mut self, level: LogLevel, code: &'static str, message: impl Into<String>) {
        self.events.push(LogEvent {
            level,
            code,
            message: message.into(),
        });
    }

    pub fn progress(&mut self, code: &'static str, message: impl Into<String>) {
        self.log(LogLevel::Progress, code, message);
    }

    pub fn warning(&mut self, code: &'static str, message: impl Into<String>) {
        self.log(LogLevel::Warning, code, message);
    }

    pub fn error(&mut self, code: &'static str, message: impl Into<String>) {
        self.log(LogLevel::Error, code, message);
    }

    /// All recorded events, oldest first.
    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    /// Drops recorded events, keeping timer state.
    pub fn reset_log(&mut self) {
        self.events.clear();
    }

    /// Starts (or restarts) a stage timer.
    pub fn start_timer(&mut self, kind: TimerKind) {
        self.active.insert(kind, Instant::now());
    }

    /// Stops a stage timer, accumulating its elapsed time.
    pub fn stop_timer(&mut self, kind: TimerKind) {
        if let Some(start) = self.active.remove(&kind) {
            *self.accumulated.entry(kind).or_default() += start.elapsed();
        }
    }

    /// Total accumulated time for a stage.
    pub fn accumulated_time(&self, kind: TimerKind) -> Duration {
        self.accumulated.get(&kind).copied().unwrap_or_default()
    }

    /// Clears accumulated timings.
    pub fn reset_timers(&mut self) {
        self.active.clear();
        self.accumulated.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels() {
        let mut ctx = BuildContext::new();
        ctx.progress("build.start", "starting");
        ctx.warning("region.small", "dropped 3 regions");
        ctx.error("oom", "allocation failed");
        assert_eq!(ctx.events().len(), 3);
        assert_eq!(ctx.events()[1].level, LogLevel::Warning);
        assert_eq!(ctx.events()[1].code, "region.small");
        ctx.reset_log();
        assert!(ctx.events().is_empty());
    }

    #[test]
    fn test_timer_accumulates() {
        let mut ctx = BuildContext::new();
        ctx.start_timer(TimerKind::Total);
        ctx.stop_timer(TimerKind::Total);
        ctx.start_timer(TimerKind::Total);
        ctx.stop_timer(TimerKind::Total);
        // Two runs accumulate; exact duration is platform noise.
        assert!(ctx.accumulated_time(TimerKind::Total) >= Duration::ZERO);
        ctx.reset_timers();
        assert_eq!(ctx.accumulated_time(TimerKind::Total), Duration::ZERO);
    }
}
