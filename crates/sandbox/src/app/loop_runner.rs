use std::process::ExitCode;
use std::time::Duration;

use overworld::load_level;
use tracing::{error, info, warn};

use super::bootstrap::AppWiring;
use super::report::{write_report, RunReport};
use super::scenario::Scenario;
use super::session::Session;
use super::SandboxError;

/// Fixed-step pacing for a headless run. Frames advance by a simulated
/// `frame_dt` rather than the wall clock so runs are reproducible.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopSettings {
    pub(crate) fixed_dt: Duration,
    pub(crate) frame_dt: Duration,
    pub(crate) max_frame_delta: Duration,
    pub(crate) max_ticks_per_frame: u32,
    pub(crate) max_frames: u64,
}

impl LoopSettings {
    pub(crate) fn from_scenario(scenario: &Scenario) -> Self {
        Self {
            fixed_dt: Duration::from_secs_f64(1.0 / f64::from(scenario.tick_rate.max(1))),
            frame_dt: Duration::from_millis(scenario.frame_ms),
            max_frame_delta: Duration::from_millis(scenario.max_frame_delta_ms),
            max_ticks_per_frame: scenario.max_ticks_per_frame.max(1),
            max_frames: scenario.max_frames,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoopSummary {
    pub(crate) frames: u64,
    pub(crate) dropped_backlog: Duration,
    pub(crate) completed: bool,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    info!(scenario = %app.scenario_path.display(), "run_started");
    match execute(&app) {
        Ok(report) => {
            info!(
                frames = report.frames,
                ticks = report.ticks,
                completed = report.completed,
                "sandbox_finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "run_failed");
            ExitCode::FAILURE
        }
    }
}

pub(crate) fn execute(app: &AppWiring) -> Result<RunReport, SandboxError> {
    let level_path = app.root.join(&app.scenario.level);
    let level = load_level(&level_path)?;
    let mut session = Session::new(level, &app.scenario)?;
    info!(movers = session.world().mover_count(), "session_ready");

    let settings = LoopSettings::from_scenario(&app.scenario);
    let summary = drive(&mut session, &settings);
    if !summary.completed {
        warn!(max_frames = settings.max_frames, "frame_limit_reached");
    }

    let report = session.report(
        summary.frames,
        summary.dropped_backlog.as_millis(),
        summary.completed,
    );
    write_report(&app.root.join(&app.scenario.report), &report)?;
    Ok(report)
}

pub(crate) fn drive(session: &mut Session, settings: &LoopSettings) -> LoopSummary {
    let fixed_dt_seconds = settings.fixed_dt.as_secs_f32();
    let mut accumulator = Duration::ZERO;
    let mut summary = LoopSummary {
        frames: 0,
        dropped_backlog: Duration::ZERO,
        completed: session.is_finished(),
    };

    while !summary.completed && summary.frames < settings.max_frames {
        summary.frames += 1;
        let clamped_frame_dt = clamp_frame_delta(settings.frame_dt, settings.max_frame_delta);
        accumulator = accumulator.saturating_add(clamped_frame_dt);

        let step_plan = plan_sim_steps(accumulator, settings.fixed_dt, settings.max_ticks_per_frame);
        for _ in 0..step_plan.ticks_to_run {
            session.tick(fixed_dt_seconds);
            if session.is_finished() {
                summary.completed = true;
                break;
            }
        }
        accumulator = step_plan.remaining_accumulator;

        if step_plan.dropped_backlog > Duration::ZERO {
            summary.dropped_backlog = summary.dropped_backlog.saturating_add(step_plan.dropped_backlog);
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame = settings.max_ticks_per_frame,
                "sim_clamp_triggered"
            );
        }
    }
    summary
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(mut accumulator: Duration, fixed_dt: Duration, max_ticks_per_frame: u32) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}
