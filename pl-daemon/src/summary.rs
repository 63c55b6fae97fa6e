//! Bring-up report rendering

use std::fmt::Write;

use pl_core::{BringupReport, ComponentState, ComponentSummary, DriverStatus};
use serde::Serialize;

/// Every component settled as healthy
pub const EXIT_CLEAN: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
/// At least one component is degraded or failed
pub const EXIT_DEGRADED: i32 = 2;

/// Document printed by `--json`
#[derive(Debug, Serialize)]
pub struct JsonOutput<'a> {
    pub report: &'a BringupReport,
    pub inventory: &'a [ComponentSummary],
}

pub fn exit_code(report: &BringupReport, inventory: &[ComponentSummary]) -> i32 {
    let unhealthy = inventory
        .iter()
        .any(|c| matches!(c.state, ComponentState::Degraded | ComponentState::Failed));
    if unhealthy || report.degraded > 0 || report.failed > 0 {
        EXIT_DEGRADED
    } else {
        EXIT_CLEAN
    }
}

fn state_marker(state: ComponentState) -> &'static str {
    match state {
        ComponentState::Healthy => "ok",
        ComponentState::Degraded => "DEGRADED",
        ComponentState::Failed => "FAILED",
        ComponentState::Uninitialized => "-",
        ComponentState::Initializing => "...",
    }
}

/// Human readable summary, one line per component grouped by band
pub fn render(report: &BringupReport, inventory: &[ComponentSummary]) -> String {
    let mut out = String::new();
    for band in &report.bands {
        let _ = writeln!(out, "[{}]", band.priority);
        for key in &band.components {
            let Some(component) = inventory.iter().find(|c| &c.key == key) else {
                continue;
            };
            let ready = component.drivers.iter().filter(|d| d.status.is_ready()).count();
            let _ = writeln!(
                out,
                "  {:<32} {:<9} {}/{} drivers",
                component.key,
                state_marker(component.state),
                ready,
                component.drivers.len()
            );
            for (index, driver) in component.drivers.iter().enumerate() {
                if let DriverStatus::Failed { kind, message } = &driver.status {
                    let _ = writeln!(out, "      #{} {} @ {}: {} ({})", index, driver.driver, driver.address, message, kind);
                }
            }
        }
    }
    for failure in report.failures.iter().filter(|f| f.driver.is_none()) {
        let _ = writeln!(out, "  {}: {} ({})", failure.component, failure.message, failure.kind);
    }

    let _ = write!(
        out,
        "{} healthy, {} degraded, {} failed, {} skipped",
        report.healthy, report.degraded, report.failed, report.skipped
    );
    if report.cancelled {
        let _ = write!(out, ", cancelled ({} not attempted)", report.not_attempted);
    }
    let _ = writeln!(out, " in {} ms", report.elapsed_ms);
    out
}
