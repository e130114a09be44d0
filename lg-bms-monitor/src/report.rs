use lg_bms_decoder::{ModuleReport, PackSummary};
use std::fmt::Write;
use tracing::info;

fn or_dash(value: Option<f32>, digits: usize) -> String {
    value.map_or_else(|| String::from("-"), |value| format!("{value:.digits$}"))
}

/// One line for the pack, one line per module
pub fn log_summary(summary: &PackSummary, reports: &[ModuleReport]) {
    info!(
        "Modules: {}  Cells: {}  Voltage: {:.3}V  Avg Cell Voltage: {:.3}V  Avg Temp: {:.1}C",
        summary.module_count,
        summary.series_cells,
        summary.pack_voltage,
        summary.avg_cell_voltage,
        summary.avg_temperature
    );
    for report in reports {
        info!(
            "Module #{}  Voltage: {:.3}V ({:.3}V-{:.3}V)  Temperatures: ({:.1}C-{:.1}C)",
            report.address,
            report.module_voltage,
            report.low_cell_voltage,
            report.high_cell_voltage,
            report.low_temperature,
            report.high_temperature
        );
    }
}

/// Pack line with extremes and per-cell lines with balancing markers.
///
/// Cells are numbered through the whole pack, `X` marks a balancing cell.
pub fn log_details(summary: &PackSummary, reports: &[ModuleReport], digits: usize) {
    let delta_mv = summary.cell_voltage_delta.map(|delta| delta * 1000.0);
    info!(
        "Modules: {} Cells: {} Strings: {}  Voltage: {:.digits$}V  Avg Cell Voltage: {:.digits$}V  \
         Low Cell Voltage: {}V  High Cell Voltage: {}V  Delta Voltage: {}mV  Avg Temp: {:.1}C",
        summary.module_count,
        summary.series_cells,
        summary.parallel_strings,
        summary.pack_voltage,
        summary.avg_cell_voltage,
        or_dash(summary.low_cell_voltage, digits),
        or_dash(summary.high_cell_voltage, digits),
        or_dash(delta_mv, 0),
        summary.avg_temperature
    );

    let mut cell_number = 0;
    for report in reports {
        info!("{}", module_line(report, digits, &mut cell_number));
        info!(
            " Temp 1: {:.2}C Temp 2: {:.2}C  Bal Stat: {:016b}",
            report.temperatures[0], report.temperatures[1], report.balance_status
        );
    }
}

fn module_line(report: &ModuleReport, digits: usize, cell_number: &mut usize) -> String {
    let mut line = format!(
        "Module #{:<2}  {:.digits$}V",
        report.address, report.module_voltage
    );
    for (cell, volts) in report.cell_voltages.iter().enumerate() {
        let marker = if report.balance_status & (1 << cell) != 0 {
            'X'
        } else {
            '-'
        };
        let _ = write!(line, "  Cell{:<2}: {volts:.digits$}V {marker}", *cell_number);
        *cell_number += 1;
    }
    line
}
