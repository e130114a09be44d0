//! Pack level statistics folded from every valid module.
//!
//! Only modules that pass [`BmsModule::is_valid`] contribute. Averages over
//! zero modules and voltages over zero parallel strings are reported as 0,
//! extremes over zero modules as `None`.

use crate::manager::ModuleManager;
use crate::module::{BmsModule, CELLS_PER_MODULE, SENSORS_PER_MODULE};
use embassy_time::Instant;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PackSummary {
    pub module_count: usize,
    pub series_cells: usize,
    pub parallel_strings: u16,
    pub pack_voltage: f32,
    pub avg_cell_voltage: f32,
    pub low_cell_voltage: Option<f32>,
    pub high_cell_voltage: Option<f32>,
    pub cell_voltage_delta: Option<f32>,
    pub avg_temperature: f32,
    pub low_temperature: Option<f32>,
    pub high_temperature: Option<f32>,
}

/// Snapshot of one valid module for reporting collaborators
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModuleReport {
    pub address: usize,
    pub module_voltage: f32,
    pub low_cell_voltage: f32,
    pub high_cell_voltage: f32,
    pub low_temperature: f32,
    pub high_temperature: f32,
    pub cell_voltages: [f32; CELLS_PER_MODULE],
    pub temperatures: [f32; SENSORS_PER_MODULE],
    pub balance_status: u16,
}

impl ModuleReport {
    pub fn new(address: usize, module: &BmsModule) -> Self {
        Self {
            address,
            module_voltage: module.module_voltage(),
            low_cell_voltage: module.low_cell_voltage(),
            high_cell_voltage: module.high_cell_voltage(),
            low_temperature: module.low_temperature(),
            high_temperature: module.high_temperature(),
            cell_voltages: module.cell_voltages(),
            temperatures: module.temperatures(),
            balance_status: module.balance_status(),
        }
    }
}

impl<const N: usize> ModuleManager<N> {
    fn fold_valid(&self, now: Instant, value: fn(&BmsModule) -> f32) -> f32 {
        self.valid_modules(now).map(|(_, module)| value(module)).sum()
    }

    fn reduce_valid(
        &self,
        now: Instant,
        value: fn(&BmsModule) -> f32,
        pick: fn(f32, f32) -> f32,
    ) -> Option<f32> {
        self.valid_modules(now)
            .map(|(_, module)| value(module))
            .reduce(pick)
    }

    /// Number of modules with a complete and fresh dataset
    pub fn module_count(&self, now: Instant) -> usize {
        self.valid_modules(now).count()
    }

    /// Cells in series, every valid module spread over the parallel strings
    pub fn series_cells(&self, now: Instant) -> usize {
        match self.config().parallel_strings {
            0 => 0,
            strings => self.module_count(now) * CELLS_PER_MODULE / strings as usize,
        }
    }

    pub fn pack_voltage(&self, now: Instant) -> f32 {
        match self.config().parallel_strings {
            0 => 0.0,
            strings => self.fold_valid(now, BmsModule::module_voltage) / strings as f32,
        }
    }

    pub fn avg_cell_voltage(&self, now: Instant) -> f32 {
        match self.module_count(now) {
            0 => 0.0,
            count => {
                self.fold_valid(now, BmsModule::module_voltage)
                    / (count * CELLS_PER_MODULE) as f32
            }
        }
    }

    pub fn high_cell_voltage(&self, now: Instant) -> Option<f32> {
        self.reduce_valid(now, BmsModule::high_cell_voltage, f32::max)
    }

    pub fn low_cell_voltage(&self, now: Instant) -> Option<f32> {
        self.reduce_valid(now, BmsModule::low_cell_voltage, f32::min)
    }

    pub fn avg_temperature(&self, now: Instant) -> f32 {
        match self.module_count(now) {
            0 => 0.0,
            count => {
                self.fold_valid(now, |module| module.temperatures().iter().sum())
                    / (count * SENSORS_PER_MODULE) as f32
            }
        }
    }

    pub fn high_temperature(&self, now: Instant) -> Option<f32> {
        self.reduce_valid(now, BmsModule::high_temperature, f32::max)
    }

    pub fn low_temperature(&self, now: Instant) -> Option<f32> {
        self.reduce_valid(now, BmsModule::low_temperature, f32::min)
    }

    pub fn summary(&self, now: Instant) -> PackSummary {
        let low_cell_voltage = self.low_cell_voltage(now);
        let high_cell_voltage = self.high_cell_voltage(now);
        PackSummary {
            module_count: self.module_count(now),
            series_cells: self.series_cells(now),
            parallel_strings: self.config().parallel_strings,
            pack_voltage: self.pack_voltage(now),
            avg_cell_voltage: self.avg_cell_voltage(now),
            low_cell_voltage,
            high_cell_voltage,
            cell_voltage_delta: high_cell_voltage.zip(low_cell_voltage).map(|(h, l)| h - l),
            avg_temperature: self.avg_temperature(now),
            low_temperature: self.low_temperature(now),
            high_temperature: self.high_temperature(now),
        }
    }

    pub fn reports(&self, now: Instant) -> impl Iterator<Item = ModuleReport> + '_ {
        self.valid_modules(now)
            .map(|(address, module)| ModuleReport::new(address, module))
    }
}
