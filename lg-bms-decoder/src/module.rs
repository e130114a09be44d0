use crate::decode::{decode_temperature, decode_voltage, VOLTAGE_FULL_SCALE};
use embassy_time::{Duration, Instant};

/// Number of cells monitored by one module
pub const CELLS_PER_MODULE: usize = 16;
/// Number of external NTC sensors on one module
pub const SENSORS_PER_MODULE: usize = 2;

const SELECTOR_NEGATIVE_TEMPERATURE: u8 = 17;
const SELECTOR_POSITIVE_TEMPERATURE: u8 = 18;
const SELECTOR_BALANCE_STATUS: u8 = 0xFF;

// Cells 0-15 and both temperature sensors
const REQUIRED_FIELDS: u32 = 0xFFFF
    | (1 << SELECTOR_NEGATIVE_TEMPERATURE)
    | (1 << SELECTOR_POSITIVE_TEMPERATURE);
const BALANCE_STATUS_BIT: u32 = 1 << 31;

const TEMPERATURE_LOW_SEED: f32 = 200.0;
const TEMPERATURE_HIGH_SEED: f32 = -200.0;

/// Field carried by a module data frame, selected by payload byte 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModuleField {
    Cell(u8),
    NegativeTemperature,
    PositiveTemperature,
    BalanceStatus,
    Unknown(u8),
}

impl ModuleField {
    pub fn from_selector(selector: u8) -> Self {
        match selector {
            0..=15 => ModuleField::Cell(selector),
            SELECTOR_NEGATIVE_TEMPERATURE => ModuleField::NegativeTemperature,
            SELECTOR_POSITIVE_TEMPERATURE => ModuleField::PositiveTemperature,
            SELECTOR_BALANCE_STATUS => ModuleField::BalanceStatus,
            other => ModuleField::Unknown(other),
        }
    }

    pub fn selector(&self) -> u8 {
        match *self {
            ModuleField::Cell(cell) => cell,
            ModuleField::NegativeTemperature => SELECTOR_NEGATIVE_TEMPERATURE,
            ModuleField::PositiveTemperature => SELECTOR_POSITIVE_TEMPERATURE,
            ModuleField::BalanceStatus => SELECTOR_BALANCE_STATUS,
            ModuleField::Unknown(selector) => selector,
        }
    }

    /// Bit of this field in the received-fields mask, `None` for unknown fields
    pub fn mask_bit(&self) -> Option<u32> {
        match *self {
            ModuleField::Cell(cell) if (cell as usize) < CELLS_PER_MODULE => Some(1 << cell),
            ModuleField::Cell(_) | ModuleField::Unknown(_) => None,
            ModuleField::NegativeTemperature => Some(1 << SELECTOR_NEGATIVE_TEMPERATURE),
            ModuleField::PositiveTemperature => Some(1 << SELECTOR_POSITIVE_TEMPERATURE),
            ModuleField::BalanceStatus => Some(BALANCE_STATUS_BIT),
        }
    }
}

/// Payload of a module data frame
///
/// | byte | content                          |
/// |------|----------------------------------|
/// | 0    | module address within the chain  |
/// | 1    | field selector                   |
/// | 2-3  | raw sample, big endian           |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModuleFrame {
    pub address: u8,
    pub field: ModuleField,
    pub sample: u16,
}

impl ModuleFrame {
    pub fn parse(data: &[u8]) -> Option<Self> {
        let sample: [u8; 2] = data.get(2..4)?.try_into().ok()?;
        Some(Self {
            address: *data.first()?,
            field: ModuleField::from_selector(*data.get(1)?),
            sample: u16::from_be_bytes(sample),
        })
    }

    pub fn encode(&self) -> [u8; 8] {
        let [high, low] = self.sample.to_be_bytes();
        [self.address, self.field.selector(), high, low, 0, 0, 0, 0]
    }
}

/// One of the two external NTC sensors of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(usize)]
pub enum TemperatureSensor {
    Negative = 0,
    Positive = 1,
}

/// Latest readings and lifetime extremes of one cell-monitoring module
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BmsModule {
    cell_voltage: [f32; CELLS_PER_MODULE],
    lowest_cell_voltage: [f32; CELLS_PER_MODULE],
    highest_cell_voltage: [f32; CELLS_PER_MODULE],
    temperature: [f32; SENSORS_PER_MODULE],
    lowest_temperature: [f32; SENSORS_PER_MODULE],
    highest_temperature: [f32; SENSORS_PER_MODULE],
    balance_status: u16,
    received_fields: u32,
    last_update: Option<Instant>,
}

impl BmsModule {
    pub const fn new() -> Self {
        Self {
            cell_voltage: [0.0; CELLS_PER_MODULE],
            lowest_cell_voltage: [VOLTAGE_FULL_SCALE; CELLS_PER_MODULE],
            highest_cell_voltage: [0.0; CELLS_PER_MODULE],
            temperature: [0.0; SENSORS_PER_MODULE],
            lowest_temperature: [TEMPERATURE_LOW_SEED; SENSORS_PER_MODULE],
            highest_temperature: [TEMPERATURE_HIGH_SEED; SENSORS_PER_MODULE],
            balance_status: 0,
            received_fields: 0,
            last_update: None,
        }
    }

    /// Reset readings, extremes and freshness to their initial values
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Store one field of this module. Returns `false` if the field is unknown
    /// and nothing was changed.
    pub fn apply(&mut self, frame: &ModuleFrame, now: Instant) -> bool {
        let Some(bit) = frame.field.mask_bit() else {
            return false;
        };

        match frame.field {
            ModuleField::Cell(cell) => {
                let cell = cell as usize;
                let volts = decode_voltage(frame.sample);
                self.cell_voltage[cell] = volts;
                if volts < self.lowest_cell_voltage[cell] {
                    self.lowest_cell_voltage[cell] = volts;
                }
                if volts > self.highest_cell_voltage[cell] {
                    self.highest_cell_voltage[cell] = volts;
                }
            }
            ModuleField::NegativeTemperature => {
                self.store_temperature(TemperatureSensor::Negative, frame.sample)
            }
            ModuleField::PositiveTemperature => {
                self.store_temperature(TemperatureSensor::Positive, frame.sample)
            }
            ModuleField::BalanceStatus => self.balance_status = frame.sample,
            ModuleField::Unknown(_) => return false,
        }

        self.received_fields |= bit;
        self.last_update = Some(now);
        true
    }

    fn store_temperature(&mut self, sensor: TemperatureSensor, sample: u16) {
        let sensor = sensor as usize;
        let celsius = decode_temperature(sample);
        self.temperature[sensor] = celsius;
        if celsius < self.lowest_temperature[sensor] {
            self.lowest_temperature[sensor] = celsius;
        }
        if celsius > self.highest_temperature[sensor] {
            self.highest_temperature[sensor] = celsius;
        }
    }

    /// A module is valid while every cell and both sensors have been received
    /// and the last frame is no older than `stale_window`.
    pub fn is_valid(&self, now: Instant, stale_window: Duration) -> bool {
        let complete = self.received_fields & REQUIRED_FIELDS == REQUIRED_FIELDS;
        let fresh = self
            .last_update
            .is_some_and(|last| now.saturating_duration_since(last) <= stale_window);
        complete && fresh
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    pub fn received_fields(&self) -> u32 {
        self.received_fields
    }

    pub fn cell_voltage(&self, cell: usize) -> Option<f32> {
        self.cell_voltage.get(cell).copied()
    }

    pub fn cell_voltages(&self) -> [f32; CELLS_PER_MODULE] {
        self.cell_voltage
    }

    pub fn lowest_cell_voltage(&self, cell: usize) -> Option<f32> {
        self.lowest_cell_voltage.get(cell).copied()
    }

    pub fn highest_cell_voltage(&self, cell: usize) -> Option<f32> {
        self.highest_cell_voltage.get(cell).copied()
    }

    pub fn temperature(&self, sensor: TemperatureSensor) -> f32 {
        self.temperature[sensor as usize]
    }

    pub fn temperatures(&self) -> [f32; SENSORS_PER_MODULE] {
        self.temperature
    }

    pub fn lowest_temperature(&self, sensor: TemperatureSensor) -> f32 {
        self.lowest_temperature[sensor as usize]
    }

    pub fn highest_temperature(&self, sensor: TemperatureSensor) -> f32 {
        self.highest_temperature[sensor as usize]
    }

    /// Lowest current cell voltage of the module
    pub fn low_cell_voltage(&self) -> f32 {
        self.cell_voltage.iter().copied().fold(VOLTAGE_FULL_SCALE, f32::min)
    }

    /// Highest current cell voltage of the module
    pub fn high_cell_voltage(&self) -> f32 {
        self.cell_voltage.iter().copied().fold(0.0, f32::max)
    }

    pub fn low_temperature(&self) -> f32 {
        self.temperature[0].min(self.temperature[1])
    }

    pub fn high_temperature(&self) -> f32 {
        self.temperature[0].max(self.temperature[1])
    }

    /// Sum of all cell voltages
    pub fn module_voltage(&self) -> f32 {
        self.cell_voltage.iter().sum()
    }

    /// Balancing bitmap, bit n set while cell n is being balanced
    pub fn balance_status(&self) -> u16 {
        self.balance_status
    }

    pub fn is_balancing(&self, cell: usize) -> bool {
        cell < CELLS_PER_MODULE && self.balance_status & (1 << cell) != 0
    }
}

impl Default for BmsModule {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{encode_temperature, encode_voltage};
    use assert2::assert;

    fn field(field: ModuleField, sample: u16) -> ModuleFrame {
        ModuleFrame {
            address: 0,
            field,
            sample,
        }
    }

    fn fill(module: &mut BmsModule, volts: f32, celsius: f32, now: Instant) {
        for cell in 0..CELLS_PER_MODULE as u8 {
            module.apply(&field(ModuleField::Cell(cell), encode_voltage(volts)), now);
        }
        let sample = encode_temperature(celsius);
        module.apply(&field(ModuleField::NegativeTemperature, sample), now);
        module.apply(&field(ModuleField::PositiveTemperature, sample), now);
    }

    #[test]
    fn selectors_map_to_fields() {
        assert!(ModuleField::from_selector(0) == ModuleField::Cell(0));
        assert!(ModuleField::from_selector(15) == ModuleField::Cell(15));
        assert!(ModuleField::from_selector(16) == ModuleField::Unknown(16));
        assert!(ModuleField::from_selector(17) == ModuleField::NegativeTemperature);
        assert!(ModuleField::from_selector(18) == ModuleField::PositiveTemperature);
        assert!(ModuleField::from_selector(0xFF) == ModuleField::BalanceStatus);
        assert!(ModuleField::from_selector(0x42) == ModuleField::Unknown(0x42));
        assert!(ModuleField::BalanceStatus.selector() == 0xFF);
    }

    #[test]
    fn parse_frame_payload() {
        let frame = ModuleFrame::parse(&0x0305_1234_0000_0000_u64.to_be_bytes()).unwrap();
        assert!(frame.address == 3);
        assert!(frame.field == ModuleField::Cell(5));
        assert!(frame.sample == 0x1234);
        assert!(ModuleFrame::parse(&frame.encode()) == Some(frame));

        assert!(ModuleFrame::parse(&[0x03, 0x05, 0x12]).is_none());
        assert!(ModuleFrame::parse(&[]).is_none());
    }

    #[test]
    fn cell_extremes_are_monotone() {
        let mut module = BmsModule::new();
        let now = Instant::from_secs(1);
        for volts in [1.0, 3.0, 2.0] {
            assert!(module.apply(&field(ModuleField::Cell(5), encode_voltage(volts)), now));
        }
        assert!(module.cell_voltage(5) == Some(2.0));
        assert!(module.lowest_cell_voltage(5) == Some(1.0));
        assert!(module.highest_cell_voltage(5) == Some(3.0));

        // untouched cells keep their seeds
        assert!(module.lowest_cell_voltage(4) == Some(5.0));
        assert!(module.highest_cell_voltage(4) == Some(0.0));
        assert!(module.cell_voltage(16).is_none());
    }

    #[test]
    fn temperature_extremes_replace_seeds() {
        let mut module = BmsModule::new();
        let now = Instant::from_secs(1);
        module.apply(&field(ModuleField::PositiveTemperature, 40000), now);
        module.apply(&field(ModuleField::PositiveTemperature, 50000), now);

        let sensor = TemperatureSensor::Positive;
        assert!((module.temperature(sensor) - -15.5524).abs() < 1e-3);
        assert!((module.highest_temperature(sensor) - 8.7819).abs() < 1e-3);
        assert!(module.lowest_temperature(sensor) == module.temperature(sensor));
        assert!(module.lowest_temperature(TemperatureSensor::Negative) == 200.0);
        assert!(module.highest_temperature(TemperatureSensor::Negative) == -200.0);
    }

    #[test]
    fn balance_status_is_stored_raw() {
        let mut module = BmsModule::new();
        assert!(module.apply(
            &field(ModuleField::BalanceStatus, 0b1000_0000_0000_0101),
            Instant::from_secs(1)
        ));
        assert!(module.balance_status() == 0b1000_0000_0000_0101);
        assert!(module.is_balancing(0));
        assert!(!module.is_balancing(1));
        assert!(module.is_balancing(15));
        assert!(!module.is_balancing(16));
        assert!(module.cell_voltages() == [0.0; CELLS_PER_MODULE]);
    }

    #[test]
    fn unknown_field_changes_nothing() {
        let mut module = BmsModule::new();
        let before = module;
        assert!(!module.apply(&field(ModuleField::Unknown(16), 0xFFFF), Instant::from_secs(1)));
        assert!(!module.apply(&field(ModuleField::Cell(16), 0xFFFF), Instant::from_secs(1)));
        assert!(module == before);
        assert!(module.last_update().is_none());
    }

    #[test]
    fn validity_needs_complete_and_fresh_data() {
        let window = Duration::from_secs(5);
        let start = Instant::from_secs(10);
        let mut module = BmsModule::new();
        assert!(!module.is_valid(start, window));

        for cell in 0..CELLS_PER_MODULE as u8 {
            module.apply(&field(ModuleField::Cell(cell), encode_voltage(3.7)), start);
        }
        module.apply(&field(ModuleField::NegativeTemperature, 40000), start);
        assert!(!module.is_valid(start, window));

        module.apply(&field(ModuleField::PositiveTemperature, 40000), start);
        assert!(module.is_valid(start, window));
        assert!(module.is_valid(start + window, window));
        assert!(!module.is_valid(start + window + Duration::from_millis(1), window));

        // a single refreshing frame revives the complete dataset
        module.apply(&field(ModuleField::Cell(0), encode_voltage(3.7)), start + window * 2);
        assert!(module.is_valid(start + window * 2, window));
    }

    #[test]
    fn per_module_aggregates() {
        let mut module = BmsModule::new();
        let now = Instant::from_secs(1);
        fill(&mut module, 3.0, 25.0, now);
        module.apply(&field(ModuleField::Cell(3), encode_voltage(2.5)), now);
        module.apply(&field(ModuleField::Cell(9), encode_voltage(3.5)), now);
        module.apply(&field(ModuleField::PositiveTemperature, encode_temperature(30.0)), now);

        assert!((module.module_voltage() - 48.0).abs() < 1e-3);
        assert!((module.low_cell_voltage() - 2.5).abs() < 1e-4);
        assert!((module.high_cell_voltage() - 3.5).abs() < 1e-4);
        assert!((module.low_temperature() - 25.0).abs() < 0.01);
        assert!((module.high_temperature() - 30.0).abs() < 0.01);
    }

    #[test]
    fn clear_restores_initial_state() {
        let mut module = BmsModule::new();
        fill(&mut module, 3.7, 20.0, Instant::from_secs(1));
        module.clear();
        assert!(module == BmsModule::default());
        assert!(module.received_fields() == 0);
    }
}
