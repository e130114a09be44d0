//! Decoder for daisy-chained battery cell-monitoring modules.
//!
//! Every chain of up to 16 modules reports on its own CAN identifier
//! (`0x4F0`..=`0x4F3`). A frame carries one field of one module: a cell
//! voltage, one of the two NTC temperatures, or the balancing bitmap.
//! [`ModuleManager`] routes frames to the module they belong to and folds all
//! modules with a complete and fresh dataset into pack statistics.
//!
//! ```
//! use embassy_time::Instant;
//! use embedded_can::StandardId;
//! use lg_bms_decoder::{CanFrame, Dispatch, ModuleField, ModuleManager};
//!
//! let mut manager: ModuleManager = ModuleManager::default();
//! // chain 2, module 3, cell 5, 0x9999 -> 3.0 V
//! let id = StandardId::new(0x4F2).unwrap();
//! let frame = CanFrame::from_encoded(id, &[3, 5, 0x99, 0x99]).unwrap();
//! let outcome = manager.dispatch(&frame, Instant::from_secs(1));
//! assert_eq!(
//!     outcome,
//!     Dispatch::Applied { address: 35, field: ModuleField::Cell(5) }
//! );
//! ```

#![cfg_attr(not(any(feature = "std", test)), no_std)]

pub mod can_frame;
pub mod config;
pub mod csv;
pub mod decode;
pub mod manager;
pub mod module;
pub mod pack;

pub use can_frame::CanFrame;
pub use config::PackConfig;
pub use manager::{chain_id, Dispatch, ModuleManager, MAX_MODULES, MODULES_PER_CHAIN};
pub use module::{BmsModule, ModuleField, ModuleFrame, TemperatureSensor, CELLS_PER_MODULE};
pub use pack::{ModuleReport, PackSummary};

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use crate::decode::{encode_temperature, encode_voltage};
    use embassy_time::{Duration, Instant};

    /// Frames of one module in the order the hardware sends them
    fn module_frames(
        chain: u8,
        address: u8,
        volts: f32,
        celsius: f32,
    ) -> impl Iterator<Item = CanFrame> {
        let id = chain_id(chain).unwrap();
        (0..16)
            .map(move |cell| ModuleFrame {
                address,
                field: ModuleField::Cell(cell),
                sample: encode_voltage(volts),
            })
            .chain([
                ModuleFrame {
                    address,
                    field: ModuleField::NegativeTemperature,
                    sample: encode_temperature(celsius),
                },
                ModuleFrame {
                    address,
                    field: ModuleField::PositiveTemperature,
                    sample: encode_temperature(celsius),
                },
                ModuleFrame {
                    address,
                    field: ModuleField::BalanceStatus,
                    sample: 0x0003,
                },
            ])
            .map(move |frame| CanFrame::from_encoded(id, &frame.encode()).unwrap())
    }

    #[test]
    fn pack_comes_and_goes_with_its_modules() {
        let mut manager: ModuleManager = ModuleManager::default();
        let start = Instant::from_secs(50);

        for frame in module_frames(0, 0, 3.6, 21.0).chain(module_frames(1, 4, 3.8, 23.0)) {
            assert!(matches!(manager.dispatch(&frame, start), Dispatch::Applied { .. }));
        }
        let summary = manager.summary(start);
        assert!(summary.module_count == 2);
        assert!((summary.avg_cell_voltage - 3.7).abs() < 1e-3);
        assert!(manager.module(20).unwrap().is_balancing(1));

        // only module 20 keeps reporting
        let later = start + Duration::from_secs(4);
        for frame in module_frames(1, 4, 3.9, 23.0) {
            manager.dispatch(&frame, later);
        }
        let summary = manager.summary(later + Duration::from_secs(3));
        assert!(summary.module_count == 1);
        assert!((summary.pack_voltage - 16.0 * 3.9).abs() < 1e-3);
        assert!(manager.module(20).unwrap().lowest_cell_voltage(0).unwrap() < 3.81);
    }
}
