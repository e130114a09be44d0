use crate::can_frame::CanFrame;
use crate::config::PackConfig;
use crate::module::{BmsModule, ModuleField, ModuleFrame};
#[cfg(feature = "defmt")]
use defmt::{debug, trace};
use embassy_time::{Duration, Instant};
use embedded_can::StandardId;

/// Modules on one daisy chain
pub const MODULES_PER_CHAIN: usize = 16;
/// Chains the manager listens to, one CAN identifier each
pub const CHAIN_COUNT: u8 = 4;
/// CAN identifier of chain 0, the other chains follow consecutively
pub const CHAIN_BASE_ID: u16 = 0x4F0;
/// Default capacity, every module of every chain
pub const MAX_MODULES: usize = CHAIN_COUNT as usize * MODULES_PER_CHAIN;

const MANAGER_STATUS_ADDRESS: u8 = 0xFF;

/// What happened to a frame handed to [`ModuleManager::dispatch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dispatch {
    /// The field was stored in the module at `address` (chain * 16 + module)
    Applied { address: u8, field: ModuleField },
    /// The frame reached a module but carried a field we don't know
    UnknownField { address: u8, selector: u8 },
    /// Module manager status frame, carries no module data
    ManagerStatus { chain: u8 },
    /// Not a module frame, or addressed outside the configured capacity
    Ignored,
}

/// CAN identifier used by the given chain
pub fn chain_id(chain: u8) -> Option<StandardId> {
    if chain >= CHAIN_COUNT {
        return None;
    }
    StandardId::new(CHAIN_BASE_ID + chain as u16)
}

/// Fixed-capacity set of module states addressed by chain and module address
#[derive(Debug, Clone)]
pub struct ModuleManager<const N: usize = MAX_MODULES> {
    modules: [BmsModule; N],
    config: PackConfig,
}

impl<const N: usize> ModuleManager<N> {
    pub fn new(config: PackConfig) -> Self {
        Self {
            modules: [BmsModule::new(); N],
            config,
        }
    }

    /// Route one frame to the module it belongs to.
    ///
    /// Frames of unrelated traffic are expected on a shared bus and are
    /// dropped without touching any module.
    pub fn dispatch(&mut self, frame: &CanFrame, now: Instant) -> Dispatch {
        let Some(chain) = frame
            .standard_id()
            .and_then(|id| id.checked_sub(CHAIN_BASE_ID))
            .filter(|chain| *chain < CHAIN_COUNT as u16)
        else {
            #[cfg(feature = "defmt")]
            trace!("Ignoring foreign frame {}", frame);
            return Dispatch::Ignored;
        };
        let chain = chain as u8;

        if frame.data.first() == Some(&MANAGER_STATUS_ADDRESS) {
            return Dispatch::ManagerStatus { chain };
        }

        let Some(payload) = ModuleFrame::parse(&frame.data) else {
            #[cfg(feature = "defmt")]
            debug!("Short module frame {}", frame);
            return Dispatch::Ignored;
        };
        if payload.address as usize >= MODULES_PER_CHAIN {
            return Dispatch::Ignored;
        }

        let index = chain as usize * MODULES_PER_CHAIN + payload.address as usize;
        let Some(module) = self.modules.get_mut(index) else {
            #[cfg(feature = "defmt")]
            debug!("Module {} exceeds capacity {}", index, N);
            return Dispatch::Ignored;
        };

        let address = index as u8;
        if module.apply(&payload, now) {
            Dispatch::Applied {
                address,
                field: payload.field,
            }
        } else {
            Dispatch::UnknownField {
                address,
                selector: payload.field.selector(),
            }
        }
    }

    /// Reset every module back to its initial state
    pub fn clear_modules(&mut self) {
        self.modules.iter_mut().for_each(BmsModule::clear);
    }

    pub fn config(&self) -> PackConfig {
        self.config
    }

    pub fn set_parallel_strings(&mut self, parallel_strings: u16) {
        self.config.parallel_strings = parallel_strings;
    }

    pub fn set_stale_window(&mut self, stale_window: Duration) {
        self.config.stale_window = stale_window;
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Copy of the module state at `address`
    pub fn module(&self, address: usize) -> Option<BmsModule> {
        self.modules.get(address).copied()
    }

    pub fn is_module_valid(&self, address: usize, now: Instant) -> bool {
        self.modules
            .get(address)
            .is_some_and(|module| module.is_valid(now, self.config.stale_window))
    }

    /// Modules holding a complete and fresh dataset, with their address
    pub fn valid_modules(&self, now: Instant) -> impl Iterator<Item = (usize, &BmsModule)> + '_ {
        let stale_window = self.config.stale_window;
        self.modules
            .iter()
            .enumerate()
            .filter(move |(_, module)| module.is_valid(now, stale_window))
    }
}

impl<const N: usize> Default for ModuleManager<N> {
    fn default() -> Self {
        Self::new(PackConfig::default())
    }
}
