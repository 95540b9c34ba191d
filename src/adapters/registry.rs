//! In-memory device registry.

use std::rc::Rc;

use heapless::{FnvIndexMap, String};
use log::warn;

use crate::app::ports::{DeviceRegistry, Pump};

/// Registry capacity (power of two).
pub const MAX_PUMPS: usize = 4;

/// [`DeviceRegistry`] over a fixed-capacity name → pump map.
#[derive(Default)]
pub struct PumpRegistry {
    pumps: FnvIndexMap<String<16>, Rc<dyn Pump>, MAX_PUMPS>,
}

impl PumpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pump` under `name`, replacing any previous entry.
    /// Returns `false` if the name is too long or the registry is full.
    pub fn insert(&mut self, name: &str, pump: Rc<dyn Pump>) -> bool {
        let Ok(key) = String::try_from(name) else {
            warn!("PumpRegistry: name '{}' too long", name);
            return false;
        };
        if self.pumps.insert(key, pump).is_err() {
            warn!("PumpRegistry: full, '{}' not registered", name);
            return false;
        }
        true
    }
}

impl DeviceRegistry for PumpRegistry {
    fn get_pump(&self, name: &str) -> Option<Rc<dyn Pump>> {
        let key = String::try_from(name).ok()?;
        self.pumps.get(&key).cloned()
    }
}
