// src/strategies/mod.rs
pub mod cci_reversion;
pub mod dip_buyer;
pub mod traits;

use crate::config::HookConfig;
use cci_reversion::CciReversion;
use dip_buyer::DipBuyer;
use traits::DecisionHook;

pub fn create_hook(config: &HookConfig) -> Box<dyn DecisionHook> {
    match config {
        HookConfig::DipBuyer { drop_percentage } => Box::new(DipBuyer::new(*drop_percentage)),
        HookConfig::CciReversion { period, threshold } => {
            Box::new(CciReversion::new(*period, *threshold))
        }
    }
}
