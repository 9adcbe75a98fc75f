pub mod cartridge;
pub mod registry;
pub mod sms;

pub use cartridge::{BiosImage, CartridgeImage, RomLoadError};
pub use sms::{Region, SmsConfig, SmsSystem};
