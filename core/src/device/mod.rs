pub mod sms_vdp;
pub mod sn76489;

pub use sms_vdp::{SmsVdp, VdpConfig};
pub use sn76489::Sn76489;
