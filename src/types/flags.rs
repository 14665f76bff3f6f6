//! Flag types.

use bitflags::bitflags;

bitflags! {
    /// Device capability flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceCapabilities: u32 {
        /// No capabilities.
        const NONE = 0x00000000;
        /// The daemon supports this device.
        const NM_SUPPORTED = 0x00000001;
        /// Device supports carrier detection.
        const CARRIER_DETECT = 0x00000002;
        /// Device is a software device.
        const IS_SOFTWARE = 0x00000004;
    }
}
