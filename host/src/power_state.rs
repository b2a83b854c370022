//! The persisted lifecycle state machine.

/// Lifecycle state of the VM, persisted as a single byte across power
/// cycles.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum PowerState {
    /// The VM was cleanly powered off via the syscon poweroff code.
    PowerOff = 0,
    /// A hibernation snapshot was taken; the next boot should resume
    /// from it.
    Hibernate = 1,
    /// The VM requested a reboot via the syscon reboot code.
    Reboot = 2,
    /// Ask the storage-persisted registry for the real prior state,
    /// rather than assuming one. Used as the `start_vm` hint when the
    /// caller has no better information (e.g. first boot after a cold
    /// power application).
    GetSd = 3,
    /// The VM is currently executing. Written immediately before
    /// entering the instruction loop so a crash mid-run is visible on
    /// the next boot as neither a clean terminal nor `Unknown`.
    Running = 4,
    /// The interpreter returned a return code this host does not
    /// recognize.
    Unknown = 5,
}

impl PowerState {
    /// Decodes a persisted byte, defaulting to [`PowerState::Unknown`]
    /// for any value outside the known range.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::PowerOff,
            1 => Self::Hibernate,
            2 => Self::Reboot,
            3 => Self::GetSd,
            4 => Self::Running,
            _ => Self::Unknown,
        }
    }

    /// Encodes this state as the byte stored in the registry file.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}
