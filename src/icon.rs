/// Identifier of the single icon this process registers with the shell.
pub const TRAY_ICON_ID: u32 = 1;

/// Tooltip shown when hovering the icon.
pub const TRAY_TOOLTIP: &str = "Rust Test Tray Icon";

/// Capacity of the shell's tooltip buffer in UTF-16 units, NUL included.
pub const TOOLTIP_CAPACITY: usize = 128;

/// Which fields of an [`IconDescriptor`] the shell should honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IconFeatures {
    pub icon: bool,
    pub message: bool,
    pub tip: bool,
    /// Show the standard tooltip even under protocol version 4.
    pub show_tip: bool,
}

impl IconFeatures {
    pub const ALL: Self = Self {
        icon: true,
        message: true,
        tip: true,
        show_tip: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum ProtocolVersion {
    /// Pre-Vista callback layout, the shell default.
    #[default]
    #[strum(to_string = "legacy")]
    Legacy,
    /// `NOTIFYICON_VERSION_4`: event in `LOWORD(lParam)`, icon id in `HIWORD(lParam)`.
    #[strum(to_string = "v4")]
    V4,
}

/// Platform-neutral view of the data handed to the shell on registration.
///
/// The owning window and the icon image are platform handles and live in the
/// shell implementation; everything else is described here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconDescriptor {
    pub id: u32,
    pub features: IconFeatures,
    pub callback_message: u32,
    pub tooltip: String,
    pub version: ProtocolVersion,
}

impl IconDescriptor {
    pub fn new(callback_message: u32) -> Self {
        Self {
            id: TRAY_ICON_ID,
            features: IconFeatures::ALL,
            callback_message,
            tooltip: TRAY_TOOLTIP.to_string(),
            version: ProtocolVersion::Legacy,
        }
    }

    /// Tooltip as a NUL-terminated UTF-16 buffer, truncated to fit the shell's field.
    pub fn tooltip_wide(&self) -> [u16; TOOLTIP_CAPACITY] {
        let mut buf = [0u16; TOOLTIP_CAPACITY];
        for (slot, unit) in buf[..TOOLTIP_CAPACITY - 1]
            .iter_mut()
            .zip(self.tooltip.encode_utf16())
        {
            *slot = unit;
        }
        buf
    }
}
