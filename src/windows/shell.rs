use anyhow::Context;
use windows::core::HSTRING;
use windows::Win32::Foundation::*;
use windows::Win32::UI::Shell::*;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::icon::{IconDescriptor, ProtocolVersion};
use crate::menu::PopupMenu;
use crate::session::{MenuTracker, Shell};

/// [`Shell`] backed by `Shell_NotifyIconW` and the Win32 menu API.
pub struct Win32Shell {
    hwnd: HWND,
    menu: HMENU,
    icon: HICON,
}

impl Win32Shell {
    pub fn new(hwnd: HWND) -> anyhow::Result<Self> {
        let icon = unsafe { LoadIconW(None, IDI_APPLICATION) }
            .context("Failed to load the default application icon")?;

        Ok(Self {
            hwnd,
            menu: HMENU::default(),
            icon,
        })
    }

    fn notify_data(&self, icon: &IconDescriptor) -> NOTIFYICONDATAW {
        let mut flags = NOTIFY_ICON_DATA_FLAGS::default();
        if icon.features.icon {
            flags |= NIF_ICON;
        }
        if icon.features.message {
            flags |= NIF_MESSAGE;
        }
        if icon.features.tip {
            flags |= NIF_TIP;
        }
        if icon.features.show_tip {
            flags |= NIF_SHOWTIP;
        }

        let mut nid = NOTIFYICONDATAW {
            cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: self.hwnd,
            uID: icon.id,
            uFlags: flags,
            uCallbackMessage: icon.callback_message,
            hIcon: self.icon,
            szTip: icon.tooltip_wide(),
            ..Default::default()
        };

        nid.Anonymous.uVersion = match icon.version {
            ProtocolVersion::V4 => NOTIFYICON_VERSION_4,
            ProtocolVersion::Legacy => 0,
        };

        nid
    }

    fn notify(
        &self,
        message: NOTIFY_ICON_MESSAGE,
        icon: &IconDescriptor,
    ) -> windows::core::Result<()> {
        let nid = self.notify_data(icon);
        unsafe { Shell_NotifyIconW(message, &nid) }.ok()
    }
}

/// Tracks the popup menu on behalf of the message window.
#[derive(Debug, Clone, Copy)]
pub struct Win32MenuTracker {
    hwnd: HWND,
    menu: HMENU,
}

impl MenuTracker for Win32MenuTracker {
    fn track(&self, x: i32, y: i32) -> anyhow::Result<()> {
        unsafe {
            TrackPopupMenu(
                self.menu,
                TPM_BOTTOMALIGN | TPM_LEFTALIGN,
                x,
                y,
                None,
                self.hwnd,
                None,
            )
        }
        .ok()
        .context("TrackPopupMenu failed")
    }
}

impl Shell for Win32Shell {
    type Tracker = Win32MenuTracker;

    fn build_menu(&mut self, menu: &PopupMenu) -> anyhow::Result<()> {
        let hmenu = unsafe { CreatePopupMenu() }.context("Failed to create popup menu")?;

        for entry in &menu.entries {
            let label = HSTRING::from(entry.label.as_str());
            unsafe { AppendMenuW(hmenu, MF_STRING, entry.id as usize, &label) }
                .with_context(|| format!("Failed to append menu entry {:?}", entry.label))?;
        }

        self.menu = hmenu;
        Ok(())
    }

    fn destroy_menu(&mut self) -> anyhow::Result<()> {
        unsafe { DestroyMenu(self.menu) }.context("Failed to destroy popup menu")?;
        self.menu = HMENU::default();
        Ok(())
    }

    fn menu_tracker(&self) -> Win32MenuTracker {
        Win32MenuTracker {
            hwnd: self.hwnd,
            menu: self.menu,
        }
    }

    fn add_icon(&mut self, icon: &IconDescriptor) -> anyhow::Result<()> {
        self.notify(NIM_ADD, icon)
            .context("Failed to add the tray icon")
    }

    fn set_version(&mut self, icon: &IconDescriptor) -> anyhow::Result<()> {
        self.notify(NIM_SETVERSION, icon)
            .with_context(|| format!("Failed to set tray icon protocol to {}", icon.version))
    }

    fn remove_icon(&mut self, icon: &IconDescriptor) -> anyhow::Result<()> {
        self.notify(NIM_DELETE, icon)
            .context("Failed to remove the tray icon")
    }

    fn set_foreground(&mut self) -> anyhow::Result<()> {
        unsafe { SetForegroundWindow(self.hwnd) }
            .ok()
            .map_err(Into::into)
    }

    fn request_quit(&mut self) {
        unsafe { PostQuitMessage(0) };
    }
}
