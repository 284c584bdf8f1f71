//! Popup menu model for the tray icon.

/// Command id carried by `WM_COMMAND` when "Exit" is picked.
pub const EXIT_COMMAND_ID: u16 = 1001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub label: String,
    pub id: u16,
}

/// Ordered entries of the context menu, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupMenu {
    pub entries: Vec<MenuEntry>,
}

impl Default for PopupMenu {
    fn default() -> Self {
        Self {
            entries: vec![MenuEntry {
                label: "Exit".into(),
                id: EXIT_COMMAND_ID,
            }],
        }
    }
}

impl PopupMenu {
    pub fn entry(&self, id: u16) -> Option<&MenuEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn is_exit(&self, id: u16) -> bool {
        id == EXIT_COMMAND_ID && self.entry(id).is_some()
    }
}
