use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Context;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::icon::IconDescriptor;
use crate::menu::PopupMenu;
use crate::session::TraySession;
use crate::windows::shell::Win32Shell;
use crate::windows::utils::HwndWithDrop;

mod message_window;
mod shell;
mod utils;

pub fn run() -> anyhow::Result<()> {
    let hwnd = unsafe { message_window::create()? };
    let message_window = HwndWithDrop(hwnd);

    let shell = Win32Shell::new(hwnd)?;
    let session = TraySession::initialize(
        shell,
        IconDescriptor::new(message_window::WM_TRAYICON),
        PopupMenu::default(),
    )?;
    let session = Rc::new(RefCell::new(session));

    unsafe { message_window::attach(hwnd, Rc::clone(&session)) };

    pump_messages()?;

    session.borrow_mut().shutdown();

    // Destroying the window after termination is a no-op for the session.
    drop(message_window);

    let session = session.borrow();
    tracing::debug!(
        "Message loop finished, session {} (icon registered: {})",
        session.state(),
        session.is_registered()
    );

    Ok(())
}

/// Blocks until `WM_QUIT` is posted.
fn pump_messages() -> anyhow::Result<()> {
    let mut msg = MSG::default();

    loop {
        let ret = unsafe { GetMessageW(&mut msg, None, 0, 0) };
        match ret.0 {
            -1 => {
                return Err(windows::core::Error::from_win32()).context("GetMessageW failed");
            }
            0 => return Ok(()),
            _ => unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            },
        }
    }
}
