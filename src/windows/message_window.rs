use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Context;
use windows::core::*;
use windows::Win32::Foundation::*;
use windows::Win32::System::LibraryLoader::*;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::session::{dispatch_shared, Dispatch, TrayEvent, TraySession};
use crate::windows::shell::Win32Shell;
use crate::windows::utils::{loword_from_lparam, loword_from_wparam};

#[cfg(debug_assertions)]
const MESSAGE_WINDOW_CLASSNAME: PCWSTR = w!("tray-session-debug::message-window");
#[cfg(not(debug_assertions))]
const MESSAGE_WINDOW_CLASSNAME: PCWSTR = w!("tray-session::message-window");

/// Callback message the shell sends for icon interactions.
pub const WM_TRAYICON: u32 = WM_USER + 1;

pub type SharedSession = Rc<RefCell<TraySession<Win32Shell>>>;

struct WndProcUserData {
    session: SharedSession,
}

impl WndProcUserData {
    unsafe fn from_hwnd<'a>(hwnd: HWND) -> Option<&'a Self> {
        (GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *const Self).as_ref()
    }
}

/// Registers the window class and creates the message-only window.
pub unsafe fn create() -> anyhow::Result<HWND> {
    let hinstance = GetModuleHandleW(None)?;

    let wc = WNDCLASSW {
        hInstance: hinstance.into(),
        lpszClassName: MESSAGE_WINDOW_CLASSNAME,
        lpfnWndProc: Some(wndproc_message_window),
        ..Default::default()
    };

    if RegisterClassW(&wc) == 0 {
        return Err(Error::from_win32()).context("Failed to register message window class");
    }

    let hwnd = CreateWindowExW(
        WINDOW_EX_STYLE::default(),
        MESSAGE_WINDOW_CLASSNAME,
        w!("Test Tray"),
        WINDOW_STYLE::default(),
        0,
        0,
        0,
        0,
        Some(HWND_MESSAGE),
        None,
        Some(hinstance.into()),
        None,
    )
    .context("Failed to create message window")?;

    tracing::debug!("Created message window {hwnd:?}");

    Ok(hwnd)
}

/// Routes the window's messages to `session` until the window is destroyed.
pub unsafe fn attach(hwnd: HWND, session: SharedSession) {
    let userdata = Box::new(WndProcUserData { session });
    SetWindowLongPtrW(hwnd, GWLP_USERDATA, Box::into_raw(userdata) as _);
}

fn cursor_position() -> POINT {
    let mut pt = POINT::default();
    if let Err(e) = unsafe { GetCursorPos(&mut pt) } {
        tracing::warn!("Failed to get cursor position: {e}");
    }
    pt
}

/// Maps a raw window message to a [`TrayEvent`].
///
/// Under `NOTIFYICON_VERSION_4` the icon callback carries the mouse event in
/// `LOWORD(lParam)` and the icon id in `HIWORD(lParam)`.
fn translate(
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
    cursor: impl FnOnce() -> POINT,
) -> TrayEvent {
    match msg {
        WM_TRAYICON if loword_from_lparam(lparam) == WM_RBUTTONUP => {
            let pt = cursor();
            TrayEvent::RightClick { x: pt.x, y: pt.y }
        }
        WM_COMMAND => TrayEvent::MenuCommand(loword_from_wparam(wparam)),
        WM_DESTROY => TrayEvent::Destroy,
        _ => TrayEvent::Other,
    }
}

unsafe extern "system" fn wndproc_message_window(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    // Drop userdata
    if msg == WM_NCDESTROY {
        let userdata = GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *mut WndProcUserData;
        if !userdata.is_null() {
            SetWindowLongPtrW(hwnd, GWLP_USERDATA, 0);
            drop(Box::from_raw(userdata));
        }
        return DefWindowProcW(hwnd, msg, wparam, lparam);
    }

    // Hold our own handle: WM_NCDESTROY may free the userdata while the menu is tracked.
    let Some(session) = WndProcUserData::from_hwnd(hwnd).map(|u| Rc::clone(&u.session)) else {
        return DefWindowProcW(hwnd, msg, wparam, lparam);
    };

    let event = translate(msg, wparam, lparam, cursor_position);
    if event == TrayEvent::Other {
        return DefWindowProcW(hwnd, msg, wparam, lparam);
    }

    match dispatch_shared(&session, event) {
        Some(Dispatch::Handled | Dispatch::ShowMenu { .. }) => LRESULT(0),
        Some(Dispatch::Default) | None => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}
