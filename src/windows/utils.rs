use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};

/// A simple wrapper around HWND that destroys the window when dropped.
pub struct HwndWithDrop(pub HWND);

impl Drop for HwndWithDrop {
    fn drop(&mut self) {
        unsafe {
            let _ = windows::Win32::UI::WindowsAndMessaging::DestroyWindow(self.0);
        }
    }
}

#[inline]
pub fn loword_from_wparam(wparam: WPARAM) -> u16 {
    (wparam.0 & 0xFFFF) as u16
}

#[inline]
pub fn loword_from_lparam(lparam: LPARAM) -> u32 {
    (lparam.0 & 0xFFFF) as u32
}
