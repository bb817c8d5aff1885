//! Top-level window lookup and visibility toggling

use windows::core::BOOL;
use windows::Win32::Foundation::{HWND, LPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowLongW, GetWindowThreadProcessId, ShowWindow, GWL_STYLE, SW_HIDE,
    SW_SHOW, WS_VISIBLE,
};

struct Search {
    pid: u32,
    found: Option<HWND>,
}

unsafe extern "system" fn match_process(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let search = &mut *(lparam.0 as *mut Search);
    let mut pid = 0u32;
    GetWindowThreadProcessId(hwnd, Some(&mut pid));
    if pid == search.pid {
        search.found = Some(hwnd);
        return BOOL(0);
    }
    BOOL(1)
}

/// Flip the visibility of the first top-level window owned by `pid`.
/// Returns the new visibility, or `None` when the process has no window.
pub(super) fn toggle_first_window(pid: u32) -> Option<bool> {
    let mut search = Search { pid, found: None };
    unsafe {
        // Stopping early makes EnumWindows report an error; the search result is what counts
        let _ = EnumWindows(Some(match_process), LPARAM(&mut search as *mut Search as isize));
        let hwnd = search.found?;

        let visible = (GetWindowLongW(hwnd, GWL_STYLE) as u32) & WS_VISIBLE.0 != 0;
        let _ = ShowWindow(hwnd, if visible { SW_HIDE } else { SW_SHOW });
        Some(!visible)
    }
}
