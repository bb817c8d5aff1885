//! Win32 backend: hidden window, `RegisterHotKey` and global atoms
//!
//! The window and its hotkeys belong to the thread that created them, so a
//! `Win32Surface` never leaves the listener thread. Other threads reach it
//! through `Win32Remote`, which only posts messages or makes calls Windows
//! accepts from any thread.

use std::sync::Arc;

use tracing::{debug, warn};
use windows::core::{w, HSTRING, PCWSTR};
use windows::Win32::Foundation::{
    GetLastError, ERROR_CLASS_ALREADY_EXISTS, HINSTANCE, HWND, LPARAM, LRESULT, WPARAM,
};
use windows::Win32::System::DataExchange::{GlobalAddAtomW, GlobalDeleteAtom, GlobalFindAtomW};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    RegisterHotKey, UnregisterHotKey, HOT_KEY_MODIFIERS,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW,
    PostMessageW, PostQuitMessage, RegisterClassExW, ShowWindow, TranslateMessage,
    UnregisterClassW, MSG, SW_HIDE, SW_SHOW, WINDOW_EX_STYLE, WM_CLOSE, WM_DESTROY, WM_HOTKEY,
    WNDCLASSEXW, WS_OVERLAPPEDWINDOW,
};

use crate::hotkey::{Error, Modifiers, Result};

use super::{HotkeyId, Platform, Surface, SurfaceMessage, SurfaceRemote};

const CLASS_NAME: PCWSTR = w!("HotkeydListenerWindow");
const WINDOW_TITLE: PCWSTR = w!("hotkeyd");

/// Native Windows backend
#[derive(Debug, Default)]
pub struct Win32Platform;

impl Win32Platform {
    /// Create the backend
    pub fn new() -> Self {
        Self
    }
}

impl Platform for Win32Platform {
    fn create_surface(&self, visible: bool) -> Result<Box<dyn Surface>> {
        unsafe {
            let instance: HINSTANCE = GetModuleHandleW(None)
                .map_err(|e| Error::Class(e.to_string()))?
                .into();

            let wc = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                lpfnWndProc: Some(window_proc),
                hInstance: instance,
                lpszClassName: CLASS_NAME,
                ..Default::default()
            };
            if RegisterClassExW(&wc) == 0 {
                let err = GetLastError();
                if err != ERROR_CLASS_ALREADY_EXISTS {
                    return Err(Error::Class(format!("RegisterClassExW failed ({:?})", err)));
                }
                debug!("listener window class already registered, reusing");
            }

            let hwnd = CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                CLASS_NAME,
                WINDOW_TITLE,
                WS_OVERLAPPEDWINDOW,
                0,
                0,
                100,
                100,
                None,
                None,
                Some(instance),
                None,
            )
            .map_err(|e| {
                let _ = UnregisterClassW(CLASS_NAME, Some(instance));
                Error::Window(e.to_string())
            })?;

            let _ = ShowWindow(hwnd, if visible { SW_SHOW } else { SW_HIDE });
            debug!(hwnd = hwnd.0 as isize, visible, "listener window created");

            Ok(Box::new(Win32Surface { hwnd, instance }))
        }
    }

    fn acquire_id(&self, token: &str) -> Option<HotkeyId> {
        let wide = HSTRING::from(token);
        let name = PCWSTR(wide.as_ptr());
        unsafe {
            match GlobalAddAtomW(name) {
                0 => match GlobalFindAtomW(name) {
                    0 => None,
                    atom => Some(atom),
                },
                atom => Some(atom),
            }
        }
    }

    fn release_id(&self, id: HotkeyId) {
        unsafe {
            GlobalDeleteAtom(id);
        }
    }
}

struct Win32Surface {
    hwnd: HWND,
    instance: HINSTANCE,
}

impl Surface for Win32Surface {
    fn register(
        &mut self,
        id: HotkeyId,
        modifiers: Modifiers,
        key: u16,
    ) -> std::result::Result<(), String> {
        unsafe {
            RegisterHotKey(
                Some(self.hwnd),
                i32::from(id),
                HOT_KEY_MODIFIERS(u32::from(modifiers.bits())),
                u32::from(key),
            )
        }
        .map_err(|e| e.message().to_string())
    }

    fn unregister(&mut self, id: HotkeyId) {
        if let Err(e) = unsafe { UnregisterHotKey(Some(self.hwnd), i32::from(id)) } {
            debug!(id, error = %e, "UnregisterHotKey failed");
        }
    }

    fn next_message(&mut self) -> SurfaceMessage {
        let mut msg = MSG::default();
        loop {
            let rc = unsafe { GetMessageW(&mut msg, None, 0, 0) };
            match rc.0 {
                0 => return SurfaceMessage::Destroy,
                -1 => {
                    let err = unsafe { GetLastError() };
                    return SurfaceMessage::Failed(format!("GetMessageW failed ({:?})", err));
                }
                _ => {}
            }
            if msg.message == WM_HOTKEY {
                return SurfaceMessage::Hotkey(msg.wParam.0 as HotkeyId);
            }
            unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }

    fn remote(&self) -> Arc<dyn SurfaceRemote> {
        Arc::new(Win32Remote {
            hwnd: self.hwnd.0 as isize,
        })
    }

    fn destroy(self: Box<Self>) {
        unsafe {
            if let Err(e) = DestroyWindow(self.hwnd) {
                debug!(error = %e, "DestroyWindow failed");
            }
            if let Err(e) = UnregisterClassW(CLASS_NAME, Some(self.instance)) {
                debug!(error = %e, "UnregisterClassW failed");
            }
        }
        debug!(hwnd = self.hwnd.0 as isize, "listener window destroyed");
    }
}

/// Window handle usable from other threads
struct Win32Remote {
    hwnd: isize,
}

impl Win32Remote {
    fn hwnd(&self) -> HWND {
        HWND(self.hwnd as *mut _)
    }
}

impl SurfaceRemote for Win32Remote {
    fn unregister(&self, id: HotkeyId) -> bool {
        // Fails when called off the registering thread; the listener retries
        unsafe { UnregisterHotKey(Some(self.hwnd()), i32::from(id)) }.is_ok()
    }

    fn request_close(&self) {
        if let Err(e) = unsafe { PostMessageW(Some(self.hwnd()), WM_CLOSE, WPARAM(0), LPARAM(0)) } {
            warn!(error = %e, "failed to post WM_CLOSE to listener window");
        }
    }
}

unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        // Only end the loop; the window is destroyed after teardown has
        // unregistered its hotkeys
        WM_CLOSE => {
            PostQuitMessage(0);
            LRESULT(0)
        }
        WM_DESTROY => {
            PostQuitMessage(0);
            LRESULT(0)
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}
