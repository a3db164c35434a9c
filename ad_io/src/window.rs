//! Native window bindings used to drive installer dialogs.

use ad_core::Error;

use crate::traits::{MinimizeMode, WindowAutomation, WindowHandle};

/// US English; reported where no UI language can be queried.
pub const DEFAULT_UI_LANGUAGE: u16 = 1033;

/// The window backend for the current platform.
pub fn platform_automation() -> Box<dyn WindowAutomation> {
    #[cfg(windows)]
    {
        Box::new(win32::Win32Automation)
    }
    #[cfg(not(windows))]
    {
        Box::new(HeadlessAutomation)
    }
}

/// Backend for hosts without a window system: no installer window is ever
/// found, so installers simply run to completion.
pub struct HeadlessAutomation;

impl WindowAutomation for HeadlessAutomation {
    fn main_window_title(&self, _pid: u32) -> Option<String> {
        None
    }

    fn find_window_by_title(&self, _title: &str) -> Option<WindowHandle> {
        None
    }

    fn find_child_control(&self, _window: WindowHandle, _label: &str) -> Option<WindowHandle> {
        None
    }

    fn send_click(&self, _control: WindowHandle) -> Result<(), Error> {
        Err(Error::AutomationFailed {
            message: "no window system available".to_string(),
        })
    }

    fn minimize(&self, _window: WindowHandle, _mode: MinimizeMode) -> Result<(), Error> {
        Ok(())
    }

    fn restore(&self, _window: WindowHandle) -> Result<(), Error> {
        Ok(())
    }

    fn set_foreground(&self, _window: WindowHandle) -> Result<(), Error> {
        Ok(())
    }

    fn ui_language(&self) -> u16 {
        DEFAULT_UI_LANGUAGE
    }
}

#[cfg(windows)]
mod win32 {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;

    use windows::Win32::Foundation::{BOOL, HWND, LPARAM, WPARAM};
    use windows::Win32::Globalization::GetUserDefaultUILanguage;
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, FindWindowExW, FindWindowW, GW_OWNER, GetWindow, GetWindowTextW,
        GetWindowThreadProcessId, IsWindowVisible, SW_RESTORE, SW_SHOWMINNOACTIVE, SW_SHOWNA,
        SendMessageW, SetForegroundWindow, ShowWindowAsync,
    };
    use windows::core::PCWSTR;

    use super::*;

    const BM_CLICK: u32 = 0x00F5;

    pub struct Win32Automation;

    fn wide(s: &str) -> Vec<u16> {
        OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
    }

    fn hwnd(handle: WindowHandle) -> HWND {
        HWND(handle.0 as *mut core::ffi::c_void)
    }

    fn handle(hwnd: HWND) -> Option<WindowHandle> {
        if hwnd.0.is_null() {
            None
        } else {
            Some(WindowHandle(hwnd.0 as isize))
        }
    }

    struct Search {
        pid: u32,
        found: Option<HWND>,
    }

    unsafe extern "system" fn find_main_window(window: HWND, lparam: LPARAM) -> BOOL {
        let search = unsafe { &mut *(lparam.0 as *mut Search) };
        let mut pid = 0u32;
        unsafe { GetWindowThreadProcessId(window, Some(&mut pid)) };
        let owned = unsafe { GetWindow(window, GW_OWNER) }.is_ok_and(|owner| !owner.0.is_null());
        if pid == search.pid && !owned && unsafe { IsWindowVisible(window) }.as_bool() {
            search.found = Some(window);
            return BOOL(0);
        }
        BOOL(1)
    }

    fn window_text(window: HWND) -> String {
        let mut buf = [0u16; 512];
        let len = unsafe { GetWindowTextW(window, &mut buf) };
        String::from_utf16_lossy(&buf[..len.max(0) as usize])
    }

    impl WindowAutomation for Win32Automation {
        fn main_window_title(&self, pid: u32) -> Option<String> {
            let mut search = Search { pid, found: None };
            // EnumWindows reports an error when the callback stops early
            let _ = unsafe {
                EnumWindows(
                    Some(find_main_window),
                    LPARAM(&mut search as *mut Search as isize),
                )
            };
            search
                .found
                .map(window_text)
                .filter(|title| !title.is_empty())
        }

        fn find_window_by_title(&self, title: &str) -> Option<WindowHandle> {
            let title = wide(title);
            unsafe { FindWindowW(PCWSTR::null(), PCWSTR(title.as_ptr())) }
                .ok()
                .and_then(handle)
        }

        fn find_child_control(&self, window: WindowHandle, label: &str) -> Option<WindowHandle> {
            let class = wide("Button");
            let label = wide(label);
            unsafe {
                FindWindowExW(
                    hwnd(window),
                    HWND::default(),
                    PCWSTR(class.as_ptr()),
                    PCWSTR(label.as_ptr()),
                )
            }
            .ok()
            .and_then(handle)
        }

        fn send_click(&self, control: WindowHandle) -> Result<(), Error> {
            unsafe { SendMessageW(hwnd(control), BM_CLICK, WPARAM(0), LPARAM(0)) };
            Ok(())
        }

        fn minimize(&self, window: WindowHandle, mode: MinimizeMode) -> Result<(), Error> {
            let cmd = match mode {
                MinimizeMode::MinimizedNoActivate => SW_SHOWMINNOACTIVE,
                MinimizeMode::ShowNoActivate => SW_SHOWNA,
            };
            let _ = unsafe { ShowWindowAsync(hwnd(window), cmd) };
            Ok(())
        }

        fn restore(&self, window: WindowHandle) -> Result<(), Error> {
            let _ = unsafe { ShowWindowAsync(hwnd(window), SW_RESTORE) };
            Ok(())
        }

        fn set_foreground(&self, window: WindowHandle) -> Result<(), Error> {
            if unsafe { SetForegroundWindow(hwnd(window)) }.as_bool() {
                Ok(())
            } else {
                Err(Error::AutomationFailed {
                    message: "window refused foreground activation".to_string(),
                })
            }
        }

        fn ui_language(&self) -> u16 {
            unsafe { GetUserDefaultUILanguage() }
        }
    }
}
