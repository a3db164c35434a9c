//! Driving a native installer to completion.
//!
//! The installer is launched into the staging directory and polled: once its
//! main window shows up it is minimized (once), and every known button label
//! found on it is clicked. A label clicked more than the ceiling allows is
//! considered stuck; a stuck confirmation button, an automation error or an
//! exhausted time budget hands the window to the user instead.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use ad_core::{Error, Limits};

use crate::traits::{
    InstallerLauncher, InstallerProcess, MinimizeMode, WindowAutomation, WindowHandle,
};

/// UI languages (de-DE, en-US, en-GB) whose installers tolerate being minimized.
pub const MINIMIZE_LANGUAGES: [u16; 3] = [1031, 1033, 2057];

/// Labels clicked in order; the first two are confirmation buttons.
pub const DEFAULT_BUTTON_LABELS: &[&str] = &[
    "OK",
    "&OK",
    "&Next >",
    "&Install",
    "I &Agree",
    "&Yes",
    "&Finish",
    "&Close",
];

/// How many leading labels are confirmation buttons.
const CONFIRMATION_LABELS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationOutcome {
    /// The installer exited while being driven
    Completed,
    /// The user finished the installation
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomationReport {
    pub outcome: AutomationOutcome,
    pub clicks: u32,
    pub elapsed: Duration,
}

/// Per-attempt bookkeeping, dropped once the attempt ends.
#[derive(Debug, Default)]
pub struct AutomationState {
    pub minimized_windows: HashSet<WindowHandle>,
    pub click_counts: HashMap<String, u32>,
    pub clicks: u32,
    pub window: Option<WindowHandle>,
}

enum Step {
    Continue,
    Exited,
    Escalate,
}

pub struct InstallAutomator<'a> {
    windows: &'a dyn WindowAutomation,
    launcher: &'a dyn InstallerLauncher,
    budget: Duration,
    click_ceiling: u32,
    poll_interval: Duration,
}

impl<'a> InstallAutomator<'a> {
    pub fn new(
        windows: &'a dyn WindowAutomation,
        launcher: &'a dyn InstallerLauncher,
        limits: &Limits,
    ) -> Self {
        Self {
            windows,
            launcher,
            budget: limits.automation_budget,
            click_ceiling: limits.click_ceiling,
            poll_interval: limits.poll_interval,
        }
    }

    /// Arguments telling the installer where to unpack.
    pub fn installer_args(apps_dir: &Path) -> Vec<String> {
        vec![format!("/DESTINATION=\"{}\\\"", apps_dir.display())]
    }

    /// Launch `installer` into `apps_dir` and see it through to exit.
    pub fn run(&self, installer: &Path, apps_dir: &Path) -> Result<AutomationReport, Error> {
        std::fs::create_dir_all(apps_dir)?;
        let args = Self::installer_args(apps_dir);
        let mut process = self.launcher.launch(installer, &args, apps_dir)?;
        info!(pid = process.id(), installer = %installer.display(), "installer started");
        self.drive(process.as_mut())
    }

    pub fn drive(&self, process: &mut dyn InstallerProcess) -> Result<AutomationReport, Error> {
        let started = Instant::now();
        let mut state = AutomationState::default();

        let automate = match process.has_exited() {
            Ok(true) => return Ok(self.report(AutomationOutcome::Completed, &state, started)),
            Ok(false) => true,
            Err(e) => {
                warn!(error = %e, "installer automation failed");
                false
            }
        };

        while automate && started.elapsed() < self.budget {
            match self.poll(process, &mut state) {
                Ok(Step::Exited) => {
                    debug!(clicks = state.clicks, "installer finished under automation");
                    return Ok(self.report(AutomationOutcome::Completed, &state, started));
                }
                Ok(Step::Continue) => {}
                Ok(Step::Escalate) => break,
                Err(e) => {
                    warn!(error = %e, "installer automation failed");
                    break;
                }
            }
            std::thread::sleep(self.poll_interval);
        }

        info!("handing installer over to the user");
        self.manual(process, state.window)?;
        Ok(self.report(AutomationOutcome::Manual, &state, started))
    }

    fn poll(
        &self,
        process: &mut dyn InstallerProcess,
        state: &mut AutomationState,
    ) -> Result<Step, Error> {
        if process.has_exited()? {
            return Ok(Step::Exited);
        }

        let Some(title) = self.windows.main_window_title(process.id()) else {
            return Ok(Step::Continue);
        };
        let Some(window) = self.windows.find_window_by_title(&title) else {
            return Ok(Step::Continue);
        };
        state.window = Some(window);

        if state.minimized_windows.insert(window) {
            let mode = if MINIMIZE_LANGUAGES.contains(&self.windows.ui_language()) {
                MinimizeMode::MinimizedNoActivate
            } else {
                MinimizeMode::ShowNoActivate
            };
            self.windows.minimize(window, mode)?;
        }

        for (index, label) in DEFAULT_BUTTON_LABELS.iter().enumerate() {
            let Some(control) = self.windows.find_child_control(window, label) else {
                continue;
            };
            let count = state.click_counts.entry(label.to_string()).or_insert(0);
            *count += 1;
            if *count > self.click_ceiling {
                if index < CONFIRMATION_LABELS {
                    warn!(label = %label, "confirmation button appears stuck");
                    return Ok(Step::Escalate);
                }
                continue;
            }
            self.windows.send_click(control)?;
            state.clicks += 1;
        }

        Ok(Step::Continue)
    }

    fn manual(
        &self,
        process: &mut dyn InstallerProcess,
        window: Option<WindowHandle>,
    ) -> Result<(), Error> {
        // the window may only have appeared after the last poll
        let window = window.or_else(|| {
            self.windows
                .main_window_title(process.id())
                .and_then(|title| self.windows.find_window_by_title(&title))
        });
        if let Some(window) = window {
            if let Err(e) = self.windows.restore(window) {
                warn!(error = %e, "failed to restore installer window");
            }
            if let Err(e) = self.windows.set_foreground(window) {
                warn!(error = %e, "failed to bring installer window forward");
            }
        }
        process.wait()
    }

    fn report(
        &self,
        outcome: AutomationOutcome,
        state: &AutomationState,
        started: Instant,
    ) -> AutomationReport {
        AutomationReport {
            outcome,
            clicks: state.clicks,
            elapsed: started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockInstallerLauncher;
    use std::sync::Mutex;

    /// Installer that exits after a fixed number of liveness checks.
    struct ScriptedProcess {
        checks: u32,
        exit_after: Option<u32>,
        fail_first_check: bool,
        waited: bool,
    }

    impl ScriptedProcess {
        fn exiting_after(checks: u32) -> Self {
            Self {
                checks: 0,
                exit_after: Some(checks),
                fail_first_check: false,
                waited: false,
            }
        }

        fn never_exiting() -> Self {
            Self {
                exit_after: None,
                ..Self::exiting_after(0)
            }
        }
    }

    impl InstallerProcess for ScriptedProcess {
        fn id(&self) -> u32 {
            4242
        }

        fn has_exited(&mut self) -> Result<bool, Error> {
            self.checks += 1;
            if self.fail_first_check && self.checks == 1 {
                return Err(Error::AutomationFailed {
                    message: "process query denied".into(),
                });
            }
            Ok(self.waited || self.exit_after.is_some_and(|n| self.checks > n))
        }

        fn wait(&mut self) -> Result<(), Error> {
            self.waited = true;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Calls {
        minimized: Vec<MinimizeMode>,
        clicked: Vec<WindowHandle>,
        restored: u32,
        foregrounded: u32,
    }

    /// Window system showing one installer window with a fixed set of buttons.
    struct ScriptedWindows {
        title: Option<String>,
        buttons: Vec<(&'static str, WindowHandle)>,
        language: u16,
        fail_clicks: bool,
        calls: Mutex<Calls>,
    }

    const MAIN: WindowHandle = WindowHandle(100);

    impl ScriptedWindows {
        fn with_buttons(buttons: Vec<(&'static str, WindowHandle)>) -> Self {
            Self {
                title: Some("Example Setup".to_string()),
                buttons,
                language: 1033,
                fail_clicks: false,
                calls: Mutex::new(Calls::default()),
            }
        }
    }

    impl WindowAutomation for ScriptedWindows {
        fn main_window_title(&self, pid: u32) -> Option<String> {
            assert_eq!(pid, 4242);
            self.title.clone()
        }

        fn find_window_by_title(&self, title: &str) -> Option<WindowHandle> {
            (Some(title) == self.title.as_deref()).then_some(MAIN)
        }

        fn find_child_control(&self, window: WindowHandle, label: &str) -> Option<WindowHandle> {
            assert_eq!(window, MAIN);
            self.buttons
                .iter()
                .find(|(l, _)| *l == label)
                .map(|(_, h)| *h)
        }

        fn send_click(&self, control: WindowHandle) -> Result<(), Error> {
            if self.fail_clicks {
                return Err(Error::AutomationFailed {
                    message: "access denied".into(),
                });
            }
            self.calls.lock().unwrap().clicked.push(control);
            Ok(())
        }

        fn minimize(&self, _window: WindowHandle, mode: MinimizeMode) -> Result<(), Error> {
            self.calls.lock().unwrap().minimized.push(mode);
            Ok(())
        }

        fn restore(&self, _window: WindowHandle) -> Result<(), Error> {
            self.calls.lock().unwrap().restored += 1;
            Ok(())
        }

        fn set_foreground(&self, _window: WindowHandle) -> Result<(), Error> {
            self.calls.lock().unwrap().foregrounded += 1;
            Ok(())
        }

        fn ui_language(&self) -> u16 {
            self.language
        }
    }

    fn limits() -> Limits {
        Limits {
            poll_interval: Duration::ZERO,
            ..Limits::default()
        }
    }

    #[test]
    fn already_exited_installer_completes_immediately() {
        let windows = ScriptedWindows::with_buttons(vec![("&Next >", WindowHandle(1))]);
        let launcher = MockInstallerLauncher::new();
        let automator = InstallAutomator::new(&windows, &launcher, &limits());

        let mut process = ScriptedProcess::exiting_after(0);
        let report = automator.drive(&mut process).unwrap();

        assert_eq!(report.outcome, AutomationOutcome::Completed);
        assert_eq!(report.clicks, 0);
        assert!(windows.calls.lock().unwrap().minimized.is_empty());
    }

    #[test]
    fn clicks_through_until_exit_and_minimizes_once() {
        let windows = ScriptedWindows::with_buttons(vec![("&Next >", WindowHandle(1))]);
        let launcher = MockInstallerLauncher::new();
        let automator = InstallAutomator::new(&windows, &launcher, &limits());

        let mut process = ScriptedProcess::exiting_after(4);
        let report = automator.drive(&mut process).unwrap();

        assert_eq!(report.outcome, AutomationOutcome::Completed);
        assert_eq!(report.clicks, 3);
        let calls = windows.calls.lock().unwrap();
        assert_eq!(calls.minimized, vec![MinimizeMode::MinimizedNoActivate]);
        assert_eq!(calls.clicked, vec![WindowHandle(1); 3]);
        assert_eq!(calls.restored, 0);
    }

    #[test]
    fn other_languages_show_without_activation() {
        let mut windows = ScriptedWindows::with_buttons(vec![]);
        windows.language = 1041;
        let launcher = MockInstallerLauncher::new();
        let automator = InstallAutomator::new(&windows, &launcher, &limits());

        automator
            .drive(&mut ScriptedProcess::exiting_after(2))
            .unwrap();
        assert_eq!(
            windows.calls.lock().unwrap().minimized,
            vec![MinimizeMode::ShowNoActivate]
        );
    }

    #[test]
    fn stuck_confirmation_button_escalates_to_manual() {
        let windows = ScriptedWindows::with_buttons(vec![("OK", WindowHandle(7))]);
        let launcher = MockInstallerLauncher::new();
        let automator = InstallAutomator::new(&windows, &launcher, &limits());

        let mut process = ScriptedProcess::never_exiting();
        let report = automator.drive(&mut process).unwrap();

        assert_eq!(report.outcome, AutomationOutcome::Manual);
        assert_eq!(report.clicks, 10);
        assert!(process.waited);
        let calls = windows.calls.lock().unwrap();
        assert_eq!(calls.restored, 1);
        assert_eq!(calls.foregrounded, 1);
    }

    #[test]
    fn stuck_secondary_button_is_skipped() {
        let windows = ScriptedWindows::with_buttons(vec![("&Install", WindowHandle(3))]);
        let launcher = MockInstallerLauncher::new();
        let automator = InstallAutomator::new(&windows, &launcher, &limits());

        let mut process = ScriptedProcess::exiting_after(15);
        let report = automator.drive(&mut process).unwrap();

        assert_eq!(report.outcome, AutomationOutcome::Completed);
        assert_eq!(report.clicks, 10);
    }

    #[test]
    fn exhausted_budget_escalates_to_manual() {
        let mut windows = ScriptedWindows::with_buttons(vec![]);
        windows.title = None;
        let launcher = MockInstallerLauncher::new();
        let limits = Limits {
            automation_budget: Duration::ZERO,
            ..limits()
        };
        let automator = InstallAutomator::new(&windows, &launcher, &limits);

        let mut process = ScriptedProcess::never_exiting();
        let report = automator.drive(&mut process).unwrap();

        assert_eq!(report.outcome, AutomationOutcome::Manual);
        assert!(process.waited);
        // no window was ever seen, so there is nothing to surface
        assert_eq!(windows.calls.lock().unwrap().restored, 0);
    }

    #[test]
    fn manual_mode_surfaces_window_that_appeared_late() {
        let windows = ScriptedWindows::with_buttons(vec![]);
        let launcher = MockInstallerLauncher::new();
        let limits = Limits {
            automation_budget: Duration::ZERO,
            ..limits()
        };
        let automator = InstallAutomator::new(&windows, &launcher, &limits);

        let mut process = ScriptedProcess::never_exiting();
        let report = automator.drive(&mut process).unwrap();

        assert_eq!(report.outcome, AutomationOutcome::Manual);
        let calls = windows.calls.lock().unwrap();
        assert_eq!(calls.restored, 1);
        assert_eq!(calls.foregrounded, 1);
    }

    #[test]
    fn failed_first_exit_check_hands_over_to_user() {
        let windows = ScriptedWindows::with_buttons(vec![("&Next >", WindowHandle(1))]);
        let launcher = MockInstallerLauncher::new();
        let automator = InstallAutomator::new(&windows, &launcher, &limits());

        let mut process = ScriptedProcess {
            fail_first_check: true,
            ..ScriptedProcess::never_exiting()
        };
        let report = automator.drive(&mut process).unwrap();

        assert_eq!(report.outcome, AutomationOutcome::Manual);
        assert_eq!(report.clicks, 0);
        assert!(process.waited);
        assert_eq!(windows.calls.lock().unwrap().foregrounded, 1);
    }

    #[test]
    fn click_failure_escalates_to_manual() {
        let mut windows = ScriptedWindows::with_buttons(vec![("&Next >", WindowHandle(1))]);
        windows.fail_clicks = true;
        let launcher = MockInstallerLauncher::new();
        let automator = InstallAutomator::new(&windows, &launcher, &limits());

        let mut process = ScriptedProcess::never_exiting();
        let report = automator.drive(&mut process).unwrap();

        assert_eq!(report.outcome, AutomationOutcome::Manual);
        assert_eq!(windows.calls.lock().unwrap().foregrounded, 1);
    }

    #[test]
    fn run_passes_destination_to_launcher() {
        let tmp = tempfile::TempDir::new().unwrap();
        let apps_dir = tmp.path().join("apps");
        let windows = ScriptedWindows::with_buttons(vec![]);
        let mut launcher = MockInstallerLauncher::new();
        let expected_arg = format!("/DESTINATION=\"{}\\\"", apps_dir.display());
        launcher
            .expect_launch()
            .withf(move |program, args, dir| {
                program.ends_with("app.paf.exe")
                    && args.len() == 1
                    && args[0] == expected_arg
                    && dir.ends_with("apps")
            })
            .times(1)
            .returning(|_, _, _| Ok(Box::new(ScriptedProcess::exiting_after(0))));

        let automator = InstallAutomator::new(&windows, &launcher, &limits());
        let report = automator
            .run(&tmp.path().join("app.paf.exe"), &apps_dir)
            .unwrap();
        assert_eq!(report.outcome, AutomationOutcome::Completed);
        assert!(apps_dir.is_dir());
    }
}
