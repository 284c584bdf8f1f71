//! The tray session controller.
//!
//! A [`TraySession`] owns the icon descriptor, the popup menu and a [`Shell`],
//! and turns [`TrayEvent`]s coming from the platform adapter into shell calls.
//! It never talks to the OS directly.

use std::cell::RefCell;

use crate::icon::{IconDescriptor, ProtocolVersion};
use crate::menu::PopupMenu;

/// Events the platform adapter produces from raw window messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayEvent {
    /// Right button released over the icon, with the pointer position at that moment.
    RightClick { x: i32, y: i32 },
    MenuCommand(u16),
    Destroy,
    Other,
}

/// What the adapter should do with the native message after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// Track the popup menu at `(x, y)`, then treat the message as handled.
    ShowMenu { x: i32, y: i32 },
    /// Run the platform's default window procedure.
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SessionState {
    Running,
    Terminated,
}

/// Shows the popup menu without holding on to the session.
pub trait MenuTracker {
    /// Shows the menu anchored bottom-left at `(x, y)`, blocking until it closes.
    fn track(&self, x: i32, y: i32) -> anyhow::Result<()>;
}

/// The operating system shell as seen by the controller.
pub trait Shell {
    type Tracker: MenuTracker;

    fn build_menu(&mut self, menu: &PopupMenu) -> anyhow::Result<()>;
    fn destroy_menu(&mut self) -> anyhow::Result<()>;
    fn menu_tracker(&self) -> Self::Tracker;

    fn add_icon(&mut self, icon: &IconDescriptor) -> anyhow::Result<()>;
    fn set_version(&mut self, icon: &IconDescriptor) -> anyhow::Result<()>;
    fn remove_icon(&mut self, icon: &IconDescriptor) -> anyhow::Result<()>;

    fn set_foreground(&mut self) -> anyhow::Result<()>;

    /// Asks the message loop to stop after the current message.
    fn request_quit(&mut self);
}

pub struct TraySession<S: Shell> {
    shell: S,
    icon: IconDescriptor,
    menu: PopupMenu,
    state: SessionState,
    registered: bool,
    menu_alive: bool,
}

impl<S: Shell> TraySession<S> {
    /// Creates the menu, registers the icon and upgrades it to protocol version 4.
    ///
    /// Only menu creation and icon registration are fatal. Whatever was
    /// created before an error is released when the half-built session drops.
    pub fn initialize(shell: S, icon: IconDescriptor, menu: PopupMenu) -> anyhow::Result<Self> {
        let mut session = Self {
            shell,
            icon,
            menu,
            state: SessionState::Running,
            registered: false,
            menu_alive: false,
        };

        session.shell.build_menu(&session.menu)?;
        session.menu_alive = true;

        session.shell.add_icon(&session.icon)?;
        session.registered = true;

        session.upgrade_protocol();

        tracing::info!("Tray session {}", session.state);

        Ok(session)
    }

    fn upgrade_protocol(&mut self) {
        self.icon.version = ProtocolVersion::V4;
        if let Err(e) = self.shell.set_version(&self.icon) {
            tracing::warn!("Keeping legacy tray protocol: {e:#}");
            self.icon.version = ProtocolVersion::Legacy;
        }

        tracing::debug!(
            "Registered tray icon {} (protocol {})",
            self.icon.id,
            self.icon.version
        );
    }

    /// Removes the icon from the shell. A no-op once it has been removed.
    fn unregister(&mut self) {
        if !self.registered {
            tracing::debug!("Tray icon {} already removed", self.icon.id);
            return;
        }

        self.registered = false;
        if let Err(e) = self.shell.remove_icon(&self.icon) {
            tracing::error!("Failed to remove tray icon {}: {e}", self.icon.id);
        }
    }

    fn terminate(&mut self) {
        self.unregister();
        self.shell.request_quit();
        self.state = SessionState::Terminated;
        tracing::info!("Tray session {}", self.state);
    }

    pub fn dispatch(&mut self, event: TrayEvent) -> Dispatch {
        if self.state == SessionState::Terminated && event != TrayEvent::Other {
            tracing::debug!("Ignoring {event:?} after termination");
            return Dispatch::Handled;
        }

        match event {
            TrayEvent::RightClick { x, y } => {
                if let Err(e) = self.shell.set_foreground() {
                    tracing::warn!("Failed to bring message window to foreground: {e}");
                }
                return Dispatch::ShowMenu { x, y };
            }

            TrayEvent::MenuCommand(id) if self.menu.is_exit(id) => {
                tracing::debug!("Exit selected from tray menu");
                self.terminate();
            }

            TrayEvent::MenuCommand(id) => {
                tracing::debug!("Ignoring unknown menu command {id}");
            }

            TrayEvent::Destroy => {
                tracing::debug!("Message window destroyed");
                self.terminate();
            }

            TrayEvent::Other => return Dispatch::Default,
        }

        Dispatch::Handled
    }

    /// Destroys the popup menu. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if !self.menu_alive {
            return;
        }

        self.menu_alive = false;
        if let Err(e) = self.shell.destroy_menu() {
            tracing::error!("Failed to destroy tray menu: {e}");
        }

        tracing::debug!("Tray session shut down");
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    #[cfg(test)]
    pub fn icon(&self) -> &IconDescriptor {
        &self.icon
    }
}

impl<S: Shell> Drop for TraySession<S> {
    fn drop(&mut self) {
        self.unregister();
        self.shutdown();
    }
}

/// Dispatches `event` to a session shared with the window procedure.
///
/// The menu is tracked after the borrow is released: the modal menu loop
/// delivers messages (a `WM_DESTROY` among them) back into this function.
/// Returns `None` when the session is already borrowed.
pub fn dispatch_shared<S: Shell>(
    session: &RefCell<TraySession<S>>,
    event: TrayEvent,
) -> Option<Dispatch> {
    let (dispatch, tracker) = {
        let Ok(mut session) = session.try_borrow_mut() else {
            tracing::warn!("Tray session busy, dropping {event:?}");
            return None;
        };
        let dispatch = session.dispatch(event);
        (dispatch, session.shell.menu_tracker())
    };

    if let Dispatch::ShowMenu { x, y } = dispatch {
        if let Err(e) = tracker.track(x, y) {
            tracing::error!("Failed to show tray menu at ({x}, {y}): {e}");
        }
    }

    Some(dispatch)
}

#[cfg(test)]
mod tests {
    use std::rc::{Rc, Weak};

    use super::*;
    use crate::menu::EXIT_COMMAND_ID;

    const CALLBACK: u32 = 0x0400 + 1;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        BuildMenu(usize),
        DestroyMenu,
        AddIcon(u32),
        SetVersion(ProtocolVersion),
        RemoveIcon(u32),
        SetForeground,
        TrackMenu(i32, i32),
        RequestQuit,
    }

    type Log = Rc<RefCell<Vec<Call>>>;

    #[derive(Default)]
    struct RecordingShell {
        log: Log,
        fail_add: bool,
        fail_version: bool,
        /// Runs inside the menu's modal loop.
        while_tracking: Option<Rc<dyn Fn()>>,
    }

    struct RecordingTracker {
        log: Log,
        while_tracking: Option<Rc<dyn Fn()>>,
    }

    impl MenuTracker for RecordingTracker {
        fn track(&self, x: i32, y: i32) -> anyhow::Result<()> {
            self.log.borrow_mut().push(Call::TrackMenu(x, y));
            if let Some(hook) = &self.while_tracking {
                hook();
            }
            Ok(())
        }
    }

    impl RecordingShell {
        fn push(&self, call: Call) {
            self.log.borrow_mut().push(call);
        }
    }

    impl Shell for RecordingShell {
        type Tracker = RecordingTracker;

        fn build_menu(&mut self, menu: &PopupMenu) -> anyhow::Result<()> {
            self.push(Call::BuildMenu(menu.entries.len()));
            Ok(())
        }

        fn destroy_menu(&mut self) -> anyhow::Result<()> {
            self.push(Call::DestroyMenu);
            Ok(())
        }

        fn menu_tracker(&self) -> RecordingTracker {
            RecordingTracker {
                log: Rc::clone(&self.log),
                while_tracking: self.while_tracking.clone(),
            }
        }

        fn add_icon(&mut self, icon: &IconDescriptor) -> anyhow::Result<()> {
            if self.fail_add {
                anyhow::bail!("shell refused icon");
            }
            self.push(Call::AddIcon(icon.id));
            Ok(())
        }

        fn set_version(&mut self, icon: &IconDescriptor) -> anyhow::Result<()> {
            self.push(Call::SetVersion(icon.version));
            if self.fail_version {
                anyhow::bail!("shell predates NOTIFYICON_VERSION_4");
            }
            Ok(())
        }

        fn remove_icon(&mut self, icon: &IconDescriptor) -> anyhow::Result<()> {
            self.push(Call::RemoveIcon(icon.id));
            Ok(())
        }

        fn set_foreground(&mut self) -> anyhow::Result<()> {
            self.push(Call::SetForeground);
            Ok(())
        }

        fn request_quit(&mut self) {
            self.push(Call::RequestQuit);
        }
    }

    fn count(log: &Log, call: &Call) -> usize {
        log.borrow().iter().filter(|c| *c == call).count()
    }

    fn calls(log: &Log) -> Vec<Call> {
        log.borrow().clone()
    }

    fn session_with(shell: RecordingShell) -> anyhow::Result<TraySession<RecordingShell>> {
        TraySession::initialize(shell, IconDescriptor::new(CALLBACK), PopupMenu::default())
    }

    fn session() -> (TraySession<RecordingShell>, Log) {
        let shell = RecordingShell::default();
        let log = Rc::clone(&shell.log);
        (session_with(shell).unwrap(), log)
    }

    #[test]
    fn initialize_builds_menu_then_registers_then_upgrades() {
        let (s, log) = session();
        assert_eq!(
            calls(&log),
            vec![
                Call::BuildMenu(1),
                Call::AddIcon(1),
                Call::SetVersion(ProtocolVersion::V4)
            ]
        );
        assert_eq!(s.state(), SessionState::Running);
        assert!(s.is_registered());
        assert_eq!(s.icon().version, ProtocolVersion::V4);
    }

    #[test]
    fn failed_registration_is_fatal_and_releases_menu() {
        let shell = RecordingShell {
            fail_add: true,
            ..Default::default()
        };
        let log = Rc::clone(&shell.log);

        assert!(session_with(shell).is_err());
        assert_eq!(calls(&log), vec![Call::BuildMenu(1), Call::DestroyMenu]);
    }

    #[test]
    fn failed_version_upgrade_keeps_icon_on_legacy_protocol() {
        let shell = RecordingShell {
            fail_version: true,
            ..Default::default()
        };
        let log = Rc::clone(&shell.log);

        let s = session_with(shell).unwrap();

        assert_eq!(s.state(), SessionState::Running);
        assert!(s.is_registered());
        assert_eq!(s.icon().version, ProtocolVersion::Legacy);
        assert_eq!(count(&log, &Call::RemoveIcon(1)), 0);
    }

    #[test]
    fn dropping_a_live_session_removes_icon_and_menu() {
        let (s, log) = session();
        drop(s);
        assert_eq!(count(&log, &Call::RemoveIcon(1)), 1);
        assert_eq!(count(&log, &Call::DestroyMenu), 1);
    }

    #[test]
    fn dropping_after_shutdown_releases_nothing_twice() {
        let (mut s, log) = session();
        s.dispatch(TrayEvent::MenuCommand(EXIT_COMMAND_ID));
        s.shutdown();
        drop(s);
        assert_eq!(count(&log, &Call::RemoveIcon(1)), 1);
        assert_eq!(count(&log, &Call::DestroyMenu), 1);
    }

    #[test]
    fn non_terminal_events_keep_running() {
        let sequences: [&[TrayEvent]; 4] = [
            &[],
            &[TrayEvent::Other, TrayEvent::Other],
            &[
                TrayEvent::RightClick { x: 1, y: 2 },
                TrayEvent::MenuCommand(7),
                TrayEvent::Other,
            ],
            &[
                TrayEvent::RightClick { x: -5, y: 900 },
                TrayEvent::RightClick { x: 0, y: 0 },
                TrayEvent::MenuCommand(0),
            ],
        ];

        for events in sequences {
            let (mut s, log) = session();
            for event in events {
                s.dispatch(*event);
            }
            assert_eq!(s.state(), SessionState::Running, "{events:?}");
            assert!(s.is_registered(), "{events:?}");
            assert_eq!(count(&log, &Call::RemoveIcon(1)), 0);
            assert_eq!(count(&log, &Call::RequestQuit), 0);
        }
    }

    #[test]
    fn other_falls_through_to_default() {
        let (mut s, _log) = session();
        assert_eq!(s.dispatch(TrayEvent::Other), Dispatch::Default);
        s.dispatch(TrayEvent::Destroy);
        assert_eq!(s.dispatch(TrayEvent::Other), Dispatch::Default);
    }

    #[test]
    fn right_click_asks_for_menu_at_pointer() {
        let (mut s, log) = session();
        let before = log.borrow().len();

        assert_eq!(
            s.dispatch(TrayEvent::RightClick { x: 320, y: 1040 }),
            Dispatch::ShowMenu { x: 320, y: 1040 }
        );

        assert_eq!(&calls(&log)[before..], &[Call::SetForeground]);
        assert_eq!(s.state(), SessionState::Running);
        assert!(s.is_registered());
    }

    #[test]
    fn shared_right_click_tracks_menu_exactly_once() {
        let (s, log) = session();
        let shared = RefCell::new(s);

        let dispatch = dispatch_shared(&shared, TrayEvent::RightClick { x: 7, y: 9 });

        assert_eq!(dispatch, Some(Dispatch::ShowMenu { x: 7, y: 9 }));
        assert_eq!(count(&log, &Call::TrackMenu(7, 9)), 1);
        assert_eq!(shared.borrow().state(), SessionState::Running);
    }

    #[test]
    fn destroy_during_menu_tracking_still_terminates() {
        let shared: Rc<RefCell<TraySession<RecordingShell>>> = Rc::new_cyclic(|weak| {
            let weak: Weak<RefCell<TraySession<RecordingShell>>> = weak.clone();
            let shell = RecordingShell {
                while_tracking: Some(Rc::new(move || {
                    let session = weak.upgrade().unwrap();
                    assert_eq!(
                        dispatch_shared(&session, TrayEvent::Destroy),
                        Some(Dispatch::Handled)
                    );
                })),
                ..Default::default()
            };
            RefCell::new(session_with(shell).unwrap())
        });

        dispatch_shared(&shared, TrayEvent::RightClick { x: 1, y: 1 });

        let s = shared.borrow();
        assert_eq!(s.state(), SessionState::Terminated);
        assert!(!s.is_registered());
    }

    #[test]
    fn busy_session_reports_none() {
        let (s, _log) = session();
        let shared = RefCell::new(s);
        let _guard = shared.borrow_mut();
        assert_eq!(dispatch_shared(&shared, TrayEvent::Destroy), None);
    }

    #[test]
    fn exit_removes_icon_then_quits_exactly_once() {
        let (mut s, log) = session();
        let before = log.borrow().len();

        for _ in 0..3 {
            assert_eq!(
                s.dispatch(TrayEvent::MenuCommand(EXIT_COMMAND_ID)),
                Dispatch::Handled
            );
        }

        assert_eq!(
            &calls(&log)[before..],
            &[Call::RemoveIcon(1), Call::RequestQuit]
        );
        assert_eq!(s.state(), SessionState::Terminated);
        assert!(!s.is_registered());
    }

    #[test]
    fn destroy_removes_icon_and_quits() {
        let (mut s, log) = session();
        s.dispatch(TrayEvent::Destroy);
        assert_eq!(count(&log, &Call::RemoveIcon(1)), 1);
        assert_eq!(count(&log, &Call::RequestQuit), 1);
        assert_eq!(s.state(), SessionState::Terminated);
    }

    #[test]
    fn destroy_after_exit_does_not_remove_twice() {
        let (mut s, log) = session();
        s.dispatch(TrayEvent::MenuCommand(EXIT_COMMAND_ID));
        s.dispatch(TrayEvent::Destroy);
        assert_eq!(count(&log, &Call::RemoveIcon(1)), 1);
        assert_eq!(count(&log, &Call::RequestQuit), 1);
    }

    #[test]
    fn events_after_termination_touch_nothing() {
        let (mut s, log) = session();
        s.dispatch(TrayEvent::Destroy);
        let before = log.borrow().len();

        assert_eq!(
            s.dispatch(TrayEvent::RightClick { x: 0, y: 0 }),
            Dispatch::Handled
        );
        s.dispatch(TrayEvent::MenuCommand(EXIT_COMMAND_ID));

        assert_eq!(log.borrow().len(), before);
    }

    #[test]
    fn shutdown_destroys_menu_once() {
        let (mut s, log) = session();
        s.dispatch(TrayEvent::MenuCommand(EXIT_COMMAND_ID));
        s.shutdown();
        s.shutdown();
        assert_eq!(count(&log, &Call::DestroyMenu), 1);
    }

    #[test]
    fn right_click_then_exit_scenario() {
        let (s, log) = session();
        let shared = RefCell::new(s);

        dispatch_shared(&shared, TrayEvent::RightClick { x: 10, y: 20 });
        dispatch_shared(&shared, TrayEvent::MenuCommand(EXIT_COMMAND_ID));
        shared.borrow_mut().shutdown();

        assert_eq!(
            calls(&log),
            vec![
                Call::BuildMenu(1),
                Call::AddIcon(1),
                Call::SetVersion(ProtocolVersion::V4),
                Call::SetForeground,
                Call::TrackMenu(10, 20),
                Call::RemoveIcon(1),
                Call::RequestQuit,
                Call::DestroyMenu,
            ]
        );
    }

    #[test]
    fn state_display() {
        assert_eq!(SessionState::Running.to_string(), "Running");
        assert_eq!(SessionState::Terminated.to_string(), "Terminated");
    }
}
