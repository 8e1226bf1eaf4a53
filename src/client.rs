//! Client Role
//!
//! Discovers the screen's settings manager through the selection owner,
//! mirrors its published property, and turns each re-read into
//! NEW/CHANGED/DELETED callbacks by diffing against the cached snapshot.
//! Manager restarts are handled by re-resolving the owner whenever the
//! MANAGER broadcast arrives or the cached manager window is destroyed.

use std::sync::Arc;

use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::*;
use x11rb::wrapper::ConnectionExt as _;

use crate::atoms::Atoms;
use crate::codec;
use crate::error::{Error, Result};
use crate::list::{SettingAction, SettingList, diff};
use crate::setting::{MAX_NAME_LEN, Setting, SettingValue};

/// Invoked once per changed setting, in diff order. DELETED events carry
/// no setting. State that C callers would pass as `user_data` lives in the
/// closure's captures.
pub type SettingsCallback = Box<dyn FnMut(&str, SettingAction, Option<&Setting>)>;

/// Protocol cases `process_event` dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProtocolEvent {
    /// MANAGER broadcast on the root window: a manager took over.
    ManagerAnnounce,
    /// The cached manager window was destroyed.
    ManagerGone,
    /// The settings property on the cached manager window changed.
    SettingsChanged,
}

/// XSETTINGS client session for one (display, screen) pair.
///
/// The surrounding application owns the event loop and feeds every X
/// event through [`process_event`]; the client never blocks waiting for
/// events on its own.
///
/// [`process_event`]: Client::process_event
pub struct Client<C: Connection> {
    conn: Arc<C>,
    root: Window,
    atoms: Atoms,
    manager_window: Option<Window>,
    settings: SettingList,
    serial: u32,
    callback: SettingsCallback,
}

impl<C: Connection> Client<C> {
    /// Subscribe to manager arrivals on `screen_num`, resolve the current
    /// manager if one is already running, and load its settings. The
    /// callback fires during construction for every pre-existing setting
    /// (all NEW, against the empty initial snapshot).
    pub fn new(conn: Arc<C>, screen_num: usize, callback: SettingsCallback) -> Result<Self> {
        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or(Error::BadScreen(screen_num))?;
        let root = screen.root;

        let atoms = Atoms::new(conn.as_ref(), screen_num)?;

        // MANAGER broadcasts arrive via StructureNotify on the root; keep
        // whatever mask the surrounding application already selected.
        let attrs = conn.get_window_attributes(root)?.reply()?;
        conn.change_window_attributes(
            root,
            &ChangeWindowAttributesAux::new()
                .event_mask(attrs.your_event_mask | EventMask::STRUCTURE_NOTIFY),
        )?;
        conn.flush()?;

        let mut client = Self {
            conn,
            root,
            atoms,
            manager_window: None,
            settings: SettingList::new(),
            serial: 0,
            callback,
        };
        client.check_manager_window()?;
        Ok(client)
    }

    /// The cached snapshot, as of the last successful read.
    pub fn settings(&self) -> &SettingList {
        &self.settings
    }

    /// Whether a manager currently owns the screen's selection.
    pub fn has_manager(&self) -> bool {
        self.manager_window.is_some()
    }

    /// Feed one X event through the protocol state machine. Returns true
    /// when the event was consumed (it belonged to this protocol).
    pub fn process_event(&mut self, event: &Event) -> Result<bool> {
        match classify(event, self.root, self.manager_window, &self.atoms) {
            Some(ProtocolEvent::ManagerAnnounce) => {
                debug!("manager arrival broadcast");
                self.check_manager_window()?;
                Ok(true)
            }
            Some(ProtocolEvent::ManagerGone) => {
                debug!("manager window destroyed");
                self.check_manager_window()?;
                Ok(true)
            }
            Some(ProtocolEvent::SettingsChanged) => {
                self.read_settings()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Re-resolve the selection owner and re-read its settings. The server
    /// grab prevents the manager from changing identity between the owner
    /// lookup and the event-mask subscription (required by the protocol).
    fn check_manager_window(&mut self) -> Result<()> {
        self.conn.grab_server()?;
        let resolved = self.resolve_manager();
        self.conn.ungrab_server()?;
        self.conn.flush()?;
        resolved?;

        match self.manager_window {
            Some(win) => info!("settings manager is window 0x{:x}", win),
            None => info!("no settings manager on this screen"),
        }
        self.read_settings()
    }

    fn resolve_manager(&mut self) -> Result<()> {
        let owner = self
            .conn
            .get_selection_owner(self.atoms.selection)?
            .reply()?
            .owner;
        self.manager_window = (owner != x11rb::NONE).then_some(owner);

        if let Some(win) = self.manager_window {
            // If the manager dies right here the X error is harmless; the
            // DestroyNotify path re-resolves the owner.
            self.conn.change_window_attributes(
                win,
                &ChangeWindowAttributesAux::new()
                    .event_mask(EventMask::PROPERTY_CHANGE | EventMask::STRUCTURE_NOTIFY),
            )?;
        }
        Ok(())
    }

    /// Read and decode the manager's property, then diff-and-swap the
    /// cached snapshot. Every failure short of a connection loss is "no
    /// update": the previous snapshot stays untouched and no callback
    /// fires, because the next property change retries from scratch.
    fn read_settings(&mut self) -> Result<()> {
        let Some(manager) = self.manager_window else {
            return Ok(());
        };

        let reply = match self
            .conn
            .get_property(
                false,
                manager,
                self.atoms.settings,
                self.atoms.settings,
                0,
                u32::MAX,
            )?
            .reply()
        {
            Ok(reply) => reply,
            Err(err) => {
                warn!("failed to read settings property: {}", err);
                return Ok(());
            }
        };

        if reply.type_ == x11rb::NONE {
            warn!("manager window has no settings property");
            return Ok(());
        }
        if reply.type_ != self.atoms.settings {
            warn!("settings property has wrong type atom {}", reply.type_);
            return Ok(());
        }
        if reply.format != 8 {
            warn!("settings property has wrong format {}", reply.format);
            return Ok(());
        }

        match codec::decode(&reply.value) {
            Ok((list, serial)) => self.apply(list, serial),
            Err(err) => warn!("ignoring malformed settings property: {}", err),
        }
        Ok(())
    }

    /// Fire one callback per difference, then adopt the new snapshot.
    fn apply(&mut self, new: SettingList, serial: u32) {
        let Self {
            settings, callback, ..
        } = self;
        diff(settings, &new, |name, action, setting| {
            callback(name, action, setting)
        });
        self.settings = new;
        self.serial = serial;
    }

    /// Stage a value for the manager to adopt. This edits the local
    /// snapshot only; [`manager_notify`] pushes the whole snapshot into
    /// the manager's property. Best-effort with no acknowledgment: with no
    /// manager present the request is dropped.
    ///
    /// [`manager_notify`]: Client::manager_notify
    pub fn set(&mut self, name: &str, value: impl Into<SettingValue>) {
        if self.manager_window.is_none() {
            debug!("no manager, dropping set of '{}'", name);
            return;
        }
        if name.len() > MAX_NAME_LEN {
            warn!("setting name '{}' exceeds {} bytes, ignored", name, MAX_NAME_LEN);
            return;
        }
        let mut setting = Setting::new(name, value);
        setting.last_change_serial = self.serial;
        self.settings.upsert(setting);
    }

    /// Publish the staged snapshot on the manager's window, on its behalf.
    /// The manager's own next publish may overwrite this; that is the
    /// documented risk of the convenience write path.
    pub fn manager_notify(&mut self) -> Result<()> {
        let Some(manager) = self.manager_window else {
            debug!("no manager, nothing to notify");
            return Ok(());
        };
        let data = codec::encode(&self.settings, self.serial);
        self.conn.change_property8(
            PropMode::REPLACE,
            manager,
            self.atoms.settings,
            self.atoms.settings,
            &data,
        )?;
        self.conn.flush()?;
        self.serial = self.serial.wrapping_add(1);
        Ok(())
    }
}

fn classify(
    event: &Event,
    root: Window,
    manager_window: Option<Window>,
    atoms: &Atoms,
) -> Option<ProtocolEvent> {
    match event {
        Event::ClientMessage(ev)
            if ev.window == root
                && ev.format == 32
                && ev.type_ == atoms.manager
                && ev.data.as_data32()[1] == atoms.selection =>
        {
            Some(ProtocolEvent::ManagerAnnounce)
        }
        Event::DestroyNotify(ev) if Some(ev.window) == manager_window => {
            Some(ProtocolEvent::ManagerGone)
        }
        Event::PropertyNotify(ev)
            if Some(ev.window) == manager_window && ev.atom == atoms.settings =>
        {
            Some(ProtocolEvent::SettingsChanged)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: Window = 0x123;
    const MANAGER_WIN: Window = 0x40_0002;

    fn atoms() -> Atoms {
        Atoms {
            selection: 200,
            manager: 201,
            settings: 202,
            timestamp_prop: 203,
        }
    }

    fn manager_announce(window: Window, selection: Atom, type_: Atom) -> Event {
        Event::ClientMessage(ClientMessageEvent {
            response_type: CLIENT_MESSAGE_EVENT,
            format: 32,
            sequence: 0,
            window,
            type_,
            data: [1000, selection, MANAGER_WIN, 0, 0].into(),
        })
    }

    #[test]
    fn manager_broadcast_on_root_is_recognized() {
        let ev = manager_announce(ROOT, atoms().selection, atoms().manager);
        assert_eq!(
            classify(&ev, ROOT, None, &atoms()),
            Some(ProtocolEvent::ManagerAnnounce)
        );
    }

    #[test]
    fn broadcast_for_other_selection_is_ignored() {
        // e.g. a clipboard manager announcing CLIPBOARD_MANAGER
        let ev = manager_announce(ROOT, 999, atoms().manager);
        assert_eq!(classify(&ev, ROOT, None, &atoms()), None);

        let ev = manager_announce(ROOT, atoms().selection, 999);
        assert_eq!(classify(&ev, ROOT, None, &atoms()), None);
    }

    #[test]
    fn destroy_of_cached_manager_is_recognized() {
        let ev = Event::DestroyNotify(DestroyNotifyEvent {
            response_type: DESTROY_NOTIFY_EVENT,
            sequence: 0,
            event: ROOT,
            window: MANAGER_WIN,
        });
        assert_eq!(
            classify(&ev, ROOT, Some(MANAGER_WIN), &atoms()),
            Some(ProtocolEvent::ManagerGone)
        );
        // without a cached manager the destroy means nothing to us
        assert_eq!(classify(&ev, ROOT, None, &atoms()), None);
    }

    #[test]
    fn property_change_on_manager_is_recognized() {
        let ev = Event::PropertyNotify(PropertyNotifyEvent {
            response_type: PROPERTY_NOTIFY_EVENT,
            sequence: 0,
            window: MANAGER_WIN,
            atom: atoms().settings,
            time: 0,
            state: Property::NEW_VALUE,
        });
        assert_eq!(
            classify(&ev, ROOT, Some(MANAGER_WIN), &atoms()),
            Some(ProtocolEvent::SettingsChanged)
        );
    }

    #[test]
    fn unrelated_property_changes_are_ignored() {
        let wrong_atom = Event::PropertyNotify(PropertyNotifyEvent {
            response_type: PROPERTY_NOTIFY_EVENT,
            sequence: 0,
            window: MANAGER_WIN,
            atom: 999,
            time: 0,
            state: Property::NEW_VALUE,
        });
        let wrong_window = Event::PropertyNotify(PropertyNotifyEvent {
            response_type: PROPERTY_NOTIFY_EVENT,
            sequence: 0,
            window: ROOT,
            atom: atoms().settings,
            time: 0,
            state: Property::NEW_VALUE,
        });
        assert_eq!(classify(&wrong_atom, ROOT, Some(MANAGER_WIN), &atoms()), None);
        assert_eq!(classify(&wrong_window, ROOT, Some(MANAGER_WIN), &atoms()), None);
    }
}
