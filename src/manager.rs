//! Manager Role
//!
//! The single writer of the protocol: owns the per-screen
//! `_XSETTINGS_S<n>` selection, keeps the authoritative setting list, and
//! publishes it as one property write per `notify()`. Selection ownership
//! is arbitrated by the X server; losing a race to another manager is a
//! normal, recoverable outcome.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::*;
use x11rb::wrapper::ConnectionExt as _;

use crate::atoms::Atoms;
use crate::codec;
use crate::error::{Error, Result};
use crate::list::SettingList;
use crate::setting::{MAX_NAME_LEN, Setting, SettingValue};

/// XSETTINGS manager session for one (display, screen) pair.
///
/// Dropping the manager destroys its window, which releases the selection
/// and lets a successor take over.
pub struct Manager<C: Connection> {
    conn: Arc<C>,
    atoms: Atoms,
    window: Window,
    settings: SettingList,
    serial: u32,
}

impl<C: Connection> Manager<C> {
    /// Acquire the selection for `screen_num` and announce this process as
    /// the screen's settings manager.
    ///
    /// Fails with [`Error::SelectionOwned`] when another manager already
    /// holds the selection or wins the race for it; the partially created
    /// window is torn down before returning.
    pub fn new(conn: Arc<C>, screen_num: usize) -> Result<Self> {
        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or(Error::BadScreen(screen_num))?;
        let root = screen.root;
        let root_depth = screen.root_depth;

        let atoms = Atoms::new(conn.as_ref(), screen_num)?;

        // Small unmapped window to own the selection and carry the
        // settings property. PropertyChange is needed for the timestamp
        // round trip below.
        let window = conn.generate_id()?;
        conn.create_window(
            root_depth,
            window,
            root,
            -1,
            -1,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            0,
            &CreateWindowAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )?;
        conn.flush()?;

        // The selection must be claimed with a real server timestamp, not
        // CURRENT_TIME, so a replaced manager can order the handoff.
        let timestamp = server_time(conn.as_ref(), window, atoms.timestamp_prop)?;

        conn.set_selection_owner(window, atoms.selection, timestamp)?;
        let owner = conn.get_selection_owner(atoms.selection)?.reply()?.owner;
        if owner != window {
            warn!(
                "lost the race for _XSETTINGS_S{} (owner is 0x{:x})",
                screen_num, owner
            );
            let _ = conn.destroy_window(window);
            let _ = conn.flush();
            return Err(Error::SelectionOwned(format!("_XSETTINGS_S{}", screen_num)));
        }

        // Announce the takeover so running clients re-resolve the owner.
        let announce = ClientMessageEvent::new(
            32,
            root,
            atoms.manager,
            [timestamp, atoms.selection, window, 0, 0],
        );
        conn.send_event(false, root, EventMask::STRUCTURE_NOTIFY, &announce)?;
        conn.flush()?;

        info!(
            "acquired _XSETTINGS_S{} with manager window 0x{:x}",
            screen_num, window
        );

        Ok(Self {
            conn,
            atoms,
            window,
            settings: SettingList::new(),
            serial: 0,
        })
    }

    /// The authoritative list as of the last `set`/`remove` calls. May be
    /// ahead of what clients see until `notify()` publishes it.
    pub fn settings(&self) -> &SettingList {
        &self.settings
    }

    /// Upsert one setting in memory. Does not publish; call [`notify`]
    /// after a batch of changes. Setting an equal value is a no-op and
    /// does not touch the entry's change serial.
    ///
    /// [`notify`]: Manager::notify
    pub fn set(&mut self, name: &str, value: impl Into<SettingValue>) {
        if name.len() > MAX_NAME_LEN {
            warn!("setting name '{}' exceeds {} bytes, ignored", name, MAX_NAME_LEN);
            return;
        }
        let mut setting = Setting::new(name, value);
        setting.last_change_serial = self.serial;
        if self.settings.upsert(setting) {
            debug!("set '{}'", name);
        }
    }

    /// Retract a setting. Clients observe DELETED on the next `notify()`.
    pub fn remove(&mut self, name: &str) {
        if self.settings.remove(name) {
            debug!("removed '{}'", name);
        }
    }

    /// Encode the current list and publish it as a single property write,
    /// then advance the serial.
    pub fn notify(&mut self) -> Result<()> {
        let data = codec::encode(&self.settings, self.serial);
        self.conn.change_property8(
            PropMode::REPLACE,
            self.window,
            self.atoms.settings,
            self.atoms.settings,
            &data,
        )?;
        self.conn.flush()?;
        debug!(
            "published {} settings, serial {}",
            self.settings.len(),
            self.serial
        );
        self.serial = self.serial.wrapping_add(1);
        Ok(())
    }

    /// True when `event` tells this manager it lost the selection to a
    /// replacement. The caller should drop the manager in response.
    pub fn should_terminate(&self, event: &Event) -> bool {
        is_selection_clear(event, self.window, self.atoms.selection)
    }
}

impl<C: Connection> Drop for Manager<C> {
    fn drop(&mut self) {
        let _ = self.conn.destroy_window(self.window);
        let _ = self.conn.flush();
    }
}

fn is_selection_clear(event: &Event, window: Window, selection: Atom) -> bool {
    match event {
        Event::SelectionClear(ev) => ev.owner == window && ev.selection == selection,
        _ => false,
    }
}

/// Whether some process (this one or any other) currently manages the
/// screen's settings.
pub fn manager_running<C: Connection>(conn: &C, screen_num: usize) -> Result<bool> {
    let atoms = Atoms::new(conn, screen_num)?;
    let owner = conn.get_selection_owner(atoms.selection)?.reply()?.owner;
    Ok(owner != x11rb::NONE)
}

/// Obtain a server timestamp by touching a throwaway property on `window`
/// and waiting for the resulting PropertyNotify. Unrelated events that
/// arrive first are discarded; this runs before the caller's event loop.
fn server_time<C: Connection>(conn: &C, window: Window, prop: Atom) -> Result<Timestamp> {
    conn.change_property8(PropMode::REPLACE, window, prop, prop, b"a")?;
    conn.flush()?;

    loop {
        match conn.wait_for_event()? {
            Event::PropertyNotify(ev) if ev.window == window && ev.atom == prop => {
                return Ok(ev.time);
            }
            other => trace!("discarding {:?} while waiting for server time", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Window = 0x40_0001;
    const SELECTION: Atom = 200;

    #[test]
    fn selection_clear_for_our_window_matches() {
        let event = Event::SelectionClear(SelectionClearEvent {
            response_type: SELECTION_CLEAR_EVENT,
            sequence: 0,
            time: 12345,
            owner: WINDOW,
            selection: SELECTION,
        });
        assert!(is_selection_clear(&event, WINDOW, SELECTION));
    }

    #[test]
    fn other_selection_clears_are_ignored() {
        let foreign_owner = Event::SelectionClear(SelectionClearEvent {
            response_type: SELECTION_CLEAR_EVENT,
            sequence: 0,
            time: 12345,
            owner: WINDOW + 1,
            selection: SELECTION,
        });
        let foreign_selection = Event::SelectionClear(SelectionClearEvent {
            response_type: SELECTION_CLEAR_EVENT,
            sequence: 0,
            time: 12345,
            owner: WINDOW,
            selection: SELECTION + 1,
        });
        assert!(!is_selection_clear(&foreign_owner, WINDOW, SELECTION));
        assert!(!is_selection_clear(&foreign_selection, WINDOW, SELECTION));
    }

    #[test]
    fn unrelated_events_never_terminate() {
        let event = Event::PropertyNotify(PropertyNotifyEvent {
            response_type: PROPERTY_NOTIFY_EVENT,
            sequence: 0,
            window: WINDOW,
            atom: SELECTION,
            time: 0,
            state: Property::NEW_VALUE,
        });
        assert!(!is_selection_clear(&event, WINDOW, SELECTION));
    }
}
