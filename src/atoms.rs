//! Protocol atoms.
//!
//! The XSETTINGS protocol uses one per-screen selection atom plus two
//! well-known names shared by every screen.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, ConnectionExt};

use crate::error::Result;

/// Interned atoms for one (display, screen) session.
#[derive(Debug, Clone, Copy)]
pub struct Atoms {
    /// `_XSETTINGS_S<screen>`: the selection whose owner is the manager.
    pub selection: Atom,
    /// `MANAGER`: ClientMessage type broadcast on the root window when a
    /// new manager takes over.
    pub manager: Atom,
    /// `_XSETTINGS_SETTINGS`: the property (and property type) holding the
    /// encoded snapshot on the manager window.
    pub settings: Atom,
    /// `_TIMESTAMP_PROP`: throwaway property used to obtain a server
    /// timestamp before acquiring the selection.
    pub timestamp_prop: Atom,
}

impl Atoms {
    /// Intern all required atoms
    pub fn new<C: Connection>(conn: &C, screen_num: usize) -> Result<Self> {
        let intern = |name: &str| -> Result<Atom> {
            Ok(conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
        };

        Ok(Self {
            selection: intern(&format!("_XSETTINGS_S{}", screen_num))?,
            manager: intern("MANAGER")?,
            settings: intern("_XSETTINGS_SETTINGS")?,
            timestamp_prop: intern("_TIMESTAMP_PROP")?,
        })
    }
}
