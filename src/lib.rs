//! XSETTINGS protocol engine.
//!
//! Distributes typed configuration values (integers, strings, RGBA
//! colors) across X11 clients through a single window property. One
//! manager per screen owns the `_XSETTINGS_S<n>` selection and publishes
//! an encoded snapshot of every setting; any number of clients watch that
//! property, diff each new snapshot against their cache, and react to
//! per-setting NEW/CHANGED/DELETED events. There is no retry or
//! acknowledgment at the protocol level: the property is the state, and
//! every change notification re-reads it from scratch.
//!
//! The [`Manager`] and [`Client`] session objects drive the protocol; the
//! [`codec`] module implements the binary property format and the
//! [`list`] module the snapshot diffing. The surrounding application owns
//! the connection and the event loop.

pub mod atoms;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod list;
pub mod manager;
pub mod setting;

pub use client::{Client, SettingsCallback};
pub use error::Error;
pub use list::{SettingAction, SettingList, diff};
pub use manager::{Manager, manager_running};
pub use setting::{Color, Setting, SettingValue};
