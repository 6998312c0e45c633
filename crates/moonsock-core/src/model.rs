//! Printer data model.
//!
//! Serde shapes for the OctoPrint-compatible printer report and for
//! Moonraker `notify_status_update` pushes.  These are plain data — the
//! transport never inspects them; they exist for callers of the
//! higher-level client.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known heater names in the OctoPrint-compatible temperature map.
pub mod heaters {
    pub const TOOLHEAD: &str = "tool0";
    pub const BED: &str = "bed";
}

/// Well-known Klipper printer-object names used in status subscriptions.
pub mod printer_objects {
    pub const TOOLHEAD: &str = "toolhead";
    pub const EXTRUDER: &str = "extruder";
    pub const HEATERS: &str = "heaters";
    pub const HEATER_BED: &str = "heater_bed";
    pub const PROBE: &str = "probe";
}

/// Temperature report for a single heater.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaterTemperature {
    pub actual: f64,
    pub offset: f64,
    pub target: f64,
}

/// Boolean state flags of the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterStateFlags {
    pub operational: bool,
    pub paused: bool,
    pub printing: bool,
    pub cancelling: bool,
    pub pausing: bool,
    pub error: bool,
    pub ready: bool,
    #[serde(rename = "closedOrError")]
    pub closed_or_error: bool,
}

/// Human-readable state plus flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterState {
    pub text: String,
    pub flags: PrinterStateFlags,
}

/// The OctoPrint-compatible printer report returned by `/api/printer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterData {
    pub temperature: HashMap<String, HeaterTemperature>,
    pub state: PrinterState,
}

/// The list of printer objects a Moonraker host exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterObjectsList {
    pub objects: Vec<String>,
}

/// One `notify_status_update` push, already unpacked from its two-element
/// params array `[changed_objects, event_time]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PrinterObjectNotification {
    /// Moonraker event time in seconds.
    pub event_time: f64,
    /// The changed objects keyed by printer-object name; values stay
    /// opaque JSON.
    pub objects: Value,
}
