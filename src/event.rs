use crate::element::{ElementKind, TrafficElement};
use crate::math::heading_degrees;
use serde::{Deserialize, Serialize};

/// An observable change produced by the simulation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A signal face illuminated a different physical lamp.
    Lamp(LampEvent),
    /// A traffic element changed in an observable way.
    Element(ElementEvent),
}

/// A lamp change on a signal face.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LampEvent {
    pub time: f64,
    pub face: String,
    pub lamp: String,
}

/// A traffic element lifecycle record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElementEvent {
    pub time: f64,
    pub kind: ElementEventKind,
    /// The lane or region the element is in, entered or left.
    pub region: String,
    pub name: String,
    pub element: ElementKind,
    pub position: [f64; 2],
    /// The exit lane of the element's travel path.
    pub destination: String,
    /// The element's heading in degrees anti-clockwise from east.
    pub heading: f64,
    pub length: f64,
    pub speed: f64,
    pub path: String,
    pub present: bool,
}

/// The kinds of traffic element records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementEventKind {
    Spawned,
    BlockedFromSpawning,
    Blocked,
    Unblocked,
    Stopped,
    Entered,
    Left,
    Exited,
}

impl Event {
    pub(crate) fn lamp(time: f64, face: &str, lamp: &str) -> Self {
        Event::Lamp(LampEvent {
            time,
            face: face.to_owned(),
            lamp: lamp.to_owned(),
        })
    }

    pub(crate) fn element(
        time: f64,
        kind: ElementEventKind,
        region: &str,
        destination: &str,
        path: &str,
        element: &TrafficElement,
    ) -> Self {
        Event::Element(ElementEvent {
            time,
            kind,
            region: region.to_owned(),
            name: element.name().to_owned(),
            element: element.kind(),
            position: [element.position().x, element.position().y],
            destination: destination.to_owned(),
            heading: heading_degrees(element.heading()),
            length: element.kind().length(),
            speed: element.speed(),
            path: path.to_owned(),
            present: element.present(),
        })
    }

    /// The simulation time the event occurred.
    pub fn time(&self) -> f64 {
        match self {
            Event::Lamp(e) => e.time,
            Event::Element(e) => e.time,
        }
    }
}
