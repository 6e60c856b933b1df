use crate::math::Rect;
use crate::FaceId;
use smallvec::SmallVec;

/// A presence detector belonging to a signal face.
///
/// Geometric sensors report true while any present traffic element's
/// footprint overlaps their region. Non-geometric sensors (preempt,
/// manual, flash) have no region and are driven only by script commands.
pub struct Sensor {
    /// The sensor's name.
    name: String,
    /// The face the sensor belongs to.
    face: FaceId,
    /// The detection region, absent for non-geometric sensors.
    region: Option<Rect>,
    /// The toggles the sensor drives while true. Targets may live on
    /// another face than the sensor's own (cross-face wiring).
    pub(crate) toggles: SmallVec<[(FaceId, String); 2]>,
    /// The sensor's current value.
    pub(crate) value: bool,
    /// While set, the value is driven only by script commands.
    pub(crate) controlled_by_script: bool,
}

impl Sensor {
    pub(crate) fn new(
        name: String,
        face: FaceId,
        region: Option<Rect>,
        toggles: SmallVec<[(FaceId, String); 2]>,
    ) -> Self {
        Self {
            name,
            face,
            region,
            toggles,
            value: false,
            controlled_by_script: false,
        }
    }

    /// The sensor's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The face the sensor belongs to.
    pub fn face(&self) -> FaceId {
        self.face
    }

    /// The detection region, absent for non-geometric sensors.
    pub fn region(&self) -> Option<&Rect> {
        self.region.as_ref()
    }

    /// The sensor's current value.
    pub fn value(&self) -> bool {
        self.value
    }
}

/// True if any active sensor maps to the given toggle.
/// An active sensor "holds" its toggles: they cannot be cleared.
pub(crate) fn holds_toggle(sensors: &[Sensor], face: FaceId, name: &str) -> bool {
    sensors.iter().any(|sensor| {
        sensor.value
            && sensor
                .toggles
                .iter()
                .any(|(target, toggle)| *target == face && toggle == name)
    })
}
