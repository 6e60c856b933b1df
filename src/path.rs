use crate::math::{Point2d, Rect, Vector2d};
use crate::FaceId;

/// The region name shared by all vehicular movements through the middle
/// of the intersection.
pub const INTERSECTION: &str = "Intersection";

/// The region name shared by pedestrian crossings.
pub const CROSSWALK: &str = "Crosswalk";

/// True if the region is the shared intersection or crosswalk area,
/// which traffic elements may only enter with signal permission.
pub(crate) fn is_controlled_region(region: &str) -> bool {
    region == INTERSECTION || region == CROSSWALK
}

/// A named lane with a speed limit.
pub struct Lane {
    /// The lane's name.
    pub name: String,
    /// Speed limit in m/s.
    pub speed_limit: f64,
}

/// One waypoint of a travel path.
pub struct Milestone {
    /// The lane or region the milestone lies in.
    pub region: String,
    /// The waypoint's position.
    pub pos: Point2d,
}

/// Which other traffic elements make a permissive-turn region unsafe.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum MovementFilter {
    /// Any element inside the region blocks the turn.
    Present,
    /// Only elements inside the region heading within 90 degrees
    /// of this direction block the turn.
    Moving(Vector2d),
}

/// A region that must be free of relevant traffic before a
/// permissive (non-green-light) movement is allowed.
pub(crate) struct PermissiveTurn {
    pub filter: MovementFilter,
    pub region: Rect,
}

/// An ordered sequence of milestones a traffic element follows from an
/// entry lane, through the intersection or crosswalk, to an exit lane.
pub struct TravelPath {
    /// The path's name.
    pub name: String,
    /// The signal face controlling the path's movement.
    pub(crate) face: FaceId,
    /// Index of the entry lane.
    pub(crate) entry: usize,
    /// Index of the exit lane.
    pub(crate) exit: usize,
    /// The waypoints, in travel order.
    pub milestones: Vec<Milestone>,
    /// The region check gating a permissive left turn, if the path has one.
    pub(crate) permissive_left: Option<PermissiveTurn>,
    /// The region check gating a permissive right turn on red, if any.
    pub(crate) permissive_right: Option<PermissiveTurn>,
}

impl TravelPath {
    /// True if the segment leaving milestone `from` crosses into the
    /// shared intersection or crosswalk region.
    pub(crate) fn enters_controlled_region(&self, from: usize) -> bool {
        let Some(next) = self.milestones.get(from + 1) else {
            return false;
        };
        is_controlled_region(&next.region) && !is_controlled_region(&self.milestones[from].region)
    }
}
