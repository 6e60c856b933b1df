//! Mathematical structs and functions.

use cgmath::{Point2, Vector2};
pub use rect::Rect;
pub use util::*;

mod rect;
mod util;

/// A 2D point
pub type Point2d = Point2<f64>;

/// A 2D vector
pub type Vector2d = Vector2<f64>;

/// Unit vector pointing north (positive y).
pub const NORTH: Vector2d = Vector2d { x: 0.0, y: 1.0 };

/// Unit vector pointing south (negative y).
pub const SOUTH: Vector2d = Vector2d { x: 0.0, y: -1.0 };

/// Unit vector pointing east (positive x).
pub const EAST: Vector2d = Vector2d { x: 1.0, y: 0.0 };

/// Unit vector pointing west (negative x).
pub const WEST: Vector2d = Vector2d { x: -1.0, y: 0.0 };
