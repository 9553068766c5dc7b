//! Planar helpers for approaching an upright cube.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use hsmbot_core::services::Pose;

/// Closer than this to the chosen side counts as almost docked.
pub const DOCKED_DISTANCE_MM: f64 = 100.0;
/// Heading tolerance for almost docked, measured against the nearest face.
pub const DOCKED_HEADING: f64 = 10.0 * PI / 180.0;

/// Wrap an angle into `(-pi, pi]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let a = (angle + PI).rem_euclid(TAU) - PI;
    if a <= -PI {
        a + TAU
    } else {
        a
    }
}

/// The four approach poses `dist` millimetres off the faces of `cube`,
/// each facing the cube.
pub fn sides(cube: &Pose, dist: f64) -> [Pose; 4] {
    let (s, c) = cube.theta.sin_cos();
    let (x, y, ang) = (cube.x, cube.y, cube.theta);
    [
        Pose::new(x + c * dist, y + s * dist, wrap_angle(ang + PI)),
        Pose::new(x - c * dist, y - s * dist, wrap_angle(ang)),
        Pose::new(x + s * dist, y - c * dist, wrap_angle(ang + FRAC_PI_2)),
        Pose::new(x - s * dist, y + c * dist, wrap_angle(ang - FRAC_PI_2)),
    ]
}

/// Approach pose closest to the robot. Ties keep the earlier face.
pub fn pick_side(cube: &Pose, robot: &Pose, dist: f64) -> Pose {
    let [first, rest @ ..] = sides(cube, dist);
    rest.into_iter().fold(first, |best, side| {
        if side.distance_to(robot) < best.distance_to(robot) {
            side
        } else {
            best
        }
    })
}

/// Heading error to the nearest cube face, in `[0, pi/4]`.
pub fn face_heading_error(robot_theta: f64, side_theta: f64) -> f64 {
    let e = wrap_angle(robot_theta - side_theta).rem_euclid(FRAC_PI_2);
    e.min(FRAC_PI_2 - e)
}

/// Close enough to `side` that the start collision check can be skipped.
pub fn almost_docked(robot: &Pose, side: &Pose) -> bool {
    robot.distance_to(side) < DOCKED_DISTANCE_MM
        && face_heading_error(robot.theta, side.theta) < DOCKED_HEADING
}

/// Bearing of `point` relative to the robot's heading, wrapped.
pub fn relative_bearing(robot: &Pose, point: &Pose) -> f64 {
    wrap_angle((point.y - robot.y).atan2(point.x - robot.x) - robot.theta)
}
