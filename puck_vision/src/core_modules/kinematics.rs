// THEORY:
// The `kinematics` module derives motion from consecutive table-space
// positions. It is deliberately dumb: finite differences over one frame, no
// filtering (the tracker has already smoothed the positions it passes in).
//
// Key architectural principles:
// 1.  **Never fails**: a missing position or a non-positive time step yields
//     a stationary reading and restarts the sample chain, instead of an error
//     or a division by zero.
// 2.  **Heading only when moving**: below `min_motion_speed` the direction of
//     a few pixels of jitter is noise, so the heading is reported as 0.
// 3.  **Acceleration needs history**: it is the change between two consecutive
//     speed samples, so it stays `None` until the chain has two of them.

use crate::config::KinematicsConfig;
use crate::core_modules::homography::TablePoint;
use crate::record::Velocity;

/// One kinematics reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Motion {
    pub velocity: Velocity,
    pub acceleration: Option<f64>,
}

/// Per-entity finite-difference estimator.
#[derive(Debug, Clone)]
pub struct KinematicsEstimator {
    min_motion_speed: f64,
    previous_speed: Option<f64>,
}

impl KinematicsEstimator {
    pub fn new(config: &KinematicsConfig) -> Self {
        Self {
            min_motion_speed: config.min_motion_speed,
            previous_speed: None,
        }
    }

    /// Motion between `previous` and `current`, `dt` seconds apart.
    pub fn update(
        &mut self,
        previous: Option<TablePoint>,
        current: Option<TablePoint>,
        dt: f64,
    ) -> Motion {
        let (Some(previous), Some(current)) = (previous, current) else {
            self.reset();
            return Motion::default();
        };
        if dt <= 0.0 || !dt.is_finite() {
            self.reset();
            return Motion::default();
        }

        let du = current.u - previous.u;
        let dv = current.v - previous.v;
        let speed = du.hypot(dv) / dt;
        let heading_degrees = if speed < self.min_motion_speed {
            0.0
        } else {
            heading_degrees(du, dv)
        };
        let acceleration = self.previous_speed.map(|before| (speed - before) / dt);
        self.previous_speed = Some(speed);

        Motion {
            velocity: Velocity { speed, heading_degrees },
            acceleration,
        }
    }

    pub fn reset(&mut self) {
        self.previous_speed = None;
    }
}

/// Direction of `(du, dv)` in degrees, normalized to (-180, 180].
pub fn heading_degrees(du: f64, dv: f64) -> f64 {
    let degrees = dv.atan2(du).to_degrees();
    if degrees <= -180.0 { degrees + 360.0 } else { degrees }
}

/// Where `from` ends up after travelling at `velocity` for `dt` seconds.
pub fn dead_reckon(from: TablePoint, velocity: Velocity, dt: f64) -> TablePoint {
    let heading = velocity.heading_degrees.to_radians();
    let distance = velocity.speed * dt.max(0.0);
    TablePoint::new(from.u + distance * heading.cos(), from.v + distance * heading.sin())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> KinematicsEstimator {
        KinematicsEstimator::new(&KinematicsConfig::default())
    }

    #[test]
    fn straight_up_the_table_is_minus_ninety_degrees() {
        let mut kinematics = estimator();
        let a = TablePoint::new(0.5, 0.5);
        let b = TablePoint::new(0.5, 0.45);
        let c = TablePoint::new(0.5, 0.40);

        assert_eq!(kinematics.update(None, Some(a), 1.0), Motion::default());

        let first = kinematics.update(Some(a), Some(b), 1.0);
        assert!((first.velocity.speed - 0.05).abs() < 1e-9);
        assert!((first.velocity.heading_degrees + 90.0).abs() < 1e-9);
        assert_eq!(first.acceleration, None);

        let second = kinematics.update(Some(b), Some(c), 1.0);
        assert!((second.velocity.speed - 0.05).abs() < 1e-9);
        assert!(second.acceleration.unwrap().abs() < 1e-9);
    }

    #[test]
    fn slow_motion_has_no_heading() {
        let mut kinematics = estimator();
        let (from, to) = (TablePoint::new(0.5, 0.5), TablePoint::new(0.4999, 0.5));
        let motion = kinematics.update(Some(from), Some(to), 1.0);
        assert!(motion.velocity.speed > 0.0);
        assert_eq!(motion.velocity.heading_degrees, 0.0);
    }

    #[test]
    fn bad_time_step_is_stationary_and_restarts_the_chain() {
        let mut kinematics = estimator();
        let a = TablePoint::new(0.2, 0.2);
        let b = TablePoint::new(0.3, 0.2);
        kinematics.update(Some(a), Some(b), 0.1);
        assert_eq!(kinematics.update(Some(b), Some(a), 0.0), Motion::default());
        assert_eq!(kinematics.update(Some(a), Some(b), -1.0), Motion::default());

        let after = kinematics.update(Some(a), Some(b), 0.1);
        assert_eq!(after.acceleration, None);
        assert!((after.velocity.speed - 1.0).abs() < 1e-9);
        assert_eq!(after.velocity.heading_degrees, 0.0);
    }

    #[test]
    fn acceleration_is_change_of_speed_per_second() {
        let mut kinematics = estimator();
        let p = |u| Some(TablePoint::new(u, 0.5));
        kinematics.update(p(0.0), p(0.1), 0.5);
        let motion = kinematics.update(p(0.1), p(0.4), 0.5);
        // 0.2/s then 0.6/s over half a second.
        assert!((motion.acceleration.unwrap() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn heading_range_is_half_open() {
        assert_eq!(heading_degrees(-1.0, -0.0), 180.0);
        assert_eq!(heading_degrees(-1.0, 0.0), 180.0);
        assert!((heading_degrees(0.0, 1.0) - 90.0).abs() < 1e-12);
        assert!((heading_degrees(1.0, -1.0) + 45.0).abs() < 1e-12);
    }

    #[test]
    fn dead_reckoning_follows_the_heading() {
        let velocity = Velocity {
            speed: 0.5,
            heading_degrees: 90.0,
        };
        let next = dead_reckon(TablePoint::new(0.3, 0.3), velocity, 0.2);
        assert!((next.u - 0.3).abs() < 1e-9);
        assert!((next.v - 0.4).abs() < 1e-9);
    }
}
