//! World queries used by climbing: capsule sweeps and rays restricted to climbable
//! surfaces, plus swept moves of the character's own collider.

use tracing::trace;

use crate::prelude::*;

/// Upper bound on the hits collected by a single capsule sweep.
const MAX_SWEEP_HITS: u32 = 16;

/// Result of a single probe against the world.
///
/// A miss is still a valid answer: `blocking` is `false`, `point` is the end of the
/// queried segment, the normal is zero and `time` is `1.0`.
#[derive(Clone, Copy, Reflect, Debug, PartialEq)]
pub struct ProbeHit {
    /// Impact point, or the segment end for a miss.
    pub point: Vec3,
    /// Outward surface normal at the impact point.
    pub normal: Vec3,
    /// Fraction of the segment travelled before the impact, in `[0, 1]`.
    pub time: f32,
    pub blocking: bool,
    pub start: Vec3,
    pub end: Vec3,
}

impl ProbeHit {
    pub fn miss(start: Vec3, end: Vec3) -> Self {
        Self {
            point: end,
            normal: Vec3::ZERO,
            time: 1.0,
            blocking: false,
            start,
            end,
        }
    }

    pub fn blocking(start: Vec3, end: Vec3, point: Vec3, normal: Vec3) -> Self {
        let length = start.distance(end);
        let time = if length > 0.0 {
            (start.distance(point) / length).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            point,
            normal,
            time,
            blocking: true,
            start,
            end,
        }
    }
}

/// Pure geometry queries against climbable surfaces.
pub trait GeometryProbe {
    /// Sweeps an upright capsule from `start` to `end` and returns every climbable hit.
    ///
    /// `half_height` includes the hemispherical caps.
    fn sweep_capsule(&self, start: Vec3, end: Vec3, radius: f32, half_height: f32)
    -> Vec<ProbeHit>;

    /// Casts a ray along the segment and returns the first climbable hit, or a miss.
    fn trace_ray(&self, start: Vec3, end: Vec3) -> ProbeHit;
}

/// First contact of a swept body move.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyHit {
    /// Fraction of the requested displacement that can be travelled before contact.
    pub time: f32,
    pub normal: Vec3,
}

/// Swept moves of the character's own collider.
pub trait BodyMover {
    /// Returns the first blocking contact when moving by `displacement`, if any.
    fn sweep_body(&self, position: Vec3, rotation: Quat, displacement: Vec3) -> Option<BodyHit>;

    /// Offset that pushes the body out of any geometry it overlaps.
    fn depenetrate(&self, position: Vec3, rotation: Quat) -> Vec3;
}

/// [`GeometryProbe`] and [`BodyMover`] backed by avian's spatial query pipeline.
pub struct AvianProbe<'a, 'w, 's> {
    pub move_and_slide: &'a MoveAndSlide<'w, 's>,
    pub body: &'a Collider,
    pub cfg: &'a ClimbController,
}

impl GeometryProbe for AvianProbe<'_, '_, '_> {
    fn sweep_capsule(
        &self,
        start: Vec3,
        end: Vec3,
        radius: f32,
        half_height: f32,
    ) -> Vec<ProbeHit> {
        let Ok((direction, length)) = Dir3::new_and_length(end - start) else {
            return Vec::new();
        };
        let segment = 2.0 * (half_height - radius).max(0.0);
        let shape = Collider::capsule(radius, segment);
        let hits: Vec<ProbeHit> = self
            .move_and_slide
            .spatial_query
            .shape_hits(
                &shape,
                start,
                Quat::IDENTITY,
                direction,
                MAX_SWEEP_HITS,
                &ShapeCastConfig::from_max_distance(length),
                &self.cfg.climbable,
            )
            .into_iter()
            .map(|hit| ProbeHit {
                point: hit.point1,
                normal: hit.normal1,
                time: (hit.distance / length).clamp(0.0, 1.0),
                blocking: true,
                start,
                end,
            })
            .collect();
        trace!("capsule sweep {start} -> {end}: {} hits", hits.len());
        hits
    }

    fn trace_ray(&self, start: Vec3, end: Vec3) -> ProbeHit {
        let Ok((direction, length)) = Dir3::new_and_length(end - start) else {
            return ProbeHit::miss(start, end);
        };
        let hit = self.move_and_slide.spatial_query.cast_ray(
            start,
            direction,
            length,
            true,
            &self.cfg.climbable,
        );
        trace!("ray {start} -> {end}: {hit:?}");
        match hit {
            Some(hit) => {
                ProbeHit::blocking(start, end, start + direction * hit.distance, hit.normal)
            }
            None => ProbeHit::miss(start, end),
        }
    }
}

impl BodyMover for AvianProbe<'_, '_, '_> {
    fn sweep_body(&self, position: Vec3, rotation: Quat, displacement: Vec3) -> Option<BodyHit> {
        let length = displacement.length();
        if length <= f32::EPSILON {
            return None;
        }
        let hit = self.move_and_slide.cast_move(
            self.body,
            position,
            rotation,
            displacement,
            self.cfg.move_and_slide.skin_width,
            &self.cfg.filter,
        )?;
        Some(BodyHit {
            time: (hit.distance / length).clamp(0.0, 1.0),
            normal: hit.normal1,
        })
    }

    fn depenetrate(&self, position: Vec3, rotation: Quat) -> Vec3 {
        self.move_and_slide.depenetrate(
            self.body,
            position,
            rotation,
            &((&self.cfg.move_and_slide).into()),
            &self.cfg.filter,
        )
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    //! Probe double that replays queued answers in call order.

    use std::{cell::RefCell, collections::VecDeque};

    use super::*;

    #[derive(Default)]
    pub(crate) struct ScriptedProbe {
        pub sweeps: RefCell<VecDeque<Vec<ProbeHit>>>,
        pub rays: RefCell<VecDeque<bool>>,
        /// Impact points handed out to blocking rays, in call order.
        pub ray_points: RefCell<VecDeque<Vec3>>,
        pub body_hits: RefCell<VecDeque<Option<BodyHit>>>,
        pub ray_log: RefCell<Vec<(Vec3, Vec3)>>,
    }

    impl ScriptedProbe {
        pub fn with_sweeps(self, sweeps: impl IntoIterator<Item = Vec<ProbeHit>>) -> Self {
            self.sweeps.borrow_mut().extend(sweeps);
            self
        }

        pub fn with_rays(self, rays: impl IntoIterator<Item = bool>) -> Self {
            self.rays.borrow_mut().extend(rays);
            self
        }

        pub fn with_ray_points(self, points: impl IntoIterator<Item = Vec3>) -> Self {
            self.ray_points.borrow_mut().extend(points);
            self
        }

        pub fn with_body_hits(self, hits: impl IntoIterator<Item = Option<BodyHit>>) -> Self {
            self.body_hits.borrow_mut().extend(hits);
            self
        }
    }

    pub(crate) fn wall_hit(point: Vec3, normal: Vec3) -> ProbeHit {
        ProbeHit::blocking(point + normal, point, point, normal)
    }

    impl GeometryProbe for ScriptedProbe {
        fn sweep_capsule(&self, _: Vec3, _: Vec3, _: f32, _: f32) -> Vec<ProbeHit> {
            self.sweeps.borrow_mut().pop_front().unwrap_or_default()
        }

        fn trace_ray(&self, start: Vec3, end: Vec3) -> ProbeHit {
            self.ray_log.borrow_mut().push((start, end));
            if self.rays.borrow_mut().pop_front().unwrap_or(false) {
                let point = self.ray_points.borrow_mut().pop_front().unwrap_or(end);
                ProbeHit::blocking(start, end, point, Vec3::Y)
            } else {
                ProbeHit::miss(start, end)
            }
        }
    }

    impl BodyMover for ScriptedProbe {
        fn sweep_body(&self, _: Vec3, _: Quat, _: Vec3) -> Option<BodyHit> {
            self.body_hits.borrow_mut().pop_front().flatten()
        }

        fn depenetrate(&self, _: Vec3, _: Quat) -> Vec3 {
            Vec3::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_reports_segment_end() {
        let hit = ProbeHit::miss(Vec3::ZERO, Vec3::X * 2.0);
        assert!(!hit.blocking);
        assert_eq!(hit.point, Vec3::X * 2.0);
        assert_eq!(hit.normal, Vec3::ZERO);
        assert_eq!(hit.time, 1.0);
    }

    #[test]
    fn blocking_hit_time_is_fraction_of_segment() {
        let hit = ProbeHit::blocking(Vec3::ZERO, Vec3::X * 4.0, Vec3::X, Vec3::NEG_X);
        assert!(hit.blocking);
        assert!((hit.time - 0.25).abs() < 1e-6);
    }
}
