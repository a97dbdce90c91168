use crate::{probe::ProbeHit, prelude::*};

/// Averaged climbable surface under a set of probe hits.
///
/// Both vectors are zero when there were no hits. The normal is otherwise unit length,
/// or zero when the hit normals cancel out.
#[derive(Clone, Copy, Reflect, Default, Debug, PartialEq)]
pub struct SurfaceEstimate {
    pub point: Vec3,
    pub normal: Vec3,
}

impl SurfaceEstimate {
    pub fn is_empty(&self) -> bool {
        self.normal == Vec3::ZERO
    }
}

pub fn aggregate(hits: &[ProbeHit]) -> SurfaceEstimate {
    if hits.is_empty() {
        return SurfaceEstimate::default();
    }
    let (point_sum, normal_sum) = hits
        .iter()
        .fold((Vec3::ZERO, Vec3::ZERO), |(points, normals), hit| {
            (points + hit.point, normals + hit.normal)
        });
    SurfaceEstimate {
        point: point_sum / hits.len() as f32,
        normal: safe_normalize(normal_sum),
    }
}

fn safe_normalize(v: Vec3) -> Vec3 {
    if v.length_squared() < 1e-8 {
        return Vec3::ZERO;
    }
    v.normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::scripted::wall_hit;

    #[test]
    fn empty_set_is_sentinel() {
        let surface = aggregate(&[]);
        assert_eq!(surface.point, Vec3::ZERO);
        assert_eq!(surface.normal, Vec3::ZERO);
        assert!(surface.is_empty());
    }

    #[test]
    fn duplicated_hits_collapse_to_one() {
        let point = vec3(1.0, 2.0, -3.0);
        let normal = vec3(0.0, 0.0, 2.0);
        let hits = vec![wall_hit(point, normal); 4];
        let surface = aggregate(&hits);
        assert!(surface.point.abs_diff_eq(point, 1e-5));
        assert!(surface.normal.abs_diff_eq(Vec3::Z, 1e-5));
    }

    #[test]
    fn point_is_mean_and_normal_is_renormalized_sum() {
        let hits = [
            wall_hit(vec3(0.0, 0.0, 0.0), Vec3::Z),
            wall_hit(vec3(2.0, 2.0, 0.0), Vec3::X),
        ];
        let surface = aggregate(&hits);
        assert!(surface.point.abs_diff_eq(vec3(1.0, 1.0, 0.0), 1e-5));
        assert!(
            surface
                .normal
                .abs_diff_eq(vec3(1.0, 0.0, 1.0).normalize(), 1e-5)
        );
        assert!((surface.normal.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn opposing_normals_cancel_to_zero() {
        let hits = [
            wall_hit(Vec3::ZERO, Vec3::Z),
            wall_hit(Vec3::X, Vec3::NEG_Z),
        ];
        let surface = aggregate(&hits);
        assert_eq!(surface.normal, Vec3::ZERO);
        assert!(surface.point.abs_diff_eq(vec3(0.5, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn order_does_not_matter() {
        let a = wall_hit(vec3(0.0, 1.0, 0.0), vec3(0.2, 0.0, 1.0));
        let b = wall_hit(vec3(3.0, 0.0, 1.0), vec3(-0.3, 0.1, 1.0));
        let c = wall_hit(vec3(-1.0, 2.0, 0.5), Vec3::Z);
        let forward = aggregate(&[a, b, c]);
        let backward = aggregate(&[c, b, a]);
        assert!(forward.point.abs_diff_eq(backward.point, 1e-5));
        assert!(forward.normal.abs_diff_eq(backward.normal, 1e-5));
    }
}
