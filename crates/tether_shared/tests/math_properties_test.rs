//! Property tests for rotation packing and rigid frames.

use proptest::prelude::*;
use tether_shared::{Quaternion, Transform, Vec3};

const EPS: f32 = 1e-3;

fn vec3_strategy() -> impl Strategy<Value = Vec3> {
    (-50.0f32..50.0, -50.0f32..50.0, -50.0f32..50.0).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

/// Arbitrary non-degenerate quaternion, not necessarily unit length.
fn quaternion_strategy() -> impl Strategy<Value = Quaternion> {
    (-4.0f32..4.0, -4.0f32..4.0, -4.0f32..4.0, -4.0f32..4.0)
        .prop_map(|(x, y, z, w)| Quaternion::new(x, y, z, w))
        .prop_filter("near-zero quaternion", |q| q.length_squared() > 1e-2)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Packing to three components and back keeps the rotation and lands in
    /// the `w >= 0` hemisphere.
    #[test]
    fn prop_compress_expand_keeps_rotation(q in quaternion_strategy()) {
        let rebuilt = Quaternion::expand(q.compress());
        prop_assert!(rebuilt.w >= 0.0);
        prop_assert!((rebuilt.length_squared() - 1.0).abs() < EPS);
        prop_assert!(rebuilt.same_rotation(q, EPS), "{:?} became {:?}", q, rebuilt);
    }

    /// A packed rotation moves vectors exactly like the original.
    #[test]
    fn prop_expanded_rotation_moves_vectors_alike(
        q in quaternion_strategy(),
        v in vec3_strategy(),
    ) {
        let rebuilt = Quaternion::expand(q.compress());
        let expected = q.normalize().rotate(v);
        prop_assert!(rebuilt.rotate(v).distance(expected) < EPS * (1.0 + v.length()));
    }

    /// Going into a frame and back out returns the original point.
    #[test]
    fn prop_frame_round_trip(
        position in vec3_strategy(),
        q in quaternion_strategy(),
        point in vec3_strategy(),
    ) {
        let frame = Transform::new(position, q.normalize());
        let local = frame.inverse_transform_point(point);
        prop_assert!(frame.transform_point(local).distance(point) < EPS * (1.0 + point.length()));
    }
}
