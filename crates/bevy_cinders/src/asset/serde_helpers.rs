use bevy::prelude::*;

pub(crate) fn is_false(v: &bool) -> bool {
    !*v
}

pub(crate) fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

pub(crate) fn is_zero_vec3(v: &Vec3) -> bool {
    *v == Vec3::ZERO
}

pub(crate) fn is_identity_quat(v: &Quat) -> bool {
    *v == Quat::IDENTITY
}

pub(crate) fn is_empty_string(v: &String) -> bool {
    v.is_empty()
}

pub(crate) fn identity_quat() -> Quat {
    Quat::IDENTITY
}
