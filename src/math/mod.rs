//! 数学工具
//!
//! glam 之上的四元数/矩阵辅助函数，语义与 MMD 计算保持一致

use glam::{Mat4, Quat, Vec3};

/// 万向节锁判定角（约 88 度）
pub const GIMBAL1_RAD: f32 = 88.0 * std::f32::consts::PI / 180.0;

/// 四元数判等容差
const QUAT_EPSILON: f32 = 1e-6;

/// 奇异矩阵判定阈值
const SINGULAR_DET: f32 = 1e-10;

// ============================================================================
// 判定
// ============================================================================

/// 是否为单位四元数（逐分量比较）
#[inline]
pub fn is_ident_quat(q: Quat) -> bool {
    (q.x).abs() <= QUAT_EPSILON
        && (q.y).abs() <= QUAT_EPSILON
        && (q.z).abs() <= QUAT_EPSILON
        && (q.w - 1.0).abs() <= QUAT_EPSILON
}

/// 向量是否全为有限值
#[inline]
pub fn is_finite_vec3(v: Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

#[inline]
fn near_zero(v: f32) -> bool {
    v.abs() <= 1e-10
}

/// 仅 X 分量非零
#[inline]
pub fn is_only_x(v: Vec3) -> bool {
    !near_zero(v.x) && near_zero(v.y) && near_zero(v.z)
}

/// 仅 Y 分量非零
#[inline]
pub fn is_only_y(v: Vec3) -> bool {
    near_zero(v.x) && !near_zero(v.y) && near_zero(v.z)
}

/// 仅 Z 分量非零
#[inline]
pub fn is_only_z(v: Vec3) -> bool {
    near_zero(v.x) && near_zero(v.y) && !near_zero(v.z)
}

// ============================================================================
// 四元数
// ============================================================================

/// 轴角转四元数，轴会被归一化；零轴返回单位四元数
#[inline]
pub fn axis_angle(axis: Vec3, angle: f32) -> Quat {
    let axis = axis.normalize_or_zero();
    if axis == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_axis_angle(axis, angle)
}

/// 允许 t 超出 [0, 1] 的球面插值
pub fn slerp_extended(from: Quat, to: Quat, t: f32) -> Quat {
    if from.abs_diff_eq(to, 1e-8) {
        return from;
    }

    let mut cos_omega = from.dot(to);
    let mut to = to;
    if cos_omega < 0.0 {
        cos_omega = -cos_omega;
        to = -to;
    }

    let result = if cos_omega > 0.9999 {
        Quat::from_xyzw(
            from.x * (1.0 - t) + to.x * t,
            from.y * (1.0 - t) + to.y * t,
            from.z * (1.0 - t) + to.z * t,
            from.w * (1.0 - t) + to.w * t,
        )
    } else {
        let omega = cos_omega.acos();
        let sin_omega = omega.sin();
        let angle = t * omega;
        let s1 = (omega - angle).sin() / sin_omega;
        let s2 = angle.sin() / sin_omega;
        Quat::from_xyzw(
            s1 * from.x + s2 * to.x,
            s1 * from.y + s2 * to.y,
            s1 * from.z + s2 * to.z,
            s1 * from.w + s2 * to.w,
        )
    };
    result.normalize()
}

/// 按系数缩放旋转量
///
/// 0 → 单位，1 → 原值，-1 → 逆，其余从单位四元数扩展插值
pub fn scaled_rotation(q: Quat, factor: f32) -> Quat {
    if factor == 0.0 {
        return Quat::IDENTITY;
    }
    if factor == 1.0 {
        return q;
    }
    if factor == -1.0 {
        return q.inverse();
    }
    slerp_extended(Quat::IDENTITY, q, factor)
}

/// 从 from 方向旋转到 to 方向的最短旋转
pub fn rotation_between(from: Vec3, to: Vec3) -> Quat {
    if from.abs_diff_eq(to, 1e-6) || from.length() == 0.0 || to.length() == 0.0 {
        return Quat::IDENTITY;
    }

    let v0 = from.normalize();
    let v1 = to.normalize();
    let dot = v0.dot(v1);
    if dot >= 1.0 {
        return Quat::IDENTITY;
    }
    if dot <= -1.0 {
        // 反向时任取一条垂直轴
        let helper = if v0.x.abs() > 0.9 { Vec3::Y } else { Vec3::X };
        return axis_angle(v0.cross(helper), std::f32::consts::PI);
    }

    let cross = v0.cross(v1);
    let s = ((1.0 + dot) * 2.0).sqrt();
    let inv = 1.0 / s;
    Quat::from_xyzw(cross.x * inv, cross.y * inv, cross.z * inv, s * 0.5).normalize()
}

/// 按轴分离扭转分量
///
/// 返回 (扭转分量, 非扭转分量)，满足 `q = yz * twist`
pub fn separate_twist_by_axis(q: Quat, axis: Vec3) -> (Quat, Quat) {
    let axis = axis.normalize_or_zero();
    if axis == Vec3::ZERO {
        return (q, Quat::IDENTITY);
    }
    let rotated = (q.normalize() * axis).normalize_or_zero();
    let yz = rotation_between(axis, rotated);
    let twist = yz.inverse() * q;
    (twist, yz)
}

/// 旋转角（弧度，0..=2π）
#[inline]
pub fn rotation_angle(q: Quat) -> f32 {
    2.0 * q.normalize().w.clamp(-1.0, 1.0).acos()
}

/// 将旋转重新表达为绕固定轴的旋转
pub fn fixed_axis_rotation(q: Quat, fixed_axis: Vec3) -> Quat {
    let fixed = fixed_axis.normalize_or_zero();
    let quat_axis = q.xyz().normalize_or_zero();
    if fixed == Vec3::ZERO || quat_axis == Vec3::ZERO {
        return q;
    }
    let mut rad = rotation_angle(q);
    if fixed.dot(quat_axis) < 0.0 {
        rad = -rad;
    }
    Quat::from_axis_angle(fixed, rad)
}

/// 两向量夹角（弧度）
#[inline]
pub fn vector_angle(a: Vec3, b: Vec3) -> f32 {
    let cos = a.dot(b) / (a.length() * b.length());
    cos.clamp(-1.0, 1.0).acos()
}

// ============================================================================
// 矩阵
// ============================================================================

/// 求逆，奇异矩阵返回单位矩阵
#[inline]
pub fn safe_inverse(m: &Mat4) -> Mat4 {
    if m.determinant().abs() < SINGULAR_DET {
        return Mat4::IDENTITY;
    }
    let inv = m.inverse();
    if inv.is_finite() {
        inv
    } else {
        Mat4::IDENTITY
    }
}

/// 点在线段上的正交投影（截断到线段内）
pub fn project_point_on_segment(start: Vec3, end: Vec3, point: Vec3) -> Vec3 {
    let direction = end - start;
    let length_sq = direction.length_squared();
    if length_sq <= f32::EPSILON {
        return start;
    }
    let t = ((point - start).dot(direction) / length_sq).clamp(0.0, 1.0);
    start + direction * t
}

/// 按权重累加矩阵
#[inline]
pub fn add_weighted(acc: &mut Mat4, m: &Mat4, weight: f32) {
    *acc += *m * weight;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn quat_near(a: Quat, b: Quat, eps: f32) -> bool {
        a.abs_diff_eq(b, eps) || a.abs_diff_eq(-b, eps)
    }

    #[test]
    fn test_scaled_rotation_special_factors() {
        let q = Quat::from_rotation_x(0.8);
        assert!(is_ident_quat(scaled_rotation(q, 0.0)));
        assert_eq!(scaled_rotation(q, 1.0), q);
        assert!(quat_near(scaled_rotation(q, -1.0), q.inverse(), 1e-6));
    }

    #[test]
    fn test_scaled_rotation_half_angle() {
        let q = Quat::from_rotation_y(1.0);
        let half = scaled_rotation(q, 0.5);
        assert!(quat_near(half, Quat::from_rotation_y(0.5), 1e-5));
        // 超出 1 的系数继续外推
        let double = scaled_rotation(Quat::from_rotation_y(0.4), 2.0);
        assert!(quat_near(double, Quat::from_rotation_y(0.8), 1e-4));
    }

    #[test]
    fn test_rotation_between_antiparallel() {
        let q = rotation_between(Vec3::X, -Vec3::X);
        let v = q * Vec3::X;
        assert!(v.abs_diff_eq(-Vec3::X, 1e-5));
    }

    #[test]
    fn test_separate_twist_recomposes() {
        let q = Quat::from_rotation_x(0.7) * Quat::from_rotation_z(0.3);
        let (twist, yz) = separate_twist_by_axis(q, Vec3::X);
        assert!(quat_near(yz * twist, q, 1e-5));
        // 扭转分量只绕 X 轴
        let twist_axis = twist.xyz().normalize_or_zero();
        assert!(twist_axis.y.abs() < 1e-4 && twist_axis.z.abs() < 1e-4);
    }

    #[test]
    fn test_fixed_axis_rotation_keeps_sign() {
        let q = Quat::from_rotation_y(-0.5);
        let fixed = fixed_axis_rotation(q, Vec3::Y);
        assert!(quat_near(fixed, q, 1e-5));
    }

    #[test]
    fn test_safe_inverse_singular() {
        let m = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(safe_inverse(&m), Mat4::IDENTITY);
    }

    #[test]
    fn test_project_point_on_segment() {
        let c = project_point_on_segment(Vec3::ZERO, Vec3::new(0.0, 10.0, 0.0), Vec3::new(3.0, 4.0, 1.0));
        assert!(c.abs_diff_eq(Vec3::new(0.0, 4.0, 0.0), 1e-6));
        let clamped = project_point_on_segment(Vec3::ZERO, Vec3::Y, Vec3::new(0.0, 5.0, 0.0));
        assert!(clamped.abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn test_only_axis() {
        assert!(is_only_x(Vec3::new(-FRAC_PI_2, 0.0, 0.0)));
        assert!(!is_only_x(Vec3::new(0.1, 0.1, 0.0)));
        assert!(is_only_z(Vec3::new(0.0, 0.0, 0.2)));
        assert!(!is_only_y(Vec3::ZERO));
    }

    #[test]
    fn test_vector_angle() {
        assert!((vector_angle(Vec3::X, Vec3::Y) - FRAC_PI_2).abs() < 1e-6);
    }
}
