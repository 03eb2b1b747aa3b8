//! VMD 插值曲线
//!
//! 控制点以 [0, 127] 的整数给出，端点固定为 (0,0) 与 (1,1)。
//! 求值时先由 x 反解曲线参数 t（Newton 法，失败时二分），再求 y。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use glam::Vec2;

/// Newton 法最大迭代次数
const NEWTON_ITERATIONS: usize = 20;
/// 二分法迭代次数（f32 精度下足够）
const BISECTION_ITERATIONS: usize = 40;
/// x 方向的收敛误差
const SOLVE_EPSILON: f32 = 1e-7;

/// 三次贝塞尔曲线（端点 (0,0) 与 (1,1)）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BezierCurve {
    c0: Vec2,
    c1: Vec2,
}

/// 单分量：3s²t·p1 + 3st²·p2 + t³
#[inline]
fn component(p1: f32, p2: f32, t: f32) -> f32 {
    let s = 1.0 - t;
    3.0 * s * s * t * p1 + 3.0 * s * t * t * p2 + t * t * t
}

/// 单分量对 t 的导数
#[inline]
fn component_derivative(p1: f32, p2: f32, t: f32) -> f32 {
    let s = 1.0 - t;
    3.0 * s * s * p1 + 6.0 * s * t * (p2 - p1) + 3.0 * t * t * (1.0 - p2)
}

impl BezierCurve {
    /// 以归一化控制点创建
    pub fn new(c0: Vec2, c1: Vec2) -> Self {
        Self {
            c0: c0.clamp(Vec2::ZERO, Vec2::ONE),
            c1: c1.clamp(Vec2::ZERO, Vec2::ONE),
        }
    }

    /// 由 VMD 参数 [x1, y1, x2, y2] 创建
    pub fn from_parameters(parameters: [u8; 4]) -> Self {
        let [x1, y1, x2, y2] = parameters.map(|p| p as f32 / 127.0);
        Self::new(Vec2::new(x1, y1), Vec2::new(x2, y2))
    }

    /// x → y，超出 [0, 1] 时取端点
    pub fn value(&self, x: f32) -> f32 {
        if x <= 0.0 {
            return 0.0;
        }
        if x >= 1.0 {
            return 1.0;
        }
        component(self.c0.y, self.c1.y, self.solve_t(x))
    }

    /// 解 x(t) = x；控制点在 [0,1] 内时 x(t) 单调不减
    fn solve_t(&self, x: f32) -> f32 {
        let (p1, p2) = (self.c0.x, self.c1.x);

        let mut t = 0.5;
        for _ in 0..NEWTON_ITERATIONS {
            let f = component(p1, p2, t) - x;
            if f.abs() <= SOLVE_EPSILON {
                return t;
            }
            let d = component_derivative(p1, p2, t);
            if d.abs() <= f32::EPSILON {
                break;
            }
            let next = t - f / d;
            if !(0.0..=1.0).contains(&next) {
                break;
            }
            t = next;
        }

        // 导数退化或越界时退回二分
        let (mut lo, mut hi) = (0.0_f32, 1.0_f32);
        for _ in 0..BISECTION_ITERATIONS {
            let mid = 0.5 * (lo + hi);
            if component(p1, p2, mid) < x {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }
}

/// 曲线来源（采样时按需取曲线）
pub trait BezierCurveFactory {
    fn curve(&self, parameters: [u8; 4]) -> Arc<BezierCurve>;
}

/// 按控制点共享的曲线缓存
#[derive(Debug, Default)]
pub struct BezierCurveCache {
    curves: RwLock<HashMap<[u8; 4], Arc<BezierCurve>>>,
}

impl BezierCurveCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.curves.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BezierCurveFactory for BezierCurveCache {
    fn curve(&self, parameters: [u8; 4]) -> Arc<BezierCurve> {
        if let Some(curve) = self.curves.read().unwrap_or_else(|e| e.into_inner()).get(&parameters) {
            return Arc::clone(curve);
        }
        let mut curves = self.curves.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            curves
                .entry(parameters)
                .or_insert_with(|| Arc::new(BezierCurve::from_parameters(parameters))),
        )
    }
}

impl Clone for BezierCurveCache {
    /// 缓存不随 Motion 克隆
    fn clone(&self) -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagonal_parameters_are_linear() {
        let curve = BezierCurve::from_parameters([20, 20, 107, 107]);
        for x in [0.0, 0.1, 0.5, 0.9, 1.0] {
            assert!((curve.value(x) - x).abs() < 1e-4, "x={}", x);
        }
    }

    #[test]
    fn test_ease_in_starts_slow() {
        let curve = BezierCurve::new(Vec2::new(0.42, 0.0), Vec2::ONE);
        assert!(curve.value(0.25) < 0.25);
        assert!((curve.value(-1.0)).abs() < 1e-6);
        assert!((curve.value(2.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_value_solves_x_exactly() {
        // c0 = c1 = (1, 0)：x(t) = 1 - (1-t)³，y(t) = t³
        let curve = BezierCurve::from_parameters([127, 0, 127, 0]);
        for x in [0.1_f32, 0.5, 0.9] {
            let t = 1.0 - (1.0 - x).cbrt();
            let expected = t * t * t;
            assert!((curve.value(x) - expected).abs() < 1e-5, "x={} got={} expected={}", x, curve.value(x), expected);
        }
        // 两帧间隔的中点
        assert!((curve.value(0.5) - 0.00878).abs() < 1e-4);
    }

    #[test]
    fn test_flat_derivative_falls_back_to_bisection() {
        // x 方向在 t=0.5 附近导数接近 0
        let curve = BezierCurve::from_parameters([0, 127, 127, 0]);
        let y = curve.value(0.5);
        assert!(y.is_finite());
        assert!((0.0..=1.0).contains(&y));
    }

    #[test]
    fn test_cache_shares_curves() {
        let cache = BezierCurveCache::new();
        let a = cache.curve([64, 0, 64, 127]);
        let b = cache.curve([64, 0, 64, 127]);
        assert!(Arc::ptr_eq(&a, &b));
        cache.curve([10, 20, 30, 40]);
        assert_eq!(cache.len(), 2);
    }
}
