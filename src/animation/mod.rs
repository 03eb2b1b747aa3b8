//! 动画系统
//!
//! 关键帧、插值曲线、轨道与 Motion 采样

pub mod bezier_curve;
pub mod interpolation;
pub mod keyframe;
pub mod motion;
pub mod motion_track;

pub use bezier_curve::{BezierCurve, BezierCurveCache, BezierCurveFactory};
pub use interpolation::BoneKeyframeInterpolation;
pub use keyframe::{BoneKeyframe, IkKeyframe, MorphKeyframe};
pub use motion::{IkFrameState, Motion};
pub use motion_track::{BoneFrame, BoneMotionTrack, IkMotionTrack, Keyframe, MorphMotionTrack, Track};
