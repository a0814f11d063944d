//! Per-property interpolation advanced manually each frame.
//!
//! Scenes own their tweens directly, so `dispose` can halt every in-flight
//! animation deterministically with [`Tween::cancel`].

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Easing {
    #[default]
    Linear,
    QuadOut,
    CubicInOut,
    SineInOut,
}

impl Easing {
    #[inline]
    pub fn ease(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::QuadOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Easing::SineInOut => -((std::f32::consts::PI * t).cos() - 1.0) / 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tween {
    value: f32,
    from: f32,
    to: f32,
    duration: f32,
    elapsed: f32,
    easing: Easing,
    active: bool,
}

impl Tween {
    pub const fn new(value: f32) -> Self {
        Self {
            value,
            from: value,
            to: value,
            duration: 0.0,
            elapsed: 0.0,
            easing: Easing::Linear,
            active: false,
        }
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start moving from the current value towards `target`.
    ///
    /// Re-targeting to the value already being approached (or already
    /// reached) is a no-op so callers can invoke this every frame without
    /// restarting the curve.
    pub fn animate_to(&mut self, target: f32, duration_sec: f32, easing: Easing) {
        if (self.to - target).abs() < f32::EPSILON {
            return;
        }
        if duration_sec <= 0.0 {
            self.set(target);
            return;
        }
        self.from = self.value;
        self.to = target;
        self.duration = duration_sec;
        self.elapsed = 0.0;
        self.easing = easing;
        self.active = true;
    }

    /// Jump immediately, cancelling any animation.
    pub fn set(&mut self, value: f32) {
        self.value = value;
        self.from = value;
        self.to = value;
        self.active = false;
    }

    /// Halt where it is.
    pub fn cancel(&mut self) {
        self.to = self.value;
        self.active = false;
    }

    pub fn advance(&mut self, dt_sec: f32) -> f32 {
        if !self.active {
            return self.value;
        }
        self.elapsed += dt_sec.max(0.0);
        let t = self.elapsed / self.duration;
        if t >= 1.0 {
            self.value = self.to;
            self.active = false;
        } else {
            self.value = self.from + (self.to - self.from) * self.easing.ease(t);
        }
        self.value
    }
}

impl Default for Tween {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaches_target_after_duration() {
        let mut tw = Tween::new(0.0);
        tw.animate_to(1.0, 0.5, Easing::CubicInOut);
        tw.advance(0.25);
        assert!((tw.value() - 0.5).abs() < 1e-5);
        tw.advance(0.3);
        assert_eq!(tw.value(), 1.0);
        assert!(!tw.is_active());
    }

    #[test]
    fn cancel_freezes_value() {
        let mut tw = Tween::new(0.0);
        tw.animate_to(10.0, 1.0, Easing::Linear);
        tw.advance(0.3);
        tw.cancel();
        let frozen = tw.value();
        tw.advance(1.0);
        assert_eq!(tw.value(), frozen);
    }

    #[test]
    fn retargeting_a_settled_value_stays_idle() {
        let mut tw = Tween::new(0.5);
        tw.animate_to(0.5, 1.0, Easing::QuadOut);
        assert!(!tw.is_active());
        tw.animate_to(1.0, 1.0, Easing::QuadOut);
        tw.advance(0.5);
        let mid = tw.value();
        tw.animate_to(1.0, 1.0, Easing::QuadOut);
        tw.advance(0.0);
        assert_eq!(tw.value(), mid);
    }

    #[test]
    fn easing_endpoints_are_fixed() {
        for e in [
            Easing::Linear,
            Easing::QuadOut,
            Easing::CubicInOut,
            Easing::SineInOut,
        ] {
            assert!(e.ease(0.0).abs() < 1e-6);
            assert!((e.ease(1.0) - 1.0).abs() < 1e-6);
        }
    }
}
