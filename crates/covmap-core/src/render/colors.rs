use once_cell::sync::Lazy;

#[derive(Debug, Clone, Copy)]
pub struct ColorStop {
    pub at: f64,
    pub rgb: (u8, u8, u8),
}

/// A piecewise-linear RGB ramp over [0, 1].
#[derive(Debug, Clone)]
pub struct ColorRamp {
    stops: Vec<ColorStop>,
}

static VIRIDIS: Lazy<ColorRamp> = Lazy::new(|| {
    ColorRamp::new(vec![
        ColorStop { at: 0.0, rgb: (68, 1, 84) },
        ColorStop { at: 0.111, rgb: (72, 40, 120) },
        ColorStop { at: 0.222, rgb: (62, 74, 137) },
        ColorStop { at: 0.333, rgb: (49, 104, 142) },
        ColorStop { at: 0.444, rgb: (38, 130, 142) },
        ColorStop { at: 0.556, rgb: (31, 158, 137) },
        ColorStop { at: 0.667, rgb: (53, 183, 121) },
        ColorStop { at: 0.778, rgb: (109, 205, 89) },
        ColorStop { at: 0.889, rgb: (180, 222, 44) },
        ColorStop { at: 1.0, rgb: (253, 231, 37) },
    ])
});

// Hand-tuned against the distribution of county deaths-to-population:
// near-black through the median, ramping to red only in the long tail.
static MORTALITY: Lazy<ColorRamp> = Lazy::new(|| {
    ColorRamp::new(vec![
        ColorStop { at: 0.0, rgb: (0, 0, 0) },
        ColorStop { at: 0.01, rgb: (0, 51, 51) },
        ColorStop { at: 0.05, rgb: (102, 102, 102) },
        ColorStop { at: 0.07, rgb: (153, 51, 51) },
        ColorStop { at: 0.09, rgb: (204, 51, 0) },
        ColorStop { at: 0.75, rgb: (255, 0, 0) },
        ColorStop { at: 1.0, rgb: (255, 0, 0) },
    ])
});

impl ColorRamp {
    pub fn new(stops: Vec<ColorStop>) -> Self {
        debug_assert!(stops.len() >= 2);
        Self { stops }
    }

    pub fn viridis() -> &'static ColorRamp {
        &VIRIDIS
    }

    pub fn mortality() -> &'static ColorRamp {
        &MORTALITY
    }

    /// Sample the ramp at `t`, clamped to [0, 1].
    pub fn sample(&self, t: f64) -> (u8, u8, u8) {
        let t = t.clamp(0.0, 1.0);
        let mut lower = self.stops[0];
        for stop in &self.stops[1..] {
            if t <= stop.at {
                let span = stop.at - lower.at;
                let frac = if span > 0.0 { (t - lower.at) / span } else { 0.0 };
                return (
                    lerp(lower.rgb.0, stop.rgb.0, frac),
                    lerp(lower.rgb.1, stop.rgb.1, frac),
                    lerp(lower.rgb.2, stop.rgb.2, frac),
                );
            }
            lower = *stop;
        }
        self.stops[self.stops.len() - 1].rgb
    }
}

fn lerp(a: u8, b: u8, t: f64) -> u8 {
    (a as f64 + (b as f64 - a as f64) * t).round() as u8
}

#[cfg(test)]
mod unit {
    use super::*;

    #[test]
    fn ramp_endpoints_are_exact() {
        assert_eq!(ColorRamp::viridis().sample(0.0), (68, 1, 84));
        assert_eq!(ColorRamp::viridis().sample(1.0), (253, 231, 37));
        assert_eq!(ColorRamp::mortality().sample(0.0), (0, 0, 0));
    }

    #[test]
    fn out_of_range_values_clamp() {
        assert_eq!(ColorRamp::viridis().sample(-3.0), (68, 1, 84));
        assert_eq!(ColorRamp::mortality().sample(7.5), (255, 0, 0));
    }

    #[test]
    fn interpolation_is_linear_between_stops() {
        // midway between (0,51,51) at 0.01 and (102,102,102) at 0.05
        assert_eq!(ColorRamp::mortality().sample(0.03), (51, 77, 77));
    }
}
