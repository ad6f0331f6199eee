//! Parameters exposed to the host

use data::UniformParameters;

/// Position of each parameter in the host's parameter list
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParamIndex {
    /// Layer that the effect is applied to
    Input = 0,

    /// Pivot slider
    Slider,
}
//
impl ParamIndex {
    /// Number of parameters, including the input layer
    pub const COUNT: usize = 2;
}

/// Number of decimals that the host displays for a slider
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Precision {
    Integer,
    Tenths,
    Hundredths,
    Thousandths,
}
//
impl Precision {
    /// Number of decimals
    pub fn decimals(self) -> usize {
        match self {
            Self::Integer => 0,
            Self::Tenths => 1,
            Self::Hundredths => 2,
            Self::Thousandths => 3,
        }
    }
}

/// Floating-point slider definition
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SliderDef {
    /// Name displayed by the host
    pub name: &'static str,

    /// Smallest value that the user can pick
    pub min: f64,

    /// Largest value that the user can pick
    pub max: f64,

    /// Initial value
    pub default: f64,

    /// Display precision
    pub precision: Precision,

    /// Identifier under which projects save this parameter
    pub disk_id: u32,
}
//
impl SliderDef {
    /// Bring a host-provided value into the slider's range
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }

    /// Summary of the slider, as registered with the host at `index`
    pub fn describe(&self, index: ParamIndex) -> String {
        let decimals = self.precision.decimals();
        format!(
            "#{} {:?} (disk id {}): default {:.*} in [{:.*}, {:.*}]",
            index as usize,
            self.name,
            self.disk_id,
            decimals,
            self.default,
            decimals,
            self.min,
            decimals,
            self.max,
        )
    }
}

/// Slider that controls how far colors move towards their negative
pub const PIVOT_SLIDER: SliderDef = SliderDef {
    name: "Pivot",
    min: 0.0,
    max: 1.0,
    default: 0.0,
    precision: Precision::Hundredths,
    disk_id: 1,
};

/// Sliders registered with the host, in parameter order after the input layer
pub const SLIDERS: [(ParamIndex, SliderDef); ParamIndex::COUNT - 1] =
    [(ParamIndex::Slider, PIVOT_SLIDER)];

/// Kernel parameters for a certain slider value
pub fn uniform_parameters(slider: f64) -> UniformParameters {
    UniformParameters {
        pivot: PIVOT_SLIDER.clamp(slider) as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pivot_slider() {
        assert_eq!(ParamIndex::Slider as usize + 1, ParamIndex::COUNT);
        assert_eq!(PIVOT_SLIDER.clamp(PIVOT_SLIDER.default), 0.0);
        assert_eq!(uniform_parameters(0.42).pivot, 0.42);
        assert_eq!(uniform_parameters(1.5).pivot, 1.0);
        assert_eq!(uniform_parameters(-0.1).pivot, 0.0);
        assert_eq!(uniform_parameters(f64::NAN).pivot, 0.0);
    }

    #[test]
    fn slider_registration() {
        for (position, (index, slider)) in SLIDERS.iter().enumerate() {
            assert_eq!(*index as usize, position + 1);
            assert!(slider.min <= slider.default && slider.default <= slider.max);
            assert!(SLIDERS[..position]
                .iter()
                .all(|(_, other)| other.disk_id != slider.disk_id));
        }
        assert_eq!(
            PIVOT_SLIDER.describe(ParamIndex::Slider),
            "#1 \"Pivot\" (disk id 1): default 0.00 in [0.00, 1.00]"
        );
        assert_eq!(Precision::Thousandths.decimals(), 3);
    }
}
