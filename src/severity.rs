/// Severity class of a country, derived from its confirmed case count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Green,
    Amber,
    Red,
}

/// Stroke and fill color of the heat circle, as CSS color strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeatColors {
    pub stroke: &'static str,
    pub fill: &'static str,
}

pub const HEAT_FILL_OPACITY: f32 = 0.5;

impl Severity {
    /// Exactly 100000 and 1000000 land in `Red`: the middle band is open on
    /// both ends.
    pub fn from_confirmed(confirmed: u64) -> Self {
        if confirmed < 100_000 {
            Severity::Green
        } else if confirmed > 100_000 && confirmed < 1_000_000 {
            Severity::Amber
        } else {
            Severity::Red
        }
    }

    pub fn colors(self) -> HeatColors {
        match self {
            Severity::Green => HeatColors { stroke: "#44ff00", fill: "green" },
            Severity::Amber => HeatColors { stroke: "orange", fill: "#ffb700" },
            Severity::Red => HeatColors { stroke: "red", fill: "#f03" },
        }
    }
}

pub fn heat_colors(confirmed: u64) -> HeatColors {
    Severity::from_confirmed(confirmed).colors()
}
