use serde::Serialize;

/// Classification of a tracker's signed year-end overcount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UndercountSeverity {
    Exact,
    Over,
    Mild,
    Big,
    Huge,
}

impl UndercountSeverity {
    pub fn classify(final_overcount: i64) -> Self {
        match final_overcount {
            0 => Self::Exact,
            value if value > 0 => Self::Over,
            -1 => Self::Mild,
            -2 => Self::Big,
            _ => Self::Huge,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Over => "over",
            Self::Mild => "mild",
            Self::Big => "big",
            Self::Huge => "huge",
        }
    }

    pub const fn is_undercount(self) -> bool {
        matches!(self, Self::Mild | Self::Big | Self::Huge)
    }
}
