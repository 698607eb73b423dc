/// Linear blend of the two similarity signals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendWeights {
    pub lexical: f32,
    pub dense: f32,
}

impl BlendWeights {
    pub const DEFAULT: Self = Self {
        lexical: 0.3,
        dense: 0.7,
    };

    #[must_use]
    pub fn blend(self, lexical: f32, dense: f32) -> f32 {
        self.lexical.mul_add(lexical, self.dense * dense)
    }
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}
