//! Positional input/output slots of the SpatialBN operators.

macro_rules! positional_tags {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub const COUNT: usize = Self::ALL.len();

            pub fn index(self) -> usize {
                self as usize
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

positional_tags! {
    /// Inputs of `SpatialBN`.
    ForwardInput {
        Input => "X",
        Scale => "scale",
        Bias => "bias",
        EstMean => "mean",
        EstVar => "var",
    }
}

positional_tags! {
    /// Outputs of `SpatialBN`. Test mode produces only `Output`.
    ForwardOutput {
        Output => "Y",
        RunningMean => "running_mean",
        RunningVar => "running_var",
        SavedMean => "saved_mean",
        SavedInvVar => "saved_inv_var",
    }
}

positional_tags! {
    /// Inputs of `SpatialBNGradient`.
    GradientInput {
        Input => "X",
        Scale => "scale",
        OutputGrad => "dY",
        SavedMean => "saved_mean",
        SavedInvVar => "saved_inv_var",
    }
}

positional_tags! {
    /// Outputs of `SpatialBNGradient`.
    GradientOutput {
        InputGrad => "dX",
        ScaleGrad => "dscale",
        BiasGrad => "dbias",
    }
}
