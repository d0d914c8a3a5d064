use serde::{Deserialize, Deserializer};

/// Number of `f_rest_*` properties for the highest supported SH degree.
pub(crate) const MAX_REST_COEFFS: usize = 45;

fn de_quant<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Dequant;
    impl serde::de::Visitor<'_> for Dequant {
        type Value = Option<f32>;
        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a quantized value or a float")
        }
        fn visit_f32<E>(self, value: f32) -> Result<Option<f32>, E> {
            Ok(Some(value))
        }
        fn visit_f64<E>(self, value: f64) -> Result<Option<f32>, E> {
            Ok(Some(value as f32))
        }
        fn visit_u8<E>(self, value: u8) -> Result<Option<f32>, E> {
            Ok(Some(f32::from(value) / f32::from(u8::MAX)))
        }
        fn visit_u16<E>(self, value: u16) -> Result<Option<f32>, E> {
            Ok(Some(f32::from(value) / f32::from(u16::MAX)))
        }
    }
    deserializer.deserialize_any(Dequant)
}

macro_rules! ply_gaussian {
    ($($rest:ident),* $(,)?) => {
        /// One row of the `vertex` element of a 3DGS style ply file. Values are still encoded:
        /// log scales, logit opacity and planar SH.
        #[derive(Deserialize, Default)]
        #[serde(default)]
        pub(crate) struct PlyGaussian {
            pub(crate) x: f32,
            pub(crate) y: f32,
            pub(crate) z: f32,

            pub(crate) scale_0: f32,
            pub(crate) scale_1: f32,
            pub(crate) scale_2: f32,
            pub(crate) opacity: f32,
            pub(crate) rot_0: f32,
            pub(crate) rot_1: f32,
            pub(crate) rot_2: f32,
            pub(crate) rot_3: f32,

            pub(crate) f_dc_0: f32,
            pub(crate) f_dc_1: f32,
            pub(crate) f_dc_2: f32,

            $(pub(crate) $rest: f32,)*

            // Color overrides. Potentially quantized.
            #[serde(alias = "r", deserialize_with = "de_quant")]
            pub(crate) red: Option<f32>,
            #[serde(alias = "g", deserialize_with = "de_quant")]
            pub(crate) green: Option<f32>,
            #[serde(alias = "b", deserialize_with = "de_quant")]
            pub(crate) blue: Option<f32>,
        }

        impl PlyGaussian {
            /// Higher order SH, planar per channel.
            pub(crate) fn sh_rest_coeffs(&self) -> [f32; MAX_REST_COEFFS] {
                [$(self.$rest),*]
            }
        }
    };
}

ply_gaussian!(
    f_rest_0, f_rest_1, f_rest_2, f_rest_3, f_rest_4, f_rest_5, f_rest_6, f_rest_7, f_rest_8,
    f_rest_9, f_rest_10, f_rest_11, f_rest_12, f_rest_13, f_rest_14, f_rest_15, f_rest_16,
    f_rest_17, f_rest_18, f_rest_19, f_rest_20, f_rest_21, f_rest_22, f_rest_23, f_rest_24,
    f_rest_25, f_rest_26, f_rest_27, f_rest_28, f_rest_29, f_rest_30, f_rest_31, f_rest_32,
    f_rest_33, f_rest_34, f_rest_35, f_rest_36, f_rest_37, f_rest_38, f_rest_39, f_rest_40,
    f_rest_41, f_rest_42, f_rest_43, f_rest_44,
);

impl PlyGaussian {
    pub(crate) fn is_finite(&self) -> bool {
        [
            self.x,
            self.y,
            self.z,
            self.scale_0,
            self.scale_1,
            self.scale_2,
            self.opacity,
            self.rot_0,
            self.rot_1,
            self.rot_2,
            self.rot_3,
            self.f_dc_0,
            self.f_dc_1,
            self.f_dc_2,
        ]
        .iter()
        .chain(&self.sh_rest_coeffs())
        .all(|v| v.is_finite())
    }
}
