//! Raster element trait for generic cell values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// On-disk sample layout of an element type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

/// Trait for types that can be stored in a raster cell.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Sample layout used when the element is written to a GeoTIFF
    const SAMPLE_TYPE: SampleType;

    /// No-data value used when a raster does not declare one
    fn default_nodata() -> Self;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }

    /// Convert from f64, rounding and saturating for integer types.
    ///
    /// Returns `None` for NaN into an integer type.
    fn from_f64(value: f64) -> Option<Self>;
}

macro_rules! impl_raster_element_int {
    ($t:ty, $sample:ident) => {
        impl RasterElement for $t {
            const SAMPLE_TYPE: SampleType = SampleType::$sample;

            fn default_nodata() -> Self {
                <$t>::MIN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata == Some(*self)
            }

            fn from_f64(value: f64) -> Option<Self> {
                if value.is_nan() {
                    return None;
                }
                let clamped = value.round().clamp(<$t>::MIN as f64, <$t>::MAX as f64);
                NumCast::from(clamped)
            }
        }
    };
}

macro_rules! impl_raster_element_float {
    ($t:ty, $sample:ident) => {
        impl RasterElement for $t {
            const SAMPLE_TYPE: SampleType = SampleType::$sample;

            fn default_nodata() -> Self {
                <$t>::NAN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) => (self - nd).abs() < <$t>::EPSILON * 100.0,
                    None => false,
                }
            }

            fn from_f64(value: f64) -> Option<Self> {
                Some(value as $t)
            }
        }
    };
}

impl_raster_element_int!(i8, I8);
impl_raster_element_int!(i16, I16);
impl_raster_element_int!(i32, I32);
impl_raster_element_int!(i64, I64);
impl_raster_element_int!(u8, U8);
impl_raster_element_int!(u16, U16);
impl_raster_element_int!(u32, U32);
impl_raster_element_int!(u64, U64);
impl_raster_element_float!(f32, F32);
impl_raster_element_float!(f64, F64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_from_f64_rounds_and_saturates() {
        assert_eq!(u8::from_f64(2.6), Some(3));
        assert_eq!(u8::from_f64(300.0), Some(255));
        assert_eq!(i16::from_f64(-1.0e9), Some(i16::MIN));
        assert_eq!(u8::from_f64(f64::NAN), None);
    }

    #[test]
    fn test_float_nodata() {
        assert!(f32::NAN.is_nodata(None));
        assert!((-9999.0f64).is_nodata(Some(-9999.0)));
        assert!(!0u8.is_nodata(None));
        assert!(0u8.is_nodata(Some(0)));
    }
}
