//! Narrowing of corrected integer values follows C cast semantics.

use proptest::prelude::*;
use qiap_model::{NativeType, Scalar};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_uint64_reinterprets_bits(value in any::<i64>()) {
        let Some(Scalar::UInt64(narrowed)) = Scalar::from_i64(value, NativeType::UInt64) else {
            panic!("uint64 narrowing must produce a uint64");
        };
        prop_assert_eq!(narrowed.to_ne_bytes(), value.to_ne_bytes());
    }

    #[test]
    fn prop_small_widths_truncate(value in any::<i64>()) {
        prop_assert_eq!(Scalar::from_i64(value, NativeType::Int8), Some(Scalar::Int8(value as i8)));
        prop_assert_eq!(Scalar::from_i64(value, NativeType::UInt16), Some(Scalar::UInt16(value as u16)));
        prop_assert_eq!(Scalar::from_i64(value, NativeType::Int32), Some(Scalar::Int32(value as i32)));
    }

    #[test]
    fn prop_non_integer_targets_rejected(value in any::<i64>()) {
        prop_assert!(Scalar::from_i64(value, NativeType::Double).is_none());
        prop_assert!(Scalar::from_i64(value, NativeType::String).is_none());
    }
}
