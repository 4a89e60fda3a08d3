use core::num::NonZeroU64;

use easy_ext::ext;
use typenum::{NonZero, Unsigned};

#[ext(NonZeroExt)]
pub impl<N: Unsigned + NonZero> N {
    #[inline]
    #[must_use]
    fn non_zero() -> NonZeroU64 {
        NonZeroU64::new(Self::U64).expect("the bound on N ensures that it is nonzero")
    }
}

#[ext(U64Ext)]
pub impl u64 {
    #[inline]
    #[must_use]
    fn is_multiple_of_non_zero(self, factor: NonZeroU64) -> bool {
        self % factor == 0
    }

    #[inline]
    #[must_use]
    fn prev_multiple_of(self, factor: NonZeroU64) -> Self {
        self - self % factor
    }

    #[inline]
    #[must_use]
    fn div_typenum<N: Unsigned + NonZero>(self) -> Self {
        self / N::U64
    }

    #[inline]
    #[must_use]
    fn mod_typenum<N: Unsigned + NonZero>(self) -> Self {
        self % N::U64
    }

    /// Integer square root as defined by `integer_squareroot` in `consensus-specs`.
    #[inline]
    #[must_use]
    fn integer_sqrt(self) -> Self {
        self.isqrt()
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use typenum::{U32, U8};

    use super::*;

    #[test_case(0, 8 => true)]
    #[test_case(7, 8 => false)]
    #[test_case(64, 8 => true)]
    fn is_multiple_of_non_zero(value: u64, factor: u64) -> bool {
        let factor = NonZeroU64::new(factor).expect("factors in test cases are nonzero");
        value.is_multiple_of_non_zero(factor)
    }

    #[test]
    fn typenum_division_matches_plain_division() {
        assert_eq!(100.div_typenum::<U32>(), 3);
        assert_eq!(100.mod_typenum::<U32>(), 4);
        assert_eq!(U8::non_zero().get(), 8);
    }

    #[test_case(0 => 0)]
    #[test_case(15 => 3)]
    #[test_case(16 => 4)]
    #[test_case(u64::MAX => 4_294_967_295)]
    fn integer_sqrt(value: u64) -> u64 {
        value.integer_sqrt()
    }

    #[test]
    fn prev_multiple_of_rounds_down() {
        let increment = NonZeroU64::new(1_000_000_000).expect("increment is nonzero");
        assert_eq!(32_500_000_000_u64.prev_multiple_of(increment), 32_000_000_000);
    }
}
