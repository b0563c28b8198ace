//! The identity facility.

use std::marker::PhantomData;

use super::{Codecvt, ConvState, Conversion};
use crate::unit::CharUnit;

/// Facility that performs no conversion at all.
///
/// Binding it to a stream is equivalent to binding nothing: the engine sees
/// `always_noconv` and takes the identity paths, writing each unit as its raw
/// little-endian bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConv<C> {
    _unit: PhantomData<fn() -> C>,
}

impl<C> NoConv<C> {
    #[must_use]
    pub const fn new() -> Self {
        Self { _unit: PhantomData }
    }
}

impl<C: CharUnit> Codecvt<C> for NoConv<C> {
    fn decode(&self, _state: &mut ConvState, _from: &[u8], _to: &mut [C]) -> Conversion {
        Conversion::noconv()
    }

    fn encode(&self, _state: &mut ConvState, _from: &[C], _to: &mut [u8]) -> Conversion {
        Conversion::noconv()
    }

    fn unshift(&self, _state: &mut ConvState, _to: &mut [u8]) -> Conversion {
        Conversion::noconv()
    }

    fn always_noconv(&self) -> bool {
        true
    }

    fn max_length(&self) -> usize {
        C::WIDTH
    }

    fn encoding_name(&self) -> &str {
        "identity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecvt::ConvResult;

    #[test]
    fn every_call_reports_noconv() {
        let cvt = NoConv::<u16>::new();
        let mut state = ConvState::initial();
        let mut units = [0u16; 1];
        let mut bytes = [0u8; 4];
        assert_eq!(
            cvt.decode(&mut state, b"ab", &mut units).result,
            ConvResult::NoConv
        );
        assert_eq!(
            cvt.encode(&mut state, &[7], &mut bytes).result,
            ConvResult::NoConv
        );
        assert_eq!(cvt.unshift(&mut state, &mut bytes).result, ConvResult::NoConv);
        assert!(cvt.always_noconv());
        assert_eq!(cvt.max_length(), 2);
    }
}
