//! Populate: decoded records into plain domain objects
//!
//! Domain types implement [`FromCore`] for the core type they mirror. Slots
//! unwrap to their value, containers convert element-wise, map keys go
//! through their wire strings, and numeric conversions are range-checked.

use std::any::type_name;

use crate::ast::NodeRef;
use crate::error::{BindError, Result};
use crate::record::{Model, Record};
use crate::sequenced_map::{MapKey, SequencedMap};
use crate::slot::Slot;

/// Build `Self` from a decoded core value
pub trait FromCore<C>: Sized {
    fn from_core(core: &C) -> Result<Self>;
}

macro_rules! identity {
    ($($ty:ty),*) => {$(
        impl FromCore<$ty> for $ty {
            fn from_core(core: &$ty) -> Result<Self> {
                Ok(core.clone())
            }
        }
    )*};
}

identity!(String, bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, NodeRef);

macro_rules! narrow_int {
    ($core:ty => $($ty:ty),*) => {$(
        impl FromCore<$core> for $ty {
            fn from_core(core: &$core) -> Result<Self> {
                <$ty>::try_from(*core)
                    .map_err(|_| BindError::conversion(stringify!($core), stringify!($ty), core))
            }
        }
    )*};
}

narrow_int!(i64 => i8, i16, i32, isize, u8, u16, u32, u64, usize);
narrow_int!(u64 => i64, u32, usize);

impl FromCore<f64> for f32 {
    fn from_core(core: &f64) -> Result<Self> {
        Ok(*core as f32)
    }
}

impl FromCore<f32> for f64 {
    fn from_core(core: &f32) -> Result<Self> {
        Ok(f64::from(*core))
    }
}

impl<C, D: FromCore<C>> FromCore<Slot<C>> for D {
    fn from_core(core: &Slot<C>) -> Result<Self> {
        D::from_core(&core.value)
    }
}

impl<C, D: FromCore<C>> FromCore<Option<C>> for Option<D> {
    fn from_core(core: &Option<C>) -> Result<Self> {
        core.as_ref().map(D::from_core).transpose()
    }
}

impl<C, D: FromCore<C>> FromCore<Vec<C>> for Vec<D> {
    fn from_core(core: &Vec<C>) -> Result<Self> {
        core.iter().map(D::from_core).collect()
    }
}

impl<KC, VC, KD, VD> FromCore<SequencedMap<KC, VC>> for SequencedMap<KD, VD>
where
    KC: MapKey,
    KD: MapKey,
    VD: FromCore<VC>,
{
    fn from_core(core: &SequencedMap<KC, VC>) -> Result<Self> {
        let mut map = SequencedMap::new();
        if core.is_initialized() {
            map.init();
        }
        for (key, value) in core.iter() {
            let wire = key.to_wire();
            let key = KD::from_wire(&wire)
                .map_err(|_| BindError::conversion(type_name::<KC>(), type_name::<KD>(), &wire))?;
            map.set(key, VD::from_core(value)?);
        }
        Ok(map)
    }
}

/// Populate a domain model from its decoded record
pub fn populate<M>(core: &M::Core) -> Result<M>
where
    M: Model + FromCore<<M as Model>::Core>,
{
    let span = tracing::debug_span!("populate", ty = crate::decode::short_type_name::<M>());
    let _guard = span.enter();
    if core.meta().root_node.is_none() {
        tracing::debug!("populating from a record that was never decoded");
    }
    M::from_core(core)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_unwrap_to_values() {
        let slot = Slot::detached(7i64);
        let value: u8 = FromCore::from_core(&slot).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn narrowing_is_range_checked() {
        let err = <u8 as FromCore<i64>>::from_core(&300).unwrap_err();
        assert_eq!(err.to_string(), "[BIND-002] Cannot convert i64 '300' to u8");
        assert!(<u32 as FromCore<i64>>::from_core(&-1).is_err());
        assert_eq!(<i32 as FromCore<i64>>::from_core(&-5).unwrap(), -5);
    }

    #[test]
    fn float_narrowing_is_allowed() {
        let value = <f32 as FromCore<f64>>::from_core(&1.25).unwrap();
        assert_eq!(value, 1.25f32);
    }

    #[test]
    fn containers_convert_elementwise() {
        let core = vec![Some(1i64), None, Some(3)];
        let domain: Vec<Option<u16>> = FromCore::from_core(&core).unwrap();
        assert_eq!(domain, vec![Some(1), None, Some(3)]);

        let bad = vec![1i64, -4];
        assert!(<Vec<u16> as FromCore<Vec<i64>>>::from_core(&bad).is_err());
    }

    #[test]
    fn map_keys_convert_through_wire_form() {
        let mut core: SequencedMap<String, i64> = SequencedMap::new();
        core.set("200".to_string(), 1);
        core.set("404".to_string(), 2);

        let domain: SequencedMap<i64, i32> = FromCore::from_core(&core).unwrap();
        assert_eq!(domain.keys().copied().collect::<Vec<_>>(), vec![200, 404]);

        core.set("default".to_string(), 3);
        let err = <SequencedMap<i64, i32> as FromCore<_>>::from_core(&core).unwrap_err();
        assert!(matches!(err, BindError::Conversion { .. }));
    }

    #[test]
    fn initialized_state_survives() {
        let core: SequencedMap<String, i64> = SequencedMap::empty();
        let domain: SequencedMap<String, i64> = FromCore::from_core(&core).unwrap();
        assert!(domain.is_initialized());

        let absent: SequencedMap<String, i64> = SequencedMap::new();
        let domain: SequencedMap<String, i64> = FromCore::from_core(&absent).unwrap();
        assert!(!domain.is_initialized());
    }
}
