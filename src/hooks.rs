//! Custom decode/sync hooks
//!
//! - [`Plain`]: a serde struct decoded 1:1 by field name, without field
//!   descriptors, validity tracking or extensions
//! - [`Either`]: a union that tries the left type first and falls back to
//!   the right one when the node's shape does not fit

use std::ops::{Deref, DerefMut};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ast::{self, NodeRef};
use crate::decode::{short_type_name, Bind, Decoded, Decoder, Shape};
use crate::error::Result;
use crate::errors::ValidationError;
use crate::populate::FromCore;
use crate::sync::{Source, SyncCore, SyncCtx};

/// Serde-backed value, used on both the core and the domain side
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plain<T>(pub T);

impl<T> Plain<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Plain<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Plain<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> Bind for Plain<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + PartialEq + Send + Sync + 'static,
{
    const SHAPE: Shape = Shape::Plain;

    fn decode(_ctx: &Decoder<'_>, node: &NodeRef) -> Result<Decoded<Self>> {
        let value = ast::to_value(node)?;
        match serde_yaml::from_value::<T>(value) {
            Ok(decoded) => Ok((Plain(decoded), Vec::new())),
            Err(err) => Ok((
                Plain::default(),
                vec![ValidationError::type_mismatch(
                    format!("cannot decode into {}: {}", short_type_name::<T>(), err),
                    node,
                )],
            )),
        }
    }

    fn is_empty_value(&self) -> bool {
        self.0 == T::default()
    }
}

impl<T: Clone> FromCore<Plain<T>> for Plain<T> {
    fn from_core(core: &Plain<T>) -> Result<Self> {
        Ok(core.clone())
    }
}

impl<T: PartialEq + Default> Source for Plain<T> {
    fn is_unset(&self) -> bool {
        self.0 == T::default()
    }
}

impl<T> SyncCore<Plain<T>> for Plain<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + PartialEq + Send + Sync + 'static,
{
    fn sync_core(&mut self, _ctx: &SyncCtx<'_>, core: &mut Plain<T>, prior: Option<&NodeRef>) -> Result<Option<NodeRef>> {
        let value = serde_yaml::to_value(&self.0)?;
        *core = self.clone();
        if let Some(prior) = prior {
            if ast::to_value(prior).ok().as_ref() == Some(&value) {
                return Ok(Some(prior.clone()));
            }
        }
        Ok(Some(ast::from_value(&value)))
    }
}

/// Two-way union
#[derive(Debug, Clone, PartialEq)]
pub enum Either<L, R> {
    Left(L),
    Right(R),
}

impl<L: Default, R> Default for Either<L, R> {
    fn default() -> Self {
        Either::Left(L::default())
    }
}

impl<L, R> Either<L, R> {
    pub fn left(&self) -> Option<&L> {
        match self {
            Either::Left(l) => Some(l),
            Either::Right(_) => None,
        }
    }

    pub fn right(&self) -> Option<&R> {
        match self {
            Either::Left(_) => None,
            Either::Right(r) => Some(r),
        }
    }
}

fn fits(errors: &[ValidationError]) -> bool {
    !errors.iter().any(|e| e.is_type_mismatch() && !e.nested)
}

impl<L: Bind, R: Bind> Bind for Either<L, R> {
    const SHAPE: Shape = Shape::Union;

    fn decode(ctx: &Decoder<'_>, node: &NodeRef) -> Result<Decoded<Self>> {
        let (left, left_errors) = L::decode(ctx, node)?;
        if fits(&left_errors) {
            return Ok((Either::Left(left), left_errors));
        }
        let (right, right_errors) = R::decode(ctx, node)?;
        if fits(&right_errors) {
            return Ok((Either::Right(right), right_errors));
        }
        Ok((Either::Left(left), left_errors))
    }

    fn root_node(&self) -> Option<NodeRef> {
        match self {
            Either::Left(l) => l.root_node(),
            Either::Right(r) => r.root_node(),
        }
    }

    fn is_empty_value(&self) -> bool {
        match self {
            Either::Left(l) => l.is_empty_value(),
            Either::Right(r) => r.is_empty_value(),
        }
    }
}

impl<CL, CR, DL, DR> FromCore<Either<CL, CR>> for Either<DL, DR>
where
    DL: FromCore<CL>,
    DR: FromCore<CR>,
{
    fn from_core(core: &Either<CL, CR>) -> Result<Self> {
        Ok(match core {
            Either::Left(l) => Either::Left(DL::from_core(l)?),
            Either::Right(r) => Either::Right(DR::from_core(r)?),
        })
    }
}

impl<L: Source, R: Source> Source for Either<L, R> {
    fn is_unset(&self) -> bool {
        match self {
            Either::Left(l) => l.is_unset(),
            Either::Right(r) => r.is_unset(),
        }
    }

    fn identity(&self) -> Option<NodeRef> {
        match self {
            Either::Left(l) => l.identity(),
            Either::Right(r) => r.identity(),
        }
    }
}

impl<CL, CR, DL, DR> SyncCore<Either<CL, CR>> for Either<DL, DR>
where
    CL: Bind,
    CR: Bind,
    DL: SyncCore<CL>,
    DR: SyncCore<CR>,
{
    fn sync_core(
        &mut self,
        ctx: &SyncCtx<'_>,
        core: &mut Either<CL, CR>,
        prior: Option<&NodeRef>,
    ) -> Result<Option<NodeRef>> {
        match self {
            Either::Left(source) => {
                if let Either::Left(target) = core {
                    return source.sync_core(ctx, target, prior);
                }
                let mut target = ctx.create::<CL>();
                let node = source.sync_core(ctx, &mut target, prior)?;
                *core = Either::Left(target);
                Ok(node)
            }
            Either::Right(source) => {
                if let Either::Right(target) = core {
                    return source.sync_core(ctx, target, prior);
                }
                let mut target = ctx.create::<CR>();
                let node = source.sync_core(ctx, &mut target, prior)?;
                *core = Either::Right(target);
                Ok(node)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::load_str;
    use crate::registry::Registry;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Server {
        url: String,
        #[serde(default)]
        port: u16,
    }

    fn decode_text<T: Bind>(text: &str) -> Decoded<T> {
        let registry = Registry::new();
        Decoder::new(&registry).decode_str::<T>(text).unwrap()
    }

    #[test]
    fn plain_decodes_by_field_name() {
        let (server, errors) = decode_text::<Plain<Server>>("url: https://example.com\nport: 8080\n");
        assert!(errors.is_empty());
        assert_eq!(server.url, "https://example.com");
        assert_eq!(server.port, 8080);
    }

    #[test]
    fn plain_shape_errors_are_mismatches() {
        let (server, errors) = decode_text::<Plain<Server>>("just text");
        assert_eq!(server, Plain::default());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_type_mismatch());
    }

    #[test]
    fn plain_sync_keeps_unchanged_nodes() {
        let node = load_str("url: u\nport: 1\n").unwrap().content()[0].clone();
        let ctx = SyncCtx::default();
        let mut core = Plain::default();

        let mut same = Plain(Server { url: "u".into(), port: 1 });
        assert!(same.sync_core(&ctx, &mut core, Some(&node)).unwrap().unwrap().ptr_eq(&node));

        let mut changed = Plain(Server { url: "v".into(), port: 1 });
        let out = changed.sync_core(&ctx, &mut core, Some(&node)).unwrap().unwrap();
        assert!(!out.ptr_eq(&node));
        assert_eq!(out.get("url").unwrap().1.value(), "v");
        assert_eq!(core.url, "v");
    }

    #[test]
    fn either_falls_back_on_shape_mismatch() {
        let (flag, errors) = decode_text::<Either<bool, Vec<String>>>("true");
        assert!(errors.is_empty());
        assert_eq!(flag, Either::Left(true));

        let (list, errors) = decode_text::<Either<bool, Vec<String>>>("- a\n- b\n");
        assert!(errors.is_empty());
        assert_eq!(list.right().map(Vec::len), Some(2));
    }

    #[test]
    fn either_reports_left_errors_when_nothing_fits() {
        let (value, errors) = decode_text::<Either<bool, Vec<String>>>("a: 1\n");
        assert_eq!(value, Either::Left(false));
        assert_eq!(errors.len(), 1);
    }
}
