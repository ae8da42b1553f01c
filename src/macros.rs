//! Declaration macros
//!
//! `record!` declares the wire layout of a core record, `model!` ties a
//! plain domain struct to its core, and `string_enum!` declares a closed
//! set of wire strings. Together they generate the per-type decode,
//! populate and sync implementations.

/// Declare the field table of a core record
///
/// The struct must have a `meta: RecordMeta` field and one `Slot<T>` per
/// listed field. A field is required unless its type is optional, a
/// sequence or a map; `(required)` / `(optional)` override that.
///
/// ```ignore
/// record! {
///     InfoCore {
///         title: "title",
///         version: "version" (required),
///         summary: "summary",
///     }
///     extensions: extensions;
/// }
/// ```
#[macro_export]
macro_rules! record {
    (@required) => {
        ::core::option::Option::None
    };
    (@required required) => {
        ::core::option::Option::Some(true)
    };
    (@required optional) => {
        ::core::option::Option::Some(false)
    };
    (
        $ty:ident {
            $( $field:ident : $key:literal $( ( $flag:ident ) )? ),* $(,)?
        }
        $( extensions : $ext:ident ; )?
        $( embedded : $emb:ident ; )?
    ) => {
        impl $crate::Bind for $ty {
            const SHAPE: $crate::Shape = $crate::Shape::Record;

            fn decode(
                ctx: &$crate::Decoder<'_>,
                node: &$crate::ast::NodeRef,
            ) -> $crate::Result<$crate::Decoded<Self>> {
                $crate::record::decode_record::<Self>(ctx, node)
            }

            fn root_node(&self) -> ::core::option::Option<$crate::ast::NodeRef> {
                ::core::clone::Clone::clone(&self.meta.root_node)
            }

            fn is_empty_value(&self) -> bool {
                self.meta.root_node.is_none()
            }
        }

        impl $crate::Record for $ty {
            fn meta(&self) -> &$crate::RecordMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut $crate::RecordMeta {
                &mut self.meta
            }

            fn field_defs() -> ::std::vec::Vec<$crate::registry::FieldDef<Self>> {
                ::std::vec![
                    $(
                        $crate::registry::FieldDef::value(
                            stringify!($field),
                            $key,
                            $crate::record!(@required $( $flag )?),
                            |r: &Self| &r.$field,
                            |r: &mut Self| &mut r.$field,
                        ),
                    )*
                    $(
                        $crate::registry::FieldDef::extensions(
                            stringify!($ext),
                            |r: &Self| &r.$ext,
                            |r: &mut Self| &mut r.$ext,
                        ),
                    )?
                ]
            }

            $(
                fn embedded_def() -> ::core::option::Option<
                    ::std::boxed::Box<dyn $crate::registry::EmbeddedAccess<Self>>,
                > {
                    ::core::option::Option::Some(::std::boxed::Box::new(
                        $crate::registry::EmbeddedDef::new(
                            stringify!($emb),
                            |r: &Self| &r.$emb,
                            |r: &mut Self| &mut r.$emb,
                        ),
                    ))
                }
            )?
        }
    };
}

/// Tie a domain struct to its core record
///
/// The domain struct must derive `Default`, hold its record in a `core`
/// field and name its fields like the core's. Fields not listed keep their
/// default on populate and are ignored by sync.
#[macro_export]
macro_rules! model {
    (
        $ty:ident => $core:ident {
            $( $field:ident ),* $(,)?
        }
        $( extensions : $ext:ident ; )?
        $( embedded : $emb:ident ; )?
    ) => {
        impl $crate::FromCore<$core> for $ty {
            #[allow(clippy::needless_update)]
            fn from_core(core: &$core) -> $crate::Result<Self> {
                ::core::result::Result::Ok(Self {
                    $( $field: $crate::FromCore::from_core(&core.$field)?, )*
                    $( $ext: $crate::FromCore::from_core(&core.$ext)?, )?
                    $( $emb: $crate::FromCore::from_core(&core.$emb)?, )?
                    core: ::core::clone::Clone::clone(core),
                    ..::core::default::Default::default()
                })
            }
        }

        impl $crate::sync::Source for $ty {
            fn is_unset(&self) -> bool {
                true
                    $( && $crate::sync::Source::is_unset(&self.$field) )*
                    $( && $crate::sync::Source::is_unset(&self.$ext) )?
                    $( && $crate::sync::Source::is_unset(&self.$emb) )?
            }

            fn identity(&self) -> ::core::option::Option<$crate::ast::NodeRef> {
                $crate::Record::root(&self.core)
            }
        }

        impl $crate::SyncCore<$core> for $ty {
            fn sync_core(
                &mut self,
                ctx: &$crate::SyncCtx<'_>,
                core: &mut $core,
                prior: ::core::option::Option<&$crate::ast::NodeRef>,
            ) -> $crate::Result<::core::option::Option<$crate::ast::NodeRef>> {
                let mut sync = $crate::sync::RecordSync::begin(ctx, &*core, prior);
                $( sync.field(stringify!($field), &mut self.$field, &mut core.$field)?; )*
                $( sync.extensions(&self.$ext, &mut core.$ext)?; )?
                $( sync.embedded(&mut self.$emb, &mut core.$emb)?; )?
                let node = sync.finish(core);
                self.core = ::core::clone::Clone::clone(&*core);
                ::core::result::Result::Ok(::core::option::Option::Some(node))
            }
        }

        impl $crate::Model for $ty {
            type Core = $core;

            fn core(&self) -> &$core {
                &self.core
            }

            fn core_mut(&mut self) -> &mut $core {
                &mut self.core
            }
        }
    };
}

/// Declare an enum carried as a string on the wire
///
/// One variant must be marked `#[default]`; an empty core string populates
/// as that variant. Unknown strings fail populate with a conversion error.
#[macro_export]
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$( $name::$variant ),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $wire ),+
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::std::string::String;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                match s {
                    $( $wire => ::core::result::Result::Ok($name::$variant), )+
                    other => ::core::result::Result::Err(::std::format!(
                        "unknown {} value '{}'",
                        stringify!($name),
                        other
                    )),
                }
            }
        }

        impl $crate::MapKey for $name {
            fn from_wire(wire: &str) -> ::core::result::Result<Self, ::std::string::String> {
                wire.parse()
            }

            fn to_wire(&self) -> ::std::string::String {
                ::std::string::ToString::to_string(self.as_str())
            }
        }

        impl $crate::FromCore<::std::string::String> for $name {
            fn from_core(core: &::std::string::String) -> $crate::Result<Self> {
                if core.is_empty() {
                    return ::core::result::Result::Ok(::core::default::Default::default());
                }
                core.parse().map_err(|_| $crate::BindError::Conversion {
                    from: ::std::string::ToString::to_string("string"),
                    to: ::std::string::ToString::to_string(stringify!($name)),
                    value: ::core::clone::Clone::clone(core),
                })
            }
        }

        impl $crate::sync::Source for $name {
            fn is_unset(&self) -> bool {
                false
            }
        }

        impl $crate::SyncCore<::std::string::String> for $name {
            fn sync_core(
                &mut self,
                ctx: &$crate::SyncCtx<'_>,
                core: &mut ::std::string::String,
                prior: ::core::option::Option<&$crate::ast::NodeRef>,
            ) -> $crate::Result<::core::option::Option<$crate::ast::NodeRef>> {
                let mut wire = ::std::string::ToString::to_string(self.as_str());
                <::std::string::String as $crate::SyncCore<::std::string::String>>::sync_core(
                    &mut wire, ctx, core, prior,
                )
            }
        }
    };
}
