//! Forward-compatible tagged unions.
//!
//! Every union on the wire is written as a `u32` tag followed by a
//! length-prefixed body. Receivers decode bodies they know and keep the
//! rest as [`Opaque`] bytes, so a newer peer can introduce message kinds
//! without breaking older clients. Known bodies may also grow trailing
//! fields: decoding stops after the fields this build understands.

use bincode::{
    Decode,
    Encode,
    error::{DecodeError, EncodeError},
};

use super::codec::wire_config;

/// Body of a union variant this build does not recognise.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Opaque {
    /// Wire tag of the unknown variant.
    pub tag: u32,
    /// Undecoded body bytes.
    pub bytes: Vec<u8>,
}

pub(crate) fn encode_body<T: Encode>(body: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::encode_to_vec(body, wire_config())
}

pub(crate) fn decode_body<T: Decode<()>>(bytes: &[u8]) -> Result<T, DecodeError> {
    bincode::decode_from_slice(bytes, wire_config()).map(|(body, _)| body)
}

/// Declare a union whose variants each wrap one body type under a fixed tag.
///
/// The generated enum gains an `Unrecognized(Opaque)` variant and
/// `Encode`/`Decode` impls using the tag-plus-body layout.
macro_rules! tagged_union {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $tag:literal => $variant:ident($body:ty),
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant($body),
            )+
            /// Variant introduced by a newer peer, preserved verbatim.
            Unrecognized($crate::wire::Opaque),
        }

        impl $name {
            /// Wire tag of the populated variant.
            #[must_use]
            pub const fn tag(&self) -> u32 {
                match self {
                    $(Self::$variant(_) => $tag,)+
                    Self::Unrecognized(opaque) => opaque.tag,
                }
            }

            /// Whether this value came from a variant this build does not know.
            #[must_use]
            pub const fn is_unrecognized(&self) -> bool {
                matches!(self, Self::Unrecognized(_))
            }
        }

        impl ::bincode::Encode for $name {
            fn encode<E: ::bincode::enc::Encoder>(
                &self,
                encoder: &mut E,
            ) -> Result<(), ::bincode::error::EncodeError> {
                let body = match self {
                    $(Self::$variant(inner) => $crate::wire::tagged::encode_body(inner)?,)+
                    Self::Unrecognized(opaque) => opaque.bytes.clone(),
                };
                ::bincode::Encode::encode(&self.tag(), encoder)?;
                ::bincode::Encode::encode(&body, encoder)
            }
        }

        impl<Context> ::bincode::Decode<Context> for $name {
            fn decode<D: ::bincode::de::Decoder<Context = Context>>(
                decoder: &mut D,
            ) -> Result<Self, ::bincode::error::DecodeError> {
                let tag = <u32 as ::bincode::Decode<Context>>::decode(decoder)?;
                let bytes = <Vec<u8> as ::bincode::Decode<Context>>::decode(decoder)?;
                match tag {
                    $($tag => $crate::wire::tagged::decode_body(&bytes).map(Self::$variant),)+
                    _ => Ok(Self::Unrecognized($crate::wire::Opaque { tag, bytes })),
                }
            }
        }

        ::bincode::impl_borrow_decode!($name);
    };
}

/// Implement `Encode`/`Decode` for field-less message bodies.
macro_rules! empty_body {
    ($($(#[$meta:meta])* $name:ident;)+) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
            pub struct $name;

            impl ::bincode::Encode for $name {
                fn encode<E: ::bincode::enc::Encoder>(
                    &self,
                    _encoder: &mut E,
                ) -> Result<(), ::bincode::error::EncodeError> {
                    Ok(())
                }
            }

            impl<Context> ::bincode::Decode<Context> for $name {
                fn decode<D: ::bincode::de::Decoder<Context = Context>>(
                    _decoder: &mut D,
                ) -> Result<Self, ::bincode::error::DecodeError> {
                    Ok(Self)
                }
            }

            ::bincode::impl_borrow_decode!($name);
        )+
    };
}
