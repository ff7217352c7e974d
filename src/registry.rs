//! A collection of codecs keyed by target name.
//!
//! **Requires the `alloc` feature.**
//!
//! ```
//! use context_escape::{registry::Registry, rules::{Guard, RuleSet}, format::EscapeFormatter};
//!
//! let mut registry = Registry::with_builtins();
//! registry
//!     .add(
//!         RuleSet::builder("Digits")
//!             .rule(Guard::Range('0', '9'), EscapeFormatter::Identity)
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! assert_eq!(registry.encode("HTML", "<p>").unwrap(), "&#60;p&#62;");
//! assert_eq!(registry.encode("Digits", "a1b2").unwrap(), "12");
//! assert!(registry.add(context_escape::codec::CSS).is_err());
//! ```

use alloc::{
    borrow::ToOwned,
    boxed::Box,
    string::String,
    vec::Vec,
};
use core::fmt;

use crate::codec::{Codec, Context};

type SharedCodec = Box<dyn Codec + Send + Sync>;

/// Codecs registered under unique target names.
///
/// Lookups are by exact name. Registration order is kept.
#[derive(Default)]
pub struct Registry {
    codecs: Vec<SharedCodec>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Creates a registry holding the four built-in codecs under the names
    /// `HTML`, `HTMLAttribute`, `JavaScriptString` and `CSS`.
    pub fn with_builtins() -> Self {
        Self {
            codecs: Context::ALL
                .into_iter()
                .map(|context| Box::new(context) as SharedCodec)
                .collect(),
        }
    }

    /// Registers `codec` under its [`name`](Codec::name).
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::DuplicateTarget`] if the name is taken; the
    /// registry is left unchanged.
    pub fn add<C>(&mut self, codec: C) -> Result<(), RegistryError>
    where
        C: Codec + Send + Sync + 'static,
    {
        if self.get(codec.name()).is_some() {
            return Err(RegistryError::DuplicateTarget(codec.name().to_owned()));
        }
        debug_event!(codec = codec.name(), "registered codec");
        self.codecs.push(Box::new(codec));
        Ok(())
    }

    /// Looks up a codec by target name.
    pub fn get(&self, name: &str) -> Option<&(dyn Codec + Send + Sync)> {
        self.codecs
            .iter()
            .find(|codec| codec.name() == name)
            .map(|codec| &**codec)
    }

    /// Encodes `input` with the codec registered as `name`.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::UnknownTarget`] if no such codec exists.
    pub fn encode(&self, name: &str, input: &str) -> Result<String, RegistryError> {
        let codec = self
            .get(name)
            .ok_or_else(|| RegistryError::UnknownTarget(name.to_owned()))?;
        Ok(crate::encode(codec, input).into_string())
    }

    /// The registered target names, in registration order.
    pub fn targets(&self) -> impl Iterator<Item = &str> + '_ {
        self.codecs.iter().map(|codec| codec.name())
    }

    /// Number of registered codecs.
    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    /// Returns `true` if no codec is registered.
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("targets", &self.targets().collect::<Vec<_>>())
            .finish()
    }
}

/// An error returned by [`Registry`] operations.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// A codec with this target name is already registered.
    DuplicateTarget(String),
    /// No codec with this target name is registered.
    UnknownTarget(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateTarget(name) => {
                write!(f, "a codec with target {name:?} is already registered")
            }
            RegistryError::UnknownTarget(name) => write!(f, "no codec with target {name:?}"),
        }
    }
}

impl core::error::Error for RegistryError {}
