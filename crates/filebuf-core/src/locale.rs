//! Locales as owners of conversion facilities.
//!
//! A [`Locale`] is an immutable, cheaply cloned table holding one facility per
//! unit type. Engines never own a facility: they clone the `Arc` out of the
//! locale they are imbued with, and the facility lives as long as any locale
//! or engine still refers to it.
//!
//! A process-wide current locale ([`global`] / [`set_global`]) seeds newly
//! constructed streams, and a named registry ([`register`] / [`Locale::by_name`])
//! lets tooling look locales up by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::codecvt::{Codecvt, NoConv};
use crate::unit::CharUnit;

/// Name of the minimal locale.
pub const CLASSIC_NAME: &str = "C";

/// Facilities of one locale, one per unit type.
#[derive(Clone)]
pub struct FacetTable {
    pub(crate) narrow: Arc<dyn Codecvt<u8>>,
    pub(crate) wide16: Arc<dyn Codecvt<u16>>,
    pub(crate) wide32: Arc<dyn Codecvt<u32>>,
}

impl FacetTable {
    fn classic() -> Self {
        Self {
            narrow: Arc::new(NoConv::<u8>::new()),
            wide16: Arc::new(NoConv::<u16>::new()),
            wide32: Arc::new(NoConv::<u32>::new()),
        }
    }
}

impl fmt::Debug for FacetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacetTable")
            .field("narrow", &self.narrow.encoding_name())
            .field("wide16", &self.wide16.encoding_name())
            .field("wide32", &self.wide32.encoding_name())
            .finish()
    }
}

#[derive(Debug)]
struct LocaleInner {
    name: String,
    facets: FacetTable,
}

/// Immutable set of conversion facilities.
#[derive(Debug, Clone)]
pub struct Locale {
    inner: Arc<LocaleInner>,
}

impl Locale {
    /// The "C" locale: identity facilities for every unit type.
    #[must_use]
    pub fn classic() -> Self {
        static CLASSIC: OnceLock<Locale> = OnceLock::new();
        CLASSIC
            .get_or_init(|| Locale {
                inner: Arc::new(LocaleInner {
                    name: CLASSIC_NAME.to_string(),
                    facets: FacetTable::classic(),
                }),
            })
            .clone()
    }

    /// Locale name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Copy of this locale with the facility for `C` replaced.
    #[must_use]
    pub fn with_codecvt<C: CharUnit>(
        &self,
        name: impl Into<String>,
        facility: Arc<dyn Codecvt<C>>,
    ) -> Self {
        let mut facets = self.inner.facets.clone();
        *C::facet_mut(&mut facets) = facility;
        Self {
            inner: Arc::new(LocaleInner {
                name: name.into(),
                facets,
            }),
        }
    }

    /// Facility used for streams of unit type `C`.
    #[must_use]
    pub fn codecvt<C: CharUnit>(&self) -> Arc<dyn Codecvt<C>> {
        Arc::clone(C::facet(&self.inner.facets))
    }

    /// True if both handles refer to the same locale object.
    #[must_use]
    pub fn same(&self, other: &Locale) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Look up a registered locale. The classic names always resolve.
    #[must_use]
    pub fn by_name(name: &str) -> Option<Locale> {
        if is_classic_name(name) {
            return Some(Self::classic());
        }
        registry().read().get(name).cloned()
    }
}

impl Default for Locale {
    fn default() -> Self {
        global()
    }
}

impl PartialEq for Locale {
    fn eq(&self, other: &Self) -> bool {
        self.same(other) || self.name() == other.name()
    }
}

/// Returns `true` if `name` refers to the classic locale.
#[inline]
#[must_use]
pub fn is_classic_name(name: &str) -> bool {
    matches!(name, "C" | "POSIX" | "")
}

fn registry() -> &'static RwLock<HashMap<String, Locale>> {
    static REG: OnceLock<RwLock<HashMap<String, Locale>>> = OnceLock::new();
    REG.get_or_init(|| RwLock::new(HashMap::new()))
}

fn global_slot() -> &'static RwLock<Option<Locale>> {
    static GLOBAL: OnceLock<RwLock<Option<Locale>>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(None))
}

/// Register `locale` under its own name, replacing any previous entry.
/// Returns the replaced locale.
pub fn register(locale: Locale) -> Option<Locale> {
    let name = locale.name().to_string();
    log::debug!("registering locale {name:?}");
    registry().write().insert(name, locale)
}

/// The current process-wide locale (classic until [`set_global`] is called).
#[must_use]
pub fn global() -> Locale {
    global_slot().read().clone().unwrap_or_else(Locale::classic)
}

/// Replace the process-wide locale and return the previous one.
///
/// Only streams constructed afterwards pick it up; existing streams keep the
/// locale they were imbued with.
pub fn set_global(locale: Locale) -> Locale {
    let previous = global_slot().write().replace(locale);
    previous.unwrap_or_else(Locale::classic)
}
