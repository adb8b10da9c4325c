//! Rendering attribute store ("pen").
//!
//! A [`Pen`] holds the attributes applied to rendered text: foreground
//! and background colours, boolean styles (bold, underline, ...) and
//! the alternate-font index. Attributes are *optional*: a pen that has
//! no value for an attribute leaves whatever is already in effect.
//!
//! Each attribute has a fixed type — colour, bool or int — and the
//! accessors are typed accordingly; asking for the wrong type of a
//! given attribute is a programming error, caught by a debug
//! assertion.
//!
//! Pens are cheap shared handles. [`Pen::clone`] shares state (and
//! change hooks); [`Pen::clone_value`] takes an independent deep copy,
//! which is what the render buffer stamps into cells.

use crate::event::{EventMask, PenEvent};
use crate::hook::{BindFlags, HookId, HookList};
use crate::{Error, Result};
use std::cell::RefCell;
use std::rc::Rc;

/// The pen attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PenAttr {
    /// Foreground colour.
    Fg,
    /// Background colour.
    Bg,
    Bold,
    Under,
    Italic,
    Reverse,
    Strike,
    /// Alternate font index.
    AltFont,
    Blink,
}

/// Number of distinct attributes.
pub const N_PEN_ATTRS: usize = 9;

const ALL_ATTRS: [PenAttr; N_PEN_ATTRS] = [
    PenAttr::Fg,
    PenAttr::Bg,
    PenAttr::Bold,
    PenAttr::Under,
    PenAttr::Italic,
    PenAttr::Reverse,
    PenAttr::Strike,
    PenAttr::AltFont,
    PenAttr::Blink,
];

/// Value type of a [`PenAttr`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PenAttrType {
    Bool,
    Int,
    Colour,
}

impl PenAttr {
    /// All attributes, in storage order.
    #[must_use]
    pub const fn all() -> [PenAttr; N_PEN_ATTRS] {
        ALL_ATTRS
    }

    const fn index(self) -> usize {
        match self {
            Self::Fg => 0,
            Self::Bg => 1,
            Self::Bold => 2,
            Self::Under => 3,
            Self::Italic => 4,
            Self::Reverse => 5,
            Self::Strike => 6,
            Self::AltFont => 7,
            Self::Blink => 8,
        }
    }

    /// The value type of this attribute.
    #[must_use]
    pub const fn attr_type(self) -> PenAttrType {
        match self {
            Self::Fg | Self::Bg => PenAttrType::Colour,
            Self::AltFont => PenAttrType::Int,
            _ => PenAttrType::Bool,
        }
    }

    /// Short wire/config name of the attribute.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fg => "fg",
            Self::Bg => "bg",
            Self::Bold => "b",
            Self::Under => "u",
            Self::Italic => "i",
            Self::Reverse => "rv",
            Self::Strike => "strike",
            Self::AltFont => "af",
            Self::Blink => "blink",
        }
    }

    /// Look an attribute up by its short name.
    #[must_use]
    pub fn lookup(name: &str) -> Option<PenAttr> {
        ALL_ATTRS.into_iter().find(|a| a.name() == name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttrValue {
    Bool(bool),
    Int(i32),
    Colour(i32),
}

/// Parse a colour description: a numeric index, one of the 8 ANSI
/// names, or a `hi-` prefixed name for the bright variant (+8).
///
/// # Errors
///
/// Returns [`Error::InvalidColour`] for anything unrecognised.
pub fn parse_colour_desc(desc: &str) -> Result<i32> {
    if let Ok(n) = desc.parse::<i32>() {
        return Ok(n);
    }

    let (base, offset) = match desc.strip_prefix("hi-") {
        Some(rest) => (rest, 8),
        None => (desc, 0),
    };

    let idx = match base {
        "black" => 0,
        "red" => 1,
        "green" => 2,
        "yellow" => 3,
        "blue" => 4,
        "magenta" => 5,
        "cyan" => 6,
        "white" => 7,
        _ => return Err(Error::InvalidColour(desc.to_string())),
    };
    Ok(idx + offset)
}

struct PenInner {
    attrs: RefCell<[Option<AttrValue>; N_PEN_ATTRS]>,
    hooks: HookList<Pen, PenEvent>,
}

/// Shared handle to a pen. See the module docs.
pub struct Pen {
    inner: Rc<PenInner>,
}

impl Default for Pen {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Pen {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Pen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("Pen");
        for attr in ALL_ATTRS {
            if let Some(v) = self.inner.attrs.borrow()[attr.index()] {
                dbg.field(attr.name(), &v);
            }
        }
        dbg.finish()
    }
}

impl Pen {
    /// Create a pen with no attributes set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(PenInner {
                attrs: RefCell::new([None; N_PEN_ATTRS]),
                hooks: HookList::new(),
            }),
        }
    }

    /// Take an independent deep copy, with no hooks bound.
    #[must_use]
    pub fn clone_value(&self) -> Self {
        let copy = Self::new();
        *copy.inner.attrs.borrow_mut() = *self.inner.attrs.borrow();
        copy
    }

    /// Check whether two handles share the same pen.
    #[must_use]
    pub fn same(&self, other: &Pen) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Bind a callback for the events in `mask`.
    pub fn bind_event<F>(&self, mask: EventMask, flags: BindFlags, callback: F) -> HookId
    where
        F: FnMut(&Pen, &PenEvent) -> bool + 'static,
    {
        self.inner.hooks.bind(mask, flags, callback)
    }

    /// Unbind a callback by id, delivering its unbind notification.
    pub fn unbind_event_id(&self, id: HookId) {
        self.inner.hooks.unbind(self, id, &PenEvent::Unbind);
    }

    fn get(&self, attr: PenAttr) -> Option<AttrValue> {
        self.inner.attrs.borrow()[attr.index()]
    }

    fn set(&self, attr: PenAttr, value: AttrValue) {
        self.inner.attrs.borrow_mut()[attr.index()] = Some(value);
        self.inner.hooks.dispatch(self, &PenEvent::Change);
    }

    /// Check whether the attribute has a stored value.
    #[must_use]
    pub fn has_attr(&self, attr: PenAttr) -> bool {
        self.get(attr).is_some()
    }

    /// Check whether any attribute has a stored value.
    #[must_use]
    pub fn is_nonempty(&self) -> bool {
        ALL_ATTRS.iter().any(|a| self.has_attr(*a))
    }

    /// Check whether the attribute holds a non-default value.
    #[must_use]
    pub fn nondefault_attr(&self, attr: PenAttr) -> bool {
        match self.get(attr) {
            None => false,
            Some(AttrValue::Bool(b)) => b,
            Some(AttrValue::Int(n)) => n != 0,
            Some(AttrValue::Colour(c)) => c != -1,
        }
    }

    /// Check whether any attribute holds a non-default value.
    #[must_use]
    pub fn is_nondefault(&self) -> bool {
        ALL_ATTRS.iter().any(|a| self.nondefault_attr(*a))
    }

    /// Get a boolean attribute; absent means `false`.
    #[must_use]
    pub fn get_bool(&self, attr: PenAttr) -> bool {
        debug_assert!(attr.attr_type() == PenAttrType::Bool);
        matches!(self.get(attr), Some(AttrValue::Bool(true)))
    }

    /// Set a boolean attribute, dispatching a change event.
    pub fn set_bool(&self, attr: PenAttr, value: bool) {
        debug_assert!(attr.attr_type() == PenAttrType::Bool);
        self.set(attr, AttrValue::Bool(value));
    }

    /// Get an integer attribute; absent means `0`.
    #[must_use]
    pub fn get_int(&self, attr: PenAttr) -> i32 {
        debug_assert!(attr.attr_type() == PenAttrType::Int);
        match self.get(attr) {
            Some(AttrValue::Int(n)) => n,
            _ => 0,
        }
    }

    /// Set an integer attribute, dispatching a change event.
    pub fn set_int(&self, attr: PenAttr, value: i32) {
        debug_assert!(attr.attr_type() == PenAttrType::Int);
        self.set(attr, AttrValue::Int(value));
    }

    /// Get a colour attribute; absent means `-1` (terminal default).
    #[must_use]
    pub fn get_colour(&self, attr: PenAttr) -> i32 {
        debug_assert!(attr.attr_type() == PenAttrType::Colour);
        match self.get(attr) {
            Some(AttrValue::Colour(c)) => c,
            _ => -1,
        }
    }

    /// Set a colour attribute, dispatching a change event.
    pub fn set_colour(&self, attr: PenAttr, value: i32) {
        debug_assert!(attr.attr_type() == PenAttrType::Colour);
        self.set(attr, AttrValue::Colour(value));
    }

    /// Set a colour attribute from a description string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidColour`] without mutating the pen when
    /// the description does not parse.
    pub fn set_colour_desc(&self, attr: PenAttr, desc: &str) -> Result<()> {
        let value = parse_colour_desc(desc)?;
        self.set_colour(attr, value);
        Ok(())
    }

    /// Remove an attribute's stored value.
    ///
    /// Dispatches a change event only if a value was present.
    pub fn clear_attr(&self, attr: PenAttr) {
        let had = self.inner.attrs.borrow_mut()[attr.index()].take().is_some();
        if had {
            self.inner.hooks.dispatch(self, &PenEvent::Change);
        }
    }

    /// Remove every stored attribute.
    pub fn clear(&self) {
        for attr in ALL_ATTRS {
            self.clear_attr(attr);
        }
    }

    /// Check whether two pens agree on one attribute, treating absent
    /// values as defaults.
    #[must_use]
    pub fn equiv_attr(&self, other: &Pen, attr: PenAttr) -> bool {
        match attr.attr_type() {
            PenAttrType::Bool => self.get_bool(attr) == other.get_bool(attr),
            PenAttrType::Int => self.get_int(attr) == other.get_int(attr),
            PenAttrType::Colour => self.get_colour(attr) == other.get_colour(attr),
        }
    }

    /// Check whether two pens agree on every attribute.
    #[must_use]
    pub fn equiv(&self, other: &Pen) -> bool {
        ALL_ATTRS.iter().all(|a| self.equiv_attr(other, *a))
    }

    /// Copy one attribute from `src` if `src` has it stored.
    pub fn copy_attr(&self, src: &Pen, attr: PenAttr) {
        if let Some(value) = src.get(attr) {
            self.set(attr, value);
        }
    }

    /// Copy every stored attribute from `src`.
    ///
    /// Without `overwrite`, attributes already present on `self` are
    /// left untouched — even when the incoming value differs. Stored
    /// default values still count as present and are copied.
    pub fn copy_from(&self, src: &Pen, overwrite: bool) {
        for attr in ALL_ATTRS {
            if src.has_attr(attr) && (overwrite || !self.has_attr(attr)) {
                self.copy_attr(src, attr);
            }
        }
    }
}

impl Drop for Pen {
    fn drop(&mut self) {
        if Rc::strong_count(&self.inner) == 1 {
            // Last handle: deliver destroy notifications. The temporary
            // clone keeps the strong count above 1 so its own drop does
            // not re-enter this branch.
            let tmp = Pen {
                inner: Rc::clone(&self.inner),
            };
            tmp.inner.hooks.unbind_and_destroy(&tmp, &PenEvent::Destroy);
        }
    }
}
