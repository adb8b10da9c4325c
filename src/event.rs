//! Event masks and payload types.
//!
//! Every dispatching object (window, pen) has its own typed event enum
//! so callbacks never downcast payloads; the [`Event`] trait maps each
//! event to the [`EventMask`] bit a hook must have bound to receive it.

use crate::buffer::BufferHandle;
use crate::rect::Rect;
use crate::window::Window;
use bitflags::bitflags;

bitflags! {
    /// Which event kinds a hook is bound to.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct EventMask: u32 {
        /// Terminal size changed.
        const RESIZE     = 0x01;
        /// Keyboard input.
        const KEY        = 0x02;
        /// Mouse input.
        const MOUSE      = 0x04;
        /// A pen attribute changed.
        const CHANGE     = 0x08;
        /// Window geometry changed.
        const GEOMCHANGE = 0x10;
        /// A region needs redrawing.
        const EXPOSE     = 0x20;
        /// Focus gained or lost.
        const FOCUS      = 0x40;
        /// The owning object is being destroyed.
        const DESTROY    = 1 << 30;
        /// This specific hook is being unbound.
        const UNBIND     = 1 << 31;
    }
}

bitflags! {
    /// Keyboard modifier state.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct KeyMod: u8 {
        const SHIFT = 0x01;
        const ALT   = 0x02;
        const CTRL  = 0x04;
    }
}

/// An event deliverable through a hook list.
pub trait Event {
    /// The mask bit a hook must include to receive this event.
    fn mask(&self) -> EventMask;
}

/// Terminal size change payload, delivered to the root window by
/// [`Window::input_resize`](crate::window::Window::input_resize).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeEvent {
    pub lines: i32,
    pub cols: i32,
}

/// Whether a key event is a raw keypress or decoded text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyEventKind {
    /// A named key such as `"Up"` or `"C-a"`.
    Key,
    /// Decoded printable text.
    Text,
}

/// Keyboard input payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub mods: KeyMod,
    /// Key name or decoded text, depending on `kind`.
    pub text: String,
}

/// Mouse event classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseEventKind {
    Press,
    Drag,
    Release,
    Wheel,
    DragStart,
    /// Drag moved outside the window it started in.
    DragOutside,
    DragDrop,
    DragStop,
}

/// Wheel "button" value for [`MouseEventKind::Wheel`] events: scroll
/// away from the user.
pub const MOUSEWHEEL_UP: i32 = 1;
/// Wheel "button" value for [`MouseEventKind::Wheel`] events: scroll
/// toward the user.
pub const MOUSEWHEEL_DOWN: i32 = 2;

/// Mouse input payload; `line`/`col` are window-relative.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub button: i32,
    pub mods: KeyMod,
    pub line: i32,
    pub col: i32,
}

/// Geometry change payload: the new and previous window rects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeomChangeEvent {
    pub rect: Rect,
    pub oldrect: Rect,
}

/// Exposure payload: the damaged rect and the buffer to draw into.
///
/// The buffer handle may be retained past the callback; the render
/// pass composites whatever was drawn during dispatch.
#[derive(Clone, Debug)]
pub struct ExposeEvent {
    pub rect: Rect,
    pub rb: BufferHandle,
}

/// Direction of a focus change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusEventKind {
    In,
    Out,
}

/// Focus change payload; `win` is the window gaining or losing focus
/// (for child-notify delivery this is the focused descendant, not the
/// notified ancestor).
#[derive(Clone, Debug)]
pub struct FocusEvent {
    pub kind: FocusEventKind,
    pub win: Window,
}

/// Events dispatched through a window's hook list.
#[derive(Clone, Debug)]
pub enum WindowEvent {
    Expose(ExposeEvent),
    GeomChange(GeomChangeEvent),
    Focus(FocusEvent),
    Key(KeyEvent),
    Mouse(MouseEvent),
    /// Device size change; dispatched on the root only.
    Resize(ResizeEvent),
    Destroy,
    Unbind,
}

impl Event for WindowEvent {
    fn mask(&self) -> EventMask {
        match self {
            Self::Expose(_) => EventMask::EXPOSE,
            Self::GeomChange(_) => EventMask::GEOMCHANGE,
            Self::Focus(_) => EventMask::FOCUS,
            Self::Key(_) => EventMask::KEY,
            Self::Mouse(_) => EventMask::MOUSE,
            Self::Resize(_) => EventMask::RESIZE,
            Self::Destroy => EventMask::DESTROY,
            Self::Unbind => EventMask::UNBIND,
        }
    }
}

/// Events dispatched through a pen's hook list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PenEvent {
    /// An attribute value changed.
    Change,
    Destroy,
    Unbind,
}

impl Event for PenEvent {
    fn mask(&self) -> EventMask {
        match self {
            Self::Change => EventMask::CHANGE,
            Self::Destroy => EventMask::DESTROY,
            Self::Unbind => EventMask::UNBIND,
        }
    }
}
