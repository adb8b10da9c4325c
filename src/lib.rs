//! `panegrid` - Windowing and damage-tracking core for terminal UIs
//!
//! A tree of rectangular windows layered over a character grid, with
//! region-algebra damage tracking, an off-screen cell render buffer,
//! and a generic reentrancy-safe event hook engine. Nothing paints
//! eagerly: mutations accumulate damage regions, and one flush pass
//! turns them into expose callbacks, composited buffers and a minimal
//! byte delta to the terminal.
//!
//! # Example
//!
//! ```no_run
//! use panegrid::{AnsiTerm, BindFlags, EventMask, Rect, Window, WindowEvent, WindowFlags};
//!
//! let term = AnsiTerm::new(std::io::stdout(), 24, 80);
//! let root = Window::new_root(Box::new(term));
//!
//! let win = Window::new(&root, Rect::new(5, 5, 10, 40), WindowFlags::empty());
//! win.bind_event(EventMask::EXPOSE, BindFlags::empty(), |_, event| {
//!     if let WindowEvent::Expose(expose) = event {
//!         expose.rb.borrow_mut().text_at(0, 0, "hello");
//!     }
//!     false
//! });
//!
//! root.flush().unwrap();
//! ```

// Crate-level lint configuration
#![warn(unsafe_code)]
#![allow(dead_code)] // Public API functions not yet used internally
#![allow(clippy::cast_possible_truncation)] // Intentional coordinate casts
#![allow(clippy::cast_sign_loss)] // Intentional coordinate conversions
#![allow(clippy::cast_possible_wrap)] // Intentional coordinate conversions
#![allow(clippy::module_name_repetitions)] // Allow WindowFlags, PenAttr etc
#![allow(clippy::missing_const_for_fn)] // Many functions could be const, not critical
#![allow(clippy::doc_markdown)] // Allow technical names without backticks
#![allow(clippy::use_self)] // Allow explicit type names in impl blocks
#![allow(clippy::collapsible_if)] // Sometimes nested ifs are clearer
#![allow(clippy::cast_lossless)] // as casts are fine for primitive widening
#![allow(clippy::items_after_statements)] // Common pattern in tests
#![allow(clippy::redundant_clone)] // Clones in tests for clarity are fine
#![allow(clippy::semicolon_if_nothing_returned)] // Style preference

pub mod buffer;
pub mod debug;
pub mod error;
pub mod event;
pub mod hook;
pub mod pen;
pub mod rect;
pub mod rectset;
pub mod term;
pub mod window;

// Re-export core types at crate root
pub use buffer::{BufferHandle, Cell, CellKind, LineCaps, LineMask, LineStyle, RenderBuffer, SpanInfo};
pub use error::{Error, Result};
pub use event::{
    Event, EventMask, ExposeEvent, FocusEvent, FocusEventKind, GeomChangeEvent, KeyEvent,
    KeyEventKind, KeyMod, MouseEvent, MouseEventKind, PenEvent, ResizeEvent, WindowEvent,
    MOUSEWHEEL_DOWN, MOUSEWHEEL_UP,
};
pub use hook::{BindFlags, HookId, HookList};
pub use pen::{parse_colour_desc, Pen, PenAttr, PenAttrType, N_PEN_ATTRS};
pub use rect::Rect;
pub use rectset::RectSet;
pub use term::{AnsiTerm, CursorShape, TermCtl, TermDriver};
pub use window::{Window, WindowFlags};
