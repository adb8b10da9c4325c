//! Hierarchical window tree with damage tracking.
//!
//! Windows form a tree over the terminal's character grid. Each window
//! has a parent-relative geometry [`Rect`], a z-order position among
//! its siblings (front of the child list is topmost), visibility and
//! behaviour flags, an owned [`Pen`], an event hook list, and a
//! pending-damage [`RectSet`].
//!
//! Nothing paints eagerly. Geometry changes, show/hide and restacking
//! compute the regions they dirtied and add them to the affected
//! windows' damage sets; [`Window::flush`] on the root then walks the
//! tree once, dispatches an [`EventMask::EXPOSE`] event per damaged
//! rect so application callbacks draw into a [`RenderBuffer`], and
//! composites child buffers over their ancestors before emitting a
//! minimal delta to the terminal.
//!
//! `Window` itself is a cheap reference-counted handle; the tree keeps
//! children alive, parents are held weakly. A window stays usable by
//! holders after [`Window::close`] but is detached and never rendered
//! again.

use crate::buffer::RenderBuffer;
use crate::debug::debug_log;
use crate::event::{
    EventMask, ExposeEvent, FocusEvent, FocusEventKind, GeomChangeEvent, KeyEvent, MouseEvent,
    ResizeEvent, WindowEvent,
};
use crate::hook::{BindFlags, HookId, HookList};
use crate::pen::Pen;
use crate::rect::Rect;
use crate::rectset::RectSet;
use crate::term::{CursorShape, TermCtl, TermDriver};
use crate::Result;
use bitflags::bitflags;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

bitflags! {
    /// Window creation and behaviour flags.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct WindowFlags: u32 {
        /// Created hidden; excluded from rendering and exposure.
        const HIDDEN      = 0x01;
        /// Inserted at the back of the sibling order instead of the
        /// front.
        const LOWEST      = 0x02;
        /// Attached to the root window rather than the nominal parent;
        /// the given geometry is interpreted relative to the nominal
        /// parent and converted.
        const ROOT_PARENT = 0x04;
        /// Receives input events before hit-tested delivery, even for
        /// positions outside its own geometry.
        const STEAL_INPUT = 0x08;
        /// A popup: attached to the root, stealing input.
        const POPUP       = 0x04 | 0x08;
    }
}

/// Per-window cursor spec; applied to the terminal only while the
/// window holds focus.
#[derive(Clone, Copy, Debug)]
struct CursorSpec {
    line: i32,
    col: i32,
    visible: bool,
    shape: CursorShape,
}

impl Default for CursorSpec {
    fn default() -> Self {
        Self {
            line: 0,
            col: 0,
            visible: true,
            shape: CursorShape::Block,
        }
    }
}

/// State only the root window carries: the output device and the
/// tree-wide focus holder.
struct RootState {
    term: RefCell<Box<dyn TermDriver>>,
    focused: RefCell<Weak<WindowInner>>,
}

struct WindowInner {
    parent: RefCell<Weak<WindowInner>>,
    /// Front of the list is topmost.
    children: RefCell<Vec<Window>>,
    rect: Cell<Rect>,
    flags: Cell<WindowFlags>,
    pen: Pen,
    hooks: HookList<Window, WindowEvent>,
    damage: RefCell<RectSet>,
    cursor: RefCell<CursorSpec>,
    focus_child_notify: Cell<bool>,
    closed: Cell<bool>,
    root: Option<RootState>,
}

/// Handle to one window in the tree. See the module docs.
pub struct Window {
    inner: Rc<WindowInner>,
}

impl Clone for Window {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("rect", &self.inner.rect.get())
            .field("flags", &self.inner.flags.get())
            .field("children", &self.inner.children.borrow().len())
            .finish()
    }
}

impl Window {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create the root window over a terminal device, sized to it and
    /// with its full extent already pending exposure.
    #[must_use]
    pub fn new_root(term: Box<dyn TermDriver>) -> Self {
        let (lines, cols) = term.size();
        let win = Self {
            inner: Rc::new(WindowInner {
                parent: RefCell::new(Weak::new()),
                children: RefCell::new(Vec::new()),
                rect: Cell::new(Rect::new(0, 0, lines, cols)),
                flags: Cell::new(WindowFlags::empty()),
                pen: Pen::new(),
                hooks: HookList::new(),
                damage: RefCell::new(RectSet::new()),
                cursor: RefCell::new(CursorSpec::default()),
                focus_child_notify: Cell::new(false),
                closed: Cell::new(false),
                root: Some(RootState {
                    term: RefCell::new(term),
                    focused: RefCell::new(Weak::new()),
                }),
            }),
        };
        win.expose(None);
        win
    }

    /// Create a child window under `parent` with the given
    /// parent-relative geometry and flags.
    ///
    /// The new window goes to the front of the sibling order (topmost)
    /// unless [`WindowFlags::LOWEST`] is set. With
    /// [`WindowFlags::ROOT_PARENT`] the window attaches to the root of
    /// `parent`'s tree instead, with the geometry converted to
    /// root-relative.
    #[must_use]
    pub fn new(parent: &Window, rect: Rect, flags: WindowFlags) -> Self {
        let (parent, rect) = if flags.contains(WindowFlags::ROOT_PARENT) {
            let abs = parent.abs_geometry();
            (
                parent.root_window(),
                rect.translated(abs.top, abs.left),
            )
        } else {
            (parent.clone(), rect)
        };

        let win = Self {
            inner: Rc::new(WindowInner {
                parent: RefCell::new(Rc::downgrade(&parent.inner)),
                children: RefCell::new(Vec::new()),
                rect: Cell::new(rect),
                flags: Cell::new(flags),
                pen: Pen::new(),
                hooks: HookList::new(),
                damage: RefCell::new(RectSet::new()),
                cursor: RefCell::new(CursorSpec::default()),
                focus_child_notify: Cell::new(false),
                closed: Cell::new(false),
                root: None,
            }),
        };

        let mut children = parent.inner.children.borrow_mut();
        if flags.contains(WindowFlags::LOWEST) {
            children.push(win.clone());
        } else {
            children.insert(0, win.clone());
        }
        drop(children);

        if !flags.contains(WindowFlags::HIDDEN) {
            win.expose(None);
        }
        win
    }

    /// Create a popup attached to the root: positioned relative to
    /// `parent` but stacked over everything, stealing input.
    #[must_use]
    pub fn new_popup(parent: &Window, rect: Rect) -> Self {
        Self::new(parent, rect, WindowFlags::POPUP)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Check whether two handles refer to the same window.
    #[must_use]
    pub fn same(&self, other: &Window) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The parent window, if attached.
    #[must_use]
    pub fn parent(&self) -> Option<Window> {
        self.inner.parent.borrow().upgrade().map(|inner| Window { inner })
    }

    /// The root of this window's tree.
    #[must_use]
    pub fn root_window(&self) -> Window {
        let mut win = self.clone();
        while let Some(parent) = win.parent() {
            win = parent;
        }
        win
    }

    /// Check whether this is the root of its tree.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.inner.root.is_some()
    }

    /// Parent-relative geometry.
    #[must_use]
    pub fn geometry(&self) -> Rect {
        self.inner.rect.get()
    }

    /// Geometry in root coordinates, summing ancestor offsets.
    #[must_use]
    pub fn abs_geometry(&self) -> Rect {
        let mut rect = self.inner.rect.get();
        let mut win = self.parent();
        while let Some(parent) = win {
            let p = parent.geometry();
            rect = rect.translated(p.top, p.left);
            win = parent.parent();
        }
        rect
    }

    /// Window height in lines.
    #[must_use]
    pub fn lines(&self) -> i32 {
        self.inner.rect.get().lines
    }

    /// Window width in columns.
    #[must_use]
    pub fn cols(&self) -> i32 {
        self.inner.rect.get().cols
    }

    /// Current flags.
    #[must_use]
    pub fn flags(&self) -> WindowFlags {
        self.inner.flags.get()
    }

    /// Check whether the window and all its ancestors are shown.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        if self.inner.closed.get() || self.inner.flags.get().contains(WindowFlags::HIDDEN) {
            return false;
        }
        self.parent().is_none_or(|p| p.is_visible())
    }

    /// The window's pen, as a shared handle.
    #[must_use]
    pub fn pen(&self) -> Pen {
        self.inner.pen.clone()
    }

    /// Snapshot of the pending damage region.
    #[must_use]
    pub fn damage(&self) -> RectSet {
        self.inner.damage.borrow().clone()
    }

    /// Bind a callback for the events in `mask`.
    pub fn bind_event<F>(&self, mask: EventMask, flags: BindFlags, callback: F) -> HookId
    where
        F: FnMut(&Window, &WindowEvent) -> bool + 'static,
    {
        self.inner.hooks.bind(mask, flags, callback)
    }

    /// Unbind a callback by id, delivering its unbind notification.
    pub fn unbind_event_id(&self, id: HookId) {
        self.inner.hooks.unbind(self, id, &WindowEvent::Unbind);
    }

    // ------------------------------------------------------------------
    // Damage and exposure
    // ------------------------------------------------------------------

    /// Mark a window-relative region (or the full window) as needing
    /// redraw at the next flush. Overlapping requests coalesce.
    ///
    /// The request also propagates into visible children covering the
    /// region, so their content is repainted over the parent's.
    pub fn expose(&self, rect: Option<Rect>) {
        let extent = Rect::new(0, 0, self.lines(), self.cols());
        let rect = match rect {
            Some(r) => match r.intersect(&extent) {
                Some(r) => r,
                None => return,
            },
            None => extent,
        };
        if self.inner.closed.get() || self.inner.flags.get().contains(WindowFlags::HIDDEN) {
            return;
        }

        self.inner.damage.borrow_mut().add(rect);

        let children: Vec<Window> = self.inner.children.borrow().clone();
        for child in children {
            let crect = child.geometry();
            if let Some(overlap) = rect.intersect(&crect) {
                child.expose(Some(overlap.translated(-crect.top, -crect.left)));
            }
        }
    }

    /// Change geometry, dispatching one [`EventMask::GEOMCHANGE`] and
    /// marking the newly revealed regions damaged: growth on this
    /// window, vacated area on the parent.
    pub fn set_geometry(&self, rect: Rect) {
        let oldrect = self.inner.rect.get();
        if rect == oldrect {
            return;
        }
        self.inner.rect.set(rect);

        self.inner.hooks.dispatch(
            self,
            &WindowEvent::GeomChange(GeomChangeEvent { rect, oldrect }),
        );

        for r in rect.subtract(&oldrect) {
            self.expose(Some(r.translated(-rect.top, -rect.left)));
        }
        if let Some(parent) = self.parent() {
            for r in oldrect.subtract(&rect) {
                parent.expose(Some(r));
            }
        }
    }

    /// Change size, keeping position.
    pub fn resize(&self, lines: i32, cols: i32) {
        let r = self.inner.rect.get();
        self.set_geometry(Rect::new(r.top, r.left, lines, cols));
    }

    /// Change position, keeping size.
    pub fn reposition(&self, top: i32, left: i32) {
        let r = self.inner.rect.get();
        self.set_geometry(Rect::new(top, left, r.lines, r.cols));
    }

    /// Make the window visible, exposing its full extent.
    pub fn show(&self) {
        let flags = self.inner.flags.get();
        if !flags.contains(WindowFlags::HIDDEN) {
            return;
        }
        self.inner.flags.set(flags - WindowFlags::HIDDEN);
        self.expose(None);
    }

    /// Hide the window, exposing the region it occupied on the parent
    /// so whatever lies beneath repaints.
    pub fn hide(&self) {
        let flags = self.inner.flags.get();
        if flags.contains(WindowFlags::HIDDEN) {
            return;
        }
        self.inner.flags.set(flags | WindowFlags::HIDDEN);
        self.inner.damage.borrow_mut().clear();
        if let Some(parent) = self.parent() {
            parent.expose(Some(self.geometry()));
        }
    }

    fn restack(&self, new_index: impl FnOnce(usize, usize) -> usize) {
        let Some(parent) = self.parent() else { return };
        let mut children = parent.inner.children.borrow_mut();
        let Some(idx) = children.iter().position(|c| c.same(self)) else {
            return;
        };
        let to = new_index(idx, children.len() - 1);
        if to != idx {
            let win = children.remove(idx);
            children.insert(to, win);
            drop(children);
            // Repaint the affected area in the new stacking order;
            // exposure recursion hands each overlapping sibling its
            // newly visible part.
            parent.expose(Some(self.geometry()));
        }
    }

    /// Move one step toward the front of the sibling order.
    pub fn raise(&self) {
        self.restack(|idx, _| idx.saturating_sub(1));
    }

    /// Move to the front (topmost).
    pub fn raise_to_front(&self) {
        self.restack(|_, _| 0);
    }

    /// Move one step toward the back.
    pub fn lower(&self) {
        self.restack(|idx, last| (idx + 1).min(last));
    }

    /// Move to the back (bottommost).
    pub fn lower_to_back(&self) {
        self.restack(|_, last| last);
    }

    // ------------------------------------------------------------------
    // Scrolling
    // ------------------------------------------------------------------

    /// Scroll the content of a window-relative `rect` on the terminal,
    /// marking only the revealed bands damaged.
    ///
    /// Returns `Ok(false)` without touching anything when the device
    /// cannot scroll that region or a visible child overlaps it; the
    /// caller falls back to a full [`Window::expose`].
    ///
    /// # Errors
    ///
    /// Propagates device I/O errors.
    pub fn scrollrect(&self, rect: Rect, downward: i32, rightward: i32) -> Result<bool> {
        let overlapped = self.inner.children.borrow().iter().any(|c| {
            !c.flags().contains(WindowFlags::HIDDEN) && c.geometry().intersects(&rect)
        });
        if overlapped {
            return Ok(false);
        }
        self.scrollrect_over_children(rect, downward, rightward)
    }

    /// Like [`Window::scrollrect`] but scrolls the region regardless of
    /// children inside it, taking their on-screen content along.
    ///
    /// # Errors
    ///
    /// Propagates device I/O errors.
    pub fn scrollrect_over_children(
        &self,
        rect: Rect,
        downward: i32,
        rightward: i32,
    ) -> Result<bool> {
        if !self.is_visible() && !self.is_root() {
            return Ok(false);
        }
        let extent = Rect::new(0, 0, self.lines(), self.cols());
        let Some(rect) = rect.intersect(&extent) else {
            return Ok(false);
        };
        if downward.abs() >= rect.lines || rightward.abs() >= rect.cols {
            return Ok(false);
        }

        let origin = self.abs_geometry();
        let abs = rect.translated(origin.top, origin.left);

        let root = self.root_window();
        let Some(state) = root.inner.root.as_ref() else {
            return Ok(false);
        };
        let scrolled = state
            .term
            .borrow_mut()
            .scrollrect(abs, downward, rightward)?;
        if !scrolled {
            return Ok(false);
        }

        // Only the bands the scroll revealed need repainting.
        if downward > 0 {
            self.expose(Some(Rect::new(
                rect.bottom() - downward,
                rect.left,
                downward,
                rect.cols,
            )));
        } else if downward < 0 {
            self.expose(Some(Rect::new(rect.top, rect.left, -downward, rect.cols)));
        }
        if rightward > 0 {
            self.expose(Some(Rect::new(
                rect.top,
                rect.right() - rightward,
                rect.lines,
                rightward,
            )));
        } else if rightward < 0 {
            self.expose(Some(Rect::new(rect.top, rect.left, rect.lines, -rightward)));
        }
        Ok(true)
    }

    /// Scroll the whole window content.
    ///
    /// # Errors
    ///
    /// Propagates device I/O errors.
    pub fn scroll(&self, downward: i32, rightward: i32) -> Result<bool> {
        self.scrollrect(
            Rect::new(0, 0, self.lines(), self.cols()),
            downward,
            rightward,
        )
    }

    // ------------------------------------------------------------------
    // Focus and cursor
    // ------------------------------------------------------------------

    /// Give this window the tree-wide input focus.
    ///
    /// The previous holder receives a focus-out event, this window a
    /// focus-in; ancestors with child-notify set receive the focus-in
    /// referencing this window, walking up until the first ancestor
    /// without the flag.
    pub fn take_focus(&self) {
        let root = self.root_window();
        let Some(state) = root.inner.root.as_ref() else {
            return;
        };

        let prev = state.focused.borrow().upgrade().map(|inner| Window { inner });
        if prev.as_ref().is_some_and(|p| p.same(self)) {
            return;
        }

        if let Some(prev) = prev {
            prev.inner.hooks.dispatch(
                &prev,
                &WindowEvent::Focus(FocusEvent {
                    kind: FocusEventKind::Out,
                    win: prev.clone(),
                }),
            );
        }

        *state.focused.borrow_mut() = Rc::downgrade(&self.inner);
        self.inner.hooks.dispatch(
            self,
            &WindowEvent::Focus(FocusEvent {
                kind: FocusEventKind::In,
                win: self.clone(),
            }),
        );

        let mut ancestor = self.parent();
        while let Some(win) = ancestor {
            if !win.inner.focus_child_notify.get() {
                break;
            }
            win.inner.hooks.dispatch(
                &win,
                &WindowEvent::Focus(FocusEvent {
                    kind: FocusEventKind::In,
                    win: self.clone(),
                }),
            );
            ancestor = win.parent();
        }

        let _ = root.apply_cursor();
    }

    /// Check whether this window holds the focus.
    #[must_use]
    pub fn is_focused(&self) -> bool {
        let root = self.root_window();
        let Some(state) = root.inner.root.as_ref() else {
            return false;
        };
        state
            .focused
            .borrow()
            .upgrade()
            .is_some_and(|inner| Rc::ptr_eq(&inner, &self.inner))
    }

    /// Request focus events for descendants: while set, this window
    /// also receives the focus-in dispatched to any descendant.
    pub fn set_focus_child_notify(&self, notify: bool) {
        self.inner.focus_child_notify.set(notify);
    }

    /// Set the window-relative cursor position used while focused.
    pub fn set_cursor_position(&self, line: i32, col: i32) {
        let mut spec = self.inner.cursor.borrow_mut();
        spec.line = line;
        spec.col = col;
    }

    /// Set cursor visibility used while focused.
    pub fn set_cursor_visible(&self, visible: bool) {
        self.inner.cursor.borrow_mut().visible = visible;
    }

    /// Set the cursor shape used while focused.
    pub fn set_cursor_shape(&self, shape: CursorShape) {
        self.inner.cursor.borrow_mut().shape = shape;
    }

    /// Re-apply the focus holder's cursor spec to the device.
    fn apply_cursor(&self) -> Result<()> {
        let state = self.inner.root.as_ref().expect("apply_cursor on root");
        let focused = state.focused.borrow().upgrade().map(|inner| Window { inner });

        let mut term = state.term.borrow_mut();
        match focused {
            Some(win) if win.is_visible() => {
                let spec = *win.inner.cursor.borrow();
                let origin = win.abs_geometry();
                term.goto(origin.top + spec.line, origin.left + spec.col)?;
                term.setctl(TermCtl::CursorShape(spec.shape))?;
                term.setctl(TermCtl::CursorVisible(spec.visible))?;
            }
            _ => term.setctl(TermCtl::CursorVisible(false))?,
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    /// Tell the tree the device changed size.
    ///
    /// The root geometry is updated, an [`EventMask::RESIZE`] event is
    /// dispatched on the root, and the whole screen is marked for
    /// repaint.
    ///
    /// Call on the root.
    pub fn input_resize(&self, lines: i32, cols: i32) {
        debug_assert!(self.is_root());
        let r = self.inner.rect.get();
        if r.lines == lines && r.cols == cols {
            return;
        }
        self.inner.rect.set(Rect::new(r.top, r.left, lines, cols));
        self.inner
            .hooks
            .dispatch(self, &WindowEvent::Resize(ResizeEvent { lines, cols }));

        // Pending damage may lie outside the new extent; everything is
        // repainted anyway.
        self.inner.damage.borrow_mut().clear();
        self.expose(None);
    }

    /// Deliver a key event to the focused window, walking up its
    /// ancestor chain until a hook claims it. Returns whether any did.
    ///
    /// Call on the root.
    pub fn input_key(&self, event: &KeyEvent) -> bool {
        let state = self.inner.root.as_ref().expect("input delivered to root");
        let mut target = state
            .focused
            .borrow()
            .upgrade()
            .map_or_else(|| self.clone(), |inner| Window { inner });

        loop {
            if target
                .inner
                .hooks
                .dispatch_until_true(&target, &WindowEvent::Key(event.clone()))
            {
                return true;
            }
            match target.parent() {
                Some(parent) => target = parent,
                None => return false,
            }
        }
    }

    /// Deliver a mouse event (root-relative coordinates) to the window
    /// under it, front-to-back, translating coordinates per window.
    /// Windows flagged [`WindowFlags::STEAL_INPUT`] see the event
    /// first even when the position is outside them. Returns whether
    /// any hook claimed it.
    ///
    /// Call on the root.
    pub fn input_mouse(&self, event: &MouseEvent) -> bool {
        debug_assert!(self.is_root());
        self.deliver_mouse(event)
    }

    fn deliver_mouse(&self, event: &MouseEvent) -> bool {
        let children: Vec<Window> = self.inner.children.borrow().clone();

        for child in &children {
            if !child.flags().contains(WindowFlags::STEAL_INPUT)
                || child.flags().contains(WindowFlags::HIDDEN)
            {
                continue;
            }
            let r = child.geometry();
            let translated = MouseEvent {
                line: event.line - r.top,
                col: event.col - r.left,
                ..*event
            };
            if child.deliver_mouse(&translated) {
                return true;
            }
        }

        for child in &children {
            if child.flags().contains(WindowFlags::HIDDEN)
                || child.flags().contains(WindowFlags::STEAL_INPUT)
            {
                continue;
            }
            let r = child.geometry();
            if !r.contains_cell(event.line, event.col) {
                continue;
            }
            let translated = MouseEvent {
                line: event.line - r.top,
                col: event.col - r.left,
                ..*event
            };
            if child.deliver_mouse(&translated) {
                return true;
            }
        }

        self.inner
            .hooks
            .dispatch_until_true(self, &WindowEvent::Mouse(*event))
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// The render pass. Walks the tree from this root, dispatches
    /// expose events for every damaged region, composites child output
    /// over ancestors and flushes the composed buffer to the device,
    /// then re-applies the focus holder's cursor.
    ///
    /// Damage added by expose callbacks themselves is left pending for
    /// the next flush.
    ///
    /// # Errors
    ///
    /// Propagates device I/O errors.
    pub fn flush(&self) -> Result<()> {
        let state = self.inner.root.as_ref().expect("flush on the root window");

        let mut buf = RenderBuffer::new(self.lines().max(1), self.cols().max(1));
        self.compose_into(&mut buf);

        {
            let mut term = state.term.borrow_mut();
            buf.flush_to_term(&mut **term)?;
            term.flush()?;
        }
        self.apply_cursor()
    }

    /// Render this window's damage into its own buffer and blit it
    /// into `buf`, whose state is already translated and clipped to
    /// this window's frame; then recurse into children back-to-front
    /// so topmost content lands last.
    fn compose_into(&self, buf: &mut RenderBuffer) {
        if self.inner.closed.get() || self.inner.flags.get().contains(WindowFlags::HIDDEN) {
            return;
        }

        // Snapshot: damage a callback adds during its own expose is
        // deferred to the next pass.
        let damage = std::mem::take(&mut *self.inner.damage.borrow_mut());

        if !damage.is_empty() && self.lines() > 0 && self.cols() > 0 {
            debug_log(
                "wd",
                &format!("expose pass over {} rect(s)", damage.len()),
            );
            let rb = RenderBuffer::new_handle(self.lines(), self.cols());
            rb.borrow_mut().set_pen(&self.inner.pen);

            for rect in damage.rects() {
                rb.borrow_mut().save();
                rb.borrow_mut().clip(*rect);
                self.inner.hooks.dispatch(
                    self,
                    &WindowEvent::Expose(ExposeEvent {
                        rect: *rect,
                        rb: Rc::clone(&rb),
                    }),
                );
                rb.borrow_mut().restore();
            }

            buf.blit(&rb.borrow());
        }

        let children: Vec<Window> = self.inner.children.borrow().clone();
        for child in children.iter().rev() {
            let r = child.geometry();
            buf.save();
            buf.clip(r);
            buf.translate(r.top, r.left);
            child.compose_into(buf);
            buf.restore();
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Detach the window from the tree and destroy it: children are
    /// closed first, focus is released if held within this subtree,
    /// the vacated region is exposed on the parent, and destroy
    /// notifications run in reverse bind order.
    ///
    /// The handle stays valid afterwards but the window is inert.
    pub fn close(&self) {
        if self.inner.closed.get() {
            return;
        }

        let children: Vec<Window> = std::mem::take(&mut *self.inner.children.borrow_mut());
        for child in children {
            child.close();
        }

        let root = self.root_window();
        if let Some(state) = root.inner.root.as_ref() {
            let held = state
                .focused
                .borrow()
                .upgrade()
                .is_some_and(|inner| Rc::ptr_eq(&inner, &self.inner));
            if held {
                *state.focused.borrow_mut() = Weak::new();
            }
        }

        if let Some(parent) = self.parent() {
            let mut siblings = parent.inner.children.borrow_mut();
            siblings.retain(|c| !c.same(self));
            drop(siblings);
            if !self.inner.flags.get().contains(WindowFlags::HIDDEN) {
                parent.expose(Some(self.geometry()));
            }
        }
        *self.inner.parent.borrow_mut() = Weak::new();

        self.inner.closed.set(true);
        self.inner.hooks.unbind_and_destroy(self, &WindowEvent::Destroy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{KeyEventKind, KeyMod, MouseEventKind, MOUSEWHEEL_DOWN};
    use crate::pen::PenAttr;
    use crate::term::test_util::{MockTerm, SharedTerm};

    fn make_root() -> Window {
        Window::new_root(Box::new(MockTerm::new(24, 80)))
    }

    fn drain(win: &Window) {
        win.root_window().flush().unwrap();
    }

    // ==================================================================
    // Tree structure and z-order
    // ==================================================================

    #[test]
    fn test_root_geometry_from_device() {
        let root = make_root();
        assert!(root.is_root());
        assert_eq!(root.geometry(), Rect::new(0, 0, 24, 80));
        assert!(root.parent().is_none());
    }

    #[test]
    fn test_children_stack_front_first() {
        let root = make_root();
        let a = Window::new(&root, Rect::new(0, 0, 5, 5), WindowFlags::empty());
        let b = Window::new(&root, Rect::new(0, 0, 5, 5), WindowFlags::empty());
        let low = Window::new(&root, Rect::new(0, 0, 5, 5), WindowFlags::LOWEST);

        let children = root.inner.children.borrow();
        assert!(children[0].same(&b), "newest on top");
        assert!(children[1].same(&a));
        assert!(children[2].same(&low), "LOWEST goes to the back");
    }

    #[test]
    fn test_abs_geometry_sums_offsets() {
        let root = make_root();
        let outer = Window::new(&root, Rect::new(3, 4, 10, 20), WindowFlags::empty());
        let inner = Window::new(&outer, Rect::new(1, 2, 5, 5), WindowFlags::empty());
        assert_eq!(inner.geometry(), Rect::new(1, 2, 5, 5));
        assert_eq!(inner.abs_geometry(), Rect::new(4, 6, 5, 5));
    }

    #[test]
    fn test_root_parent_flag_attaches_to_root() {
        let root = make_root();
        let outer = Window::new(&root, Rect::new(3, 4, 10, 20), WindowFlags::empty());
        let popup = Window::new_popup(&outer, Rect::new(1, 1, 4, 10));
        assert!(popup.parent().unwrap().same(&root));
        assert_eq!(popup.geometry(), Rect::new(4, 5, 4, 10));
        assert!(popup.flags().contains(WindowFlags::STEAL_INPUT));
    }

    #[test]
    fn test_restacking() {
        let root = make_root();
        let a = Window::new(&root, Rect::new(0, 0, 5, 5), WindowFlags::empty());
        let b = Window::new(&root, Rect::new(0, 0, 5, 5), WindowFlags::empty());
        let c = Window::new(&root, Rect::new(0, 0, 5, 5), WindowFlags::empty());
        // Order now: c, b, a

        a.raise_to_front();
        assert!(root.inner.children.borrow()[0].same(&a));
        a.lower();
        assert!(root.inner.children.borrow()[1].same(&a));
        c.lower_to_back();
        assert!(root.inner.children.borrow()[2].same(&c));
        c.raise();
        assert!(root.inner.children.borrow()[1].same(&c));
        let _ = b;
    }

    #[test]
    fn test_restack_damages_affected_area() {
        let root = make_root();
        let a = Window::new(&root, Rect::new(0, 0, 5, 10), WindowFlags::empty());
        let b = Window::new(&root, Rect::new(0, 5, 5, 10), WindowFlags::empty());
        drain(&root);

        // b on top; raising a must repaint the overlap for both
        a.raise_to_front();
        assert_eq!(a.damage().area(), 50, "a repaints fully");
        assert_eq!(b.damage().area(), 25, "b repaints the overlap");
    }

    // ==================================================================
    // Exposure and geometry
    // ==================================================================

    #[test]
    fn test_expose_coalesces_overlaps() {
        let root = make_root();
        let win = Window::new(&root, Rect::new(0, 0, 20, 20), WindowFlags::empty());
        drain(&root);

        win.expose(Some(Rect::new(0, 0, 10, 10)));
        win.expose(Some(Rect::new(5, 5, 10, 10)));
        // Union area, not the sum
        assert_eq!(win.damage().area(), 100 + 100 - 25);
    }

    #[test]
    fn test_expose_clamps_to_extent_and_propagates_to_children() {
        let root = make_root();
        let win = Window::new(&root, Rect::new(0, 0, 10, 10), WindowFlags::empty());
        let child = Window::new(&win, Rect::new(2, 2, 4, 4), WindowFlags::empty());
        drain(&root);

        win.expose(Some(Rect::new(0, 0, 100, 100)));
        assert_eq!(win.damage().area(), 100);
        assert_eq!(child.damage().area(), 16);
        assert_eq!(child.damage().bounds(), Some(Rect::new(0, 0, 4, 4)));
    }

    #[test]
    fn test_expose_on_hidden_window_is_dropped() {
        let root = make_root();
        let win = Window::new(&root, Rect::new(0, 0, 10, 10), WindowFlags::HIDDEN);
        win.expose(None);
        assert!(win.damage().is_empty());
    }

    #[test]
    fn test_geomchange_event_and_growth_damage() {
        let root = make_root();
        let child = Window::new(&root, Rect::new(5, 5, 10, 20), WindowFlags::empty());
        drain(&root);

        let events = Rc::new(RefCell::new(Vec::new()));
        let ev = Rc::clone(&events);
        child.bind_event(EventMask::GEOMCHANGE, BindFlags::empty(), move |_, e| {
            if let WindowEvent::GeomChange(g) = e {
                ev.borrow_mut().push(*g);
            }
            false
        });

        child.set_geometry(Rect::new(5, 5, 12, 22));

        let events = events.borrow();
        assert_eq!(events.len(), 1, "exactly one geometry event");
        assert_eq!(events[0].oldrect, Rect::new(5, 5, 10, 20));
        assert_eq!(events[0].rect, Rect::new(5, 5, 12, 22));

        // The L-shaped growth region, window-relative
        assert_eq!(child.damage().area(), 12 * 22 - 10 * 20);
    }

    #[test]
    fn test_set_geometry_same_rect_is_a_no_op() {
        let root = make_root();
        let child = Window::new(&root, Rect::new(5, 5, 10, 20), WindowFlags::empty());
        drain(&root);

        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        child.bind_event(EventMask::GEOMCHANGE, BindFlags::empty(), move |_, _| {
            c.set(c.get() + 1);
            false
        });
        child.set_geometry(Rect::new(5, 5, 10, 20));
        assert_eq!(count.get(), 0);
        assert!(child.damage().is_empty());
    }

    #[test]
    fn test_shrink_exposes_vacated_area_on_parent() {
        let root = make_root();
        let child = Window::new(&root, Rect::new(5, 5, 10, 20), WindowFlags::empty());
        drain(&root);

        child.resize(8, 20);
        // Vacated rows (13,5)-(15,25) land on the root, parent-relative
        assert_eq!(root.damage().area(), 2 * 20);
        assert_eq!(root.damage().bounds(), Some(Rect::new(13, 5, 2, 20)));
    }

    #[test]
    fn test_hide_and_show() {
        let root = make_root();
        let child = Window::new(&root, Rect::new(2, 3, 4, 5), WindowFlags::empty());
        drain(&root);

        child.hide();
        assert!(!child.is_visible());
        assert!(child.damage().is_empty());
        assert_eq!(root.damage().bounds(), Some(Rect::new(2, 3, 4, 5)));

        drain(&root);
        child.show();
        assert!(child.is_visible());
        assert_eq!(child.damage().area(), 20);
    }

    // ==================================================================
    // Rendering
    // ==================================================================

    #[test]
    fn test_flush_renders_child_over_parent() {
        let shared = SharedTerm::new(4, 20);
        let root = Window::new_root(Box::new(shared.clone()));
        root.bind_event(EventMask::EXPOSE, BindFlags::empty(), |_, e| {
            if let WindowEvent::Expose(ex) = e {
                let mut rb = ex.rb.borrow_mut();
                for line in ex.rect.top..ex.rect.bottom() {
                    rb.text_at(line, ex.rect.left, &".".repeat(ex.rect.cols as usize));
                }
            }
            false
        });

        let child = Window::new(&root, Rect::new(1, 2, 1, 5), WindowFlags::empty());
        child.bind_event(EventMask::EXPOSE, BindFlags::empty(), |win, e| {
            if let WindowEvent::Expose(ex) = e {
                ex.rb.borrow_mut().text_at(0, 0, &"#".repeat(win.cols() as usize));
            }
            false
        });

        root.flush().unwrap();
        let term = shared.0.borrow();
        assert_eq!(term.screen_line(0), "....................");
        assert_eq!(term.screen_line(1), "..#####.............");
    }

    #[test]
    fn test_flush_clears_damage_and_clips_child_to_geometry() {
        let root = make_root();
        let child = Window::new(&root, Rect::new(0, 0, 2, 5), WindowFlags::empty());
        let drew = Rc::new(Cell::new(0));
        let d = Rc::clone(&drew);
        child.bind_event(EventMask::EXPOSE, BindFlags::empty(), move |_, e| {
            if let WindowEvent::Expose(ex) = e {
                // Attempt to draw outside the exposed rect
                let written = ex.rb.borrow_mut().text_at(0, 0, "0123456789");
                d.set(written);
            }
            false
        });

        root.flush().unwrap();
        assert_eq!(drew.get(), 5, "writes clipped to the window's extent");
        assert!(child.damage().is_empty());
        assert!(root.damage().is_empty());
    }

    #[test]
    fn test_damage_added_during_expose_deferred_to_next_flush() {
        let root = make_root();
        let win = Window::new(&root, Rect::new(0, 0, 5, 5), WindowFlags::empty());
        let passes = Rc::new(Cell::new(0));
        let p = Rc::clone(&passes);
        win.bind_event(EventMask::EXPOSE, BindFlags::empty(), move |w, _| {
            if p.get() == 0 {
                w.expose(Some(Rect::new(0, 0, 1, 1)));
            }
            p.set(p.get() + 1);
            false
        });

        root.flush().unwrap();
        let after_first = passes.get();
        assert_eq!(win.damage().area(), 1, "re-expose survives the pass");
        root.flush().unwrap();
        assert_eq!(passes.get(), after_first + 1);
        assert!(win.damage().is_empty());
    }

    #[test]
    fn test_window_pen_preset_on_expose_buffer() {
        let root = make_root();
        let win = Window::new(&root, Rect::new(0, 0, 5, 5), WindowFlags::empty());
        win.pen().set_colour(PenAttr::Fg, 3);

        let seen = Rc::new(Cell::new(-2));
        let s = Rc::clone(&seen);
        win.bind_event(EventMask::EXPOSE, BindFlags::empty(), move |_, e| {
            if let WindowEvent::Expose(ex) = e {
                s.set(ex.rb.borrow().pen().get_colour(PenAttr::Fg));
            }
            false
        });
        root.flush().unwrap();
        assert_eq!(seen.get(), 3);
    }

    // ==================================================================
    // Scrolling
    // ==================================================================

    #[test]
    fn test_scroll_exposes_revealed_band_only() {
        let root = make_root();
        drain(&root);

        assert!(root.scroll(3, 0).unwrap());
        assert_eq!(root.damage().bounds(), Some(Rect::new(21, 0, 3, 80)));
        assert_eq!(root.damage().area(), 3 * 80);

        drain(&root);
        assert!(root.scroll(-2, 0).unwrap());
        assert_eq!(root.damage().bounds(), Some(Rect::new(0, 0, 2, 80)));
    }

    #[test]
    fn test_scroll_failure_leaves_state_unchanged() {
        let mut term = MockTerm::new(24, 80);
        term.can_scroll = false;
        let root = Window::new_root(Box::new(term));
        drain(&root);

        assert!(!root.scroll(3, 0).unwrap());
        assert!(root.damage().is_empty());
    }

    #[test]
    fn test_scrollrect_refuses_when_child_overlaps() {
        let root = make_root();
        let child = Window::new(&root, Rect::new(5, 5, 5, 5), WindowFlags::empty());
        drain(&root);

        assert!(!root.scrollrect(Rect::new(0, 0, 24, 80), 1, 0).unwrap());
        assert!(root
            .scrollrect_over_children(Rect::new(0, 0, 24, 80), 1, 0)
            .unwrap());

        child.hide();
        drain(&root);
        assert!(root.scrollrect(Rect::new(0, 0, 24, 80), 1, 0).unwrap());
    }

    // ==================================================================
    // Focus and input
    // ==================================================================

    #[test]
    fn test_focus_out_then_in_order() {
        let root = make_root();
        let a = Window::new(&root, Rect::new(0, 0, 5, 5), WindowFlags::empty());
        let b = Window::new(&root, Rect::new(5, 0, 5, 5), WindowFlags::empty());

        let log = Rc::new(RefCell::new(Vec::new()));
        for (win, name) in [(&a, "a"), (&b, "b")] {
            let log = Rc::clone(&log);
            win.bind_event(EventMask::FOCUS, BindFlags::empty(), move |_, e| {
                if let WindowEvent::Focus(f) = e {
                    log.borrow_mut().push((name, f.kind));
                }
                false
            });
        }

        a.take_focus();
        assert!(a.is_focused());
        b.take_focus();
        assert!(b.is_focused());
        assert!(!a.is_focused());

        assert_eq!(
            *log.borrow(),
            vec![
                ("a", FocusEventKind::In),
                ("a", FocusEventKind::Out),
                ("b", FocusEventKind::In),
            ]
        );
    }

    #[test]
    fn test_take_focus_twice_is_a_no_op() {
        let root = make_root();
        let win = Window::new(&root, Rect::new(0, 0, 5, 5), WindowFlags::empty());
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        win.bind_event(EventMask::FOCUS, BindFlags::empty(), move |_, _| {
            c.set(c.get() + 1);
            false
        });
        win.take_focus();
        win.take_focus();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_focus_child_notify_walks_ancestors() {
        let root = make_root();
        let mid = Window::new(&root, Rect::new(0, 0, 10, 10), WindowFlags::empty());
        let leaf = Window::new(&mid, Rect::new(0, 0, 5, 5), WindowFlags::empty());
        mid.set_focus_child_notify(true);

        let notified = Rc::new(RefCell::new(Vec::new()));
        for (win, name) in [(&root, "root"), (&mid, "mid")] {
            let notified = Rc::clone(&notified);
            let leaf_probe = leaf.clone();
            win.bind_event(EventMask::FOCUS, BindFlags::empty(), move |_, e| {
                if let WindowEvent::Focus(f) = e {
                    assert!(f.win.same(&leaf_probe));
                    notified.borrow_mut().push(name);
                }
                false
            });
        }

        leaf.take_focus();
        // mid has the flag so it is notified; root is reached only if
        // mid's parent chain keeps the flag set, which root does not.
        assert_eq!(*notified.borrow(), vec!["mid"]);
    }

    #[test]
    fn test_key_routing_walks_up_from_focus() {
        let root = make_root();
        let mid = Window::new(&root, Rect::new(0, 0, 10, 10), WindowFlags::empty());
        let leaf = Window::new(&mid, Rect::new(0, 0, 5, 5), WindowFlags::empty());
        leaf.take_focus();

        let log = Rc::new(RefCell::new(Vec::new()));
        for (win, name, claim) in [(&leaf, "leaf", false), (&mid, "mid", true), (&root, "root", false)]
        {
            let log = Rc::clone(&log);
            win.bind_event(EventMask::KEY, BindFlags::empty(), move |_, _| {
                log.borrow_mut().push(name);
                claim
            });
        }

        let handled = root.input_key(&KeyEvent {
            kind: KeyEventKind::Key,
            mods: KeyMod::CTRL,
            text: "C-a".into(),
        });
        assert!(handled);
        // mid claims it; root never sees it
        assert_eq!(*log.borrow(), vec!["leaf", "mid"]);
    }

    #[test]
    fn test_mouse_hit_test_translates_coordinates() {
        let root = make_root();
        let child = Window::new(&root, Rect::new(5, 10, 5, 20), WindowFlags::empty());

        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        child.bind_event(EventMask::MOUSE, BindFlags::empty(), move |_, e| {
            if let WindowEvent::Mouse(m) = e {
                *s.borrow_mut() = Some((m.line, m.col));
            }
            true
        });

        let handled = root.input_mouse(&MouseEvent {
            kind: MouseEventKind::Press,
            button: 1,
            mods: KeyMod::empty(),
            line: 7,
            col: 13,
        });
        assert!(handled);
        assert_eq!(*seen.borrow(), Some((2, 3)));
    }

    #[test]
    fn test_input_resize_updates_root_and_dispatches() {
        let root = make_root();
        drain(&root);

        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        root.bind_event(EventMask::RESIZE, BindFlags::empty(), move |_, e| {
            if let WindowEvent::Resize(r) = e {
                *s.borrow_mut() = Some(*r);
            }
            false
        });

        root.input_resize(30, 100);
        assert_eq!(root.geometry(), Rect::new(0, 0, 30, 100));
        assert_eq!(
            *seen.borrow(),
            Some(ResizeEvent { lines: 30, cols: 100 })
        );
        assert_eq!(root.damage().area(), 30 * 100);

        root.input_resize(30, 100);
        assert_eq!(root.damage().area(), 30 * 100, "same size is a no-op");
    }

    #[test]
    fn test_wheel_events_route_like_presses() {
        let root = make_root();
        let child = Window::new(&root, Rect::new(5, 10, 5, 20), WindowFlags::empty());

        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        child.bind_event(EventMask::MOUSE, BindFlags::empty(), move |_, e| {
            if let WindowEvent::Mouse(m) = e {
                *s.borrow_mut() = Some((m.kind, m.button));
            }
            true
        });

        root.input_mouse(&MouseEvent {
            kind: MouseEventKind::Wheel,
            button: MOUSEWHEEL_DOWN,
            mods: KeyMod::empty(),
            line: 6,
            col: 12,
        });
        assert_eq!(
            *seen.borrow(),
            Some((MouseEventKind::Wheel, MOUSEWHEEL_DOWN))
        );
    }

    #[test]
    fn test_mouse_prefers_topmost_then_falls_through() {
        let root = make_root();
        let below = Window::new(&root, Rect::new(0, 0, 10, 10), WindowFlags::empty());
        let above = Window::new(&root, Rect::new(0, 0, 10, 10), WindowFlags::empty());

        let log = Rc::new(RefCell::new(Vec::new()));
        for (win, name, claim) in [(&below, "below", true), (&above, "above", false)] {
            let log = Rc::clone(&log);
            win.bind_event(EventMask::MOUSE, BindFlags::empty(), move |_, _| {
                log.borrow_mut().push(name);
                claim
            });
        }

        root.input_mouse(&MouseEvent {
            kind: MouseEventKind::Press,
            button: 1,
            mods: KeyMod::empty(),
            line: 2,
            col: 2,
        });
        assert_eq!(*log.borrow(), vec!["above", "below"]);
    }

    #[test]
    fn test_steal_input_sees_event_outside_its_bounds() {
        let root = make_root();
        let plain = Window::new(&root, Rect::new(0, 0, 24, 80), WindowFlags::empty());
        let popup = Window::new_popup(&plain, Rect::new(5, 5, 3, 10));

        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        popup.bind_event(EventMask::MOUSE, BindFlags::empty(), move |_, e| {
            if let WindowEvent::Mouse(m) = e {
                *s.borrow_mut() = Some((m.line, m.col));
            }
            true
        });

        // Click far away from the popup: it still intercepts, with
        // popup-relative (negative) coordinates.
        root.input_mouse(&MouseEvent {
            kind: MouseEventKind::Press,
            button: 1,
            mods: KeyMod::empty(),
            line: 0,
            col: 0,
        });
        assert_eq!(*seen.borrow(), Some((-5, -5)));
    }

    // ==================================================================
    // Lifecycle
    // ==================================================================

    #[test]
    fn test_close_detaches_exposes_and_destroys_in_reverse() {
        let root = make_root();
        let win = Window::new(&root, Rect::new(2, 2, 4, 4), WindowFlags::empty());
        drain(&root);

        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in [1, 2] {
            let order = Rc::clone(&order);
            win.bind_event(EventMask::DESTROY, BindFlags::empty(), move |_, _| {
                order.borrow_mut().push(tag);
                false
            });
        }

        win.close();
        assert_eq!(*order.borrow(), vec![2, 1]);
        assert!(root.inner.children.borrow().is_empty());
        assert_eq!(root.damage().bounds(), Some(Rect::new(2, 2, 4, 4)));

        // The handle stays usable but inert
        assert!(!win.is_visible());
        win.expose(None);
        assert!(win.damage().is_empty());
    }

    #[test]
    fn test_close_from_inside_own_expose_hook() {
        let root = make_root();
        let win = Window::new(&root, Rect::new(2, 2, 4, 4), WindowFlags::empty());

        let destroyed = Rc::new(Cell::new(false));
        let d = Rc::clone(&destroyed);
        let w = win.clone();
        win.bind_event(
            EventMask::EXPOSE | EventMask::DESTROY,
            BindFlags::empty(),
            move |_, e| {
                match e {
                    // A window tearing itself down mid-draw must not
                    // trip over its own running hook.
                    WindowEvent::Expose(_) => w.close(),
                    WindowEvent::Destroy => d.set(true),
                    _ => {}
                }
                false
            },
        );

        root.flush().unwrap();
        assert!(destroyed.get());
        assert!(root.inner.children.borrow().is_empty());
        assert!(!win.is_visible());
    }

    #[test]
    fn test_close_releases_focus() {
        let root = make_root();
        let win = Window::new(&root, Rect::new(0, 0, 5, 5), WindowFlags::empty());
        win.take_focus();
        assert!(win.is_focused());
        win.close();
        assert!(!win.is_focused());
    }

    #[test]
    fn test_close_recurses_into_children() {
        let root = make_root();
        let outer = Window::new(&root, Rect::new(0, 0, 10, 10), WindowFlags::empty());
        let inner = Window::new(&outer, Rect::new(0, 0, 5, 5), WindowFlags::empty());

        let destroyed = Rc::new(Cell::new(false));
        let d = Rc::clone(&destroyed);
        inner.bind_event(EventMask::DESTROY, BindFlags::empty(), move |_, _| {
            d.set(true);
            false
        });

        outer.close();
        assert!(destroyed.get());
        assert!(inner.parent().is_none());
    }
}
