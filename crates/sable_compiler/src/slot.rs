//! Where a compiled value lives.

use bitflags::bitflags;
use sable_foundation::Value;

bitflags! {
    /// Properties of a [`Slot`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct SlotFlags: u32 {
        /// The value is known at compile time and held in `constant`.
        const CONSTANT = 1 << 0;
        /// Bound to a name; never freed as a temporary.
        const NAMED = 1 << 1;
        /// Assignable with `set`.
        const MUTABLE = 1 << 2;
        /// `constant` is a one-element cell read and written by index.
        const REFERENCE = 1 << 3;
        /// A return has already been emitted for this value.
        const RETURNED = 1 << 4;
        /// Produced by `splice`; expands into several arguments.
        const SPLICED = 1 << 5;
    }
}

/// Compile-time description of a value's location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    /// Properties.
    pub flags: SlotFlags,
    /// Register, or -1 when not in a register.
    pub index: i32,
    /// -1 for the current frame, otherwise an environment number.
    pub env_index: i32,
    /// Constant value or reference cell.
    pub constant: Value,
}

impl Slot {
    /// A compile-time constant.
    #[must_use]
    pub fn constant(value: Value) -> Self {
        Self {
            flags: SlotFlags::CONSTANT,
            index: -1,
            env_index: -1,
            constant: value,
        }
    }

    /// The constant nil.
    #[must_use]
    pub fn nil() -> Self {
        Self::constant(Value::Nil)
    }

    /// A register in the current frame.
    #[must_use]
    pub fn register(index: u32) -> Self {
        Self {
            flags: SlotFlags::empty(),
            index: i32::try_from(index).unwrap_or(i32::MAX),
            env_index: -1,
            constant: Value::Nil,
        }
    }

    /// A mutable global reached through a reference cell.
    #[must_use]
    pub fn reference(cell: Value) -> Self {
        Self {
            flags: SlotFlags::REFERENCE | SlotFlags::NAMED | SlotFlags::MUTABLE,
            index: -1,
            env_index: -1,
            constant: cell,
        }
    }

    /// Adds flags.
    #[must_use]
    pub fn with_flags(mut self, flags: SlotFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Returns true for compile-time constants.
    #[must_use]
    pub const fn is_constant(&self) -> bool {
        self.flags.contains(SlotFlags::CONSTANT)
    }

    /// Returns true for reference-cell slots.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        self.flags.contains(SlotFlags::REFERENCE)
    }

    /// Returns true if the slot lives in an enclosing function's frame.
    #[must_use]
    pub const fn is_upvalue(&self) -> bool {
        self.env_index >= 0
    }

    /// Returns the register when the slot is a plain local register.
    #[must_use]
    pub fn local_register(&self) -> Option<u32> {
        if self.is_constant() || self.is_reference() || self.is_upvalue() {
            return None;
        }
        u32::try_from(self.index).ok()
    }

    /// Returns true if both slots name the same location.
    #[must_use]
    pub fn same_location(&self, other: &Self) -> bool {
        let location = SlotFlags::CONSTANT | SlotFlags::REFERENCE;
        if (self.flags & location) != (other.flags & location) {
            return false;
        }
        if self.is_constant() || self.is_reference() {
            return self.constant == other.constant;
        }
        self.index == other.index && self.env_index == other.env_index
    }
}

bitflags! {
    /// How a form's result will be used.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct FormFlags: u32 {
        /// The result is discarded.
        const DROP = 1 << 0;
        /// The form is in tail position.
        const TAIL = 1 << 1;
        /// `hint` names a preferred destination.
        const HINT = 1 << 2;
        /// `splice` is allowed here.
        const ACCEPT_SPLICE = 1 << 3;
    }
}

/// Options passed down when compiling one form.
#[derive(Clone, Debug, Default)]
pub struct FormOptions {
    /// Usage flags.
    pub flags: FormFlags,
    /// Preferred destination when `HINT` is set.
    pub hint: Option<Slot>,
}

impl FormOptions {
    /// Result is used, no hint.
    #[must_use]
    pub fn value() -> Self {
        Self::default()
    }

    /// Result is discarded.
    #[must_use]
    pub fn drop() -> Self {
        Self {
            flags: FormFlags::DROP,
            hint: None,
        }
    }

    /// Tail position.
    #[must_use]
    pub fn tail() -> Self {
        Self {
            flags: FormFlags::TAIL,
            hint: None,
        }
    }

    /// Result should land in `slot`.
    #[must_use]
    pub fn hinted(slot: Slot) -> Self {
        Self {
            flags: FormFlags::HINT,
            hint: Some(slot),
        }
    }

    /// Adds flags.
    #[must_use]
    pub fn with_flags(mut self, flags: FormFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Returns true if the result is discarded.
    #[must_use]
    pub const fn is_drop(&self) -> bool {
        self.flags.contains(FormFlags::DROP)
    }

    /// Returns true in tail position.
    #[must_use]
    pub const fn is_tail(&self) -> bool {
        self.flags.contains(FormFlags::TAIL)
    }

    /// Returns the hint, if one is set.
    #[must_use]
    pub fn hint(&self) -> Option<&Slot> {
        if self.flags.contains(FormFlags::HINT) {
            self.hint.as_ref()
        } else {
            None
        }
    }

    /// The same destination without tail or drop: for subforms whose value
    /// flows into this form's result.
    #[must_use]
    pub fn subform(&self) -> Self {
        Self {
            flags: self.flags & FormFlags::HINT,
            hint: self.hint.clone(),
        }
    }
}
