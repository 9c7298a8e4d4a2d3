//! The Sable instruction set.
//!
//! Every instruction is one 32-bit word whose low byte is the opcode. The
//! opcode alone decides the layout of the remaining 24 bits, described by
//! [`Shape`]. Register operands come in two widths: "near" registers fit in
//! one byte, "far" registers use sixteen bits.

#![allow(clippy::doc_markdown)]

/// Field layout of an instruction word, after the opcode byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shape {
    /// No operands.
    None,
    /// One 24-bit register.
    S,
    /// One signed 24-bit jump displacement.
    L,
    /// Near register, far register.
    SS,
    /// Near register, signed 16-bit jump displacement.
    SL,
    /// Near register, signed 16-bit immediate.
    SI,
    /// Near register, 16-bit nested function index.
    SD,
    /// Near register, 16-bit constant index.
    SC,
    /// Three near registers.
    SSS,
    /// Two near registers, signed 8-bit immediate.
    SSI,
    /// Two near registers, unsigned 8-bit immediate.
    SSU,
    /// Near register, environment index, register within that environment.
    SES,
}

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $code:literal, $shape:ident, $mnemonic:literal;)*) => {
        /// A single bytecode opcode.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($(#[$doc])* $name = $code,)*
        }

        impl Opcode {
            /// All opcodes, in numeric order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            /// Returns the operand layout of this opcode.
            #[must_use]
            pub const fn shape(self) -> Shape {
                match self {
                    $(Self::$name => Shape::$shape,)*
                }
            }

            /// Returns the disassembler mnemonic.
            #[must_use]
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$name => $mnemonic,)*
                }
            }

            /// Decodes an opcode byte.
            #[must_use]
            pub const fn from_u8(byte: u8) -> Option<Self> {
                match byte {
                    $($code => Some(Self::$name),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    /// Does nothing; removed by no-op compaction.
    Noop = 0, None, "noop";
    /// Raise the value in `a` as an error.
    Error = 1, S, "error";
    /// Return nil.
    ReturnNil = 2, None, "return-nil";
    /// Return the value in `a`.
    Return = 3, S, "return";
    /// Unconditional relative jump.
    Jump = 4, L, "jump";
    /// Jump if `a` is truthy.
    JumpIf = 5, SL, "jump-if";
    /// Jump if `a` is falsy.
    JumpIfNot = 6, SL, "jump-if-not";
    /// Jump if `a` is nil.
    JumpIfNil = 7, SL, "jump-if-nil";
    /// Jump if `a` is not nil.
    JumpIfNotNil = 8, SL, "jump-if-not-nil";
    /// `a = nil`
    LoadNil = 9, S, "load-nil";
    /// `a = true`
    LoadTrue = 10, S, "load-true";
    /// `a = false`
    LoadFalse = 11, S, "load-false";
    /// `a = immediate`
    LoadInteger = 12, SI, "load-integer";
    /// `a = constants[index]`
    LoadConstant = 13, SC, "load-constant";
    /// `a = envs[env][index]`
    LoadUpvalue = 14, SES, "load-upvalue";
    /// `envs[env][index] = a`
    SetUpvalue = 15, SES, "set-upvalue";
    /// `a = the running closure`
    LoadSelf = 16, S, "load-self";
    /// `a = new closure over defs[index]`
    Closure = 17, SD, "closure";
    /// Near destination `a`, far source `b`.
    MoveNear = 18, SS, "move-near";
    /// Near source `a`, far destination `b`.
    MoveFar = 19, SS, "move-far";
    /// Push `a` as an argument.
    Push = 20, S, "push";
    /// Push `a` then `b`.
    Push2 = 21, SS, "push-2";
    /// Push `a`, `b`, then `c`.
    Push3 = 22, SSS, "push-3";
    /// Push every element of the indexed value in `a`.
    PushArray = 23, S, "push-array";
    /// `a = call b` with the pushed arguments.
    Call = 24, SS, "call";
    /// Replace the running call with `call a`.
    Tailcall = 25, S, "tailcall";
    /// `a = b + c`
    Add = 26, SSS, "add";
    /// `a = b + immediate`
    AddImmediate = 27, SSI, "add-immediate";
    /// `a = b - c`
    Subtract = 28, SSS, "subtract";
    /// `a = b - immediate`
    SubtractImmediate = 29, SSI, "subtract-immediate";
    /// `a = b * c`
    Multiply = 30, SSS, "multiply";
    /// `a = b * immediate`
    MultiplyImmediate = 31, SSI, "multiply-immediate";
    /// `a = b / c`
    Divide = 32, SSS, "divide";
    /// `a = b / immediate`
    DivideImmediate = 33, SSI, "divide-immediate";
    /// `a = b % c`
    Modulo = 34, SSS, "modulo";
    /// `a = b == c`
    Equals = 35, SSS, "equals";
    /// `a = b != c`
    NotEquals = 36, SSS, "not-equals";
    /// `a = b < c`
    LessThan = 37, SSS, "less-than";
    /// `a = b <= c`
    LessThanEqual = 38, SSS, "less-than-equal";
    /// `a = b > c`
    GreaterThan = 39, SSS, "greater-than";
    /// `a = b >= c`
    GreaterThanEqual = 40, SSS, "greater-than-equal";
    /// `a = b[c]`, nil when missing.
    Get = 41, SSS, "get";
    /// `a[b] = c`
    Put = 42, SSS, "put";
    /// `a = b[immediate]`
    GetIndex = 43, SSU, "get-index";
    /// `a[immediate] = b`
    PutIndex = 44, SSU, "put-index";
    /// `a = b[c]`, error on a bad index.
    In = 45, SSS, "in";
    /// `a = length of b`
    Length = 46, SS, "length";
    /// `a = array of pushed arguments`
    MakeArray = 47, S, "make-array";
    /// `a = tuple of pushed arguments`
    MakeTuple = 48, S, "make-tuple";
    /// `a = bracket tuple of pushed arguments`
    MakeBracketTuple = 49, S, "make-bracket-tuple";
    /// `a = struct of pushed key/value pairs`
    MakeStruct = 50, S, "make-struct";
    /// `a = table of pushed key/value pairs`
    MakeTable = 51, S, "make-table";
    /// `a = buffer of the pushed values' text`
    MakeBuffer = 52, S, "make-buffer";
}

impl Opcode {
    /// Returns true if a function may end with this opcode.
    #[must_use]
    pub const fn is_terminator(self) -> bool {
        matches!(
            self,
            Self::Return | Self::ReturnNil | Self::Jump | Self::Error | Self::Tailcall
        )
    }

    /// Returns true for jumps that carry a displacement.
    #[must_use]
    pub const fn is_jump(self) -> bool {
        matches!(self.shape(), Shape::L | Shape::SL)
    }
}
