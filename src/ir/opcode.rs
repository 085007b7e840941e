//! Opcodes and their static properties.

use std::fmt;

/// Broad class of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Regular ALU operation.
    Alu,
    /// Extended-math (transcendental) operation.
    Math,
    /// Message ("send") operation.
    Send,
    /// Structured control-flow pseudo-op.
    ControlFlow,
    /// No-op placeholder, removed by dead-code elimination.
    Nop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Mov,
    Sel,
    Not,
    And,
    Or,
    Xor,
    Shr,
    Shl,
    Asr,
    Cmp,
    Add,
    Mul,
    Mad,
    Lrp,
    Dp4,
    Dph,
    Dp3,
    Dp2,
    Frc,
    Rndd,
    Rnde,
    Rndz,
    Broadcast,
    Rcp,
    Rsq,
    Sqrt,
    Exp2,
    Log2,
    Sin,
    Cos,
    Pow,
    IntDiv,
    IntRem,
    UrbWrite,
    Tex,
    PullConstantLoad,
    ScratchRead,
    ScratchWrite,
    If,
    Else,
    Endif,
    Do,
    While,
    Break,
    Continue,
    Nop,
}

/// Static properties of an opcode.
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub name: &'static str,
    pub kind: OpKind,
    pub num_srcs: usize,
    /// Source 0 and source 1 may be swapped.
    pub commutative: bool,
    /// Result is a pure function of the sources (a CSE candidate).
    pub expression: bool,
    /// Must not be removed even if its result is unused.
    pub side_effects: bool,
}

const fn alu(name: &'static str, num_srcs: usize, commutative: bool) -> OpInfo {
    OpInfo {
        name,
        kind: OpKind::Alu,
        num_srcs,
        commutative,
        expression: true,
        side_effects: false,
    }
}

const fn math(name: &'static str, num_srcs: usize) -> OpInfo {
    OpInfo {
        name,
        kind: OpKind::Math,
        num_srcs,
        commutative: false,
        expression: true,
        side_effects: false,
    }
}

const fn send(name: &'static str, num_srcs: usize, side_effects: bool) -> OpInfo {
    OpInfo {
        name,
        kind: OpKind::Send,
        num_srcs,
        commutative: false,
        expression: false,
        side_effects,
    }
}

const fn cf(name: &'static str) -> OpInfo {
    OpInfo {
        name,
        kind: OpKind::ControlFlow,
        num_srcs: 0,
        commutative: false,
        expression: false,
        side_effects: true,
    }
}

impl Opcode {
    pub const ALL: [Opcode; 46] = [
        Opcode::Mov,
        Opcode::Sel,
        Opcode::Not,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Shr,
        Opcode::Shl,
        Opcode::Asr,
        Opcode::Cmp,
        Opcode::Add,
        Opcode::Mul,
        Opcode::Mad,
        Opcode::Lrp,
        Opcode::Dp4,
        Opcode::Dph,
        Opcode::Dp3,
        Opcode::Dp2,
        Opcode::Frc,
        Opcode::Rndd,
        Opcode::Rnde,
        Opcode::Rndz,
        Opcode::Broadcast,
        Opcode::Rcp,
        Opcode::Rsq,
        Opcode::Sqrt,
        Opcode::Exp2,
        Opcode::Log2,
        Opcode::Sin,
        Opcode::Cos,
        Opcode::Pow,
        Opcode::IntDiv,
        Opcode::IntRem,
        Opcode::UrbWrite,
        Opcode::Tex,
        Opcode::PullConstantLoad,
        Opcode::ScratchRead,
        Opcode::ScratchWrite,
        Opcode::If,
        Opcode::Else,
        Opcode::Endif,
        Opcode::Do,
        Opcode::While,
        Opcode::Break,
        Opcode::Continue,
        Opcode::Nop,
    ];

    pub const fn info(self) -> OpInfo {
        use Opcode::*;
        match self {
            // A plain copy is left to copy propagation rather than CSE.
            Mov => OpInfo { expression: false, ..alu("mov", 1, false) },
            Sel => alu("sel", 2, false),
            Not => alu("not", 1, false),
            And => alu("and", 2, true),
            Or => alu("or", 2, true),
            Xor => alu("xor", 2, true),
            Shr => alu("shr", 2, false),
            Shl => alu("shl", 2, false),
            Asr => alu("asr", 2, false),
            Cmp => alu("cmp", 2, false),
            Add => alu("add", 2, true),
            Mul => alu("mul", 2, true),
            Mad => alu("mad", 3, false),
            Lrp => alu("lrp", 3, false),
            Dp4 => alu("dp4", 2, false),
            Dph => alu("dph", 2, false),
            Dp3 => alu("dp3", 2, false),
            Dp2 => alu("dp2", 2, false),
            Frc => alu("frc", 1, false),
            Rndd => alu("rndd", 1, false),
            Rnde => alu("rnde", 1, false),
            Rndz => alu("rndz", 1, false),
            Broadcast => alu("broadcast", 2, false),
            Rcp => math("rcp", 1),
            Rsq => math("rsq", 1),
            Sqrt => math("sqrt", 1),
            Exp2 => math("exp2", 1),
            Log2 => math("log2", 1),
            Sin => math("sin", 1),
            Cos => math("cos", 1),
            Pow => math("pow", 2),
            IntDiv => math("intdiv", 2),
            IntRem => math("intrem", 2),
            UrbWrite => send("urb_write", 1, true),
            Tex => send("tex", 1, false),
            PullConstantLoad => send("pull_constant_load", 1, false),
            ScratchRead => send("scratch_read", 1, false),
            ScratchWrite => send("scratch_write", 2, true),
            If => OpInfo { num_srcs: 0, ..cf("if") },
            Else => cf("else"),
            Endif => cf("endif"),
            Do => cf("do"),
            While => cf("while"),
            Break => cf("break"),
            Continue => cf("continue"),
            Nop => OpInfo {
                name: "nop",
                kind: OpKind::Nop,
                num_srcs: 0,
                commutative: false,
                expression: false,
                side_effects: false,
            },
        }
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Opcode::ALL.iter().copied().find(|op| op.name() == name)
    }

    pub fn kind(self) -> OpKind {
        self.info().kind
    }

    pub fn num_srcs(self) -> usize {
        self.info().num_srcs
    }

    pub fn is_commutative(self) -> bool {
        self.info().commutative
    }

    pub fn is_math(self) -> bool {
        self.kind() == OpKind::Math
    }

    pub fn is_send(self) -> bool {
        self.kind() == OpKind::Send
    }

    pub fn is_control_flow(self) -> bool {
        self.kind() == OpKind::ControlFlow
    }

    pub fn is_3src(self) -> bool {
        self.num_srcs() == 3
    }

    pub fn is_dot_product(self) -> bool {
        matches!(self, Opcode::Dp4 | Opcode::Dph | Opcode::Dp3 | Opcode::Dp2)
    }

    pub fn is_scratch(self) -> bool {
        matches!(self, Opcode::ScratchRead | Opcode::ScratchWrite)
    }

    /// Whether the destination may name the same virtual register as a
    /// source. These ops read every source channel before writing.
    pub fn dst_src_alias_safe(self) -> bool {
        match self.kind() {
            OpKind::Alu => self != Opcode::Broadcast,
            OpKind::Math => true,
            _ => false,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Predication of an instruction on the flag register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Predicate {
    #[default]
    None,
    /// Each lane is controlled by its own flag bit.
    Normal,
    /// Every lane runs if any of the four flag bits is set.
    Any4h,
    /// Every lane runs if all four flag bits are set.
    All4h,
}

impl Predicate {
    pub fn suffix(self) -> &'static str {
        match self {
            Predicate::None | Predicate::Normal => "",
            Predicate::Any4h => ".any4h",
            Predicate::All4h => ".all4h",
        }
    }
}

/// Conditional modifier: the flag result computed alongside an ALU result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CondMod {
    #[default]
    None,
    Z,
    Nz,
    G,
    Ge,
    L,
    Le,
    O,
    U,
}

impl CondMod {
    pub const fn name(self) -> &'static str {
        match self {
            CondMod::None => "",
            CondMod::Z => "z",
            CondMod::Nz => "nz",
            CondMod::G => "g",
            CondMod::Ge => "ge",
            CondMod::L => "l",
            CondMod::Le => "le",
            CondMod::O => "o",
            CondMod::U => "u",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "z" | "eq" => CondMod::Z,
            "nz" | "ne" => CondMod::Nz,
            "g" => CondMod::G,
            "ge" => CondMod::Ge,
            "l" => CondMod::L,
            "le" => CondMod::Le,
            "o" => CondMod::O,
            "u" => CondMod::U,
            _ => return None,
        })
    }

    /// Condition that holds for `b op a` when `self` holds for `a op b`.
    pub const fn swapped(self) -> Self {
        match self {
            CondMod::G => CondMod::L,
            CondMod::Ge => CondMod::Le,
            CondMod::L => CondMod::G,
            CondMod::Le => CondMod::Ge,
            other => other,
        }
    }
}
