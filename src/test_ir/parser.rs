//! Text IR parser implementation.

use hashbrown::HashMap;
use thiserror::Error;

use crate::ir::program::UniformArray;
use crate::ir::{
    f32_to_vf, CondMod, Dst, Instruction, OpKind, Opcode, Predicate, Program, RegFile, RegType, Src, Swizzle,
    WriteMask,
};

/// Largest register number, and largest count a directive may give.
pub const MAX_REGISTERS: u32 = 1 << 16;

/// Largest `.decl` size in register units.
pub const MAX_DECL_SIZE: u32 = 1024;

/// A parse failure, with the 1-based line it happened on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

/// Parse a whole program.
pub fn parse_program(text: &str) -> Result<Program, ParseError> {
    let opcodes = opcode_table();
    let mut builder = ProgramBuilder::default();
    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        let content = raw.split(';').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        let mut parser = Parser::new(content, &opcodes);
        let result = if content.starts_with('.') {
            parser.parse_directive(line, &mut builder)
        } else {
            parser.parse_instruction().map(|inst| builder.push(inst))
        };
        result.map_err(|message| ParseError { line, message })?;
    }
    builder.finish()
}

/// Parse a single instruction line.
pub fn parse_instruction(text: &str) -> Result<Instruction, ParseError> {
    let opcodes = opcode_table();
    Parser::new(text.trim(), &opcodes)
        .parse_instruction()
        .map_err(|message| ParseError { line: 1, message })
}

fn opcode_table() -> HashMap<&'static str, Opcode> {
    Opcode::ALL.iter().map(|&op| (op.name(), op)).collect()
}

#[derive(Default)]
struct ProgramBuilder {
    /// Declared VGRF sizes, with the line of the declaration.
    decls: HashMap<u32, (u32, usize)>,
    instructions: Vec<Instruction>,
    vgrf_count: u32,
    attr_count: u32,
    uniform_count: u32,
    attributes: Option<u32>,
    uniforms: Option<u32>,
    arrays: Vec<UniformArray>,
}

impl ProgramBuilder {
    fn note(&mut self, file: RegFile, nr: u32) {
        let count = match file {
            RegFile::Vgrf => &mut self.vgrf_count,
            RegFile::Attr => &mut self.attr_count,
            RegFile::Uniform => &mut self.uniform_count,
            _ => return,
        };
        *count = (*count).max(nr + 1);
    }

    fn note_src(&mut self, src: &Src) {
        self.note(src.file, src.nr);
        if let Some(reladdr) = &src.reladdr {
            self.note_src(reladdr);
        }
    }

    fn push(&mut self, inst: Instruction) {
        self.note(inst.dst.file, inst.dst.nr);
        if let Some(reladdr) = &inst.dst.reladdr {
            self.note_src(reladdr);
        }
        for src in inst.srcs() {
            self.note_src(src);
        }
        self.instructions.push(inst);
    }

    fn finish(self) -> Result<Program, ParseError> {
        let mut program = Program::new();
        let count = self.decls.keys().map(|&nr| nr + 1).fold(self.vgrf_count, u32::max);
        for nr in 0..count {
            let size = self.decls.get(&nr).map_or(1, |&(size, _)| size);
            program.alloc.allocate(size).map_err(|e| ParseError {
                line: self.decls.get(&nr).map_or(0, |&(_, line)| line),
                message: e.to_string(),
            })?;
        }
        program.instructions = self.instructions;
        program.nr_attributes = self.attributes.unwrap_or(self.attr_count);
        program.nr_uniforms = self.uniforms.unwrap_or(self.uniform_count);
        program.uniform_arrays = self.arrays;
        Ok(program)
    }
}

/// Cursor over one line.
struct Parser<'a> {
    text: &'a str,
    pos: usize,
    opcodes: &'a HashMap<&'static str, Opcode>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, opcodes: &'a HashMap<&'static str, Opcode>) -> Self {
        Self { text, pos: 0, opcodes }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn current_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.current_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn is_eol(&mut self) -> bool {
        self.skip_whitespace();
        self.pos >= self.text.len()
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace();
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), String> {
        if !self.try_read(ch) {
            return Err(format!("expected '{ch}' at {:?}", self.rest()));
        }
        Ok(())
    }

    /// Read characters matching `pred` without skipping whitespace first.
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.current_char().is_some_and(&pred) {
            self.advance();
        }
        &self.text[start..self.pos]
    }

    fn read_identifier(&mut self) -> Result<&'a str, String> {
        self.skip_whitespace();
        let word = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
        if word.is_empty() {
            return Err(format!("expected an identifier at {:?}", self.rest()));
        }
        Ok(word)
    }

    fn read_number(&mut self) -> Result<u32, String> {
        self.skip_whitespace();
        let digits = self.take_while(|c| c.is_ascii_digit());
        digits
            .parse()
            .map_err(|_| format!("expected a number at {:?}", self.rest()))
    }

    fn read_bounded(&mut self, what: &str, max: u32) -> Result<u32, String> {
        let value = self.read_number()?;
        if value > max {
            return Err(format!("{what} {value} exceeds {max}"));
        }
        Ok(value)
    }

    fn parse_directive(&mut self, line: usize, builder: &mut ProgramBuilder) -> Result<(), String> {
        self.expect('.')?;
        let name = self.read_identifier()?;
        match name {
            "decl" => {
                let (file, nr) = self.parse_reg_name()?;
                if file != RegFile::Vgrf {
                    return Err(format!("cannot declare a {file:?} register"));
                }
                if self.read_identifier()? != "size" {
                    return Err("expected size=".to_string());
                }
                self.expect('=')?;
                let size = self.read_bounded("register size", MAX_DECL_SIZE)?;
                if let Some(&(_, first)) = builder.decls.get(&nr) {
                    return Err(format!("vgrf{nr} already declared on line {first}"));
                }
                builder.decls.insert(nr, (size, line));
            }
            "attributes" => builder.attributes = Some(self.read_bounded("attribute count", MAX_REGISTERS)?),
            "uniforms" => builder.uniforms = Some(self.read_bounded("uniform count", MAX_REGISTERS)?),
            "uniform_array" => {
                let start = self.read_bounded("uniform array start", MAX_REGISTERS)?;
                let len = self.read_bounded("uniform array length", MAX_REGISTERS)?;
                builder.arrays.push(UniformArray { start, len });
            }
            other => return Err(format!("unknown directive .{other}")),
        }
        if !self.is_eol() {
            return Err(format!("trailing text {:?}", self.rest()));
        }
        Ok(())
    }

    fn parse_instruction(&mut self) -> Result<Instruction, String> {
        let mut predicate = Predicate::None;
        let mut predicate_inverse = false;
        if self.try_read('(') {
            predicate_inverse = match self.current_char() {
                Some('+') => false,
                Some('-') => true,
                _ => return Err("expected '+' or '-' in predicate".to_string()),
            };
            self.advance();
            if self.read_identifier()? != "f0" {
                return Err("predicates read f0".to_string());
            }
            predicate = Predicate::Normal;
            if self.try_read('.') {
                predicate = match self.read_identifier()? {
                    "any4h" => Predicate::Any4h,
                    "all4h" => Predicate::All4h,
                    other => return Err(format!("unknown predicate mode {other}")),
                };
            }
            self.expect(')')?;
        }

        let name = self.read_identifier()?;
        let opcode = *self
            .opcodes
            .get(name)
            .ok_or_else(|| format!("unknown opcode `{name}`"))?;
        let mut cmod = CondMod::None;
        let mut saturate = false;
        while self.try_read('.') {
            match self.read_identifier()? {
                "sat" => saturate = true,
                m => cmod = CondMod::from_name(m).ok_or_else(|| format!("unknown modifier .{m}"))?,
            }
        }

        let mut inst = if matches!(opcode.kind(), OpKind::ControlFlow | OpKind::Nop) {
            Instruction::bare(opcode)
        } else {
            let dst = self.parse_dst()?;
            let mut srcs = Vec::with_capacity(opcode.num_srcs());
            for _ in 0..opcode.num_srcs() {
                self.expect(',')?;
                srcs.push(self.parse_src()?);
            }
            Instruction::new(opcode, dst, &srcs)
        };
        inst.predicate = predicate;
        inst.predicate_inverse = predicate_inverse;
        inst.cmod = cmod;
        inst.saturate = saturate;

        while !self.is_eol() {
            let key = self.read_identifier()?;
            match key {
                "nomask" => inst.force_writemask_all = true,
                "acc" => inst.writes_accumulator = true,
                "nodd_check" => inst.no_dd_check = true,
                "nodd_clear" => inst.no_dd_clear = true,
                _ => {
                    self.expect('=')?;
                    let value = self.read_number()?;
                    match key {
                        "exec" => inst.exec_size = u8::try_from(value).map_err(|_| "exec size out of range")?,
                        "group" => inst.group = u8::try_from(value).map_err(|_| "group out of range")?,
                        "mlen" => inst.mlen = value,
                        "base_mrf" => inst.base_mrf = Some(value),
                        "header" => inst.header_size = value,
                        "offset" => inst.offset = value,
                        "size" => inst.size_written = value,
                        _ => return Err(format!("unknown attribute `{key}`")),
                    }
                }
            }
        }
        Ok(inst)
    }

    /// `vgrf3`, `g4`, `m1`, `attr0`, `u2` or `null`.
    fn parse_reg_name(&mut self) -> Result<(RegFile, u32), String> {
        let word = self.read_identifier()?;
        if word == "null" {
            return Ok((RegFile::Null, 0));
        }
        let split = word.find(|c: char| c.is_ascii_digit()).unwrap_or(word.len());
        let (prefix, digits) = word.split_at(split);
        let file = match prefix {
            "vgrf" => RegFile::Vgrf,
            "g" => RegFile::Fixed,
            "m" => RegFile::Mrf,
            "attr" => RegFile::Attr,
            "u" => RegFile::Uniform,
            _ => return Err(format!("unknown register `{word}`")),
        };
        let nr: u32 = digits.parse().map_err(|_| format!("bad register number in `{word}`"))?;
        if nr >= MAX_REGISTERS {
            return Err(format!("register number in `{word}` exceeds {}", MAX_REGISTERS - 1));
        }
        Ok((file, nr))
    }

    /// Register name, optional `[reladdr]` and optional `+offset`.
    fn parse_reg(&mut self) -> Result<(RegFile, u32, Option<Box<Src>>, u32), String> {
        let (file, nr) = self.parse_reg_name()?;
        let reladdr = if self.current_char() == Some('[') {
            self.advance();
            let r = self.parse_src()?;
            self.expect(']')?;
            Some(Box::new(r))
        } else {
            None
        };
        let offset = if self.current_char() == Some('+') {
            self.advance();
            self.read_number()?
        } else {
            0
        };
        Ok((file, nr, reladdr, offset))
    }

    fn parse_type(&mut self) -> Result<RegType, String> {
        self.expect(':')?;
        let suffix = self.read_identifier()?;
        RegType::from_suffix(suffix).ok_or_else(|| format!("unknown type `{suffix}`"))
    }

    fn parse_dst(&mut self) -> Result<Dst, String> {
        self.skip_whitespace();
        let (file, nr, reladdr, offset) = self.parse_reg()?;
        let mut writemask = WriteMask::XYZW;
        if self.current_char() == Some('.') {
            self.advance();
            writemask = if self.current_char() == Some('-') {
                self.advance();
                WriteMask::NONE
            } else {
                let mask = self.take_while(|c| c.is_ascii_alphabetic());
                WriteMask::parse(mask).ok_or_else(|| format!("bad writemask .{mask}"))?
            };
        }
        let ty = self.parse_type()?;
        Ok(Dst {
            file,
            nr,
            offset,
            ty,
            writemask,
            reladdr,
        })
    }

    fn parse_src(&mut self) -> Result<Src, String> {
        self.skip_whitespace();
        let mut negate = false;
        let rest = self.rest();
        if rest.starts_with('-') && !rest[1..].starts_with(|c: char| c.is_ascii_digit()) {
            self.advance();
            negate = true;
        }
        let abs = self.try_read('|');
        self.skip_whitespace();

        let literal = self.rest().starts_with(|c: char| c.is_ascii_digit() || c == '-')
            || ["inf", "NaN", "vf["].iter().any(|p| self.rest().starts_with(p));
        let mut src = if literal {
            self.parse_literal()?
        } else {
            let (file, nr, reladdr, offset) = self.parse_reg()?;
            let mut src = Src::reg(file, nr, RegType::F);
            src.reladdr = reladdr;
            src.offset = offset;
            src
        };

        if self.current_char() == Some('.') {
            self.advance();
            let lanes = self.take_while(|c| c.is_ascii_alphabetic());
            src.swizzle = Swizzle::parse(lanes).ok_or_else(|| format!("bad swizzle .{lanes}"))?;
        }
        if abs {
            self.expect('|')?;
        }
        src.negate = negate;
        src.abs = abs;

        if src.is_imm() {
            return src
                .fold_imm_modifiers()
                .ok_or_else(|| "immediate modifiers cannot be folded".to_string());
        }
        src.ty = self.parse_type()?;
        Ok(src)
    }

    fn parse_literal(&mut self) -> Result<Src, String> {
        if self.rest().starts_with("vf[") {
            self.pos += 3;
            let mut lanes = [0u8; 4];
            for (i, lane) in lanes.iter_mut().enumerate() {
                if i > 0 {
                    self.expect(',')?;
                }
                self.skip_whitespace();
                let text = self.read_float_text();
                let value: f32 = text.parse().map_err(|_| format!("bad float `{text}`"))?;
                *lane = f32_to_vf(value).ok_or_else(|| format!("{value} is not a vector-float"))?;
            }
            self.expect(']')?;
            return Ok(Src::imm_vf(lanes));
        }

        let text = self.read_float_text();
        let suffix = self.take_while(|c| c.is_ascii_alphabetic());
        let bad = || format!("bad immediate `{text}{suffix}`");
        Ok(match suffix {
            "f" => Src::imm_f(text.parse().map_err(|_| bad())?),
            "d" => Src::imm_d(text.parse().map_err(|_| bad())?),
            "u" => Src::imm_ud(text.parse().map_err(|_| bad())?),
            "w" => Src::imm_bits(u32::from(text.parse::<i16>().map_err(|_| bad())? as u16), RegType::W),
            "uw" => Src::imm_bits(u32::from(text.parse::<u16>().map_err(|_| bad())?), RegType::UW),
            "df" => Src::imm_bits(text.parse().map_err(|_| bad())?, RegType::DF),
            _ => return Err(bad()),
        })
    }

    /// Sign, digits, fraction and exponent, or `inf`/`NaN`.
    fn read_float_text(&mut self) -> &'a str {
        let start = self.pos;
        if self.current_char() == Some('-') {
            self.advance();
        }
        if self.rest().starts_with("inf") || self.rest().starts_with("NaN") {
            self.pos += 3;
            return &self.text[start..self.pos];
        }
        self.take_while(|c| c.is_ascii_digit());
        if self.current_char() == Some('.') && self.rest()[1..].starts_with(|c: char| c.is_ascii_digit()) {
            self.advance();
            self.take_while(|c| c.is_ascii_digit());
        }
        if matches!(self.current_char(), Some('e' | 'E')) {
            let exp = &self.rest()[1..];
            let signed = exp.starts_with(['+', '-']) && exp[1..].starts_with(|c: char| c.is_ascii_digit());
            if signed || exp.starts_with(|c: char| c.is_ascii_digit()) {
                self.advance();
                if signed {
                    self.advance();
                }
                self.take_while(|c| c.is_ascii_digit());
            }
        }
        &self.text[start..self.pos]
    }
}
