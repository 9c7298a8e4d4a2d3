//! Human-readable listings of function records.

use std::fmt;

use sable_foundation::{Capture, Error, FuncDef, Instr, Result, Span, SymbolInfo, Value, VerifyError};

/// A decoded function record.
#[derive(Clone, Debug)]
pub struct Listing {
    /// Display name.
    pub name: String,
    /// Source name.
    pub source: Option<String>,
    /// Fixed parameters.
    pub arity: u32,
    /// Fewest arguments accepted.
    pub min_arity: u32,
    /// Most arguments accepted; `u32::MAX` when unbounded.
    pub max_arity: u32,
    /// Frame size.
    pub slot_count: u32,
    /// Constant table.
    pub constants: Vec<Value>,
    /// Capture list.
    pub environments: Vec<Capture>,
    /// Decoded instructions.
    pub instructions: Vec<Instr>,
    /// Source span per instruction, when recorded.
    pub spans: Vec<Span>,
    /// Named locals.
    pub symbols: Vec<SymbolInfo>,
    /// Nested function records.
    pub children: Vec<Listing>,
}

impl Listing {
    /// Re-encodes the instructions to bytecode words.
    #[must_use]
    pub fn assemble(&self) -> Vec<u32> {
        self.instructions.iter().map(|i| i.encode()).collect()
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        let max = if self.max_arity == u32::MAX {
            "*".to_string()
        } else {
            self.max_arity.to_string()
        };
        write!(
            f,
            "{pad}function {} (arity {}, accepts {}..{max}, slots {})",
            self.name, self.arity, self.min_arity, self.slot_count
        )?;
        if let Some(source) = &self.source {
            write!(f, " from {source}")?;
        }
        writeln!(f)?;

        if !self.constants.is_empty() {
            writeln!(f, "{pad}  constants:")?;
            for (i, constant) in self.constants.iter().enumerate() {
                writeln!(f, "{pad}    {i}: {constant}")?;
            }
        }
        if !self.environments.is_empty() {
            writeln!(f, "{pad}  environments:")?;
            for (i, capture) in self.environments.iter().enumerate() {
                match capture {
                    Capture::Frame => writeln!(f, "{pad}    {i}: parent frame")?,
                    Capture::Upvalue(j) => writeln!(f, "{pad}    {i}: parent env{j}")?,
                }
            }
        }
        if !self.symbols.is_empty() {
            writeln!(f, "{pad}  locals:")?;
            for symbol in &self.symbols {
                writeln!(
                    f,
                    "{pad}    ${} {} [{}, {})",
                    symbol.register, symbol.name, symbol.birth, symbol.death
                )?;
            }
        }

        writeln!(f, "{pad}  code:")?;
        for (pc, instr) in self.instructions.iter().enumerate() {
            write!(f, "{pad}    {pc:04}  {instr}")?;
            if let Some(d) = instr.displacement() {
                write!(f, "  ; -> {:04}", pc as i64 + i64::from(d))?;
            }
            if let Some(span) = self.spans.get(pc).filter(|s| s.is_known()) {
                write!(f, "  # {span}")?;
            }
            writeln!(f)?;
        }

        for child in &self.children {
            child.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

/// Decodes `def` and its nested records.
///
/// # Errors
///
/// Returns a structural error for a word that does not decode.
pub fn disassemble(def: &FuncDef) -> Result<Listing> {
    let instructions = def
        .bytecode
        .iter()
        .enumerate()
        .map(|(pc, word)| {
            Instr::decode(*word).map_err(|_| Error::structural(VerifyError::BadInstruction { pc }))
        })
        .collect::<Result<Vec<_>>>()?;
    let children = def
        .defs
        .iter()
        .map(|child| disassemble(child))
        .collect::<Result<Vec<_>>>()?;
    Ok(Listing {
        name: def.display_name().to_string(),
        source: def.source.clone(),
        arity: def.arity,
        min_arity: def.min_arity,
        max_arity: def.max_arity,
        slot_count: def.slot_count,
        constants: def.constants.clone(),
        environments: def.environments.clone(),
        instructions,
        spans: def.source_map.clone(),
        symbols: def.symbol_map.clone(),
        children,
    })
}

#[cfg(test)]
mod tests {
    use sable_foundation::Opcode;

    use super::*;
    use crate::env::Environment;
    use crate::parser::parse_one;
    use crate::compile;

    #[test]
    fn listing_round_trips() {
        let mut env = Environment::new();
        let form = parse_one("(fn f [x &opt y] (if x [x y] \"none\"))").unwrap();
        let def = compile(&form, &mut env).unwrap();
        let listing = disassemble(&def).unwrap();
        assert_eq!(listing.assemble(), def.bytecode);
        assert_eq!(listing.children.len(), 1);
        assert_eq!(listing.children[0].assemble(), def.defs[0].bytecode);
    }

    #[test]
    fn display_shows_names_and_jumps() {
        let def = FuncDef {
            name: Some("demo".into()),
            slot_count: 1,
            bytecode: vec![
                Instr::SL(Opcode::JumpIfNot, 0, 2).encode(),
                Instr::S(Opcode::Return, 0).encode(),
                Instr::None(Opcode::ReturnNil).encode(),
            ],
            ..FuncDef::default()
        };
        let text = disassemble(&def).unwrap().to_string();
        assert!(text.starts_with("function demo (arity 0, accepts 0..0, slots 1)"));
        assert!(text.contains("0000  jump-if-not $0 +2  ; -> 0002"));
        assert!(text.contains("0002  return-nil"));
    }

    #[test]
    fn bad_words_are_structural_errors() {
        let def = FuncDef {
            bytecode: vec![0xFF],
            ..FuncDef::default()
        };
        assert!(disassemble(&def).unwrap_err().is_structural());
    }
}
