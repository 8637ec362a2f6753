//! Instruction boundary walker for `Code` arrays.
//!
//! Only decodes what is needed to find instruction starts and read the
//! constant pool operand of member-access instructions.

use anyhow::{anyhow, bail, Result};

use crate::opcodes::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub pc: usize,
    pub opcode: u8,
    pub len: usize,
}

impl Instruction {
    /// Constant pool operand for field/method access instructions.
    pub fn member_index(&self, code: &[u8]) -> Option<u16> {
        match self.opcode {
            GETSTATIC | PUTSTATIC | GETFIELD | PUTFIELD | INVOKEVIRTUAL | INVOKESPECIAL
            | INVOKESTATIC | INVOKEINTERFACE => {
                Some(u16::from_be_bytes([code[self.pc + 1], code[self.pc + 2]]))
            }
            _ => None,
        }
    }
}

fn read_i32(code: &[u8], at: usize) -> Result<i32> {
    let b = code
        .get(at..at + 4)
        .ok_or_else(|| anyhow!("truncated switch operand at {}", at))?;
    Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Length in bytes of the instruction starting at `pc`.
pub fn instruction_length(code: &[u8], pc: usize) -> Result<usize> {
    let opcode = *code
        .get(pc)
        .ok_or_else(|| anyhow!("pc {} out of range", pc))?;
    let len = match opcode {
        BIPUSH | LDC | ILOAD..=ALOAD | ISTORE..=ASTORE | RET | NEWARRAY => 2,
        SIPUSH | LDC_W | LDC2_W | IINC | IFEQ..=JSR | GETSTATIC..=INVOKESTATIC | NEW
        | ANEWARRAY | CHECKCAST | INSTANCEOF | IFNULL | IFNONNULL => 3,
        MULTIANEWARRAY => 4,
        INVOKEINTERFACE | INVOKEDYNAMIC | GOTO_W | JSR_W => 5,
        WIDE => match code.get(pc + 1) {
            Some(&IINC) => 6,
            Some(_) => 4,
            None => bail!("truncated wide instruction at {}", pc),
        },
        TABLESWITCH => {
            let pad = (4 - (pc + 1) % 4) % 4;
            let base = pc + 1 + pad;
            let low = read_i32(code, base + 4)?;
            let high = read_i32(code, base + 8)?;
            if high < low {
                bail!("tableswitch at {} has high < low", pc);
            }
            let entries = (high as i64 - low as i64 + 1) as usize;
            1 + pad + 12 + entries * 4
        }
        LOOKUPSWITCH => {
            let pad = (4 - (pc + 1) % 4) % 4;
            let base = pc + 1 + pad;
            let pairs = read_i32(code, base + 4)?;
            if pairs < 0 {
                bail!("lookupswitch at {} has negative pair count", pc);
            }
            1 + pad + 8 + pairs as usize * 8
        }
        0x00..=0x0f | 0x1a..=0x35 | 0x3b..=0x83 | 0x85..=0x98 | IRETURN..=RETURN | 0xbe
        | ATHROW | 0xc2 | 0xc3 => 1,
        other => bail!("unknown opcode 0x{:02x} at {}", other, pc),
    };
    if pc + len > code.len() {
        bail!("instruction at {} runs past end of code", pc);
    }
    Ok(len)
}

/// Decodes instruction boundaries for a whole code array.
pub fn scan(code: &[u8]) -> Result<Vec<Instruction>> {
    let mut out = Vec::new();
    let mut pc = 0;
    while pc < code.len() {
        let len = instruction_length(code, pc)?;
        out.push(Instruction {
            pc,
            opcode: code[pc],
            len,
        });
        pc += len;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_simple_sequence() {
        // aload_0; getfield #2; ireturn
        let code = [ALOAD_0, GETFIELD, 0, 2, IRETURN];
        let insns = scan(&code).unwrap();
        assert_eq!(insns.len(), 3);
        assert_eq!(insns[1].member_index(&code), Some(2));
        assert_eq!(insns[2].pc, 4);
    }

    #[test]
    fn test_tableswitch_padding() {
        // iconst_0 at 0, tableswitch at 1 -> pad 2, low 0, high 1
        let mut code = vec![ICONST_0, TABLESWITCH, 0, 0];
        code.extend_from_slice(&20i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&20i32.to_be_bytes());
        code.extend_from_slice(&20i32.to_be_bytes());
        code.push(RETURN);
        let insns = scan(&code).unwrap();
        assert_eq!(insns[1].len, 1 + 2 + 12 + 8);
        assert_eq!(insns[2].opcode, RETURN);
    }

    #[test]
    fn test_wide_iinc() {
        let code = [WIDE, IINC, 0, 1, 0, 1, RETURN];
        let insns = scan(&code).unwrap();
        assert_eq!(insns[0].len, 6);
    }

    #[test]
    fn test_truncated_operand() {
        assert!(scan(&[INVOKESTATIC, 0]).is_err());
    }
}
