use num_traits::FromPrimitive;

use util::{VALUE_BYTES, WORD_BYTES};

use crate::opcode::Opcode;

enum Operand {
    None,
    Byte,
    Word,
    Value,
}

fn operand(opcode: Opcode) -> Operand {
    match opcode {
        Opcode::BR | Opcode::BRT | Opcode::BRF | Opcode::BRTSC | Opcode::BRFSC => Operand::Word,
        Opcode::LIT | Opcode::NATIVE => Operand::Value,
        Opcode::SLIT | Opcode::LREF | Opcode::LSET | Opcode::CALL | Opcode::FRAME
        | Opcode::TRAP => Operand::Byte,
        _ => Operand::None,
    }
}

/// Decodes the instruction at image address `addr` and returns its
/// rendering together with the number of bytes it occupies. Used by the
/// `trace` feature.
pub fn decode(text: &[u8], text_base: usize, addr: usize) -> (String, usize) {
    let at = |a: usize| -> u8 {
        a.checked_sub(text_base)
            .and_then(|offset| text.get(offset).copied())
            .unwrap_or(0)
    };

    let byte = at(addr);
    let opcode = match Opcode::from_u8(byte) {
        Some(opcode) => opcode,
        None => return (format!("??? {:#04x}", byte), 1),
    };

    match operand(opcode) {
        Operand::None => (format!("{:?}", opcode), 1),
        Operand::Byte => (
            format!("{:?} {}", opcode, at(addr + 1) as i8),
            2,
        ),
        Operand::Word => {
            let mut value: u32 = 0;
            for i in 0..WORD_BYTES {
                value = (value << 8) | u32::from(at(addr + 1 + i));
            }
            (format!("{:?} {}", opcode, value as i16), 1 + WORD_BYTES)
        }
        Operand::Value => {
            let mut value: u64 = 0;
            for i in 0..VALUE_BYTES {
                value = (value << 8) | u64::from(at(addr + 1 + i));
            }
            (
                format!("{:?} {}", opcode, value as util::VmValue),
                1 + VALUE_BYTES,
            )
        }
    }
}
