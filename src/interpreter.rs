use std::error::Error as StdError;
use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use num_traits::FromPrimitive;

use util::{VmUValue, VmValue, VmWord, DATA_OFFSET, VALUE_BYTES};

use crate::constants::{MIN_STACK_SIZE, VMFALSE, VMTRUE};
use crate::host::Host;
use crate::opcode::{Opcode, Trap};

/// Reasons the interpreter aborts. Each maps to one diagnostic line on the
/// command line runner.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Fault {
    /// A push ran below the base of the operand stack, or a frame
    /// operation addressed a cell outside of it.
    StackOverflow,
    /// The byte at the program counter is not an opcode.
    UndefinedOpcode(u8),
    /// The byte after `TRAP` is not a service code, or the host does not
    /// provide the requested service.
    UndefinedTrap(u8),
    /// A load or store addressed memory outside TEXT and DATA.
    BadAddress(VmUValue),
    /// The operand stack handed to [`Interpreter::run`] is smaller than
    /// [`MIN_STACK_SIZE`].
    InsufficientStack,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Fault::StackOverflow => f.write_str("stack overflow"),
            Fault::UndefinedOpcode(op) => write!(f, "undefined opcode {:#04x}", op),
            Fault::UndefinedTrap(op) => write!(f, "undefined trap {}", op),
            Fault::BadAddress(addr) => write!(f, "memory access out of range {:#x}", addr),
            Fault::InsufficientStack => f.write_str("insufficient stack space"),
        }
    }
}

impl StdError for Fault {}

enum Step {
    Continue,
    Halt,
}

/// The bytecode interpreter.
///
/// Addresses below [`DATA_OFFSET`] select the read-only TEXT region
/// (`text`, whose first byte sits at image offset `text_base`); addresses
/// at or above it select the writable DATA copy. The operand stack grows
/// downward and the top-of-stack value is cached in a register.
pub struct Interpreter<H> {
    text: Vec<u8>,
    text_base: usize,
    data: Vec<u8>,
    entry: usize,
    stack: Vec<VmValue>,
    pc: usize,
    sp: usize,
    fp: usize,
    tos: VmValue,
    host: H,
}

impl<H: Host> Interpreter<H> {
    /// Constructs an interpreter over a loaded image.
    ///
    /// `text` holds the image bytes from offset `text_base` up to the DATA
    /// initializer; `data` is the writable copy of the DATA initializer.
    pub fn new(
        entry: VmValue,
        text: Vec<u8>,
        text_base: usize,
        data: Vec<u8>,
        stack_size: usize,
        host: H,
    ) -> Interpreter<H> {
        Interpreter {
            text,
            text_base,
            data,
            entry: entry as VmUValue as usize,
            stack: vec![0; stack_size],
            pc: 0,
            sp: stack_size,
            fp: stack_size,
            tos: 0,
            host,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// The writable DATA memory.
    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }

    /// Runs from the entry point until `HALT` or a fault.
    pub fn run(&mut self) -> Result<(), Fault> {
        if self.stack.len() < MIN_STACK_SIZE {
            return Err(Fault::InsufficientStack);
        }

        self.pc = self.entry;
        self.sp = self.stack.len();
        self.fp = self.stack.len();
        self.tos = 0;

        loop {
            if let Step::Halt = self.step()? {
                return Ok(());
            }
        }
    }

    fn step(&mut self) -> Result<Step, Fault> {
        #[cfg(feature = "trace")]
        {
            let (line, _) = crate::disasm::decode(&self.text[..], self.text_base, self.pc);
            eprintln!("{:06x}: {}", self.pc, line);
        }

        let op = self.fetch_byte();
        let opcode = Opcode::from_u8(op).ok_or(Fault::UndefinedOpcode(op))?;

        match opcode {
            Opcode::HALT => return Ok(Step::Halt),
            Opcode::BRT => {
                let off = self.fetch_word();
                if self.tos != VMFALSE {
                    self.branch(off);
                }
                self.tos = self.pop()?;
            }
            Opcode::BRTSC => {
                let off = self.fetch_word();
                if self.tos != VMFALSE {
                    self.branch(off);
                } else {
                    self.tos = self.pop()?;
                }
            }
            Opcode::BRF => {
                let off = self.fetch_word();
                if self.tos == VMFALSE {
                    self.branch(off);
                }
                self.tos = self.pop()?;
            }
            Opcode::BRFSC => {
                let off = self.fetch_word();
                if self.tos == VMFALSE {
                    self.branch(off);
                } else {
                    self.tos = self.pop()?;
                }
            }
            Opcode::BR => {
                let off = self.fetch_word();
                self.branch(off);
            }
            Opcode::NOT => {
                self.tos = if self.tos != VMFALSE { VMFALSE } else { VMTRUE };
            }
            Opcode::NEG => {
                self.tos = self.tos.wrapping_neg();
            }
            Opcode::ADD => {
                let tmp = self.pop()?;
                self.tos = tmp.wrapping_add(self.tos);
            }
            Opcode::SUB => {
                let tmp = self.pop()?;
                self.tos = tmp.wrapping_sub(self.tos);
            }
            Opcode::MUL => {
                let tmp = self.pop()?;
                self.tos = tmp.wrapping_mul(self.tos);
            }
            Opcode::DIV => {
                let tmp = self.pop()?;
                self.tos = if self.tos == 0 {
                    0
                } else {
                    tmp.wrapping_div(self.tos)
                };
            }
            Opcode::REM => {
                let tmp = self.pop()?;
                self.tos = if self.tos == 0 {
                    0
                } else {
                    tmp.wrapping_rem(self.tos)
                };
            }
            Opcode::BNOT => {
                self.tos = !self.tos;
            }
            Opcode::BAND => {
                let tmp = self.pop()?;
                self.tos = tmp & self.tos;
            }
            Opcode::BOR => {
                let tmp = self.pop()?;
                self.tos = tmp | self.tos;
            }
            Opcode::BXOR => {
                let tmp = self.pop()?;
                self.tos = tmp ^ self.tos;
            }
            Opcode::SHL => {
                let tmp = self.pop()?;
                self.tos = tmp.wrapping_shl(self.tos as u32);
            }
            Opcode::SHR => {
                let tmp = self.pop()?;
                self.tos = tmp.wrapping_shr(self.tos as u32);
            }
            Opcode::LT => {
                let tmp = self.pop()?;
                self.tos = truth(tmp < self.tos);
            }
            Opcode::LE => {
                let tmp = self.pop()?;
                self.tos = truth(tmp <= self.tos);
            }
            Opcode::EQ => {
                let tmp = self.pop()?;
                self.tos = truth(tmp == self.tos);
            }
            Opcode::NE => {
                let tmp = self.pop()?;
                self.tos = truth(tmp != self.tos);
            }
            Opcode::GE => {
                let tmp = self.pop()?;
                self.tos = truth(tmp >= self.tos);
            }
            Opcode::GT => {
                let tmp = self.pop()?;
                self.tos = truth(tmp > self.tos);
            }
            Opcode::LIT => {
                let value = self.fetch_value();
                let tmp = self.tos;
                self.cpush(tmp)?;
                self.tos = value;
            }
            Opcode::SLIT => {
                let value = self.fetch_byte() as i8;
                let tmp = self.tos;
                self.cpush(tmp)?;
                self.tos = VmValue::from(value);
            }
            Opcode::LOAD => {
                self.tos = self.load(self.tos as VmUValue)?;
            }
            Opcode::LOADB => {
                self.tos = VmValue::from(self.load_byte(self.tos as VmUValue)?);
            }
            Opcode::STORE => {
                let value = self.pop()?;
                self.store(self.tos as VmUValue, value)?;
                self.tos = self.pop()?;
            }
            Opcode::STOREB => {
                let value = self.pop()?;
                self.store_byte(self.tos as VmUValue, value as u8)?;
                self.tos = self.pop()?;
            }
            Opcode::LREF => {
                let offset = self.fetch_byte() as i8;
                let tmp = self.tos;
                self.cpush(tmp)?;
                self.tos = self.stack_get(frame_index(self.fp, offset))?;
            }
            Opcode::LSET => {
                let offset = self.fetch_byte() as i8;
                let value = self.tos;
                self.stack_set(frame_index(self.fp, offset), value)?;
                self.tos = self.pop()?;
            }
            Opcode::INDEX => {
                let tmp = self.pop()?;
                self.tos = tmp.wrapping_add(self.tos.wrapping_mul(VALUE_BYTES as VmValue));
            }
            Opcode::CALL => {
                // the argument count byte stays in the code stream for RETURN
                self.pc += 1;
                let target = self.tos;
                self.tos = self.pc as VmValue;
                self.pc = target as VmUValue as usize;
            }
            Opcode::FRAME => {
                let count = self.fetch_byte() as usize;
                let saved = self.fp as VmValue;
                self.fp = self.sp;
                if self.sp < count {
                    return Err(Fault::StackOverflow);
                }
                self.sp -= count;
                let tmp = self.tos;
                self.stack_set(self.sp, tmp)?;
                self.stack_set(self.sp + 1, saved)?;
            }
            Opcode::RETURN => {
                let ret = self.stack_get(self.sp)?;
                self.pc = ret as VmUValue as usize;
                self.sp = self.fp;
                let argc = self.code_byte(self.pc.wrapping_sub(1)) as usize;
                self.sp += argc;
                if self.sp > self.stack.len() {
                    return Err(Fault::StackOverflow);
                }
                let saved = self.stack_get(self.fp.wrapping_sub(1))?;
                self.fp = saved as VmUValue as usize;
            }
            Opcode::DROP => {
                self.tos = self.pop()?;
            }
            Opcode::DUP => {
                let tmp = self.tos;
                self.cpush(tmp)?;
            }
            Opcode::NATIVE => {
                // placeholder; the operand is decoded and discarded
                self.fetch_value();
            }
            Opcode::TRAP => {
                let code = self.fetch_byte();
                self.trap(code)?;
            }
        }

        Ok(Step::Continue)
    }

    fn trap(&mut self, code: u8) -> Result<(), Fault> {
        let trap = Trap::from_u8(code).ok_or(Fault::UndefinedTrap(code))?;
        match trap {
            Trap::GetChar => {
                let tmp = self.tos;
                self.cpush(tmp)?;
                self.tos = self.host.getchar();
            }
            Trap::PutChar => {
                self.host.putchar(self.tos as u8);
                self.tos = self.pop()?;
            }
            Trap::PrintStr => {
                self.print_str(self.tos as VmUValue)?;
                self.tos = self.pop()?;
            }
            Trap::PrintInt => {
                let text = self.tos.to_string();
                for ch in text.bytes() {
                    self.host.putchar(ch);
                }
                self.tos = self.pop()?;
            }
            Trap::PrintTab => {
                self.host.putchar(b'\t');
            }
            Trap::PrintNl => {
                self.host.putchar(b'\n');
            }
            Trap::PrintFlush => {
                self.host.flush();
            }
            Trap::DelayMs => {
                if self.host.delay_ms(self.tos).is_err() {
                    return Err(Fault::UndefinedTrap(code));
                }
                self.tos = self.pop()?;
            }
            Trap::UpdateLeds => {
                if self.host.update_leds(&self.data[..]).is_err() {
                    return Err(Fault::UndefinedTrap(code));
                }
            }
        }
        Ok(())
    }

    fn print_str(&mut self, addr: VmUValue) -> Result<(), Fault> {
        if addr >= DATA_OFFSET {
            let mut offset = self.data_range(addr, 1)?;
            loop {
                let ch = *self.data.get(offset).ok_or(Fault::BadAddress(addr))?;
                if ch == 0 {
                    break;
                }
                self.host.putchar(ch);
                offset += 1;
            }
        } else {
            let mut offset = self.text_range(addr, 1)?;
            loop {
                let ch = *self.text.get(offset).ok_or(Fault::BadAddress(addr))?;
                if ch == 0 {
                    break;
                }
                self.host.putchar(ch);
                offset += 1;
            }
        }
        Ok(())
    }

    // -- code stream --

    fn code_byte(&self, addr: usize) -> u8 {
        match addr.checked_sub(self.text_base) {
            Some(offset) => self.text.get(offset).copied().unwrap_or(0),
            None => 0,
        }
    }

    fn fetch_byte(&mut self) -> u8 {
        let byte = self.code_byte(self.pc);
        self.pc += 1;
        byte
    }

    fn fetch_word(&mut self) -> VmWord {
        let bytes = [self.fetch_byte(), self.fetch_byte()];
        BigEndian::read_i16(&bytes)
    }

    fn fetch_value(&mut self) -> VmValue {
        let mut bytes = [0u8; VALUE_BYTES];
        for byte in bytes.iter_mut() {
            *byte = self.fetch_byte();
        }
        util::read_value_be(&bytes)
    }

    fn branch(&mut self, offset: VmWord) {
        self.pc = (self.pc as i64).wrapping_add(i64::from(offset)) as usize;
    }

    // -- memory --

    fn data_range(&self, addr: VmUValue, len: usize) -> Result<usize, Fault> {
        let offset = (addr - DATA_OFFSET) as usize;
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(offset),
            _ => Err(Fault::BadAddress(addr)),
        }
    }

    fn text_range(&self, addr: VmUValue, len: usize) -> Result<usize, Fault> {
        let offset = (addr as usize)
            .checked_sub(self.text_base)
            .ok_or(Fault::BadAddress(addr))?;
        match offset.checked_add(len) {
            Some(end) if end <= self.text.len() => Ok(offset),
            _ => Err(Fault::BadAddress(addr)),
        }
    }

    fn load(&self, addr: VmUValue) -> Result<VmValue, Fault> {
        if addr >= DATA_OFFSET {
            let offset = self.data_range(addr, VALUE_BYTES)?;
            Ok(util::read_value(&self.data[offset..]))
        } else {
            let offset = self.text_range(addr, VALUE_BYTES)?;
            Ok(util::read_value(&self.text[offset..]))
        }
    }

    fn load_byte(&self, addr: VmUValue) -> Result<u8, Fault> {
        if addr >= DATA_OFFSET {
            let offset = self.data_range(addr, 1)?;
            Ok(self.data[offset])
        } else {
            let offset = self.text_range(addr, 1)?;
            Ok(self.text[offset])
        }
    }

    fn store(&mut self, addr: VmUValue, value: VmValue) -> Result<(), Fault> {
        if addr >= DATA_OFFSET {
            let offset = self.data_range(addr, VALUE_BYTES)?;
            util::write_value(&mut self.data[offset..], value);
        } else {
            // stores into TEXT are silently ignored
            #[cfg(feature = "trace")]
            eprintln!("store to text address {:#x} ignored", addr);
        }
        Ok(())
    }

    fn store_byte(&mut self, addr: VmUValue, value: u8) -> Result<(), Fault> {
        if addr >= DATA_OFFSET {
            let offset = self.data_range(addr, 1)?;
            self.data[offset] = value;
        } else {
            #[cfg(feature = "trace")]
            eprintln!("store to text address {:#x} ignored", addr);
        }
        Ok(())
    }

    // -- operand stack --

    fn cpush(&mut self, value: VmValue) -> Result<(), Fault> {
        if self.sp == 0 {
            return Err(Fault::StackOverflow);
        }
        self.sp -= 1;
        self.stack[self.sp] = value;
        Ok(())
    }

    fn pop(&mut self) -> Result<VmValue, Fault> {
        if self.sp >= self.stack.len() {
            return Err(Fault::StackOverflow);
        }
        let value = self.stack[self.sp];
        self.sp += 1;
        Ok(value)
    }

    fn stack_get(&self, index: usize) -> Result<VmValue, Fault> {
        self.stack.get(index).copied().ok_or(Fault::StackOverflow)
    }

    fn stack_set(&mut self, index: usize, value: VmValue) -> Result<(), Fault> {
        match self.stack.get_mut(index) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(Fault::StackOverflow),
        }
    }
}

fn truth(condition: bool) -> VmValue {
    if condition {
        VMTRUE
    } else {
        VMFALSE
    }
}

fn frame_index(fp: usize, offset: i8) -> usize {
    (fp as i64).wrapping_add(i64::from(offset)) as usize
}
