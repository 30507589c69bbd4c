use std::io::BufRead;

use byteorder::{BigEndian, ByteOrder};
use matches::debug_assert_matches;

use bvm::opcode::{opcode_byte, Opcode, Trap};

use util::{VmValue, VmWord, WORD_BYTES};

use crate::error::Result;
use crate::expr::{Node, NodeId, Resolver};
use crate::{Compiler, MAX_CODE};

/// A partial value: an expression result that has not committed to being
/// a load, a store or an address yet.
#[derive(Clone, Copy, Debug)]
pub(crate) enum PVal {
    /// The value is already on the stack.
    RValue,
    /// A global; the symbol's value is the DATA address.
    Global(usize),
    /// An argument or local at a frame offset.
    Local(i8),
    /// An element address computed on the stack by `INDEX`.
    Indexed,
}

impl<R: BufRead> Compiler<R> {
    /// Emits `expr` as an l-value and returns how to address it.
    pub(crate) fn code_lvalue(&mut self, expr: NodeId) -> Result<PVal> {
        let pv = self.code_expr(expr)?;
        self.chklvalue(&pv)?;
        Ok(pv)
    }

    /// Emits `expr` and forces its value onto the stack.
    pub(crate) fn code_rvalue(&mut self, expr: NodeId) -> Result<()> {
        let pv = self.code_expr(expr)?;
        self.rvalue(pv)
    }

    fn code_expr(&mut self, expr: NodeId) -> Result<PVal> {
        let node = self.nodes[expr].clone();
        match node {
            Node::SymbolRef(Resolver::Global(index)) => Ok(PVal::Global(index)),
            Node::SymbolRef(Resolver::Local(offset)) => Ok(PVal::Local(offset)),
            Node::StringLit { address } => {
                self.put_op(Opcode::LIT)?;
                self.putclong(address)?;
                Ok(PVal::RValue)
            }
            Node::IntegerLit { value } => {
                if value >= -128 && value <= 127 {
                    self.put_op(Opcode::SLIT)?;
                    self.putcbyte(value as u8)?;
                } else {
                    self.put_op(Opcode::LIT)?;
                    self.putclong(value)?;
                }
                Ok(PVal::RValue)
            }
            Node::UnaryOp { op, operand } => {
                self.code_rvalue(operand)?;
                self.put_op(op)?;
                Ok(PVal::RValue)
            }
            Node::BinaryOp { op, left, right } => {
                self.code_rvalue(left)?;
                self.code_rvalue(right)?;
                self.put_op(op)?;
                Ok(PVal::RValue)
            }
            Node::ArrayRef { array, index } => self.code_arrayref(array, index),
            Node::FunctionCall { callee, args } => self.code_call(callee, &args),
            Node::Disjunction { operands } => self.code_shortcircuit(Opcode::BRTSC, &operands),
            Node::Conjunction { operands } => self.code_shortcircuit(Opcode::BRFSC, &operands),
        }
    }

    /// One short-circuit chain for an AND/OR operand list: the branch
    /// keeps the deciding value in TOS, so a single boolean spans the
    /// whole chain.
    fn code_shortcircuit(&mut self, op: Opcode, operands: &[NodeId]) -> Result<PVal> {
        debug_assert!(operands.len() >= 2);

        self.code_rvalue(operands[0])?;
        let mut end = 0;
        for &operand in &operands[1..] {
            end = self.put_branch(op, end)?;
            self.code_rvalue(operand)?;
        }
        let target = self.codeaddr();
        self.fixupbranch(end, target);
        Ok(PVal::RValue)
    }

    fn code_arrayref(&mut self, array: NodeId, index: NodeId) -> Result<PVal> {
        let base = self.code_expr(array)?;
        self.chklvalue(&base)?;
        self.code_addr(base)?;
        self.code_rvalue(index)?;
        self.put_op(Opcode::INDEX)?;
        Ok(PVal::Indexed)
    }

    fn code_call(&mut self, callee: NodeId, args: &[NodeId]) -> Result<PVal> {
        for &arg in args {
            self.code_rvalue(arg)?;
        }
        self.code_rvalue(callee)?;
        self.put_op(Opcode::CALL)?;
        self.putcbyte(args.len() as u8)?;
        Ok(PVal::RValue)
    }

    fn rvalue(&mut self, pv: PVal) -> Result<()> {
        match pv {
            PVal::RValue => Ok(()),
            PVal::Global(index) => {
                let value = self.globals.get(index).value;
                self.put_op(Opcode::LIT)?;
                self.putclong(value)?;
                self.put_op(Opcode::LOAD)?;
                Ok(())
            }
            PVal::Local(offset) => {
                self.put_op(Opcode::LREF)?;
                self.putcbyte(offset as u8)?;
                Ok(())
            }
            PVal::Indexed => {
                self.put_op(Opcode::LOAD)?;
                Ok(())
            }
        }
    }

    /// Emits the store for an l-value; the value must already be on the
    /// stack below the address.
    pub(crate) fn code_store(&mut self, pv: PVal) -> Result<()> {
        debug_assert_matches!(pv, PVal::Global(_) | PVal::Local(_) | PVal::Indexed);
        match pv {
            PVal::RValue => Err(self.error("expecting an lvalue")),
            PVal::Global(index) => {
                let value = self.globals.get(index).value;
                self.put_op(Opcode::LIT)?;
                self.putclong(value)?;
                self.put_op(Opcode::STORE)?;
                Ok(())
            }
            PVal::Local(offset) => {
                self.put_op(Opcode::LSET)?;
                self.putcbyte(offset as u8)?;
                Ok(())
            }
            PVal::Indexed => {
                self.put_op(Opcode::STORE)?;
                Ok(())
            }
        }
    }

    fn code_addr(&mut self, pv: PVal) -> Result<()> {
        match pv {
            PVal::RValue => Err(self.error("expecting an lvalue")),
            PVal::Global(index) => {
                let value = self.globals.get(index).value;
                self.put_op(Opcode::LIT)?;
                self.putclong(value)?;
                Ok(())
            }
            PVal::Local(_) => {
                Err(self.error("taking the address of a local variable is not supported"))
            }
            PVal::Indexed => {
                Err(self.error("taking the address of an array element is not supported"))
            }
        }
    }

    fn chklvalue(&self, pv: &PVal) -> Result<()> {
        match pv {
            PVal::RValue => Err(self.error("expecting an lvalue")),
            _ => Ok(()),
        }
    }

    // -- staging buffer primitives --

    /// Current offset in the code staging buffer.
    pub(crate) fn codeaddr(&self) -> usize {
        self.code.len()
    }

    pub(crate) fn putcbyte(&mut self, byte: u8) -> Result<usize> {
        let addr = self.codeaddr();
        if self.code.len() >= MAX_CODE {
            return Err(self.error("insufficient code buffer space"));
        }
        self.code.push(byte);
        Ok(addr)
    }

    pub(crate) fn put_op(&mut self, op: Opcode) -> Result<usize> {
        self.putcbyte(opcode_byte(op))
    }

    pub(crate) fn put_trap(&mut self, trap: Trap) -> Result<usize> {
        let addr = self.put_op(Opcode::TRAP)?;
        self.putcbyte(opcode_byte(trap))?;
        Ok(addr)
    }

    /// Appends a branch-offset word, MSB first.
    pub(crate) fn putcword(&mut self, value: VmWord) -> Result<usize> {
        let addr = self.codeaddr();
        if self.code.len() + WORD_BYTES > MAX_CODE {
            return Err(self.error("insufficient code buffer space"));
        }
        let mut buf = [0u8; WORD_BYTES];
        BigEndian::write_i16(&mut buf, value);
        self.code.extend_from_slice(&buf);
        Ok(addr)
    }

    /// Appends a value-sized immediate, MSB first.
    pub(crate) fn putclong(&mut self, value: VmValue) -> Result<usize> {
        let addr = self.codeaddr();
        if self.code.len() + util::VALUE_BYTES > MAX_CODE {
            return Err(self.error("insufficient code buffer space"));
        }
        let mut buf = [0u8; util::VALUE_BYTES];
        util::write_value_be(&mut buf, value);
        self.code.extend_from_slice(&buf);
        Ok(addr)
    }

    fn rd_cword(&self, offset: usize) -> VmWord {
        BigEndian::read_i16(&self.code[offset..])
    }

    fn wr_cword(&mut self, offset: usize, value: VmWord) {
        BigEndian::write_i16(&mut self.code[offset..offset + WORD_BYTES], value);
    }

    /// Emits a forward branch whose operand links into a fixup chain;
    /// returns the new chain head.
    pub(crate) fn put_branch(&mut self, op: Opcode, chain: usize) -> Result<usize> {
        self.put_op(op)?;
        self.putcword(chain as VmWord)
    }

    /// Emits a branch to an already known staging offset.
    pub(crate) fn put_back_branch(&mut self, op: Opcode, target: usize) -> Result<()> {
        self.put_op(op)?;
        let addr = self.codeaddr();
        let offset = (target as i64 - (addr as i64 + WORD_BYTES as i64)) as VmWord;
        self.putcword(offset)?;
        Ok(())
    }

    /// Walks a chain of forward-branch slots, resolving each to `target`.
    /// Offsets are relative to the end of the branch operand.
    pub(crate) fn fixupbranch(&mut self, chain: usize, target: usize) {
        let mut chain = chain;
        while chain != 0 {
            let next = self.rd_cword(chain);
            let offset = (target as i64 - (chain as i64 + WORD_BYTES as i64)) as VmWord;
            self.wr_cword(chain, offset);
            chain = next as usize;
        }
    }
}
