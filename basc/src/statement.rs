use std::io::BufRead;
use std::mem;

use bvm::opcode::{Opcode, Trap};

use util::VALUE_BYTES;

use crate::error::Result;
use crate::expr::{Node, NodeId};
use crate::scan::{Keyword, Token};
use crate::symbols::StorageClass;
use crate::{CodeType, Compiler, BLOCK_STACK_DEPTH};

/// An open control-flow construct. `nxt` and `end` are staging-buffer
/// offsets: a back-branch target or the head of a forward fixup chain.
#[derive(Debug)]
pub(crate) enum Block {
    If { nxt: usize, end: usize },
    Else { end: usize },
    For { nxt: usize, end: usize, var: String },
    Do { nxt: usize, end: usize },
}

/// A `GOTO` target. Forward references thread a fixup chain through the
/// unresolved branch slots until the label is placed.
pub(crate) struct Label {
    pub name: String,
    pub placed: bool,
    pub offset: usize,
    pub fixups: usize,
}

impl<R: BufRead> Compiler<R> {
    pub(crate) fn parse_statement(&mut self, token: Token) -> Result<()> {
        match token {
            Token::Keyword(keyword) => match keyword {
                Keyword::REM => {
                    self.scan.skip_to_eol();
                    Ok(())
                }
                Keyword::DEF => self.parse_def(),
                Keyword::DIM => self.parse_dim(),
                Keyword::LET => self.parse_let(),
                Keyword::IF => self.parse_if(),
                Keyword::ELSE => self.parse_else(),
                Keyword::FOR => self.parse_for(),
                Keyword::NEXT => self.parse_next(),
                Keyword::DO => self.parse_do(),
                Keyword::LOOP => self.parse_loop(),
                Keyword::GOTO => self.parse_goto(),
                Keyword::RETURN => self.parse_return(),
                Keyword::PRINT => self.parse_print(),
                Keyword::STOP | Keyword::END => {
                    self.put_op(Opcode::HALT)?;
                    Ok(())
                }
                other => Err(self.error(format!(
                    "expecting a statement, found {}",
                    Token::Keyword(other)
                ))),
            },
            Token::ElseIf => self.parse_else_if(),
            Token::EndIf => self.parse_end_if(),
            Token::EndDef => self.parse_end_def(),
            Token::DoWhile => self.parse_do_while(),
            Token::DoUntil => self.parse_do_until(),
            Token::LoopWhile => self.parse_loop_while(),
            Token::LoopUntil => self.parse_loop_until(),
            Token::Identifier => self.parse_label_or_assignment(),
            other => Err(self.error(format!("expecting a statement, found {}", other))),
        }
    }

    // -- functions --

    fn parse_def(&mut self) -> Result<()> {
        self.scan.frequire(Token::Identifier)?;
        let name = self.scan.token_text().to_owned();

        let symbol = self.add_global(&name, StorageClass::Constant, 0)?;
        self.code_symbol = Some(symbol);
        self.start_code(CodeType::Function)?;

        let token = self.scan.get_token()?;
        if token == Token::Char(b'(') {
            let token = self.scan.get_token()?;
            if token != Token::Char(b')') {
                self.scan.require(token, Token::Identifier)?;
                loop {
                    let argument = self.scan.token_text().to_owned();
                    self.add_argument(&argument)?;
                    match self.scan.get_token()? {
                        Token::Char(b',') => self.scan.frequire(Token::Identifier)?,
                        Token::Char(b')') => break,
                        other => {
                            return Err(
                                self.error(format!("expecting ',' or ')', found {}", other))
                            );
                        }
                    }
                }
            }
        } else {
            self.scan.save_token(token);
        }
        Ok(())
    }

    fn parse_end_def(&mut self) -> Result<()> {
        if self.code_type == CodeType::Main {
            return Err(self.error("END DEF without a matching DEF"));
        }
        let address = self.store_code()?;
        if let Some(index) = self.code_symbol.take() {
            self.globals.get_mut(index).value = address;
        }
        Ok(())
    }

    // -- declarations --

    fn parse_dim(&mut self) -> Result<()> {
        loop {
            self.scan.frequire(Token::Identifier)?;
            let name = self.scan.token_text().to_owned();
            let mut size = None;

            loop {
                let token = self.scan.get_token()?;
                match token {
                    Token::Char(b'(') if size.is_none() => {
                        let expr = self.parse_expr()?;
                        self.scan.frequire(Token::Char(b')'))?;
                        let value = match self.is_integer_lit(expr) {
                            Some(value) => value,
                            None => return Err(self.error("expecting a constant array size")),
                        };
                        if value <= 0 {
                            return Err(self.error("invalid array size"));
                        }
                        size = Some(value);
                    }
                    Token::Keyword(Keyword::AS) => {
                        // the element type is accepted and ignored
                        self.scan.frequire(Token::Identifier)?;
                    }
                    other => {
                        self.scan.save_token(other);
                        break;
                    }
                }
            }

            let cells = size.unwrap_or(1);
            if self.code_type != CodeType::Main {
                self.add_local(&name, cells)?;
            } else {
                let bytes = match (cells as usize).checked_mul(VALUE_BYTES) {
                    Some(bytes) => bytes,
                    None => return Err(self.error("insufficient image data space")),
                };
                let address = self.image_data_alloc(bytes)?;
                self.add_global(&name, StorageClass::Variable, address)?;
            }

            match self.scan.get_token()? {
                Token::Char(b',') => {}
                other => {
                    self.scan.save_token(other);
                    break;
                }
            }
        }
        Ok(())
    }

    // -- assignment and calls --

    fn parse_let(&mut self) -> Result<()> {
        self.scan.frequire(Token::Identifier)?;
        let name = self.scan.token_text().to_owned();
        let node = self.parse_primary_suffix(&name)?;
        self.scan.frequire(Token::Char(b'='))?;
        self.code_assignment(node)
    }

    fn parse_label_or_assignment(&mut self) -> Result<()> {
        let name = self.scan.token_text().to_owned();

        let token = self.scan.get_token()?;
        if token == Token::Char(b':') {
            return self.place_label(&name);
        }
        self.scan.save_token(token);

        let node = self.parse_primary_suffix(&name)?;
        let token = self.scan.get_token()?;
        if token == Token::Char(b'=') {
            self.code_assignment(node)
        } else if matches!(self.nodes[node], Node::FunctionCall { .. }) {
            self.scan.save_token(token);
            self.code_rvalue(node)?;
            self.put_op(Opcode::DROP)?;
            Ok(())
        } else {
            Err(self.error(format!("expecting '=', found {}", token)))
        }
    }

    /// The value is emitted first, then the target address, then the
    /// store; this is the operand order `STORE` expects.
    fn code_assignment(&mut self, target: NodeId) -> Result<()> {
        self.parse_rvalue()?;
        let pv = self.code_lvalue(target)?;
        self.code_store(pv)
    }

    // -- IF / ELSE / END IF --

    fn parse_if(&mut self) -> Result<()> {
        self.parse_rvalue()?;
        self.scan.frequire(Token::Keyword(Keyword::THEN))?;
        let nxt = self.put_branch(Opcode::BRF, 0)?;
        self.push_block(Block::If { nxt, end: 0 })
    }

    fn parse_else(&mut self) -> Result<()> {
        match self.pop_block() {
            Some(Block::If { nxt, end }) => {
                let end = self.put_branch(Opcode::BR, end)?;
                let target = self.codeaddr();
                self.fixupbranch(nxt, target);
                self.push_block(Block::Else { end })
            }
            _ => Err(self.error("ELSE without a matching IF")),
        }
    }

    fn parse_else_if(&mut self) -> Result<()> {
        match self.pop_block() {
            Some(Block::If { nxt, end }) => {
                let end = self.put_branch(Opcode::BR, end)?;
                let target = self.codeaddr();
                self.fixupbranch(nxt, target);
                self.parse_rvalue()?;
                self.scan.frequire(Token::Keyword(Keyword::THEN))?;
                let nxt = self.put_branch(Opcode::BRF, 0)?;
                self.push_block(Block::If { nxt, end })
            }
            _ => Err(self.error("ELSE IF without a matching IF")),
        }
    }

    fn parse_end_if(&mut self) -> Result<()> {
        match self.pop_block() {
            Some(Block::If { nxt, end }) => {
                let target = self.codeaddr();
                self.fixupbranch(nxt, target);
                self.fixupbranch(end, target);
                Ok(())
            }
            Some(Block::Else { end }) => {
                let target = self.codeaddr();
                self.fixupbranch(end, target);
                Ok(())
            }
            _ => Err(self.error("END IF without a matching IF")),
        }
    }

    // -- FOR / NEXT --

    fn parse_for(&mut self) -> Result<()> {
        self.scan.frequire(Token::Identifier)?;
        let var_name = self.scan.token_text().to_owned();
        let var = self.symbol_ref(&var_name)?;

        self.scan.frequire(Token::Char(b'='))?;
        self.parse_rvalue()?;
        let pv = self.code_lvalue(var)?;
        self.code_store(pv)?;

        self.scan.frequire(Token::Keyword(Keyword::TO))?;
        let limit = self.parse_expr()?;

        let token = self.scan.get_token()?;
        let step = if token == Token::Keyword(Keyword::STEP) {
            self.parse_expr()?
        } else {
            self.scan.save_token(token);
            self.new_node(Node::IntegerLit { value: 1 })?
        };

        // skip the increment on the way in
        let entry = self.put_branch(Opcode::BR, 0)?;
        let nxt = self.codeaddr();
        self.code_rvalue(var)?;
        self.code_rvalue(step)?;
        self.put_op(Opcode::ADD)?;
        let pv = self.code_lvalue(var)?;
        self.code_store(pv)?;

        // continue while (limit - var) * step >= 0
        let test = self.codeaddr();
        self.fixupbranch(entry, test);
        self.code_rvalue(limit)?;
        self.code_rvalue(var)?;
        self.put_op(Opcode::SUB)?;
        self.code_rvalue(step)?;
        self.put_op(Opcode::MUL)?;
        self.put_op(Opcode::SLIT)?;
        self.putcbyte(0)?;
        self.put_op(Opcode::GE)?;
        let end = self.put_branch(Opcode::BRF, 0)?;

        self.push_block(Block::For {
            nxt,
            end,
            var: var_name,
        })
    }

    fn parse_next(&mut self) -> Result<()> {
        self.scan.frequire(Token::Identifier)?;
        let name = self.scan.token_text().to_owned();
        match self.pop_block() {
            Some(Block::For { nxt, end, var }) => {
                if !var.eq_ignore_ascii_case(&name) {
                    return Err(self.error(format!("mismatched NEXT '{}'", name)));
                }
                self.put_back_branch(Opcode::BR, nxt)?;
                let target = self.codeaddr();
                self.fixupbranch(end, target);
                Ok(())
            }
            _ => Err(self.error("NEXT without a matching FOR")),
        }
    }

    // -- DO / LOOP --

    fn parse_do(&mut self) -> Result<()> {
        let nxt = self.codeaddr();
        self.push_block(Block::Do { nxt, end: 0 })
    }

    fn parse_do_while(&mut self) -> Result<()> {
        let nxt = self.codeaddr();
        self.parse_rvalue()?;
        let end = self.put_branch(Opcode::BRF, 0)?;
        self.push_block(Block::Do { nxt, end })
    }

    fn parse_do_until(&mut self) -> Result<()> {
        let nxt = self.codeaddr();
        self.parse_rvalue()?;
        let end = self.put_branch(Opcode::BRT, 0)?;
        self.push_block(Block::Do { nxt, end })
    }

    fn parse_loop(&mut self) -> Result<()> {
        match self.pop_block() {
            Some(Block::Do { nxt, end }) => {
                self.put_back_branch(Opcode::BR, nxt)?;
                let target = self.codeaddr();
                self.fixupbranch(end, target);
                Ok(())
            }
            _ => Err(self.error("LOOP without a matching DO")),
        }
    }

    fn parse_loop_while(&mut self) -> Result<()> {
        match self.pop_block() {
            Some(Block::Do { nxt, end }) => {
                self.parse_rvalue()?;
                self.put_back_branch(Opcode::BRT, nxt)?;
                let target = self.codeaddr();
                self.fixupbranch(end, target);
                Ok(())
            }
            _ => Err(self.error("LOOP without a matching DO")),
        }
    }

    fn parse_loop_until(&mut self) -> Result<()> {
        match self.pop_block() {
            Some(Block::Do { nxt, end }) => {
                self.parse_rvalue()?;
                self.put_back_branch(Opcode::BRF, nxt)?;
                let target = self.codeaddr();
                self.fixupbranch(end, target);
                Ok(())
            }
            _ => Err(self.error("LOOP without a matching DO")),
        }
    }

    // -- GOTO and labels --

    fn parse_goto(&mut self) -> Result<()> {
        self.scan.frequire(Token::Identifier)?;
        let name = self.scan.token_text().to_owned();
        let index = self.find_or_add_label(&name)?;
        if self.labels[index].placed {
            let target = self.labels[index].offset;
            self.put_back_branch(Opcode::BR, target)
        } else {
            let chain = self.labels[index].fixups;
            let head = self.put_branch(Opcode::BR, chain)?;
            self.labels[index].fixups = head;
            Ok(())
        }
    }

    fn place_label(&mut self, name: &str) -> Result<()> {
        let index = self.find_or_add_label(name)?;
        if self.labels[index].placed {
            return Err(self.error(format!("duplicate label '{}'", name)));
        }
        let target = self.codeaddr();
        self.labels[index].placed = true;
        self.labels[index].offset = target;
        let chain = mem::replace(&mut self.labels[index].fixups, 0);
        self.fixupbranch(chain, target);
        Ok(())
    }

    fn find_or_add_label(&mut self, name: &str) -> Result<usize> {
        if let Some(index) = self
            .labels
            .iter()
            .position(|label| label.name.eq_ignore_ascii_case(name))
        {
            return Ok(index);
        }
        self.charge_local(mem::size_of::<Label>() + name.len())?;
        self.labels.push(Label {
            name: name.to_owned(),
            placed: false,
            offset: 0,
            fixups: 0,
        });
        Ok(self.labels.len() - 1)
    }

    /// Verifies that every label referenced by a `GOTO` was placed.
    pub(crate) fn check_labels(&self) -> Result<()> {
        for label in &self.labels {
            if !label.placed {
                return Err(self.error(format!("undefined label '{}'", label.name)));
            }
        }
        Ok(())
    }

    // -- RETURN / PRINT --

    fn parse_return(&mut self) -> Result<()> {
        if self.code_type == CodeType::Main {
            return Err(self.error("RETURN outside of a function"));
        }
        let token = self.scan.get_token()?;
        match token {
            Token::Eol | Token::Char(b':') => self.scan.save_token(token),
            other => {
                self.scan.save_token(other);
                self.parse_rvalue()?;
            }
        }
        self.put_op(Opcode::RETURN)?;
        Ok(())
    }

    fn parse_print(&mut self) -> Result<()> {
        let mut last_was_separator = false;
        loop {
            let token = self.scan.get_token()?;
            match token {
                Token::Char(b',') => {
                    self.put_trap(Trap::PrintTab)?;
                    last_was_separator = true;
                }
                Token::Char(b';') => {
                    last_was_separator = true;
                }
                Token::Number
                | Token::StringLit
                | Token::Identifier
                | Token::Char(b'(')
                | Token::Char(b'-')
                | Token::Char(b'~')
                | Token::Keyword(Keyword::NOT) => {
                    self.scan.save_token(token);
                    let expr = self.parse_expr()?;
                    self.code_rvalue(expr)?;
                    if matches!(self.nodes[expr], Node::StringLit { .. }) {
                        self.put_trap(Trap::PrintStr)?;
                    } else {
                        self.put_trap(Trap::PrintInt)?;
                    }
                    last_was_separator = false;
                }
                other => {
                    self.scan.save_token(other);
                    break;
                }
            }
        }
        if !last_was_separator {
            self.put_trap(Trap::PrintNl)?;
        }
        Ok(())
    }

    // -- block stack --

    fn push_block(&mut self, block: Block) -> Result<()> {
        if self.blocks.len() >= BLOCK_STACK_DEPTH {
            return Err(self.error("statements are nested too deeply"));
        }
        self.blocks.push(block);
        Ok(())
    }

    fn pop_block(&mut self) -> Option<Block> {
        self.blocks.pop()
    }

    /// Reports the `StoreCode`-time diagnostic for a block left open.
    pub(crate) fn check_unterminated_block(&self) -> Result<()> {
        match self.blocks.last() {
            Some(Block::If { .. }) | Some(Block::Else { .. }) => Err(self.error("expecting END IF")),
            Some(Block::For { .. }) => Err(self.error("expecting NEXT")),
            Some(Block::Do { .. }) => Err(self.error("expecting LOOP")),
            None => Ok(()),
        }
    }
}
