use std::io::BufRead;

use bvm::constants::{VMFALSE, VMTRUE};
use bvm::opcode::Opcode;

use util::{VmValue, VALUE_BYTES};

use crate::error::Result;
use crate::scan::{Keyword, Token};
use crate::symbols::StorageClass;
use crate::{CodeType, Compiler};

/// Index of a parse tree node in the compiler's per-function arena.
pub type NodeId = usize;

/// Parse tree nodes. Children are arena indices, never owning pointers;
/// the whole arena is recovered at each function boundary.
#[derive(Clone, Debug)]
pub enum Node {
    SymbolRef(Resolver),
    StringLit {
        address: VmValue,
    },
    IntegerLit {
        value: VmValue,
    },
    UnaryOp {
        op: Opcode,
        operand: NodeId,
    },
    BinaryOp {
        op: Opcode,
        left: NodeId,
        right: NodeId,
    },
    ArrayRef {
        array: NodeId,
        index: NodeId,
    },
    FunctionCall {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    /// Ordered OR chain, emitted as one short-circuit sequence.
    Disjunction {
        operands: Vec<NodeId>,
    },
    /// Ordered AND chain.
    Conjunction {
        operands: Vec<NodeId>,
    },
}

/// How a symbol reference materializes as code.
#[derive(Clone, Copy, Debug)]
pub enum Resolver {
    /// Global variable; the index selects the symbol whose value is a
    /// DATA address.
    Global(usize),
    /// Argument or local, as a frame-pointer offset.
    Local(i8),
}

impl<R: BufRead> Compiler<R> {
    /// Parses an expression and emits its r-value.
    pub(crate) fn parse_rvalue(&mut self) -> Result<()> {
        let expr = self.parse_expr()?;
        self.code_rvalue(expr)
    }

    /// expr := conjunction { 'OR' conjunction }
    pub(crate) fn parse_expr(&mut self) -> Result<NodeId> {
        let first = self.parse_conjunction()?;
        let token = self.scan.get_token()?;
        if token != Token::Keyword(Keyword::OR) {
            self.scan.save_token(token);
            return Ok(first);
        }

        let mut operands = vec![first];
        loop {
            operands.push(self.parse_conjunction()?);
            let token = self.scan.get_token()?;
            if token != Token::Keyword(Keyword::OR) {
                self.scan.save_token(token);
                break;
            }
        }
        self.new_node(Node::Disjunction { operands })
    }

    /// conjunction := not-expr { 'AND' not-expr }
    fn parse_conjunction(&mut self) -> Result<NodeId> {
        let first = self.parse_not_expr()?;
        let token = self.scan.get_token()?;
        if token != Token::Keyword(Keyword::AND) {
            self.scan.save_token(token);
            return Ok(first);
        }

        let mut operands = vec![first];
        loop {
            operands.push(self.parse_not_expr()?);
            let token = self.scan.get_token()?;
            if token != Token::Keyword(Keyword::AND) {
                self.scan.save_token(token);
                break;
            }
        }
        self.new_node(Node::Conjunction { operands })
    }

    /// not-expr := [ 'NOT' ] relational
    fn parse_not_expr(&mut self) -> Result<NodeId> {
        let token = self.scan.get_token()?;
        if token == Token::Keyword(Keyword::NOT) {
            let operand = self.parse_relational()?;
            self.fold_unary(Opcode::NOT, operand)
        } else {
            self.scan.save_token(token);
            self.parse_relational()
        }
    }

    /// relational := additive [ relop additive ]
    fn parse_relational(&mut self) -> Result<NodeId> {
        let left = self.parse_additive()?;
        let token = self.scan.get_token()?;
        let op = match token {
            Token::Char(b'=') => Opcode::EQ,
            Token::Char(b'<') => Opcode::LT,
            Token::Char(b'>') => Opcode::GT,
            Token::Le => Opcode::LE,
            Token::Ge => Opcode::GE,
            Token::Ne => Opcode::NE,
            _ => {
                self.scan.save_token(token);
                return Ok(left);
            }
        };
        let right = self.parse_additive()?;
        self.fold_binary(op, left, right)
    }

    /// additive := term { ('+'|'-') term }
    fn parse_additive(&mut self) -> Result<NodeId> {
        let mut left = self.parse_term()?;
        loop {
            let token = self.scan.get_token()?;
            let op = match token {
                Token::Char(b'+') => Opcode::ADD,
                Token::Char(b'-') => Opcode::SUB,
                _ => {
                    self.scan.save_token(token);
                    return Ok(left);
                }
            };
            let right = self.parse_term()?;
            left = self.fold_binary(op, left, right)?;
        }
    }

    /// term := factor { ('*'|'/'|'\'|MOD|'<<'|'>>'|'&'|'|'|'^') factor }
    fn parse_term(&mut self) -> Result<NodeId> {
        let mut left = self.parse_factor()?;
        loop {
            let token = self.scan.get_token()?;
            let op = match token {
                Token::Char(b'*') => Opcode::MUL,
                Token::Char(b'/') | Token::Char(b'\\') => Opcode::DIV,
                Token::Keyword(Keyword::MOD) => Opcode::REM,
                Token::Shl => Opcode::SHL,
                Token::Shr => Opcode::SHR,
                Token::Char(b'&') => Opcode::BAND,
                Token::Char(b'|') => Opcode::BOR,
                Token::Char(b'^') => Opcode::BXOR,
                _ => {
                    self.scan.save_token(token);
                    return Ok(left);
                }
            };
            let right = self.parse_factor()?;
            left = self.fold_binary(op, left, right)?;
        }
    }

    /// factor := ['-'|'~'] factor | primary
    fn parse_factor(&mut self) -> Result<NodeId> {
        let token = self.scan.get_token()?;
        match token {
            Token::Char(b'-') => {
                let operand = self.parse_factor()?;
                self.fold_unary(Opcode::NEG, operand)
            }
            Token::Char(b'~') => {
                let operand = self.parse_factor()?;
                self.fold_unary(Opcode::BNOT, operand)
            }
            _ => {
                self.scan.save_token(token);
                self.parse_primary()
            }
        }
    }

    /// primary := number | string | identifier suffix | '(' expr ')'
    fn parse_primary(&mut self) -> Result<NodeId> {
        let token = self.scan.get_token()?;
        match token {
            Token::Number => {
                let value = self.scan.value();
                self.new_node(Node::IntegerLit { value })
            }
            Token::StringLit => {
                let text = self.scan.token_text().to_owned();
                let address = self.add_string(&text)?;
                self.new_node(Node::StringLit { address })
            }
            Token::Char(b'(') => {
                let node = self.parse_expr()?;
                self.scan.frequire(Token::Char(b')'))?;
                Ok(node)
            }
            Token::Identifier => {
                let name = self.scan.token_text().to_owned();
                self.parse_primary_suffix(&name)
            }
            other => Err(self.error(format!("expecting an expression, found {}", other))),
        }
    }

    /// Completes an identifier primary: a call when the symbol is a
    /// constant, an array reference otherwise.
    pub(crate) fn parse_primary_suffix(&mut self, name: &str) -> Result<NodeId> {
        let token = self.scan.get_token()?;
        match token {
            Token::Char(b'(') => {
                let target = self.symbol_ref(name)?;
                if matches!(self.nodes[target], Node::IntegerLit { .. }) {
                    let args = self.parse_arguments()?;
                    self.new_node(Node::FunctionCall {
                        callee: target,
                        args,
                    })
                } else {
                    let index = self.parse_expr()?;
                    self.scan.frequire(Token::Char(b')'))?;
                    self.new_node(Node::ArrayRef {
                        array: target,
                        index,
                    })
                }
            }
            Token::Char(b'[') => {
                let target = self.symbol_ref(name)?;
                let index = self.parse_expr()?;
                self.scan.frequire(Token::Char(b']'))?;
                self.new_node(Node::ArrayRef {
                    array: target,
                    index,
                })
            }
            other => {
                self.scan.save_token(other);
                self.symbol_ref(name)
            }
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<NodeId>> {
        let mut args = Vec::new();
        let token = self.scan.get_token()?;
        if token == Token::Char(b')') {
            return Ok(args);
        }
        self.scan.save_token(token);

        loop {
            args.push(self.parse_expr()?);
            match self.scan.get_token()? {
                Token::Char(b',') => {}
                Token::Char(b')') => break,
                other => {
                    return Err(self.error(format!("expecting ',' or ')', found {}", other)));
                }
            }
        }
        if args.len() > 255 {
            return Err(self.error("too many arguments"));
        }
        Ok(args)
    }

    /// Resolves a name, innermost scope first. Constants lower to integer
    /// literals; an unknown name is declared as a global scalar.
    pub(crate) fn symbol_ref(&mut self, name: &str) -> Result<NodeId> {
        if self.code_type != CodeType::Main {
            if let Some(index) = self.locals.find(name) {
                let offset = self.locals.get(index).value;
                return self.new_node(Node::SymbolRef(Resolver::Local(offset as i8)));
            }
            if let Some(index) = self.arguments.find(name) {
                let position = self.arguments.get(index).value;
                let offset = self.arguments.count() as VmValue - position - 1;
                return self.new_node(Node::SymbolRef(Resolver::Local(offset as i8)));
            }
        }

        if let Some(index) = self.globals.find(name) {
            let symbol = self.globals.get(index);
            if symbol.storage_class == StorageClass::Constant {
                let value = symbol.value;
                return self.new_node(Node::IntegerLit { value });
            }
            return self.new_node(Node::SymbolRef(Resolver::Global(index)));
        }

        let address = self.image_data_alloc(VALUE_BYTES)?;
        let index = self.add_global(name, StorageClass::Variable, address)?;
        self.new_node(Node::SymbolRef(Resolver::Global(index)))
    }

    pub(crate) fn is_integer_lit(&self, node: NodeId) -> Option<VmValue> {
        match self.nodes[node] {
            Node::IntegerLit { value } => Some(value),
            _ => None,
        }
    }

    fn fold_unary(&mut self, op: Opcode, operand: NodeId) -> Result<NodeId> {
        if let Node::IntegerLit { value } = self.nodes[operand] {
            let folded = match op {
                Opcode::NEG => value.wrapping_neg(),
                Opcode::BNOT => !value,
                Opcode::NOT => {
                    if value != VMFALSE {
                        VMFALSE
                    } else {
                        VMTRUE
                    }
                }
                _ => unreachable!(),
            };
            return self.new_node(Node::IntegerLit { value: folded });
        }
        self.new_node(Node::UnaryOp { op, operand })
    }

    fn fold_binary(&mut self, op: Opcode, left: NodeId, right: NodeId) -> Result<NodeId> {
        if let (Node::IntegerLit { value: a }, Node::IntegerLit { value: b }) =
            (&self.nodes[left], &self.nodes[right])
        {
            let value = apply_binary(op, *a, *b);
            return self.new_node(Node::IntegerLit { value });
        }
        self.new_node(Node::BinaryOp { op, left, right })
    }
}

/// Compile-time evaluation matching the interpreter's two's-complement
/// wrap-around semantics.
fn apply_binary(op: Opcode, a: VmValue, b: VmValue) -> VmValue {
    let truth = |condition: bool| if condition { VMTRUE } else { VMFALSE };
    match op {
        Opcode::ADD => a.wrapping_add(b),
        Opcode::SUB => a.wrapping_sub(b),
        Opcode::MUL => a.wrapping_mul(b),
        Opcode::DIV => {
            if b == 0 {
                0
            } else {
                a.wrapping_div(b)
            }
        }
        Opcode::REM => {
            if b == 0 {
                0
            } else {
                a.wrapping_rem(b)
            }
        }
        Opcode::BAND => a & b,
        Opcode::BOR => a | b,
        Opcode::BXOR => a ^ b,
        Opcode::SHL => a.wrapping_shl(b as u32),
        Opcode::SHR => a.wrapping_shr(b as u32),
        Opcode::LT => truth(a < b),
        Opcode::LE => truth(a <= b),
        Opcode::EQ => truth(a == b),
        Opcode::NE => truth(a != b),
        Opcode::GE => truth(a >= b),
        Opcode::GT => truth(a > b),
        _ => unreachable!(),
    }
}
