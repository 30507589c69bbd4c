//! Compiler for the BAS language, targeting the [bvm](../bvm/index.html)
//! stack bytecode interpreter.
//!
//! The entry point is [`compile`], which reads source a line at a time
//! from any [`BufRead`](std::io::BufRead) and produces a
//! [`bimg::Image`] ready to be written to disk or handed to the
//! interpreter. Compilation is single-pass: each statement is parsed into
//! a small tree and immediately lowered to bytecode in a staging buffer;
//! finished functions are appended to the image TEXT region.
//!
//! # The BAS Language
//!
//! BAS is a small BASIC dialect for driving LED controllers and other
//! constrained hosts. Keywords are case-insensitive. A statement ends at
//! the end of the line; several statements can share a line separated
//! with `:`. Comments run from `REM` to the end of the line, or between
//! `/*` and `*/` (which may span lines).
//!
//! ## Statements
//!
//!  Statement | Description | Example
//! -----------|-------------|--------
//! `DIM`      | declare scalars and arrays | `DIM a(10), count`
//! `LET`      | assignment (the keyword is optional) | `LET x = 1`
//! `DEF` .. `END DEF` | define a function; definitions must precede the main program | `DEF f(x) RETURN x*x END DEF`
//! `IF` .. `THEN` .. `ELSE IF` .. `ELSE` .. `END IF` | conditional | `IF a < b THEN PRINT a END IF`
//! `FOR` .. `TO` .. `STEP` .. `NEXT` | counted loop | `FOR i = 1 TO 10: PRINT i: NEXT i`
//! `DO [WHILE\|UNTIL]` .. `LOOP [WHILE\|UNTIL]` | pre- or post-tested loop | `DO WHILE n > 0 ... LOOP`
//! `GOTO` / `label:` | jump to a label in the same function | `GOTO again`
//! `PRINT`    | print integers and strings; `,` tabs, `;` joins | `PRINT "n="; n`
//! `RETURN`   | return from a function, optionally with a value | `RETURN x + 1`
//! `STOP`, `END` | halt the program | `STOP`
//!
//! ## Expressions
//!
//! Operator precedence, loosest first: `OR`, `AND`, `NOT`, the
//! comparisons `= < > <= >= <>`, `+ -`, then `* / \ MOD << >> & | ^`,
//! then unary `-` and `~`. `AND` and `OR` short-circuit. Integers are
//! machine words with wrap-around arithmetic; string literals may only
//! appear in `PRINT`. Arrays are indexed with `a(i)` or `a[i]`, zero
//! based, without bounds checking.
//!
//! ## Built-ins
//!
//! Every program sees the variables `triggerTop`, `triggerBottom`,
//! `numLeds`, `led(60)` and `patternNum`, and the functions `delayMs(n)`
//! and `updateLeds()`, which invoke host services.

mod error;
mod expr;
mod generate;
mod scan;
mod statement;
mod symbols;


use std::io::BufRead;
use std::mem;

use bimg::{Image, IMAGE_HDR_SIZE};
use bvm::opcode::{Opcode, BI_DELAY_MS, BI_UPDATE_LEDS, BUILTIN_VARIABLES};

use util::{VmUValue, VmValue, ALIGN_MASK, DATA_OFFSET, VALUE_BYTES};

pub use crate::error::{Error, Result};

use crate::expr::{Node, NodeId};
use crate::scan::{Scanner, Token};
use crate::statement::{Block, Label};
use crate::symbols::{StorageClass, Symbol, SymbolTable};

/// Code staging buffer limit.
pub const MAX_CODE: usize = 32 * 1024;
/// Compile-time heap budget, charged from both ends.
pub const HEAP_SIZE: usize = 5 * 1024;
/// Image TEXT region limit.
pub const TEXT_MAX: usize = 8 * 1024;
/// Image DATA region limit.
pub const DATA_MAX: usize = 1024;
/// Nesting limit for open control-flow constructs.
pub const BLOCK_STACK_DEPTH: usize = 10;

const HOST_ALIGN_MASK: usize = mem::size_of::<usize>() - 1;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum CodeType {
    Main,
    Function,
}

struct InternedString {
    text: String,
    address: VmValue,
}

/// Compiles a program into an image.
pub fn compile<R: BufRead>(source: R) -> Result<Image> {
    Compiler::new(source).run()
}

/// All compilation state: scanner, symbol tables, the per-function node
/// arena, the block and label records, the code staging buffer and the
/// image regions under construction.
pub struct Compiler<R> {
    pub(crate) scan: Scanner<R>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) globals: SymbolTable,
    pub(crate) arguments: SymbolTable,
    pub(crate) locals: SymbolTable,
    pub(crate) local_offset: VmValue,
    pub(crate) code_type: CodeType,
    pub(crate) code_symbol: Option<usize>,
    pub(crate) blocks: Vec<Block>,
    pub(crate) labels: Vec<Label>,
    strings: Vec<InternedString>,
    pub(crate) code: Vec<u8>,
    text: Vec<u8>,
    data_size: usize,
    local_used: usize,
    global_used: usize,
}

impl<R: BufRead> Compiler<R> {
    pub fn new(source: R) -> Compiler<R> {
        Compiler {
            scan: Scanner::new(source),
            nodes: Vec::new(),
            globals: SymbolTable::new(),
            arguments: SymbolTable::new(),
            locals: SymbolTable::new(),
            local_offset: 0,
            code_type: CodeType::Main,
            code_symbol: None,
            blocks: Vec::new(),
            labels: Vec::new(),
            strings: Vec::new(),
            code: Vec::new(),
            text: Vec::new(),
            data_size: 0,
            local_used: 0,
            global_used: 0,
        }
    }

    pub fn run(mut self) -> Result<Image> {
        self.enter_builtin_functions()?;
        self.enter_builtin_variables()?;

        while self.scan.get_line()? {
            loop {
                let token = self.scan.get_token()?;
                match token {
                    Token::Eol => break,
                    Token::Char(b':') => {}
                    token => self.parse_statement(token)?,
                }
            }
        }

        if self.code_type != CodeType::Main {
            return Err(self.error("expecting END DEF"));
        }

        // the main code always ends in a halt
        self.put_op(Opcode::HALT)?;
        self.start_code(CodeType::Main)?;
        let entry = self.store_code()?;

        // DIM only reserves; the DATA initializer is all zeros
        Ok(Image::from(entry, self.text, vec![0; self.data_size]))
    }

    fn enter_builtin_functions(&mut self) -> Result<()> {
        let address = self.image_text_alloc(&BI_DELAY_MS)?;
        self.add_global("delayMs", StorageClass::Constant, address)?;
        let address = self.image_text_alloc(&BI_UPDATE_LEDS)?;
        self.add_global("updateLeds", StorageClass::Constant, address)?;
        Ok(())
    }

    fn enter_builtin_variables(&mut self) -> Result<()> {
        for (name, cells) in BUILTIN_VARIABLES.iter() {
            let address = self.image_data_alloc(*cells as usize * VALUE_BYTES)?;
            self.add_global(name, StorageClass::Variable, address)?;
        }
        Ok(())
    }

    /// Begins a function or the main code.
    pub(crate) fn start_code(&mut self, code_type: CodeType) -> Result<()> {
        if code_type != CodeType::Main {
            if self.code_type != CodeType::Main {
                return Err(self.error("nested subroutines and functions are not supported"));
            }
            if !self.code.is_empty() {
                return Err(self.error("subroutines and functions must precede the main code"));
            }
        }

        self.arguments.clear();
        self.locals.clear();
        self.local_offset = 0;
        self.code_type = code_type;

        // frame prologue; the cell count is patched by store_code
        if code_type != CodeType::Main {
            self.put_op(Opcode::FRAME)?;
            self.putcbyte(0)?;
        }
        Ok(())
    }

    /// Finishes the code under construction, appends it to image TEXT and
    /// returns its TEXT address. All function-local state is recovered.
    pub(crate) fn store_code(&mut self) -> Result<VmValue> {
        self.check_unterminated_block()?;

        if self.code_type != CodeType::Main {
            self.code[1] = (2 + self.local_offset) as u8;
            self.put_op(Opcode::RETURN)?;
        }

        self.check_labels()?;

        let code = mem::take(&mut self.code);
        let address = self.image_text_alloc(&code)?;

        self.nodes.clear();
        self.local_used = 0;
        self.arguments.clear();
        self.locals.clear();
        self.labels.clear();
        self.code_type = CodeType::Main;

        Ok(address)
    }

    // -- symbol entry --

    pub(crate) fn add_global(
        &mut self,
        name: &str,
        storage_class: StorageClass,
        value: VmValue,
    ) -> Result<usize> {
        if self.globals.find(name).is_some() {
            return Err(self.error(format!("duplicate symbol '{}'", name)));
        }
        self.charge_global(mem::size_of::<Symbol>() + name.len())?;
        Ok(self.globals.add(name, storage_class, value))
    }

    pub(crate) fn add_argument(&mut self, name: &str) -> Result<()> {
        if self.arguments.find(name).is_some() {
            return Err(self.error(format!("duplicate symbol '{}'", name)));
        }
        if self.arguments.count() >= 127 {
            return Err(self.error("too many arguments"));
        }
        self.charge_local(mem::size_of::<Symbol>() + name.len())?;
        let position = self.arguments.count() as VmValue;
        self.arguments.add(name, StorageClass::Variable, position);
        Ok(())
    }

    /// Declares a local spanning `cells` frame cells; the symbol's value
    /// is its (negative) frame offset.
    pub(crate) fn add_local(&mut self, name: &str, cells: VmValue) -> Result<()> {
        if self.locals.find(name).is_some() {
            return Err(self.error(format!("duplicate symbol '{}'", name)));
        }
        let offset = i64::from(self.local_offset) + i64::from(cells);
        if offset > 126 {
            return Err(self.error("insufficient local variable space"));
        }
        self.charge_local(mem::size_of::<Symbol>() + name.len())?;
        self.locals
            .add(name, StorageClass::Variable, -(offset as VmValue));
        self.local_offset = offset as VmValue;
        Ok(())
    }

    // -- string pool --

    /// Interns a string literal, returning its TEXT address. Strings are
    /// deduplicated by content and stored NUL-terminated.
    pub(crate) fn add_string(&mut self, text: &str) -> Result<VmValue> {
        if let Some(string) = self.strings.iter().find(|string| string.text == text) {
            return Ok(string.address);
        }
        let mut bytes = Vec::from(text.as_bytes());
        bytes.push(0);
        let address = self.image_text_alloc(&bytes)?;
        self.charge_global(mem::size_of::<InternedString>() + text.len())?;
        self.strings.push(InternedString {
            text: text.to_owned(),
            address,
        });
        Ok(address)
    }

    // -- node arena --

    pub(crate) fn new_node(&mut self, node: Node) -> Result<NodeId> {
        self.charge_local(mem::size_of::<Node>())?;
        self.nodes.push(node);
        Ok(self.nodes.len() - 1)
    }

    // -- image regions --

    /// Appends bytes to image TEXT, padded to allocation alignment, and
    /// returns their image-relative address.
    pub(crate) fn image_text_alloc(&mut self, bytes: &[u8]) -> Result<VmValue> {
        let size = (bytes.len() + ALIGN_MASK) & !ALIGN_MASK;
        if self.text.len() + size > TEXT_MAX {
            return Err(self.error("insufficient image text space"));
        }
        let address = (IMAGE_HDR_SIZE + self.text.len()) as VmValue;
        self.text.extend_from_slice(bytes);
        self.text.resize(self.text.len() + (size - bytes.len()), 0);
        Ok(address)
    }

    /// Reserves image DATA space and returns its address (biased by
    /// `DATA_OFFSET`).
    pub(crate) fn image_data_alloc(&mut self, size: usize) -> Result<VmValue> {
        let size = match size.checked_add(ALIGN_MASK) {
            Some(padded) => padded & !ALIGN_MASK,
            None => return Err(self.error("insufficient image data space")),
        };
        if self.data_size + size > DATA_MAX {
            return Err(self.error("insufficient image data space"));
        }
        let address = (DATA_OFFSET + self.data_size as VmUValue) as VmValue;
        self.data_size += size;
        Ok(address)
    }

    // -- compile-time heap --

    /// Charges a function-local allocation against the heap budget.
    /// Local charges are recovered wholesale at each function boundary.
    pub(crate) fn charge_local(&mut self, size: usize) -> Result<()> {
        let size = (size + HOST_ALIGN_MASK) & !HOST_ALIGN_MASK;
        if self.local_used + self.global_used + size > HEAP_SIZE {
            return Err(self.error("insufficient local memory"));
        }
        self.local_used += size;
        Ok(())
    }

    /// Charges a compilation-lifetime allocation against the heap budget.
    pub(crate) fn charge_global(&mut self, size: usize) -> Result<()> {
        let size = (size + HOST_ALIGN_MASK) & !HOST_ALIGN_MASK;
        if self.local_used + self.global_used + size > HEAP_SIZE {
            return Err(self.error("insufficient global memory"));
        }
        self.global_used += size;
        Ok(())
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> Error {
        self.scan.error(message)
    }
}
