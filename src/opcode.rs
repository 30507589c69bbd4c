use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::ToPrimitive;

use util::VmValue;

// Instruction stream layout
//
// Every instruction is a one-byte opcode, optionally followed by an
// immediate operand. Multi-byte immediates are stored MSB-first regardless
// of the host byte order; this is the wire contract shared with the
// compiler. Opcode numbers start at 0x01 so that zeroed memory decodes as
// an undefined opcode.

#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive)]
pub enum Opcode {
    //  Mnemonic | Operand     | Effect
    //-----------+-------------+--------------------------------------------
    HALT = 0x01, // -           | Stop execution successfully
    BRT,      // | word        | Branch if TOS is true; always pop TOS
    BRTSC,    // | word        | Branch if TOS is true; pop only when not branching
    BRF,      // | word        | Branch if TOS is false; always pop TOS
    BRFSC,    // | word        | Branch if TOS is false; pop only when not branching
    BR,       // | word        | Unconditional branch
    NOT,      // | -           | TOS = logical complement of TOS
    NEG,      // | -           | TOS = -TOS
    ADD,      // | -           | TOS = pop() + TOS
    SUB,      // | -           | TOS = pop() - TOS
    MUL,      // | -           | TOS = pop() * TOS
    DIV,      // | -           | TOS = pop() / TOS (0 when TOS is 0)
    REM,      // | -           | TOS = pop() % TOS (0 when TOS is 0)
    BNOT,     // | -           | TOS = ~TOS
    BAND,     // | -           | TOS = pop() & TOS
    BOR,      // | -           | TOS = pop() | TOS
    BXOR,     // | -           | TOS = pop() ^ TOS
    SHL,      // | -           | TOS = pop() << TOS
    SHR,      // | -           | TOS = pop() >> TOS (arithmetic)
    LT,       // | -           | TOS = pop() <  TOS ? 1 : 0
    LE,       // | -           | TOS = pop() <= TOS ? 1 : 0
    EQ,       // | -           | TOS = pop() == TOS ? 1 : 0
    NE,       // | -           | TOS = pop() != TOS ? 1 : 0
    GE,       // | -           | TOS = pop() >= TOS ? 1 : 0
    GT,       // | -           | TOS = pop() >  TOS ? 1 : 0
    LIT,      // | value       | Push TOS; TOS = immediate machine word
    SLIT,     // | byte        | Push TOS; TOS = sign-extended immediate byte
    LOAD,     // | -           | TOS = word at address TOS (TEXT or DATA)
    LOADB,    // | -           | TOS = byte at address TOS (TEXT or DATA)
    STORE,    // | -           | Store pop() at address TOS; TOS = pop() (TEXT is ignored)
    STOREB,   // | -           | Byte-wide STORE
    LREF,     // | byte        | Push TOS; TOS = FP[operand]
    LSET,     // | byte        | FP[operand] = TOS; TOS = pop()
    INDEX,    // | -           | TOS = pop() + TOS * sizeof(value)
    CALL,     // | byte (argc) | Call the TEXT address in TOS; TOS = return address
    FRAME,    // | byte        | Open a stack frame reserving operand cells
    RETURN,   // | -           | Pop the frame and the caller's arguments
    DROP,     // | -           | TOS = pop()
    DUP,      // | -           | Push TOS
    NATIVE,   // | value       | Reserved; operand is decoded and ignored
    TRAP,     // | byte        | Invoke a host service
}

/// Host service codes carried by the `TRAP` opcode.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive)]
pub enum Trap {
    GetChar = 0,
    PutChar,
    PrintStr,
    PrintInt,
    PrintTab,
    PrintNl,
    PrintFlush,
    DelayMs,
    UpdateLeds,
}

#[inline]
pub fn opcode_byte<T: ToPrimitive + Copy>(val: T) -> u8 {
    val.to_u8().unwrap()
}

/// Body of the built-in `delayMs(n)` function.
pub const BI_DELAY_MS: [u8; 7] = [
    Opcode::FRAME as u8,
    2,
    Opcode::LREF as u8,
    0,
    Opcode::TRAP as u8,
    Trap::DelayMs as u8,
    Opcode::RETURN as u8,
];

/// Body of the built-in `updateLeds()` function.
pub const BI_UPDATE_LEDS: [u8; 5] = [
    Opcode::FRAME as u8,
    1,
    Opcode::TRAP as u8,
    Trap::UpdateLeds as u8,
    Opcode::RETURN as u8,
];

/// Cell counts of the built-in variables reserved in DATA at compile
/// start, in declaration order.
pub const BUILTIN_VARIABLES: [(&str, VmValue); 5] = [
    ("triggerTop", 1),
    ("triggerBottom", 1),
    ("numLeds", 1),
    ("led", 60),
    ("patternNum", 1),
];
