use util::VmValue;

pub const VMTRUE: VmValue = 1;
pub const VMFALSE: VmValue = 0;

/// Smallest operand stack the interpreter will accept, in cells.
pub const MIN_STACK_SIZE: usize = 32;
