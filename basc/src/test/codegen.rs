use bimg::IMAGE_HDR_SIZE;
use bvm::opcode::{opcode_byte, Opcode, Trap};

use util::{VmValue, VmWord, VALUE_BYTES, WORD_BYTES};

use super::compile_source;

fn op(opcode: Opcode) -> u8 {
    opcode_byte(opcode)
}

/// TEXT-relative offset of the main code (the two built-in function
/// bodies are interned first, each padded to one allocation unit).
fn entry_offset(image: &bimg::Image) -> usize {
    image.entry() as usize - IMAGE_HDR_SIZE
}

#[test]
fn main_code_for_a_print_statement() {
    let image = compile_source("PRINT 1").unwrap();
    let text = image.text();
    let main = &text[entry_offset(&image)..];

    let expected = [
        op(Opcode::SLIT),
        1,
        op(Opcode::TRAP),
        opcode_byte(Trap::PrintInt),
        op(Opcode::TRAP),
        opcode_byte(Trap::PrintNl),
        op(Opcode::HALT),
    ];
    assert_eq!(&main[..expected.len()], &expected[..]);
}

#[test]
fn literal_width_selection() {
    // -128..=127 emit SLIT with the value byte, everything else LIT with
    // a big-endian machine word
    for &value in &[0 as VmValue, 1, -1, 127, -128] {
        let image = compile_source(&format!("x = {}", value)).unwrap();
        let main = &image.text()[entry_offset(&image)..];
        assert_eq!(main[0], op(Opcode::SLIT), "value {}", value);
        assert_eq!(main[1] as i8 as VmValue, value, "value {}", value);
    }

    for &value in &[128 as VmValue, -129, 32000, -32000] {
        let image = compile_source(&format!("x = {}", value)).unwrap();
        let main = &image.text()[entry_offset(&image)..];
        assert_eq!(main[0], op(Opcode::LIT), "value {}", value);
        assert_eq!(
            util::read_value_be(&main[1..1 + VALUE_BYTES]),
            value,
            "value {}",
            value
        );
    }
}

#[test]
fn string_literals_are_interned_once() {
    let image = compile_source("PRINT \"x\"\nPRINT \"x\"").unwrap();
    let copies = image
        .text()
        .windows(2)
        .filter(|window| *window == [b'x', 0])
        .count();
    assert_eq!(copies, 1);
}

#[test]
fn image_header_matches_section_sizes() {
    let image = compile_source("DIM a(3)\nPRINT a(0)").unwrap();

    let mut bytes = Vec::new();
    bimg::write(&mut bytes, &image).unwrap();

    let data_offset = util::read_value(&bytes[VALUE_BYTES..]) as usize;
    let data_size = util::read_value(&bytes[2 * VALUE_BYTES..]) as usize;
    let image_size = util::read_value(&bytes[3 * VALUE_BYTES..]) as usize;

    assert_eq!(data_offset, IMAGE_HDR_SIZE + image.text().len());
    assert_eq!(image_size, data_offset + data_size);
    assert_eq!(image_size, bytes.len());
}

#[test]
fn function_frame_counts_arguments_and_locals() {
    let source = "\
DEF f(a, b)
DIM n
n = a - b
RETURN n
END DEF
PRINT f(10, 4)";
    let image = compile_source(source).unwrap();
    // the first function body lands right after the two built-ins
    let function = &image.text()[16..];

    assert_eq!(function[0], op(Opcode::FRAME));
    // two header cells plus one local
    assert_eq!(function[1], 3);
}

#[test]
fn argument_references_count_down_from_the_frame_pointer() {
    let source = "\
DEF f(a, b)
RETURN a - b
END DEF
PRINT f(10, 4)";
    let image = compile_source(source).unwrap();
    let function = &image.text()[16..];

    let expected = [
        op(Opcode::FRAME),
        2,
        op(Opcode::LREF),
        1, // a: first argument, deepest in the frame
        op(Opcode::LREF),
        0, // b
        op(Opcode::SUB),
        op(Opcode::RETURN),
        op(Opcode::RETURN),
    ];
    assert_eq!(&function[..expected.len()], &expected[..]);
}

#[test]
fn every_branch_lands_inside_text() {
    let source = "\
DIM total
FOR i = 1 TO 10
  IF i > 5 THEN
    total = total + i
  ELSE
    total = total - 1
  END IF
NEXT i
DO WHILE total > 3
  total = total / 2
LOOP
PRINT total";
    let image = compile_source(source).unwrap();
    let text = image.text();
    let text_end = IMAGE_HDR_SIZE + text.len();

    let branches = [
        op(Opcode::BR),
        op(Opcode::BRT),
        op(Opcode::BRF),
        op(Opcode::BRTSC),
        op(Opcode::BRFSC),
    ];

    let mut offset = entry_offset(&image);
    while offset < text.len() && text[offset] != 0 {
        let byte = text[offset];
        if branches.contains(&byte) {
            let mut word = [0u8; WORD_BYTES];
            word.copy_from_slice(&text[offset + 1..offset + 1 + WORD_BYTES]);
            let relative = VmWord::from_be_bytes(word);
            let target = (IMAGE_HDR_SIZE + offset + 1 + WORD_BYTES) as i64 + i64::from(relative);
            assert!(
                target >= IMAGE_HDR_SIZE as i64 && target < text_end as i64,
                "branch at {} escapes text ({})",
                offset,
                target
            );
        }
        let (_, length) = bvm::disasm::decode(text, 0, offset);
        offset += length;
    }
}

#[test]
fn short_circuit_chains_use_the_sc_branches() {
    // operand values are chosen so no immediate byte collides with the
    // branch opcodes being counted
    let image = compile_source("x = 9 AND 8 AND 7\ny = 9 OR 8").unwrap();
    let main = &image.text()[entry_offset(&image)..];

    let brfsc = main.iter().filter(|&&byte| byte == op(Opcode::BRFSC)).count();
    let brtsc = main.iter().filter(|&&byte| byte == op(Opcode::BRTSC)).count();
    assert_eq!(brfsc, 2);
    assert_eq!(brtsc, 1);
}

#[test]
fn builtin_functions_are_interned_at_the_start_of_text() {
    let image = compile_source("PRINT 1").unwrap();
    let text = image.text();

    assert_eq!(&text[..bvm::opcode::BI_DELAY_MS.len()], &bvm::opcode::BI_DELAY_MS[..]);
    assert_eq!(
        &text[8..8 + bvm::opcode::BI_UPDATE_LEDS.len()],
        &bvm::opcode::BI_UPDATE_LEDS[..]
    );
}

#[test]
fn data_reservation_covers_builtins_and_declarations() {
    let image = compile_source("DIM a(3)").unwrap();

    // 64 built-in cells plus 3 for the array
    assert_eq!(image.data().len(), 67 * VALUE_BYTES);
    assert!(image.data().iter().all(|&byte| byte == 0));
}
