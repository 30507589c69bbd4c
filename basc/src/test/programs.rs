use bvm::Fault;

use super::{compile_error_of, output_of, run_source};

// -- expressions --

#[test]
fn arithmetic_precedence() {
    assert_eq!(output_of("PRINT 1 + 2 * 3"), "7\n");
}

#[test]
fn parentheses_override_precedence() {
    assert_eq!(output_of("PRINT (1 + 2) * 3"), "9\n");
}

#[test]
fn division_modulo_and_shifts() {
    assert_eq!(output_of("PRINT 17 / 5"), "3\n");
    assert_eq!(output_of("PRINT 17 \\ 5"), "3\n");
    assert_eq!(output_of("PRINT 17 MOD 5"), "2\n");
    assert_eq!(output_of("PRINT 1 << 4"), "16\n");
    assert_eq!(output_of("PRINT 64 >> 2"), "16\n");
}

#[test]
fn bitwise_operators() {
    assert_eq!(output_of("PRINT 12 & 10"), "8\n");
    assert_eq!(output_of("PRINT 12 | 10"), "14\n");
    assert_eq!(output_of("PRINT 12 ^ 10"), "6\n");
    assert_eq!(output_of("PRINT ~0"), "-1\n");
}

#[test]
fn comparisons_and_logic() {
    assert_eq!(output_of("PRINT 1 < 2"), "1\n");
    assert_eq!(output_of("PRINT 2 <> 2"), "0\n");
    assert_eq!(output_of("PRINT NOT 0"), "1\n");
    assert_eq!(output_of("x = 1\ny = 2\nPRINT x < y AND y < 3"), "1\n");
}

#[test]
fn division_by_zero_yields_zero_at_run_time() {
    assert_eq!(output_of("x = 0\nPRINT 7 / x"), "0\n");
}

#[test]
fn wrap_around_arithmetic() {
    let expected = format!("{}\n", (2_000_000_000 as util::VmValue).wrapping_mul(2));
    assert_eq!(output_of("x = 2000000000\nPRINT x * 2"), expected);
}

// -- variables and arrays --

#[test]
fn undeclared_variables_become_global_scalars() {
    assert_eq!(output_of("count = 41\ncount = count + 1\nPRINT count"), "42\n");
}

#[test]
fn array_sum() {
    let source = "\
DIM a(3)
a(0)=10: a(1)=20: a(2)=30
PRINT a(0)+a(1)+a(2)";
    assert_eq!(output_of(source), "60\n");
}

#[test]
fn bracket_indexing() {
    let source = "\
DIM a(2)
a[0] = 5
a[1] = a[0] * 2
PRINT a[1]";
    assert_eq!(output_of(source), "10\n");
}

#[test]
fn builtin_variables_are_addressable() {
    let source = "\
numLeds = 4
led(0) = 7
led(numLeds - 1) = 9
PRINT led(0) + led(3) + numLeds";
    assert_eq!(output_of(source), "20\n");
}

// -- control flow --

#[test]
fn if_else_single_line() {
    assert_eq!(
        output_of("IF 1 = 2 THEN PRINT \"no\" ELSE PRINT \"yes\" END IF"),
        "yes\n"
    );
}

#[test]
fn if_else_if_chain() {
    let source = "\
x = 2
IF x = 1 THEN
  PRINT \"one\"
ELSE IF x = 2 THEN
  PRINT \"two\"
ELSE
  PRINT \"many\"
END IF";
    assert_eq!(output_of(source), "two\n");
}

#[test]
fn if_without_else() {
    let source = "\
IF 1 THEN
  PRINT 1
END IF
IF 0 THEN
  PRINT 2
END IF
PRINT 3";
    assert_eq!(output_of(source), "1\n3\n");
}

#[test]
fn for_loop() {
    assert_eq!(output_of("FOR i = 1 TO 3: PRINT i: NEXT i"), "1\n2\n3\n");
}

#[test]
fn for_loop_with_step() {
    assert_eq!(output_of("FOR i = 0 TO 6 STEP 2: PRINT i: NEXT i"), "0\n2\n4\n6\n");
}

#[test]
fn for_loop_counting_down() {
    assert_eq!(output_of("FOR i = 3 TO 1 STEP -1: PRINT i: NEXT i"), "3\n2\n1\n");
}

#[test]
fn for_loop_that_never_runs() {
    assert_eq!(output_of("FOR i = 5 TO 1: PRINT i: NEXT i\nPRINT 9"), "9\n");
}

#[test]
fn do_while_loop() {
    let source = "\
n = 3
DO WHILE n > 0
  PRINT n
  n = n - 1
LOOP";
    assert_eq!(output_of(source), "3\n2\n1\n");
}

#[test]
fn do_until_loop_is_pre_tested() {
    let source = "\
DO UNTIL 1
  PRINT 1
LOOP
PRINT 2";
    assert_eq!(output_of(source), "2\n");
}

#[test]
fn loop_until_is_post_tested() {
    let source = "\
n = 0
DO
  n = n + 1
LOOP UNTIL n = 3
PRINT n";
    assert_eq!(output_of(source), "3\n");
}

#[test]
fn loop_while_repeats_while_true() {
    let source = "\
n = 5
DO
  n = n - 1
LOOP WHILE n > 2
PRINT n";
    assert_eq!(output_of(source), "2\n");
}

#[test]
fn goto_backward() {
    let source = "\
i = 0
again:
i = i + 1
IF i < 3 THEN GOTO again END IF
PRINT i";
    assert_eq!(output_of(source), "3\n");
}

#[test]
fn goto_forward() {
    let source = "\
GOTO out
PRINT 1
out:
PRINT 2";
    assert_eq!(output_of(source), "2\n");
}

#[test]
fn stop_halts_the_program() {
    assert_eq!(output_of("PRINT 1\nSTOP\nPRINT 2"), "1\n");
}

// -- functions --

#[test]
fn function_call() {
    assert_eq!(
        output_of("DEF f(x) RETURN x*x END DEF\nPRINT f(5)"),
        "25\n"
    );
}

#[test]
fn function_with_two_arguments() {
    let source = "\
DEF sub2(a, b)
RETURN a - b
END DEF
PRINT sub2(10, 4)";
    assert_eq!(output_of(source), "6\n");
}

#[test]
fn function_calling_earlier_function() {
    let source = "\
DEF double(x)
RETURN x + x
END DEF
DEF quad(x)
RETURN double(double(x))
END DEF
PRINT quad(3)";
    assert_eq!(output_of(source), "12\n");
}

#[test]
fn function_call_as_statement_discards_the_result() {
    let source = "\
DEF bump()
hits = hits + 1
RETURN hits
END DEF
bump()
bump()
PRINT hits";
    assert_eq!(output_of(source), "2\n");
}

#[test]
fn locals_shadow_globals() {
    let source = "\
DEF f()
DIM x
x = 42
RETURN x
END DEF
x = 7
PRINT f()
PRINT x";
    assert_eq!(output_of(source), "42\n7\n");
}

#[test]
fn short_circuit_and_skips_the_right_operand() {
    assert_eq!(
        output_of("IF 0 AND (1/0) THEN PRINT \"bad\" ELSE PRINT \"ok\" END IF"),
        "ok\n"
    );
}

#[test]
fn short_circuit_values_span_the_chain() {
    assert_eq!(output_of("PRINT 0 OR 5"), "5\n");
    assert_eq!(output_of("PRINT 2 AND 3"), "3\n");
    assert_eq!(output_of("PRINT 0 AND 3"), "0\n");
}

// -- printing --

#[test]
fn print_separators() {
    assert_eq!(output_of("PRINT 1, 2"), "1\t2\n");
    assert_eq!(output_of("PRINT 1; 2"), "12\n");
    assert_eq!(output_of("PRINT 1;"), "1");
    assert_eq!(output_of("PRINT"), "\n");
}

#[test]
fn print_mixes_strings_and_numbers() {
    assert_eq!(output_of("PRINT \"n=\"; 42"), "n=42\n");
}

#[test]
fn rem_and_block_comments_are_ignored() {
    let source = "\
REM this line does nothing
PRINT /* inline */ 1
/* spanning
   lines */ PRINT 2";
    assert_eq!(output_of(source), "1\n2\n");
}

// -- built-in functions --

#[test]
fn delay_and_led_builtins_reach_the_host() {
    let source = "\
delayMs(250)
updateLeds()
updateLeds()";
    let (result, interpreter) = run_source(source);
    assert_eq!(result, Ok(()));
    assert_eq!(interpreter.host().delays(), &[250]);
    assert_eq!(interpreter.host().led_updates(), 2);
}

// -- compile-time diagnostics --

#[test]
fn unterminated_string_names_the_line() {
    let (line, message) = compile_error_of("PRINT 1\nPRINT \"abc");
    assert_eq!(line, 2);
    assert!(message.contains("quote"), "message: {}", message);
}

#[test]
fn nested_functions_are_rejected() {
    let (_, message) = compile_error_of("DEF f()\nDEF g()\nEND DEF\nEND DEF");
    assert_eq!(message, "nested subroutines and functions are not supported");
}

#[test]
fn functions_must_precede_main() {
    let (_, message) = compile_error_of("PRINT 1\nDEF f()\nEND DEF");
    assert_eq!(message, "subroutines and functions must precede the main code");
}

#[test]
fn oversized_local_array_is_rejected() {
    let (_, message) = compile_error_of("DEF f()\nDIM a(100000)\nEND DEF");
    assert!(message.contains("insufficient"), "message: {}", message);
}

#[test]
fn oversized_global_array_is_rejected() {
    let (_, message) = compile_error_of("DIM a(100000)");
    assert!(message.contains("insufficient"), "message: {}", message);
}

#[test]
fn undefined_label_is_rejected() {
    let (_, message) = compile_error_of("GOTO nowhere");
    assert!(message.contains("undefined label"), "message: {}", message);
}

#[test]
fn unterminated_if_is_rejected() {
    let (_, message) = compile_error_of("IF 1 THEN\nPRINT 1");
    assert_eq!(message, "expecting END IF");
}

#[test]
fn unterminated_for_is_rejected() {
    let (_, message) = compile_error_of("FOR i = 1 TO 3\nPRINT i");
    assert_eq!(message, "expecting NEXT");
}

#[test]
fn unterminated_def_is_rejected() {
    let (_, message) = compile_error_of("DEF f()\nRETURN 1");
    assert_eq!(message, "expecting END DEF");
}

#[test]
fn mismatched_next_is_rejected() {
    let (_, message) = compile_error_of("FOR i = 1 TO 3\nNEXT j");
    assert!(message.contains("NEXT"), "message: {}", message);
}

#[test]
fn else_without_if_is_rejected() {
    let (_, message) = compile_error_of("ELSE");
    assert!(message.contains("ELSE"), "message: {}", message);
}

#[test]
fn return_in_main_is_rejected() {
    let (_, message) = compile_error_of("RETURN 1");
    assert!(message.contains("RETURN"), "message: {}", message);
}

#[test]
fn assigning_to_a_literal_is_rejected() {
    let (_, message) = compile_error_of("LET 5 = 1");
    assert!(message.contains("expecting"), "message: {}", message);
}

#[test]
fn assigning_to_a_function_is_rejected() {
    let (_, message) = compile_error_of("DEF f() END DEF\nf = 1");
    assert!(message.contains("lvalue"), "message: {}", message);
}

#[test]
fn duplicate_dim_is_rejected() {
    let (_, message) = compile_error_of("DIM a\nDIM a");
    assert!(message.contains("duplicate"), "message: {}", message);
}

#[test]
fn address_of_local_array_element_is_rejected() {
    let (_, message) = compile_error_of("DEF f()\nDIM a(4)\na(0) = 1\nEND DEF");
    assert!(message.contains("not supported"), "message: {}", message);
}

// -- run-time faults --

#[test]
fn self_recursion_calls_an_unresolved_address() {
    // a function's own entry point is patched only at END DEF, so a
    // self-call targets address 0 and the interpreter faults there
    let source = "\
DEF f(n)
RETURN f(n + 1)
END DEF
PRINT f(0)";
    let (result, interpreter) = run_source(source);
    assert_eq!(result, Err(Fault::UndefinedOpcode(0)));
    assert_eq!(interpreter.host().output(), b"");
}
