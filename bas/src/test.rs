use std::env;
use std::fs;
use std::path::PathBuf;

use bvm::{Capture, Fault};
use util::VmValue;

use super::*;

fn temp_path(name: &str) -> PathBuf {
    env::temp_dir().join(name)
}

#[test]
fn compile_then_execute_via_files() {
    let source_path = temp_path("bas_pipeline.bas");
    let image_path = temp_path("bas_pipeline.img");
    fs::write(&source_path, "FOR i = 1 TO 3: PRINT i: NEXT i\n").unwrap();

    compile_file(&source_path, &image_path).unwrap();

    let image = bimg::read_file(&image_path).unwrap();
    let interpreter = run_image(image, 32, Capture::new(b"")).unwrap();
    assert_eq!(interpreter.host().output_str(), "1\n2\n3\n");

    fs::remove_file(source_path).unwrap();
    fs::remove_file(image_path).unwrap();
}

#[test]
fn failed_compilation_writes_no_image() {
    let source_path = temp_path("bas_bad.bas");
    let image_path = temp_path("bas_bad.img");
    let _ = fs::remove_file(&image_path);
    fs::write(&source_path, "PRINT \"abc\n").unwrap();

    match compile_file(&source_path, &image_path) {
        Err(Error::Compile(err)) => {
            let message = err.to_string();
            assert!(message.contains("line 1"), "message: {}", message);
        }
        Ok(()) => panic!("expected a compile error"),
        Err(other) => panic!("unexpected error: {}", other),
    }
    assert!(!image_path.exists());

    fs::remove_file(source_path).unwrap();
}

#[test]
fn missing_source_reports_the_path() {
    let missing = temp_path("bas_no_such_source.bas");
    match compile_file(&missing, temp_path("bas_unused.img")) {
        Err(Error::Io(_, IOErrorContext::ReadInput, path)) => assert_eq!(path, missing),
        _ => panic!("expected a read error"),
    }
}

#[test]
fn entry_past_text_aborts_before_any_output() {
    let text = vec![0u8; 8];
    let entry = (bimg::IMAGE_HDR_SIZE + 100) as VmValue;
    let image = bimg::Image::from(entry, text, vec![0; 8]);

    match run_image(image, 32, Capture::new(b"")) {
        Err(Error::Run(Fault::UndefinedOpcode(0))) => {}
        _ => panic!("expected an undefined opcode fault"),
    }
}

#[test]
fn undersized_stack_is_rejected() {
    let image = bimg::Image::from(bimg::IMAGE_HDR_SIZE as VmValue, vec![0u8; 4], Vec::new());

    match run_image(image, 8, Capture::new(b"")) {
        Err(Error::Run(Fault::InsufficientStack)) => {}
        _ => panic!("expected an insufficient stack fault"),
    }
}
