#[macro_use]
extern crate clap;

use clap::{Arg, SubCommand};

fn main() {
    let matches = app_from_crate!()
        .subcommand(
            SubCommand::with_name("compile")
                .about("Compiles a source file into a bytecode image")
                .arg(
                    Arg::with_name("SOURCE")
                        .help("Sets the source file to compile")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("IMAGE")
                        .help("Sets the image file to write")
                        .required(true)
                        .index(2),
                ),
        )
        .subcommand(
            SubCommand::with_name("execute")
                .about("Runs a bytecode image")
                .arg(
                    Arg::with_name("IMAGE")
                        .help("Sets the image file to run")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("stack")
                        .short("s")
                        .long("stack")
                        .takes_value(true)
                        .value_name("CELLS")
                        .default_value("32")
                        .help("Sets the size of the operand stack"),
                ),
        )
        .get_matches();

    let result = match matches.subcommand() {
        ("compile", Some(sub)) => {
            bas::compile_file(sub.value_of("SOURCE").unwrap(), sub.value_of("IMAGE").unwrap())
        }
        ("execute", Some(sub)) => {
            let stack_size = match value_t!(sub.value_of("stack"), usize) {
                Ok(size) => size,
                Err(err) => err.exit(),
            };
            bas::execute_file(sub.value_of("IMAGE").unwrap(), stack_size)
        }
        _ => {
            eprintln!("usage: bas <compile|execute> ...");
            std::process::exit(1);
        }
    };

    if let Err(err) = result {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
